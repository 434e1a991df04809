//! Member command - add, import, edit and inspect members

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::Subcommand;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};

use super::{ensure_loaded, get_context, get_logger, log_event, open_state, require_user, resolve_date};
use crate::output::{self, create_table, status_cell};
use rollcall_core::services::LogEvent;
use rollcall_core::Error;

#[derive(Subcommand)]
pub enum MemberCommands {
    /// Add a member
    Add {
        /// Member name
        name: String,
        /// Instrument played
        instrument: String,
    },
    /// Import members from a CSV file with 'name' and 'instrument' columns
    Import {
        /// Path to CSV file
        file: PathBuf,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Change a member's name or instrument
    Edit {
        /// Member ID
        id: String,
        /// New name
        #[arg(long)]
        name: Option<String>,
        /// New instrument
        #[arg(long)]
        instrument: Option<String>,
    },
    /// List members sorted by name
    List {
        /// Filter by name or instrument
        #[arg(long, short)]
        search: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show a member's 30-day summary and history
    Show {
        /// Member ID
        id: String,
        /// Last day of the summary (YYYY-MM-DD, defaults to today)
        #[arg(long)]
        date: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Generate a performance remark from the 30-day summary
    Remark {
        /// Member ID
        id: String,
        /// Last day of the summary (YYYY-MM-DD, defaults to today)
        #[arg(long)]
        date: Option<String>,
    },
}

impl MemberCommands {
    pub fn name(&self) -> &'static str {
        match self {
            MemberCommands::Add { .. } => "member add",
            MemberCommands::Import { .. } => "member import",
            MemberCommands::Edit { .. } => "member edit",
            MemberCommands::List { .. } => "member list",
            MemberCommands::Show { .. } => "member show",
            MemberCommands::Remark { .. } => "member remark",
        }
    }
}

pub fn run(command: MemberCommands) -> Result<()> {
    let ctx = get_context()?;
    require_user(&ctx)?;

    match command {
        MemberCommands::Add { name, instrument } => {
            let id = ctx.member_service.add(&name, &instrument)?;
            output::success(&format!("Added {} ({})", name.trim(), instrument.trim()));
            println!("  ID: {}", id);
        }
        MemberCommands::Import { file, json } => {
            let result = ctx.member_service.import_csv(&file)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
                return Ok(());
            }
            output::success(&format!("Imported {} members", result.imported));
            if result.skipped > 0 {
                output::warning(&format!(
                    "Skipped {} rows without both a name and an instrument",
                    result.skipped
                ));
            }
        }
        MemberCommands::Edit { id, name, instrument } => {
            if name.is_none() && instrument.is_none() {
                anyhow::bail!("Nothing to change. Pass --name and/or --instrument.");
            }
            let current = ctx.member_service.get(&id)?;
            let name = name.unwrap_or(current.name);
            let instrument = instrument.unwrap_or(current.instrument);
            ctx.member_service.update(&id, &name, &instrument)?;
            output::success(&format!("Updated {} ({})", name.trim(), instrument.trim()));
        }
        MemberCommands::List { search, json } => {
            let members = ctx.member_service.search(search.as_deref().unwrap_or(""))?;
            if json {
                println!("{}", serde_json::to_string_pretty(&members)?);
                return Ok(());
            }
            if members.is_empty() {
                println!("No members found.");
                return Ok(());
            }

            let mut table = create_table();
            table.set_header(vec!["Name", "Instrument", "Joined", "ID"]);
            for member in &members {
                table.add_row(vec![
                    member.name.clone(),
                    member.instrument.clone(),
                    member.joined_on().to_string(),
                    member.id.clone(),
                ]);
            }
            println!("{}", table);
        }
        MemberCommands::Show { id, date, json } => {
            let date = resolve_date(date.as_deref())?;
            let state = open_state(&ctx, date);
            ensure_loaded(&state)?;

            let member = state
                .member(&id)
                .ok_or_else(|| Error::not_found(format!("Member {}", id)))?;
            let summary = state.member_summary(&id).unwrap_or_default();
            let history = state.member_history(&id).unwrap_or_default();

            if json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&serde_json::json!({
                        "member": member,
                        "summary": summary,
                        "history": history,
                    }))?
                );
                return Ok(());
            }

            println!("{} ({})", member.name.bold(), member.instrument);
            println!("Joined {}", member.joined_on());
            println!();
            println!("{}", "Last 30 days".bold());
            println!(
                "  Present: {}  Half Day: {}  Absent: {}  (of {} days)",
                summary.present.to_string().green(),
                summary.half_day.to_string().yellow(),
                summary.absent.to_string().red(),
                summary.days_considered
            );
            println!();

            let mut table = create_table();
            table.set_header(vec!["Date", "Status"]);
            for day in &history {
                table.add_row(vec![comfy_table::Cell::new(day.date), status_cell(day.status)]);
            }
            println!("{}", table);
        }
        MemberCommands::Remark { id, date } => {
            let date = resolve_date(date.as_deref())?;

            let spinner = if atty::is(atty::Stream::Stdout) {
                let pb = ProgressBar::new_spinner();
                pb.set_style(ProgressStyle::default_spinner());
                pb.set_message("Generating remark...");
                pb.enable_steady_tick(Duration::from_millis(100));
                Some(pb)
            } else {
                None
            };

            let result = ctx.remark_service.remark_for(&id, date);
            if let Some(pb) = spinner {
                pb.finish_and_clear();
            }
            let remark = result?;
            if let Some(reason) = &remark.failure {
                log_event(
                    get_logger().as_ref(),
                    LogEvent::new("remark_failed")
                        .with_command("member remark")
                        .with_error(reason.as_str()),
                );
            }

            println!("{}", remark.member_name.bold());
            println!("{}", remark.summary_text.dimmed());
            println!();
            println!("{}", remark.text);
        }
    }

    Ok(())
}
