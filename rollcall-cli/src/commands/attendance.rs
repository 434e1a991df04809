//! Attendance command - view and mark a day's attendance

use anyhow::Result;
use chrono::NaiveDate;
use clap::Subcommand;
use colored::Colorize;

use super::{ensure_loaded, get_context, open_state, require_user, resolve_date};
use crate::output::{self, create_table, status_cell};
use rollcall_core::services::{LiveState, MarkOutcome};
use rollcall_core::{AttendanceStatus, Error, RollcallContext};

#[derive(Subcommand)]
pub enum AttendanceCommands {
    /// Show every member's status for a day
    Show {
        /// Day to show (YYYY-MM-DD, defaults to today)
        #[arg(long)]
        date: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Flip a member between present and absent
    Toggle {
        /// Member ID
        id: String,
        /// Day to mark (YYYY-MM-DD, defaults to today)
        #[arg(long)]
        date: Option<String>,
    },
    /// Mark a member as half day
    HalfDay {
        /// Member ID
        id: String,
        /// Day to mark (YYYY-MM-DD, defaults to today)
        #[arg(long)]
        date: Option<String>,
    },
    /// Set a member's status explicitly
    Set {
        /// Member ID
        id: String,
        /// present, absent or halfday
        status: String,
        /// Day to mark (YYYY-MM-DD, defaults to today)
        #[arg(long)]
        date: Option<String>,
    },
    /// Mark every member not already present as present
    AllPresent {
        /// Day to mark (YYYY-MM-DD, defaults to today)
        #[arg(long)]
        date: Option<String>,
    },
}

impl AttendanceCommands {
    pub fn name(&self) -> &'static str {
        match self {
            AttendanceCommands::Show { .. } => "attendance show",
            AttendanceCommands::Toggle { .. } => "attendance toggle",
            AttendanceCommands::HalfDay { .. } => "attendance half-day",
            AttendanceCommands::Set { .. } => "attendance set",
            AttendanceCommands::AllPresent { .. } => "attendance all-present",
        }
    }
}

/// Resolve `--date` for a write and check it is inside the live window
fn write_date(ctx: &RollcallContext, date: Option<&str>) -> Result<NaiveDate> {
    let date = resolve_date(date)?;
    ctx.check_in_window(date, rollcall_core::today())?;
    Ok(date)
}

/// Print a member's status after a write, as seen by the live state
fn print_member_status(state: &mut LiveState, id: &str, date: NaiveDate, outcome: &MarkOutcome) -> Result<()> {
    state.sync();
    let member = state
        .member(id)
        .ok_or_else(|| Error::not_found(format!("Member {}", id)))?;
    let status = state.snapshot().effective_status(id, date);

    if outcome.is_noop() {
        println!("{} is already {} on {}", member.name, status.label(), date);
    } else {
        println!("{} {} on {}", member.name.bold(), status_colored(status), date);
    }
    Ok(())
}

fn status_colored(status: AttendanceStatus) -> colored::ColoredString {
    match status {
        AttendanceStatus::Present => status.label().green(),
        AttendanceStatus::HalfDay => status.label().yellow(),
        AttendanceStatus::Absent => status.label().red(),
    }
}

pub fn run(command: AttendanceCommands) -> Result<()> {
    let ctx = get_context()?;
    require_user(&ctx)?;

    match command {
        AttendanceCommands::Show { date, json } => {
            let date = resolve_date(date.as_deref())?;
            let state = open_state(&ctx, date);
            ensure_loaded(&state)?;
            let roster = state.roster(date);

            if json {
                let rows: Vec<_> = roster
                    .iter()
                    .map(|(m, s)| serde_json::json!({ "member": m, "status": s }))
                    .collect();
                println!(
                    "{}",
                    serde_json::to_string_pretty(&serde_json::json!({ "date": date, "members": rows }))?
                );
                return Ok(());
            }

            if roster.is_empty() {
                println!("No members yet.");
                return Ok(());
            }

            println!("{} {}", "Attendance for".bold(), date);
            let mut table = create_table();
            table.set_header(vec!["Name", "Instrument", "Status", "ID"]);
            for (member, status) in &roster {
                table.add_row(vec![
                    comfy_table::Cell::new(&member.name),
                    comfy_table::Cell::new(&member.instrument),
                    status_cell(*status),
                    comfy_table::Cell::new(&member.id),
                ]);
            }
            println!("{}", table);
        }
        AttendanceCommands::Toggle { id, date } => {
            let date = write_date(&ctx, date.as_deref())?;
            let mut state = open_state(&ctx, rollcall_core::today());
            let outcome = ctx.attendance_service.toggle_present(&id, date)?;
            print_member_status(&mut state, &id, date, &outcome)?;
        }
        AttendanceCommands::HalfDay { id, date } => {
            let date = write_date(&ctx, date.as_deref())?;
            let mut state = open_state(&ctx, rollcall_core::today());
            let outcome = ctx.attendance_service.mark_half_day(&id, date)?;
            print_member_status(&mut state, &id, date, &outcome)?;
        }
        AttendanceCommands::Set { id, status, date } => {
            let status: AttendanceStatus = status.parse()?;
            let date = write_date(&ctx, date.as_deref())?;
            let mut state = open_state(&ctx, rollcall_core::today());
            let outcome = ctx.attendance_service.mark(&[(id.clone(), status)], date)?;
            print_member_status(&mut state, &id, date, &outcome)?;
        }
        AttendanceCommands::AllPresent { date } => {
            let date = write_date(&ctx, date.as_deref())?;
            let outcome = ctx.attendance_service.mark_all_present(date)?;
            if outcome.is_noop() {
                output::info(&format!("Everyone is already present on {}", date));
            } else {
                output::success(&format!(
                    "Marked {} members present on {} ({} already present)",
                    outcome.written.len(),
                    date,
                    outcome.skipped
                ));
            }
        }
    }

    Ok(())
}
