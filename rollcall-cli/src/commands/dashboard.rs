//! Dashboard command - today's summary, the last seven days and the member list

use anyhow::Result;
use colored::Colorize;

use super::{ensure_loaded, get_context, open_state, require_user, resolve_date};
use crate::output::{create_table, status_cell};

pub fn run(date: Option<&str>, search: Option<&str>, json: bool) -> Result<()> {
    let ctx = get_context()?;
    let user = require_user(&ctx)?;
    let date = resolve_date(date)?;

    let state = open_state(&ctx, date);
    ensure_loaded(&state)?;

    let summary = state.today_summary();
    let weekly = state.weekly_summary();
    let members = state.filtered_members(search.unwrap_or(""));

    if json {
        let rows: Vec<_> = members
            .iter()
            .map(|m| {
                serde_json::json!({
                    "member": m,
                    "status": state.snapshot().effective_status(&m.id, date),
                })
            })
            .collect();
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "date": date,
                "summary": summary,
                "weekly": weekly,
                "members": rows,
            }))?
        );
        return Ok(());
    }

    println!("{} {}", ctx.config.group_name.bold(), "Attendance".bold());
    println!("Signed in as {}", user.email.dimmed());
    println!();

    println!("{} {}", "Summary for".bold(), date);
    let mut table = create_table();
    table.set_header(vec!["Present", "Half Day", "Absent", "Total"]);
    table.add_row(vec![
        summary.present.to_string(),
        summary.half_day.to_string(),
        summary.absent.to_string(),
        summary.total.to_string(),
    ]);
    println!("{}", table);
    println!();

    println!("{}", "Last 7 days".bold());
    let mut table = create_table();
    table.set_header(vec!["Day", "Date", "Present", "Half Day", "Absent"]);
    for bucket in &weekly {
        table.add_row(vec![
            bucket.label.clone(),
            bucket.date.to_string(),
            bucket.present.to_string(),
            bucket.half_day.to_string(),
            bucket.absent.to_string(),
        ]);
    }
    println!("{}", table);
    println!();

    if state.members().is_empty() {
        println!("{}", "No members yet. Add one with 'rollcall member add <name> <instrument>'.".yellow());
        return Ok(());
    }
    if members.is_empty() {
        println!("No members match '{}'.", search.unwrap_or_default());
        return Ok(());
    }

    println!("{}", "Members".bold());
    let mut table = create_table();
    table.set_header(vec!["Name", "Instrument", "Status", "ID"]);
    for member in &members {
        table.add_row(vec![
            comfy_table::Cell::new(&member.name),
            comfy_table::Cell::new(&member.instrument),
            status_cell(state.snapshot().effective_status(&member.id, date)),
            comfy_table::Cell::new(&member.id),
        ]);
    }
    println!("{}", table);

    Ok(())
}
