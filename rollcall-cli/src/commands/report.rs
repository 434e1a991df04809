//! Report command - export the attendance grid as CSV

use std::path::PathBuf;

use anyhow::Result;

use super::{get_context, require_user, resolve_date};
use crate::output;
use rollcall_core::services::aggregator::MAX_DAYS;
use rollcall_core::services::{MONTHLY_DAYS, WEEKLY_DAYS};

pub fn run(
    days: Option<u32>,
    weekly: bool,
    monthly: bool,
    output_path: Option<PathBuf>,
    stdout: bool,
    date: Option<&str>,
) -> Result<()> {
    let ctx = get_context()?;
    require_user(&ctx)?;
    let today = resolve_date(date)?;

    let days = match (days, weekly, monthly) {
        (Some(n), _, _) => n,
        (None, true, _) => WEEKLY_DAYS,
        (None, _, true) => MONTHLY_DAYS,
        (None, false, false) => MONTHLY_DAYS,
    };
    if days == 0 || days > MAX_DAYS {
        anyhow::bail!("--days must be between 1 and {}", MAX_DAYS);
    }
    if days > ctx.config.window_days + 1 {
        output::warning(&format!(
            "Only the last {} days are loaded; earlier days will show as absent",
            ctx.config.window_days + 1
        ));
    }

    if stdout {
        println!("{}", ctx.report_service.generate(days, today)?);
        return Ok(());
    }

    let target = output_path.unwrap_or_else(|| PathBuf::from("."));
    let path = ctx.report_service.export(days, today, &target)?;
    output::success(&format!("Report written to {}", path.display()));
    Ok(())
}
