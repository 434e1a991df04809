//! CLI command implementations

pub mod attendance;
pub mod auth;
pub mod dashboard;
pub mod logs;
pub mod member;
pub mod report;
pub mod user;

use std::path::PathBuf;
use std::sync::{Arc, OnceLock};

use anyhow::{anyhow, Context, Result};
use chrono::NaiveDate;
use rollcall_core::domain::parse_date;
use rollcall_core::ports::IdentityProvider;
use rollcall_core::services::{EntryPoint, LiveState, LogEvent, LoggingService, Readiness};
use rollcall_core::{RollcallContext, User};

fn open_logger() -> Option<LoggingService> {
    let data_dir = get_data_dir().ok()?;
    std::fs::create_dir_all(&data_dir).ok()?;
    LoggingService::new(&data_dir, EntryPoint::Cli, env!("CARGO_PKG_VERSION")).ok()
}

/// Get the logging service for CLI operations
///
/// Opened once per process. Returns None if logging fails to initialize
/// (shouldn't block operations)
pub fn get_logger() -> Option<Arc<LoggingService>> {
    static LOGGER: OnceLock<Option<Arc<LoggingService>>> = OnceLock::new();
    LOGGER.get_or_init(|| open_logger().map(Arc::new)).clone()
}

/// Log an event, ignoring any errors (logging should never break the app)
pub fn log_event(logger: Option<&Arc<LoggingService>>, event: LogEvent) {
    if let Some(l) = logger {
        let _ = l.log(event);
    }
}

/// Get the data directory from environment or default
pub fn get_data_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var("ROLLCALL_DIR") {
        return Ok(PathBuf::from(dir));
    }
    dirs::home_dir()
        .map(|home| home.join(".rollcall"))
        .ok_or_else(|| anyhow!("Could not find home directory; set ROLLCALL_DIR"))
}

/// Open the rollcall context
pub fn get_context() -> Result<RollcallContext> {
    let data_dir = get_data_dir()?;
    RollcallContext::new(&data_dir).context("Failed to initialize rollcall context")
}

/// The signed-in administrator, or an error telling the user to log in
pub fn require_user(ctx: &RollcallContext) -> Result<User> {
    ctx.identity
        .current_user()
        .ok_or_else(|| anyhow!("Not signed in. Run 'rollcall login' first."))
}

/// `--date` or today's UTC date
pub fn resolve_date(date: Option<&str>) -> Result<NaiveDate> {
    match date {
        Some(d) => Ok(parse_date(d)?),
        None => Ok(rollcall_core::today()),
    }
}

/// Live state for `today`, wired to the event log
pub fn open_state(ctx: &RollcallContext, today: NaiveDate) -> LiveState {
    ctx.live_state(today, get_logger())
}

/// Fail if any source of the live state did not load
pub fn ensure_loaded(state: &LiveState) -> Result<()> {
    let readiness = state.readiness();
    if !readiness.all_resolved() {
        anyhow::bail!("Data is still loading; try again");
    }
    if readiness.members == Readiness::Failed || readiness.attendance == Readiness::Failed {
        anyhow::bail!("Could not load attendance data. See 'rollcall logs list --errors'.");
    }
    Ok(())
}
