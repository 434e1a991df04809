//! Rollcall CLI - attendance tracking in your terminal

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;
mod output;

use commands::{attendance, auth, dashboard, get_logger, log_event, logs, member, report, user};
use rollcall_core::services::LogEvent;
use rollcall_core::Error;

/// Rollcall - attendance tracking for your troupe
#[derive(Parser)]
#[command(name = "rollcall", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage administrator accounts
    User {
        #[command(subcommand)]
        command: user::UserCommands,
    },

    /// Sign in as an administrator
    Login {
        /// Account email (prompted if omitted)
        #[arg(long)]
        email: Option<String>,
        /// Account password (prompted if omitted)
        #[arg(long, env = "ROLLCALL_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },

    /// Sign out
    Logout,

    /// Show the signed-in administrator
    Whoami {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show today's summary, the last seven days and the member list
    Dashboard {
        /// Day to show (YYYY-MM-DD, defaults to today)
        #[arg(long)]
        date: Option<String>,
        /// Filter members by name or instrument
        #[arg(long, short)]
        search: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Manage members
    Member {
        #[command(subcommand)]
        command: member::MemberCommands,
    },

    /// View and mark attendance
    Attendance {
        #[command(subcommand)]
        command: attendance::AttendanceCommands,
    },

    /// Export an attendance report as CSV
    Report {
        /// Number of days ending today
        #[arg(long, conflicts_with_all = ["weekly", "monthly"])]
        days: Option<u32>,
        /// Last 7 days
        #[arg(long, conflicts_with = "monthly")]
        weekly: bool,
        /// Last 30 days
        #[arg(long)]
        monthly: bool,
        /// Output file or directory (defaults to the current directory)
        #[arg(long, short)]
        output: Option<PathBuf>,
        /// Print the CSV instead of writing a file
        #[arg(long, conflicts_with = "output")]
        stdout: bool,
        /// Last day of the report (YYYY-MM-DD, defaults to today)
        #[arg(long)]
        date: Option<String>,
    },

    /// View and manage application logs
    Logs {
        #[command(subcommand)]
        command: logs::LogsCommands,
    },
}

impl Commands {
    /// Name recorded in the event log; never includes arguments
    fn name(&self) -> &'static str {
        match self {
            Commands::User { .. } => "user",
            Commands::Login { .. } => "login",
            Commands::Logout => "logout",
            Commands::Whoami { .. } => "whoami",
            Commands::Dashboard { .. } => "dashboard",
            Commands::Member { command } => command.name(),
            Commands::Attendance { command } => command.name(),
            Commands::Report { .. } => "report",
            Commands::Logs { .. } => "logs",
        }
    }
}

/// Error text safe for the event log; input-bearing messages are reduced to their kind
fn loggable_error(e: &anyhow::Error) -> String {
    match e.downcast_ref::<Error>() {
        Some(Error::Validation(_)) => "validation failed".to_string(),
        Some(Error::NotFound(_)) => "not found".to_string(),
        Some(other) => other.to_string(),
        None => e.to_string(),
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let command_name = cli.command.name();

    let logger = get_logger();
    log_event(logger.as_ref(), LogEvent::new("command_executed").with_command(command_name));

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log_event(
                logger.as_ref(),
                LogEvent::new("command_failed")
                    .with_command(command_name)
                    .with_error(loggable_error(&e)),
            );
            output::error(&format!("{:#}", e));
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::User { command } => user::run(command),
        Commands::Login { email, password } => auth::login(email, password),
        Commands::Logout => auth::logout(),
        Commands::Whoami { json } => auth::whoami(json),
        Commands::Dashboard { date, search, json } => {
            dashboard::run(date.as_deref(), search.as_deref(), json)
        }
        Commands::Member { command } => member::run(command),
        Commands::Attendance { command } => attendance::run(command),
        Commands::Report { days, weekly, monthly, output, stdout, date } => {
            report::run(days, weekly, monthly, output, stdout, date.as_deref())
        }
        Commands::Logs { command } => logs::run(command),
    }
}
