//! User command - manage administrator accounts

use anyhow::Result;
use clap::Subcommand;
use colored::Colorize;
use dialoguer::{Input, Password};

use super::get_context;

#[derive(Subcommand)]
pub enum UserCommands {
    /// Create an administrator account
    Add {
        /// Account email (prompted if omitted)
        #[arg(long)]
        email: Option<String>,
        /// Account password (prompted if omitted)
        #[arg(long, env = "ROLLCALL_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },
}

pub fn run(command: UserCommands) -> Result<()> {
    match command {
        UserCommands::Add { email, password } => add(email, password),
    }
}

fn add(email: Option<String>, password: Option<String>) -> Result<()> {
    let email = match email {
        Some(e) => e,
        None => Input::new().with_prompt("Email").interact_text()?,
    };

    let password = match password {
        Some(p) => p,
        None => Password::new()
            .with_prompt("Password")
            .with_confirmation("Confirm password", "Passwords do not match")
            .interact()?,
    };

    let ctx = get_context()?;
    let user = ctx.identity.register(&email, &password)?;

    println!("{} {}", "Account created:".green(), user.email);
    println!("Sign in with 'rollcall login --email {}'", user.email);
    Ok(())
}
