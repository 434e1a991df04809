//! Login, logout and whoami

use anyhow::{anyhow, Result};
use colored::Colorize;
use dialoguer::{Input, Password};

use super::get_context;
use crate::output;
use rollcall_core::ports::IdentityProvider;

pub fn login(email: Option<String>, password: Option<String>) -> Result<()> {
    let ctx = get_context()?;

    if ctx.identity.account_count() == 0 {
        output::warning("No administrator accounts yet. Create one with 'rollcall user add'.");
        return Ok(());
    }

    let email = match email {
        Some(e) => e,
        None => {
            if atty::isnt(atty::Stream::Stdin) {
                anyhow::bail!("--email is required when not running interactively");
            }
            Input::new().with_prompt("Email").interact_text()?
        }
    };
    let password = match password {
        Some(p) => p,
        None => {
            if atty::isnt(atty::Stream::Stdin) {
                anyhow::bail!("--password (or ROLLCALL_PASSWORD) is required when not running interactively");
            }
            Password::new().with_prompt("Password").interact()?
        }
    };

    let user = ctx
        .identity
        .sign_in(&email, &password)
        .map_err(|e| anyhow!(e.user_message()))?;

    println!("{} {}", "Signed in as".green(), user.email.bold());
    Ok(())
}

pub fn logout() -> Result<()> {
    let ctx = get_context()?;
    if ctx.identity.current_user().is_none() {
        output::info("Not signed in.");
        return Ok(());
    }

    ctx.identity
        .sign_out()
        .map_err(|e| anyhow!(e.user_message()))?;
    output::success("Signed out.");
    Ok(())
}

pub fn whoami(json: bool) -> Result<()> {
    let ctx = get_context()?;
    let user = ctx.identity.current_user();

    if json {
        println!("{}", serde_json::json!({ "user": user }));
        return Ok(());
    }

    match user {
        Some(u) => println!("{}", u.email),
        None => output::info("Not signed in."),
    }
    Ok(())
}
