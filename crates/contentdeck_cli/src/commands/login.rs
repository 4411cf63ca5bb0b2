//! Token login and logout.
//!
//! A token is written to the config file and cached in shared storage, so
//! other clients using the same storage directory are signed in too.

use std::io::{self, BufRead, Write};
use std::sync::Arc;

use console::{Term, style};
use contentdeck::auth::{login_url, parse_callback_message};
use contentdeck::{FileStorage, StoredToken};

use crate::commands::shared::{Context, success, warning};
use crate::config::Config;

/// Handle `contentdeck login`.
pub(crate) fn handle_login(
    token: Option<String>,
    browser: bool,
    config: &Config,
) -> Result<(), Box<dyn std::error::Error>> {
    let token = match token {
        Some(token) => token.trim().to_string(),
        None if browser => {
            let url = worker_url(config)?;
            let _ = open::that(&url);
            login_with_worker(config, &url, &mut io::stdin().lock())?
        }
        None => prompt_for_token()?,
    };
    if token.is_empty() {
        return Err("No token given".into());
    }

    let path = Config::save_github_token(&token)?;
    success(format!("Token saved to {}", path.display()));

    match config.storage_dir() {
        Some(dir) => {
            let storage = Arc::new(FileStorage::open(&dir)?);
            StoredToken::new(storage).save(&token)?;
            tracing::debug!(dir = %dir.display(), "Cached token in shared storage");
        }
        None => warning("No storage directory; token not shared with other clients"),
    }

    Ok(())
}

/// Handle `contentdeck logout`.
pub(crate) fn handle_logout(ctx: &Context) -> Result<(), Box<dyn std::error::Error>> {
    StoredToken::new(ctx.storage.clone()).clear()?;
    success("Cleared cached token");
    if Config::load().github_token().is_some() {
        warning("A token is still set in the config file or environment");
    }
    Ok(())
}

fn prompt_for_token() -> Result<String, Box<dyn std::error::Error>> {
    let term = Term::stdout();
    if !term.is_term() {
        return Err("No token given; pass --token or --browser".into());
    }
    term.write_str("GitHub token: ")?;
    Ok(term.read_secure_line()?)
}

fn worker_url(config: &Config) -> Result<String, Box<dyn std::error::Error>> {
    let origin = config.site_url();
    Ok(login_url(
        &config.auth.worker,
        origin.trim_end_matches('/'),
        &config.auth.scope,
        config.auth.client.as_deref(),
    )?
    .to_string())
}

/// Print the OAuth worker URL, then read the worker's callback message.
fn login_with_worker(
    config: &Config,
    url: &str,
    input: &mut impl BufRead,
) -> Result<String, Box<dyn std::error::Error>> {
    println!("Open this URL to authorize contentdeck:\n\n    {}\n", style(&url).cyan());
    print!("Paste the message shown after authorizing: ");
    io::stdout().flush()?;

    let mut line = String::new();
    input.read_line(&mut line)?;

    // The message is pasted from the worker's own page.
    Ok(parse_callback_message(
        &config.auth.worker,
        &config.auth.worker,
        line.trim(),
    )?)
}
