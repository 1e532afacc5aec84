//! Command-line argument dispatch and server initialization.
//!
//! This module parses validated CLI arguments and maps them to the appropriate
//! action, such as starting the API server with its full configuration state.

use crate::cli::actions::{server::Args, Action};
use crate::cli::commands::{auth, keys};
use anyhow::{Context, Result};

/// Map validated CLI matches to a server action.
///
/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>("port").copied().unwrap_or(8080);
    let dsn = matches
        .get_one::<String>("dsn")
        .cloned()
        .context("missing required argument: --dsn")?;

    let keys_opts = keys::Options::parse(matches)?;
    let auth_opts = auth::Options::parse(matches)?;

    Ok(Action::Server(Args {
        port,
        dsn,
        token_key_path: keys_opts.token_key_path,
        frontend_base_url: auth_opts.frontend_base_url,
        access_ttl_seconds: auth_opts.access_ttl_seconds,
        refresh_ttl_seconds: auth_opts.refresh_ttl_seconds,
        reset_token_ttl_seconds: auth_opts.reset_token_ttl_seconds,
        verify_token_ttl_seconds: auth_opts.verify_token_ttl_seconds,
        email_outbox_poll_seconds: auth_opts.email_outbox.poll_seconds,
        email_outbox_batch_size: auth_opts.email_outbox.batch_size,
        email_outbox_max_attempts: auth_opts.email_outbox.max_attempts,
        email_outbox_backoff_base_seconds: auth_opts.email_outbox.backoff_base_seconds,
        email_outbox_backoff_max_seconds: auth_opts.email_outbox.backoff_max_seconds,
        sweep_interval_seconds: auth_opts.sweep.interval_seconds,
        sweep_session_retention_seconds: auth_opts.sweep.session_retention_seconds,
    }))
}
