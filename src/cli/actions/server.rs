use crate::{
    api,
    api::handlers::auth::{AuthConfig, AuthState},
    token::TokenKeys,
};
use anyhow::{Context, Result};
use secrecy::{ExposeSecret, SecretSlice};
use std::{fs, sync::Arc};
use tracing::debug;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: String,
    pub token_key_path: String,
    pub frontend_base_url: String,
    pub access_ttl_seconds: i64,
    pub refresh_ttl_seconds: i64,
    pub reset_token_ttl_seconds: i64,
    pub verify_token_ttl_seconds: i64,
    pub email_outbox_poll_seconds: u64,
    pub email_outbox_batch_size: usize,
    pub email_outbox_max_attempts: u32,
    pub email_outbox_backoff_base_seconds: u64,
    pub email_outbox_backoff_max_seconds: u64,
    pub sweep_interval_seconds: u64,
    pub sweep_session_retention_seconds: u64,
}

/// Execute the server action.
/// # Errors
/// Returns an error if the signing key cannot be loaded or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    // The key material stays wrapped until the parse; only the parsed keys
    // live on in AuthState.
    let key_bytes: SecretSlice<u8> = fs::read(&args.token_key_path)
        .with_context(|| format!("Failed to read signing key: {}", args.token_key_path))?
        .into();

    let keys = TokenKeys::from_pem(key_bytes.expose_secret())
        .with_context(|| format!("Invalid signing key: {}", args.token_key_path))?;

    let auth_config = AuthConfig::new(args.frontend_base_url)
        .with_access_ttl_seconds(args.access_ttl_seconds)
        .with_refresh_ttl_seconds(args.refresh_ttl_seconds)
        .with_reset_token_ttl_seconds(args.reset_token_ttl_seconds)
        .with_verify_token_ttl_seconds(args.verify_token_ttl_seconds);

    debug!("Auth config: {:?}", auth_config);

    let auth_state = Arc::new(AuthState::new(auth_config, keys));

    let email_config = api::EmailWorkerConfig::new()
        .with_poll_interval_seconds(args.email_outbox_poll_seconds)
        .with_batch_size(args.email_outbox_batch_size)
        .with_max_attempts(args.email_outbox_max_attempts)
        .with_backoff_base_seconds(args.email_outbox_backoff_base_seconds)
        .with_backoff_max_seconds(args.email_outbox_backoff_max_seconds);

    let sweeper_config = api::SweeperConfig::new()
        .with_interval_seconds(args.sweep_interval_seconds)
        .with_session_retention_seconds(args.sweep_session_retention_seconds);

    api::new(args.port, args.dsn, auth_state, email_config, sweeper_config).await
}
