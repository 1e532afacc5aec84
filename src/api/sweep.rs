//! Periodic cleanup of dead sessions and expired one-time tokens.
//!
//! Revoked or expired session rows stay behind after rotation and logout so
//! that replayed refresh tokens can still be recognized for a while. The
//! sweeper deletes them once they are older than the retention window, and
//! drops expired one-time tokens outright.
use anyhow::{Context, Result};
use sqlx::PgPool;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, info_span, Instrument};

const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60 * 15);
const DEFAULT_SESSION_RETENTION: Duration = Duration::from_secs(60 * 60 * 24);

#[derive(Clone, Copy, Debug)]
pub struct SweeperConfig {
    interval: Duration,
    session_retention: Duration,
}

impl SweeperConfig {
    /// Default sweeper config: run every 15 minutes, keep dead sessions for
    /// 24 hours before deleting them.
    #[must_use]
    pub fn new() -> Self {
        Self {
            interval: DEFAULT_SWEEP_INTERVAL,
            session_retention: DEFAULT_SESSION_RETENTION,
        }
    }

    #[must_use]
    pub fn with_interval_seconds(mut self, seconds: u64) -> Self {
        self.interval = Duration::from_secs(seconds.max(1));
        self
    }

    #[must_use]
    pub fn with_session_retention_seconds(mut self, seconds: u64) -> Self {
        self.session_retention = Duration::from_secs(seconds);
        self
    }

    #[must_use]
    pub fn interval(&self) -> Duration {
        self.interval
    }

    #[must_use]
    pub fn session_retention(&self) -> Duration {
        self.session_retention
    }
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Spawn a background task that periodically deletes dead rows.
pub fn spawn_sweeper(pool: PgPool, config: SweeperConfig) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let interval = config.interval();

        loop {
            if let Err(err) = sweep_once(&pool, &config).await {
                error!("session sweep failed: {err}");
            }

            sleep(interval).await;
        }
    })
}

async fn sweep_once(pool: &PgPool, config: &SweeperConfig) -> Result<()> {
    let retention_seconds =
        i64::try_from(config.session_retention().as_secs()).unwrap_or(i64::MAX);

    let query = r"
        DELETE FROM sessions
        WHERE (revoked = TRUE OR expires_at <= NOW())
          AND created_at <= NOW() - ($1 * INTERVAL '1 second')
    ";
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE",
        db.statement = query
    );
    let sessions = sqlx::query(query)
        .bind(retention_seconds)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to sweep dead sessions")?;

    let query = r"
        DELETE FROM one_time_tokens
        WHERE expires_at <= NOW()
    ";
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE",
        db.statement = query
    );
    let tokens = sqlx::query(query)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to sweep expired one-time tokens")?;

    debug!(
        sessions_deleted = sessions.rows_affected(),
        tokens_deleted = tokens.rows_affected(),
        "sweep pass finished"
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults_and_overrides() {
        let config = SweeperConfig::new();
        assert_eq!(config.interval(), DEFAULT_SWEEP_INTERVAL);
        assert_eq!(config.session_retention(), DEFAULT_SESSION_RETENTION);

        let config = config
            .with_interval_seconds(30)
            .with_session_retention_seconds(3600);
        assert_eq!(config.interval(), Duration::from_secs(30));
        assert_eq!(config.session_retention(), Duration::from_secs(3600));
    }

    #[test]
    fn interval_never_drops_to_zero() {
        let config = SweeperConfig::new().with_interval_seconds(0);
        assert_eq!(config.interval(), Duration::from_secs(1));
    }
}
