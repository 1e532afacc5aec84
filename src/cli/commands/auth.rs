use clap::{Arg, ArgMatches, Command};

#[derive(Debug, Clone)]
pub struct OutboxOptions {
    pub poll_seconds: u64,
    pub batch_size: usize,
    pub max_attempts: u32,
    pub backoff_base_seconds: u64,
    pub backoff_max_seconds: u64,
}

#[derive(Debug, Clone)]
pub struct SweepOptions {
    pub interval_seconds: u64,
    pub session_retention_seconds: u64,
}

#[derive(Debug, Clone)]
pub struct Options {
    pub frontend_base_url: String,
    pub access_ttl_seconds: i64,
    pub refresh_ttl_seconds: i64,
    pub reset_token_ttl_seconds: i64,
    pub verify_token_ttl_seconds: i64,
    pub email_outbox: OutboxOptions,
    pub sweep: SweepOptions,
}

impl Options {
    /// Parse auth arguments from matches.
    ///
    /// # Errors
    /// Returns an error if required arguments are missing.
    pub fn parse(matches: &ArgMatches) -> anyhow::Result<Self> {
        let read_string = |id: &str| -> anyhow::Result<String> {
            matches
                .get_one::<String>(id)
                .cloned()
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| anyhow::anyhow!("missing required argument: --{id}"))
        };
        let read_i64 = |id: &str| -> anyhow::Result<i64> {
            matches
                .get_one::<i64>(id)
                .copied()
                .ok_or_else(|| anyhow::anyhow!("missing required argument: --{id}"))
        };
        let read_u64 = |id: &str| -> anyhow::Result<u64> {
            matches
                .get_one::<u64>(id)
                .copied()
                .ok_or_else(|| anyhow::anyhow!("missing required argument: --{id}"))
        };

        Ok(Self {
            frontend_base_url: read_string("frontend-base-url")?,
            access_ttl_seconds: read_i64("access-ttl-seconds")?,
            refresh_ttl_seconds: read_i64("refresh-ttl-seconds")?,
            reset_token_ttl_seconds: read_i64("reset-token-ttl-seconds")?,
            verify_token_ttl_seconds: read_i64("verify-token-ttl-seconds")?,
            email_outbox: OutboxOptions {
                poll_seconds: read_u64("email-outbox-poll-seconds")?,
                batch_size: matches
                    .get_one::<usize>("email-outbox-batch-size")
                    .copied()
                    .ok_or_else(|| {
                        anyhow::anyhow!("missing required argument: --email-outbox-batch-size")
                    })?,
                max_attempts: matches
                    .get_one::<u32>("email-outbox-max-attempts")
                    .copied()
                    .ok_or_else(|| {
                        anyhow::anyhow!("missing required argument: --email-outbox-max-attempts")
                    })?,
                backoff_base_seconds: read_u64("email-outbox-backoff-base-seconds")?,
                backoff_max_seconds: read_u64("email-outbox-backoff-max-seconds")?,
            },
            sweep: SweepOptions {
                interval_seconds: read_u64("sweep-interval-seconds")?,
                session_retention_seconds: read_u64("sweep-session-retention-seconds")?,
            },
        })
    }
}

pub fn with_args(command: Command) -> Command {
    let command = with_auth_token_args(command);
    let command = with_auth_outbox_args(command);
    with_auth_sweep_args(command)
}

fn with_auth_token_args(command: Command) -> Command {
    command
        .arg(
            Arg::new("frontend-base-url")
                .long("frontend-base-url")
                .help("Frontend base URL used for verification and reset links")
                .env("GATEHOUSE_FRONTEND_BASE_URL")
                .default_value("https://gatehouse.dev"),
        )
        .arg(
            Arg::new("access-ttl-seconds")
                .long("access-ttl-seconds")
                .help("Access token TTL in seconds")
                .env("GATEHOUSE_ACCESS_TTL_SECONDS")
                .default_value("600")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new("refresh-ttl-seconds")
                .long("refresh-ttl-seconds")
                .help("Refresh session TTL in seconds")
                .env("GATEHOUSE_REFRESH_TTL_SECONDS")
                .default_value("2592000")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new("reset-token-ttl-seconds")
                .long("reset-token-ttl-seconds")
                .help("Password reset token TTL in seconds")
                .env("GATEHOUSE_RESET_TOKEN_TTL_SECONDS")
                .default_value("3600")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new("verify-token-ttl-seconds")
                .long("verify-token-ttl-seconds")
                .help("Email verification token TTL in seconds")
                .env("GATEHOUSE_VERIFY_TOKEN_TTL_SECONDS")
                .default_value("86400")
                .value_parser(clap::value_parser!(i64)),
        )
}

fn with_auth_outbox_args(command: Command) -> Command {
    command
        .arg(
            Arg::new("email-outbox-poll-seconds")
                .long("email-outbox-poll-seconds")
                .help("Email outbox poll interval in seconds")
                .env("GATEHOUSE_EMAIL_OUTBOX_POLL_SECONDS")
                .default_value("5")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new("email-outbox-batch-size")
                .long("email-outbox-batch-size")
                .help("Email outbox batch size per poll")
                .env("GATEHOUSE_EMAIL_OUTBOX_BATCH_SIZE")
                .default_value("10")
                .value_parser(clap::value_parser!(usize)),
        )
        .arg(
            Arg::new("email-outbox-max-attempts")
                .long("email-outbox-max-attempts")
                .help("Max attempts before marking an email as failed")
                .env("GATEHOUSE_EMAIL_OUTBOX_MAX_ATTEMPTS")
                .default_value("5")
                .value_parser(clap::value_parser!(u32)),
        )
        .arg(
            Arg::new("email-outbox-backoff-base-seconds")
                .long("email-outbox-backoff-base-seconds")
                .help("Base delay for email outbox retry backoff")
                .env("GATEHOUSE_EMAIL_OUTBOX_BACKOFF_BASE_SECONDS")
                .default_value("5")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new("email-outbox-backoff-max-seconds")
                .long("email-outbox-backoff-max-seconds")
                .help("Max delay for email outbox retry backoff")
                .env("GATEHOUSE_EMAIL_OUTBOX_BACKOFF_MAX_SECONDS")
                .default_value("300")
                .value_parser(clap::value_parser!(u64)),
        )
}

fn with_auth_sweep_args(command: Command) -> Command {
    command
        .arg(
            Arg::new("sweep-interval-seconds")
                .long("sweep-interval-seconds")
                .help("Interval between session sweep passes in seconds")
                .env("GATEHOUSE_SWEEP_INTERVAL_SECONDS")
                .default_value("900")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new("sweep-session-retention-seconds")
                .long("sweep-session-retention-seconds")
                .help("How long revoked/expired sessions are kept before deletion")
                .env("GATEHOUSE_SWEEP_SESSION_RETENTION_SECONDS")
                .default_value("86400")
                .value_parser(clap::value_parser!(u64)),
        )
}
