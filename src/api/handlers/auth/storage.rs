//! Database operations for accounts, sessions, and one-time tokens.
//!
//! Every state transition here is a single conditionally-guarded statement
//! (`UPDATE ... WHERE ... RETURNING`, `DELETE ... RETURNING`, insert against
//! a unique constraint). Concurrent requests racing on the same row are
//! decided by the store, not by application-level locking: at most one of
//! two refreshes presenting the same token can claim the rotation.

use anyhow::{anyhow, Context, Result};
use serde_json::json;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::Instrument;
use uuid::Uuid;

use super::state::AuthConfig;
use super::types::Role;
use super::utils::{
    build_action_url, generate_token, hash_token, unique_violation_constraint,
};

/// Kinds of single-use, time-limited tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum TokenKind {
    EmailVerify,
    PasswordReset,
}

impl TokenKind {
    pub(super) const fn as_str(self) -> &'static str {
        match self {
            Self::EmailVerify => "email_verify",
            Self::PasswordReset => "password_reset",
        }
    }

    /// Frontend path the emailed link points at.
    const fn action_path(self) -> &'static str {
        match self {
            Self::EmailVerify => "verify-email",
            Self::PasswordReset => "reset-password",
        }
    }

    /// Outbox template key for the email dispatcher.
    const fn template(self) -> &'static str {
        match self {
            Self::EmailVerify => "verify_email",
            Self::PasswordReset => "reset_password",
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct AccountRecord {
    pub(crate) id: Uuid,
    pub(crate) username: String,
    pub(crate) email: String,
    pub(crate) display_name: String,
    pub(crate) role: Role,
    pub(crate) verified: bool,
    pub(crate) created_at_unix: i64,
}

fn account_from_row(row: &PgRow) -> AccountRecord {
    AccountRecord {
        id: row.get("id"),
        username: row.get("username"),
        email: row.get("email"),
        display_name: row.get("display_name"),
        role: row.get("role"),
        verified: row.get("verified"),
        created_at_unix: row.get("created_at_unix"),
    }
}

const ACCOUNT_COLUMNS: &str = r"
    id, username, email, display_name, role, verified,
    EXTRACT(EPOCH FROM created_at)::BIGINT AS created_at_unix
";

/// Outcome of an account insert.
#[derive(Debug)]
pub(super) enum RegisterOutcome {
    Created(AccountRecord),
    UsernameTaken,
    EmailTaken,
}

/// Freshly created refresh session; the raw token exists only here.
pub(super) struct NewSession {
    pub(super) raw_token: String,
    pub(super) expires_at_unix: i64,
}

/// Result of attempting to claim a refresh rotation.
#[derive(Debug)]
pub(super) enum RefreshClaim {
    /// The session was active; it is now revoked and ready to be replaced.
    Rotated { account_id: Uuid },
    /// The digest exists but its session was already revoked or has expired.
    /// This is the replay/theft signal.
    Replayed { account_id: Uuid },
    /// The digest is unknown.
    Unknown,
}

/// Create an account plus its email-verification token and outbox row in one
/// transaction. Uniqueness conflicts are reported per constraint.
pub(super) async fn insert_account(
    pool: &PgPool,
    username: &str,
    email: &str,
    password_hash: &str,
    display_name: &str,
    config: &AuthConfig,
) -> Result<RegisterOutcome> {
    let mut tx = pool.begin().await.context("begin register transaction")?;

    let query = format!(
        r"
        INSERT INTO accounts (id, username, email, password_hash, display_name)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING {ACCOUNT_COLUMNS}
    "
    );
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query.as_str()
    );
    let row = sqlx::query(&query)
        .bind(Uuid::now_v7())
        .bind(username)
        .bind(email)
        .bind(password_hash)
        .bind(display_name)
        .fetch_one(&mut *tx)
        .instrument(span)
        .await;

    let account = match row {
        Ok(row) => account_from_row(&row),
        Err(err) => {
            let constraint = unique_violation_constraint(&err);
            let _ = tx.rollback().await;
            return match constraint.as_deref() {
                Some("accounts_username_key") => Ok(RegisterOutcome::UsernameTaken),
                Some("accounts_email_key") => Ok(RegisterOutcome::EmailTaken),
                _ => Err(err).context("failed to insert account"),
            };
        }
    };

    let _token = insert_one_time_email(
        &mut tx,
        account.id,
        email,
        TokenKind::EmailVerify,
        config.verify_token_ttl_seconds(),
        config,
    )
    .await?;

    tx.commit().await.context("commit register transaction")?;

    Ok(RegisterOutcome::Created(account))
}

/// Generate a one-time token, persist its digest, and enqueue the matching
/// email in the outbox, all inside the caller's transaction.
async fn insert_one_time_email(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    account_id: Uuid,
    email: &str,
    kind: TokenKind,
    ttl_seconds: i64,
    config: &AuthConfig,
) -> Result<String> {
    let token = generate_token()?;
    let token_hash = hash_token(&token);

    let query = r"
        INSERT INTO one_time_tokens (token_hash, account_id, kind, expires_at)
        VALUES ($1, $2, $3, NOW() + ($4 * INTERVAL '1 second'))
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    sqlx::query(query)
        .bind(&token_hash)
        .bind(account_id)
        .bind(kind.as_str())
        .bind(ttl_seconds)
        .execute(&mut **tx)
        .instrument(span)
        .await
        .context("failed to insert one-time token")?;

    let action_url = build_action_url(config.frontend_base_url(), kind.action_path(), &token);
    let body = serde_json::to_string(&json!({
        "email": email,
        "action_url": action_url,
    }))
    .context("failed to serialize email body")?;

    let query = r"
        INSERT INTO outbox_emails (recipient, kind, body_json)
        VALUES ($1, $2, $3::jsonb)
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    sqlx::query(query)
        .bind(email)
        .bind(kind.template())
        .bind(body)
        .execute(&mut **tx)
        .instrument(span)
        .await
        .context("failed to insert outbox email")?;

    Ok(token)
}

/// Resolve a login identifier (email or username) to the account and its
/// password hash. Soft-deleted accounts never resolve.
pub(super) async fn lookup_credentials(
    pool: &PgPool,
    email_normalized: &str,
    username: &str,
) -> Result<Option<(AccountRecord, String)>> {
    let query = format!(
        r"
        SELECT {ACCOUNT_COLUMNS}, password_hash
        FROM accounts
        WHERE deleted_at IS NULL
          AND (email = $1 OR username = $2)
        LIMIT 1
    "
    );
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query.as_str()
    );
    let row = sqlx::query(&query)
        .bind(email_normalized)
        .bind(username)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to lookup credentials")?;

    Ok(row.map(|row| {
        let hash: String = row.get("password_hash");
        (account_from_row(&row), hash)
    }))
}

pub(super) async fn fetch_account(pool: &PgPool, account_id: Uuid) -> Result<Option<AccountRecord>> {
    let query = format!(
        r"
        SELECT {ACCOUNT_COLUMNS}
        FROM accounts
        WHERE id = $1 AND deleted_at IS NULL
    "
    );
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query.as_str()
    );
    let row = sqlx::query(&query)
        .bind(account_id)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to fetch account")?;

    Ok(row.map(|row| account_from_row(&row)))
}

pub(super) async fn fetch_password_hash(pool: &PgPool, account_id: Uuid) -> Result<Option<String>> {
    let query = r"
        SELECT password_hash
        FROM accounts
        WHERE id = $1 AND deleted_at IS NULL
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(account_id)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to fetch password hash")?;

    Ok(row.map(|row| row.get("password_hash")))
}

/// Create a refresh session, returning the raw token exactly once.
///
/// Retries a handful of times on the (cosmically unlikely) digest collision
/// rather than surfacing it to the caller.
pub(super) async fn insert_session(
    pool: &PgPool,
    account_id: Uuid,
    user_agent: &str,
    ip_address: &str,
    ttl_seconds: i64,
) -> Result<NewSession> {
    let query = r"
        INSERT INTO sessions (id, account_id, refresh_hash, user_agent, ip_address, expires_at)
        VALUES ($1, $2, $3, $4, $5, NOW() + ($6 * INTERVAL '1 second'))
        RETURNING EXTRACT(EPOCH FROM expires_at)::BIGINT AS expires_at_unix
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );

    for _ in 0..3 {
        let token = generate_token()?;
        let token_hash = hash_token(&token);
        let result = sqlx::query(query)
            .bind(Uuid::now_v7())
            .bind(account_id)
            .bind(&token_hash)
            .bind(user_agent)
            .bind(ip_address)
            .bind(ttl_seconds)
            .fetch_one(pool)
            .instrument(span.clone())
            .await;

        match result {
            Ok(row) => {
                return Ok(NewSession {
                    raw_token: token,
                    expires_at_unix: row.get("expires_at_unix"),
                })
            }
            Err(err) if unique_violation_constraint(&err).is_some() => {}
            Err(err) => return Err(err).context("failed to insert session"),
        }
    }

    Err(anyhow!("failed to generate unique refresh token"))
}

/// Atomically claim a refresh rotation.
///
/// The UPDATE both checks usability (`NOT revoked AND expires_at > NOW()`)
/// and revokes the row in one statement, so of two requests racing on the
/// same token exactly one sees `Rotated`. A miss falls through to a probe
/// that distinguishes a replayed digest from an unknown one. The probe only
/// matches revoked rows: a session that lapsed past its TTL without ever
/// being rotated is a benign terminal state, not a compromise signal, and
/// classifies as `Unknown`.
pub(super) async fn claim_refresh(pool: &PgPool, token_hash: &[u8]) -> Result<RefreshClaim> {
    let query = r"
        UPDATE sessions
        SET revoked = TRUE
        WHERE refresh_hash = $1
          AND revoked = FALSE
          AND expires_at > NOW()
        RETURNING account_id
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(token_hash)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to claim refresh rotation")?;

    if let Some(row) = row {
        return Ok(RefreshClaim::Rotated {
            account_id: row.get("account_id"),
        });
    }

    let query = r"
        SELECT account_id
        FROM sessions
        WHERE refresh_hash = $1
          AND revoked = TRUE
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(token_hash)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to probe refresh token")?;

    Ok(row.map_or(RefreshClaim::Unknown, |row| RefreshClaim::Replayed {
        account_id: row.get("account_id"),
    }))
}

/// Revoke a single session by digest. Idempotent: revoking an unknown or
/// already-revoked session is not an error.
pub(super) async fn revoke_session(pool: &PgPool, token_hash: &[u8]) -> Result<()> {
    let query = r"
        UPDATE sessions
        SET revoked = TRUE
        WHERE refresh_hash = $1
          AND revoked = FALSE
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(token_hash)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to revoke session")?;
    Ok(())
}

/// Revoke every non-revoked session for an account (password reset, replay
/// response, manual security action).
pub(super) async fn revoke_all_sessions(pool: &PgPool, account_id: Uuid) -> Result<u64> {
    let query = r"
        UPDATE sessions
        SET revoked = TRUE
        WHERE account_id = $1
          AND revoked = FALSE
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    let result = sqlx::query(query)
        .bind(account_id)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to revoke account sessions")?;
    Ok(result.rows_affected())
}

/// Revoke every session for the account except the one backing `keep_hash`.
/// Used by in-session password change.
pub(super) async fn revoke_other_sessions(
    pool: &PgPool,
    account_id: Uuid,
    keep_hash: &[u8],
) -> Result<u64> {
    let query = r"
        UPDATE sessions
        SET revoked = TRUE
        WHERE account_id = $1
          AND refresh_hash <> $2
          AND revoked = FALSE
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    let result = sqlx::query(query)
        .bind(account_id)
        .bind(keep_hash)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to revoke other sessions")?;
    Ok(result.rows_affected())
}

/// Enqueue a password-reset token for the account behind `email`, if one
/// exists. The caller answers identically either way; nothing here may leak
/// whether the email resolved.
pub(super) async fn request_password_reset(
    pool: &PgPool,
    email: &str,
    config: &AuthConfig,
) -> Result<()> {
    let mut tx = pool.begin().await.context("begin reset-request transaction")?;

    let query = r"
        SELECT id, email
        FROM accounts
        WHERE email = $1 AND deleted_at IS NULL
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(email)
        .fetch_optional(&mut *tx)
        .instrument(span)
        .await
        .context("failed to lookup account for reset")?;

    let Some(row) = row else {
        tx.commit().await.context("commit reset-request noop")?;
        return Ok(());
    };

    let account_id: Uuid = row.get("id");
    let email: String = row.get("email");
    let _token = insert_one_time_email(
        &mut tx,
        account_id,
        &email,
        TokenKind::PasswordReset,
        config.reset_token_ttl_seconds(),
        config,
    )
    .await?;

    tx.commit().await.context("commit reset-request transaction")?;
    Ok(())
}

/// Consume a one-time token: delete-and-return in a single statement, which
/// makes replay of the token impossible. Expired entries never match.
async fn consume_one_time_token(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    token_hash: &[u8],
    kind: TokenKind,
) -> Result<Option<Uuid>> {
    let query = r"
        DELETE FROM one_time_tokens
        WHERE token_hash = $1
          AND kind = $2
          AND expires_at > NOW()
        RETURNING account_id
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(token_hash)
        .bind(kind.as_str())
        .fetch_optional(&mut **tx)
        .instrument(span)
        .await
        .context("failed to consume one-time token")?;

    Ok(row.map(|row| row.get("account_id")))
}

/// Complete a password reset: consume the token, store the new hash, and
/// revoke every session for the account, atomically. Returns false when the
/// token was invalid, expired, or already used.
pub(super) async fn reset_password(
    pool: &PgPool,
    token_hash: &[u8],
    new_password_hash: &str,
) -> Result<bool> {
    let mut tx = pool.begin().await.context("begin reset transaction")?;

    let Some(account_id) =
        consume_one_time_token(&mut tx, token_hash, TokenKind::PasswordReset).await?
    else {
        let _ = tx.rollback().await;
        return Ok(false);
    };

    update_password_tx(&mut tx, account_id, new_password_hash).await?;

    // A reset must leave no device logged in.
    let query = r"
        UPDATE sessions
        SET revoked = TRUE
        WHERE account_id = $1
          AND revoked = FALSE
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(account_id)
        .execute(&mut *tx)
        .instrument(span)
        .await
        .context("failed to revoke sessions after reset")?;

    tx.commit().await.context("commit reset transaction")?;
    Ok(true)
}

async fn update_password_tx(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    account_id: Uuid,
    new_password_hash: &str,
) -> Result<()> {
    let query = r"
        UPDATE accounts
        SET password_hash = $2,
            updated_at = NOW()
        WHERE id = $1
          AND deleted_at IS NULL
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(account_id)
        .bind(new_password_hash)
        .execute(&mut **tx)
        .instrument(span)
        .await
        .context("failed to update password hash")?;
    Ok(())
}

/// Store a new password hash for an authenticated change.
pub(super) async fn update_password(
    pool: &PgPool,
    account_id: Uuid,
    new_password_hash: &str,
) -> Result<()> {
    let mut tx = pool.begin().await.context("begin password-change transaction")?;
    update_password_tx(&mut tx, account_id, new_password_hash).await?;
    tx.commit().await.context("commit password-change transaction")?;
    Ok(())
}

/// Consume an email-verification token and flip the verified flag.
/// The flag moves false -> true exactly once; the token is gone afterwards.
pub(super) async fn consume_verification(pool: &PgPool, token_hash: &[u8]) -> Result<bool> {
    let mut tx = pool.begin().await.context("begin verify transaction")?;

    let Some(account_id) =
        consume_one_time_token(&mut tx, token_hash, TokenKind::EmailVerify).await?
    else {
        let _ = tx.rollback().await;
        return Ok(false);
    };

    let query = r"
        UPDATE accounts
        SET verified = TRUE,
            updated_at = NOW()
        WHERE id = $1
          AND deleted_at IS NULL
          AND verified = FALSE
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(account_id)
        .execute(&mut *tx)
        .instrument(span)
        .await
        .context("failed to mark account verified")?;

    tx.commit().await.context("commit verify transaction")?;
    Ok(true)
}
