//! Refresh rotation, logout, and refresh-cookie handling.
//!
//! The refresh token travels only in an `HttpOnly` cookie scoped to the auth
//! endpoints; page script can never read it. Access tokens travel in the
//! `Authorization` header and are held in memory by the client.

use axum::extract::Extension;
use axum::http::{
    header::{InvalidHeaderValue, COOKIE, SET_COOKIE},
    HeaderMap, HeaderValue, StatusCode,
};
use axum::response::IntoResponse;
use axum::Json;
use sqlx::PgPool;
use std::sync::Arc;
use tracing::warn;

use super::error::AuthError;
use super::state::{AuthConfig, AuthState};
use super::storage::{
    claim_refresh, fetch_account, insert_session, revoke_all_sessions, revoke_session,
    RefreshClaim,
};
use super::types::{AccountResponse, TokenResponse};
use super::utils::{extract_client_ip, extract_user_agent, hash_token};

pub(super) const REFRESH_COOKIE_NAME: &str = "gatehouse_refresh";
// Scoped so browsers only attach the cookie to the auth endpoints.
const REFRESH_COOKIE_PATH: &str = "/v1/auth";

/// Rotate a refresh session: the presented token is invalidated and a
/// replacement pair is issued.
///
/// Presenting a token whose session was already rotated or revoked is treated
/// as a compromise signal: reuse after rotation means a second party holds a
/// copy. All sessions for the account are revoked in response. A token that
/// simply lapsed past its TTL is rejected without touching other sessions.
#[utoipa::path(
    post,
    path = "/v1/auth/refresh",
    responses(
        (status = 200, description = "New token pair issued", body = TokenResponse),
        (status = 401, description = "Invalid, expired, or replayed refresh token", body = String)
    ),
    tag = "auth"
)]
pub async fn refresh(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
) -> Result<impl IntoResponse, AuthError> {
    let Some(token) = extract_refresh_token(&headers) else {
        return Err(AuthError::Unauthorized);
    };
    let token_hash = hash_token(&token);

    // Revoke-old strictly precedes insert-new: if the request is abandoned
    // between the two store calls, the account is left with one fewer
    // session, never a duplicated valid pair.
    let account_id = match claim_refresh(&pool, &token_hash).await? {
        RefreshClaim::Rotated { account_id } => account_id,
        RefreshClaim::Replayed { account_id } => {
            let revoked = revoke_all_sessions(&pool, account_id).await?;
            warn!(
                security.event = "refresh_token_replay",
                account_id = %account_id,
                sessions_revoked = revoked,
                client_ip = extract_client_ip(&headers).as_deref().unwrap_or("unknown"),
                "replayed refresh token; all sessions revoked"
            );
            return Err(AuthError::Unauthorized);
        }
        RefreshClaim::Unknown => return Err(AuthError::Unauthorized),
    };

    let Some(account) = fetch_account(&pool, account_id).await? else {
        // Account soft-deleted since login; nothing to rotate onto.
        return Err(AuthError::Unauthorized);
    };

    let user_agent = extract_user_agent(&headers);
    let client_ip = extract_client_ip(&headers).unwrap_or_default();
    let session = insert_session(
        &pool,
        account.id,
        &user_agent,
        &client_ip,
        auth_state.config().refresh_ttl_seconds(),
    )
    .await?;

    let (access_token, expires_in) = auth_state
        .issue_access_token(account.id, &account.username, account.role)
        .map_err(|err| AuthError::Internal(anyhow::anyhow!("failed to sign access token: {err}")))?;

    let cookie = refresh_cookie(auth_state.config(), &session.raw_token)
        .map_err(|err| AuthError::Internal(anyhow::anyhow!("invalid cookie value: {err}")))?;
    let mut response_headers = HeaderMap::new();
    response_headers.insert(SET_COOKIE, cookie);

    let body = TokenResponse {
        access_token,
        token_type: "Bearer".to_string(),
        expires_in,
        refresh_expires_at: session.expires_at_unix,
        account: AccountResponse::from(account),
    };

    Ok((StatusCode::OK, response_headers, Json(body)))
}

/// End the session behind the presented refresh token.
///
/// Idempotent: a missing or already-invalid token still yields 204, since
/// the caller's intent (be logged out) is already satisfied.
#[utoipa::path(
    post,
    path = "/v1/auth/logout",
    responses(
        (status = 204, description = "Session ended and cookie cleared")
    ),
    tag = "auth"
)]
pub async fn logout(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
) -> Result<impl IntoResponse, AuthError> {
    if let Some(token) = extract_refresh_token(&headers) {
        revoke_session(&pool, &hash_token(&token)).await?;
    }

    // Always clear the cookie, even if no session row matched.
    let mut response_headers = HeaderMap::new();
    if let Ok(cookie) = clear_refresh_cookie(auth_state.config()) {
        response_headers.insert(SET_COOKIE, cookie);
    }
    Ok((StatusCode::NO_CONTENT, response_headers))
}

/// Build the refresh cookie: non-script-readable, transport-secure when the
/// frontend is HTTPS, strict cross-site policy, scoped to the auth routes.
pub(super) fn refresh_cookie(
    config: &AuthConfig,
    token: &str,
) -> Result<HeaderValue, InvalidHeaderValue> {
    let max_age = config.refresh_ttl_seconds();
    let mut cookie = format!(
        "{REFRESH_COOKIE_NAME}={token}; Path={REFRESH_COOKIE_PATH}; HttpOnly; SameSite=Strict; Max-Age={max_age}"
    );
    if config.refresh_cookie_secure() {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

pub(super) fn clear_refresh_cookie(config: &AuthConfig) -> Result<HeaderValue, InvalidHeaderValue> {
    let mut cookie = format!(
        "{REFRESH_COOKIE_NAME}=; Path={REFRESH_COOKIE_PATH}; HttpOnly; SameSite=Strict; Max-Age=0"
    );
    if config.refresh_cookie_secure() {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

pub(super) fn extract_refresh_token(headers: &HeaderMap) -> Option<String> {
    let header = headers.get(COOKIE)?;
    let value = header.to_str().ok()?;
    for pair in value.split(';') {
        let trimmed = pair.trim();
        let mut parts = trimmed.splitn(2, '=');
        let key = parts.next()?.trim();
        let val = parts.next()?.trim();
        if key == REFRESH_COOKIE_NAME && !val.is_empty() {
            return Some(val.to_string());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::super::tests::{auth_state, lazy_pool};
    use super::*;
    use axum::response::IntoResponse;

    #[test]
    fn refresh_cookie_attributes() {
        let config = AuthConfig::new("https://app.example.com".to_string());
        let cookie = refresh_cookie(&config, "raw-token").expect("cookie");
        let cookie = cookie.to_str().expect("ascii");
        assert!(cookie.starts_with("gatehouse_refresh=raw-token"));
        assert!(cookie.contains("Path=/v1/auth"));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("SameSite=Strict"));
        assert!(cookie.contains("Secure"));
        assert!(cookie.contains(&format!("Max-Age={}", 30 * 24 * 60 * 60)));
    }

    #[test]
    fn clear_cookie_zeroes_max_age() {
        let config = AuthConfig::new("http://localhost:3000".to_string());
        let cookie = clear_refresh_cookie(&config).expect("cookie");
        let cookie = cookie.to_str().expect("ascii");
        assert!(cookie.contains("Max-Age=0"));
        assert!(!cookie.contains("Secure"));
    }

    #[test]
    fn extract_refresh_token_parses_cookie_header() {
        let mut headers = HeaderMap::new();
        headers.insert(
            COOKIE,
            HeaderValue::from_static("other=1; gatehouse_refresh=raw; theme=dark"),
        );
        assert_eq!(extract_refresh_token(&headers), Some("raw".to_string()));

        headers.insert(COOKIE, HeaderValue::from_static("gatehouse_refresh="));
        assert_eq!(extract_refresh_token(&headers), None);

        assert_eq!(extract_refresh_token(&HeaderMap::new()), None);
    }

    #[tokio::test]
    async fn refresh_without_cookie_is_unauthorized() {
        let response = refresh(
            HeaderMap::new(),
            Extension(lazy_pool()),
            Extension(auth_state()),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn logout_without_cookie_is_no_content() {
        // Idempotency: nothing to revoke still succeeds.
        let response = logout(
            HeaderMap::new(),
            Extension(lazy_pool()),
            Extension(auth_state()),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert!(response.headers().contains_key(SET_COOKIE));
    }
}
