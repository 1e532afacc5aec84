//! Login: credential verification and session creation.

use axum::extract::Extension;
use axum::http::{header::SET_COOKIE, HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use sqlx::PgPool;
use std::sync::Arc;

use super::error::AuthError;
use super::password::verify_password;
use super::session::refresh_cookie;
use super::state::AuthState;
use super::storage::{insert_session, lookup_credentials};
use super::types::{AccountResponse, LoginRequest, TokenResponse};
use super::utils::{extract_client_ip, extract_user_agent, normalize_email};

/// Authenticate by username or email and open a refresh session.
///
/// Unknown identifier and wrong password produce the identical failure;
/// callers cannot probe which half was wrong.
#[utoipa::path(
    post,
    path = "/v1/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Authenticated; token pair issued", body = TokenResponse),
        (status = 400, description = "Validation error", body = String),
        (status = 401, description = "Invalid credentials", body = String)
    ),
    tag = "auth"
)]
pub async fn login(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<LoginRequest>>,
) -> Result<impl IntoResponse, AuthError> {
    let Some(Json(request)) = payload else {
        return Err(AuthError::Invalid("Missing payload".to_string()));
    };

    let identifier = request.identifier.trim();
    if identifier.is_empty() || request.password.is_empty() {
        return Err(AuthError::Unauthorized);
    }

    // The identifier may be either form; normalize the email shape and try both.
    let email = normalize_email(identifier);
    let username = identifier.to_lowercase();
    let Some((account, password_hash)) = lookup_credentials(&pool, &email, &username).await? else {
        return Err(AuthError::Unauthorized);
    };

    if !verify_password(&request.password, &password_hash) {
        return Err(AuthError::Unauthorized);
    }

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

    // The raw refresh token leaves the server exactly once, in this cookie.
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
