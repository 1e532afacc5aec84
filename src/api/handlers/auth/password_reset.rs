//! Password reset and authenticated password change.

use axum::extract::Extension;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use sqlx::PgPool;
use std::sync::Arc;
use tracing::info;

use super::error::AuthError;
use super::password::{hash_password, verify_password};
use super::principal::require_auth;
use super::session::extract_refresh_token;
use super::state::AuthState;
use super::storage::{
    fetch_password_hash, request_password_reset, reset_password as reset_password_storage,
    revoke_other_sessions, update_password,
};
use super::types::{ChangePasswordRequest, ForgotPasswordRequest, ResetPasswordRequest};
use super::utils::{hash_token, normalize_email, valid_email, valid_password};

/// Request a password-reset email.
///
/// Always answers 204: the caller cannot distinguish "email sent" from
/// "email does not exist".
#[utoipa::path(
    post,
    path = "/v1/auth/password/forgot",
    request_body = ForgotPasswordRequest,
    responses(
        (status = 204, description = "Reset accepted (whether or not the email exists)")
    ),
    tag = "auth"
)]
pub async fn forgot_password(
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<ForgotPasswordRequest>>,
) -> Result<impl IntoResponse, AuthError> {
    let Some(Json(request)) = payload else {
        return Err(AuthError::Invalid("Missing payload".to_string()));
    };

    let email = normalize_email(&request.email);
    if !valid_email(&email) {
        // Invalid shapes also get 204 to keep the response opaque.
        return Ok(StatusCode::NO_CONTENT);
    }

    request_password_reset(&pool, &email, auth_state.config()).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Complete a password reset with a one-time token.
///
/// Consuming the token, storing the new hash, and revoking every session for
/// the account happen atomically; after a reset no device stays logged in.
#[utoipa::path(
    post,
    path = "/v1/auth/password/reset",
    request_body = ResetPasswordRequest,
    responses(
        (status = 204, description = "Password replaced; all sessions revoked"),
        (status = 400, description = "Validation error", body = String),
        (status = 401, description = "Invalid, expired, or already-used token", body = String)
    ),
    tag = "auth"
)]
pub async fn reset_password(
    pool: Extension<PgPool>,
    payload: Option<Json<ResetPasswordRequest>>,
) -> Result<impl IntoResponse, AuthError> {
    let Some(Json(request)) = payload else {
        return Err(AuthError::Invalid("Missing payload".to_string()));
    };

    let token = request.token.trim();
    if token.is_empty() {
        return Err(AuthError::Invalid("Missing token".to_string()));
    }
    if !valid_password(&request.new_password) {
        return Err(AuthError::Invalid("Invalid password".to_string()));
    }

    let new_hash = hash_password(&request.new_password)?;
    if reset_password_storage(&pool, &hash_token(token), &new_hash).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AuthError::Unauthorized)
    }
}

/// Change the password of the authenticated account.
///
/// Requires the current password. Every other session is revoked; the
/// session backing this request's refresh cookie stays alive.
#[utoipa::path(
    post,
    path = "/v1/auth/password/change",
    request_body = ChangePasswordRequest,
    responses(
        (status = 204, description = "Password changed; other sessions revoked"),
        (status = 400, description = "Validation error", body = String),
        (status = 401, description = "Missing bearer token or wrong current password", body = String)
    ),
    tag = "auth"
)]
pub async fn change_password(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<ChangePasswordRequest>>,
) -> Result<impl IntoResponse, AuthError> {
    let principal = require_auth(&headers, &auth_state)?;

    let Some(Json(request)) = payload else {
        return Err(AuthError::Invalid("Missing payload".to_string()));
    };

    // The refresh cookie identifies the session that survives the change.
    let Some(current_refresh) = extract_refresh_token(&headers) else {
        return Err(AuthError::Unauthorized);
    };

    if !valid_password(&request.new_password) {
        return Err(AuthError::Invalid("Invalid password".to_string()));
    }

    let Some(current_hash) = fetch_password_hash(&pool, principal.account_id).await? else {
        return Err(AuthError::Unauthorized);
    };
    if !verify_password(&request.current_password, &current_hash) {
        return Err(AuthError::Unauthorized);
    }

    let new_hash = hash_password(&request.new_password)?;
    update_password(&pool, principal.account_id, &new_hash).await?;

    let revoked = revoke_other_sessions(
        &pool,
        principal.account_id,
        &hash_token(&current_refresh),
    )
    .await?;
    info!(
        account_id = %principal.account_id,
        sessions_revoked = revoked,
        "password changed; other sessions revoked"
    );

    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::super::tests::{auth_state, lazy_pool};
    use super::*;
    use axum::response::IntoResponse;

    #[tokio::test]
    async fn forgot_password_missing_payload() {
        let response = forgot_password(Extension(lazy_pool()), Extension(auth_state()), None)
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn forgot_password_invalid_email_still_accepted() {
        let response = forgot_password(
            Extension(lazy_pool()),
            Extension(auth_state()),
            Some(Json(ForgotPasswordRequest {
                email: "not-an-email".to_string(),
            })),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn reset_password_empty_token() {
        let response = reset_password(
            Extension(lazy_pool()),
            Some(Json(ResetPasswordRequest {
                token: " ".to_string(),
                new_password: "Secret123".to_string(),
            })),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn change_password_requires_bearer_token() {
        let response = change_password(
            HeaderMap::new(),
            Extension(lazy_pool()),
            Extension(auth_state()),
            Some(Json(ChangePasswordRequest {
                current_password: "Secret123".to_string(),
                new_password: "Secret456".to_string(),
            })),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
