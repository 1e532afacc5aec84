//! Account registration.

use axum::extract::Extension;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use sqlx::PgPool;
use std::sync::Arc;

use super::error::AuthError;
use super::password::hash_password;
use super::state::AuthState;
use super::storage::{insert_account, RegisterOutcome};
use super::types::{AccountResponse, RegisterRequest};
use super::utils::{normalize_email, valid_email, valid_password, valid_username};

impl From<super::storage::AccountRecord> for AccountResponse {
    fn from(record: super::storage::AccountRecord) -> Self {
        Self {
            id: record.id,
            username: record.username,
            email: record.email,
            display_name: record.display_name,
            role: record.role,
            verified: record.verified,
            created_at: record.created_at_unix,
        }
    }
}

/// Create an account with the lowest-privilege role and a pending email
/// verification. The verification email is dispatched best-effort through
/// the outbox; its delivery never rolls back the registration.
#[utoipa::path(
    post,
    path = "/v1/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account created, verification pending", body = AccountResponse),
        (status = 400, description = "Validation error", body = String),
        (status = 409, description = "Username or email already taken", body = String)
    ),
    tag = "auth"
)]
pub async fn register(
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<RegisterRequest>>,
) -> Result<impl IntoResponse, AuthError> {
    let Some(Json(request)) = payload else {
        return Err(AuthError::Invalid("Missing payload".to_string()));
    };

    let username = request.username.trim().to_lowercase();
    if !valid_username(&username) {
        return Err(AuthError::Invalid("Invalid username".to_string()));
    }

    let email = normalize_email(&request.email);
    if !valid_email(&email) {
        return Err(AuthError::Invalid("Invalid email".to_string()));
    }

    if !valid_password(&request.password) {
        return Err(AuthError::Invalid("Invalid password".to_string()));
    }

    let display_name = request.display_name.trim();
    if display_name.is_empty() || display_name.chars().count() > 64 {
        return Err(AuthError::Invalid("Invalid display name".to_string()));
    }

    let password_hash = hash_password(&request.password)?;

    let outcome = insert_account(
        &pool,
        &username,
        &email,
        &password_hash,
        display_name,
        auth_state.config(),
    )
    .await?;

    match outcome {
        RegisterOutcome::Created(account) => {
            Ok((StatusCode::CREATED, Json(AccountResponse::from(account))))
        }
        // Uniqueness is not itself sensitive; per-field messages are fine here.
        RegisterOutcome::UsernameTaken => Err(AuthError::Conflict("Username already taken")),
        RegisterOutcome::EmailTaken => Err(AuthError::Conflict("Email already registered")),
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::{auth_state, lazy_pool};
    use super::*;
    use axum::response::IntoResponse;

    #[tokio::test]
    async fn register_missing_payload() {
        let response = register(Extension(lazy_pool()), Extension(auth_state()), None)
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn register_rejects_bad_username() {
        let response = register(
            Extension(lazy_pool()),
            Extension(auth_state()),
            Some(Json(RegisterRequest {
                username: "a".to_string(),
                email: "ana@x.com".to_string(),
                password: "Secret123".to_string(),
                display_name: "Ana".to_string(),
            })),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn register_rejects_bad_email() {
        let response = register(
            Extension(lazy_pool()),
            Extension(auth_state()),
            Some(Json(RegisterRequest {
                username: "ana".to_string(),
                email: "not-an-email".to_string(),
                password: "Secret123".to_string(),
                display_name: "Ana".to_string(),
            })),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn register_rejects_short_password() {
        let response = register(
            Extension(lazy_pool()),
            Extension(auth_state()),
            Some(Json(RegisterRequest {
                username: "ana".to_string(),
                email: "ana@x.com".to_string(),
                password: "short".to_string(),
                display_name: "Ana".to_string(),
            })),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
