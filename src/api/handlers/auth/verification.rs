//! Email verification.

use axum::extract::Extension;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use sqlx::PgPool;

use super::error::AuthError;
use super::storage::consume_verification;
use super::types::VerifyEmailRequest;
use super::utils::hash_token;

/// Consume a verification token and mark the account verified.
///
/// The token is deleted as part of being consumed; a second attempt with the
/// same token fails with 404.
#[utoipa::path(
    post,
    path = "/v1/auth/verify-email",
    request_body = VerifyEmailRequest,
    responses(
        (status = 204, description = "Email verified"),
        (status = 400, description = "Validation error", body = String),
        (status = 404, description = "Invalid, expired, or already-used token", body = String)
    ),
    tag = "auth"
)]
pub async fn verify_email(
    pool: Extension<PgPool>,
    payload: Option<Json<VerifyEmailRequest>>,
) -> Result<impl IntoResponse, AuthError> {
    let Some(Json(request)) = payload else {
        return Err(AuthError::Invalid("Missing payload".to_string()));
    };

    let token = request.token.trim();
    if token.is_empty() {
        return Err(AuthError::Invalid("Missing token".to_string()));
    }

    if consume_verification(&pool, &hash_token(token)).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AuthError::NotFound)
    }
}
