//! Error taxonomy for identity operations.
//!
//! Storage-layer errors never cross the service boundary: anything that is
//! not an intentional, disclosable failure is wrapped into `Internal`, logged
//! with full context server-side, and surfaced to the caller as a generic
//! message. `Unauthorized` uses one fixed message for every root cause in its
//! category so callers cannot distinguish them.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tracing::error;

pub const INVALID_CREDENTIALS: &str = "Invalid credentials";

#[derive(Debug, Error)]
pub enum AuthError {
    /// Uniqueness conflicts are safe to disclose with a per-field message.
    #[error("{0}")]
    Conflict(&'static str),
    /// Bad credentials, invalid/expired/revoked refresh token, bad current
    /// password. One message for all of them.
    #[error("{INVALID_CREDENTIALS}")]
    Unauthorized,
    #[error("Not found")]
    NotFound,
    /// Malformed or missing request fields.
    #[error("{0}")]
    Invalid(String),
    #[error("Internal error")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Invalid(_) => StatusCode::BAD_REQUEST,
            Self::Internal(err) => {
                error!("internal identity error: {err:#}");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, self.to_string()).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_match_taxonomy() {
        assert_eq!(
            AuthError::Conflict("Username already taken")
                .into_response()
                .status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            AuthError::Unauthorized.into_response().status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AuthError::NotFound.into_response().status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AuthError::Invalid("Missing payload".to_string())
                .into_response()
                .status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AuthError::Internal(anyhow::anyhow!("database exploded"))
                .into_response()
                .status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn internal_error_hides_the_cause() {
        let err = AuthError::Internal(anyhow::anyhow!("connection refused to 10.0.0.5"));
        assert_eq!(err.to_string(), "Internal error");
    }

    #[test]
    fn unauthorized_message_is_uniform() {
        assert_eq!(AuthError::Unauthorized.to_string(), INVALID_CREDENTIALS);
    }
}
