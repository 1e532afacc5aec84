//! Authenticated principal extraction from bearer access tokens.
//!
//! Verification is purely local: signature plus expiry against the public
//! key, no store lookup. The claims are the identity assertion.

use axum::http::{header::AUTHORIZATION, HeaderMap};
use uuid::Uuid;

use super::error::AuthError;
use super::state::AuthState;
use super::types::Role;
use super::utils::now_unix;

/// Caller identity derived from a verified access token.
#[derive(Clone, Debug)]
pub struct Principal {
    pub account_id: Uuid,
    pub username: String,
    pub role: Role,
}

impl Principal {
    /// Privilege checks are rank comparisons, not string matching.
    #[must_use]
    pub fn has_at_least(&self, role: Role) -> bool {
        self.role >= role
    }
}

/// Verify the `Authorization: Bearer` header into a principal.
pub(super) fn require_auth(headers: &HeaderMap, state: &AuthState) -> Result<Principal, AuthError> {
    let token = extract_bearer_token(headers).ok_or(AuthError::Unauthorized)?;
    let claims = state
        .keys()
        .verify(&token, now_unix())
        .map_err(|_| AuthError::Unauthorized)?;
    let account_id = Uuid::parse_str(&claims.sub).map_err(|_| AuthError::Unauthorized)?;
    Ok(Principal {
        account_id,
        username: claims.username,
        role: claims.role,
    })
}

fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let trimmed = value.trim();
    let token = trimmed
        .strip_prefix("Bearer ")
        .or_else(|| trimmed.strip_prefix("bearer "))?
        .trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn bearer_extraction_handles_casing_and_whitespace() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer  abc "));
        assert_eq!(extract_bearer_token(&headers), Some("abc".to_string()));

        headers.insert(AUTHORIZATION, HeaderValue::from_static("bearer xyz"));
        assert_eq!(extract_bearer_token(&headers), Some("xyz".to_string()));

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic xyz"));
        assert_eq!(extract_bearer_token(&headers), None);

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert_eq!(extract_bearer_token(&headers), None);
    }

    #[test]
    fn principal_rank_checks() {
        let principal = Principal {
            account_id: Uuid::nil(),
            username: "mod".to_string(),
            role: Role::Moderator,
        };
        assert!(principal.has_at_least(Role::Member));
        assert!(principal.has_at_least(Role::Moderator));
        assert!(!principal.has_at_least(Role::Admin));
    }
}
