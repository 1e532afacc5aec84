//! Token generation, validation helpers, and client metadata extraction.

use anyhow::{Context, Result};
use base64::Engine;
use rand::{rngs::OsRng, RngCore};
use regex::Regex;
use sha2::{Digest, Sha256};
use std::time::{SystemTime, UNIX_EPOCH};

const TOKEN_BYTES: usize = 32;

/// Generate an opaque, high-entropy token (refresh tokens and one-time
/// tokens). The raw value is handed to the caller exactly once; only its
/// digest is persisted.
pub(super) fn generate_token() -> Result<String> {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng
        .try_fill_bytes(&mut bytes)
        .context("failed to draw token bytes")?;
    Ok(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes))
}

/// SHA-256 digest of a raw token for at-rest storage and lookup.
///
/// The input is already high-entropy, so a fast hash is the right tool here;
/// slow hashing is reserved for passwords.
pub(crate) fn hash_token(token: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hasher.finalize().to_vec()
}

/// Normalize an email for lookup/uniqueness checks.
pub(super) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Basic email format check on already-normalized input.
pub(super) fn valid_email(email_normalized: &str) -> bool {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").is_ok_and(|regex| regex.is_match(email_normalized))
}

/// Usernames: 3-32 chars, lowercase alphanumerics, underscore, hyphen.
pub(super) fn valid_username(username: &str) -> bool {
    Regex::new(r"^[a-z0-9_-]{3,32}$").is_ok_and(|regex| regex.is_match(username))
}

pub(super) fn valid_password(password: &str) -> bool {
    let length = password.chars().count();
    (8..=128).contains(&length)
}

/// Seconds since the Unix epoch.
pub(crate) fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| i64::try_from(elapsed.as_secs()).unwrap_or(0))
}

/// Build the frontend link included in outbound emails.
pub(super) fn build_action_url(frontend_base_url: &str, path: &str, token: &str) -> String {
    let base = frontend_base_url.trim_end_matches('/');
    format!("{base}/{path}#token={token}")
}

pub(super) fn unique_violation_constraint(err: &sqlx::Error) -> Option<String> {
    match err {
        sqlx::Error::Database(db_err)
            if db_err.code().is_some_and(|code| code.as_ref() == "23505") =>
        {
            db_err.constraint().map(str::to_string)
        }
        _ => None,
    }
}

/// Extract a client IP from common proxy headers for session metadata.
pub(super) fn extract_client_ip(headers: &axum::http::HeaderMap) -> Option<String> {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty());
    if forwarded.is_some() {
        return forwarded.map(str::to_string);
    }
    headers
        .get("x-real-ip")
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

pub(super) fn extract_user_agent(headers: &axum::http::HeaderMap) -> String {
    headers
        .get(axum::http::header::USER_AGENT)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .unwrap_or_default()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderMap, HeaderValue};
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use base64::Engine;

    #[test]
    fn generated_tokens_are_unique_and_url_safe() {
        let first = generate_token().expect("token");
        let second = generate_token().expect("token");
        assert_ne!(first, second);
        let decoded = URL_SAFE_NO_PAD.decode(first.as_bytes()).expect("base64");
        assert_eq!(decoded.len(), TOKEN_BYTES);
    }

    #[test]
    fn hash_token_is_stable_and_collision_visible() {
        let first = hash_token("token");
        let second = hash_token("token");
        let different = hash_token("other");
        assert_eq!(first, second);
        assert_ne!(first, different);
        assert_eq!(first.len(), 32);
    }

    #[test]
    fn normalize_email_trims_and_lowercases() {
        assert_eq!(normalize_email(" Ana@Example.COM "), "ana@example.com");
    }

    #[test]
    fn valid_email_checks_shape() {
        assert!(valid_email("ana@x.com"));
        assert!(!valid_email("not-an-email"));
        assert!(!valid_email("missing-domain@"));
    }

    #[test]
    fn valid_username_rules() {
        assert!(valid_username("ana"));
        assert!(valid_username("ana_99"));
        assert!(!valid_username("an"));
        assert!(!valid_username("Ana"));
        assert!(!valid_username("name with spaces"));
    }

    #[test]
    fn valid_password_length_bounds() {
        assert!(valid_password("Secret123"));
        assert!(!valid_password("short"));
        assert!(!valid_password(&"x".repeat(129)));
    }

    #[test]
    fn build_action_url_trims_trailing_slash() {
        let url = build_action_url("https://app.example.com/", "verify-email", "token");
        assert_eq!(url, "https://app.example.com/verify-email#token=token");
    }

    #[test]
    fn extract_client_ip_prefers_forwarded() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("1.2.3.4, 5.6.7.8"),
        );
        headers.insert("x-real-ip", HeaderValue::from_static("9.9.9.9"));
        assert_eq!(extract_client_ip(&headers), Some("1.2.3.4".to_string()));
    }

    #[test]
    fn extract_client_ip_falls_back_to_real_ip() {
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", HeaderValue::from_static("9.9.9.9"));
        assert_eq!(extract_client_ip(&headers), Some("9.9.9.9".to_string()));
    }

    #[test]
    fn extract_user_agent_defaults_empty() {
        assert_eq!(extract_user_agent(&HeaderMap::new()), "");
        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::USER_AGENT,
            HeaderValue::from_static("test/1.0"),
        );
        assert_eq!(extract_user_agent(&headers), "test/1.0");
    }

    #[test]
    fn now_unix_is_recent() {
        // 2023-01-01 as a floor.
        assert!(now_unix() > 1_672_531_200);
    }
}
