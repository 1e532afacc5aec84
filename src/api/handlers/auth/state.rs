//! Identity configuration and shared state.

use crate::token::{AccessTokenClaims, TokenKeys};
use uuid::Uuid;

use super::types::Role;
use super::utils::now_unix;

const DEFAULT_ACCESS_TTL_SECONDS: i64 = 10 * 60;
const DEFAULT_REFRESH_TTL_SECONDS: i64 = 30 * 24 * 60 * 60;
const DEFAULT_RESET_TOKEN_TTL_SECONDS: i64 = 60 * 60;
const DEFAULT_VERIFY_TOKEN_TTL_SECONDS: i64 = 24 * 60 * 60;

#[derive(Clone, Debug)]
pub struct AuthConfig {
    frontend_base_url: String,
    access_ttl_seconds: i64,
    refresh_ttl_seconds: i64,
    reset_token_ttl_seconds: i64,
    verify_token_ttl_seconds: i64,
}

impl AuthConfig {
    #[must_use]
    pub fn new(frontend_base_url: String) -> Self {
        Self {
            frontend_base_url,
            access_ttl_seconds: DEFAULT_ACCESS_TTL_SECONDS,
            refresh_ttl_seconds: DEFAULT_REFRESH_TTL_SECONDS,
            reset_token_ttl_seconds: DEFAULT_RESET_TOKEN_TTL_SECONDS,
            verify_token_ttl_seconds: DEFAULT_VERIFY_TOKEN_TTL_SECONDS,
        }
    }

    #[must_use]
    pub fn with_access_ttl_seconds(mut self, seconds: i64) -> Self {
        self.access_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_refresh_ttl_seconds(mut self, seconds: i64) -> Self {
        self.refresh_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_reset_token_ttl_seconds(mut self, seconds: i64) -> Self {
        self.reset_token_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_verify_token_ttl_seconds(mut self, seconds: i64) -> Self {
        self.verify_token_ttl_seconds = seconds;
        self
    }

    pub(crate) fn frontend_base_url(&self) -> &str {
        &self.frontend_base_url
    }

    pub(super) fn access_ttl_seconds(&self) -> i64 {
        self.access_ttl_seconds
    }

    pub(super) fn refresh_ttl_seconds(&self) -> i64 {
        self.refresh_ttl_seconds
    }

    pub(super) fn reset_token_ttl_seconds(&self) -> i64 {
        self.reset_token_ttl_seconds
    }

    pub(super) fn verify_token_ttl_seconds(&self) -> i64 {
        self.verify_token_ttl_seconds
    }

    /// Cookies are only marked `Secure` when the frontend is served over HTTPS.
    pub(super) fn refresh_cookie_secure(&self) -> bool {
        self.frontend_base_url.starts_with("https://")
    }
}

/// Immutable per-process identity state: configuration plus the signing key
/// pair, constructed once at startup and shared behind an `Arc`.
pub struct AuthState {
    config: AuthConfig,
    keys: TokenKeys,
}

impl AuthState {
    #[must_use]
    pub fn new(config: AuthConfig, keys: TokenKeys) -> Self {
        Self { config, keys }
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    #[must_use]
    pub fn keys(&self) -> &TokenKeys {
        &self.keys
    }

    /// Issue an access token for an account, returning the token and its
    /// lifetime in seconds.
    pub(super) fn issue_access_token(
        &self,
        account_id: Uuid,
        username: &str,
        role: Role,
    ) -> Result<(String, i64), crate::token::Error> {
        let now = now_unix();
        let ttl = self.config.access_ttl_seconds();
        let claims = AccessTokenClaims {
            sub: account_id.to_string(),
            username: username.to_string(),
            role,
            iat: now,
            exp: now + ttl,
        };
        Ok((self.keys.issue(&claims)?, ttl))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults_and_overrides() {
        let config = AuthConfig::new("https://app.example.com".to_string());

        assert_eq!(config.frontend_base_url(), "https://app.example.com");
        assert_eq!(config.access_ttl_seconds(), super::DEFAULT_ACCESS_TTL_SECONDS);
        assert_eq!(
            config.refresh_ttl_seconds(),
            super::DEFAULT_REFRESH_TTL_SECONDS
        );
        assert_eq!(
            config.reset_token_ttl_seconds(),
            super::DEFAULT_RESET_TOKEN_TTL_SECONDS
        );
        assert_eq!(
            config.verify_token_ttl_seconds(),
            super::DEFAULT_VERIFY_TOKEN_TTL_SECONDS
        );
        assert!(config.refresh_cookie_secure());

        let config = config
            .with_access_ttl_seconds(60)
            .with_refresh_ttl_seconds(3600)
            .with_reset_token_ttl_seconds(120)
            .with_verify_token_ttl_seconds(240);

        assert_eq!(config.access_ttl_seconds(), 60);
        assert_eq!(config.refresh_ttl_seconds(), 3600);
        assert_eq!(config.reset_token_ttl_seconds(), 120);
        assert_eq!(config.verify_token_ttl_seconds(), 240);
    }

    #[test]
    fn plain_http_frontend_disables_secure_cookie() {
        let config = AuthConfig::new("http://localhost:3000".to_string());
        assert!(!config.refresh_cookie_secure());
    }
}
