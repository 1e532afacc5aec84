//! Request/response types for identity endpoints.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Privilege tier of an account, totally ordered by rank.
///
/// Comparisons go through [`Role::rank`]; keep the ranking table here,
/// next to the type.
#[derive(ToSchema, Serialize, Deserialize, sqlx::Type, Debug, Clone, Copy, PartialEq, Eq)]
#[sqlx(type_name = "account_role", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Member,
    Author,
    Moderator,
    Admin,
}

impl Role {
    #[must_use]
    pub const fn rank(self) -> u8 {
        match self {
            Self::Member => 0,
            Self::Author => 1,
            Self::Moderator => 2,
            Self::Admin => 3,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Member => "member",
            Self::Author => "author",
            Self::Moderator => "moderator",
            Self::Admin => "admin",
        }
    }
}

impl PartialOrd for Role {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Role {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.rank().cmp(&other.rank())
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    pub display_name: String,
}

/// Outward-facing view of an account; never includes the password hash.
#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct AccountResponse {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub display_name: String,
    pub role: Role,
    pub verified: bool,
    pub created_at: i64,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct LoginRequest {
    /// Username or email.
    pub identifier: String,
    pub password: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    /// Access token lifetime in seconds.
    pub expires_in: i64,
    /// Unix timestamp at which the refresh session expires.
    pub refresh_expires_at: i64,
    pub account: AccountResponse,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ResetPasswordRequest {
    pub token: String,
    pub new_password: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct VerifyEmailRequest {
    pub token: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    #[test]
    fn role_order_follows_rank() {
        assert!(Role::Admin > Role::Moderator);
        assert!(Role::Moderator > Role::Author);
        assert!(Role::Author > Role::Member);
        assert_eq!(Role::Member.rank(), 0);
        assert_eq!(Role::Admin.rank(), 3);
    }

    #[test]
    fn role_serializes_lowercase() -> Result<()> {
        assert_eq!(serde_json::to_value(Role::Moderator)?, "moderator");
        let role: Role = serde_json::from_value(serde_json::json!("admin"))?;
        assert_eq!(role, Role::Admin);
        Ok(())
    }

    #[test]
    fn login_request_round_trips() -> Result<()> {
        let request = LoginRequest {
            identifier: "ana@x.com".to_string(),
            password: "Secret123".to_string(),
        };
        let value = serde_json::to_value(&request)?;
        let decoded: LoginRequest = serde_json::from_value(value)?;
        assert_eq!(decoded.identifier, "ana@x.com");
        Ok(())
    }

    #[test]
    fn account_response_never_carries_a_hash_field() -> Result<()> {
        let account = AccountResponse {
            id: Uuid::nil(),
            username: "ana".to_string(),
            email: "ana@x.com".to_string(),
            display_name: "Ana".to_string(),
            role: Role::Member,
            verified: false,
            created_at: 0,
        };
        let value = serde_json::to_value(&account)?;
        let object = value.as_object().expect("object");
        assert!(!object.keys().any(|key| key.contains("password")));
        assert!(!object.keys().any(|key| key.contains("hash")));
        Ok(())
    }
}
