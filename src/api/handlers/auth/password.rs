//! Password hashing with Argon2id.

use anyhow::{anyhow, Result};
use argon2::password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, SaltString};
use argon2::{Argon2, PasswordVerifier};

/// Hash a plaintext password into a PHC-format digest with a fresh salt.
///
/// # Errors
///
/// Fails only if the hashing primitive itself fails (entropy exhaustion,
/// invalid parameters), which is not recoverable per request.
pub(super) fn hash_password(plaintext: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(plaintext.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|err| anyhow!("failed to hash password: {err}"))
}

/// Constant-time verification of a plaintext against a stored digest.
///
/// Never errors outward: malformed digests and mismatches both verify false.
pub(super) fn verify_password(plaintext: &str, digest: &str) -> bool {
    PasswordHash::new(digest).is_ok_and(|parsed| {
        Argon2::default()
            .verify_password(plaintext.as_bytes(), &parsed)
            .is_ok()
    })
}
