//! # Gatehouse (Identity & Session Service)
//!
//! `gatehouse` is the identity layer of the platform: it authenticates
//! accounts, issues short-lived RS256 access tokens, and manages long-lived
//! refresh sessions. Every other subsystem consumes the identity it
//! establishes by verifying access tokens against the public key.
//!
//! ## Credential model
//!
//! - **Access token** - stateless, signed, minutes-scale lifetime. Carried in
//!   the `Authorization` header and verifiable by any service that holds the
//!   public half of the signing key.
//! - **Refresh token** - opaque, high-entropy, single-use-per-rotation.
//!   Delivered once in an `HttpOnly` cookie scoped to the auth endpoints;
//!   only its SHA-256 digest is stored server-side.
//!
//! ## Rotation & replay detection
//!
//! Every refresh atomically revokes the session row that backed the
//! presented token and creates a replacement. Presenting an
//! already-rotated (or expired) token is treated as a compromise signal:
//! all sessions for the account are revoked and a distinct security event
//! is logged.
//!
//! ## Enumeration defenses
//!
//! Login failures never reveal whether the identifier or the password was
//! wrong, and password-reset requests answer identically whether or not the
//! email exists. Registration conflicts are the one intentional exception:
//! username and email collisions are reported distinctly.

pub mod api;
pub mod cli;
pub mod token;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);
