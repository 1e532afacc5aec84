//! API handlers for gatehouse.
//!
//! Credential lifecycle handlers live under [`auth`]; `health` and `root`
//! cover operational probes and the service banner.

pub mod auth;
pub mod health;
pub mod root;
