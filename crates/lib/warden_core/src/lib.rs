//! # warden_core
//!
//! Core domain logic for Warden: credential hashing, token issuance and
//! revocation, the account directory, and field-level permission resolution.

pub mod accounts;
pub mod auth;
pub mod config;
pub mod events;
pub mod ids;
pub mod models;
pub mod permissions;
pub mod store;

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
