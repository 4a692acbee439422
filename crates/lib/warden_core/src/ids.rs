//! Identifier and random-secret helpers.
//!
//! Token and account ids are UUIDv7 so that records sort by creation time.

use rand::distr::Alphanumeric;
use rand::{Rng, rng};
use uuid::Uuid;

/// Generate a new UUIDv7 (timestamp-sortable).
pub fn uuidv7() -> Uuid {
    Uuid::now_v7()
}

/// Random alphanumeric string of `len` characters.
pub fn random_secret(len: usize) -> String {
    rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}
