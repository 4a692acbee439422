//! Domain models.
//!
//! Storage-agnostic types shared by the services, the storage backends and
//! the HTTP layer.

pub mod account;
pub mod permissions;
pub mod token;
