//! Storage interfaces.
//!
//! Services only see these traits. Two backends are provided:
//! [`postgres::PgStore`] (delegating to the per-domain `queries` modules) and
//! [`memory::MemoryStore`] for tests and single-process deployments.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::models::account::{Account, AccountFilter, Page};
use crate::models::permissions::{PermissionsMap, PrivilegesMap};
use crate::models::token::TokenRecord;

/// Storage errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    DbError(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Corrupt row: {0}")]
    Corrupt(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Account persistence.
#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Filtered, ordered page of non-deleted accounts.
    async fn list_accounts(&self, filter: &AccountFilter) -> Result<Page<Account>, StoreError>;

    /// Fetch by id, deleted rows included.
    async fn get_account(&self, id: Uuid) -> Result<Option<Account>, StoreError>;

    /// Fetch a non-deleted account by exact login.
    async fn find_account_by_login(&self, login: &str) -> Result<Option<Account>, StoreError>;

    async fn insert_account(&self, account: &Account) -> Result<(), StoreError>;

    /// Overwrite every column of an existing row.
    async fn update_account(&self, account: &Account) -> Result<(), StoreError>;
}

/// Token record persistence.
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Insert an access record and its refresh record in one unit.
    async fn insert_token_pair(
        &self,
        access: &TokenRecord,
        refresh: &TokenRecord,
    ) -> Result<(), StoreError>;

    async fn get_token(&self, id: Uuid) -> Result<Option<TokenRecord>, StoreError>;

    async fn list_account_tokens(&self, account_id: Uuid) -> Result<Vec<TokenRecord>, StoreError>;

    /// Ids of records with `expired_at < cutoff`.
    async fn list_expired_tokens(&self, cutoff: DateTime<Utc>) -> Result<Vec<Uuid>, StoreError>;

    /// Delete exactly the given records; returns the number removed.
    async fn delete_tokens(&self, ids: &[Uuid]) -> Result<u64, StoreError>;
}

/// Set-membership store of revoked token ids.
#[async_trait]
pub trait TokenBlacklist: Send + Sync {
    /// Insert ids; returns how many were not already present.
    async fn add(&self, ids: &[Uuid]) -> Result<u64, StoreError>;

    async fn contains(&self, id: Uuid) -> Result<bool, StoreError>;

    async fn remove(&self, ids: &[Uuid]) -> Result<(), StoreError>;
}

/// Permission map and role→privilege persistence.
#[async_trait]
pub trait PermissionsStore: Send + Sync {
    async fn get_permissions_map(&self, id: Uuid) -> Result<Option<PermissionsMap>, StoreError>;

    /// Insert or replace a whole map document.
    async fn save_permissions_map(&self, map: &PermissionsMap) -> Result<(), StoreError>;

    async fn get_privileges_map(&self) -> Result<PrivilegesMap, StoreError>;
}
