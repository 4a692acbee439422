//! PostgreSQL storage backend.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::{AccountStore, PermissionsStore, StoreError, TokenBlacklist, TokenStore};
use crate::accounts::queries as account_queries;
use crate::auth::queries as token_queries;
use crate::models::account::{Account, AccountFilter, Page};
use crate::models::permissions::{PermissionsMap, PrivilegesMap};
use crate::models::token::TokenRecord;
use crate::permissions::queries as permission_queries;

/// Pool-backed store implementing every storage trait.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Apply the embedded migrations from `warden_core/migrations/`.
    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }
}

#[async_trait]
impl AccountStore for PgStore {
    async fn list_accounts(&self, filter: &AccountFilter) -> Result<Page<Account>, StoreError> {
        account_queries::list_accounts(&self.pool, filter).await
    }

    async fn get_account(&self, id: Uuid) -> Result<Option<Account>, StoreError> {
        account_queries::get_account(&self.pool, id).await
    }

    async fn find_account_by_login(&self, login: &str) -> Result<Option<Account>, StoreError> {
        account_queries::find_account_by_login(&self.pool, login).await
    }

    async fn insert_account(&self, account: &Account) -> Result<(), StoreError> {
        account_queries::insert_account(&self.pool, account).await
    }

    async fn update_account(&self, account: &Account) -> Result<(), StoreError> {
        account_queries::update_account(&self.pool, account).await
    }
}

#[async_trait]
impl TokenStore for PgStore {
    async fn insert_token_pair(
        &self,
        access: &TokenRecord,
        refresh: &TokenRecord,
    ) -> Result<(), StoreError> {
        token_queries::insert_token_pair(&self.pool, access, refresh).await
    }

    async fn get_token(&self, id: Uuid) -> Result<Option<TokenRecord>, StoreError> {
        token_queries::get_token(&self.pool, id).await
    }

    async fn list_account_tokens(&self, account_id: Uuid) -> Result<Vec<TokenRecord>, StoreError> {
        token_queries::list_account_tokens(&self.pool, account_id).await
    }

    async fn list_expired_tokens(&self, cutoff: DateTime<Utc>) -> Result<Vec<Uuid>, StoreError> {
        token_queries::list_expired_tokens(&self.pool, cutoff).await
    }

    async fn delete_tokens(&self, ids: &[Uuid]) -> Result<u64, StoreError> {
        token_queries::delete_tokens(&self.pool, ids).await
    }
}

#[async_trait]
impl TokenBlacklist for PgStore {
    async fn add(&self, ids: &[Uuid]) -> Result<u64, StoreError> {
        token_queries::blacklist_add(&self.pool, ids).await
    }

    async fn contains(&self, id: Uuid) -> Result<bool, StoreError> {
        token_queries::blacklist_contains(&self.pool, id).await
    }

    async fn remove(&self, ids: &[Uuid]) -> Result<(), StoreError> {
        token_queries::blacklist_remove(&self.pool, ids).await
    }
}

#[async_trait]
impl PermissionsStore for PgStore {
    async fn get_permissions_map(&self, id: Uuid) -> Result<Option<PermissionsMap>, StoreError> {
        permission_queries::get_permissions_map(&self.pool, id).await
    }

    async fn save_permissions_map(&self, map: &PermissionsMap) -> Result<(), StoreError> {
        permission_queries::save_permissions_map(&self.pool, map).await
    }

    async fn get_privileges_map(&self) -> Result<PrivilegesMap, StoreError> {
        permission_queries::get_privileges_map(&self.pool).await
    }
}
