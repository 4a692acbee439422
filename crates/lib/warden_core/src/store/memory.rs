//! In-memory storage backend.
//!
//! Mirrors the PostgreSQL schema semantics (seed rows, unique logins, no
//! cascade from access to refresh records) closely enough for tests and
//! single-process use.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::{DashMap, DashSet};
use uuid::Uuid;

use super::{AccountStore, PermissionsStore, StoreError, TokenBlacklist, TokenStore};
use crate::models::account::{Account, AccountFilter, AccountOrderField, OrderDirection, Page};
use crate::models::permissions::{PermissionsMap, PrivilegesMap};
use crate::models::token::TokenRecord;

/// Dashmap-backed store implementing every storage trait.
#[derive(Debug)]
pub struct MemoryStore {
    accounts: DashMap<Uuid, Account>,
    tokens: DashMap<Uuid, TokenRecord>,
    blacklist: DashSet<Uuid>,
    maps: DashMap<Uuid, PermissionsMap>,
    privileges: DashMap<String, Vec<String>>,
}

impl MemoryStore {
    /// Empty store seeded like a freshly migrated database: the recovery map
    /// plus the `administrator` and `authorized` roles.
    pub fn new() -> Self {
        let store = Self {
            accounts: DashMap::new(),
            tokens: DashMap::new(),
            blacklist: DashSet::new(),
            maps: DashMap::new(),
            privileges: DashMap::new(),
        };
        let recovery = PermissionsMap::recovery(Utc::now());
        store.maps.insert(recovery.id, recovery);
        store
            .privileges
            .insert("administrator".to_string(), vec!["*".to_string()]);
        store
            .privileges
            .insert("authorized".to_string(), vec!["authorized".to_string()]);
        store
    }

    /// Replace the privileges granted by `role`.
    pub fn set_role_privileges(&self, role: &str, privileges: &[&str]) {
        self.privileges.insert(
            role.to_string(),
            privileges.iter().map(|p| p.to_string()).collect(),
        );
    }

    /// Number of persisted token records.
    pub fn token_count(&self) -> usize {
        self.tokens.len()
    }

    /// Number of blacklisted ids.
    pub fn blacklist_len(&self) -> usize {
        self.blacklist.len()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AccountStore for MemoryStore {
    async fn list_accounts(&self, filter: &AccountFilter) -> Result<Page<Account>, StoreError> {
        let mut items: Vec<Account> = self
            .accounts
            .iter()
            .map(|entry| entry.value().clone())
            .filter(|a| !a.deleted)
            .filter(|a| filter.status.is_none_or(|s| a.status == s))
            .filter(|a| {
                filter
                    .search
                    .as_deref()
                    .is_none_or(|needle| a.login.contains(needle))
            })
            .collect();

        items.sort_by(|a, b| {
            let ord = match filter.order_by {
                AccountOrderField::Login => a.login.cmp(&b.login),
                AccountOrderField::CreatedAt => a.created_at.cmp(&b.created_at),
                AccountOrderField::UpdatedAt => a.updated_at.cmp(&b.updated_at),
            }
            .then_with(|| a.id.cmp(&b.id));
            match filter.direction {
                OrderDirection::Asc => ord,
                OrderDirection::Desc => ord.reverse(),
            }
        });

        let total = items.len() as u64;
        let items = items
            .into_iter()
            .skip(usize::try_from(filter.offset).unwrap_or(usize::MAX))
            .take(usize::try_from(filter.limit).unwrap_or(usize::MAX))
            .collect();

        Ok(Page {
            items,
            total,
            offset: filter.offset,
            limit: filter.limit,
        })
    }

    async fn get_account(&self, id: Uuid) -> Result<Option<Account>, StoreError> {
        Ok(self.accounts.get(&id).map(|a| a.value().clone()))
    }

    async fn find_account_by_login(&self, login: &str) -> Result<Option<Account>, StoreError> {
        Ok(self
            .accounts
            .iter()
            .find(|a| !a.deleted && a.login == login)
            .map(|a| a.value().clone()))
    }

    async fn insert_account(&self, account: &Account) -> Result<(), StoreError> {
        if self.accounts.iter().any(|a| a.login == account.login) {
            return Err(StoreError::Conflict(format!(
                "login '{}' already stored",
                account.login
            )));
        }
        if self.accounts.contains_key(&account.id) {
            return Err(StoreError::Conflict(format!("account {}", account.id)));
        }
        self.accounts.insert(account.id, account.clone());
        Ok(())
    }

    async fn update_account(&self, account: &Account) -> Result<(), StoreError> {
        if self
            .accounts
            .iter()
            .any(|a| a.id != account.id && a.login == account.login)
        {
            return Err(StoreError::Conflict(format!(
                "login '{}' already stored",
                account.login
            )));
        }
        match self.accounts.get_mut(&account.id) {
            Some(mut row) => {
                *row = account.clone();
                Ok(())
            }
            None => Err(StoreError::Corrupt(format!(
                "account {} does not exist",
                account.id
            ))),
        }
    }
}

#[async_trait]
impl TokenStore for MemoryStore {
    async fn insert_token_pair(
        &self,
        access: &TokenRecord,
        refresh: &TokenRecord,
    ) -> Result<(), StoreError> {
        if !self.accounts.contains_key(&access.account) {
            return Err(StoreError::Conflict(format!(
                "token owner {} does not exist",
                access.account
            )));
        }
        self.tokens.insert(access.id, access.clone());
        self.tokens.insert(refresh.id, refresh.clone());
        Ok(())
    }

    async fn get_token(&self, id: Uuid) -> Result<Option<TokenRecord>, StoreError> {
        Ok(self.tokens.get(&id).map(|t| t.value().clone()))
    }

    async fn list_account_tokens(&self, account_id: Uuid) -> Result<Vec<TokenRecord>, StoreError> {
        let mut records: Vec<TokenRecord> = self
            .tokens
            .iter()
            .filter(|t| t.account == account_id)
            .map(|t| t.value().clone())
            .collect();
        records.sort_by_key(|t| t.id);
        Ok(records)
    }

    async fn list_expired_tokens(&self, cutoff: DateTime<Utc>) -> Result<Vec<Uuid>, StoreError> {
        Ok(self
            .tokens
            .iter()
            .filter(|t| t.expired_at < cutoff)
            .map(|t| t.id)
            .collect())
    }

    async fn delete_tokens(&self, ids: &[Uuid]) -> Result<u64, StoreError> {
        let removed = ids
            .iter()
            .filter(|id| self.tokens.remove(id).is_some())
            .count();
        Ok(removed as u64)
    }
}

#[async_trait]
impl TokenBlacklist for MemoryStore {
    async fn add(&self, ids: &[Uuid]) -> Result<u64, StoreError> {
        let inserted = ids.iter().filter(|id| self.blacklist.insert(**id)).count();
        Ok(inserted as u64)
    }

    async fn contains(&self, id: Uuid) -> Result<bool, StoreError> {
        Ok(self.blacklist.contains(&id))
    }

    async fn remove(&self, ids: &[Uuid]) -> Result<(), StoreError> {
        for id in ids {
            self.blacklist.remove(id);
        }
        Ok(())
    }
}

#[async_trait]
impl PermissionsStore for MemoryStore {
    async fn get_permissions_map(&self, id: Uuid) -> Result<Option<PermissionsMap>, StoreError> {
        Ok(self.maps.get(&id).map(|m| m.value().clone()))
    }

    async fn save_permissions_map(&self, map: &PermissionsMap) -> Result<(), StoreError> {
        self.maps.insert(map.id, map.clone());
        Ok(())
    }

    async fn get_privileges_map(&self) -> Result<PrivilegesMap, StoreError> {
        Ok(self
            .privileges
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect())
    }
}
