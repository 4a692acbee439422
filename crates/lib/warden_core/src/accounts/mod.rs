//! Account directory: lookups, writes and credential checks over the
//! account store.

pub mod queries;

use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use crate::auth::password::{hash_password, verify_password};
use crate::events::{AuthEvent, EventBus};
use crate::ids::{random_secret, uuidv7};
use crate::models::account::{
    Account, AccountFilter, AccountStatus, CreateAccount, Page, UpdateAccount, normalize_roles,
};
use crate::store::{AccountStore, StoreError};

/// Upper bound on a single listing page.
const MAX_PAGE_SIZE: u64 = 500;

/// Account errors.
#[derive(Debug, Error)]
pub enum AccountError {
    #[error("Account not found: {0}")]
    NotFound(String),

    #[error("Login '{0}' is already taken")]
    LoginTaken(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Server error: {0}")]
    Server(String),
}

pub struct AccountDirectory {
    store: Arc<dyn AccountStore>,
    events: EventBus,
}

impl AccountDirectory {
    pub fn new(store: Arc<dyn AccountStore>, events: EventBus) -> Self {
        Self { store, events }
    }

    /// Page of non-deleted accounts.
    pub async fn list(&self, filter: &AccountFilter) -> Result<Page<Account>, AccountError> {
        let mut filter = filter.clone();
        filter.limit = filter.limit.clamp(1, MAX_PAGE_SIZE);
        Ok(self.store.list_accounts(&filter).await?)
    }

    /// Raw lookup, soft-deleted rows included.
    pub async fn find(&self, id: Uuid) -> Result<Option<Account>, AccountError> {
        Ok(self.store.get_account(id).await?)
    }

    /// Non-deleted account by id.
    pub async fn get(&self, id: Uuid) -> Result<Account, AccountError> {
        self.store
            .get_account(id)
            .await?
            .filter(|a| !a.deleted)
            .ok_or_else(|| AccountError::NotFound(id.to_string()))
    }

    /// Non-deleted account by exact login.
    pub async fn get_by_login(&self, login: &str) -> Result<Account, AccountError> {
        self.store
            .find_account_by_login(login)
            .await?
            .ok_or_else(|| AccountError::NotFound(login.to_string()))
    }

    /// Whether a non-deleted account other than `skip_id` uses `login`.
    pub async fn login_exists(
        &self,
        login: &str,
        skip_id: Option<Uuid>,
    ) -> Result<bool, AccountError> {
        let found = self.store.find_account_by_login(login).await?;
        Ok(found.is_some_and(|a| Some(a.id) != skip_id))
    }

    pub async fn create(&self, input: CreateAccount) -> Result<Account, AccountError> {
        validate_login(&input.login)?;
        validate_password(&input.password)?;
        if self.login_exists(&input.login, None).await? {
            return Err(AccountError::LoginTaken(input.login));
        }

        let now = Utc::now();
        let account = Account {
            id: uuidv7(),
            login: input.login,
            password: hash(&input.password)?,
            status: input.status,
            roles: normalize_roles(&input.roles),
            created_at: now,
            updated_at: now,
            deleted: false,
        };
        self.store.insert_account(&account).await?;
        info!(account_id = %account.id, login = %account.login, "account created");
        Ok(account)
    }

    /// Apply a partial update. The password is re-hashed only when supplied.
    pub async fn update(&self, id: Uuid, input: UpdateAccount) -> Result<Account, AccountError> {
        let mut account = self.get(id).await?;

        if let Some(login) = input.login
            && login != account.login
        {
            validate_login(&login)?;
            if self.login_exists(&login, Some(id)).await? {
                return Err(AccountError::LoginTaken(login));
            }
            account.login = login;
        }
        if let Some(password) = input.password {
            validate_password(&password)?;
            account.password = hash(&password)?;
        }
        if let Some(status) = input.status {
            account.status = status;
        }
        if let Some(roles) = input.roles {
            account.roles = normalize_roles(&roles);
        }
        account.updated_at = Utc::now();

        self.store.update_account(&account).await?;
        self.events
            .publish(AuthEvent::AccountUpdated { account_id: id });
        Ok(account)
    }

    /// Soft delete: the row stays, but its login and password are replaced
    /// with random values and the account can no longer authenticate.
    pub async fn delete(&self, id: Uuid) -> Result<Account, AccountError> {
        let mut account = self.get(id).await?;
        account.login = format!("deleted-{}", random_secret(32));
        account.password = random_secret(64);
        account.status = AccountStatus::Forbidden;
        account.deleted = true;
        account.updated_at = Utc::now();

        self.store.update_account(&account).await?;
        info!(account_id = %id, "account deleted");
        self.events
            .publish(AuthEvent::AccountDeleted { account_id: id });
        Ok(account)
    }

    /// Look up by login and check the password. `None` when either fails.
    pub async fn verify_credentials(
        &self,
        login: &str,
        password: &str,
    ) -> Result<Option<Account>, AccountError> {
        let Some(account) = self.store.find_account_by_login(login).await? else {
            return Ok(None);
        };
        if !verify_password(password, &account.password) {
            return Ok(None);
        }
        Ok(Some(account))
    }
}

fn hash(password: &str) -> Result<String, AccountError> {
    hash_password(password).map_err(|e| AccountError::Server(e.to_string()))
}

fn validate_login(login: &str) -> Result<(), AccountError> {
    if login.trim().is_empty() {
        return Err(AccountError::Validation("Login must not be empty".into()));
    }
    Ok(())
}

fn validate_password(password: &str) -> Result<(), AccountError> {
    if password.is_empty() {
        return Err(AccountError::Validation("Password must not be empty".into()));
    }
    Ok(())
}
