//! Account domain models.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Whether an account may authenticate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountStatus {
    Allowed,
    Forbidden,
}

impl AccountStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountStatus::Allowed => "allowed",
            AccountStatus::Forbidden => "forbidden",
        }
    }
}

impl fmt::Display for AccountStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccountStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "allowed" => Ok(AccountStatus::Allowed),
            "forbidden" => Ok(AccountStatus::Forbidden),
            other => Err(format!("unknown account status '{other}'")),
        }
    }
}

/// Identity record.
///
/// `password` always holds a bcrypt digest, never plaintext.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: Uuid,
    pub login: String,
    pub password: String,
    pub status: AccountStatus,
    pub roles: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted: bool,
}

/// Input for account creation. `password` is plaintext here.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateAccount {
    pub login: String,
    pub password: String,
    #[serde(default = "default_status")]
    pub status: AccountStatus,
    #[serde(default)]
    pub roles: Vec<String>,
}

fn default_status() -> AccountStatus {
    AccountStatus::Allowed
}

/// Partial update. Absent fields are left untouched; a supplied password is
/// re-hashed.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateAccount {
    pub login: Option<String>,
    pub password: Option<String>,
    pub status: Option<AccountStatus>,
    pub roles: Option<Vec<String>>,
}

/// Column an account listing is ordered by.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AccountOrderField {
    Login,
    #[default]
    CreatedAt,
    UpdatedAt,
}

impl AccountOrderField {
    pub fn column(&self) -> &'static str {
        match self {
            AccountOrderField::Login => "login",
            AccountOrderField::CreatedAt => "created_at",
            AccountOrderField::UpdatedAt => "updated_at",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderDirection {
    #[default]
    Asc,
    Desc,
}

/// Filter, ordering and pagination for account listings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AccountFilter {
    /// Substring matched against `login`.
    pub search: Option<String>,
    pub status: Option<AccountStatus>,
    pub order_by: AccountOrderField,
    pub direction: OrderDirection,
    pub offset: u64,
    pub limit: u64,
}

impl Default for AccountFilter {
    fn default() -> Self {
        Self {
            search: None,
            status: None,
            order_by: AccountOrderField::default(),
            direction: OrderDirection::default(),
            offset: 0,
            limit: 50,
        }
    }
}

/// A paginated result set.
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub offset: u64,
    pub limit: u64,
}

/// Sort and de-duplicate role names.
pub fn normalize_roles(roles: &[String]) -> Vec<String> {
    let mut out: Vec<String> = roles
        .iter()
        .map(|r| r.trim().to_string())
        .filter(|r| !r.is_empty())
        .collect();
    out.sort();
    out.dedup();
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_str() {
        for status in [AccountStatus::Allowed, AccountStatus::Forbidden] {
            assert_eq!(status.as_str().parse::<AccountStatus>(), Ok(status));
        }
        assert!("locked".parse::<AccountStatus>().is_err());
    }

    #[test]
    fn normalize_roles_dedups_and_sorts() {
        let roles = vec![
            "viewer".to_string(),
            " administrator ".to_string(),
            "viewer".to_string(),
            "".to_string(),
        ];
        assert_eq!(normalize_roles(&roles), vec!["administrator", "viewer"]);
    }

    #[test]
    fn filter_deserializes_with_defaults() {
        let f: AccountFilter =
            serde_json::from_str(r#"{"search":"al","orderBy":"login","direction":"desc"}"#)
                .unwrap();
        assert_eq!(f.search.as_deref(), Some("al"));
        assert_eq!(f.order_by, AccountOrderField::Login);
        assert_eq!(f.direction, OrderDirection::Desc);
        assert_eq!(f.limit, 50);
    }
}
