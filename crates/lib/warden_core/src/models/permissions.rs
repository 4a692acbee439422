//! Permission map and role→privilege models.

use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Id of the map that always exists and is never mutated by updates.
pub const RECOVERY_MAP_ID: Uuid = Uuid::nil();

/// Privilege the recovery map reserves administrative routes for. Holders of
/// `*` satisfy it.
pub const ADMINISTRATOR_PRIVILEGE: &str = "administrator";

/// Grant/restrict privilege lists attached to one `Type.field` (or
/// `Type.*`) key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldResolver {
    #[serde(default)]
    pub grant: Vec<String>,
    #[serde(default)]
    pub restrict: Vec<String>,
}

/// `"Type.field"` / `"Type.*"` → resolver.
pub type PermissionsMapEntries = BTreeMap<String, FieldResolver>;

/// Role name → privileges granted by that role.
pub type PrivilegesMap = HashMap<String, Vec<String>>;

/// Versioned permission document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionsMap {
    pub id: Uuid,
    pub description: String,
    pub map: PermissionsMapEntries,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FieldResolver {
    pub fn granted_to(privileges: &[&str]) -> Self {
        Self {
            grant: privileges.iter().map(|p| p.to_string()).collect(),
            restrict: Vec::new(),
        }
    }
}

impl PermissionsMap {
    /// The fallback map: login and refresh are open to everyone, account and
    /// permission administration is reserved for administrators. Under either
    /// default policy an administrator can switch to a working map from here.
    pub fn recovery(now: DateTime<Utc>) -> Self {
        Self {
            id: RECOVERY_MAP_ID,
            description: "Recovery permissions map".to_string(),
            map: recovery_entries(),
            created_at: now,
            updated_at: now,
        }
    }
}

fn recovery_entries() -> PermissionsMapEntries {
    let open = ["AuthenticationMutation.create", "AuthenticationMutation.refresh"];
    let reserved = [
        "AuthenticationMutation.revoke",
        "AccountsMutation.*",
        "PermissionsMutation.*",
        "PermissionsQuery.*",
    ];
    open.into_iter()
        .map(|key| (key.to_string(), FieldResolver::granted_to(&["*"])))
        .chain(reserved.into_iter().map(|key| {
            (
                key.to_string(),
                FieldResolver::granted_to(&[ADMINISTRATOR_PRIVILEGE]),
            )
        }))
        .collect()
}

/// Changes applied by an update: entries overwrite keys of the same name.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PermissionsMapPatch {
    pub description: Option<String>,
    #[serde(default)]
    pub map: PermissionsMapEntries,
}

/// What happens to a field no grant list mentions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DefaultAccess {
    #[default]
    Grant,
    Restrict,
}

impl FromStr for DefaultAccess {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "grant" => Ok(DefaultAccess::Grant),
            "restrict" => Ok(DefaultAccess::Restrict),
            other => Err(format!("unknown default access policy '{other}'")),
        }
    }
}
