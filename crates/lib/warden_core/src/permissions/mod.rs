//! Permission maps, role expansion and field guards.

pub mod guard;
pub mod queries;
pub mod resolver;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::PermissionsConfig;
use crate::ids::uuidv7;
use crate::models::permissions::{
    PermissionsMap, PermissionsMapEntries, PermissionsMapPatch, PrivilegesMap, RECOVERY_MAP_ID,
};
use crate::models::token::AccessTokenPayload;
use crate::store::{PermissionsStore, StoreError};
use guard::FieldGuard;
use resolver::ResolveOptions;

/// Permission errors.
#[derive(Debug, Error)]
pub enum PermissionError {
    #[error("Permissions map not found: {0}")]
    NotFound(Uuid),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

pub struct PermissionsService {
    store: Arc<dyn PermissionsStore>,
    active_map_id: RwLock<Uuid>,
    options: ResolveOptions,
    required_privileges: Arc<HashMap<String, Vec<String>>>,
}

impl PermissionsService {
    pub fn new(store: Arc<dyn PermissionsStore>, config: &PermissionsConfig) -> Self {
        Self {
            store,
            active_map_id: RwLock::new(config.active_map_id),
            options: ResolveOptions::from(config),
            required_privileges: Arc::new(config.required_privileges.clone()),
        }
    }

    pub fn options(&self) -> ResolveOptions {
        self.options
    }

    /// Extra privileges declared for `Type.field`.
    pub fn required_privileges(&self, path: &str) -> &[String] {
        self.required_privileges
            .get(path)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub async fn active_map_id(&self) -> Uuid {
        *self.active_map_id.read().await
    }

    /// Point later resolutions at another map. Requests already holding a
    /// guard keep their snapshot.
    pub async fn set_active_map_id(&self, id: Uuid) -> Result<(), PermissionError> {
        self.get_permissions_map(id).await?;
        let mut active = self.active_map_id.write().await;
        let previous = *active;
        *active = id;
        info!(%previous, current = %id, "active permissions map changed");
        Ok(())
    }

    pub async fn get_permissions_map(&self, id: Uuid) -> Result<PermissionsMap, PermissionError> {
        self.store
            .get_permissions_map(id)
            .await?
            .ok_or(PermissionError::NotFound(id))
    }

    /// Merge `patch` into a stored map. Entries overwrite keys of the same
    /// name; the recovery map cannot be changed.
    pub async fn update_permissions_map(
        &self,
        id: Uuid,
        patch: PermissionsMapPatch,
    ) -> Result<PermissionsMap, PermissionError> {
        if id == RECOVERY_MAP_ID {
            return Err(PermissionError::Forbidden(
                "The recovery permissions map cannot be modified".into(),
            ));
        }

        let mut map = self.get_permissions_map(id).await?;
        if let Some(description) = patch.description {
            map.description = description;
        }
        let changed = patch.map.len();
        map.map.extend(patch.map);
        map.updated_at = Utc::now();

        self.store.save_permissions_map(&map).await?;
        info!(map_id = %id, changed, "permissions map updated");
        Ok(map)
    }

    pub async fn create_permissions_map(
        &self,
        description: String,
        entries: PermissionsMapEntries,
    ) -> Result<PermissionsMap, PermissionError> {
        let now = Utc::now();
        let map = PermissionsMap {
            id: uuidv7(),
            description,
            map: entries,
            created_at: now,
            updated_at: now,
        };
        self.store.save_permissions_map(&map).await?;
        info!(map_id = %map.id, "permissions map created");
        Ok(map)
    }

    /// Make sure the recovery map exists. Returns whether it had to be
    /// created.
    pub async fn ensure_recovery_map(&self) -> Result<bool, PermissionError> {
        if self.store.get_permissions_map(RECOVERY_MAP_ID).await?.is_some() {
            return Ok(false);
        }
        self.store
            .save_permissions_map(&PermissionsMap::recovery(Utc::now()))
            .await?;
        warn!("recovery permissions map was missing and has been recreated");
        Ok(true)
    }

    /// The map currently in force. A dangling active id falls back to the
    /// recovery map.
    pub async fn active_map(&self) -> Result<PermissionsMap, PermissionError> {
        let id = self.active_map_id().await;
        match self.store.get_permissions_map(id).await? {
            Some(map) => Ok(map),
            None => {
                warn!(map_id = %id, "active permissions map missing, using recovery map");
                self.get_permissions_map(RECOVERY_MAP_ID).await
            }
        }
    }

    pub async fn get_privileges_map(&self) -> Result<PrivilegesMap, PermissionError> {
        Ok(self.store.get_privileges_map().await?)
    }

    /// Union of the privileges granted by each role. Unknown roles grant
    /// nothing.
    pub async fn expand_privileges(
        &self,
        roles: &[String],
    ) -> Result<HashSet<String>, PermissionError> {
        let table = self.get_privileges_map().await?;
        Ok(expand_with(&table, roles))
    }

    /// Build the guard for one request from the caller's identity.
    pub async fn guard_for(
        &self,
        identity: &AccessTokenPayload,
    ) -> Result<FieldGuard, PermissionError> {
        let map = self.active_map().await?;
        let privileges = self.expand_privileges(&identity.roles).await?;
        Ok(FieldGuard::new(
            Arc::new(map),
            privileges,
            self.options,
            self.required_privileges.clone(),
        ))
    }
}

fn expand_with(table: &PrivilegesMap, roles: &[String]) -> HashSet<String> {
    roles
        .iter()
        .filter_map(|role| table.get(role))
        .flatten()
        .cloned()
        .collect()
}
