//! Per-request field guard.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use tracing::debug;
use uuid::Uuid;

use super::PermissionError;
use super::resolver::{ResolveOptions, resolve};
use crate::models::permissions::PermissionsMap;

/// Access checks for one request.
///
/// Holds a snapshot of the active map and the caller's expanded privileges,
/// so every field in the request is judged against the same state. Results
/// are memoized per `(type, field)`.
pub struct FieldGuard {
    map: Arc<PermissionsMap>,
    privileges: HashSet<String>,
    options: ResolveOptions,
    required_privileges: Arc<HashMap<String, Vec<String>>>,
    cache: Mutex<HashMap<(String, String), bool>>,
}

impl FieldGuard {
    pub fn new(
        map: Arc<PermissionsMap>,
        privileges: HashSet<String>,
        options: ResolveOptions,
        required_privileges: Arc<HashMap<String, Vec<String>>>,
    ) -> Self {
        Self {
            map,
            privileges,
            options,
            required_privileges,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn map_id(&self) -> Uuid {
        self.map.id
    }

    pub fn privileges(&self) -> &HashSet<String> {
        &self.privileges
    }

    pub fn is_allowed(&self, type_name: &str, field_name: &str) -> bool {
        let key = (type_name.to_string(), field_name.to_string());
        if let Some(hit) = self.cache.lock().ok().and_then(|c| c.get(&key).copied()) {
            return hit;
        }

        let required = self
            .required_privileges
            .get(&format!("{type_name}.{field_name}"))
            .map(Vec::as_slice)
            .unwrap_or_default();
        let allowed = resolve(
            &self.map.map,
            &self.privileges,
            type_name,
            field_name,
            required,
            &self.options,
        );
        debug!(map_id = %self.map.id, type_name, field_name, allowed, "field access resolved");

        if let Ok(mut cache) = self.cache.lock() {
            cache.insert(key, allowed);
        }
        allowed
    }

    /// Like [`is_allowed`](Self::is_allowed), but a denial is an error.
    pub fn check(&self, type_name: &str, field_name: &str) -> Result<(), PermissionError> {
        if self.is_allowed(type_name, field_name) {
            Ok(())
        } else {
            Err(PermissionError::Forbidden(format!(
                "Access to {type_name}.{field_name} is forbidden"
            )))
        }
    }
}

impl std::fmt::Debug for FieldGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldGuard")
            .field("map_id", &self.map.id)
            .field("privileges", &self.privileges)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}
