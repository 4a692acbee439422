//! Permission map and role→privilege queries.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use sqlx::types::Json;
use uuid::Uuid;

use crate::models::permissions::{PermissionsMap, PermissionsMapEntries, PrivilegesMap};
use crate::store::StoreError;

/// Fetch a permissions map by id.
pub async fn get_permissions_map(
    pool: &PgPool,
    id: Uuid,
) -> Result<Option<PermissionsMap>, StoreError> {
    let row = sqlx::query_as::<
        _,
        (
            Uuid,
            String,
            Json<PermissionsMapEntries>,
            DateTime<Utc>,
            DateTime<Utc>,
        ),
    >(
        "SELECT id, description, map, created_at, updated_at \
         FROM permissions_map WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(
        |(id, description, Json(map), created_at, updated_at)| PermissionsMap {
            id,
            description,
            map,
            created_at,
            updated_at,
        },
    ))
}

/// Insert or replace a permissions map.
pub async fn save_permissions_map(pool: &PgPool, map: &PermissionsMap) -> Result<(), StoreError> {
    sqlx::query(
        "INSERT INTO permissions_map (id, description, map, created_at, updated_at) \
         VALUES ($1, $2, $3, $4, $5) \
         ON CONFLICT (id) DO UPDATE SET \
           description = EXCLUDED.description, \
           map = EXCLUDED.map, \
           updated_at = EXCLUDED.updated_at",
    )
    .bind(map.id)
    .bind(&map.description)
    .bind(Json(&map.map))
    .bind(map.created_at)
    .bind(map.updated_at)
    .execute(pool)
    .await?;
    Ok(())
}

/// Load the full role→privilege table.
pub async fn get_privileges_map(pool: &PgPool) -> Result<PrivilegesMap, StoreError> {
    let rows = sqlx::query_as::<_, (String, Vec<String>)>(
        "SELECT role, privileges FROM roles_to_privileges",
    )
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().collect())
}
