//! Permission map request handlers.

use axum::Extension;
use axum::Json;
use axum::extract::{Path, State};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use warden_core::models::permissions::{
    PermissionsMap, PermissionsMapEntries, PermissionsMapPatch, PrivilegesMap,
};

use crate::AppState;
use crate::error::AppResult;
use crate::middleware::auth::RequestContext;

#[derive(Debug, Deserialize)]
pub struct CreateMapRequest {
    pub description: String,
    #[serde(default)]
    pub map: PermissionsMapEntries,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ActiveMap {
    pub id: Uuid,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckRequest {
    pub type_name: String,
    pub field_name: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckResponse {
    pub allowed: bool,
    pub map_id: Uuid,
}

/// `POST /permissions/maps`
pub async fn create_map_handler(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Json(body): Json<CreateMapRequest>,
) -> AppResult<Json<PermissionsMap>> {
    ctx.check("PermissionsMutation", "createPermissionsMap")?;
    let map = state
        .permissions
        .create_permissions_map(body.description, body.map)
        .await?;
    Ok(Json(map))
}

/// `GET /permissions/maps/{id}`
pub async fn get_map_handler(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<PermissionsMap>> {
    ctx.check("PermissionsQuery", "permissionsMap")?;
    Ok(Json(state.permissions.get_permissions_map(id).await?))
}

/// `PATCH /permissions/maps/{id}` — merge entries into a map.
pub async fn update_map_handler(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(id): Path<Uuid>,
    Json(patch): Json<PermissionsMapPatch>,
) -> AppResult<Json<PermissionsMap>> {
    ctx.check("PermissionsMutation", "updatePermissionsMap")?;
    Ok(Json(
        state.permissions.update_permissions_map(id, patch).await?,
    ))
}

/// `PUT /permissions/active` — switch the map used by later requests.
pub async fn set_active_map_handler(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Json(body): Json<ActiveMap>,
) -> AppResult<Json<ActiveMap>> {
    ctx.check("PermissionsMutation", "setActiveMap")?;
    state.permissions.set_active_map_id(body.id).await?;
    Ok(Json(ActiveMap {
        id: state.permissions.active_map_id().await,
    }))
}

/// `GET /permissions/privileges` — the role→privilege table.
pub async fn privileges_handler(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
) -> AppResult<Json<PrivilegesMap>> {
    ctx.check("PermissionsQuery", "privilegesMap")?;
    Ok(Json(state.permissions.get_privileges_map().await?))
}

/// `POST /permissions/check` — would the caller be allowed `Type.field`?
pub async fn check_handler(
    Extension(ctx): Extension<RequestContext>,
    Json(body): Json<CheckRequest>,
) -> AppResult<Json<CheckResponse>> {
    ctx.check("PermissionsQuery", "resolve")?;
    Ok(Json(CheckResponse {
        allowed: ctx.guard.is_allowed(&body.type_name, &body.field_name),
        map_id: ctx.guard.map_id(),
    }))
}
