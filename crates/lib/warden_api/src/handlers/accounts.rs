//! Account request handlers.
//!
//! Responses are projections: each `Account` field is emitted only when the
//! caller's guard opens `Account.<field>`. The password digest is never
//! projectable.

use axum::Extension;
use axum::Json;
use axum::extract::{Path, Query, State};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tracing::{error, info};
use uuid::Uuid;
use warden_core::models::account::{Account, AccountFilter, CreateAccount, UpdateAccount};

use crate::AppState;
use crate::error::{AppError, AppResult};
use crate::middleware::auth::RequestContext;

/// Fields a response may carry, in output order.
pub const ACCOUNT_FIELDS: [&str; 7] = [
    "id",
    "login",
    "status",
    "roles",
    "createdAt",
    "updatedAt",
    "deleted",
];

/// `?fields=id,login` selects a subset of [`ACCOUNT_FIELDS`].
#[derive(Debug, Default, Deserialize)]
pub struct Projection {
    pub fields: Option<String>,
}

impl Projection {
    fn fields(&self) -> Result<Vec<&str>, AppError> {
        let Some(raw) = self.fields.as_deref() else {
            return Ok(ACCOUNT_FIELDS.to_vec());
        };
        raw.split(',')
            .map(str::trim)
            .filter(|f| !f.is_empty())
            .map(|f| {
                ACCOUNT_FIELDS
                    .iter()
                    .copied()
                    .find(|known| *known == f)
                    .ok_or_else(|| AppError::Validation(format!("Unknown account field '{f}'")))
            })
            .collect()
    }
}

#[derive(Debug, Serialize)]
pub struct AccountPage {
    pub items: Vec<Value>,
    pub total: u64,
    pub offset: u64,
    pub limit: u64,
}

/// Value of one account field by its API name.
pub fn account_field(account: &Account, field: &str) -> Option<Value> {
    let value = match field {
        "id" => json!(account.id),
        "login" => json!(account.login),
        "status" => json!(account.status),
        "roles" => json!(account.roles),
        "createdAt" => json!(account.created_at),
        "updatedAt" => json!(account.updated_at),
        "deleted" => json!(account.deleted),
        _ => return None,
    };
    Some(value)
}

/// Project `account` onto `fields`, skipping fields the caller may not see.
pub fn project_account(ctx: &RequestContext, account: &Account, fields: &[&str]) -> Value {
    let mut out = Map::new();
    for field in fields {
        if !ctx.guard.is_allowed("Account", field) {
            continue;
        }
        if let Some(value) = account_field(account, field) {
            out.insert((*field).to_string(), value);
        }
    }
    Value::Object(out)
}

/// `GET /accounts` — filtered, paginated listing.
pub async fn list_accounts_handler(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Query(filter): Query<AccountFilter>,
    Query(projection): Query<Projection>,
) -> AppResult<Json<AccountPage>> {
    ctx.check("AccountsQuery", "list")?;
    let fields = projection.fields()?;
    let page = state.accounts.list(&filter).await?;
    Ok(Json(AccountPage {
        items: page
            .items
            .iter()
            .map(|a| project_account(&ctx, a, &fields))
            .collect(),
        total: page.total,
        offset: page.offset,
        limit: page.limit,
    }))
}

/// `GET /accounts/me` — the caller's own account.
pub async fn me_handler(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Query(projection): Query<Projection>,
) -> AppResult<Json<Value>> {
    ctx.check("AccountsQuery", "me")?;
    let identity = ctx.require_identity()?;
    let account = state.accounts.get(identity.uuid).await?;
    Ok(Json(project_account(&ctx, &account, &projection.fields()?)))
}

/// `GET /accounts/{id}`
pub async fn get_account_handler(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(id): Path<Uuid>,
    Query(projection): Query<Projection>,
) -> AppResult<Json<Value>> {
    ctx.check("AccountsQuery", "get")?;
    let account = state.accounts.get(id).await?;
    Ok(Json(project_account(&ctx, &account, &projection.fields()?)))
}

/// `POST /accounts`
pub async fn create_account_handler(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Json(body): Json<CreateAccount>,
) -> AppResult<Json<Value>> {
    ctx.check("AccountsMutation", "create")?;
    let account = state.accounts.create(body).await?;
    Ok(Json(project_account(&ctx, &account, &ACCOUNT_FIELDS)))
}

/// `PATCH /accounts/{id}`
pub async fn update_account_handler(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(id): Path<Uuid>,
    Json(body): Json<UpdateAccount>,
) -> AppResult<Json<Value>> {
    ctx.check("AccountsMutation", "update")?;
    let account = state.accounts.update(id, body).await?;
    Ok(Json(project_account(&ctx, &account, &ACCOUNT_FIELDS)))
}

/// `DELETE /accounts/{id}` — soft delete, then revoke the account's tokens.
///
/// The delete stands even if revocation fails; `tokensRevoked` is `null`
/// in that case.
pub async fn delete_account_handler(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Value>> {
    ctx.check("AccountsMutation", "delete")?;
    let account = state.accounts.delete(id).await?;
    let revoked = match state.auth.revoke_account_tokens(id).await {
        Ok(revoked) => {
            info!(account_id = %id, revoked, "deleted account's tokens revoked");
            Some(revoked)
        }
        Err(e) => {
            error!(account_id = %id, error = %e, "failed to revoke deleted account's tokens");
            None
        }
    };
    Ok(Json(json!({
        "id": account.id,
        "deleted": account.deleted,
        "tokensRevoked": revoked,
    })))
}
