//! Identity middleware: bearer token resolution and per-request field guard.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use tracing::debug;
use warden_core::models::token::AccessTokenPayload;
use warden_core::permissions::guard::FieldGuard;

use crate::AppState;
use crate::error::AppError;

/// Caller identity and field guard, resolved once per request and stored in
/// request extensions.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub identity: AccessTokenPayload,
    pub guard: Arc<FieldGuard>,
}

impl RequestContext {
    /// Deny unless `type_name.field_name` is open to the caller.
    pub fn check(&self, type_name: &str, field_name: &str) -> Result<(), AppError> {
        Ok(self.guard.check(type_name, field_name)?)
    }

    /// The caller's identity, or 401 for anonymous callers.
    pub fn require_identity(&self) -> Result<&AccessTokenPayload, AppError> {
        if self.identity.is_anonymous() {
            return Err(AppError::Unauthorized("Missing bearer token".into()));
        }
        Ok(&self.identity)
    }
}

/// Axum middleware: resolves the bearer token (absent or timed out means
/// anonymous, invalid or revoked means 401), builds the caller's field guard
/// and injects a [`RequestContext`] into request extensions.
pub async fn resolve_identity(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let identity = state
        .auth
        .identify(request.headers(), state.config.verify_timeout)
        .await?;
    let guard = state.permissions.guard_for(&identity).await?;
    debug!(
        account_id = %identity.uuid,
        anonymous = identity.is_anonymous(),
        map_id = %guard.map_id(),
        "request identity resolved"
    );

    request.extensions_mut().insert(RequestContext {
        identity,
        guard: Arc::new(guard),
    });

    Ok(next.run(request).await)
}
