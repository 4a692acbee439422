//! Authentication request handlers.

use axum::Extension;
use axum::Json;
use axum::extract::{Path, State};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use warden_core::auth::AuthError;
use warden_core::models::token::{AccessTokenPayload, TokenPackage};

use crate::AppState;
use crate::error::AppResult;
use crate::middleware::auth::RequestContext;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub login: String,
    pub password: String,
    #[serde(default)]
    pub device_info: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: String,
    #[serde(default)]
    pub device_info: Option<serde_json::Value>,
}

/// Issued token pair with expiry timestamps (seconds since epoch).
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenBag {
    pub access_token: String,
    pub refresh_token: String,
    pub access_token_expires_at: i64,
    pub refresh_token_expires_at: i64,
}

impl From<TokenPackage> for TokenBag {
    fn from(pkg: TokenPackage) -> Self {
        Self {
            access_token_expires_at: pkg.access_token.payload.exp,
            refresh_token_expires_at: pkg.refresh_token.payload.exp,
            access_token: pkg.access_token.token,
            refresh_token: pkg.refresh_token.token,
        }
    }
}

/// Login outcome. Credential problems are a typed result, not a transport
/// error.
#[derive(Debug, Serialize)]
#[serde(tag = "__typename")]
pub enum LoginResponse {
    TokenBag(TokenBag),
    TokenRegistrationError { name: String, msg: String },
}

#[derive(Debug, Serialize)]
pub struct RevokeResponse {
    pub revoked: usize,
}

/// `POST /auth/token` — exchange login and password for a token pair.
pub async fn login_handler(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Json(body): Json<LoginRequest>,
) -> AppResult<Json<LoginResponse>> {
    ctx.check("AuthenticationMutation", "create")?;

    let outcome = state
        .auth
        .authenticate(&body.login, &body.password, body.device_info)
        .await;
    let resp = match outcome {
        Ok(pkg) => LoginResponse::TokenBag(pkg.into()),
        Err(e @ AuthError::InvalidCredentials) => LoginResponse::TokenRegistrationError {
            name: "InvalidCredentials".into(),
            msg: e.to_string(),
        },
        Err(e @ AuthError::AccountForbidden) => LoginResponse::TokenRegistrationError {
            name: "AccountForbidden".into(),
            msg: e.to_string(),
        },
        Err(e) => return Err(e.into()),
    };
    Ok(Json(resp))
}

/// `POST /auth/refresh` — rotate a refresh token into a new pair.
pub async fn refresh_handler(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Json(body): Json<RefreshRequest>,
) -> AppResult<Json<TokenBag>> {
    ctx.check("AuthenticationMutation", "refresh")?;
    let pkg = state
        .auth
        .refresh_tokens(&body.refresh_token, body.device_info)
        .await?;
    Ok(Json(pkg.into()))
}

/// `POST /auth/revoke/{accountId}` — blacklist every token of an account.
pub async fn revoke_handler(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(account_id): Path<Uuid>,
) -> AppResult<Json<RevokeResponse>> {
    ctx.check("AuthenticationMutation", "revoke")?;
    let revoked = state.auth.revoke_account_tokens(account_id).await?;
    Ok(Json(RevokeResponse { revoked }))
}

/// `GET /auth/verify` — the verified payload of the presented access token.
pub async fn verify_handler(
    Extension(ctx): Extension<RequestContext>,
) -> AppResult<Json<AccessTokenPayload>> {
    ctx.check("AuthenticationQuery", "verifyToken")?;
    Ok(Json(ctx.require_identity()?.clone()))
}
