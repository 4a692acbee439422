//! # warden_api
//!
//! HTTP API library for Warden.

pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post, put};
use tower_http::cors::{Any, CorsLayer};
use warden_core::accounts::AccountDirectory;
use warden_core::auth::TokenError;
use warden_core::auth::tokens::AuthService;
use warden_core::events::EventBus;
use warden_core::permissions::PermissionsService;
use warden_core::store::{AccountStore, PermissionsStore, TokenBlacklist, TokenStore};

use crate::config::ApiConfig;
use crate::handlers::{accounts, auth, permissions};

/// Shared application state passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub auth: Arc<AuthService>,
    pub accounts: Arc<AccountDirectory>,
    pub permissions: Arc<PermissionsService>,
    pub events: EventBus,
    /// API configuration.
    pub config: ApiConfig,
}

impl AppState {
    /// Wire the services over one storage backend.
    pub fn new<S>(config: ApiConfig, store: Arc<S>) -> Result<Self, TokenError>
    where
        S: AccountStore + TokenStore + TokenBlacklist + PermissionsStore + 'static,
    {
        let events = EventBus::new();
        let accounts = Arc::new(AccountDirectory::new(store.clone(), events.clone()));
        let auth = Arc::new(AuthService::new(
            config.auth.clone(),
            accounts.clone(),
            store.clone(),
            store.clone(),
            events.clone(),
        )?);
        let permissions = Arc::new(PermissionsService::new(store, &config.permissions));
        Ok(Self {
            auth,
            accounts,
            permissions,
            events,
            config,
        })
    }
}

/// Builds the Axum router with all routes and shared state.
///
/// Every route runs behind the identity middleware; access is then decided
/// per route by the caller's field guard.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/auth/token", post(auth::login_handler))
        .route("/auth/refresh", post(auth::refresh_handler))
        .route("/auth/revoke/{account_id}", post(auth::revoke_handler))
        .route("/auth/verify", get(auth::verify_handler))
        .route(
            "/accounts",
            get(accounts::list_accounts_handler).post(accounts::create_account_handler),
        )
        .route("/accounts/me", get(accounts::me_handler))
        .route(
            "/accounts/{id}",
            get(accounts::get_account_handler)
                .patch(accounts::update_account_handler)
                .delete(accounts::delete_account_handler),
        )
        .route(
            "/permissions/maps",
            post(permissions::create_map_handler),
        )
        .route(
            "/permissions/maps/{id}",
            get(permissions::get_map_handler).patch(permissions::update_map_handler),
        )
        .route("/permissions/active", put(permissions::set_active_map_handler))
        .route(
            "/permissions/privileges",
            get(permissions::privileges_handler),
        )
        .route("/permissions/check", post(permissions::check_handler))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::resolve_identity,
        ))
        .layer(cors)
        .with_state(state)
}
