//! Warden API server binary.
//!
//! Token and permission settings are read from the environment (see
//! `warden_api::config::ApiConfig::from_env`); the flags below override the
//! listener and storage.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use sqlx::postgres::PgPoolOptions;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use warden_api::AppState;
use warden_api::config::ApiConfig;
use warden_core::auth::sweeper::spawn_sweeper;
use warden_core::store::memory::MemoryStore;
use warden_core::store::postgres::PgStore;

const DEFAULT_LOG_FILTER: &str = "info,warden_api=debug,warden_core=debug";

/// CLI arguments for the API server.
#[derive(Parser, Debug)]
#[command(name = "warden_server", about = "Warden API server")]
struct Args {
    /// Address to listen on.
    #[arg(long, env = "BIND_ADDR", default_value = "127.0.0.1:4000")]
    bind: String,

    /// PostgreSQL connection URL.
    #[arg(
        long,
        env = "DATABASE_URL",
        default_value = "postgres://localhost:5432/warden"
    )]
    database_url: String,

    /// Maximum number of database connections in the pool.
    #[arg(long, default_value_t = 5)]
    max_connections: u32,

    /// Keep all state in process memory instead of PostgreSQL. Nothing
    /// survives a restart.
    #[arg(long, default_value_t = false)]
    in_memory: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .init();

    let args = Args::parse();

    let mut config = ApiConfig::from_env()?;
    config.bind_addr = args.bind.clone();
    config.database_url = args.database_url.clone();

    info!(
        bind = %config.bind_addr,
        algorithm = ?config.auth.algorithm,
        in_memory = args.in_memory,
        "starting warden_server"
    );

    let state = if args.in_memory {
        warn!("in-memory storage: accounts and tokens are lost on exit");
        AppState::new(config.clone(), Arc::new(MemoryStore::new()))?
    } else {
        info!(max_connections = args.max_connections, "configuring connection pool");
        let pool = PgPoolOptions::new()
            .max_connections(args.max_connections)
            .acquire_timeout(Duration::from_secs(30))
            .connect(&config.database_url)
            .await?;

        let store = PgStore::new(pool);
        info!("running database migrations");
        store.migrate().await?;
        AppState::new(config.clone(), Arc::new(store))?
    };

    state.permissions.ensure_recovery_map().await?;
    info!(
        map_id = %state.permissions.active_map_id().await,
        "permissions map selected"
    );

    let shutdown = CancellationToken::new();
    let sweeper = spawn_sweeper(state.auth.clone(), config.sweep_interval, shutdown.clone());

    let app = warden_api::router(state);
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    info!(addr = %listener.local_addr()?, "REST API listening");

    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("interrupt received, shutting down");
            }
            shutdown.cancel();
        }
    });

    let api_result = axum::serve(listener, app)
        .with_graceful_shutdown({
            let shutdown = shutdown.clone();
            async move { shutdown.cancelled().await }
        })
        .await;

    // When the REST API exits, also stop the sweeper.
    shutdown.cancel();
    let _ = sweeper.await;

    api_result?;

    Ok(())
}
