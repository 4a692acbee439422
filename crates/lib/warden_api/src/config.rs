//! API server configuration.

use std::time::Duration;

use warden_core::config::{AuthConfig, ConfigError, PermissionsConfig, parse_or};

/// Default budget for resolving a bearer token.
pub const DEFAULT_VERIFY_TIMEOUT_MS: u64 = 2000;

/// Configuration for the API server.
#[derive(Clone, Debug)]
pub struct ApiConfig {
    /// Address to bind the HTTP listener (e.g. "127.0.0.1:4000").
    pub bind_addr: String,
    /// PostgreSQL connection URL.
    pub database_url: String,
    pub auth: AuthConfig,
    pub permissions: PermissionsConfig,
    /// Period of the expired-token sweep.
    pub sweep_interval: Duration,
    /// Deadline for token verification; past it the caller is anonymous.
    pub verify_timeout: Duration,
}

impl ApiConfig {
    /// Reads configuration from environment variables with sensible defaults.
    ///
    /// | Variable                   | Default                              |
    /// |----------------------------|--------------------------------------|
    /// | `BIND_ADDR`                | `127.0.0.1:4000`                     |
    /// | `DATABASE_URL`             | `postgres://localhost:5432/warden`   |
    /// | `WARDEN_SWEEP_INTERVAL`    | access token lifetime (seconds)      |
    /// | `WARDEN_VERIFY_TIMEOUT_MS` | `2000`                               |
    ///
    /// Token and permission settings come from [`AuthConfig::from_env`] and
    /// [`PermissionsConfig::from_env`].
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let auth = AuthConfig::from_lookup(&lookup)?;
        let permissions = PermissionsConfig::from_lookup(&lookup)?;
        let access_ttl = auth.access_token_lifetime_secs.max(1) as u64;

        Ok(Self {
            bind_addr: lookup("BIND_ADDR").unwrap_or_else(|| "127.0.0.1:4000".into()),
            database_url: lookup("DATABASE_URL")
                .unwrap_or_else(|| "postgres://localhost:5432/warden".into()),
            sweep_interval: Duration::from_secs(parse_or(
                &lookup,
                "WARDEN_SWEEP_INTERVAL",
                access_ttl,
            )?),
            verify_timeout: Duration::from_millis(parse_or(
                &lookup,
                "WARDEN_VERIFY_TIMEOUT_MS",
                DEFAULT_VERIFY_TIMEOUT_MS,
            )?),
            auth,
            permissions,
        })
    }
}
