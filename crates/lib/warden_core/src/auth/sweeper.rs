//! Background purge of expired token records.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::tokens::AuthService;

const MIN_SWEEP_INTERVAL: Duration = Duration::from_secs(1);

/// The effective sweep period: never coarser than the access-token
/// lifetime and never below one second.
pub fn sweep_interval(requested: Duration, access_token_lifetime: Duration) -> Duration {
    let upper = access_token_lifetime.max(MIN_SWEEP_INTERVAL);
    requested.clamp(MIN_SWEEP_INTERVAL, upper)
}

/// Run [`AuthService::clear_expired_tokens`] on a timer until `cancel` fires.
///
/// The first sweep runs immediately. A failed sweep is logged and retried on
/// the next tick.
pub fn spawn_sweeper(
    service: Arc<AuthService>,
    interval: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    let period = sweep_interval(interval, service.access_token_lifetime());
    info!(?period, "starting expired token sweeper");

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match service.clear_expired_tokens().await {
                        Ok(report) => debug!(purged = report.purged, "sweep finished"),
                        Err(e) => error!(error = %e, "expired token sweep failed"),
                    }
                }
                _ = cancel.cancelled() => {
                    info!("expired token sweeper stopped");
                    break;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use uuid::Uuid;

    use super::*;
    use crate::accounts::AccountDirectory;
    use crate::auth::jwt::tests::test_config;
    use crate::events::EventBus;
    use crate::models::account::{AccountStatus, CreateAccount};
    use crate::models::token::{TokenRecord, TokenType};
    use crate::store::TokenStore;
    use crate::store::memory::MemoryStore;

    #[test]
    fn interval_is_clamped_to_access_lifetime() {
        let ttl = Duration::from_secs(1800);
        assert_eq!(
            sweep_interval(Duration::from_secs(7200), ttl),
            Duration::from_secs(1800)
        );
        assert_eq!(
            sweep_interval(Duration::from_secs(60), ttl),
            Duration::from_secs(60)
        );
        assert_eq!(sweep_interval(Duration::ZERO, ttl), MIN_SWEEP_INTERVAL);
        assert_eq!(
            sweep_interval(Duration::from_secs(60), Duration::ZERO),
            MIN_SWEEP_INTERVAL
        );
    }

    #[tokio::test]
    async fn sweeper_purges_and_stops_on_cancel() {
        let store = Arc::new(MemoryStore::new());
        let events = EventBus::new();
        let accounts = Arc::new(AccountDirectory::new(store.clone(), events.clone()));
        let service = Arc::new(
            AuthService::new(
                test_config(),
                accounts.clone(),
                store.clone(),
                store.clone(),
                events,
            )
            .unwrap(),
        );

        let account = accounts
            .create(CreateAccount {
                login: "alice".into(),
                password: "pw".into(),
                status: AccountStatus::Allowed,
                roles: vec![],
            })
            .await
            .unwrap();
        let expired = TokenRecord {
            id: Uuid::now_v7(),
            account: account.id,
            token_type: TokenType::Access,
            associated: None,
            expired_at: Utc::now() - chrono::Duration::seconds(10),
            device_info: None,
        };
        let refresh = TokenRecord {
            id: Uuid::now_v7(),
            token_type: TokenType::Refresh,
            associated: Some(expired.id),
            ..expired.clone()
        };
        store.insert_token_pair(&expired, &refresh).await.unwrap();

        let cancel = CancellationToken::new();
        let handle = spawn_sweeper(service, Duration::from_secs(60), cancel.clone());

        for _ in 0..50 {
            if store.token_count() == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(store.token_count(), 0);

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
