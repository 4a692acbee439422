//! Token lifecycle: issuance, persistence, verification, rotation,
//! revocation and expiry sweeping.
//!
//! A token moves `issued → valid → {revoked | expired}` and never comes
//! back. Only lightweight [`TokenRecord`]s are persisted; the signed payload
//! is handed to the caller.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use http::HeaderMap;
use serde::de::DeserializeOwned;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::bearer::extract_token_from_request;
use super::jwt::TokenCodec;
use super::{AuthError, TokenError};
use crate::accounts::{AccountDirectory, AccountError};
use crate::config::AuthConfig;
use crate::events::{AuthEvent, EventBus};
use crate::ids::uuidv7;
use crate::models::account::AccountStatus;
use crate::models::token::{
    AccessTokenPayload, ExpiryOverrides, RefreshTokenPayload, SignedToken, TokenPackage,
    TokenRecord, TokenSubject, TokenType,
};
use crate::store::{TokenBlacklist, TokenStore};

/// Role every authenticated subject carries in its tokens.
pub const AUTHORIZED_ROLE: &str = "authorized";

/// How long after its expiry second a record is kept before the sweep.
const EXPIRY_GRACE_SECS: i64 = 1;

/// Outcome of one expiry sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Token records deleted.
    pub purged: u64,
    /// Whether the matching blacklist entries were removed.
    pub blacklist_cleared: bool,
}

impl From<AccountError> for AuthError {
    fn from(e: AccountError) -> Self {
        match e {
            AccountError::NotFound(_) => AuthError::Unauthorized("Account not found".into()),
            AccountError::Store(e) => AuthError::Store(e),
            other => AuthError::Server(other.to_string()),
        }
    }
}

pub struct AuthService {
    accounts: Arc<AccountDirectory>,
    tokens: Arc<dyn TokenStore>,
    blacklist: Arc<dyn TokenBlacklist>,
    codec: TokenCodec,
    config: AuthConfig,
    events: EventBus,
}

impl AuthService {
    /// Build the service; fails when the configured key material is unusable.
    pub fn new(
        config: AuthConfig,
        accounts: Arc<AccountDirectory>,
        tokens: Arc<dyn TokenStore>,
        blacklist: Arc<dyn TokenBlacklist>,
        events: EventBus,
    ) -> Result<Self, TokenError> {
        let codec = TokenCodec::from_config(&config)?;
        Ok(Self {
            accounts,
            tokens,
            blacklist,
            codec,
            config,
            events,
        })
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    pub fn access_token_lifetime(&self) -> Duration {
        Duration::from_secs(self.config.access_token_lifetime_secs.max(0) as u64)
    }

    /// Build and sign an access/refresh pair. No persistence side effect.
    pub fn generate_tokens(
        &self,
        subject: &TokenSubject,
        overrides: ExpiryOverrides,
    ) -> Result<TokenPackage, AuthError> {
        let now = Utc::now().timestamp();
        let access_exp = expiry(
            now,
            overrides
                .access_token_lifetime_secs
                .unwrap_or(self.config.access_token_lifetime_secs),
        )?;
        let refresh_exp = expiry(
            now,
            overrides
                .refresh_token_lifetime_secs
                .unwrap_or(self.config.refresh_token_lifetime_secs),
        )?;

        let access = AccessTokenPayload {
            token_type: TokenType::Access,
            id: uuidv7(),
            uuid: subject.id,
            roles: subject.roles.clone(),
            exp: access_exp,
            iss: self.config.issuer.clone(),
        };
        let refresh = RefreshTokenPayload {
            token_type: TokenType::Refresh,
            id: uuidv7(),
            uuid: subject.id,
            roles: subject.roles.clone(),
            exp: refresh_exp,
            iss: self.config.issuer.clone(),
            associated: access.id,
        };

        Ok(TokenPackage {
            access_token: SignedToken {
                token: self.codec.sign(&access)?,
                payload: access,
            },
            refresh_token: SignedToken {
                token: self.codec.sign(&refresh)?,
                payload: refresh,
            },
        })
    }

    /// Issue and persist a token pair for an existing account.
    ///
    /// The pair is only returned once both records are stored.
    pub async fn register_tokens(
        &self,
        account_id: Uuid,
        device_info: Option<serde_json::Value>,
    ) -> Result<TokenPackage, AuthError> {
        let account = self
            .accounts
            .find(account_id)
            .await?
            .filter(|a| !a.deleted)
            .ok_or_else(|| AuthError::Unauthorized("Account not found".into()))?;

        let mut roles = vec![AUTHORIZED_ROLE.to_string()];
        roles.extend(account.roles.iter().cloned());

        let package = self.generate_tokens(
            &TokenSubject {
                id: account.id,
                roles,
            },
            ExpiryOverrides::default(),
        )?;

        let access = &package.access_token.payload;
        let refresh = &package.refresh_token.payload;
        let access_record = TokenRecord {
            id: access.id,
            account: account.id,
            token_type: TokenType::Access,
            associated: None,
            expired_at: timestamp(access.exp)?,
            device_info: device_info.clone(),
        };
        let refresh_record = TokenRecord {
            id: refresh.id,
            account: account.id,
            token_type: TokenType::Refresh,
            associated: Some(access.id),
            expired_at: timestamp(refresh.exp)?,
            device_info,
        };

        if let Err(e) = self
            .tokens
            .insert_token_pair(&access_record, &refresh_record)
            .await
        {
            error!(account_id = %account.id, error = %e, "failed to register token pair");
            return Err(AuthError::Server(format!(
                "register tokens for account {}: {e}",
                account.id
            )));
        }

        debug!(account_id = %account.id, access_id = %access.id, "token pair registered");
        Ok(package)
    }

    /// Verify an access token: signature, expiry, issuer, type, blacklist.
    pub async fn verify_token(&self, token: &str) -> Result<AccessTokenPayload, AuthError> {
        let payload: AccessTokenPayload = self.verify_typed(token, TokenType::Access)?;
        self.ensure_not_revoked(payload.id).await?;
        Ok(payload)
    }

    /// Verify a refresh token: signature, expiry, issuer, type, blacklist.
    pub async fn verify_refresh_token(
        &self,
        token: &str,
    ) -> Result<RefreshTokenPayload, AuthError> {
        let payload: RefreshTokenPayload = self.verify_typed(token, TokenType::Refresh)?;
        self.ensure_not_revoked(payload.id).await?;
        Ok(payload)
    }

    /// Resolve the caller identity for one request.
    ///
    /// No bearer token means anonymous. A verification that outlives
    /// `deadline` also yields anonymous, never an implicit grant.
    pub async fn identify(
        &self,
        headers: &HeaderMap,
        deadline: Duration,
    ) -> Result<AccessTokenPayload, AuthError> {
        let Some(token) = extract_token_from_request(headers) else {
            return Ok(AccessTokenPayload::anonymous());
        };
        match tokio::time::timeout(deadline, self.verify_token(&token)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(?deadline, "token verification timed out, treating caller as anonymous");
                Ok(AccessTokenPayload::anonymous())
            }
        }
    }

    /// Login flow.
    ///
    /// Unknown login and wrong password are indistinguishable. A forbidden
    /// account is rejected before any token is issued.
    pub async fn authenticate(
        &self,
        login: &str,
        password: &str,
        device_info: Option<serde_json::Value>,
    ) -> Result<TokenPackage, AuthError> {
        let account = self
            .accounts
            .verify_credentials(login, password)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        if account.status == AccountStatus::Forbidden {
            info!(account_id = %account.id, "login refused for forbidden account");
            return Err(AuthError::AccountForbidden);
        }

        let package = self.register_tokens(account.id, device_info).await?;
        info!(account_id = %account.id, "authentication succeeded");
        self.events.publish(AuthEvent::AuthenticationSuccess {
            account_id: account.id,
        });
        Ok(package)
    }

    /// Exchange a refresh token for a new pair. The old pair is blacklisted,
    /// so a refresh token works once.
    ///
    /// Blacklisting the refresh id is the claim: of two concurrent calls with
    /// the same token, only the one whose insert lands gets a new pair.
    pub async fn refresh_tokens(
        &self,
        refresh_token: &str,
        device_info: Option<serde_json::Value>,
    ) -> Result<TokenPackage, AuthError> {
        let payload = self.verify_refresh_token(refresh_token).await?;
        if self.tokens.get_token(payload.id).await?.is_none() {
            return Err(AuthError::Unauthorized("Token was revoked".into()));
        }

        if self.blacklist.add(&[payload.id]).await? == 0 {
            debug!(refresh_id = %payload.id, "refresh token already consumed");
            return Err(AuthError::Unauthorized("Token was revoked".into()));
        }
        self.blacklist.add(&[payload.associated]).await?;

        let account = self
            .accounts
            .find(payload.uuid)
            .await?
            .filter(|a| !a.deleted)
            .ok_or_else(|| AuthError::Unauthorized("Account not found".into()))?;
        if account.status == AccountStatus::Forbidden {
            return Err(AuthError::AccountForbidden);
        }

        self.register_tokens(account.id, device_info).await
    }

    /// Blacklist specific token ids. Repeating the call is harmless.
    pub async fn revoke_tokens(&self, ids: &[Uuid]) -> Result<(), AuthError> {
        if ids.is_empty() {
            return Ok(());
        }
        self.blacklist.add(ids).await?;
        info!(count = ids.len(), "tokens revoked");
        Ok(())
    }

    /// Blacklist every token the account holds. Returns how many ids were
    /// blacklisted.
    pub async fn revoke_account_tokens(&self, account_id: Uuid) -> Result<usize, AuthError> {
        let ids: Vec<Uuid> = self
            .tokens
            .list_account_tokens(account_id)
            .await?
            .into_iter()
            .map(|t| t.id)
            .collect();
        self.revoke_tokens(&ids).await?;
        info!(%account_id, count = ids.len(), "account tokens revoked");
        Ok(ids.len())
    }

    pub async fn account_tokens(&self, account_id: Uuid) -> Result<Vec<TokenRecord>, AuthError> {
        Ok(self.tokens.list_account_tokens(account_id).await?)
    }

    /// Purge token records whose token can no longer verify.
    ///
    /// `exp` is checked in whole seconds, so a token stays valid through the
    /// second it expires in; records are only purged once that second is
    /// over. Blacklist cleanup is best-effort: a failure is logged and
    /// reported, and the records are deleted anyway.
    pub async fn clear_expired_tokens(&self) -> Result<SweepReport, AuthError> {
        let cutoff = Utc::now() - chrono::Duration::seconds(EXPIRY_GRACE_SECS);
        let expired = self.tokens.list_expired_tokens(cutoff).await?;
        if expired.is_empty() {
            return Ok(SweepReport {
                purged: 0,
                blacklist_cleared: true,
            });
        }

        let blacklist_cleared = match self.blacklist.remove(&expired).await {
            Ok(()) => true,
            Err(e) => {
                warn!(count = expired.len(), error = %e, "failed to clear blacklist for expired tokens");
                false
            }
        };

        let purged = self.tokens.delete_tokens(&expired).await?;
        info!(purged, blacklist_cleared, "expired tokens purged");
        Ok(SweepReport {
            purged,
            blacklist_cleared,
        })
    }

    fn verify_typed<T: DeserializeOwned>(
        &self,
        token: &str,
        expected: TokenType,
    ) -> Result<T, AuthError> {
        let claims: serde_json::Value = self.codec.verify(token)?;
        let token_type = claims.get("type").and_then(serde_json::Value::as_str);
        if token_type != Some(expected.as_str()) {
            return Err(TokenError::WrongType { expected }.into());
        }
        serde_json::from_value(claims)
            .map_err(|e| AuthError::Token(TokenError::Malformed(e.to_string())))
    }

    async fn ensure_not_revoked(&self, id: Uuid) -> Result<(), AuthError> {
        if self.blacklist.contains(id).await? {
            return Err(AuthError::Unauthorized("Token was revoked".into()));
        }
        Ok(())
    }
}

fn expiry(now: i64, lifetime_secs: i64) -> Result<i64, AuthError> {
    now.checked_add(lifetime_secs)
        .ok_or_else(|| AuthError::Server(format!("token lifetime {lifetime_secs}s out of range")))
}

fn timestamp(secs: i64) -> Result<DateTime<Utc>, AuthError> {
    DateTime::<Utc>::from_timestamp(secs, 0)
        .ok_or_else(|| AuthError::Server(format!("expiry {secs} out of range")))
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::auth::jwt::tests::test_config;
    use crate::models::account::CreateAccount;
    use crate::store::StoreError;
    use crate::store::memory::MemoryStore;

    struct Fixture {
        service: AuthService,
        accounts: Arc<AccountDirectory>,
        store: Arc<MemoryStore>,
        events: EventBus,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        fixture_with(store.clone(), store.clone(), store)
    }

    fn fixture_with(
        store: Arc<MemoryStore>,
        tokens: Arc<dyn TokenStore>,
        blacklist: Arc<dyn TokenBlacklist>,
    ) -> Fixture {
        let events = EventBus::new();
        let accounts = Arc::new(AccountDirectory::new(store.clone(), events.clone()));
        let service = AuthService::new(
            test_config(),
            accounts.clone(),
            tokens,
            blacklist,
            events.clone(),
        )
        .unwrap();
        Fixture {
            service,
            accounts,
            store,
            events,
        }
    }

    async fn create_account(accounts: &AccountDirectory, login: &str, status: AccountStatus) -> Uuid {
        accounts
            .create(CreateAccount {
                login: login.into(),
                password: "pa55word".into(),
                status,
                roles: vec!["viewer".into()],
            })
            .await
            .unwrap()
            .id
    }

    #[test]
    fn generated_pair_is_linked_and_expires_on_schedule() {
        let f = fixture();
        let subject = TokenSubject {
            id: Uuid::now_v7(),
            roles: vec!["editor".into()],
        };
        let before = Utc::now().timestamp();
        let pair = f
            .service
            .generate_tokens(&subject, ExpiryOverrides::default())
            .unwrap();
        let after = Utc::now().timestamp();

        let access = &pair.access_token.payload;
        let refresh = &pair.refresh_token.payload;
        assert_eq!(refresh.associated, access.id);
        assert_ne!(refresh.id, access.id);
        assert_eq!(access.roles, vec!["editor"]);
        assert_eq!(access.uuid, subject.id);

        let cfg = f.service.config();
        assert!(access.exp >= before + cfg.access_token_lifetime_secs);
        assert!(access.exp <= after + cfg.access_token_lifetime_secs);
        assert!(refresh.exp >= before + cfg.refresh_token_lifetime_secs);
        assert!(refresh.exp <= after + cfg.refresh_token_lifetime_secs);
    }

    #[test]
    fn overrides_replace_lifetimes() {
        let f = fixture();
        let now = Utc::now().timestamp();
        let pair = f
            .service
            .generate_tokens(
                &TokenSubject {
                    id: Uuid::now_v7(),
                    roles: vec![],
                },
                ExpiryOverrides {
                    access_token_lifetime_secs: Some(5),
                    refresh_token_lifetime_secs: Some(10),
                },
            )
            .unwrap();
        assert!(pair.access_token.payload.exp - now <= 6);
        assert!(pair.refresh_token.payload.exp - now <= 11);
    }

    #[test]
    fn oversized_lifetime_is_rejected() {
        let f = fixture();
        let err = f
            .service
            .generate_tokens(
                &TokenSubject {
                    id: Uuid::now_v7(),
                    roles: vec![],
                },
                ExpiryOverrides {
                    access_token_lifetime_secs: Some(i64::MAX),
                    refresh_token_lifetime_secs: None,
                },
            )
            .unwrap_err();
        assert!(matches!(err, AuthError::Server(_)));
    }

    #[tokio::test]
    async fn register_persists_both_records() {
        let f = fixture();
        let id = create_account(&f.accounts, "alice", AccountStatus::Allowed).await;

        let pair = f.service.register_tokens(id, None).await.unwrap();
        assert_eq!(pair.access_token.payload.roles, vec!["authorized", "viewer"]);

        let records = f.service.account_tokens(id).await.unwrap();
        assert_eq!(records.len(), 2);
        let refresh = records
            .iter()
            .find(|r| r.token_type == TokenType::Refresh)
            .unwrap();
        assert_eq!(refresh.associated, Some(pair.access_token.payload.id));
        assert_eq!(
            refresh.expired_at.timestamp(),
            pair.refresh_token.payload.exp
        );
    }

    #[tokio::test]
    async fn register_for_unknown_account_is_unauthorized() {
        let f = fixture();
        let err = f
            .service
            .register_tokens(Uuid::now_v7(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Unauthorized(_)));
    }

    struct FailingTokenStore;

    #[async_trait]
    impl TokenStore for FailingTokenStore {
        async fn insert_token_pair(
            &self,
            _access: &TokenRecord,
            _refresh: &TokenRecord,
        ) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("disk full".into()))
        }
        async fn get_token(&self, _id: Uuid) -> Result<Option<TokenRecord>, StoreError> {
            Ok(None)
        }
        async fn list_account_tokens(&self, _id: Uuid) -> Result<Vec<TokenRecord>, StoreError> {
            Ok(vec![])
        }
        async fn list_expired_tokens(&self, _cutoff: DateTime<Utc>) -> Result<Vec<Uuid>, StoreError> {
            Ok(vec![])
        }
        async fn delete_tokens(&self, _ids: &[Uuid]) -> Result<u64, StoreError> {
            Ok(0)
        }
    }

    #[tokio::test]
    async fn persistence_failure_returns_no_tokens() {
        let store = Arc::new(MemoryStore::new());
        let f = fixture_with(store.clone(), Arc::new(FailingTokenStore), store);
        let id = create_account(&f.accounts, "alice", AccountStatus::Allowed).await;

        let err = f.service.register_tokens(id, None).await.unwrap_err();
        assert!(matches!(err, AuthError::Server(_)));
    }

    #[tokio::test]
    async fn verify_accepts_fresh_token_and_rejects_revoked() {
        let f = fixture();
        let id = create_account(&f.accounts, "alice", AccountStatus::Allowed).await;
        let pair = f.service.register_tokens(id, None).await.unwrap();

        let payload = f.service.verify_token(&pair.access_token.token).await.unwrap();
        assert_eq!(payload, pair.access_token.payload);

        f.service.revoke_account_tokens(id).await.unwrap();
        let err = f
            .service
            .verify_token(&pair.access_token.token)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Unauthorized(m) if m == "Token was revoked"));
    }

    #[tokio::test]
    async fn revocation_is_idempotent() {
        let f = fixture();
        let id = create_account(&f.accounts, "alice", AccountStatus::Allowed).await;
        let pair = f.service.register_tokens(id, None).await.unwrap();

        assert_eq!(f.service.revoke_account_tokens(id).await.unwrap(), 2);
        assert_eq!(f.service.revoke_account_tokens(id).await.unwrap(), 2);
        assert_eq!(f.store.blacklist_len(), 2);
        assert!(f.service.verify_token(&pair.access_token.token).await.is_err());
    }

    #[tokio::test]
    async fn refresh_token_is_not_an_access_token() {
        let f = fixture();
        let id = create_account(&f.accounts, "alice", AccountStatus::Allowed).await;
        let pair = f.service.register_tokens(id, None).await.unwrap();

        let err = f
            .service
            .verify_token(&pair.refresh_token.token)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AuthError::Token(TokenError::WrongType {
                expected: TokenType::Access
            })
        ));
        let err = f
            .service
            .verify_refresh_token(&pair.access_token.token)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Token(TokenError::WrongType { .. })));
    }

    #[tokio::test]
    async fn authenticate_issues_tokens_and_emits_event() {
        let f = fixture();
        let mut rx = f.events.subscribe();
        let id = create_account(&f.accounts, "alice", AccountStatus::Allowed).await;

        let pair = f.service.authenticate("alice", "pa55word", None).await.unwrap();
        assert_eq!(pair.access_token.payload.uuid, id);
        assert_eq!(
            rx.recv().await.unwrap(),
            AuthEvent::AuthenticationSuccess { account_id: id }
        );
    }

    #[tokio::test]
    async fn authenticate_hides_which_credential_was_wrong() {
        let f = fixture();
        create_account(&f.accounts, "alice", AccountStatus::Allowed).await;

        let unknown = f.service.authenticate("mallory", "pa55word", None).await;
        let wrong = f.service.authenticate("alice", "guess", None).await;
        assert!(matches!(unknown, Err(AuthError::InvalidCredentials)));
        assert!(matches!(wrong, Err(AuthError::InvalidCredentials)));
    }

    #[tokio::test]
    async fn forbidden_account_gets_no_tokens() {
        let f = fixture();
        let id = create_account(&f.accounts, "alice", AccountStatus::Forbidden).await;

        let err = f
            .service
            .authenticate("alice", "pa55word", None)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::AccountForbidden));
        assert!(f.service.account_tokens(id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn refresh_rotates_the_pair_once() {
        let f = fixture();
        let id = create_account(&f.accounts, "alice", AccountStatus::Allowed).await;
        let first = f.service.register_tokens(id, None).await.unwrap();

        let second = f
            .service
            .refresh_tokens(&first.refresh_token.token, None)
            .await
            .unwrap();
        assert_ne!(second.access_token.payload.id, first.access_token.payload.id);
        assert!(f.service.verify_token(&second.access_token.token).await.is_ok());

        // The old pair is dead.
        assert!(f.service.verify_token(&first.access_token.token).await.is_err());
        let reuse = f
            .service
            .refresh_tokens(&first.refresh_token.token, None)
            .await
            .unwrap_err();
        assert!(matches!(reuse, AuthError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn sweep_removes_only_expired_records() {
        let f = fixture();
        let id = create_account(&f.accounts, "alice", AccountStatus::Allowed).await;
        let live = f.service.register_tokens(id, None).await.unwrap();

        let now = Utc::now();
        let stale_access = TokenRecord {
            id: Uuid::now_v7(),
            account: id,
            token_type: TokenType::Access,
            associated: None,
            expired_at: now - chrono::Duration::seconds(30),
            device_info: None,
        };
        let live_refresh = TokenRecord {
            id: Uuid::now_v7(),
            account: id,
            token_type: TokenType::Refresh,
            associated: Some(stale_access.id),
            expired_at: now + chrono::Duration::seconds(3600),
            device_info: None,
        };
        f.store
            .insert_token_pair(&stale_access, &live_refresh)
            .await
            .unwrap();
        f.service
            .revoke_tokens(&[stale_access.id, live.access_token.payload.id])
            .await
            .unwrap();

        let report = f.service.clear_expired_tokens().await.unwrap();
        assert_eq!(
            report,
            SweepReport {
                purged: 1,
                blacklist_cleared: true
            }
        );
        assert_eq!(f.store.token_count(), 3);
        assert!(f.store.get_token(stale_access.id).await.unwrap().is_none());
        assert!(f.store.get_token(live_refresh.id).await.unwrap().is_some());
        // Only the purged token left the blacklist.
        assert_eq!(f.store.blacklist_len(), 1);
    }

    #[tokio::test]
    async fn revoked_token_stays_dead_through_its_expiry_second() {
        let f = fixture();
        let id = create_account(&f.accounts, "alice", AccountStatus::Allowed).await;
        let pair = f
            .service
            .generate_tokens(
                &TokenSubject {
                    id,
                    roles: vec![AUTHORIZED_ROLE.into()],
                },
                ExpiryOverrides {
                    access_token_lifetime_secs: Some(0),
                    refresh_token_lifetime_secs: Some(3600),
                },
            )
            .unwrap();
        let access = &pair.access_token.payload;
        let refresh = &pair.refresh_token.payload;
        f.store
            .insert_token_pair(
                &TokenRecord {
                    id: access.id,
                    account: id,
                    token_type: TokenType::Access,
                    associated: None,
                    expired_at: timestamp(access.exp).unwrap(),
                    device_info: None,
                },
                &TokenRecord {
                    id: refresh.id,
                    account: id,
                    token_type: TokenType::Refresh,
                    associated: Some(access.id),
                    expired_at: timestamp(refresh.exp).unwrap(),
                    device_info: None,
                },
            )
            .await
            .unwrap();

        f.service.revoke_account_tokens(id).await.unwrap();
        f.service.clear_expired_tokens().await.unwrap();

        // Either the record and its blacklist entry survived the sweep, or
        // the expiry second is over and the signature check rejects it.
        assert!(f.service.verify_token(&pair.access_token.token).await.is_err());
    }

    /// Reports every id as absent, as seen by a request that checked the
    /// blacklist before a concurrent request wrote to it.
    struct StaleReadBlacklist(Arc<MemoryStore>);

    #[async_trait]
    impl TokenBlacklist for StaleReadBlacklist {
        async fn add(&self, ids: &[Uuid]) -> Result<u64, StoreError> {
            self.0.add(ids).await
        }
        async fn contains(&self, _id: Uuid) -> Result<bool, StoreError> {
            Ok(false)
        }
        async fn remove(&self, ids: &[Uuid]) -> Result<(), StoreError> {
            self.0.remove(ids).await
        }
    }

    #[tokio::test]
    async fn concurrent_refreshes_issue_one_pair() {
        let store = Arc::new(MemoryStore::new());
        let f = fixture_with(
            store.clone(),
            store.clone(),
            Arc::new(StaleReadBlacklist(store.clone())),
        );
        let id = create_account(&f.accounts, "alice", AccountStatus::Allowed).await;
        let first = f.service.register_tokens(id, None).await.unwrap();
        let token = &first.refresh_token.token;

        let (a, b) = tokio::join!(
            f.service.refresh_tokens(token, None),
            f.service.refresh_tokens(token, None)
        );
        let (won, lost): (Vec<_>, Vec<_>) = [a, b].into_iter().partition(Result::is_ok);
        assert_eq!(won.len(), 1);
        assert!(matches!(
            lost.into_iter().next(),
            Some(Err(AuthError::Unauthorized(m))) if m == "Token was revoked"
        ));
        // Two pairs: the original and the single rotation.
        assert_eq!(f.store.token_count(), 4);
    }

    struct BrokenBlacklist;

    #[async_trait]
    impl TokenBlacklist for BrokenBlacklist {
        async fn add(&self, ids: &[Uuid]) -> Result<u64, StoreError> {
            Ok(ids.len() as u64)
        }
        async fn contains(&self, _id: Uuid) -> Result<bool, StoreError> {
            Ok(false)
        }
        async fn remove(&self, _ids: &[Uuid]) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("blacklist offline".into()))
        }
    }

    #[tokio::test]
    async fn sweep_deletes_even_when_blacklist_cleanup_fails() {
        let store = Arc::new(MemoryStore::new());
        let f = fixture_with(store.clone(), store.clone(), Arc::new(BrokenBlacklist));
        let id = create_account(&f.accounts, "alice", AccountStatus::Allowed).await;
        let expired = TokenRecord {
            id: Uuid::now_v7(),
            account: id,
            token_type: TokenType::Access,
            associated: None,
            expired_at: Utc::now() - chrono::Duration::seconds(5),
            device_info: None,
        };
        let refresh = TokenRecord {
            id: Uuid::now_v7(),
            token_type: TokenType::Refresh,
            associated: Some(expired.id),
            ..expired.clone()
        };
        store.insert_token_pair(&expired, &refresh).await.unwrap();

        let report = f.service.clear_expired_tokens().await.unwrap();
        assert_eq!(report.purged, 2);
        assert!(!report.blacklist_cleared);
        assert_eq!(store.token_count(), 0);
    }

    struct SlowBlacklist;

    #[async_trait]
    impl TokenBlacklist for SlowBlacklist {
        async fn add(&self, ids: &[Uuid]) -> Result<u64, StoreError> {
            Ok(ids.len() as u64)
        }
        async fn contains(&self, _id: Uuid) -> Result<bool, StoreError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(false)
        }
        async fn remove(&self, _ids: &[Uuid]) -> Result<(), StoreError> {
            Ok(())
        }
    }

    fn bearer(token: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            http::header::AUTHORIZATION,
            format!("Bearer {token}").parse().unwrap(),
        );
        headers
    }

    #[tokio::test]
    async fn identify_without_token_is_anonymous() {
        let f = fixture();
        let identity = f
            .service
            .identify(&HeaderMap::new(), Duration::from_secs(1))
            .await
            .unwrap();
        assert!(identity.is_anonymous());
    }

    #[tokio::test]
    async fn identify_rejects_invalid_token() {
        let f = fixture();
        let err = f
            .service
            .identify(&bearer("garbage"), Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Token(TokenError::Malformed(_))));
    }

    #[tokio::test]
    async fn identify_fails_closed_on_timeout() {
        let store = Arc::new(MemoryStore::new());
        let f = fixture_with(store.clone(), store, Arc::new(SlowBlacklist));
        let id = create_account(&f.accounts, "alice", AccountStatus::Allowed).await;
        let pair = f.service.register_tokens(id, None).await.unwrap();

        let identity = f
            .service
            .identify(&bearer(&pair.access_token.token), Duration::from_millis(20))
            .await
            .unwrap();
        assert!(identity.is_anonymous());
    }
}
