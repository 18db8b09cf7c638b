//! Token store: clients, authorization codes, tokens and rate-limit windows.
//!
//! [`TokenStore`] is the seam for swapping in a durable backend. The default
//! [`InMemoryTokenStore`] keeps one `RwLock<HashMap>` per table and a
//! `DashMap` of sliding windows. When more than one table lock is held the
//! order is always codes, then access tokens, then refresh tokens.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::RwLock;
use tokio::time::Instant;

use super::types::{AccessToken, AuthorizationCode, Client, RefreshToken};
use crate::error::{OAuthError, StoreError};

/// Validation run against a code while the store holds it exclusively.
pub type RedeemCheck<'a> =
    &'a (dyn Fn(&AuthorizationCode) -> Result<(), OAuthError> + Send + Sync);

/// Outcome of an attempt to redeem an authorization code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Redemption {
    /// The code passed the check, was marked used and removed.
    Redeemed(AuthorizationCode),
    /// No such code.
    Missing,
    /// The code had expired and was removed.
    Expired,
    /// The code had already been used and was removed.
    AlreadyUsed,
    /// The check rejected the code; it stays in place.
    Rejected(OAuthError),
}

/// Entries removed by one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PurgeStats {
    pub auth_codes: usize,
    pub access_tokens: usize,
    pub refresh_tokens: usize,
    pub rate_limit_keys: usize,
}

impl PurgeStats {
    /// Total entries removed.
    #[must_use]
    pub const fn total(&self) -> usize {
        self.auth_codes + self.access_tokens + self.refresh_tokens + self.rate_limit_keys
    }
}

/// Current table sizes, reported by `/ready`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StoreCounts {
    pub clients: usize,
    pub auth_codes: usize,
    pub access_tokens: usize,
    pub refresh_tokens: usize,
    pub rate_limit_keys: usize,
}

/// Storage for OAuth state.
///
/// Every mutation of a single record is atomic with respect to concurrent
/// callers on the same key.
#[async_trait]
pub trait TokenStore: Send + Sync + fmt::Debug {
    /// Insert a registered client.
    async fn put_client(&self, client: Client) -> Result<(), StoreError>;

    /// Look up a client.
    async fn get_client(&self, client_id: &str) -> Result<Option<Client>, StoreError>;

    /// Insert an outstanding authorization code.
    async fn put_auth_code(&self, code: AuthorizationCode) -> Result<(), StoreError>;

    /// Atomically look up, validate and consume a code.
    ///
    /// Expired and already-used codes are deleted. A code rejected by
    /// `check` is left untouched. A code that passes is marked used and
    /// deleted, so at most one caller ever sees [`Redemption::Redeemed`].
    async fn redeem_auth_code(
        &self,
        code: &str,
        now: DateTime<Utc>,
        check: RedeemCheck<'_>,
    ) -> Result<Redemption, StoreError>;

    /// Insert an access token together with its refresh token.
    async fn put_token_pair(
        &self,
        access: AccessToken,
        refresh: RefreshToken,
    ) -> Result<(), StoreError>;

    /// Look up a live access token, deleting it if it has expired.
    async fn get_access_token(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<AccessToken>, StoreError>;

    /// Delete an access token. Returns whether it existed.
    async fn delete_access_token(&self, token: &str) -> Result<bool, StoreError>;

    /// Delete a refresh token and the access token it references.
    async fn delete_refresh_token(&self, token: &str) -> Result<bool, StoreError>;

    /// Sliding-window admission for `key`.
    async fn check_rate_limit(
        &self,
        key: &str,
        max_requests: usize,
        window: Duration,
    ) -> Result<bool, StoreError>;

    /// Remove expired codes and tokens, and rate-limit timestamps older
    /// than `retention`.
    async fn purge_expired(
        &self,
        now: DateTime<Utc>,
        retention: Duration,
    ) -> Result<PurgeStats, StoreError>;

    /// Current table sizes.
    async fn counts(&self) -> Result<StoreCounts, StoreError>;
}

/// Volatile in-process token store.
#[derive(Clone, Default)]
pub struct InMemoryTokenStore {
    clients: Arc<RwLock<HashMap<String, Client>>>,
    auth_codes: Arc<RwLock<HashMap<String, AuthorizationCode>>>,
    access_tokens: Arc<RwLock<HashMap<String, AccessToken>>>,
    refresh_tokens: Arc<RwLock<HashMap<String, RefreshToken>>>,
    rate_limits: Arc<DashMap<String, VecDeque<Instant>>>,
}

impl InMemoryTokenStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl fmt::Debug for InMemoryTokenStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryTokenStore")
            .field("rate_limit_keys", &self.rate_limits.len())
            .finish()
    }
}

#[async_trait]
impl TokenStore for InMemoryTokenStore {
    async fn put_client(&self, client: Client) -> Result<(), StoreError> {
        self.clients
            .write()
            .await
            .insert(client.client_id.clone(), client);
        Ok(())
    }

    async fn get_client(&self, client_id: &str) -> Result<Option<Client>, StoreError> {
        Ok(self.clients.read().await.get(client_id).cloned())
    }

    async fn put_auth_code(&self, code: AuthorizationCode) -> Result<(), StoreError> {
        self.auth_codes
            .write()
            .await
            .insert(code.code.clone(), code);
        Ok(())
    }

    async fn redeem_auth_code(
        &self,
        code: &str,
        now: DateTime<Utc>,
        check: RedeemCheck<'_>,
    ) -> Result<Redemption, StoreError> {
        let mut codes = self.auth_codes.write().await;
        let Some(stored) = codes.get_mut(code) else {
            return Ok(Redemption::Missing);
        };

        if stored.is_expired_at(now) {
            codes.remove(code);
            return Ok(Redemption::Expired);
        }
        if stored.used {
            codes.remove(code);
            return Ok(Redemption::AlreadyUsed);
        }
        if let Err(err) = check(stored) {
            return Ok(Redemption::Rejected(err));
        }

        stored.used = true;
        Ok(codes
            .remove(code)
            .map_or(Redemption::Missing, Redemption::Redeemed))
    }

    async fn put_token_pair(
        &self,
        access: AccessToken,
        refresh: RefreshToken,
    ) -> Result<(), StoreError> {
        let mut access_tokens = self.access_tokens.write().await;
        let mut refresh_tokens = self.refresh_tokens.write().await;
        access_tokens.insert(access.token.clone(), access);
        refresh_tokens.insert(refresh.token.clone(), refresh);
        Ok(())
    }

    async fn get_access_token(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<AccessToken>, StoreError> {
        {
            let tokens = self.access_tokens.read().await;
            match tokens.get(token) {
                None => return Ok(None),
                Some(record) if !record.is_expired_at(now) => return Ok(Some(record.clone())),
                Some(_) => {}
            }
        }

        // Re-check under the write lock; a concurrent revoke may have won.
        let mut tokens = self.access_tokens.write().await;
        if tokens
            .get(token)
            .is_some_and(|record| record.is_expired_at(now))
        {
            tokens.remove(token);
        }
        Ok(None)
    }

    async fn delete_access_token(&self, token: &str) -> Result<bool, StoreError> {
        Ok(self.access_tokens.write().await.remove(token).is_some())
    }

    async fn delete_refresh_token(&self, token: &str) -> Result<bool, StoreError> {
        let mut access_tokens = self.access_tokens.write().await;
        let mut refresh_tokens = self.refresh_tokens.write().await;
        match refresh_tokens.remove(token) {
            Some(refresh) => {
                access_tokens.remove(&refresh.access_token);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn check_rate_limit(
        &self,
        key: &str,
        max_requests: usize,
        window: Duration,
    ) -> Result<bool, StoreError> {
        let now = Instant::now();
        let mut entry = self.rate_limits.entry(key.to_string()).or_default();
        let timestamps = entry.value_mut();

        while timestamps
            .front()
            .is_some_and(|ts| now.duration_since(*ts) >= window)
        {
            timestamps.pop_front();
        }

        if timestamps.len() >= max_requests {
            return Ok(false);
        }
        timestamps.push_back(now);
        Ok(true)
    }

    async fn purge_expired(
        &self,
        now: DateTime<Utc>,
        retention: Duration,
    ) -> Result<PurgeStats, StoreError> {
        let mut stats = PurgeStats::default();

        {
            let mut codes = self.auth_codes.write().await;
            let before = codes.len();
            codes.retain(|_, code| !code.is_expired_at(now));
            stats.auth_codes = before - codes.len();
        }

        {
            let mut tokens = self.access_tokens.write().await;
            let before = tokens.len();
            tokens.retain(|_, token| !token.is_expired_at(now));
            stats.access_tokens = before - tokens.len();
        }

        {
            let mut tokens = self.refresh_tokens.write().await;
            let before = tokens.len();
            tokens.retain(|_, token| !token.is_expired_at(now));
            stats.refresh_tokens = before - tokens.len();
        }

        let mono_now = Instant::now();
        let before = self.rate_limits.len();
        self.rate_limits.retain(|_, timestamps| {
            timestamps.retain(|ts| mono_now.duration_since(*ts) < retention);
            !timestamps.is_empty()
        });
        stats.rate_limit_keys = before.saturating_sub(self.rate_limits.len());

        Ok(stats)
    }

    async fn counts(&self) -> Result<StoreCounts, StoreError> {
        let clients = self.clients.read().await.len();
        let auth_codes = self.auth_codes.read().await.len();
        let access_tokens = self.access_tokens.read().await.len();
        let refresh_tokens = self.refresh_tokens.read().await.len();
        Ok(StoreCounts {
            clients,
            auth_codes,
            access_tokens,
            refresh_tokens,
            rate_limit_keys: self.rate_limits.len(),
        })
    }
}
