//! Background reclaimer for expired codes, tokens and rate-limit entries.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::store::{PurgeStats, TokenStore};
use crate::config::{Config, oauth};
use crate::error::StoreError;

/// Periodic sweep over a [`TokenStore`].
///
/// A failed or panicking pass is logged and retried after `backoff`; the
/// loop only ends when its cancellation token fires.
#[derive(Clone)]
pub struct Reclaimer {
    store: Arc<dyn TokenStore>,
    interval: Duration,
    retention: Duration,
    backoff: Duration,
}

impl Reclaimer {
    #[must_use]
    pub fn new(store: Arc<dyn TokenStore>, interval: Duration) -> Self {
        Self {
            store,
            interval,
            retention: oauth::RATE_LIMIT_RETENTION,
            backoff: oauth::CLEANUP_RETRY_BACKOFF,
        }
    }

    /// Reclaimer configured from [`Config::cleanup_interval`].
    #[must_use]
    pub fn from_config(store: Arc<dyn TokenStore>, config: &Config) -> Self {
        Self::new(store, config.cleanup_interval)
    }

    /// Override the retry backoff after a failed pass.
    #[must_use]
    pub const fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    /// Override how long rate-limit timestamps are retained.
    #[must_use]
    pub const fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    /// Run a single sweep.
    pub async fn run_once(&self) -> Result<PurgeStats, StoreError> {
        self.store.purge_expired(Utc::now(), self.retention).await
    }

    /// Spawn the sweep loop.
    pub fn spawn(self, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(shutdown).await })
    }

    async fn run(self, shutdown: CancellationToken) {
        tracing::info!(interval_secs = self.interval.as_secs(), "Token reclaimer started");
        loop {
            // Each pass runs in its own task so a panic surfaces as a JoinError.
            let pass = self.clone();
            let outcome = tokio::spawn(async move { pass.run_once().await }).await;

            let pause = match outcome {
                Ok(Ok(stats)) => {
                    if stats.total() > 0 {
                        tracing::info!(
                            codes = stats.auth_codes,
                            access_tokens = stats.access_tokens,
                            refresh_tokens = stats.refresh_tokens,
                            rate_limit_keys = stats.rate_limit_keys,
                            "Reclaimed expired OAuth state"
                        );
                    }
                    self.interval
                }
                Ok(Err(e)) => {
                    tracing::error!(error = %e, "Reclaimer pass failed");
                    self.backoff
                }
                Err(e) => {
                    tracing::error!(error = %e, "Reclaimer pass panicked");
                    self.backoff
                }
            };

            tokio::select! {
                () = shutdown.cancelled() => {
                    tracing::info!("Token reclaimer shutting down");
                    break;
                }
                () = tokio::time::sleep(pause) => {}
            }
        }
    }
}

impl std::fmt::Debug for Reclaimer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reclaimer")
            .field("interval", &self.interval)
            .field("retention", &self.retention)
            .field("backoff", &self.backoff)
            .finish()
    }
}
