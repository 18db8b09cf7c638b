//! MCP server implementation.
//!
//! A single HTTP listener hosts both the OAuth 2.1 authorization server
//! and the Streamable HTTP MCP endpoint.
//!
//! ## Lifecycle
//!
//! `run_http` binds the listener, starts the background [`Reclaimer`], and
//! serves until Ctrl-C. On shutdown the reclaimer is cancelled and awaited
//! before returning.

pub mod dispatch;
pub mod oauth;
pub mod stream;
pub mod transport;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tokio_util::sync::CancellationToken;

use self::oauth::{InMemoryTokenStore, Reclaimer, TokenStore};
use self::transport::HttpState;
use crate::client::TableApi;
use crate::config::Config;

/// Airtable MCP server.
pub struct McpServer {
    config: Arc<Config>,
    store: Arc<dyn TokenStore>,
    state: Arc<HttpState>,
}

impl McpServer {
    /// Create a server with the in-memory token store.
    ///
    /// # Errors
    ///
    /// Returns error if the tool registry cannot be built.
    pub fn new(config: Config, client: Arc<dyn TableApi>) -> anyhow::Result<Self> {
        Self::with_store(config, client, Arc::new(InMemoryTokenStore::new()))
    }

    /// Create a server over a specific token store backend.
    ///
    /// # Errors
    ///
    /// Returns error if the tool registry cannot be built.
    pub fn with_store(
        config: Config,
        client: Arc<dyn TableApi>,
        store: Arc<dyn TokenStore>,
    ) -> anyhow::Result<Self> {
        let config = Arc::new(config);
        let state = Arc::new(HttpState::new(
            Arc::clone(&config),
            client,
            Arc::clone(&store),
        )?);
        Ok(Self {
            config,
            store,
            state,
        })
    }

    /// The router, for in-process use.
    #[must_use]
    pub fn router(&self) -> Router {
        transport::create_router(Arc::clone(&self.state))
    }

    /// Run the HTTP server until Ctrl-C.
    ///
    /// # Errors
    ///
    /// Returns error if the listener cannot be bound or the server fails.
    pub async fn run_http(self) -> anyhow::Result<()> {
        let addr: SocketAddr = format!("{}:{}", self.config.host, self.config.port).parse()?;
        tracing::info!(
            addr = %addr,
            base_url = %self.config.base_url,
            environment = self.config.environment.as_str(),
            tools = self.state.dispatcher.tool_count(),
            "Starting MCP server"
        );

        let shutdown = CancellationToken::new();
        let reclaimer = Reclaimer::from_config(Arc::clone(&self.store), &self.config)
            .spawn(shutdown.child_token());

        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!("HTTP server listening on http://{}", addr);

        let served = axum::serve(
            listener,
            self.router().into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal())
        .await;

        shutdown.cancel();
        if let Err(e) = reclaimer.await {
            tracing::error!(error = %e, "Reclaimer task ended abnormally");
        }

        served?;
        tracing::info!("HTTP server shut down");
        Ok(())
    }
}

impl std::fmt::Debug for McpServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpServer")
            .field("base_url", &self.config.base_url)
            .field("tools", &self.state.dispatcher.tool_count())
            .finish()
    }
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Received shutdown signal"),
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C; shutting down");
        }
    }
}
