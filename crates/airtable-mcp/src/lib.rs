//! Airtable MCP Server
//!
//! A remote Model Context Protocol (MCP) server for the Airtable API with an
//! embedded OAuth 2.1 authorization server. LLM clients register themselves,
//! obtain a PKCE-bound bearer token, and then call Airtable tools over
//! Streamable HTTP.
//!
//! # Features
//!
//! - **13 MCP Tools**: bases, tables, fields and records, split into read and write scopes
//! - **OAuth 2.1**: dynamic registration, S256 PKCE, introspection, revocation
//! - **Concurrency-safe token store** with a cancellable background reclaimer
//! - **Throttled, cached Airtable client**: 5 req/s, retried, schema reads cached
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use airtable_mcp::{AirtableClient, config::Config, server::McpServer};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     let client = AirtableClient::new(&config)?;
//!     McpServer::new(config, Arc::new(client))?.run_http().await
//! }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod models;
pub mod server;
pub mod tools;

pub use client::{AirtableClient, TableApi};
pub use config::Config;
pub use error::{ClientError, OAuthError, ToolError};
