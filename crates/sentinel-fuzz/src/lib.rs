//! Fuzzing harness for airtable-mcp.
//!
//! Targets cover the untrusted inputs the server parses: JSON-RPC bodies,
//! registration redirect URIs, PKCE verifiers and tool arguments.
//!
//! # Usage
//!
//! ```bash
//! cd crates/sentinel-fuzz
//! cargo +nightly fuzz run fuzz_envelope_parse -- -max_total_time=60
//! ```

use std::sync::Arc;

use airtable_mcp::AirtableClient;
use airtable_mcp::config::Config;
use airtable_mcp::server::dispatch::{Caller, Dispatcher};
use airtable_mcp::server::oauth::ScopeSet;
use airtable_mcp::tools::{ToolContext, ToolRegistry};

pub use airtable_mcp::models;

/// A dispatcher whose Airtable client has no key, so tool calls fail
/// without touching the network.
#[must_use]
pub fn offline_dispatcher() -> Option<Dispatcher> {
    let mut config = Config::for_testing("http://127.0.0.1:9");
    config.airtable_api_key = None;
    let client = AirtableClient::new(&config).ok()?;
    let tools = ToolRegistry::standard().ok()?;
    let ctx = ToolContext::new(Arc::new(client));
    Some(Dispatcher::new(tools, ctx, config.protocol_version))
}

/// A caller holding every scope.
#[must_use]
pub fn full_caller() -> Caller {
    Caller {
        client_id: "fuzz".to_string(),
        scopes: ScopeSet::from_granted("mcp:read mcp:write mcp:admin"),
    }
}
