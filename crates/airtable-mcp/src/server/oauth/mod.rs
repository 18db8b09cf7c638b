//! OAuth 2.1 authorization server embedded in the MCP server.
//!
//! ## Supported Standards
//! - RFC 9728: OAuth Protected Resource Metadata
//! - RFC 8414: OAuth Authorization Server Metadata
//! - RFC 7591: Dynamic Client Registration
//! - RFC 7636: PKCE (S256)
//! - RFC 6749: Authorization Code Grant
//! - RFC 7662: Token Introspection
//! - RFC 7009: Token Revocation
//!
//! State lives behind the [`TokenStore`] trait; [`InMemoryTokenStore`] is
//! the default volatile backend.

pub mod engine;
pub mod handlers;
pub mod pkce;
pub mod reclaimer;
pub mod store;
pub mod types;

pub use engine::{AuthorizationEngine, OAuthSettings};
pub use reclaimer::Reclaimer;
pub use store::{InMemoryTokenStore, TokenStore};
pub use types::{AccessToken, Scope, ScopeSet};
