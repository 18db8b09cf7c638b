//! OAuth 2.1 records held by the token store.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A recognized OAuth scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Scope {
    /// `mcp:read`
    Read,
    /// `mcp:write`
    Write,
    /// `mcp:admin`
    Admin,
}

impl Scope {
    /// All recognized scopes, in advertised order.
    pub const ALL: [Self; 3] = [Self::Read, Self::Write, Self::Admin];

    /// Wire name of the scope.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Read => "mcp:read",
            Self::Write => "mcp:write",
            Self::Admin => "mcp:admin",
        }
    }

    /// Parse a single scope token.
    #[must_use]
    pub fn parse(token: &str) -> Option<Self> {
        match token {
            "mcp:read" => Some(Self::Read),
            "mcp:write" => Some(Self::Write),
            "mcp:admin" => Some(Self::Admin),
            _ => None,
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Scope granted to newly registered clients and scope-less authorizations.
pub const DEFAULT_SCOPE: &str = "mcp:read mcp:write";

/// Space-separated scope string as a small set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScopeSet {
    read: bool,
    write: bool,
    admin: bool,
}

impl ScopeSet {
    /// Parse a scope string, returning the first unrecognized token on failure.
    pub fn parse(scope: &str) -> Result<Self, String> {
        let mut set = Self::default();
        for token in scope.split_whitespace() {
            match Scope::parse(token) {
                Some(Scope::Read) => set.read = true,
                Some(Scope::Write) => set.write = true,
                Some(Scope::Admin) => set.admin = true,
                None => return Err(token.to_string()),
            }
        }
        Ok(set)
    }

    /// Parse leniently, ignoring unknown tokens.
    #[must_use]
    pub fn from_granted(scope: &str) -> Self {
        let mut set = Self::default();
        for scope in scope.split_whitespace().filter_map(Scope::parse) {
            match scope {
                Scope::Read => set.read = true,
                Scope::Write => set.write = true,
                Scope::Admin => set.admin = true,
            }
        }
        set
    }

    /// Check membership.
    #[must_use]
    pub const fn contains(self, scope: Scope) -> bool {
        match scope {
            Scope::Read => self.read,
            Scope::Write => self.write,
            Scope::Admin => self.admin,
        }
    }

    /// Any recognized scope permits reads.
    #[must_use]
    pub const fn can_read(self) -> bool {
        self.read || self.write || self.admin
    }

    /// Writes need `mcp:write` or `mcp:admin`.
    #[must_use]
    pub const fn can_write(self) -> bool {
        self.write || self.admin
    }
}

/// A dynamically registered OAuth client (RFC 7591).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Client {
    pub client_id: String,
    pub client_name: String,
    pub redirect_uris: Vec<String>,
    pub grant_types: Vec<String>,
    pub response_types: Vec<String>,
    pub scope: String,
    pub token_endpoint_auth_method: String,
    pub client_id_issued_at: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub application_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contacts: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logo_uri: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_uri: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub policy_uri: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tos_uri: Option<String>,
}

/// A single-use authorization code bound to a PKCE challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationCode {
    pub code: String,
    pub client_id: String,
    pub redirect_uri: String,
    pub scope: String,
    pub code_challenge: String,
    pub code_challenge_method: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub used: bool,
}

impl AuthorizationCode {
    /// Usable only while `now < expires_at`.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// A bearer access token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessToken {
    pub token: String,
    pub client_id: String,
    pub scope: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl AccessToken {
    /// Token type reported to clients.
    pub const TOKEN_TYPE: &'static str = "Bearer";

    /// Usable only while `now < expires_at`.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Granted scopes.
    #[must_use]
    pub fn scopes(&self) -> ScopeSet {
        ScopeSet::from_granted(&self.scope)
    }
}

/// A refresh token bound to the access token issued with it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshToken {
    pub token: String,
    pub client_id: String,
    pub scope: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub access_token: String,
}

impl RefreshToken {
    /// Usable only while `now < expires_at`.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Successful token endpoint response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: u64,
    pub refresh_token: String,
    pub scope: String,
}

/// RFC 7662 introspection response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IntrospectionResponse {
    pub active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
}

impl IntrospectionResponse {
    /// The response for any token that is not currently active.
    #[must_use]
    pub const fn inactive() -> Self {
        Self {
            active: false,
            client_id: None,
            scope: None,
            token_type: None,
            exp: None,
            iat: None,
        }
    }

    /// The response for an active access token.
    #[must_use]
    pub fn active(token: &AccessToken) -> Self {
        Self {
            active: true,
            client_id: Some(token.client_id.clone()),
            scope: Some(token.scope.clone()),
            token_type: Some(AccessToken::TOKEN_TYPE.to_string()),
            exp: Some(token.expires_at.timestamp()),
            iat: Some(token.created_at.timestamp()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_set_parse() {
        let set = ScopeSet::parse("mcp:read mcp:write").unwrap();
        assert!(set.contains(Scope::Read));
        assert!(set.can_write());
        assert!(!set.contains(Scope::Admin));

        assert_eq!(ScopeSet::parse("mcp:read openid"), Err("openid".to_string()));
        assert_eq!(ScopeSet::parse("").unwrap(), ScopeSet::default());
    }

    #[test]
    fn test_scope_capabilities() {
        let read_only = ScopeSet::from_granted("mcp:read");
        assert!(read_only.can_read());
        assert!(!read_only.can_write());

        let admin = ScopeSet::from_granted("mcp:admin");
        assert!(admin.can_read());
        assert!(admin.can_write());

        let nothing = ScopeSet::from_granted("openid profile");
        assert!(!nothing.can_read());
    }

    #[test]
    fn test_expiry_is_exclusive() {
        let now = Utc::now();
        let token = AccessToken {
            token: "t".into(),
            client_id: "c".into(),
            scope: DEFAULT_SCOPE.into(),
            created_at: now,
            expires_at: now,
        };
        assert!(token.is_expired_at(now));
        assert!(!token.is_expired_at(now - chrono::Duration::seconds(1)));
    }

    #[test]
    fn test_inactive_introspection_serializes_bare() {
        let json = serde_json::to_value(IntrospectionResponse::inactive()).unwrap();
        assert_eq!(json, serde_json::json!({"active": false}));
    }
}
