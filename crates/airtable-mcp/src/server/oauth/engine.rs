//! Authorization engine: registration, authorization, token exchange,
//! verification, introspection and revocation on top of a [`TokenStore`].

use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use rand::RngCore;
use rand::rngs::OsRng;
use serde::Deserialize;

use super::pkce;
use super::store::{Redemption, TokenStore};
use super::types::{
    AccessToken, AuthorizationCode, Client, DEFAULT_SCOPE, IntrospectionResponse, RefreshToken,
    ScopeSet, TokenResponse,
};
use crate::config::Config;
use crate::error::{OAuthError, OAuthResult};

/// Grant type accepted at the token endpoint.
pub const GRANT_AUTHORIZATION_CODE: &str = "authorization_code";

/// Bytes of randomness behind every code and token.
const SECRET_BYTES: usize = 32;

/// Lifetimes and switches the engine needs from [`Config`].
#[derive(Debug, Clone, Copy)]
pub struct OAuthSettings {
    pub code_ttl: Duration,
    pub token_ttl: Duration,
    pub refresh_ttl: Duration,
    pub rate_limit_enabled: bool,
}

impl OAuthSettings {
    #[must_use]
    pub const fn from_config(config: &Config) -> Self {
        Self {
            code_ttl: config.code_expiry,
            token_ttl: config.token_expiry,
            refresh_ttl: config.refresh_token_expiry,
            rate_limit_enabled: config.rate_limit_enabled,
        }
    }
}

/// Dynamic client registration request (RFC 7591).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RegistrationRequest {
    pub client_name: Option<String>,
    pub redirect_uris: Option<Vec<String>>,
    pub application_type: Option<String>,
    pub contacts: Option<Vec<String>>,
    pub logo_uri: Option<String>,
    pub client_uri: Option<String>,
    pub policy_uri: Option<String>,
    pub tos_uri: Option<String>,
}

/// Authorization endpoint query.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AuthorizationRequest {
    pub client_id: String,
    pub redirect_uri: String,
    pub response_type: String,
    pub scope: Option<String>,
    pub state: Option<String>,
    pub code_challenge: Option<String>,
    pub code_challenge_method: Option<String>,
}

/// Token endpoint form.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TokenRequest {
    pub grant_type: Option<String>,
    pub code: Option<String>,
    pub client_id: Option<String>,
    pub redirect_uri: Option<String>,
    pub code_verifier: Option<String>,
}

/// An issued code and the redirect that delivers it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationGrant {
    pub code: String,
    pub redirect_url: String,
}

/// Validates OAuth requests and orchestrates token store mutations.
#[derive(Clone)]
pub struct AuthorizationEngine {
    store: Arc<dyn TokenStore>,
    settings: OAuthSettings,
}

impl AuthorizationEngine {
    #[must_use]
    pub fn new(store: Arc<dyn TokenStore>, settings: OAuthSettings) -> Self {
        Self { store, settings }
    }

    /// The underlying store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn TokenStore> {
        &self.store
    }

    /// Access token lifetime.
    #[must_use]
    pub const fn token_ttl(&self) -> Duration {
        self.settings.token_ttl
    }

    // ─── RFC 7591: Dynamic Client Registration ───

    /// Register a public client.
    pub async fn register_client(&self, request: RegistrationRequest) -> OAuthResult<Client> {
        let client_name = request
            .client_name
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty())
            .ok_or_else(|| OAuthError::invalid_request("client_name is required"))?;

        let redirect_uris = request
            .redirect_uris
            .filter(|uris| !uris.is_empty())
            .ok_or_else(|| OAuthError::invalid_request("redirect_uris is required"))?;

        if let Some(bad) = redirect_uris.iter().find(|uri| !is_valid_redirect_uri(uri)) {
            return Err(OAuthError::invalid_request(format!(
                "Invalid redirect URI: {bad}"
            )));
        }

        let client = Client {
            client_id: uuid::Uuid::new_v4().simple().to_string(),
            client_name,
            redirect_uris,
            grant_types: vec![GRANT_AUTHORIZATION_CODE.to_string()],
            response_types: vec!["code".to_string()],
            scope: DEFAULT_SCOPE.to_string(),
            token_endpoint_auth_method: "none".to_string(),
            client_id_issued_at: Utc::now().timestamp(),
            application_type: request.application_type,
            contacts: request.contacts,
            logo_uri: request.logo_uri,
            client_uri: request.client_uri,
            policy_uri: request.policy_uri,
            tos_uri: request.tos_uri,
        };

        self.store.put_client(client.clone()).await?;
        tracing::info!(
            client_id = %client.client_id,
            client_name = %client.client_name,
            "Registered OAuth client"
        );
        Ok(client)
    }

    // ─── RFC 6749 §4.1.1: Authorization Request ───

    /// Validate an authorization request and issue a code.
    pub async fn create_authorization(
        &self,
        request: AuthorizationRequest,
    ) -> OAuthResult<AuthorizationGrant> {
        let client = self
            .store
            .get_client(&request.client_id)
            .await?
            .ok_or_else(|| OAuthError::InvalidClient("Invalid client_id".into()))?;

        if !client.redirect_uris.contains(&request.redirect_uri) {
            return Err(OAuthError::InvalidRedirectUri(
                "Invalid redirect_uri".into(),
            ));
        }

        if request.response_type != "code" {
            return Err(OAuthError::UnsupportedResponseType(
                "Only 'code' response_type is supported".into(),
            ));
        }

        let code_challenge = request
            .code_challenge
            .filter(|challenge| !challenge.is_empty())
            .ok_or_else(|| OAuthError::invalid_request("PKCE code_challenge is required"))?;
        let method = request.code_challenge_method.unwrap_or_default();
        if method != pkce::METHOD_S256 {
            return Err(OAuthError::invalid_request(
                "Only S256 code_challenge_method is supported",
            ));
        }

        let scope = request
            .scope
            .map(|scope| scope.trim().to_string())
            .filter(|scope| !scope.is_empty())
            .unwrap_or_else(|| DEFAULT_SCOPE.to_string());
        ScopeSet::parse(&scope)
            .map_err(|token| OAuthError::InvalidScope(format!("Invalid scope: {token}")))?;

        let code = generate_secret()?;
        let now = Utc::now();
        self.store
            .put_auth_code(AuthorizationCode {
                code: code.clone(),
                client_id: client.client_id.clone(),
                redirect_uri: request.redirect_uri.clone(),
                scope,
                code_challenge,
                code_challenge_method: method,
                created_at: now,
                expires_at: expires_at(now, self.settings.code_ttl)?,
                used: false,
            })
            .await?;

        let redirect_url = build_redirect(&request.redirect_uri, &code, request.state.as_deref())?;
        tracing::info!(client_id = %client.client_id, "Authorization code issued");
        Ok(AuthorizationGrant { code, redirect_url })
    }

    // ─── RFC 6749 §4.1.3: Access Token Request ───

    /// Redeem an authorization code for an access/refresh token pair.
    pub async fn exchange_code_for_token(
        &self,
        request: TokenRequest,
    ) -> OAuthResult<TokenResponse> {
        if request.grant_type.as_deref() != Some(GRANT_AUTHORIZATION_CODE) {
            return Err(OAuthError::UnsupportedGrantType(
                "Unsupported grant_type".into(),
            ));
        }

        let (Some(code), Some(client_id), Some(redirect_uri), Some(code_verifier)) = (
            non_empty(request.code),
            non_empty(request.client_id),
            non_empty(request.redirect_uri),
            non_empty(request.code_verifier),
        ) else {
            return Err(OAuthError::invalid_request("Missing required parameters"));
        };

        let check = |stored: &AuthorizationCode| {
            if stored.client_id != client_id || stored.redirect_uri != redirect_uri {
                return Err(OAuthError::invalid_grant("Invalid client or redirect_uri"));
            }
            if !pkce::verify_s256(&code_verifier, &stored.code_challenge) {
                return Err(OAuthError::invalid_grant("Invalid code_verifier"));
            }
            Ok(())
        };

        let now = Utc::now();
        let redeemed = match self.store.redeem_auth_code(&code, now, &check).await? {
            Redemption::Redeemed(redeemed) => redeemed,
            Redemption::Missing => {
                return Err(OAuthError::invalid_grant("Invalid authorization code"));
            }
            Redemption::Expired => {
                return Err(OAuthError::invalid_grant("Authorization code expired"));
            }
            Redemption::AlreadyUsed => {
                tracing::warn!(client_id = %client_id, "Replay of a used authorization code");
                return Err(OAuthError::invalid_grant("Authorization code already used"));
            }
            Redemption::Rejected(err) => {
                tracing::warn!(client_id = %client_id, error = %err, "Token exchange rejected");
                return Err(err);
            }
        };

        let access = AccessToken {
            token: generate_secret()?,
            client_id: redeemed.client_id.clone(),
            scope: redeemed.scope.clone(),
            created_at: now,
            expires_at: expires_at(now, self.settings.token_ttl)?,
        };
        let refresh = RefreshToken {
            token: generate_secret()?,
            client_id: redeemed.client_id.clone(),
            scope: redeemed.scope.clone(),
            created_at: now,
            expires_at: expires_at(now, self.settings.refresh_ttl)?,
            access_token: access.token.clone(),
        };

        let response = TokenResponse {
            access_token: access.token.clone(),
            token_type: AccessToken::TOKEN_TYPE.to_string(),
            expires_in: self.settings.token_ttl.as_secs(),
            refresh_token: refresh.token.clone(),
            scope: redeemed.scope,
        };
        self.store.put_token_pair(access, refresh).await?;

        tracing::info!(client_id = %redeemed.client_id, "Access token issued");
        Ok(response)
    }

    /// Look up a live access token. Expired tokens are deleted and reported absent.
    pub async fn verify_token(&self, token: &str) -> OAuthResult<Option<AccessToken>> {
        Ok(self.store.get_access_token(token, Utc::now()).await?)
    }

    /// RFC 7662 introspection. Missing, expired and unknown tokens are indistinguishable.
    pub async fn introspect_token(&self, token: &str) -> OAuthResult<IntrospectionResponse> {
        Ok(self
            .verify_token(token)
            .await?
            .map_or_else(IntrospectionResponse::inactive, |record| {
                IntrospectionResponse::active(&record)
            }))
    }

    /// RFC 7009 revocation. Tries the token as an access token, then as a
    /// refresh token (taking its linked access token with it).
    pub async fn revoke_token(&self, token: &str) -> OAuthResult<bool> {
        if self.store.delete_access_token(token).await? {
            tracing::info!(token = %token_prefix(token), "Access token revoked");
            return Ok(true);
        }
        if self.store.delete_refresh_token(token).await? {
            tracing::info!(token = %token_prefix(token), "Refresh token revoked");
            return Ok(true);
        }
        Ok(false)
    }

    /// Sliding-window admission. Always admits when rate limiting is disabled.
    pub async fn check_rate_limit(
        &self,
        key: &str,
        max_requests: usize,
        window: Duration,
    ) -> OAuthResult<bool> {
        if !self.settings.rate_limit_enabled {
            return Ok(true);
        }
        let allowed = self
            .store
            .check_rate_limit(key, max_requests, window)
            .await?;
        if !allowed {
            tracing::warn!(key = %key, "Rate limit exceeded");
        }
        Ok(allowed)
    }
}

impl std::fmt::Debug for AuthorizationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthorizationEngine")
            .field("settings", &self.settings)
            .finish()
    }
}

/// Redirect URIs must be `https`, plain `http` to a loopback host, or a
/// native-app custom scheme.
#[must_use]
pub fn is_valid_redirect_uri(uri: &str) -> bool {
    let Ok(parsed) = url::Url::parse(uri) else {
        return false;
    };
    match parsed.scheme() {
        "https" => parsed.host().is_some(),
        "http" => matches!(parsed.host_str(), Some("localhost" | "127.0.0.1")),
        _ => uri.contains("://"),
    }
}

/// 256 bits from the OS RNG, URL-safe base64 without padding.
pub fn generate_secret() -> OAuthResult<String> {
    let mut bytes = [0u8; SECRET_BYTES];
    OsRng.try_fill_bytes(&mut bytes).map_err(|e| {
        tracing::error!(error = %e, "OS random number generator failed");
        OAuthError::ServerError("Random number generator unavailable".into())
    })?;
    Ok(URL_SAFE_NO_PAD.encode(bytes))
}

/// First eight characters of a token, for logs.
#[must_use]
pub fn token_prefix(token: &str) -> String {
    format!("{}...", token.chars().take(8).collect::<String>())
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

fn expires_at(now: DateTime<Utc>, ttl: Duration) -> OAuthResult<DateTime<Utc>> {
    chrono::Duration::from_std(ttl)
        .ok()
        .and_then(|ttl| now.checked_add_signed(ttl))
        .ok_or_else(|| OAuthError::ServerError("Token lifetime out of range".into()))
}

fn build_redirect(redirect_uri: &str, code: &str, state: Option<&str>) -> OAuthResult<String> {
    let mut url = url::Url::parse(redirect_uri)
        .map_err(|_| OAuthError::InvalidRedirectUri("Invalid redirect_uri".into()))?;
    {
        let mut pairs = url.query_pairs_mut();
        pairs.append_pair("code", code);
        if let Some(state) = state.filter(|s| !s.is_empty()) {
            pairs.append_pair("state", state);
        }
    }
    Ok(url.into())
}
