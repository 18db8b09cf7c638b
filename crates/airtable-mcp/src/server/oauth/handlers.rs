//! OAuth 2.1 endpoint handlers.
//!
//! Implements:
//! - RFC 9728: OAuth Protected Resource Metadata
//! - RFC 8414: OAuth Authorization Server Metadata
//! - RFC 7591: Dynamic Client Registration
//! - RFC 7636: PKCE (S256 only)
//! - RFC 6749: Authorization Code Grant
//! - RFC 7662 / RFC 7009: Introspection and Revocation

use std::sync::Arc;

use axum::{
    Form, Json,
    extract::{
        Query, State,
        rejection::{FormRejection, JsonRejection, QueryRejection},
    },
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Deserialize;

use super::engine::{AuthorizationRequest, RegistrationRequest, TokenRequest};
use super::pkce;
use super::types::Scope;
use crate::config::limits;
use crate::error::OAuthError;
use crate::server::transport::{ClientAddr, HttpState};

impl IntoResponse for OAuthError {
    fn into_response(self) -> Response {
        let body = Json(serde_json::json!({
            "error": self.error_code(),
            "error_description": self.to_string(),
        }));
        (self.status_code(), no_store_headers(), body).into_response()
    }
}

fn scopes_supported() -> Vec<&'static str> {
    Scope::ALL.iter().map(|scope| scope.as_str()).collect()
}

// ─── RFC 9728: Protected Resource Metadata ───────────────────────────────────

/// `GET /.well-known/oauth-protected-resource`
pub async fn handle_protected_resource(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    let config = &state.config;
    Json(serde_json::json!({
        "resource": config.base_url,
        "authorization_servers": [config.base_url],
        "scopes_supported": scopes_supported(),
        "bearer_methods_supported": ["header"],
        "resource_documentation": "https://airtable.com/developers/web/api/introduction",
        "revocation_endpoint": config.endpoint("/oauth/revoke"),
        "revocation_endpoint_auth_methods_supported": ["none"],
        "introspection_endpoint": config.endpoint("/oauth/introspect"),
        "introspection_endpoint_auth_methods_supported": ["none"]
    }))
}

// ─── RFC 8414: Authorization Server Metadata ─────────────────────────────────

/// `GET /.well-known/oauth-authorization-server`
pub async fn handle_auth_server_metadata(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    let config = &state.config;
    Json(serde_json::json!({
        "issuer": config.base_url,
        "authorization_endpoint": config.endpoint("/oauth/authorize"),
        "token_endpoint": config.endpoint("/oauth/token"),
        "registration_endpoint": config.endpoint("/oauth/register"),
        "revocation_endpoint": config.endpoint("/oauth/revoke"),
        "introspection_endpoint": config.endpoint("/oauth/introspect"),
        "scopes_supported": scopes_supported(),
        "response_types_supported": ["code"],
        "grant_types_supported": ["authorization_code"],
        "code_challenge_methods_supported": [pkce::METHOD_S256],
        "token_endpoint_auth_methods_supported": ["none"],
        "registration_endpoint_auth_methods_supported": ["none"],
        "subject_types_supported": ["public"]
    }))
}

// ─── RFC 7591: Dynamic Client Registration ───────────────────────────────────

/// `POST /oauth/register`
pub async fn handle_register(
    State(state): State<Arc<HttpState>>,
    ClientAddr(client_ip): ClientAddr,
    body: Result<Json<RegistrationRequest>, JsonRejection>,
) -> Result<Response, OAuthError> {
    let Json(request) = body.map_err(|e| {
        OAuthError::invalid_request(format!("Invalid registration body: {}", e.body_text()))
    })?;

    let (max, window) = limits::REGISTER;
    if !state
        .engine
        .check_rate_limit(&format!("register:{client_ip}"), max, window)
        .await?
    {
        return Err(OAuthError::RateLimited("Rate limit exceeded".into()));
    }

    let client = state.engine.register_client(request).await?;
    tracing::info!(client_id = %client.client_id, client_ip = %client_ip, "Client registered");
    Ok((StatusCode::OK, no_store_headers(), Json(client)).into_response())
}

// ─── Authorization Endpoint ──────────────────────────────────────────────────

/// `GET /oauth/authorize`
///
/// Consent is implicit: a request that passes validation is approved and
/// redirected straight back to the client with a code.
pub async fn handle_authorize(
    State(state): State<Arc<HttpState>>,
    query: Result<Query<AuthorizationRequest>, QueryRejection>,
) -> Result<Response, OAuthError> {
    let Query(request) = query.map_err(|e| {
        OAuthError::invalid_request(format!("Invalid query: {}", e.body_text()))
    })?;

    let (max, window) = limits::AUTHORIZE;
    if !state
        .engine
        .check_rate_limit(&format!("authorize:{}", request.client_id), max, window)
        .await?
    {
        return Err(OAuthError::RateLimited("Rate limit exceeded".into()));
    }

    let grant = state.engine.create_authorization(request).await?;
    let location = HeaderValue::from_str(&grant.redirect_url)
        .map_err(|_| OAuthError::InvalidRedirectUri("Invalid redirect_uri".into()))?;
    Ok((StatusCode::FOUND, [(header::LOCATION, location)]).into_response())
}

// ─── Token Endpoint ──────────────────────────────────────────────────────────

/// `POST /oauth/token`
pub async fn handle_token(
    State(state): State<Arc<HttpState>>,
    form: Result<Form<TokenRequest>, FormRejection>,
) -> Result<Response, OAuthError> {
    let Form(request) = form.map_err(|e| {
        OAuthError::invalid_request(format!("Invalid token request: {}", e.body_text()))
    })?;

    if let Some(client_id) = request.client_id.as_deref().filter(|id| !id.is_empty()) {
        let (max, window) = limits::TOKEN;
        if !state
            .engine
            .check_rate_limit(&format!("token:{client_id}"), max, window)
            .await?
        {
            return Err(OAuthError::RateLimited("Rate limit exceeded".into()));
        }
    }

    let tokens = state.engine.exchange_code_for_token(request).await?;
    Ok((StatusCode::OK, no_store_headers(), Json(tokens)).into_response())
}

// ─── RFC 7662 / RFC 7009 ─────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct TokenForm {
    pub token: Option<String>,
    pub token_type_hint: Option<String>,
}

fn form_token(form: Result<Form<TokenForm>, FormRejection>) -> Option<String> {
    form.ok()
        .and_then(|Form(form)| form.token)
        .filter(|token| !token.is_empty())
}

/// `POST /oauth/introspect`
///
/// Always 200. Anything but a live access token is `{"active": false}`.
pub async fn handle_introspect(
    State(state): State<Arc<HttpState>>,
    form: Result<Form<TokenForm>, FormRejection>,
) -> Response {
    let Some(token) = form_token(form) else {
        return Json(serde_json::json!({"active": false})).into_response();
    };

    match state.engine.introspect_token(&token).await {
        Ok(result) => (no_store_headers(), Json(result)).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Token introspection failed");
            Json(serde_json::json!({"active": false})).into_response()
        }
    }
}

/// `POST /oauth/revoke`
///
/// Always 200. Unknown tokens report success so the endpoint cannot be
/// used to discover which tokens exist.
pub async fn handle_revoke(
    State(state): State<Arc<HttpState>>,
    form: Result<Form<TokenForm>, FormRejection>,
) -> Response {
    let Some(token) = form_token(form) else {
        return Json(serde_json::json!({"revoked": false})).into_response();
    };

    match state.engine.revoke_token(&token).await {
        Ok(_) => Json(serde_json::json!({"revoked": true})).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Token revocation failed");
            Json(serde_json::json!({"revoked": false})).into_response()
        }
    }
}

fn no_store_headers() -> [(header::HeaderName, HeaderValue); 2] {
    [
        (header::CACHE_CONTROL, HeaderValue::from_static("no-store")),
        (header::PRAGMA, HeaderValue::from_static("no-cache")),
    ]
}
