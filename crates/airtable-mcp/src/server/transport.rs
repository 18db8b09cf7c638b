//! HTTP transport.
//!
//! One axum router carries:
//! - the Streamable HTTP MCP endpoint (`POST /mcp` for JSON-RPC, `GET /mcp`
//!   for the event stream), behind bearer authentication
//! - the OAuth 2.1 authorization server and its discovery documents
//! - health, readiness and the deprecated `/sse` pointer

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Extension, Json, Router,
    body::Bytes,
    extract::{ConnectInfo, FromRequestParts, Request, State},
    http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, header, request::Parts},
    middleware::{self, Next},
    response::{
        IntoResponse, Response,
        sse::{Event, Sse},
    },
    routing::{get, post},
};
use axum_extra::{
    TypedHeader,
    headers::{Authorization, authorization::Bearer},
    typed_header::TypedHeaderRejection,
};
use futures::stream;
use serde_json::json;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

use super::dispatch::{Caller, Dispatcher, ParseFailure};
use super::oauth::{AccessToken, AuthorizationEngine, OAuthSettings, TokenStore, handlers};
use super::stream::StreamChannel;
use crate::client::TableApi;
use crate::config::Config;
use crate::error::ToolResult;
use crate::tools::{ToolContext, ToolRegistry};

const SESSION_HEADER: &str = "mcp-session-id";
const PROTOCOL_VERSION_HEADER: &str = "mcp-protocol-version";
const LAST_EVENT_ID_HEADER: &str = "last-event-id";
const REALM: &str = "airtable-mcp";

/// Shared state for HTTP handlers.
pub struct HttpState {
    pub config: Arc<Config>,
    pub engine: AuthorizationEngine,
    pub dispatcher: Dispatcher,
}

impl HttpState {
    /// Wire the engine and dispatcher over the given collaborators.
    ///
    /// # Errors
    ///
    /// Returns error if the tool registry cannot be built.
    pub fn new(
        config: Arc<Config>,
        client: Arc<dyn TableApi>,
        store: Arc<dyn TokenStore>,
    ) -> ToolResult<Self> {
        let engine = AuthorizationEngine::new(store, OAuthSettings::from_config(&config));
        let dispatcher = Dispatcher::new(
            ToolRegistry::standard()?,
            ToolContext::new(client),
            config.protocol_version.clone(),
        );
        Ok(Self {
            config,
            engine,
            dispatcher,
        })
    }
}

impl std::fmt::Debug for HttpState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpState")
            .field("base_url", &self.config.base_url)
            .field("engine", &self.engine)
            .field("dispatcher", &self.dispatcher)
            .finish()
    }
}

/// Caller address used for rate-limit keys.
///
/// The socket peer, unless `trust_forwarded_for` is set, in which case the
/// first `X-Forwarded-For` hop wins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientAddr(pub String);

impl ClientAddr {
    /// Resolve the address from request parts.
    #[must_use]
    pub fn resolve(parts: &Parts, trust_forwarded_for: bool) -> Self {
        let forwarded = trust_forwarded_for
            .then(|| {
                parts
                    .headers
                    .get("x-forwarded-for")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.split(',').next())
                    .map(str::trim)
                    .filter(|v| !v.is_empty())
                    .map(str::to_string)
            })
            .flatten();

        let addr = forwarded
            .or_else(|| {
                parts
                    .extensions
                    .get::<ConnectInfo<SocketAddr>>()
                    .map(|ConnectInfo(addr)| addr.ip().to_string())
            })
            .unwrap_or_else(|| "unknown".to_string());
        Self(addr)
    }
}

impl FromRequestParts<Arc<HttpState>> for ClientAddr {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<HttpState>,
    ) -> Result<Self, Self::Rejection> {
        Ok(Self::resolve(parts, state.config.trust_forwarded_for))
    }
}

/// Create the HTTP router.
pub fn create_router(state: Arc<HttpState>) -> Router {
    let config = Arc::clone(&state.config);

    let protected = Router::new()
        .route("/mcp", post(handle_mcp_post).get(handle_mcp_get))
        .route_layer(middleware::from_fn_with_state(Arc::clone(&state), require_bearer));

    let hsts = config.is_production().then(|| {
        SetResponseHeaderLayer::if_not_present(
            header::STRICT_TRANSPORT_SECURITY,
            HeaderValue::from_static("max-age=31536000; includeSubDomains"),
        )
    });
    let security_headers = ServiceBuilder::new()
        .layer(SetResponseHeaderLayer::if_not_present(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::X_FRAME_OPTIONS,
            HeaderValue::from_static("DENY"),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::X_XSS_PROTECTION,
            HeaderValue::from_static("1; mode=block"),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::REFERRER_POLICY,
            HeaderValue::from_static("strict-origin-when-cross-origin"),
        ))
        .option_layer(hsts);

    Router::new()
        .route("/", get(handle_root))
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/sse", get(handle_sse_legacy))
        .route(
            "/.well-known/oauth-protected-resource",
            get(handlers::handle_protected_resource),
        )
        .route(
            "/.well-known/oauth-authorization-server",
            get(handlers::handle_auth_server_metadata),
        )
        .route("/oauth/register", post(handlers::handle_register))
        .route("/oauth/authorize", get(handlers::handle_authorize))
        .route("/oauth/token", post(handlers::handle_token))
        .route("/oauth/introspect", post(handlers::handle_introspect))
        .route("/oauth/revoke", post(handlers::handle_revoke))
        .merge(protected)
        .with_state(state)
        .layer(cors_layer(&config.allowed_origins))
        .layer(security_headers)
        .layer(TraceLayer::new_for_http())
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            HeaderName::from_static(SESSION_HEADER),
            HeaderName::from_static(PROTOCOL_VERSION_HEADER),
            HeaderName::from_static(LAST_EVENT_ID_HEADER),
        ])
        .expose_headers([
            HeaderName::from_static(SESSION_HEADER),
            header::WWW_AUTHENTICATE,
        ]);

    if origins.iter().any(|origin| origin == "*") {
        layer.allow_origin(Any)
    } else {
        let origins: Vec<HeaderValue> = origins
            .iter()
            .filter_map(|origin| HeaderValue::from_str(origin).ok())
            .collect();
        layer.allow_origin(origins)
    }
}

// ─── Bearer authentication ───────────────────────────────────────────────────

/// Require a live access token; the token is passed on as a request extension.
async fn require_bearer(
    State(state): State<Arc<HttpState>>,
    auth: Result<TypedHeader<Authorization<Bearer>>, TypedHeaderRejection>,
    mut request: Request,
    next: Next,
) -> Response {
    let Ok(TypedHeader(Authorization(bearer))) = auth else {
        return unauthorized(&state.config);
    };

    match state.engine.verify_token(bearer.token()).await {
        Ok(Some(token)) => {
            request.extensions_mut().insert(token);
            next.run(request).await
        }
        Ok(None) => invalid_token(),
        Err(e) => e.into_response(),
    }
}

fn unauthorized(config: &Config) -> Response {
    let challenge = format!(
        r#"Bearer realm="{REALM}", resource_metadata="{}""#,
        config.endpoint("/.well-known/oauth-protected-resource")
    );
    let challenge = HeaderValue::from_str(&challenge)
        .unwrap_or_else(|_| HeaderValue::from_static(r#"Bearer realm="airtable-mcp""#));

    (
        StatusCode::UNAUTHORIZED,
        [(header::WWW_AUTHENTICATE, challenge)],
        Json(json!({"error": "unauthorized", "message": "Authentication required"})),
    )
        .into_response()
}

fn invalid_token() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        [(
            header::WWW_AUTHENTICATE,
            HeaderValue::from_static(r#"Bearer realm="airtable-mcp", error="invalid_token""#),
        )],
        Json(json!({"error": "invalid_token", "message": "Invalid or expired token"})),
    )
        .into_response()
}

// ─── MCP endpoint ────────────────────────────────────────────────────────────

/// `POST /mcp`: one JSON-RPC envelope or a batch.
async fn handle_mcp_post(
    State(state): State<Arc<HttpState>>,
    Extension(token): Extension<AccessToken>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    warn_on_version_mismatch(&headers, state.dispatcher.protocol_version());

    let caller = Caller::from(&token);
    match state.dispatcher.dispatch_body(&body, &caller).await {
        Ok(dispatched) => {
            let mut response = Json(dispatched.reply).into_response();
            if let Some(value) = dispatched
                .session_id
                .and_then(|id| HeaderValue::from_str(&id).ok())
            {
                response
                    .headers_mut()
                    .insert(HeaderName::from_static(SESSION_HEADER), value);
            }
            response
        }
        Err(ParseFailure(error)) => (StatusCode::BAD_REQUEST, Json(error)).into_response(),
    }
}

/// `GET /mcp`: keep-alive event stream.
async fn handle_mcp_get(
    State(state): State<Arc<HttpState>>,
    Extension(token): Extension<AccessToken>,
    headers: HeaderMap,
) -> Response {
    let header_str = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };

    let channel = StreamChannel::open(header_str(SESSION_HEADER), state.config.heartbeat_interval);
    tracing::info!(
        session_id = %channel.session_id(),
        client_id = %token.client_id,
        last_event_id = ?header_str(LAST_EVENT_ID_HEADER),
        "Opening event stream"
    );

    let mut response_headers = HeaderMap::new();
    if let Ok(value) = HeaderValue::from_str(channel.session_id()) {
        response_headers.insert(HeaderName::from_static(SESSION_HEADER), value);
    }
    response_headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    response_headers.insert("x-accel-buffering", HeaderValue::from_static("no"));

    (response_headers, Sse::new(channel.into_sse())).into_response()
}

fn warn_on_version_mismatch(headers: &HeaderMap, expected: &str) {
    let Some(version) = headers
        .get(PROTOCOL_VERSION_HEADER)
        .and_then(|v| v.to_str().ok())
    else {
        return;
    };
    if version != expected {
        tracing::warn!(
            version = %version,
            expected = %expected,
            "Unsupported MCP protocol version"
        );
    }
}

/// `GET /sse`: points old HTTP+SSE clients at `/mcp`.
async fn handle_sse_legacy(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    tracing::warn!("Deprecated /sse endpoint accessed");

    let events = [
        Event::default()
            .event("endpoint")
            .data(state.config.endpoint("/mcp")),
        Event::default()
            .event("deprecated")
            .data("This endpoint is deprecated. Please use Streamable HTTP transport at /mcp"),
    ];

    (
        [
            (header::CACHE_CONTROL, HeaderValue::from_static("no-cache")),
            (
                HeaderName::from_static("x-deprecated"),
                HeaderValue::from_static("true"),
            ),
        ],
        Sse::new(stream::iter(events.map(Ok::<_, Infallible>))),
    )
}

// ─── Ancillary ───────────────────────────────────────────────────────────────

async fn handle_root(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    let config = &state.config;
    Json(json!({
        "name": crate::config::mcp::SERVER_NAME,
        "version": env!("CARGO_PKG_VERSION"),
        "description": "MCP server for Airtable with OAuth 2.1 and Streamable HTTP",
        "specification": format!("MCP {}", config.protocol_version),
        "transport": "Streamable HTTP",
        "authentication": "OAuth 2.1 with Dynamic Client Registration",
        "endpoints": {
            "mcp": config.endpoint("/mcp"),
            "oauth_metadata": config.endpoint("/.well-known/oauth-authorization-server"),
            "protected_resource_metadata": config.endpoint("/.well-known/oauth-protected-resource"),
            "registration": config.endpoint("/oauth/register"),
            "authorization": config.endpoint("/oauth/authorize"),
            "token": config.endpoint("/oauth/token"),
            "introspection": config.endpoint("/oauth/introspect"),
            "revocation": config.endpoint("/oauth/revoke")
        }
    }))
}

async fn health_check(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    let airtable = if state.config.has_api_key() {
        "configured"
    } else {
        "not_configured"
    };
    Json(json!({
        "status": "healthy",
        "service": crate::config::mcp::SERVER_NAME,
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "components": {
            "airtable": airtable,
            "auth": "ready",
            "mcp_transport": "ready"
        },
        "environment": state.config.environment.as_str()
    }))
}

async fn readiness_check(State(state): State<Arc<HttpState>>) -> Response {
    match state.engine.store().counts().await {
        Ok(counts) => Json(json!({
            "status": "ready",
            "version": env!("CARGO_PKG_VERSION"),
            "tools": state.dispatcher.tool_count(),
            "store": counts
        }))
        .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Readiness check failed");
            let body = Json(json!({"status": "unavailable"}));
            (StatusCode::SERVICE_UNAVAILABLE, body).into_response()
        }
    }
}
