//! JSON-RPC dispatch for the `/mcp` endpoint.
//!
//! Every syntactically valid body gets a syntactically valid reply: routing
//! misses, scope failures and tool faults all become error objects inside a
//! 200 response. Only an unparseable body escapes as [`ParseFailure`].

use std::borrow::Cow;
use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use super::oauth::{AccessToken, ScopeSet};
use crate::config::mcp;
use crate::tools::{Access, ToolContext, ToolRegistry};

/// JSON-RPC error codes used by this server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    ParseError,
    InvalidRequest,
    MethodNotFound,
    InvalidParams,
    InternalError,
    /// Token scope does not cover the call.
    InsufficientPermissions,
}

impl ErrorCode {
    #[must_use]
    pub const fn code(self) -> i32 {
        match self {
            Self::ParseError => -32700,
            Self::InvalidRequest => -32600,
            Self::MethodNotFound => -32601,
            Self::InvalidParams => -32602,
            Self::InternalError => -32603,
            Self::InsufficientPermissions => -32001,
        }
    }

    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::ParseError => "Parse error",
            Self::InvalidRequest => "Invalid Request",
            Self::MethodNotFound => "Method not found",
            Self::InvalidParams => "Invalid params",
            Self::InternalError => "Internal error",
            Self::InsufficientPermissions => "Insufficient permissions",
        }
    }
}

/// JSON-RPC 2.0 request.
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub method: String,
    #[serde(default)]
    pub params: Value,
    #[serde(default)]
    pub id: Option<Value>,
}

/// JSON-RPC 2.0 response.
///
/// `id` is always present; requests without one are answered with `null`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: Cow<'static, str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
    pub id: Value,
}

/// JSON-RPC 2.0 error.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
}

impl JsonRpcResponse {
    /// JSON-RPC version constant.
    const VERSION: &'static str = "2.0";

    #[must_use]
    pub fn success(id: Option<Value>, result: Value) -> Self {
        Self {
            jsonrpc: Cow::Borrowed(Self::VERSION),
            result: Some(result),
            error: None,
            id: id.unwrap_or(Value::Null),
        }
    }

    #[must_use]
    pub fn error(id: Option<Value>, code: ErrorCode, data: Option<String>) -> Self {
        Self {
            jsonrpc: Cow::Borrowed(Self::VERSION),
            result: None,
            error: Some(JsonRpcError {
                code: code.code(),
                message: code.message().to_string(),
                data,
            }),
            id: id.unwrap_or(Value::Null),
        }
    }

    /// Error code, if this is an error response.
    #[must_use]
    pub fn error_code(&self) -> Option<i32> {
        self.error.as_ref().map(|e| e.code)
    }
}

/// Reply body: one object, or an array aligned with a batch.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Reply {
    Single(JsonRpcResponse),
    Batch(Vec<JsonRpcResponse>),
}

/// Result of dispatching one HTTP body.
#[derive(Debug, Clone)]
pub struct Dispatched {
    pub reply: Reply,
    /// First session id minted while handling the body.
    pub session_id: Option<String>,
}

/// The body was not JSON at all.
#[derive(Debug, Clone)]
pub struct ParseFailure(pub JsonRpcResponse);

/// Who is calling, as far as dispatch cares.
#[derive(Debug, Clone)]
pub struct Caller {
    pub client_id: String,
    pub scopes: ScopeSet,
}

impl From<&AccessToken> for Caller {
    fn from(token: &AccessToken) -> Self {
        Self {
            client_id: token.client_id.clone(),
            scopes: token.scopes(),
        }
    }
}

/// Routes JSON-RPC envelopes to protocol handlers and tools.
pub struct Dispatcher {
    tools: ToolRegistry,
    ctx: ToolContext,
    protocol_version: String,
}

impl Dispatcher {
    #[must_use]
    pub fn new(tools: ToolRegistry, ctx: ToolContext, protocol_version: impl Into<String>) -> Self {
        Self {
            tools,
            ctx,
            protocol_version: protocol_version.into(),
        }
    }

    /// Protocol version announced by `initialize`.
    #[must_use]
    pub fn protocol_version(&self) -> &str {
        &self.protocol_version
    }

    #[must_use]
    pub fn tool_count(&self) -> usize {
        self.tools.len()
    }

    /// Dispatch a raw request body.
    ///
    /// # Errors
    ///
    /// Returns [`ParseFailure`] carrying a `-32700` response when the body is
    /// not valid JSON.
    pub async fn dispatch_body(
        &self,
        body: &[u8],
        caller: &Caller,
    ) -> Result<Dispatched, ParseFailure> {
        let value: Value = serde_json::from_slice(body).map_err(|e| {
            tracing::debug!(error = %e, "Unparseable JSON-RPC body");
            ParseFailure(JsonRpcResponse::error(
                None,
                ErrorCode::ParseError,
                Some(e.to_string()),
            ))
        })?;
        Ok(self.dispatch(value, caller).await)
    }

    /// Dispatch a parsed body: a single envelope or a batch.
    pub async fn dispatch(&self, body: Value, caller: &Caller) -> Dispatched {
        match body {
            Value::Array(envelopes) if envelopes.is_empty() => Dispatched {
                reply: Reply::Single(JsonRpcResponse::error(
                    None,
                    ErrorCode::InvalidRequest,
                    Some("Empty batch".to_string()),
                )),
                session_id: None,
            },
            Value::Array(envelopes) => {
                tracing::debug!(size = envelopes.len(), "Dispatching batch");
                let outcomes = futures::future::join_all(
                    envelopes
                        .into_iter()
                        .map(|envelope| self.handle_envelope(envelope, caller)),
                )
                .await;

                let mut session_id = None;
                let mut responses = Vec::with_capacity(outcomes.len());
                for (response, minted) in outcomes {
                    if session_id.is_none() {
                        session_id = minted;
                    }
                    responses.push(response);
                }
                Dispatched {
                    reply: Reply::Batch(responses),
                    session_id,
                }
            }
            envelope => {
                let (response, session_id) = self.handle_envelope(envelope, caller).await;
                Dispatched {
                    reply: Reply::Single(response),
                    session_id,
                }
            }
        }
    }

    /// Handle one envelope. Returns the response and any minted session id.
    async fn handle_envelope(
        &self,
        envelope: Value,
        caller: &Caller,
    ) -> (JsonRpcResponse, Option<String>) {
        let raw_id = envelope.get("id").cloned().filter(|id| !id.is_null());
        let request: JsonRpcRequest = match serde_json::from_value(envelope) {
            Ok(request) => request,
            Err(e) => {
                return (
                    JsonRpcResponse::error(raw_id, ErrorCode::InvalidRequest, Some(e.to_string())),
                    None,
                );
            }
        };
        if request.jsonrpc != "2.0" {
            return (
                JsonRpcResponse::error(
                    request.id,
                    ErrorCode::InvalidRequest,
                    Some(format!("Unsupported jsonrpc version: {}", request.jsonrpc)),
                ),
                None,
            );
        }

        tracing::debug!(
            method = %request.method,
            client_id = %caller.client_id,
            "Handling JSON-RPC request"
        );

        let id = request.id;
        match request.method.as_str() {
            "initialize" => {
                let (result, session_id) = self.initialize(&request.params);
                (JsonRpcResponse::success(id, result), Some(session_id))
            }
            "notifications/initialized" | "notifications/cancelled" | "initialized" => {
                (JsonRpcResponse::success(id, json!({})), None)
            }
            "ping" => (
                JsonRpcResponse::success(
                    id,
                    json!({"status": "pong", "timestamp": chrono::Utc::now().to_rfc3339()}),
                ),
                None,
            ),
            "tools/list" => (self.list_tools(id, caller), None),
            "tools/call" => (self.call_tool(id, &request.params, caller).await, None),
            "resources/list" => (listing(id, caller, "resources"), None),
            "prompts/list" => (listing(id, caller, "prompts"), None),
            "resources/read" | "prompts/get" => (
                JsonRpcResponse::error(
                    id,
                    ErrorCode::MethodNotFound,
                    Some(format!("{} not implemented", request.method)),
                ),
                None,
            ),
            other => (
                JsonRpcResponse::error(
                    id,
                    ErrorCode::MethodNotFound,
                    Some(format!("Unknown method: {other}")),
                ),
                None,
            ),
        }
    }

    fn initialize(&self, params: &Value) -> (Value, String) {
        let requested = params
            .get("protocolVersion")
            .and_then(Value::as_str)
            .unwrap_or("unspecified");
        let session_id = uuid::Uuid::new_v4().to_string();
        tracing::info!(requested_version = %requested, session_id = %session_id, "MCP initialize");

        let result = json!({
            "protocolVersion": self.protocol_version,
            "capabilities": {
                "tools": {"listChanged": false},
                "resources": {"subscribe": false, "listChanged": false},
                "prompts": {"listChanged": false},
                "logging": {}
            },
            "serverInfo": {
                "name": mcp::SERVER_NAME,
                "version": env!("CARGO_PKG_VERSION")
            }
        });
        (result, session_id)
    }

    fn list_tools(&self, id: Option<Value>, caller: &Caller) -> JsonRpcResponse {
        if !caller.scopes.can_read() {
            return insufficient(id, "mcp:read scope required");
        }
        JsonRpcResponse::success(id, json!({ "tools": self.tools.definitions() }))
    }

    async fn call_tool(
        &self,
        id: Option<Value>,
        params: &Value,
        caller: &Caller,
    ) -> JsonRpcResponse {
        if !caller.scopes.can_read() {
            return insufficient(id, "mcp:read or mcp:write scope required");
        }

        let Some(name) = params.get("name").and_then(Value::as_str) else {
            return JsonRpcResponse::error(
                id,
                ErrorCode::InvalidParams,
                Some("Tool name is required".to_string()),
            );
        };
        let Some(tool) = self.tools.get(name) else {
            return JsonRpcResponse::error(
                id,
                ErrorCode::MethodNotFound,
                Some(format!("Tool '{name}' not found")),
            );
        };
        if tool.access() == Access::Write && !caller.scopes.can_write() {
            tracing::warn!(tool = %name, client_id = %caller.client_id, "Write tool denied");
            return insufficient(id, "Write operations require mcp:write or mcp:admin scope");
        }

        let arguments = params
            .get("arguments")
            .cloned()
            .unwrap_or_else(|| json!({}));
        tracing::info!(tool = %name, client_id = %caller.client_id, "Executing tool");

        let outcome = AssertUnwindSafe(tool.execute(&self.ctx, arguments))
            .catch_unwind()
            .await;
        match outcome {
            Ok(Ok(result)) => match serde_json::to_string_pretty(&result) {
                Ok(text) => JsonRpcResponse::success(
                    id,
                    json!({"content": [{"type": "text", "text": text}]}),
                ),
                Err(e) => JsonRpcResponse::error(id, ErrorCode::InternalError, Some(e.to_string())),
            },
            Ok(Err(e)) if e.is_invalid_params() => {
                tracing::debug!(tool = %name, error = %e, "Tool rejected arguments");
                JsonRpcResponse::error(id, ErrorCode::InvalidParams, Some(e.to_user_message()))
            }
            Ok(Err(e)) => {
                tracing::error!(tool = %name, error = %e, "Tool execution failed");
                JsonRpcResponse::error(id, ErrorCode::InternalError, Some(e.to_string()))
            }
            Err(_) => {
                tracing::error!(tool = %name, "Tool execution panicked");
                JsonRpcResponse::error(
                    id,
                    ErrorCode::InternalError,
                    Some(format!("Tool '{name}' failed unexpectedly")),
                )
            }
        }
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("tools", &self.tools)
            .field("protocol_version", &self.protocol_version)
            .finish()
    }
}

fn insufficient(id: Option<Value>, detail: &str) -> JsonRpcResponse {
    JsonRpcResponse::error(
        id,
        ErrorCode::InsufficientPermissions,
        Some(detail.to_string()),
    )
}

fn listing(id: Option<Value>, caller: &Caller, kind: &str) -> JsonRpcResponse {
    if !caller.scopes.can_read() {
        return insufficient(id, "mcp:read scope required");
    }
    let mut result = serde_json::Map::new();
    result.insert(kind.to_string(), json!([]));
    JsonRpcResponse::success(id, Value::Object(result))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::client::AirtableClient;
    use crate::config::Config;

    fn dispatcher() -> Dispatcher {
        let mut config = Config::for_testing("http://127.0.0.1:9");
        config.airtable_api_key = None;
        let client = AirtableClient::new(&config).unwrap();
        Dispatcher::new(
            ToolRegistry::standard().unwrap(),
            ToolContext::new(Arc::new(client)),
            mcp::PROTOCOL_VERSION,
        )
    }

    fn caller(scope: &str) -> Caller {
        Caller {
            client_id: "client-1".into(),
            scopes: ScopeSet::from_granted(scope),
        }
    }

    async fn single(body: Value, scope: &str) -> JsonRpcResponse {
        match dispatcher().dispatch(body, &caller(scope)).await.reply {
            Reply::Single(response) => response,
            Reply::Batch(_) => panic!("expected a single response"),
        }
    }

    #[tokio::test]
    async fn test_initialize_mints_session() {
        let body = json!({"jsonrpc": "2.0", "id": 1, "method": "initialize", "params": {}});
        let outcome = dispatcher().dispatch(body, &caller("mcp:read")).await;
        assert!(outcome.session_id.is_some());
        let Reply::Single(response) = outcome.reply else {
            panic!("expected single")
        };
        let result = response.result.unwrap();
        assert_eq!(result["protocolVersion"], mcp::PROTOCOL_VERSION);
        assert!(result["capabilities"]["logging"].is_object());
    }

    #[tokio::test]
    async fn test_notification_gets_null_id_reply() {
        let body = json!({"jsonrpc": "2.0", "method": "notifications/initialized"});
        let response = single(body, "mcp:read").await;
        assert_eq!(response.id, Value::Null);
        assert_eq!(response.result, Some(json!({})));
    }

    #[tokio::test]
    async fn test_ping() {
        let body = json!({"jsonrpc": "2.0", "id": "p", "method": "ping"});
        let response = single(body, "mcp:read").await;
        assert_eq!(response.result.unwrap()["status"], "pong");
    }

    #[tokio::test]
    async fn test_unknown_method() {
        let body = json!({"jsonrpc": "2.0", "id": 3, "method": "sampling/create"});
        let response = single(body, "mcp:read").await;
        assert_eq!(response.error_code(), Some(-32601));
    }

    #[tokio::test]
    async fn test_unimplemented_reads_are_method_not_found() {
        for method in ["resources/read", "prompts/get"] {
            let body = json!({"jsonrpc": "2.0", "id": 1, "method": method});
            let response = single(body, "mcp:admin").await;
            assert_eq!(response.error_code(), Some(-32601), "{method}");
        }
        let body = json!({"jsonrpc": "2.0", "id": 1, "method": "resources/list"});
        let response = single(body, "mcp:read").await;
        assert_eq!(response.result, Some(json!({"resources": []})));
    }

    #[tokio::test]
    async fn test_wrong_version_is_invalid_request() {
        let body = json!({"jsonrpc": "1.0", "id": 9, "method": "ping"});
        let response = single(body, "mcp:read").await;
        assert_eq!(response.error_code(), Some(-32600));
        assert_eq!(response.id, json!(9));
    }

    #[tokio::test]
    async fn test_write_tool_requires_write_scope() {
        let body = json!({
            "jsonrpc": "2.0", "id": 4, "method": "tools/call",
            "params": {
                "name": "delete_records",
                "arguments": {"baseId": "app1", "tableId": "tbl1", "recordIds": ["rec1"]}
            }
        });
        let response = single(body, "mcp:read").await;
        assert_eq!(response.error_code(), Some(-32001));
    }

    #[tokio::test]
    async fn test_empty_scope_cannot_list_tools() {
        let body = json!({"jsonrpc": "2.0", "id": 1, "method": "tools/list"});
        let response = single(body, "").await;
        assert_eq!(response.error_code(), Some(-32001));
    }

    #[tokio::test]
    async fn test_invalid_arguments_are_invalid_params() {
        let body = json!({
            "jsonrpc": "2.0", "id": 5, "method": "tools/call",
            "params": {"name": "get_record", "arguments": {"baseId": "app1"}}
        });
        let response = single(body, "mcp:read").await;
        assert_eq!(response.error_code(), Some(-32602));
    }

    #[tokio::test]
    async fn test_client_failure_is_internal_error() {
        let body = json!({
            "jsonrpc": "2.0", "id": 6, "method": "tools/call",
            "params": {"name": "list_bases"}
        });
        let response = single(body, "mcp:read").await;
        let error = response.error.unwrap();
        assert_eq!(error.code, -32603);
        assert!(error.data.unwrap().contains("not configured"));
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let outcome = dispatcher().dispatch(json!([]), &caller("mcp:read")).await;
        let Reply::Single(response) = outcome.reply else {
            panic!("expected single")
        };
        assert_eq!(response.error_code(), Some(-32600));
    }

    #[tokio::test]
    async fn test_parse_failure() {
        let err = dispatcher()
            .dispatch_body(b"{not json", &caller("mcp:read"))
            .await
            .unwrap_err();
        assert_eq!(err.0.error_code(), Some(-32700));
    }
}
