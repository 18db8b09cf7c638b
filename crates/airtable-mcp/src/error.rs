//! Error types for the Airtable MCP server.
//!
//! One `thiserror` enum per layer: the Airtable client, tool execution,
//! the OAuth authorization engine, and the token store backend.

use std::time::Duration;

use axum::http::StatusCode;

/// Errors from the Airtable HTTP client layer.
#[derive(thiserror::Error, Debug)]
pub enum ClientError {
    /// HTTP transport error (connection, DNS, TLS, etc.)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Middleware error
    #[error("Middleware error: {0}")]
    Middleware(#[from] reqwest_middleware::Error),

    /// No Airtable API key configured
    #[error("Airtable API key is not configured")]
    NotConfigured,

    /// Invalid or missing API key (401 response)
    #[error("Invalid Airtable API key")]
    Unauthorized,

    /// Key lacks access to the resource (403 response)
    #[error("Access forbidden: {message}")]
    Forbidden {
        /// Error message from API
        message: String,
    },

    /// Resource not found (404 response)
    #[error("Resource not found: {resource}")]
    NotFound {
        /// Description of the missing resource
        resource: String,
    },

    /// Airtable rejected the payload (422 response)
    #[error("Invalid request: {message}")]
    Validation {
        /// Error message from API
        message: String,
    },

    /// Rate limited by Airtable (429 response)
    #[error("Rate limited, retry after {retry_after:?}")]
    RateLimited {
        /// Suggested wait time before retry
        retry_after: Duration,
    },

    /// Request timeout
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// JSON parsing error
    #[error("Failed to parse response: {0}")]
    Parse(#[from] serde_json::Error),

    /// Server error (5xx response)
    #[error("Server error ({status}): {message}")]
    Server {
        /// HTTP status code
        status: u16,
        /// Error message
        message: String,
    },

    /// Unexpected HTTP status
    #[error("Unexpected status {status}: {message}")]
    UnexpectedStatus {
        /// HTTP status code
        status: u16,
        /// Response body or message
        message: String,
    },
}

impl ClientError {
    /// Create a rate limited error with retry-after duration.
    #[must_use]
    pub fn rate_limited(seconds: u64) -> Self {
        Self::RateLimited {
            retry_after: Duration::from_secs(seconds),
        }
    }

    /// Create a not found error.
    #[must_use]
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    /// Create a validation error.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create a server error.
    #[must_use]
    pub fn server(status: u16, message: impl Into<String>) -> Self {
        Self::Server {
            status,
            message: message.into(),
        }
    }

    /// Returns true if this error is retryable.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited { .. } | Self::Timeout(_) | Self::Server { .. })
    }

    /// Get the retry-after duration if this is a rate limit error.
    #[must_use]
    pub const fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after } => Some(*retry_after),
            _ => None,
        }
    }
}

/// Errors from MCP tool execution.
#[derive(thiserror::Error, Debug)]
pub enum ToolError {
    /// Error from the API client
    #[error("API error: {0}")]
    Client(#[from] ClientError),

    /// Input validation failed
    #[error("Validation error: {message}")]
    Validation {
        /// Field that failed validation
        field: String,
        /// Validation error message
        message: String,
    },

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal tool logic error
    #[error("Internal error: {0}")]
    Internal(String),

    /// Resource not available
    #[error("Resource unavailable: {0}")]
    Unavailable(String),
}

impl ToolError {
    /// Create a validation error.
    #[must_use]
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Create an unavailable error.
    #[must_use]
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable(message.into())
    }

    /// True for errors caused by the caller's arguments.
    #[must_use]
    pub const fn is_invalid_params(&self) -> bool {
        matches!(self, Self::Validation { .. } | Self::Serialization(_))
    }

    /// Convert to a user-friendly error message for MCP response.
    #[must_use]
    pub fn to_user_message(&self) -> String {
        match self {
            Self::Client(ClientError::RateLimited { retry_after }) => {
                format!("Rate limited by Airtable. Please wait {:?} before retrying.", retry_after)
            }
            Self::Client(ClientError::NotFound { resource }) => {
                format!("Not found: {resource}. Please check the base, table and record IDs.")
            }
            Self::Client(ClientError::NotConfigured) => {
                "Airtable API key is not configured on the server.".to_string()
            }
            Self::Validation { field, message } => {
                format!("Invalid input for '{field}': {message}")
            }
            _ => self.to_string(),
        }
    }
}

/// Errors from the OAuth authorization engine.
///
/// Every variant maps onto an RFC 6749 / RFC 7591 `error` code and carries
/// the human-readable `error_description`.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum OAuthError {
    /// Malformed or incomplete request
    #[error("{0}")]
    InvalidRequest(String),

    /// Unknown client
    #[error("{0}")]
    InvalidClient(String),

    /// Redirect URI not registered for the client
    #[error("{0}")]
    InvalidRedirectUri(String),

    /// `response_type` other than `code`
    #[error("{0}")]
    UnsupportedResponseType(String),

    /// Unrecognized scope token
    #[error("{0}")]
    InvalidScope(String),

    /// `grant_type` other than `authorization_code`
    #[error("{0}")]
    UnsupportedGrantType(String),

    /// Code missing, expired, reused, mismatched, or failing PKCE
    #[error("{0}")]
    InvalidGrant(String),

    /// Per-key request budget exhausted
    #[error("{0}")]
    RateLimited(String),

    /// Token store failure
    #[error("{0}")]
    ServerError(String),
}

impl OAuthError {
    /// Create an invalid request error.
    #[must_use]
    pub fn invalid_request(description: impl Into<String>) -> Self {
        Self::InvalidRequest(description.into())
    }

    /// Create an invalid grant error.
    #[must_use]
    pub fn invalid_grant(description: impl Into<String>) -> Self {
        Self::InvalidGrant(description.into())
    }

    /// The RFC `error` code string.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) => "invalid_request",
            Self::InvalidClient(_) => "invalid_client",
            Self::InvalidRedirectUri(_) => "invalid_redirect_uri",
            Self::UnsupportedResponseType(_) => "unsupported_response_type",
            Self::InvalidScope(_) => "invalid_scope",
            Self::UnsupportedGrantType(_) => "unsupported_grant_type",
            Self::InvalidGrant(_) => "invalid_grant",
            Self::RateLimited(_) => "rate_limited",
            Self::ServerError(_) => "server_error",
        }
    }

    /// HTTP status used when the error is returned directly.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidClient(_) => StatusCode::UNAUTHORIZED,
            Self::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            Self::ServerError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

impl From<StoreError> for OAuthError {
    fn from(err: StoreError) -> Self {
        Self::ServerError(err.to_string())
    }
}

/// Errors from a token store backend.
#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    /// Backend unavailable or failed mid-operation
    #[error("token store backend error: {0}")]
    Backend(String),
}

/// Result type alias for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Result type alias for tool operations.
pub type ToolResult<T> = Result<T, ToolError>;

/// Result type alias for authorization engine operations.
pub type OAuthResult<T> = Result<T, OAuthError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_error_retryable() {
        assert!(ClientError::rate_limited(30).is_retryable());
        assert!(ClientError::Timeout(Duration::from_secs(30)).is_retryable());
        assert!(ClientError::server(502, "Bad gateway").is_retryable());

        assert!(!ClientError::not_found("recXYZ").is_retryable());
        assert!(!ClientError::validation("Unknown field name").is_retryable());
        assert!(!ClientError::NotConfigured.is_retryable());
    }

    #[test]
    fn test_client_error_retry_after() {
        let err = ClientError::rate_limited(30);
        assert_eq!(err.retry_after(), Some(Duration::from_secs(30)));
        assert_eq!(ClientError::Unauthorized.retry_after(), None);
    }

    #[test]
    fn test_tool_error_user_message() {
        let err = ToolError::validation("baseId", "cannot be empty");
        assert!(err.to_user_message().contains("baseId"));
        assert!(err.to_user_message().contains("cannot be empty"));

        let err = ToolError::Client(ClientError::NotConfigured);
        assert!(err.to_user_message().contains("not configured"));
    }

    #[test]
    fn test_tool_error_invalid_params() {
        assert!(ToolError::validation("records", "too many").is_invalid_params());
        assert!(!ToolError::internal("boom").is_invalid_params());
        assert!(!ToolError::Client(ClientError::Unauthorized).is_invalid_params());
    }

    #[test]
    fn test_oauth_error_codes_and_status() {
        let err = OAuthError::InvalidClient("Invalid client_id".into());
        assert_eq!(err.error_code(), "invalid_client");
        assert_eq!(err.status_code(), StatusCode::UNAUTHORIZED);

        let err = OAuthError::invalid_grant("Authorization code expired");
        assert_eq!(err.error_code(), "invalid_grant");
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(err.to_string(), "Authorization code expired");

        let err = OAuthError::RateLimited("Too many requests".into());
        assert_eq!(err.status_code(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[test]
    fn test_store_error_converts_to_server_error() {
        let err: OAuthError = StoreError::Backend("disk on fire".into()).into();
        assert_eq!(err.error_code(), "server_error");
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
