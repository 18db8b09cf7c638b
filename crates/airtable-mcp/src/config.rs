//! Configuration for the Airtable MCP server.

use std::time::Duration;

/// Airtable API constants.
pub mod api {
    use std::time::Duration;

    /// Base URL for the Airtable REST API.
    pub const BASE_URL: &str = "https://api.airtable.com/v0";

    /// Request timeout.
    pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

    /// Connection timeout.
    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

    /// Airtable allows 5 requests per second per base.
    pub const REQUESTS_PER_SECOND: u32 = 5;

    /// Schema (meta) response cache TTL.
    pub const SCHEMA_CACHE_TTL: Duration = Duration::from_secs(60);

    /// Maximum cached schema responses.
    pub const SCHEMA_CACHE_MAX_SIZE: u64 = 500;

    /// Maximum keepalive connections.
    pub const MAX_KEEPALIVE: usize = 10;

    /// Keepalive expiry.
    pub const KEEPALIVE_EXPIRY: Duration = Duration::from_secs(30);

    /// Airtable caps record writes and deletes at 10 per request.
    pub const MAX_RECORDS_PER_REQUEST: usize = 10;

    /// Airtable page size for record listings.
    pub const PAGE_SIZE: u32 = 100;

    /// Upper bound on pages followed by a single listing.
    pub const MAX_PAGES: usize = 50;

    /// User agent sent to Airtable.
    pub const USER_AGENT: &str = concat!("airtable-mcp/", env!("CARGO_PKG_VERSION"));
}

/// OAuth lifetimes and limits.
pub mod oauth {
    use std::time::Duration;

    /// Authorization code lifetime in seconds.
    pub const CODE_EXPIRY_SECS: u64 = 60;

    /// Access token lifetime in seconds.
    pub const TOKEN_EXPIRY_SECS: u64 = 3600;

    /// Refresh token lifetime in seconds.
    pub const REFRESH_TOKEN_EXPIRY_SECS: u64 = 86_400;

    /// Development code lifetime in seconds.
    pub const DEV_CODE_EXPIRY_SECS: u64 = 300;

    /// Development access token lifetime in seconds.
    pub const DEV_TOKEN_EXPIRY_SECS: u64 = 7200;

    /// Reclaimer sweep interval.
    pub const CLEANUP_INTERVAL: Duration = Duration::from_secs(300);

    /// Reclaimer backoff after a failed sweep.
    pub const CLEANUP_RETRY_BACKOFF: Duration = Duration::from_secs(60);

    /// Rate-limit timestamps older than this are dropped by the reclaimer.
    pub const RATE_LIMIT_RETENTION: Duration = Duration::from_secs(3600);

    /// Permitted range for the authorization code lifetime.
    pub const CODE_EXPIRY_RANGE: std::ops::RangeInclusive<u64> = 30..=600;

    /// Minimum access token lifetime.
    pub const MIN_TOKEN_EXPIRY_SECS: u64 = 300;
}

/// Per-endpoint rate limits: `(max_requests, window)`.
pub mod limits {
    use std::time::Duration;

    /// Client registrations per IP.
    pub const REGISTER: (usize, Duration) = (5, Duration::from_secs(300));

    /// Authorization requests per client.
    pub const AUTHORIZE: (usize, Duration) = (10, Duration::from_secs(300));

    /// Token requests per client.
    pub const TOKEN: (usize, Duration) = (20, Duration::from_secs(300));
}

/// MCP protocol defaults.
pub mod mcp {
    use std::time::Duration;

    /// Protocol revision spoken by this server.
    pub const PROTOCOL_VERSION: &str = "2025-03-26";

    /// Server name reported during `initialize`.
    pub const SERVER_NAME: &str = "airtable-remote-mcp";

    /// Interval between stream heartbeats.
    pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
}

/// Deployment environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum Environment {
    /// Relaxed lifetimes and plain-HTTP base URLs.
    Development,
    /// Strict validation.
    #[default]
    Production,
}

impl Environment {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
        }
    }

    fn parse(value: &str) -> anyhow::Result<Self> {
        match value.to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Self::Development),
            "production" | "prod" => Ok(Self::Production),
            other => anyhow::bail!("ENVIRONMENT must be development or production, got '{other}'"),
        }
    }
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Bind address.
    pub host: String,

    /// Bind port.
    pub port: u16,

    /// Deployment environment.
    pub environment: Environment,

    /// Public base URL used in metadata documents and challenges.
    pub base_url: String,

    /// CORS origins; `["*"]` allows any.
    pub allowed_origins: Vec<String>,

    /// Whether OAuth endpoint rate limiting is applied.
    pub rate_limit_enabled: bool,

    /// Key rate limits on the first `X-Forwarded-For` hop instead of the
    /// socket peer. Only safe behind a proxy that overwrites the header.
    pub trust_forwarded_for: bool,

    /// Authorization code lifetime.
    pub code_expiry: Duration,

    /// Access token lifetime.
    pub token_expiry: Duration,

    /// Refresh token lifetime.
    pub refresh_token_expiry: Duration,

    /// Reclaimer sweep interval.
    pub cleanup_interval: Duration,

    /// Airtable personal access token (optional).
    pub airtable_api_key: Option<String>,

    /// Airtable API base URL (overridable for mock servers).
    pub airtable_api_url: String,

    /// Request timeout for Airtable calls.
    pub request_timeout: Duration,

    /// Connection timeout for Airtable calls.
    pub connect_timeout: Duration,

    /// Outbound request budget per second.
    pub requests_per_second: u32,

    /// Schema cache TTL.
    pub schema_cache_ttl: Duration,

    /// Maximum schema cache entries.
    pub schema_cache_max_size: u64,

    /// MCP protocol version advertised by `initialize`.
    pub protocol_version: String,

    /// Interval between stream heartbeats.
    pub heartbeat_interval: Duration,
}

impl Config {
    /// Create a configuration for the given environment with default lifetimes.
    ///
    /// Development lengthens code and token lifetimes so manual flows are
    /// not racing the clock.
    #[must_use]
    pub fn new(environment: Environment, airtable_api_key: Option<String>) -> Self {
        let (code_secs, token_secs) = match environment {
            Environment::Development => (oauth::DEV_CODE_EXPIRY_SECS, oauth::DEV_TOKEN_EXPIRY_SECS),
            Environment::Production => (oauth::CODE_EXPIRY_SECS, oauth::TOKEN_EXPIRY_SECS),
        };

        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            environment,
            base_url: "http://localhost:8000".to_string(),
            allowed_origins: vec!["*".to_string()],
            rate_limit_enabled: true,
            trust_forwarded_for: false,
            code_expiry: Duration::from_secs(code_secs),
            token_expiry: Duration::from_secs(token_secs),
            refresh_token_expiry: Duration::from_secs(oauth::REFRESH_TOKEN_EXPIRY_SECS),
            cleanup_interval: oauth::CLEANUP_INTERVAL,
            airtable_api_key,
            airtable_api_url: api::BASE_URL.to_string(),
            request_timeout: api::REQUEST_TIMEOUT,
            connect_timeout: api::CONNECT_TIMEOUT,
            requests_per_second: api::REQUESTS_PER_SECOND,
            schema_cache_ttl: api::SCHEMA_CACHE_TTL,
            schema_cache_max_size: api::SCHEMA_CACHE_MAX_SIZE,
            protocol_version: mcp::PROTOCOL_VERSION.to_string(),
            heartbeat_interval: mcp::HEARTBEAT_INTERVAL,
        }
    }

    /// Create a test configuration pointing at a mock Airtable server.
    #[must_use]
    pub fn for_testing(api_url: &str) -> Self {
        Self {
            base_url: "https://mcp.example.com".to_string(),
            airtable_api_key: Some("test-airtable-key".to_string()),
            airtable_api_url: api_url.trim_end_matches('/').to_string(),
            request_timeout: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(2),
            requests_per_second: 1000,
            schema_cache_ttl: Duration::from_secs(0), // No caching in tests
            schema_cache_max_size: 0,
            ..Self::new(Environment::Development, None)
        }
    }

    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns error if a variable is malformed or the result fails [`Config::validate`].
    pub fn from_env() -> anyhow::Result<Self> {
        let environment = match std::env::var("ENVIRONMENT") {
            Ok(value) => Environment::parse(&value)?,
            Err(_) => Environment::default(),
        };
        Self::from_env_for(environment)
    }

    /// Like [`Config::from_env`], with the environment already chosen.
    ///
    /// # Errors
    ///
    /// Returns error if a variable is malformed or the result fails [`Config::validate`].
    pub fn from_env_for(environment: Environment) -> anyhow::Result<Self> {
        let mut config = Self::new(environment, std::env::var("AIRTABLE_API_KEY").ok());

        if let Ok(host) = std::env::var("HOST") {
            config.host = host;
        }
        if let Some(port) = env_parse::<u16>("PORT")? {
            config.port = port;
        }
        if let Ok(base_url) = std::env::var("BASE_URL") {
            config.base_url = base_url.trim_end_matches('/').to_string();
        }
        if let Ok(origins) = std::env::var("ALLOWED_ORIGINS") {
            config.allowed_origins = parse_origins(&origins);
        }
        if let Ok(enabled) = std::env::var("RATE_LIMIT_ENABLED") {
            config.rate_limit_enabled = enabled.eq_ignore_ascii_case("true");
        }
        if let Ok(trusted) = std::env::var("TRUST_FORWARDED_FOR") {
            config.trust_forwarded_for = trusted.eq_ignore_ascii_case("true");
        }
        // Development keeps its relaxed lifetimes regardless of overrides.
        if environment == Environment::Production {
            if let Some(secs) = env_parse::<u64>("OAUTH_CODE_EXPIRY")? {
                config.code_expiry = Duration::from_secs(secs);
            }
            if let Some(secs) = env_parse::<u64>("OAUTH_TOKEN_EXPIRY")? {
                config.token_expiry = Duration::from_secs(secs);
            }
        }
        if let Some(secs) = env_parse::<u64>("OAUTH_REFRESH_TOKEN_EXPIRY")? {
            config.refresh_token_expiry = Duration::from_secs(secs);
        }
        if let Some(secs) = env_parse::<u64>("CLEANUP_INTERVAL")? {
            config.cleanup_interval = Duration::from_secs(secs);
        }
        if let Ok(url) = std::env::var("AIRTABLE_BASE_URL") {
            config.airtable_api_url = url.trim_end_matches('/').to_string();
        }
        if let Some(secs) = env_parse::<u64>("AIRTABLE_TIMEOUT")? {
            config.request_timeout = Duration::from_secs(secs);
        }
        if let Ok(version) = std::env::var("MCP_PROTOCOL_VERSION") {
            config.protocol_version = version;
        }

        config.validate()?;
        Ok(config)
    }

    /// Check lifetime bounds and production requirements.
    ///
    /// # Errors
    ///
    /// Returns error describing the first violated constraint.
    pub fn validate(&self) -> anyhow::Result<()> {
        let code_secs = self.code_expiry.as_secs();
        if !oauth::CODE_EXPIRY_RANGE.contains(&code_secs) {
            anyhow::bail!("OAUTH_CODE_EXPIRY must be between 30 and 600 seconds, got {code_secs}");
        }
        if self.token_expiry.as_secs() < oauth::MIN_TOKEN_EXPIRY_SECS {
            anyhow::bail!("OAUTH_TOKEN_EXPIRY must be at least 300 seconds");
        }
        if self.is_production() {
            if !self.base_url.starts_with("https://") {
                anyhow::bail!("BASE_URL must use HTTPS in production");
            }
            if self.airtable_api_key.is_none() {
                tracing::warn!(
                    "AIRTABLE_API_KEY not set; tool calls will fail until it is configured"
                );
            }
        }
        Ok(())
    }

    /// Check if running in production.
    #[must_use]
    pub fn is_production(&self) -> bool {
        self.environment == Environment::Production
    }

    /// Check if an Airtable API key is configured.
    #[must_use]
    pub const fn has_api_key(&self) -> bool {
        self.airtable_api_key.is_some()
    }

    /// Absolute URL for a server path.
    #[must_use]
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new(Environment::Production, None)
    }
}

fn env_parse<T>(name: &str) -> anyhow::Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| anyhow::anyhow!("{name} is invalid: {e}")),
        Err(_) => Ok(None),
    }
}

fn parse_origins(raw: &str) -> Vec<String> {
    if raw.trim() == "*" {
        return vec!["*".to_string()];
    }
    raw.split(',')
        .map(str::trim)
        .filter(|o| !o.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert!(config.airtable_api_key.is_none());
        assert!(!config.has_api_key());
        assert_eq!(config.code_expiry, Duration::from_secs(60));
        assert_eq!(config.token_expiry, Duration::from_secs(3600));
        assert!(!config.trust_forwarded_for);
        assert!(!Config::for_testing("http://127.0.0.1:9").trust_forwarded_for);
    }

    #[test]
    fn test_development_lifetimes() {
        let config = Config::new(Environment::Development, None);
        assert_eq!(config.code_expiry, Duration::from_secs(300));
        assert_eq!(config.token_expiry, Duration::from_secs(7200));
    }

    #[test]
    fn test_validate_rejects_short_code_expiry() {
        let mut config = Config::new(Environment::Development, None);
        config.code_expiry = Duration::from_secs(10);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_short_token_expiry() {
        let mut config = Config::new(Environment::Development, None);
        config.token_expiry = Duration::from_secs(60);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_production_requires_https() {
        let config = Config::default();
        assert!(config.validate().is_err());

        let config = Config {
            base_url: "https://mcp.example.com".into(),
            ..Config::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_origins() {
        assert_eq!(parse_origins("*"), vec!["*"]);
        assert_eq!(
            parse_origins("https://a.example, https://b.example,"),
            vec!["https://a.example", "https://b.example"]
        );
    }

    #[test]
    fn test_environment_parse() {
        assert_eq!(Environment::parse("DEVELOPMENT").unwrap(), Environment::Development);
        assert!(Environment::parse("staging").is_err());
    }
}
