//! Airtable API client.
//!
//! Provides async HTTP client with:
//! - Connection pooling via reqwest
//! - Retry middleware with exponential backoff
//! - Outbound throttling (5 req/s, Airtable's per-base budget)
//! - Schema response caching, invalidated by schema writes

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use governor::{Quota, RateLimiter, clock::DefaultClock, state::InMemoryState, state::NotKeyed};
use moka::future::Cache;
use reqwest::{Client, Method, header};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{RetryTransientMiddleware, policies::ExponentialBackoff};
use serde_json::{Value, json};
use url::Url;

use crate::config::{Config, api};
use crate::error::{ClientError, ClientResult};
use crate::models::{
    DetailLevel, FieldDefinition, ListRecordsOptions, MetadataUpdate, RecordUpdate, search_formula,
};

type Throttle = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// The tabular-data operations the MCP tools need.
///
/// [`AirtableClient`] is the production implementation; tests substitute
/// their own.
#[async_trait]
pub trait TableApi: Send + Sync + std::fmt::Debug {
    /// `GET meta/bases`
    async fn list_bases(&self) -> ClientResult<Value>;

    /// `GET meta/bases/{baseId}/tables`
    async fn list_tables(&self, base_id: &str, detail: DetailLevel) -> ClientResult<Value>;

    /// `GET meta/bases/{baseId}/tables/{tableId}`
    async fn describe_table(
        &self,
        base_id: &str,
        table_id: &str,
        detail: DetailLevel,
    ) -> ClientResult<Value>;

    /// `GET {baseId}/{tableId}`, following `offset` pagination.
    async fn list_records(
        &self,
        base_id: &str,
        table_id: &str,
        options: &ListRecordsOptions,
    ) -> ClientResult<Value>;

    /// Records whose fields contain `term`.
    async fn search_records(
        &self,
        base_id: &str,
        table_id: &str,
        term: &str,
        field_ids: &[String],
        max_records: Option<u32>,
        view: Option<String>,
    ) -> ClientResult<Value> {
        let options = ListRecordsOptions {
            filter_by_formula: Some(search_formula(term, field_ids)),
            max_records,
            sort: Vec::new(),
            view,
        };
        self.list_records(base_id, table_id, &options).await
    }

    /// `GET {baseId}/{tableId}/{recordId}`
    async fn get_record(&self, base_id: &str, table_id: &str, record_id: &str)
    -> ClientResult<Value>;

    /// `POST {baseId}/{tableId}`
    async fn create_record(
        &self,
        base_id: &str,
        table_id: &str,
        fields: serde_json::Map<String, Value>,
    ) -> ClientResult<Value>;

    /// `PATCH {baseId}/{tableId}` with at most 10 records.
    async fn update_records(
        &self,
        base_id: &str,
        table_id: &str,
        records: &[RecordUpdate],
    ) -> ClientResult<Value>;

    /// `DELETE {baseId}/{tableId}?records[]=...` with at most 10 IDs.
    async fn delete_records(
        &self,
        base_id: &str,
        table_id: &str,
        record_ids: &[String],
    ) -> ClientResult<Value>;

    /// Update any number of records, one `PATCH` per 10.
    ///
    /// Returns the first chunk's error; earlier chunks stay committed.
    async fn update_records_batch(
        &self,
        base_id: &str,
        table_id: &str,
        records: &[RecordUpdate],
    ) -> ClientResult<Vec<Value>> {
        let mut updated = Vec::with_capacity(records.len());
        for chunk in records.chunks(api::MAX_RECORDS_PER_REQUEST) {
            let result = self.update_records(base_id, table_id, chunk).await?;
            updated.extend(take_records(result));
        }
        Ok(updated)
    }

    /// Delete any number of records, one `DELETE` per 10.
    ///
    /// Returns the first chunk's error; earlier chunks stay committed.
    async fn delete_records_batch(
        &self,
        base_id: &str,
        table_id: &str,
        record_ids: &[String],
    ) -> ClientResult<Vec<Value>> {
        let mut deleted = Vec::with_capacity(record_ids.len());
        for chunk in record_ids.chunks(api::MAX_RECORDS_PER_REQUEST) {
            let result = self.delete_records(base_id, table_id, chunk).await?;
            deleted.extend(take_records(result));
        }
        Ok(deleted)
    }

    /// `POST meta/bases/{baseId}/tables`
    async fn create_table(
        &self,
        base_id: &str,
        name: &str,
        description: Option<&str>,
        fields: &[FieldDefinition],
    ) -> ClientResult<Value>;

    /// `PATCH meta/bases/{baseId}/tables/{tableId}`
    async fn update_table(
        &self,
        base_id: &str,
        table_id: &str,
        update: &MetadataUpdate,
    ) -> ClientResult<Value>;

    /// `POST meta/bases/{baseId}/tables/{tableId}/fields`
    async fn create_field(
        &self,
        base_id: &str,
        table_id: &str,
        field: &FieldDefinition,
    ) -> ClientResult<Value>;

    /// `PATCH meta/bases/{baseId}/tables/{tableId}/fields/{fieldId}`
    async fn update_field(
        &self,
        base_id: &str,
        table_id: &str,
        field_id: &str,
        update: &MetadataUpdate,
    ) -> ClientResult<Value>;
}

/// Airtable REST API client.
#[derive(Clone)]
pub struct AirtableClient {
    /// HTTP client with middleware.
    client: ClientWithMiddleware,

    /// Schema response cache.
    cache: Cache<String, Value>,

    /// Outbound request throttle.
    throttle: Arc<Throttle>,

    /// Whether an API key was configured.
    has_api_key: bool,

    /// API base URL.
    api_url: Url,

    /// Request timeout, reported on timeouts.
    request_timeout: Duration,
}

impl AirtableClient {
    /// Create a new client with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns error if HTTP client initialization fails.
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let mut headers = header::HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, header::HeaderValue::from_static("application/json"));

        if let Some(ref key) = config.airtable_api_key {
            let mut value = header::HeaderValue::from_str(&format!("Bearer {key}"))?;
            value.set_sensitive(true);
            headers.insert(header::AUTHORIZATION, value);
        }

        let client = Client::builder()
            .default_headers(headers)
            .user_agent(api::USER_AGENT)
            .timeout(config.request_timeout)
            .connect_timeout(config.connect_timeout)
            .pool_max_idle_per_host(api::MAX_KEEPALIVE)
            .pool_idle_timeout(api::KEEPALIVE_EXPIRY)
            .gzip(true)
            .build()?;

        let retry_policy = ExponentialBackoff::builder()
            .retry_bounds(Duration::from_millis(500), Duration::from_secs(30))
            .build_with_max_retries(3);

        let client = ClientBuilder::new(client)
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();

        let cache = Cache::builder()
            .max_capacity(config.schema_cache_max_size)
            .time_to_live(config.schema_cache_ttl)
            .build();

        let per_second = NonZeroU32::new(config.requests_per_second).unwrap_or(NonZeroU32::MIN);
        let throttle = Arc::new(RateLimiter::direct(Quota::per_second(per_second)));

        Ok(Self {
            client,
            cache,
            throttle,
            has_api_key: config.airtable_api_key.is_some(),
            api_url: Url::parse(&config.airtable_api_url)?,
            request_timeout: config.request_timeout,
        })
    }

    /// Check if an API key is configured.
    #[must_use]
    pub const fn has_api_key(&self) -> bool {
        self.has_api_key
    }

    /// Append path segments to the API base, percent-encoding each one.
    fn url(&self, segments: &[&str]) -> ClientResult<String> {
        if let Some(bad) = segments.iter().find(|s| s.is_empty() || matches!(**s, "." | "..")) {
            return Err(ClientError::validation(format!("Invalid path segment {bad:?}")));
        }
        let mut url = self.api_url.clone();
        url.path_segments_mut()
            .map_err(|()| ClientError::validation("API base URL cannot take a path"))?
            .pop_if_empty()
            .extend(segments);
        Ok(url.into())
    }

    /// Cached GET for schema (`meta/...`) endpoints.
    async fn get_schema(&self, url: &str, params: &[(String, String)]) -> ClientResult<Value> {
        let cache_key = self.cache_key("GET", url, params);
        if let Some(cached) = self.cache.get(&cache_key).await {
            tracing::debug!(url = %url, "Schema cache hit");
            return Ok(cached);
        }

        let value = self.request(Method::GET, url, params, None).await?;
        self.cache.insert(cache_key, value.clone()).await;
        Ok(value)
    }

    /// Schema write: perform the request, then drop every cached schema response.
    async fn write_schema(&self, method: Method, url: &str, body: &Value) -> ClientResult<Value> {
        let result = self.request(method, url, &[], Some(body)).await;
        self.cache.invalidate_all();
        result
    }

    /// Make a throttled request and decode the JSON response.
    async fn request(
        &self,
        method: Method,
        url: &str,
        params: &[(String, String)],
        body: Option<&Value>,
    ) -> ClientResult<Value> {
        if !self.has_api_key {
            return Err(ClientError::NotConfigured);
        }

        self.throttle.until_ready().await;
        tracing::debug!(method = %method, url = %url, "Airtable request");

        let mut builder = self.client.request(method, url).query(params);
        if let Some(body) = body {
            builder = builder.body(serde_json::to_string(body)?);
        }

        let response = builder.send().await.map_err(|e| self.map_send_error(e))?;
        let response = self.handle_response(response).await?;

        if response.status() == reqwest::StatusCode::NO_CONTENT {
            return Ok(json!({"success": true}));
        }
        let text = response.text().await?;
        if text.trim().is_empty() {
            return Ok(json!({"success": true}));
        }
        Ok(serde_json::from_str(&text)?)
    }

    fn map_send_error(&self, err: reqwest_middleware::Error) -> ClientError {
        match err {
            reqwest_middleware::Error::Reqwest(e) if e.is_timeout() => {
                ClientError::Timeout(self.request_timeout)
            }
            reqwest_middleware::Error::Reqwest(e) => ClientError::Http(e),
            other => ClientError::Middleware(other),
        }
    }

    /// Handle API response status codes.
    async fn handle_response(
        &self,
        response: reqwest::Response,
    ) -> ClientResult<reqwest::Response> {
        let status = response.status();

        if status.is_success() {
            return Ok(response);
        }

        match status.as_u16() {
            401 => Err(ClientError::Unauthorized),
            403 => {
                let text = response.text().await.unwrap_or_default();
                Err(ClientError::Forbidden {
                    message: error_message(&text),
                })
            }
            404 => {
                let text = response.text().await.unwrap_or_default();
                Err(ClientError::not_found(error_message(&text)))
            }
            422 => {
                let text = response.text().await.unwrap_or_default();
                Err(ClientError::validation(error_message(&text)))
            }
            429 => {
                let retry_after = response
                    .headers()
                    .get(header::RETRY_AFTER)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(30);

                Err(ClientError::rate_limited(retry_after))
            }
            500..=599 => {
                let text = response.text().await.unwrap_or_default();
                Err(ClientError::server(status.as_u16(), text))
            }
            _ => {
                let text = response.text().await.unwrap_or_default();
                Err(ClientError::UnexpectedStatus {
                    status: status.as_u16(),
                    message: text,
                })
            }
        }
    }

    /// Generate cache key.
    fn cache_key(&self, method: &str, url: &str, params: &[(String, String)]) -> String {
        use md5::{Digest, Md5};

        let mut hasher = Md5::new();
        hasher.update(method.as_bytes());
        hasher.update(b"|");
        hasher.update(url.as_bytes());
        hasher.update(b"|");

        for (k, v) in params {
            hasher.update(k.as_bytes());
            hasher.update(b"=");
            hasher.update(v.as_bytes());
            hasher.update(b"&");
        }

        format!("{:x}", hasher.finalize())
    }
}

#[async_trait]
impl TableApi for AirtableClient {
    async fn list_bases(&self) -> ClientResult<Value> {
        self.get_schema(&self.url(&["meta", "bases"])?, &[]).await
    }

    async fn list_tables(&self, base_id: &str, detail: DetailLevel) -> ClientResult<Value> {
        let url = self.url(&["meta", "bases", base_id, "tables"])?;
        self.get_schema(&url, &detail_params(detail)).await
    }

    async fn describe_table(
        &self,
        base_id: &str,
        table_id: &str,
        detail: DetailLevel,
    ) -> ClientResult<Value> {
        let url = self.url(&["meta", "bases", base_id, "tables", table_id])?;
        self.get_schema(&url, &detail_params(detail)).await
    }

    async fn list_records(
        &self,
        base_id: &str,
        table_id: &str,
        options: &ListRecordsOptions,
    ) -> ClientResult<Value> {
        let url = self.url(&[base_id, table_id])?;
        let limit = options.max_records.map(|max| max as usize);
        let mut records: Vec<Value> = Vec::new();
        let mut offset: Option<String> = None;

        for _ in 0..api::MAX_PAGES {
            let mut params = options.to_query();
            params.push(("pageSize".to_string(), api::PAGE_SIZE.to_string()));
            if let Some(ref token) = offset {
                params.push(("offset".to_string(), token.clone()));
            }

            let mut page = self.request(Method::GET, &url, &params, None).await?;
            offset = page.get("offset").and_then(Value::as_str).map(str::to_string);
            records.extend(take_records(page.take()));

            if limit.is_some_and(|max| records.len() >= max) || offset.is_none() {
                break;
            }
        }

        if let Some(max) = limit {
            records.truncate(max);
        }
        let mut result = json!({ "records": records });
        if let Some(offset) = offset {
            result["offset"] = Value::String(offset);
        }
        Ok(result)
    }

    async fn get_record(
        &self,
        base_id: &str,
        table_id: &str,
        record_id: &str,
    ) -> ClientResult<Value> {
        let url = self.url(&[base_id, table_id, record_id])?;
        self.request(Method::GET, &url, &[], None).await
    }

    async fn create_record(
        &self,
        base_id: &str,
        table_id: &str,
        fields: serde_json::Map<String, Value>,
    ) -> ClientResult<Value> {
        let url = self.url(&[base_id, table_id])?;
        let body = json!({ "fields": fields });
        self.request(Method::POST, &url, &[], Some(&body)).await
    }

    async fn update_records(
        &self,
        base_id: &str,
        table_id: &str,
        records: &[RecordUpdate],
    ) -> ClientResult<Value> {
        if records.len() > api::MAX_RECORDS_PER_REQUEST {
            return Err(ClientError::validation("Cannot update more than 10 records at once"));
        }
        let url = self.url(&[base_id, table_id])?;
        let body = json!({ "records": records });
        self.request(Method::PATCH, &url, &[], Some(&body)).await
    }

    async fn delete_records(
        &self,
        base_id: &str,
        table_id: &str,
        record_ids: &[String],
    ) -> ClientResult<Value> {
        if record_ids.len() > api::MAX_RECORDS_PER_REQUEST {
            return Err(ClientError::validation("Cannot delete more than 10 records at once"));
        }
        let url = self.url(&[base_id, table_id])?;
        let params: Vec<(String, String)> =
            record_ids.iter().map(|id| ("records[]".to_string(), id.clone())).collect();
        self.request(Method::DELETE, &url, &params, None).await
    }

    async fn create_table(
        &self,
        base_id: &str,
        name: &str,
        description: Option<&str>,
        fields: &[FieldDefinition],
    ) -> ClientResult<Value> {
        let url = self.url(&["meta", "bases", base_id, "tables"])?;
        let mut body = json!({ "name": name, "fields": fields });
        if let Some(description) = description.filter(|d| !d.is_empty()) {
            body["description"] = Value::String(description.to_string());
        }
        self.write_schema(Method::POST, &url, &body).await
    }

    async fn update_table(
        &self,
        base_id: &str,
        table_id: &str,
        update: &MetadataUpdate,
    ) -> ClientResult<Value> {
        let url = self.url(&["meta", "bases", base_id, "tables", table_id])?;
        self.write_schema(Method::PATCH, &url, &serde_json::to_value(update)?).await
    }

    async fn create_field(
        &self,
        base_id: &str,
        table_id: &str,
        field: &FieldDefinition,
    ) -> ClientResult<Value> {
        let url = self.url(&["meta", "bases", base_id, "tables", table_id, "fields"])?;
        self.write_schema(Method::POST, &url, &serde_json::to_value(field)?).await
    }

    async fn update_field(
        &self,
        base_id: &str,
        table_id: &str,
        field_id: &str,
        update: &MetadataUpdate,
    ) -> ClientResult<Value> {
        let url = self.url(&["meta", "bases", base_id, "tables", table_id, "fields", field_id])?;
        self.write_schema(Method::PATCH, &url, &serde_json::to_value(update)?).await
    }
}

impl std::fmt::Debug for AirtableClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AirtableClient")
            .field("api_url", &self.api_url.as_str())
            .field("has_api_key", &self.has_api_key)
            .finish()
    }
}

fn detail_params(detail: DetailLevel) -> Vec<(String, String)> {
    match detail {
        DetailLevel::Full => Vec::new(),
        other => vec![("detailLevel".to_string(), other.as_str().to_string())],
    }
}

fn take_records(mut value: Value) -> Vec<Value> {
    match value.get_mut("records").map(Value::take) {
        Some(Value::Array(records)) => records,
        _ => Vec::new(),
    }
}

/// Pull `error.message` out of an Airtable error body, else the raw text.
fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| {
            v.pointer("/error/message")
                .or_else(|| v.pointer("/error/type"))
                .or_else(|| v.get("error"))
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client_for(api_url: &str) -> AirtableClient {
        AirtableClient::new(&Config::for_testing(api_url)).unwrap()
    }

    #[test]
    fn test_error_message_extraction() {
        let body = r#"{"error":{"type":"INVALID_REQUEST_UNKNOWN","message":"Unknown field name: \"Nmae\""}}"#;
        assert_eq!(error_message(body), "Unknown field name: \"Nmae\"");
        assert_eq!(error_message(r#"{"error":"NOT_FOUND"}"#), "NOT_FOUND");
        assert_eq!(error_message("plain text"), "plain text");
    }

    #[test]
    fn test_take_records() {
        let value = json!({"records": [{"id": "rec1"}, {"id": "rec2"}]});
        assert_eq!(take_records(value).len(), 2);
        assert!(take_records(json!({"deleted": true})).is_empty());
    }

    #[test]
    fn test_url_joins_segments() {
        let client = client_for("http://localhost:9999/");
        assert_eq!(
            client.url(&["meta", "bases"]).unwrap(),
            "http://localhost:9999/meta/bases"
        );

        let client = client_for("https://api.airtable.com/v0");
        assert_eq!(
            client.url(&["appA", "Project Tasks"]).unwrap(),
            "https://api.airtable.com/v0/appA/Project%20Tasks"
        );
    }

    #[test]
    fn test_url_escapes_reserved_characters() {
        let client = client_for("https://api.airtable.com/v0");
        let url = client
            .url(&["appA", "tbl?filterByFormula=1", "rec#x/y"])
            .unwrap();
        assert_eq!(
            url,
            "https://api.airtable.com/v0/appA/tbl%3FfilterByFormula=1/rec%23x%2Fy"
        );
        assert_eq!(Url::parse(&url).unwrap().query(), None);
    }

    #[test]
    fn test_url_rejects_relative_segments() {
        let client = client_for("https://api.airtable.com/v0");
        for bad in ["..", ".", ""] {
            let err = client.url(&["meta", "bases", bad, "tables"]).unwrap_err();
            assert!(matches!(err, ClientError::Validation { .. }), "{bad:?} accepted");
        }
    }

    #[test]
    fn test_cache_key_depends_on_params() {
        let client = client_for("http://localhost:9999");
        let a = client.cache_key("GET", "u", &[("detailLevel".into(), "full".into())]);
        let b = client.cache_key("GET", "u", &[]);
        assert_ne!(a, b);
        assert_eq!(a.len(), 32);
    }

    #[tokio::test]
    async fn test_missing_key_is_not_configured() {
        let mut config = Config::for_testing("http://localhost:9999");
        config.airtable_api_key = None;
        let client = AirtableClient::new(&config).unwrap();
        assert!(matches!(client.list_bases().await, Err(ClientError::NotConfigured)));
    }
}
