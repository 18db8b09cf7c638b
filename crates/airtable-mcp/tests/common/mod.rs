//! Shared helpers for HTTP-level tests.
#![allow(dead_code)]

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, Response, StatusCode, header};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde_json::{Value, json};
use sha2::{Digest, Sha256};
use tower::ServiceExt;

use airtable_mcp::AirtableClient;
use airtable_mcp::config::Config;
use airtable_mcp::server::McpServer;

pub const REDIRECT_URI: &str = "https://app.example/cb";

/// RFC 7636 appendix B verifier.
pub const VERIFIER: &str = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";

pub fn challenge(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

/// Router over a fresh in-memory store, talking to `api_url` for Airtable.
pub fn build_app(api_url: &str) -> Router {
    build_app_with(Config::for_testing(api_url))
}

pub fn build_app_with(config: Config) -> Router {
    let client = AirtableClient::new(&config).unwrap();
    McpServer::new(config, Arc::new(client)).unwrap().router()
}

/// Unauthenticated `GET`.
pub async fn get(app: &Router, uri: &str) -> Response<Body> {
    let request = Request::get(uri).body(Body::empty()).unwrap();
    app.clone().oneshot(request).await.unwrap()
}

pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

pub async fn body_text(response: Response<Body>) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

pub fn json_request(uri: &str, body: &Value) -> Request<Body> {
    Request::post(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn form_request(uri: &str, pairs: &[(&str, &str)]) -> Request<Body> {
    Request::post(uri)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(serde_urlencoded::to_string(pairs).unwrap()))
        .unwrap()
}

/// Register a client and return its id.
pub async fn register(app: &Router, name: &str) -> String {
    let response = app
        .clone()
        .oneshot(json_request(
            "/oauth/register",
            &json!({"client_name": name, "redirect_uris": [REDIRECT_URI]}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    body_json(response).await["client_id"].as_str().unwrap().to_string()
}

/// Run the authorization request; returns the raw response.
pub async fn authorize_response(
    app: &Router,
    client_id: &str,
    scope: Option<&str>,
    challenge: &str,
) -> Response<Body> {
    let mut pairs = vec![
        ("client_id", client_id),
        ("redirect_uri", REDIRECT_URI),
        ("response_type", "code"),
        ("state", "xyz"),
        ("code_challenge", challenge),
        ("code_challenge_method", "S256"),
    ];
    if let Some(scope) = scope {
        pairs.push(("scope", scope));
    }
    let query = serde_urlencoded::to_string(&pairs).unwrap();
    get(app, &format!("/oauth/authorize?{query}")).await
}

/// Authorize and pull the code out of the redirect.
pub async fn authorize(app: &Router, client_id: &str, scope: Option<&str>) -> String {
    let response = authorize_response(app, client_id, scope, &challenge(VERIFIER)).await;
    assert_eq!(response.status(), StatusCode::FOUND);
    let location = response.headers()[header::LOCATION].to_str().unwrap();
    let url = url::Url::parse(location).unwrap();
    url.query_pairs()
        .find(|(k, _)| k == "code")
        .map(|(_, v)| v.into_owned())
        .unwrap()
}

pub async fn exchange(app: &Router, client_id: &str, code: &str, verifier: &str) -> Response<Body> {
    app.clone()
        .oneshot(form_request(
            "/oauth/token",
            &[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("client_id", client_id),
                ("redirect_uri", REDIRECT_URI),
                ("code_verifier", verifier),
            ],
        ))
        .await
        .unwrap()
}

/// Full flow: register, authorize, exchange. Returns the token response body.
pub async fn obtain_token(app: &Router, scope: Option<&str>) -> Value {
    let client_id = register(app, "Test Client").await;
    let code = authorize(app, &client_id, scope).await;
    let response = exchange(app, &client_id, &code, VERIFIER).await;
    assert_eq!(response.status(), StatusCode::OK);
    body_json(response).await
}

pub async fn access_token(app: &Router, scope: Option<&str>) -> String {
    obtain_token(app, scope).await["access_token"].as_str().unwrap().to_string()
}

pub fn mcp_request(token: &str, body: &Value) -> Request<Body> {
    Request::post("/mcp")
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::from(body.to_string()))
        .unwrap()
}
