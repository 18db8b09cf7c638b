//! End-to-end tests for the OAuth 2.1 endpoints through the axum router.

mod common;

use std::net::SocketAddr;

use axum::Router;
use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::{Request, Response, StatusCode, header};
use serde_json::json;
use tower::ServiceExt;

use common::*;

const UNUSED_API: &str = "http://127.0.0.1:9";

#[tokio::test]
async fn test_full_oauth_http_flow() {
    let app = build_app(UNUSED_API);

    let client_id = register(&app, "Integration Test Client").await;
    let code = authorize(&app, &client_id, None).await;

    let response = exchange(&app, &client_id, &code, VERIFIER).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CACHE_CONTROL], "no-store");
    let tokens = body_json(response).await;
    assert_eq!(tokens["token_type"], "Bearer");
    assert_eq!(tokens["scope"], "mcp:read mcp:write");
    assert_eq!(tokens["access_token"].as_str().unwrap().len(), 43);
    assert!(tokens["refresh_token"].is_string());

    let access = tokens["access_token"].as_str().unwrap();
    let response = app
        .clone()
        .oneshot(form_request("/oauth/introspect", &[("token", access)]))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let introspection = body_json(response).await;
    assert_eq!(introspection["active"], true);
    assert_eq!(introspection["client_id"], client_id.as_str());
    assert_eq!(introspection["scope"], "mcp:read mcp:write");

    // Second redemption of the same code fails.
    let response = exchange(&app, &client_id, &code, VERIFIER).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "invalid_grant");
}

#[tokio::test]
async fn test_registration_response_shape() {
    let app = build_app(UNUSED_API);
    let response = app
        .clone()
        .oneshot(json_request(
            "/oauth/register",
            &json!({
                "client_name": "Shape Client",
                "redirect_uris": ["http://localhost:3000/callback"],
                "application_type": "native",
                "contacts": ["ops@example.com"]
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let client = body_json(response).await;
    assert_eq!(client["grant_types"], json!(["authorization_code"]));
    assert_eq!(client["response_types"], json!(["code"]));
    assert_eq!(client["token_endpoint_auth_method"], "none");
    assert_eq!(client["scope"], "mcp:read mcp:write");
    assert_eq!(client["application_type"], "native");
    assert_eq!(client["contacts"], json!(["ops@example.com"]));
    assert!(client["client_id_issued_at"].is_i64());
    assert!(client.get("logo_uri").is_none());
}

#[tokio::test]
async fn test_client_ids_are_unique() {
    let app = build_app(UNUSED_API);
    let first = register(&app, "A").await;
    let second = register(&app, "B").await;
    assert_ne!(first, second);
}

#[tokio::test]
async fn test_registration_rejects_bad_redirect() {
    let app = build_app(UNUSED_API);
    let response = app
        .clone()
        .oneshot(json_request(
            "/oauth/register",
            &json!({"client_name": "Bad", "redirect_uris": ["http://evil.example/cb"]}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error"], "invalid_request");
    assert!(body["error_description"].as_str().unwrap().contains("http://evil.example/cb"));
}

#[tokio::test]
async fn test_registration_rejects_malformed_json() {
    let app = build_app(UNUSED_API);
    let response = app
        .clone()
        .oneshot(
            Request::post("/oauth/register")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from("{not json"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "invalid_request");
}

fn registration_from(peer: &str, forwarded_for: Option<&str>) -> Request<Body> {
    let mut builder =
        Request::post("/oauth/register").header(header::CONTENT_TYPE, "application/json");
    if let Some(forwarded_for) = forwarded_for {
        builder = builder.header("x-forwarded-for", forwarded_for);
    }
    let mut request = builder
        .body(Body::from(
            json!({"client_name": "Flood", "redirect_uris": [REDIRECT_URI]}).to_string(),
        ))
        .unwrap();
    let peer: SocketAddr = peer.parse().unwrap();
    request.extensions_mut().insert(ConnectInfo(peer));
    request
}

async fn register_from(app: &Router, peer: &str, forwarded_for: Option<&str>) -> Response<Body> {
    let request = registration_from(peer, forwarded_for);
    app.clone().oneshot(request).await.unwrap()
}

#[tokio::test]
async fn test_registration_rate_limited_per_peer() {
    let app = build_app(UNUSED_API);

    // Rotating the forwarded header does not buy a fresh budget.
    for i in 0..5 {
        let forwarded = format!("192.0.2.{i}");
        let response = register_from(&app, "203.0.113.9:4000", Some(&forwarded)).await;
        assert_eq!(response.status(), StatusCode::OK);
    }
    let response = register_from(&app, "203.0.113.9:4001", Some("192.0.2.99")).await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body_json(response).await["error"], "rate_limited");

    // Other peers keep their own budget.
    let response = register_from(&app, "203.0.113.10:4000", None).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_forwarded_for_honored_behind_trusted_proxy() {
    let mut config = airtable_mcp::Config::for_testing(UNUSED_API);
    config.trust_forwarded_for = true;
    let app = build_app_with(config);
    let proxy = "10.0.0.1:443";

    for _ in 0..5 {
        let response = register_from(&app, proxy, Some("198.51.100.1")).await;
        assert_eq!(response.status(), StatusCode::OK);
    }
    let response = register_from(&app, proxy, Some("198.51.100.1, 10.0.0.1")).await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

    // Same proxy, different forwarded client.
    let response = register_from(&app, proxy, Some("198.51.100.2")).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_rate_limit_can_be_disabled() {
    let mut config = airtable_mcp::Config::for_testing(UNUSED_API);
    config.rate_limit_enabled = false;
    let app = build_app_with(config);
    for i in 0..8 {
        register(&app, &format!("client {i}")).await;
    }
}

#[tokio::test]
async fn test_authorize_requires_exact_redirect() {
    let app = build_app(UNUSED_API);
    let client_id = register(&app, "Redirect Client").await;

    let uri = format!(
        "/oauth/authorize?{}",
        serde_urlencoded::to_string([
            ("client_id", client_id.as_str()),
            ("redirect_uri", "https://app.example/cb/extra"),
            ("response_type", "code"),
            ("code_challenge", challenge(VERIFIER).as_str()),
            ("code_challenge_method", "S256"),
        ])
        .unwrap()
    );
    let response = get(&app, &uri).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "invalid_redirect_uri");
}

#[tokio::test]
async fn test_authorize_unknown_client() {
    let app = build_app(UNUSED_API);
    let response = authorize_response(&app, "no-such-client", None, &challenge(VERIFIER)).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await["error"], "invalid_client");
}

#[tokio::test]
async fn test_authorize_rejects_unknown_scope() {
    let app = build_app(UNUSED_API);
    let client_id = register(&app, "Scope Client").await;
    let scope = Some("mcp:read superuser");
    let response = authorize_response(&app, &client_id, scope, &challenge(VERIFIER)).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "invalid_scope");
}

#[tokio::test]
async fn test_authorize_redirect_carries_state() {
    let app = build_app(UNUSED_API);
    let client_id = register(&app, "State Client").await;
    let response = authorize_response(&app, &client_id, None, &challenge(VERIFIER)).await;
    let location = response.headers()[header::LOCATION].to_str().unwrap();
    let location = url::Url::parse(location).unwrap();
    assert_eq!(location.host_str(), Some("app.example"));
    assert!(location.query_pairs().any(|(k, v)| k == "state" && v == "xyz"));
}

#[tokio::test]
async fn test_wrong_verifier_is_invalid_grant() {
    let app = build_app(UNUSED_API);
    let client_id = register(&app, "PKCE Client").await;
    let code = authorize(&app, &client_id, None).await;

    let wrong = "wrong-verifier-wrong-verifier-wrong-verif";
    let response = exchange(&app, &client_id, &code, wrong).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error"], "invalid_grant");
    assert_eq!(body["error_description"], "Invalid code_verifier");

    // A failed match leaves the code redeemable by its rightful holder.
    let response = exchange(&app, &client_id, &code, VERIFIER).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_token_rejects_refresh_grant() {
    let app = build_app(UNUSED_API);
    let response = app
        .clone()
        .oneshot(form_request(
            "/oauth/token",
            &[("grant_type", "refresh_token"), ("refresh_token", "abc")],
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "unsupported_grant_type");
}

#[tokio::test]
async fn test_token_missing_parameters() {
    let app = build_app(UNUSED_API);
    let response = app
        .clone()
        .oneshot(form_request("/oauth/token", &[("grant_type", "authorization_code")]))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "invalid_request");
}

#[tokio::test]
async fn test_concurrent_exchange_has_single_winner() {
    let app = build_app(UNUSED_API);
    let client_id = register(&app, "Race Client").await;
    let code = authorize(&app, &client_id, None).await;

    let attempts = (0..8).map(|_| exchange(&app, &client_id, &code, VERIFIER));
    let statuses: Vec<StatusCode> =
        futures::future::join_all(attempts).await.iter().map(|r| r.status()).collect();

    assert_eq!(statuses.iter().filter(|s| **s == StatusCode::OK).count(), 1);
    assert_eq!(statuses.iter().filter(|s| **s == StatusCode::BAD_REQUEST).count(), 7);
}

#[tokio::test]
async fn test_introspect_unknown_and_missing_tokens() {
    let app = build_app(UNUSED_API);

    let response = app
        .clone()
        .oneshot(form_request("/oauth/introspect", &[("token", "nope")]))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, json!({"active": false}));

    let response = app.clone().oneshot(form_request("/oauth/introspect", &[])).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, json!({"active": false}));
}

#[tokio::test]
async fn test_revoke_refresh_token_cascades() {
    let app = build_app(UNUSED_API);
    let tokens = obtain_token(&app, None).await;
    let access = tokens["access_token"].as_str().unwrap();
    let refresh = tokens["refresh_token"].as_str().unwrap();

    let response = app
        .clone()
        .oneshot(form_request("/oauth/revoke", &[("token", refresh)]))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, json!({"revoked": true}));

    let response = app
        .clone()
        .oneshot(form_request("/oauth/introspect", &[("token", access)]))
        .await
        .unwrap();
    assert_eq!(body_json(response).await["active"], false);
}

#[tokio::test]
async fn test_revoke_access_token_blocks_mcp() {
    let app = build_app(UNUSED_API);
    let access = access_token(&app, None).await;

    let response = app
        .clone()
        .oneshot(form_request("/oauth/revoke", &[("token", access.as_str())]))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(mcp_request(&access, &json!({"jsonrpc": "2.0", "id": 1, "method": "ping"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_revoke_is_idempotent() {
    let app = build_app(UNUSED_API);
    for _ in 0..2 {
        let response = app
            .clone()
            .oneshot(form_request("/oauth/revoke", &[("token", "never-issued")]))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
    let response = app.clone().oneshot(form_request("/oauth/revoke", &[])).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, json!({"revoked": false}));
}

#[tokio::test]
async fn test_metadata_documents() {
    let app = build_app(UNUSED_API);

    let response = get(&app, "/.well-known/oauth-authorization-server").await;
    assert_eq!(response.status(), StatusCode::OK);
    let metadata = body_json(response).await;
    assert_eq!(metadata["issuer"], "https://mcp.example.com");
    assert_eq!(metadata["token_endpoint"], "https://mcp.example.com/oauth/token");
    assert_eq!(metadata["code_challenge_methods_supported"], json!(["S256"]));
    assert_eq!(metadata["grant_types_supported"], json!(["authorization_code"]));
    assert_eq!(metadata["scopes_supported"], json!(["mcp:read", "mcp:write", "mcp:admin"]));

    let response = get(&app, "/.well-known/oauth-protected-resource").await;
    let resource = body_json(response).await;
    assert_eq!(resource["resource"], "https://mcp.example.com");
    assert_eq!(resource["introspection_endpoint"], "https://mcp.example.com/oauth/introspect");
    assert_eq!(resource["revocation_endpoint"], "https://mcp.example.com/oauth/revoke");
}
