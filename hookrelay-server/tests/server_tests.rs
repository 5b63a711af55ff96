use std::sync::Arc;

use axum::response::IntoResponse;
use axum_test::http::HeaderValue;
use axum_test::TestServer;
use hookrelay_core::config::HookRelayConfig;
use hookrelay_core::engine::{RelayEngine, RelayEngineOptions};
use hookrelay_core::memory_adapters::{
    MemoryDeadLetterStore, MemoryDeliveryQueue, MemoryDeliveryStore, MemoryEndpointStore,
};
use hookrelay_core::types::{now_millis, HmacMode};
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::json;

use hookrelay_server::{create_app, AuthMode, JwtConfig};

fn make_engine() -> Arc<RelayEngine> {
    Arc::new(RelayEngine::new(RelayEngineOptions {
        endpoints: Arc::new(MemoryEndpointStore::new()),
        deliveries: Arc::new(MemoryDeliveryStore::new()),
        queue: Arc::new(MemoryDeliveryQueue::new()),
        dead_letters: Arc::new(MemoryDeadLetterStore::new()),
        config: HookRelayConfig::default().resolve(),
    }))
}

fn make_server(engine: Arc<RelayEngine>, auth_mode: AuthMode) -> TestServer {
    let app = create_app(engine, auth_mode);
    TestServer::new(app)
}

fn make_no_auth_server() -> (Arc<RelayEngine>, TestServer) {
    let engine = make_engine();
    let server = make_server(Arc::clone(&engine), AuthMode::None);
    (engine, server)
}

const JWT_SECRET: &str = "test-secret-key-for-jwt-signing-needs-to-be-long-enough";

fn make_jwt_server() -> (Arc<RelayEngine>, TestServer) {
    let engine = make_engine();
    let auth_mode = AuthMode::Jwt(JwtConfig {
        algorithm: jsonwebtoken::Algorithm::HS256,
        secret: Some(JWT_SECRET.to_string()),
        public_key: None,
        issuer: None,
        audience: None,
    });
    let server = make_server(Arc::clone(&engine), auth_mode);
    (engine, server)
}

fn make_token(claims: serde_json::Value) -> String {
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(JWT_SECRET.as_bytes()),
    )
    .unwrap()
}

fn admin_token() -> String {
    make_token(json!({ "sub": "operator-1", "role": "admin", "exp": 9999999999u64 }))
}

fn bearer_header(token: &str) -> HeaderValue {
    HeaderValue::from_str(&format!("Bearer {token}")).unwrap()
}

async fn create_endpoint(server: &TestServer, endpoint_id: &str, dest_url: &str) {
    let response = server
        .post("/api/endpoints")
        .json(&json!({ "endpointId": endpoint_id, "destUrl": dest_url }))
        .await;
    response.assert_status(axum_test::http::StatusCode::CREATED);
}

// ─── POST /ingest/{endpointId} ───────────────────────────────────────────────

#[tokio::test]
async fn ingest_returns_202_and_delivery_id() {
    let (_engine, server) = make_no_auth_server();
    create_endpoint(&server, "ep1", "https://example.com/hook").await;

    let response = server
        .post("/ingest/ep1")
        .json(&json!({ "hello": "world" }))
        .await;

    response.assert_status(axum_test::http::StatusCode::ACCEPTED);
    let body: serde_json::Value = response.json();
    assert!(body["deliveryId"].is_string());
}

#[tokio::test]
async fn ingest_returns_404_for_unknown_endpoint() {
    let (_engine, server) = make_no_auth_server();

    let response = server.post("/ingest/missing").json(&json!({})).await;
    response.assert_status(axum_test::http::StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn ingest_bypasses_admin_auth() {
    let (_engine, server) = make_jwt_server();
    create_endpoint_via_engine(&server).await;

    // No bearer token supplied — ingest must still succeed since HMAC, not
    // JWT, is the ingest authenticity mechanism.
    let response = server.post("/ingest/ep1").json(&json!({})).await;
    response.assert_status(axum_test::http::StatusCode::ACCEPTED);
}

async fn create_endpoint_via_engine(server: &TestServer) {
    // Operator routes require admin auth even under a JWT server, so create
    // the endpoint with a valid admin token first.
    let token = admin_token();
    let response = server
        .post("/api/endpoints")
        .add_header(axum_test::http::header::AUTHORIZATION, bearer_header(&token))
        .json(&json!({ "endpointId": "ep1", "destUrl": "https://example.com/hook" }))
        .await;
    response.assert_status(axum_test::http::StatusCode::CREATED);
}

// ─── Endpoint registry ───────────────────────────────────────────────────────

#[tokio::test]
async fn create_endpoint_rejects_missing_secret_for_stripe_mode() {
    let (_engine, server) = make_no_auth_server();

    let response = server
        .post("/api/endpoints")
        .json(&json!({
            "endpointId": "ep-stripe",
            "destUrl": "https://example.com/hook",
            "hmacMode": "stripe"
        }))
        .await;

    response.assert_status(axum_test::http::StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn create_endpoint_rejects_duplicate_id() {
    let (_engine, server) = make_no_auth_server();
    create_endpoint(&server, "dup1", "https://example.com/a").await;

    let response = server
        .post("/api/endpoints")
        .json(&json!({ "endpointId": "dup1", "destUrl": "https://example.com/b" }))
        .await;
    response.assert_status(axum_test::http::StatusCode::CONFLICT);
}

#[tokio::test]
async fn get_endpoint_returns_404_for_missing() {
    let (_engine, server) = make_no_auth_server();
    let response = server.get("/api/endpoints/nonexistent").await;
    response.assert_status(axum_test::http::StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn list_endpoints_includes_created_endpoint() {
    let (_engine, server) = make_no_auth_server();
    create_endpoint(&server, "ep-list", "https://example.com/hook").await;

    let response = server.get("/api/endpoints").await;
    response.assert_status(axum_test::http::StatusCode::OK);
    let body: serde_json::Value = response.json();
    let ids: Vec<&str> = body.as_array().unwrap().iter().map(|e| e["endpointId"].as_str().unwrap()).collect();
    assert!(ids.contains(&"ep-list"));
}

#[tokio::test]
async fn update_endpoint_rejects_empty_patch() {
    let (_engine, server) = make_no_auth_server();
    create_endpoint(&server, "ep-patch", "https://example.com/hook").await;

    let response = server.patch("/api/endpoints/ep-patch").json(&json!({})).await;
    response.assert_status(axum_test::http::StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn update_endpoint_applies_patch() {
    let (_engine, server) = make_no_auth_server();
    create_endpoint(&server, "ep-patch2", "https://example.com/hook").await;

    let response = server
        .patch("/api/endpoints/ep-patch2")
        .json(&json!({ "isActive": false }))
        .await;
    response.assert_status(axum_test::http::StatusCode::OK);
    let body: serde_json::Value = response.json();
    assert_eq!(body["isActive"], false);
}

#[tokio::test]
async fn delete_endpoint_returns_204() {
    let (_engine, server) = make_no_auth_server();
    create_endpoint(&server, "ep-del", "https://example.com/hook").await;

    let response = server.delete("/api/endpoints/ep-del").await;
    response.assert_status(axum_test::http::StatusCode::NO_CONTENT);

    let response = server.get("/api/endpoints/ep-del").await;
    response.assert_status(axum_test::http::StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn rotate_secret_changes_secret_value() {
    let (_engine, server) = make_no_auth_server();
    let response = server
        .post("/api/endpoints")
        .json(&json!({
            "endpointId": "ep-rotate",
            "destUrl": "https://example.com/hook",
            "hmacMode": "stripe",
            "secret": "whsec_original"
        }))
        .await;
    response.assert_status(axum_test::http::StatusCode::CREATED);

    let response = server.post("/api/endpoints/ep-rotate/rotate-secret").await;
    response.assert_status(axum_test::http::StatusCode::OK);
    let body: serde_json::Value = response.json();
    let secret = body["secret"].as_str().unwrap();
    assert!(secret.starts_with("whsec_"));
    assert_ne!(secret, "whsec_original");
}

// ─── Delivery queries ────────────────────────────────────────────────────────

#[tokio::test]
async fn list_recent_returns_ingested_delivery() {
    let (_engine, server) = make_no_auth_server();
    create_endpoint(&server, "ep-recent", "https://example.com/hook").await;
    server.post("/ingest/ep-recent").json(&json!({"a": 1})).await;

    let response = server.get("/api/deliveries/recent").await;
    response.assert_status(axum_test::http::StatusCode::OK);
    let body: serde_json::Value = response.json();
    assert_eq!(body["items"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn retry_requires_failed_status() {
    let (engine, server) = make_no_auth_server();
    create_endpoint(&server, "ep-retry", "https://example.com/hook").await;
    let delivery_id = engine
        .ingest(
            "ep-retry",
            b"{}",
            &std::collections::HashMap::new(),
            None,
            now_millis() / 1000,
        )
        .await
        .unwrap();

    let response = server
        .post(&format!("/api/deliveries/ep-retry/{delivery_id}/retry"))
        .await;
    response.assert_status(axum_test::http::StatusCode::BAD_REQUEST);
}

// ─── Observability ───────────────────────────────────────────────────────────

#[tokio::test]
async fn stats_reports_ingested_delivery() {
    let (_engine, server) = make_no_auth_server();
    create_endpoint(&server, "ep-stats", "https://example.com/hook").await;
    server.post("/ingest/ep-stats").json(&json!({})).await;

    let response = server.get("/api/stats").await;
    response.assert_status(axum_test::http::StatusCode::OK);
    let body: serde_json::Value = response.json();
    assert_eq!(body["totalDeliveries"], 1);
}

#[tokio::test]
async fn health_alerts_empty_for_fresh_engine() {
    let (_engine, server) = make_no_auth_server();
    let response = server.get("/api/health-alerts").await;
    response.assert_status(axum_test::http::StatusCode::OK);
    let body: serde_json::Value = response.json();
    assert!(body.as_array().unwrap().is_empty());
}

// ─── Auth: JWT mode ──────────────────────────────────────────────────────────

#[tokio::test]
async fn jwt_mode_returns_401_without_token() {
    let (_engine, server) = make_jwt_server();

    let response = server.get("/api/endpoints").await;
    response.assert_status(axum_test::http::StatusCode::UNAUTHORIZED);
    let body: serde_json::Value = response.json();
    assert_eq!(body["error"], "Missing Bearer token");
}

#[tokio::test]
async fn jwt_mode_returns_401_with_invalid_token() {
    let (_engine, server) = make_jwt_server();

    let response = server
        .get("/api/endpoints")
        .add_header(
            axum_test::http::header::AUTHORIZATION,
            HeaderValue::from_static("Bearer invalid-token-here"),
        )
        .await;

    response.assert_status(axum_test::http::StatusCode::UNAUTHORIZED);
    let body: serde_json::Value = response.json();
    assert_eq!(body["error"], "Invalid or expired token");
}

#[tokio::test]
async fn jwt_mode_succeeds_with_admin_token() {
    let (_engine, server) = make_jwt_server();
    let token = admin_token();

    let response = server
        .get("/api/endpoints")
        .add_header(axum_test::http::header::AUTHORIZATION, bearer_header(&token))
        .await;

    response.assert_status(axum_test::http::StatusCode::OK);
}

#[tokio::test]
async fn jwt_mode_returns_403_for_non_admin_role() {
    let (_engine, server) = make_jwt_server();
    let token = make_token(json!({ "sub": "viewer", "role": "viewer", "exp": 9999999999u64 }));

    let response = server
        .get("/api/endpoints")
        .add_header(axum_test::http::header::AUTHORIZATION, bearer_header(&token))
        .await;

    response.assert_status(axum_test::http::StatusCode::FORBIDDEN);
}

// ─── Error Response Format Tests ─────────────────────────────────────────────

#[test]
fn api_error_relay_endpoint_not_found_returns_404() {
    let error = hookrelay_server::error::ApiError::Relay(hookrelay_core::error::RelayError::EndpointNotFound);
    let response = error.into_response();
    assert_eq!(response.status(), axum_test::http::StatusCode::NOT_FOUND);
}

#[test]
fn api_error_relay_endpoint_already_exists_returns_409() {
    let error =
        hookrelay_server::error::ApiError::Relay(hookrelay_core::error::RelayError::EndpointAlreadyExists);
    let response = error.into_response();
    assert_eq!(response.status(), axum_test::http::StatusCode::CONFLICT);
}

#[test]
fn api_error_forbidden_returns_403_json() {
    let error = hookrelay_server::error::ApiError::Forbidden;
    let response = error.into_response();
    assert_eq!(response.status(), axum_test::http::StatusCode::FORBIDDEN);
}

#[test]
fn api_error_missing_token_returns_401_json() {
    let error = hookrelay_server::error::ApiError::MissingToken;
    let response = error.into_response();
    assert_eq!(response.status(), axum_test::http::StatusCode::UNAUTHORIZED);
}

// ─── Full workflow test ──────────────────────────────────────────────────────

#[tokio::test]
async fn full_ingest_and_query_lifecycle() {
    let (_engine, server) = make_no_auth_server();
    create_endpoint(&server, "lifecycle", "https://example.com/hook").await;

    let response = server
        .post("/ingest/lifecycle")
        .json(&json!({ "order_id": 42 }))
        .await;
    response.assert_status(axum_test::http::StatusCode::ACCEPTED);
    let delivery_id = response.json::<serde_json::Value>()["deliveryId"]
        .as_str()
        .unwrap()
        .to_string();

    let response = server.get("/api/deliveries/recent").await;
    let body: serde_json::Value = response.json();
    let items = body["items"].as_array().unwrap();
    assert!(items.iter().any(|i| i["deliveryId"] == delivery_id));

    let response = server.get("/api/stats").await;
    let stats: serde_json::Value = response.json();
    assert_eq!(stats["totalDeliveries"], 1);
    assert_eq!(stats["pending"], 1);
}
