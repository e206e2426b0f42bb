// Common test utilities and fixtures
use std::sync::Arc;

use axum_test::TestServer;
use serde_json::json;
use vpsboard_api::app::AppState;
use vpsboard_api::routes::create_router;
use vpsboard_core::memory::MemoryStore;
use vpsboard_core::Store;

/// Build a test server over a fresh in-memory store. Each test gets an
/// isolated world, so tests never contend over shared rows.
pub fn test_server() -> TestServer {
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    let state = AppState::new(store);
    TestServer::new(create_router(state)).expect("Failed to start test server")
}

/// Register a regular user and return their bearer token.
#[allow(dead_code)]
pub async fn register_user(server: &TestServer, username: &str, email: &str) -> String {
    let response = server
        .post("/api/auth/register")
        .json(&json!({
            "username": username,
            "email": email,
            "password": "password123"
        }))
        .await;
    assert_eq!(response.status_code(), 201);
    let body: serde_json::Value = response.json();
    body["token"]
        .as_str()
        .expect("register response carries a token")
        .to_string()
}

/// Register an admin and return their bearer token.
#[allow(dead_code)]
pub async fn register_admin(server: &TestServer, username: &str, email: &str) -> String {
    let response = server
        .post("/api/auth/register")
        .json(&json!({
            "username": username,
            "email": email,
            "password": "password123",
            "role": "admin"
        }))
        .await;
    assert_eq!(response.status_code(), 201);
    let body: serde_json::Value = response.json();
    body["token"]
        .as_str()
        .expect("register response carries a token")
        .to_string()
}

/// Create a small instance and return its JSON representation.
#[allow(dead_code)]
pub async fn create_instance(
    server: &TestServer,
    token: &str,
    name: &str,
    address: &str,
) -> serde_json::Value {
    let response = server
        .post("/api/instances/create")
        .authorization_bearer(token)
        .json(&json!({
            "name": name,
            "cpu": 2,
            "ram": 2048,
            "storage": 20,
            "address": address
        }))
        .await;
    assert_eq!(response.status_code(), 201);
    let body: serde_json::Value = response.json();
    body["instance"].clone()
}
