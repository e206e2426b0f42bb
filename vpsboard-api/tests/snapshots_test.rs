// Integration tests for snapshot endpoints
mod common;

use axum_test::TestServer;
use common::{create_instance, register_admin, register_user, test_server};
use serde_json::json;

async fn start_instance(server: &TestServer, token: &str, id: &str) {
    let response = server
        .put(&format!("/api/instances/{}/start", id))
        .authorization_bearer(token)
        .await;
    assert_eq!(response.status_code(), 200);
}

#[tokio::test]
async fn test_snapshot_requires_running_instance() {
    let server = test_server();
    let token = register_user(&server, "alice", "alice@example.com").await;
    let instance = create_instance(&server, &token, "web-01", "10.0.0.10").await;
    let id = instance["id"].as_str().unwrap().to_string();

    let response = server
        .post(&format!("/api/instances/{}/snapshot", id))
        .authorization_bearer(&token)
        .json(&json!({}))
        .await;

    assert_eq!(response.status_code(), 409);
    let body: serde_json::Value = response.json();
    assert_eq!(body["message"], "Instance must be running to create snapshot");
}

#[tokio::test]
async fn test_create_snapshot_with_default_name() {
    let server = test_server();
    let token = register_user(&server, "alice", "alice@example.com").await;
    let instance = create_instance(&server, &token, "web-01", "10.0.0.10").await;
    let id = instance["id"].as_str().unwrap().to_string();
    start_instance(&server, &token, &id).await;

    let response = server
        .post(&format!("/api/instances/{}/snapshot", id))
        .authorization_bearer(&token)
        .json(&json!({}))
        .await;

    assert_eq!(response.status_code(), 201);
    let body: serde_json::Value = response.json();
    assert_eq!(body["instance_id"].as_str().unwrap(), id);
    assert!(body["name"].as_str().unwrap().starts_with("snapshot-"));
}

#[tokio::test]
async fn test_create_snapshot_with_explicit_name() {
    let server = test_server();
    let token = register_user(&server, "alice", "alice@example.com").await;
    let instance = create_instance(&server, &token, "web-01", "10.0.0.10").await;
    let id = instance["id"].as_str().unwrap().to_string();
    start_instance(&server, &token, &id).await;

    let response = server
        .post(&format!("/api/instances/{}/snapshot", id))
        .authorization_bearer(&token)
        .json(&json!({ "name": "before-upgrade" }))
        .await;

    assert_eq!(response.status_code(), 201);
    let body: serde_json::Value = response.json();
    assert_eq!(body["name"], "before-upgrade");
}

#[tokio::test]
async fn test_snapshot_is_owner_only() {
    let server = test_server();
    let alice = register_user(&server, "alice", "alice@example.com").await;
    let bob = register_user(&server, "bob", "bob@example.com").await;
    let instance = create_instance(&server, &alice, "alice-01", "10.0.0.10").await;
    let id = instance["id"].as_str().unwrap().to_string();
    start_instance(&server, &alice, &id).await;

    let response = server
        .post(&format!("/api/instances/{}/snapshot", id))
        .authorization_bearer(&bob)
        .json(&json!({}))
        .await;
    assert_eq!(response.status_code(), 403);

    // Unknown instance is a 404
    let response = server
        .post(&format!("/api/instances/{}/snapshot", uuid::Uuid::new_v4()))
        .authorization_bearer(&bob)
        .json(&json!({}))
        .await;
    assert_eq!(response.status_code(), 404);
}

#[tokio::test]
async fn test_list_instance_snapshots() {
    let server = test_server();
    let token = register_user(&server, "alice", "alice@example.com").await;
    let instance = create_instance(&server, &token, "web-01", "10.0.0.10").await;
    let id = instance["id"].as_str().unwrap().to_string();
    start_instance(&server, &token, &id).await;

    for name in ["first", "second", "third"] {
        let response = server
            .post(&format!("/api/instances/{}/snapshot", id))
            .authorization_bearer(&token)
            .json(&json!({ "name": name }))
            .await;
        assert_eq!(response.status_code(), 201);
    }

    let response = server
        .get(&format!("/api/instances/{}/snapshots", id))
        .authorization_bearer(&token)
        .await;

    assert_eq!(response.status_code(), 200);
    let body: serde_json::Value = response.json();
    assert_eq!(body["total_count"], 3);
    assert_eq!(body["items"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn test_list_all_snapshots_is_admin_only() {
    let server = test_server();
    let alice = register_user(&server, "alice", "alice@example.com").await;
    let admin = register_admin(&server, "root", "root@example.com").await;
    let instance = create_instance(&server, &alice, "alice-01", "10.0.0.10").await;
    let id = instance["id"].as_str().unwrap().to_string();
    start_instance(&server, &alice, &id).await;

    let response = server
        .post(&format!("/api/instances/{}/snapshot", id))
        .authorization_bearer(&alice)
        .json(&json!({}))
        .await;
    assert_eq!(response.status_code(), 201);

    let response = server
        .get("/api/snapshots/all")
        .authorization_bearer(&alice)
        .await;
    assert_eq!(response.status_code(), 403);
    let body: serde_json::Value = response.json();
    assert_eq!(body["message"], "Admin access required");

    let response = server
        .get("/api/snapshots/all")
        .authorization_bearer(&admin)
        .await;
    assert_eq!(response.status_code(), 200);
    let body: serde_json::Value = response.json();
    assert_eq!(body["total_count"], 1);
}

#[tokio::test]
async fn test_get_snapshot_joins_instance() {
    let server = test_server();
    let token = register_user(&server, "alice", "alice@example.com").await;
    let instance = create_instance(&server, &token, "web-01", "10.0.0.10").await;
    let id = instance["id"].as_str().unwrap().to_string();
    start_instance(&server, &token, &id).await;

    let response = server
        .post(&format!("/api/instances/{}/snapshot", id))
        .authorization_bearer(&token)
        .json(&json!({ "name": "before-upgrade" }))
        .await;
    let snapshot: serde_json::Value = response.json();
    let snapshot_id = snapshot["id"].as_str().unwrap().to_string();

    let response = server
        .get(&format!("/api/snapshots/{}", snapshot_id))
        .authorization_bearer(&token)
        .await;

    assert_eq!(response.status_code(), 200);
    let body: serde_json::Value = response.json();
    assert_eq!(body["snapshot"]["name"], "before-upgrade");
    assert_eq!(body["instance"]["name"], "web-01");
}

#[tokio::test]
async fn test_delete_snapshot() {
    let server = test_server();
    let token = register_user(&server, "alice", "alice@example.com").await;
    let instance = create_instance(&server, &token, "web-01", "10.0.0.10").await;
    let id = instance["id"].as_str().unwrap().to_string();
    start_instance(&server, &token, &id).await;

    let response = server
        .post(&format!("/api/instances/{}/snapshot", id))
        .authorization_bearer(&token)
        .json(&json!({}))
        .await;
    let snapshot: serde_json::Value = response.json();
    let snapshot_id = snapshot["id"].as_str().unwrap().to_string();

    let response = server
        .delete(&format!("/api/snapshots/{}", snapshot_id))
        .authorization_bearer(&token)
        .await;
    assert_eq!(response.status_code(), 200);
    let body: serde_json::Value = response.json();
    assert_eq!(body["message"], "Snapshot deleted successfully");

    let response = server
        .get(&format!("/api/snapshots/{}", snapshot_id))
        .authorization_bearer(&token)
        .await;
    assert_eq!(response.status_code(), 404);
}

#[tokio::test]
async fn test_restore_requires_stopped_instance() {
    let server = test_server();
    let token = register_user(&server, "alice", "alice@example.com").await;
    let instance = create_instance(&server, &token, "web-01", "10.0.0.10").await;
    let id = instance["id"].as_str().unwrap().to_string();
    start_instance(&server, &token, &id).await;

    let response = server
        .post(&format!("/api/instances/{}/snapshot", id))
        .authorization_bearer(&token)
        .json(&json!({ "name": "golden" }))
        .await;
    let snapshot: serde_json::Value = response.json();
    let snapshot_id = snapshot["id"].as_str().unwrap().to_string();

    // Still running: restore is rejected
    let response = server
        .put(&format!("/api/snapshots/{}/restore", snapshot_id))
        .authorization_bearer(&token)
        .await;
    assert_eq!(response.status_code(), 409);
    let body: serde_json::Value = response.json();
    assert_eq!(
        body["message"],
        "Instance must be stopped to restore from snapshot"
    );

    // Stop, then restore goes through and the instance stays stopped
    let response = server
        .put(&format!("/api/instances/{}/stop", id))
        .authorization_bearer(&token)
        .await;
    assert_eq!(response.status_code(), 200);

    let response = server
        .put(&format!("/api/snapshots/{}/restore", snapshot_id))
        .authorization_bearer(&token)
        .await;
    assert_eq!(response.status_code(), 200);
    let body: serde_json::Value = response.json();
    assert_eq!(
        body["message"],
        "Instance restored from snapshot successfully"
    );
    assert_eq!(body["instance"]["status"], "stopped");
    assert_eq!(body["snapshot"]["name"], "golden");
}
