// Integration tests for user administration endpoints
mod common;

use axum_test::TestServer;
use common::{create_instance, register_admin, register_user, test_server};
use serde_json::json;

async fn profile_id(server: &TestServer, token: &str) -> String {
    let response = server
        .get("/api/auth/profile")
        .authorization_bearer(token)
        .await;
    assert_eq!(response.status_code(), 200);
    let body: serde_json::Value = response.json();
    body["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_list_users_is_admin_only() {
    let server = test_server();
    let alice = register_user(&server, "alice", "alice@example.com").await;
    let admin = register_admin(&server, "root", "root@example.com").await;

    let response = server.get("/api/users").authorization_bearer(&alice).await;
    assert_eq!(response.status_code(), 403);

    let response = server.get("/api/users").authorization_bearer(&admin).await;
    assert_eq!(response.status_code(), 200);
    let body: serde_json::Value = response.json();
    assert_eq!(body["total_count"], 2);
    for user in body["items"].as_array().unwrap() {
        assert!(user.get("password_hash").is_none());
    }
}

#[tokio::test]
async fn test_get_user_visibility() {
    let server = test_server();
    let alice = register_user(&server, "alice", "alice@example.com").await;
    let bob = register_user(&server, "bob", "bob@example.com").await;
    let admin = register_admin(&server, "root", "root@example.com").await;
    let alice_id = profile_id(&server, &alice).await;

    // Own profile
    let response = server
        .get(&format!("/api/users/{}", alice_id))
        .authorization_bearer(&alice)
        .await;
    assert_eq!(response.status_code(), 200);

    // Someone else's profile
    let response = server
        .get(&format!("/api/users/{}", alice_id))
        .authorization_bearer(&bob)
        .await;
    assert_eq!(response.status_code(), 403);
    let body: serde_json::Value = response.json();
    assert_eq!(body["message"], "You can only view your own profile");

    // Admin reads anyone
    let response = server
        .get(&format!("/api/users/{}", alice_id))
        .authorization_bearer(&admin)
        .await;
    assert_eq!(response.status_code(), 200);

    // Unknown ids 404 regardless of caller
    let response = server
        .get(&format!("/api/users/{}", uuid::Uuid::new_v4()))
        .authorization_bearer(&bob)
        .await;
    assert_eq!(response.status_code(), 404);
    let body: serde_json::Value = response.json();
    assert_eq!(body["message"], "User not found");
}

#[tokio::test]
async fn test_update_own_profile() {
    let server = test_server();
    let alice = register_user(&server, "alice", "alice@example.com").await;
    let alice_id = profile_id(&server, &alice).await;

    let response = server
        .put(&format!("/api/users/{}", alice_id))
        .authorization_bearer(&alice)
        .json(&json!({ "username": "alice_renamed" }))
        .await;

    assert_eq!(response.status_code(), 200);
    let body: serde_json::Value = response.json();
    assert_eq!(body["username"], "alice_renamed");
    assert_eq!(body["email"], "alice@example.com");
}

#[tokio::test]
async fn test_update_rejects_taken_identity() {
    let server = test_server();
    let alice = register_user(&server, "alice", "alice@example.com").await;
    register_user(&server, "bob", "bob@example.com").await;
    let alice_id = profile_id(&server, &alice).await;

    let response = server
        .put(&format!("/api/users/{}", alice_id))
        .authorization_bearer(&alice)
        .json(&json!({ "username": "bob" }))
        .await;
    assert_eq!(response.status_code(), 409);
    let body: serde_json::Value = response.json();
    assert_eq!(body["message"], "Username already exists");

    let response = server
        .put(&format!("/api/users/{}", alice_id))
        .authorization_bearer(&alice)
        .json(&json!({ "email": "bob@example.com" }))
        .await;
    assert_eq!(response.status_code(), 409);
    let body: serde_json::Value = response.json();
    assert_eq!(body["message"], "Email already exists");

    // Re-submitting your own current identity is not a conflict
    let response = server
        .put(&format!("/api/users/{}", alice_id))
        .authorization_bearer(&alice)
        .json(&json!({ "username": "alice", "email": "alice@example.com" }))
        .await;
    assert_eq!(response.status_code(), 200);
}

#[tokio::test]
async fn test_role_changes_are_admin_only() {
    let server = test_server();
    let alice = register_user(&server, "alice", "alice@example.com").await;
    let admin = register_admin(&server, "root", "root@example.com").await;
    let alice_id = profile_id(&server, &alice).await;

    // Self-promotion is rejected
    let response = server
        .put(&format!("/api/users/{}", alice_id))
        .authorization_bearer(&alice)
        .json(&json!({ "role": "admin" }))
        .await;
    assert_eq!(response.status_code(), 403);
    let body: serde_json::Value = response.json();
    assert_eq!(body["message"], "Only admins can change user roles");

    // Echoing the current role back is a no-op, not a violation
    let response = server
        .put(&format!("/api/users/{}", alice_id))
        .authorization_bearer(&alice)
        .json(&json!({ "role": "user" }))
        .await;
    assert_eq!(response.status_code(), 200);

    // Admins promote freely
    let response = server
        .put(&format!("/api/users/{}", alice_id))
        .authorization_bearer(&admin)
        .json(&json!({ "role": "admin" }))
        .await;
    assert_eq!(response.status_code(), 200);
    let body: serde_json::Value = response.json();
    assert_eq!(body["role"], "admin");
}

#[tokio::test]
async fn test_delete_rules() {
    let server = test_server();
    let alice = register_user(&server, "alice", "alice@example.com").await;
    let bob = register_user(&server, "bob", "bob@example.com").await;
    let admin = register_admin(&server, "root", "root@example.com").await;
    let alice_id = profile_id(&server, &alice).await;
    let admin_id = profile_id(&server, &admin).await;

    // Users cannot delete each other
    let response = server
        .delete(&format!("/api/users/{}", alice_id))
        .authorization_bearer(&bob)
        .await;
    assert_eq!(response.status_code(), 403);
    let body: serde_json::Value = response.json();
    assert_eq!(body["message"], "You can only delete your own account");

    // Admins cannot delete themselves
    let response = server
        .delete(&format!("/api/users/{}", admin_id))
        .authorization_bearer(&admin)
        .await;
    assert_eq!(response.status_code(), 403);
    let body: serde_json::Value = response.json();
    assert_eq!(body["message"], "Admin cannot delete their own account");

    // Self-deletion works and kills the session
    let response = server
        .delete(&format!("/api/users/{}", alice_id))
        .authorization_bearer(&alice)
        .await;
    assert_eq!(response.status_code(), 200);
    let body: serde_json::Value = response.json();
    assert_eq!(body["message"], "User deleted successfully");

    let response = server
        .get("/api/auth/profile")
        .authorization_bearer(&alice)
        .await;
    assert_eq!(response.status_code(), 401);
}

#[tokio::test]
async fn test_deleting_a_user_removes_their_instances() {
    let server = test_server();
    let alice = register_user(&server, "alice", "alice@example.com").await;
    let admin = register_admin(&server, "root", "root@example.com").await;
    let alice_id = profile_id(&server, &alice).await;

    create_instance(&server, &alice, "alice-01", "10.0.0.10").await;
    create_instance(&server, &alice, "alice-02", "10.0.0.11").await;

    let response = server
        .delete(&format!("/api/users/{}", alice_id))
        .authorization_bearer(&admin)
        .await;
    assert_eq!(response.status_code(), 200);

    let response = server
        .get("/api/instances")
        .authorization_bearer(&admin)
        .await;
    let body: serde_json::Value = response.json();
    assert_eq!(body["total_count"], 0);
}
