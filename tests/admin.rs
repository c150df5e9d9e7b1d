//! Admin-only user management routes.

mod common;

use common::{TestServer, run_body};
use ecoci::store::Store;
use ecoci::types::Role;
use serde_json::{Value, json};

/// Logs in `handle` and promotes them straight through the store.
async fn admin_session(server: &TestServer, github_id: i64, handle: &str) -> String {
    let token = server.login(github_id, handle).await;
    let identity = server.store.get_identity_by_handle(handle).unwrap().unwrap();
    server.store.set_identity_role(&identity.id, Role::Admin).unwrap();
    token
}

#[tokio::test]
async fn test_regular_users_are_forbidden() {
    let server = TestServer::start().await;
    let token = server.login(1, "plain").await;

    let resp = server.get("/admin/users", &token).await;
    assert_eq!(resp.status(), 403);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["code"], "FORBIDDEN");
}

#[tokio::test]
async fn test_list_and_get_users() {
    let server = TestServer::start().await;
    let admin = admin_session(&server, 1, "root").await;
    server.login(2, "alice").await;
    server.login(3, "bob").await;

    let page: Value = server.get("/admin/users?limit=2", &admin).await.json().await.unwrap();
    assert_eq!(page["pagination"]["total"], 3);
    assert_eq!(page["data"].as_array().unwrap().len(), 2);

    let alice = server.store.get_identity_by_handle("alice").unwrap().unwrap();
    let body: Value = server
        .get(&format!("/admin/users/{}", alice.id), &admin)
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(body["data"]["handle"], "alice");

    let missing = format!("/admin/users/{}", uuid::Uuid::new_v4());
    assert_eq!(server.get(&missing, &admin).await.status(), 404);
}

#[tokio::test]
async fn test_promote_user() {
    let server = TestServer::start().await;
    let admin = admin_session(&server, 1, "root").await;
    let alice_token = server.login(2, "alice").await;
    let alice = server.store.get_identity_by_handle("alice").unwrap().unwrap();

    let path = format!("/admin/users/{}/role", alice.id);
    let resp = server.put_json(&path, &admin, &json!({"role": "admin"})).await;
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"]["role"], "admin");

    // Takes effect on the next request; no new token is needed.
    assert_eq!(server.get("/admin/users", &alice_token).await.status(), 200);

    let resp = server.put_json(&path, &admin, &json!({"role": "owner"})).await;
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn test_delete_user_cascades() {
    let server = TestServer::start().await;
    let admin = admin_session(&server, 1, "root").await;
    let alice_token = server.login(2, "alice").await;
    server.submit_run(&alice_token, &run_body("alice/app", 0.5)).await;

    let alice = server.store.get_identity_by_handle("alice").unwrap().unwrap();
    let path = format!("/admin/users/{}", alice.id);

    assert_eq!(server.delete(&path, &admin).await.status(), 204);
    assert_eq!(server.delete(&path, &admin).await.status(), 404);

    let repos: Value = server.get("/repos", &admin).await.json().await.unwrap();
    assert_eq!(repos["pagination"]["total"], 0);
    assert_eq!(server.get("/auth/me", &alice_token).await.status(), 401);
}

#[tokio::test]
async fn test_admin_cannot_delete_self() {
    let server = TestServer::start().await;
    let admin = admin_session(&server, 1, "root").await;
    let me = server.store.get_identity_by_handle("root").unwrap().unwrap();

    let resp = server.delete(&format!("/admin/users/{}", me.id), &admin).await;
    assert_eq!(resp.status(), 400);
}
