//! Admin API tests

mod common;

use axum::http::{Method, StatusCode};
use common::{json_request, TestContext};
use serde_json::json;
use unmark_shared::models::NewTask;
use unmark_shared::store::TaskLedger;

#[tokio::test]
async fn test_requires_admin_token() {
    let ctx = TestContext::new();

    let (status, _) = ctx
        .send(json_request(Method::GET, "/v1/admin/credentials", None, None))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = ctx
        .send(json_request(
            Method::GET,
            "/v1/admin/credentials",
            None,
            Some("wrong-token-wrong-token-wrong-token!!"),
        ))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let body: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(body["error"], "unauthorized");
}

#[tokio::test]
async fn test_credential_lifecycle() {
    let ctx = TestContext::new();

    let (status, created) = ctx
        .admin(
            Method::POST,
            "/v1/admin/credentials",
            Some(json!({"token": "sk-live-1234567890abcd", "name": "Primary"})),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["id"], 1);
    assert_eq!(created["token"], "sk-l…abcd");
    assert_eq!(created["is_auto_switch"], true);

    let (status, _) = ctx
        .admin(
            Method::POST,
            "/v1/admin/credentials",
            Some(json!({"token": "sk-live-1234567890abcd", "name": "Again"})),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    ctx.admin(
        Method::POST,
        "/v1/admin/credentials",
        Some(json!({"token": "sk-live-backup-000000", "name": "Backup", "is_auto_switch": false})),
    )
    .await;

    let (status, pinned) = ctx.admin(Method::POST, "/v1/admin/credentials/2/pin", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(pinned["is_active"], true);

    let (_, listed) = ctx.admin(Method::GET, "/v1/admin/credentials", None).await;
    let credentials = listed["credentials"].as_array().unwrap();
    assert_eq!(credentials.len(), 2);
    let active: Vec<&str> = credentials
        .iter()
        .filter(|c| c["is_active"] == true)
        .map(|c| c["name"].as_str().unwrap())
        .collect();
    assert_eq!(active, vec!["Backup"]);
    assert!(!listed.to_string().contains("sk-live-1234567890abcd"));

    let (status, disabled) = ctx
        .admin(
            Method::POST,
            "/v1/admin/credentials/1/enabled",
            Some(json!({"enabled": false})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(disabled["is_enabled"], false);

    let (status, rotation) = ctx
        .admin(
            Method::POST,
            "/v1/admin/credentials/2/rotation",
            Some(json!({"participates": true})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(rotation["is_auto_switch"], true);

    let (status, _) = ctx.admin(Method::POST, "/v1/admin/credentials/99/pin", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_credential_validation() {
    let ctx = TestContext::new();

    let (status, body) = ctx
        .admin(
            Method::POST,
            "/v1/admin/credentials",
            Some(json!({"token": "", "name": ""})),
        )
        .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    let fields: Vec<&str> = body["details"]
        .as_array()
        .unwrap()
        .iter()
        .map(|d| d["field"].as_str().unwrap())
        .collect();
    assert_eq!(fields, vec!["name", "token"]);
}

#[tokio::test]
async fn test_auto_switch_setting() {
    let ctx = TestContext::new();

    let (_, current) = ctx.admin(Method::GET, "/v1/admin/settings/auto-switch", None).await;
    assert_eq!(current["enabled"], true);

    let (status, updated) = ctx
        .admin(
            Method::PUT,
            "/v1/admin/settings/auto-switch",
            Some(json!({"enabled": false})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["enabled"], false);

    let (_, current) = ctx.admin(Method::GET, "/v1/admin/settings/auto-switch", None).await;
    assert_eq!(current["enabled"], false);
}

#[tokio::test]
async fn test_user_management() {
    let ctx = TestContext::new();
    for user_id in [31, 32, 33] {
        ctx.seed_user(user_id, 0).await;
    }

    let (status, page) = ctx.admin(Method::GET, "/v1/admin/users?limit=2", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["total"], 3);
    assert_eq!(page["users"].as_array().unwrap().len(), 2);

    let (status, _) = ctx.admin(Method::GET, "/v1/admin/users?limit=0", None).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, granted) = ctx
        .admin(Method::POST, "/v1/admin/users/31/grant", Some(json!({"amount": 5})))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(granted["attempts"], 5);

    let (status, _) = ctx
        .admin(Method::POST, "/v1/admin/users/31/grant", Some(json!({"amount": 0})))
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, banned) = ctx
        .admin(Method::POST, "/v1/admin/users/32/ban", Some(json!({"banned": true})))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(banned["is_banned"], true);

    let (status, user) = ctx.admin(Method::GET, "/v1/admin/users/31", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(user["attempts"], 5);

    let (status, _) = ctx
        .admin(Method::POST, "/v1/admin/users/404/grant", Some(json!({"amount": 1})))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_packages() {
    let ctx = TestContext::new();

    for (name, attempts, price) in [("Large", 50, 15.0), ("Starter", 10, 4.5)] {
        let (status, _) = ctx
            .admin(
                Method::POST,
                "/v1/admin/packages",
                Some(json!({"name": name, "attempts": attempts, "price_usd": price})),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (status, _) = ctx
        .admin(
            Method::POST,
            "/v1/admin/packages",
            Some(json!({"name": "Free", "attempts": 10, "price_usd": 0.0})),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (_, listed) = ctx.admin(Method::GET, "/v1/admin/packages", None).await;
    let names: Vec<&str> = listed["packages"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["Starter", "Large"]);
}

#[tokio::test]
async fn test_tasks_hide_credentials() {
    let ctx = TestContext::new();
    ctx.seed_user(41, 1).await;
    ctx.seed_credential("secret-token-value", "A").await;
    ctx.store
        .record_task(NewTask {
            job_id: "job-41".into(),
            user_id: 41,
            token: "secret-token-value".into(),
            video_url: "https://sora.example/v/41".into(),
        })
        .await
        .unwrap();

    let (status, listed) = ctx.admin(Method::GET, "/v1/admin/tasks", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed["tasks"][0]["job_id"], "job-41");
    assert!(!listed.to_string().contains("secret-token-value"));
}
