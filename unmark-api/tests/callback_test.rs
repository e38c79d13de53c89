//! Provider callback endpoint tests

mod common;

use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
};
use common::TestContext;
use serde_json::json;
use unmark_api::bot;
use unmark_shared::lifecycle::reconciler::RESULT_CAPTION;
use unmark_shared::messenger::SentMessage;
use unmark_shared::store::{CredentialStore, TaskLedger, UserStore};

#[tokio::test]
async fn test_malformed_body_is_acknowledged() {
    let ctx = TestContext::new();
    let request = Request::builder()
        .method(Method::POST)
        .uri("/callback")
        .body(Body::from("not json"))
        .unwrap();

    let (status, body) = ctx.send(request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"ok");
}

#[tokio::test]
async fn test_unknown_job_is_acknowledged() {
    let ctx = TestContext::new();

    let (status, body) = ctx
        .callback(json!({"taskId": "never-submitted", "state": "success", "resultUrl": "https://cdn/x.mp4"}))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "ok");
    assert!(ctx.messenger.videos().is_empty());
}

#[tokio::test]
async fn test_root_path_also_reconciles() {
    let ctx = TestContext::new();
    let request = Request::builder()
        .method(Method::POST)
        .uri("/")
        .body(Body::from(json!({"taskId": "x"}).to_string()))
        .unwrap();

    let (status, body) = ctx.send(request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"ok");
}

#[tokio::test]
async fn test_submit_then_deliver_end_to_end() {
    let ctx = TestContext::new();
    ctx.seed_user(7, 1).await;
    ctx.seed_credential("tok-a", "A").await;
    ctx.provider.accept("job-42");

    ctx.chat(7, "https://sora.example/v/42").await;
    assert_eq!(ctx.last_reply(7), bot::ACCEPTED);

    let notification = json!({
        "code": 200,
        "data": {
            "taskId": "job-42",
            "state": "success",
            "resultJson": "{\"resultUrls\":[\"https://cdn/x.mp4\"]}"
        }
    });
    let (status, body) = ctx.callback(notification.clone()).await;
    assert_eq!((status, body.as_str()), (StatusCode::OK, "ok"));

    assert_eq!(
        ctx.messenger.videos(),
        vec![SentMessage::Video {
            chat_id: 7,
            url: "https://cdn/x.mp4".into(),
            caption: RESULT_CAPTION.into(),
        }]
    );
    let user = ctx.store.find_user(7).await.unwrap().unwrap();
    assert_eq!(user.attempts, 0);
    assert_eq!(user.total_downloaded, 1);
    assert!(ctx.store.find_task("job-42").await.unwrap().is_none());
    let credential = ctx.store.find_credential(1).await.unwrap().unwrap();
    assert_eq!(credential.usage_count, 1);

    // A duplicate notification changes nothing.
    let (status, _) = ctx.callback(notification).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ctx.messenger.videos().len(), 1);
    assert_eq!(ctx.store.find_user(7).await.unwrap().unwrap().attempts, 0);
}

#[tokio::test]
async fn test_failed_job_keeps_task() {
    let ctx = TestContext::new();
    ctx.seed_user(8, 1).await;
    ctx.seed_credential("tok-a", "A").await;
    ctx.provider.accept("job-8");
    ctx.chat(8, "https://sora.example/v/8").await;

    let (status, _) = ctx
        .callback(json!({"taskId": "job-8", "state": "fail", "failMsg": "bad source"}))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert!(ctx.store.find_task("job-8").await.unwrap().is_some());
    assert_eq!(ctx.store.find_user(8).await.unwrap().unwrap().attempts, 1);
}

#[tokio::test]
async fn test_delivery_failure_defers_settlement() {
    let ctx = TestContext::new();
    ctx.seed_user(9, 1).await;
    ctx.seed_credential("tok-a", "A").await;
    ctx.provider.accept("job-9");
    ctx.chat(9, "https://sora.example/v/9").await;
    let notification = json!({"taskId": "job-9", "state": "success", "resultUrl": "https://cdn/9.mp4"});

    ctx.messenger.fail_video(true);
    let (status, body) = ctx.callback(notification.clone()).await;
    assert_eq!((status, body.as_str()), (StatusCode::OK, "ok"));
    let task = ctx.store.find_task("job-9").await.unwrap().unwrap();
    assert_eq!(task.result_url.as_deref(), Some("https://cdn/9.mp4"));
    assert_eq!(ctx.store.find_user(9).await.unwrap().unwrap().attempts, 1);

    let (_, tasks) = ctx.admin(Method::GET, "/v1/admin/tasks", None).await;
    assert_eq!(tasks["tasks"][0]["result_url"], "https://cdn/9.mp4");

    ctx.messenger.fail_video(false);
    ctx.callback(notification).await;
    assert!(ctx.store.find_task("job-9").await.unwrap().is_none());
    assert_eq!(ctx.store.find_user(9).await.unwrap().unwrap().attempts, 0);
}

#[tokio::test]
async fn test_health() {
    let ctx = TestContext::new();
    let request = Request::builder().uri("/health").body(Body::empty()).unwrap();

    let (status, body) = ctx.send(request).await;
    let value: serde_json::Value = serde_json::from_slice(&body).unwrap();

    assert_eq!(status, StatusCode::OK);
    assert_eq!(value["status"], "healthy");
    assert_eq!(value["database"], "connected");
}
