//! Chat update endpoint tests

mod common;

use axum::http::{Method, StatusCode};
use common::{json_request, TestContext, ADMIN_CHAT_ID, CHANNEL_URL};
use serde_json::json;
use unmark_api::bot;
use unmark_shared::models::{InvoiceState, NewPackage};
use unmark_shared::provider::ProviderError;
use unmark_shared::store::{CredentialStore, PackageStore, TaskLedger, UserStore};

#[tokio::test]
async fn test_wrong_secret_is_not_found() {
    let ctx = TestContext::new();
    let request = json_request(
        Method::POST,
        "/telegram/not-the-secret",
        Some(json!({"update_id": 1, "message": {"chat": {"id": 1}, "from": {"id": 1}, "text": "/start"}})),
        None,
    );

    let (status, _) = ctx.send(request).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(ctx.messenger.sent().is_empty());
}

#[tokio::test]
async fn test_updates_without_text_are_acknowledged() {
    let ctx = TestContext::new();
    let request = json_request(
        Method::POST,
        &format!("/telegram/{}", common::WEBHOOK_SECRET),
        Some(json!({"update_id": 7, "edited_message": {"chat": {"id": 1}}})),
        None,
    );

    let (status, _) = ctx.send(request).await;

    assert_eq!(status, StatusCode::OK);
    assert!(ctx.messenger.sent().is_empty());
}

#[tokio::test]
async fn test_start_registers_user() {
    let ctx = TestContext::new();

    assert_eq!(ctx.chat(11, "/start").await, StatusCode::OK);

    assert_eq!(ctx.last_reply(11), bot::WELCOME);
    let user = ctx.store.find_user(11).await.unwrap().unwrap();
    assert_eq!(user.attempts, 0);
}

#[tokio::test]
async fn test_profile_shows_balance() {
    let ctx = TestContext::new();
    ctx.seed_user(12, 3).await;

    ctx.chat(12, "/profile").await;

    let reply = ctx.last_reply(12);
    assert!(reply.contains("Attempts left: 3"));
    assert!(reply.contains("Videos processed: 0"));
}

#[tokio::test]
async fn test_submission_without_attempts() {
    let ctx = TestContext::new();
    ctx.seed_credential("tok-a", "A").await;

    ctx.chat(13, "https://sora.example/v/1").await;

    assert_eq!(ctx.last_reply(13), bot::NO_ATTEMPTS);
    assert!(ctx.provider.calls().is_empty());
}

#[tokio::test]
async fn test_submission_without_credentials() {
    let ctx = TestContext::new();
    ctx.seed_user(14, 1).await;

    ctx.chat(14, "https://sora.example/v/1").await;

    assert_eq!(ctx.last_reply(14), bot::NO_CAPACITY);
    assert_eq!(ctx.store.task_count(), 0);
}

#[tokio::test]
async fn test_banned_user_cannot_submit() {
    let ctx = TestContext::new();
    ctx.seed_user(15, 5).await;
    ctx.seed_credential("tok-a", "A").await;
    ctx.store.set_banned(15, true).await.unwrap();

    ctx.chat(15, "https://sora.example/v/1").await;

    assert_eq!(ctx.last_reply(15), bot::BANNED);
    assert!(ctx.provider.calls().is_empty());
}

#[tokio::test]
async fn test_accepted_submission_records_task_without_debit() {
    let ctx = TestContext::new();
    ctx.seed_user(16, 1).await;
    ctx.seed_credential("tok-a", "A").await;
    ctx.provider.accept("job-16");

    ctx.chat(16, "clean this https://sora.example/v/16 please").await;

    assert_eq!(ctx.last_reply(16), bot::ACCEPTED);
    assert_eq!(
        ctx.provider.calls(),
        vec![("tok-a".to_string(), "https://sora.example/v/16".to_string())]
    );
    let task = ctx.store.find_task("job-16").await.unwrap().unwrap();
    assert_eq!(task.user_id, 16);
    assert_eq!(ctx.store.find_user(16).await.unwrap().unwrap().attempts, 1);
}

#[tokio::test]
async fn test_provider_failure_rotates_and_costs_nothing() {
    let ctx = TestContext::new();
    ctx.seed_user(17, 2).await;
    ctx.seed_credential("tok-a", "A").await;
    ctx.seed_credential("tok-b", "B").await;
    ctx.store.pin_credential(1).await.unwrap();
    ctx.provider.fail(ProviderError::Rejected("quota exceeded".into()));

    ctx.chat(17, "https://sora.example/v/17").await;

    assert_eq!(ctx.last_reply(17), bot::PROCESSING_ERROR);
    assert_eq!(ctx.store.task_count(), 0);
    assert_eq!(ctx.store.find_user(17).await.unwrap().unwrap().attempts, 2);

    let active: Vec<String> = ctx
        .store
        .list_credentials()
        .await
        .unwrap()
        .into_iter()
        .filter(|c| c.is_active)
        .map(|c| c.name)
        .collect();
    assert_eq!(active, vec!["B".to_string()]);
}

#[tokio::test]
async fn test_every_credential_failing_alerts_operator() {
    let ctx = TestContext::new();
    ctx.seed_user(18, 3).await;
    ctx.seed_credential("tok-a", "A").await;
    ctx.seed_credential("tok-b", "B").await;
    ctx.provider
        .fail(ProviderError::Rejected("invalid key".into()))
        .fail(ProviderError::Rejected("invalid key".into()));

    ctx.chat(18, "https://sora.example/v/1").await;
    assert!(ctx.messenger.texts_to(ADMIN_CHAT_ID).is_empty());

    ctx.chat(18, "https://sora.example/v/2").await;
    assert_eq!(ctx.last_reply(18), bot::PROCESSING_ERROR);

    let alerts = ctx.messenger.texts_to(ADMIN_CHAT_ID);
    assert_eq!(alerts.len(), 1);
    assert!(alerts[0].contains("failed in a row"));
    assert_eq!(ctx.store.find_user(18).await.unwrap().unwrap().attempts, 3);
}

#[tokio::test]
async fn test_in_flight_cap() {
    let ctx = TestContext::with_config(common::test_config(&[("MAX_IN_FLIGHT_PER_USER", "1")]));
    ctx.seed_user(18, 5).await;
    ctx.seed_credential("tok-a", "A").await;
    ctx.provider.accept("job-18a").accept("job-18b");

    ctx.chat(18, "https://sora.example/v/a").await;
    ctx.chat(18, "https://sora.example/v/b").await;

    assert!(ctx.last_reply(18).contains("already have 1 videos processing"));
    assert_eq!(ctx.provider.calls().len(), 1);
}

#[tokio::test]
async fn test_bonus_requires_channel_membership() {
    let ctx = TestContext::new();

    ctx.chat(19, "/bonus").await;
    assert!(ctx.last_reply(19).contains(CHANNEL_URL));

    ctx.messenger.add_member(19);
    ctx.chat(19, "/bonus").await;
    assert!(ctx.last_reply(19).contains("Attempts left: 1"));

    ctx.chat(19, "/bonus").await;
    assert_eq!(ctx.last_reply(19), bot::ALREADY_CLAIMED);
    assert_eq!(ctx.store.find_user(19).await.unwrap().unwrap().attempts, 1);
}

#[tokio::test]
async fn test_shop_buy_and_check() {
    let ctx = TestContext::new();
    let package = ctx
        .store
        .create_package(NewPackage {
            name: "Starter".into(),
            attempts: 10,
            price_usd: 4.5,
        })
        .await
        .unwrap();

    ctx.chat(20, "/shop").await;
    assert!(ctx.last_reply(20).contains("Starter: 10 attempts for $4.50"));

    ctx.chat(20, &format!("/buy {}", package.id)).await;
    let (invoice_id, amount, _) = ctx.payments.created()[0].clone();
    assert_eq!(amount, 4.5);
    assert!(ctx.last_reply(20).contains(&format!("/check {invoice_id}")));

    ctx.chat(20, &format!("/check {invoice_id}")).await;
    assert_eq!(ctx.last_reply(20), bot::PAYMENT_PENDING);

    ctx.payments.set_status(invoice_id, InvoiceState::Paid);
    ctx.chat(20, &format!("/check {invoice_id}")).await;
    assert!(ctx.last_reply(20).contains("+10 attempts"));

    ctx.chat(20, &format!("/check {invoice_id}")).await;
    assert_eq!(ctx.last_reply(20), bot::ALREADY_CREDITED);
    assert_eq!(ctx.store.find_user(20).await.unwrap().unwrap().attempts, 10);
}

#[tokio::test]
async fn test_buy_unknown_package_and_foreign_invoice() {
    let ctx = TestContext::new();
    let package = ctx
        .store
        .create_package(NewPackage {
            name: "Starter".into(),
            attempts: 10,
            price_usd: 4.5,
        })
        .await
        .unwrap();

    ctx.chat(21, "/buy 999").await;
    assert_eq!(ctx.last_reply(21), bot::UNKNOWN_PACKAGE);

    ctx.chat(21, &format!("/buy {}", package.id)).await;
    let (invoice_id, _, _) = ctx.payments.created()[0].clone();

    ctx.chat(22, &format!("/check {invoice_id}")).await;
    assert_eq!(ctx.last_reply(22), bot::UNKNOWN_INVOICE);
}

#[tokio::test]
async fn test_replies_never_reach_the_operator_chat() {
    let ctx = TestContext::new();
    ctx.chat(23, "hello").await;

    assert_eq!(ctx.last_reply(23), bot::UNKNOWN);
    assert!(ctx.messenger.texts_to(ADMIN_CHAT_ID).is_empty());
}
