//! Common test utilities for integration tests
//!
//! Builds the full router over the in-memory store and the test doubles,
//! so the HTTP surface runs without PostgreSQL or network access:
//! - `MemoryStore` for storage
//! - `RecordingMessenger` for chat replies and membership checks
//! - `MockProvider` for job creation
//! - `MockPayments` for invoices

#![allow(dead_code)]

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tower::ServiceExt;
use unmark_api::app::{build_router, AppState};
use unmark_api::config::Config;
use unmark_shared::messenger::RecordingMessenger;
use unmark_shared::models::NewCredential;
use unmark_shared::payments::MockPayments;
use unmark_shared::provider::MockProvider;
use unmark_shared::store::memory::MemoryStore;
use unmark_shared::store::{CredentialStore, UserStore};

pub const ADMIN_TOKEN: &str = "test-admin-token-0123456789abcdefghij";
pub const WEBHOOK_SECRET: &str = "hook-secret";
pub const ADMIN_CHAT_ID: i64 = 4242;
pub const CHANNEL_URL: &str = "https://t.me/unmark_news";

/// Test context containing the router and handles on every double
pub struct TestContext {
    pub store: Arc<MemoryStore>,
    pub messenger: Arc<RecordingMessenger>,
    pub provider: Arc<MockProvider>,
    pub payments: Arc<MockPayments>,
    pub app: axum::Router,
    pub config: Config,
}

pub fn test_config(overrides: &[(&str, &str)]) -> Config {
    let mut vars: HashMap<String, String> = [
        ("DATABASE_URL", "postgresql://localhost/unmark_test"),
        ("BOT_TOKEN", "123:abc"),
        ("TELEGRAM_WEBHOOK_SECRET", WEBHOOK_SECRET),
        ("CHANNEL_ID", "@unmark_news"),
        ("CHANNEL_URL", CHANNEL_URL),
        ("ADMIN_TOKEN", ADMIN_TOKEN),
        ("ADMIN_CHAT_ID", "4242"),
        ("CALLBACK_URL", "https://bot.example/callback"),
        ("CRYPTO_TOKEN", "crypto-token"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();

    for (key, value) in overrides {
        vars.insert(key.to_string(), value.to_string());
    }

    Config::from_map(&vars).expect("test configuration is valid")
}

impl TestContext {
    pub fn new() -> Self {
        Self::with_config(test_config(&[]))
    }

    pub fn with_config(config: Config) -> Self {
        let store = Arc::new(MemoryStore::new());
        let messenger = Arc::new(RecordingMessenger::new());
        let provider = Arc::new(MockProvider::new());
        let payments = Arc::new(MockPayments::new());

        let state = AppState::new(
            store.clone(),
            messenger.clone(),
            provider.clone(),
            payments.clone(),
            config.clone(),
        );

        TestContext {
            store,
            messenger,
            provider,
            payments,
            app: build_router(state),
            config,
        }
    }

    /// Sends a request and returns the status and raw body
    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Vec<u8>) {
        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, body.to_vec())
    }

    /// Sends an admin request with a valid bearer token; the body is parsed as JSON
    pub async fn admin(&self, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = json_request(method, uri, body, Some(ADMIN_TOKEN));
        let (status, body) = self.send(request).await;
        let value = if body.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body).unwrap()
        };
        (status, value)
    }

    /// Posts a provider notification
    pub async fn callback(&self, payload: Value) -> (StatusCode, String) {
        let request = Request::builder()
            .method(Method::POST)
            .uri("/callback")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(payload.to_string()))
            .unwrap();
        let (status, body) = self.send(request).await;
        (status, String::from_utf8(body).unwrap())
    }

    /// Delivers a private-chat text message from `user_id`
    pub async fn chat(&self, user_id: i64, text: &str) -> StatusCode {
        let update = json!({
            "update_id": 1,
            "message": {
                "message_id": 10,
                "chat": {"id": user_id, "type": "private"},
                "from": {"id": user_id, "is_bot": false, "first_name": "Test"},
                "text": text,
            }
        });
        let request = json_request(
            Method::POST,
            &format!("/telegram/{WEBHOOK_SECRET}"),
            Some(update),
            None,
        );
        self.send(request).await.0
    }

    /// Last text sent to `chat_id`
    pub fn last_reply(&self, chat_id: i64) -> String {
        self.messenger
            .texts_to(chat_id)
            .pop()
            .unwrap_or_else(|| panic!("no reply sent to {chat_id}"))
    }

    /// Creates a user with `attempts` attempts
    pub async fn seed_user(&self, user_id: i64, attempts: i32) {
        self.store.ensure_user(user_id).await.unwrap();
        if attempts > 0 {
            self.store.grant_attempts(user_id, attempts).await.unwrap();
        }
    }

    pub async fn seed_credential(&self, token: &str, name: &str) {
        self.store
            .create_credential(NewCredential {
                token: token.to_string(),
                name: name.to_string(),
                is_auto_switch: true,
            })
            .await
            .unwrap();
    }
}

pub fn json_request(
    method: Method,
    uri: &str,
    body: Option<Value>,
    bearer: Option<&str>,
) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = bearer {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}
