/// Provider completion notifications
///
/// # Endpoint
///
/// ```text
/// POST /callback
/// POST /
/// ```
///
/// The body is handed to the reconciler unparsed. The answer is always
/// `200 ok`, whatever the body contained or whatever failed while handling
/// it, so the provider never retries.

use crate::app::AppState;
use axum::{body::Bytes, extract::State, http::StatusCode};
use unmark_shared::lifecycle::Ack;

pub async fn provider_callback(State(state): State<AppState>, body: Bytes) -> (StatusCode, &'static str) {
    let Ack = state.reconciler.handle_notification(&body).await;
    (StatusCode::OK, Ack::BODY)
}
