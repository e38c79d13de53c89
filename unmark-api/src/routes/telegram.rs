/// Chat updates
///
/// # Endpoint
///
/// ```text
/// POST /telegram/:secret
/// ```
///
/// Receives Bot API updates. The path secret must match
/// `TELEGRAM_WEBHOOK_SECRET`; anything else reads as an unknown route.
/// Accepted updates are always answered with 200 so the platform does not
/// redeliver them, even when handling failed.

use crate::{
    app::{secrets_match, AppState},
    error::{ApiError, ApiResult},
};
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
};
use serde::Deserialize;

/// Subset of a Bot API update
#[derive(Debug, Deserialize)]
pub struct Update {
    pub update_id: i64,

    #[serde(default)]
    pub message: Option<Message>,
}

#[derive(Debug, Deserialize)]
pub struct Message {
    pub chat: Chat,

    #[serde(default)]
    pub from: Option<Sender>,

    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Deserialize)]
pub struct Sender {
    pub id: i64,
}

pub async fn telegram_update(
    State(state): State<AppState>,
    Path(secret): Path<String>,
    body: Bytes,
) -> ApiResult<StatusCode> {
    if !secrets_match(&secret, &state.config.telegram.webhook_secret) {
        return Err(ApiError::NotFound("Not found".to_string()));
    }

    let update: Update = match serde_json::from_slice(&body) {
        Ok(update) => update,
        Err(e) => {
            tracing::warn!(error = %e, "Ignoring undecodable chat update");
            return Ok(StatusCode::OK);
        }
    };

    let Some(Message {
        chat,
        from: Some(sender),
        text: Some(text),
    }) = update.message
    else {
        tracing::debug!(update_id = update.update_id, "Ignoring update without a text message");
        return Ok(StatusCode::OK);
    };

    if let Err(e) = state.bot.handle(chat.id, sender.id, &text).await {
        tracing::warn!(
            update_id = update.update_id,
            user_id = sender.id,
            error = %e,
            "Chat update not fully handled"
        );
    }

    Ok(StatusCode::OK)
}
