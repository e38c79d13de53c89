//! Telegram Bot API adapter
//!
//! Every call is a JSON `POST {api_base}/bot{token}/{method}`. The Bot API
//! wraps results as `{"ok": bool, "result": ..., "description": ...}`; a
//! response with `ok = false` is a [`DeliveryError::Rejected`].

use super::{DeliveryError, Messenger};
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default Bot API endpoint
pub const TELEGRAM_API_BASE: &str = "https://api.telegram.org";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Membership statuses that count as "subscribed"
const MEMBER_STATUSES: [&str; 3] = ["member", "administrator", "creator"];

#[derive(Deserialize)]
struct BotResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: i64,
    text: &'a str,
}

#[derive(Serialize)]
struct SendVideo<'a> {
    chat_id: i64,
    video: &'a str,
    caption: &'a str,
}

#[derive(Serialize)]
struct GetChatMember<'a> {
    chat_id: &'a str,
    user_id: i64,
}

#[derive(Deserialize)]
struct ChatMember {
    status: String,
}

/// Messenger backed by the Telegram Bot API
#[derive(Clone)]
pub struct TelegramMessenger {
    client: Client,
    api_base: String,
    bot_token: String,
}

impl TelegramMessenger {
    /// Creates a messenger talking to [`TELEGRAM_API_BASE`]
    pub fn new(bot_token: impl Into<String>) -> Result<Self, DeliveryError> {
        Self::with_api_base(bot_token, TELEGRAM_API_BASE)
    }

    pub fn with_api_base(
        bot_token: impl Into<String>,
        api_base: impl Into<String>,
    ) -> Result<Self, DeliveryError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| DeliveryError::Transport(e.to_string()))?;

        Ok(TelegramMessenger {
            client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            bot_token: bot_token.into(),
        })
    }

    async fn call<B: Serialize + Sync, T: DeserializeOwned>(
        &self,
        method: &str,
        body: &B,
    ) -> Result<T, DeliveryError> {
        let url = format!("{}/bot{}/{}", self.api_base, self.bot_token, method);

        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            // reqwest errors carry the URL, which contains the bot token.
            .map_err(|e| DeliveryError::Transport(e.without_url().to_string()))?;

        let status = response.status();
        let parsed: BotResponse<T> = response
            .json()
            .await
            .map_err(|e| DeliveryError::Transport(e.without_url().to_string()))?;

        match parsed {
            BotResponse {
                ok: true,
                result: Some(result),
                ..
            } => Ok(result),
            BotResponse { description, .. } => Err(DeliveryError::Rejected(format!(
                "{method} failed ({status}): {}",
                description.unwrap_or_else(|| "no description".to_string())
            ))),
        }
    }
}

#[async_trait]
impl Messenger for TelegramMessenger {
    async fn send_text(&self, chat_id: i64, text: &str) -> Result<(), DeliveryError> {
        let _: serde_json::Value = self
            .call("sendMessage", &SendMessage { chat_id, text })
            .await?;
        Ok(())
    }

    async fn send_video(
        &self,
        chat_id: i64,
        video_url: &str,
        caption: &str,
    ) -> Result<(), DeliveryError> {
        let _: serde_json::Value = self
            .call(
                "sendVideo",
                &SendVideo {
                    chat_id,
                    video: video_url,
                    caption,
                },
            )
            .await?;
        Ok(())
    }

    async fn is_channel_member(&self, channel: &str, user_id: i64) -> Result<bool, DeliveryError> {
        let member: ChatMember = self
            .call(
                "getChatMember",
                &GetChatMember {
                    chat_id: channel,
                    user_id,
                },
            )
            .await?;

        Ok(MEMBER_STATUSES.contains(&member.status.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_response_parses() {
        let parsed: BotResponse<serde_json::Value> = serde_json::from_str(
            r#"{"ok": false, "error_code": 403, "description": "Forbidden: bot was blocked by the user"}"#,
        )
        .unwrap();
        assert!(!parsed.ok);
        assert!(parsed.result.is_none());
        assert_eq!(
            parsed.description.as_deref(),
            Some("Forbidden: bot was blocked by the user")
        );
    }

    #[test]
    fn test_chat_member_parses() {
        let parsed: BotResponse<ChatMember> = serde_json::from_str(
            r#"{"ok": true, "result": {"status": "left", "user": {"id": 1}}}"#,
        )
        .unwrap();
        let status = parsed.result.unwrap().status;
        assert!(!MEMBER_STATUSES.contains(&status.as_str()));
    }

    #[test]
    fn test_api_base_trailing_slash_trimmed() {
        let messenger = TelegramMessenger::with_api_base("123:abc", "http://localhost:8081/").unwrap();
        assert_eq!(messenger.api_base, "http://localhost:8081");
    }
}
