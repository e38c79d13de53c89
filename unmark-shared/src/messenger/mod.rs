//! Chat transport
//!
//! The lifecycle talks to users (and to the operator) only through the
//! [`Messenger`] trait. [`telegram::TelegramMessenger`] is the Bot API
//! adapter used in production; [`mock::RecordingMessenger`] records every
//! call for tests.

pub mod mock;
pub mod telegram;

pub use mock::{RecordingMessenger, SentMessage};
pub use telegram::TelegramMessenger;

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Delivery error
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// The transport could not be reached
    #[error("Transport error: {0}")]
    Transport(String),

    /// The chat platform answered with an error
    #[error("Rejected by chat platform: {0}")]
    Rejected(String),
}

/// Outbound chat operations
#[async_trait]
pub trait Messenger: Send + Sync {
    async fn send_text(&self, chat_id: i64, text: &str) -> Result<(), DeliveryError>;

    /// Sends a video by URL; the chat platform fetches the file itself
    async fn send_video(&self, chat_id: i64, video_url: &str, caption: &str)
        -> Result<(), DeliveryError>;

    /// Whether `user_id` is currently a member of `channel`
    async fn is_channel_member(&self, channel: &str, user_id: i64) -> Result<bool, DeliveryError>;
}

/// Operator notification channel
///
/// Alerts are best effort: a failed alert is logged and never propagates
/// into the operation that raised it.
#[derive(Clone)]
pub struct OperatorAlerts {
    messenger: Arc<dyn Messenger>,
    admin_chat_id: i64,
}

impl OperatorAlerts {
    pub fn new(messenger: Arc<dyn Messenger>, admin_chat_id: i64) -> Self {
        OperatorAlerts {
            messenger,
            admin_chat_id,
        }
    }

    pub async fn raise(&self, text: &str) {
        if let Err(e) = self.messenger.send_text(self.admin_chat_id, text).await {
            tracing::error!(error = %e, "Failed to deliver operator alert");
        }
    }
}
