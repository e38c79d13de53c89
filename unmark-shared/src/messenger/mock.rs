//! Recording messenger for tests

use super::{DeliveryError, Messenger};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard};

/// A message the messenger was asked to send
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SentMessage {
    Text {
        chat_id: i64,
        text: String,
    },
    Video {
        chat_id: i64,
        url: String,
        caption: String,
    },
}

#[derive(Debug, Default)]
struct State {
    sent: Vec<SentMessage>,
    members: HashSet<i64>,
    fail_text: bool,
    fail_video: bool,
}

/// Messenger that records successful sends and can be told to fail
#[derive(Debug, Default)]
pub struct RecordingMessenger {
    state: Mutex<State>,
}

impl RecordingMessenger {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Everything sent so far, in order
    pub fn sent(&self) -> Vec<SentMessage> {
        self.state().sent.clone()
    }

    /// Texts sent to one chat
    pub fn texts_to(&self, chat_id: i64) -> Vec<String> {
        self.state()
            .sent
            .iter()
            .filter_map(|m| match m {
                SentMessage::Text { chat_id: to, text } if *to == chat_id => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    /// Videos sent to any chat
    pub fn videos(&self) -> Vec<SentMessage> {
        self.state()
            .sent
            .iter()
            .filter(|m| matches!(m, SentMessage::Video { .. }))
            .cloned()
            .collect()
    }

    pub fn add_member(&self, user_id: i64) {
        self.state().members.insert(user_id);
    }

    pub fn fail_text(&self, fail: bool) {
        self.state().fail_text = fail;
    }

    pub fn fail_video(&self, fail: bool) {
        self.state().fail_video = fail;
    }
}

#[async_trait]
impl Messenger for RecordingMessenger {
    async fn send_text(&self, chat_id: i64, text: &str) -> Result<(), DeliveryError> {
        let mut state = self.state();
        if state.fail_text {
            return Err(DeliveryError::Transport("simulated text failure".to_string()));
        }
        state.sent.push(SentMessage::Text {
            chat_id,
            text: text.to_string(),
        });
        Ok(())
    }

    async fn send_video(
        &self,
        chat_id: i64,
        video_url: &str,
        caption: &str,
    ) -> Result<(), DeliveryError> {
        // Gives concurrent reconciliations a chance to interleave.
        tokio::task::yield_now().await;

        let mut state = self.state();
        if state.fail_video {
            return Err(DeliveryError::Rejected("simulated video failure".to_string()));
        }
        state.sent.push(SentMessage::Video {
            chat_id,
            url: video_url.to_string(),
            caption: caption.to_string(),
        });
        Ok(())
    }

    async fn is_channel_member(&self, _channel: &str, user_id: i64) -> Result<bool, DeliveryError> {
        Ok(self.state().members.contains(&user_id))
    }
}
