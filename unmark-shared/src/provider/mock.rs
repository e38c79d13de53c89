//! Scripted provider for tests

use super::{ProviderClient, ProviderError};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Default)]
struct State {
    script: VecDeque<Result<String, ProviderError>>,
    calls: Vec<(String, String)>,
}

/// Provider that replays queued outcomes
///
/// When the script is empty every call fails with [`ProviderError::Network`].
#[derive(Debug, Default)]
pub struct MockProvider {
    state: Mutex<State>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Queues an accepted job
    pub fn accept(&self, job_id: impl Into<String>) -> &Self {
        self.state().script.push_back(Ok(job_id.into()));
        self
    }

    /// Queues a failure
    pub fn fail(&self, error: ProviderError) -> &Self {
        self.state().script.push_back(Err(error));
        self
    }

    /// `(token, video_url)` of every call made
    pub fn calls(&self) -> Vec<(String, String)> {
        self.state().calls.clone()
    }
}

#[async_trait]
impl ProviderClient for MockProvider {
    async fn create_job(&self, token: &str, video_url: &str) -> Result<String, ProviderError> {
        let mut state = self.state();
        state.calls.push((token.to_string(), video_url.to_string()));
        state
            .script
            .pop_front()
            .unwrap_or_else(|| Err(ProviderError::Network("no scripted response".to_string())))
    }
}
