//! Watermark-removal provider
//!
//! [`ProviderClient`] is the outbound job-creation call. It knows nothing
//! about credentials beyond the bearer secret it is handed, and nothing about
//! the task ledger; the submitter composes those.

pub mod kie;
pub mod mock;

pub use kie::{parse_create_response, KieClient, KieConfig};
pub use mock::MockProvider;

use async_trait::async_trait;
use thiserror::Error;

/// Job creation failure
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    /// The provider answered but did not accept the job
    #[error("Provider rejected the job: {0}")]
    Rejected(String),

    /// The request did not complete
    #[error("Network error: {0}")]
    Network(String),

    /// The request exceeded the configured timeout
    #[error("Provider request timed out")]
    Timeout,

    /// The provider answered with a body that could not be interpreted
    #[error("Malformed provider response: {0}")]
    Malformed(String),
}

/// Outbound job creation
#[async_trait]
pub trait ProviderClient: Send + Sync {
    /// Submits `video_url` using `token` as bearer secret, returns the provider job id
    async fn create_job(&self, token: &str, video_url: &str) -> Result<String, ProviderError>;
}
