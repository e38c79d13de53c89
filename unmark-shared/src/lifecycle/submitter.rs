//! Job submission
//!
//! ```text
//! select credential ──none──► NoCapacity
//!        │
//!   create_job ──failure──► failover ──► Provider / Network / Timeout
//!        │
//!   reset failure run, record task ──► job id
//! ```
//!
//! Submission never touches the user's attempts. A task row exists only for
//! jobs the provider explicitly acknowledged.

use super::failover::FailoverController;
use super::selector::CredentialSelector;
use crate::models::{Credential, NewTask};
use crate::provider::{ProviderClient, ProviderError};
use crate::store::{StoreError, TaskLedger};
use std::sync::Arc;
use thiserror::Error;

/// Submission failure
#[derive(Debug, Error)]
pub enum SubmitError {
    /// No enabled credential exists
    #[error("No usable credential")]
    NoCapacity,

    /// The provider answered without accepting the job
    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Provider request timed out")]
    Timeout,

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<ProviderError> for SubmitError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::Rejected(msg) | ProviderError::Malformed(msg) => SubmitError::Provider(msg),
            ProviderError::Network(msg) => SubmitError::Network(msg),
            ProviderError::Timeout => SubmitError::Timeout,
        }
    }
}

/// Submits jobs to the provider and records acknowledged ones
#[derive(Clone)]
pub struct JobSubmitter {
    selector: CredentialSelector,
    provider: Arc<dyn ProviderClient>,
    ledger: Arc<dyn TaskLedger>,
    failover: FailoverController,
}

impl JobSubmitter {
    pub fn new(
        selector: CredentialSelector,
        provider: Arc<dyn ProviderClient>,
        ledger: Arc<dyn TaskLedger>,
        failover: FailoverController,
    ) -> Self {
        JobSubmitter {
            selector,
            provider,
            ledger,
            failover,
        }
    }

    /// Submits `video_url` for `user_id` and returns the provider job id
    ///
    /// The caller is expected to have consulted the entitlement gate.
    pub async fn submit(&self, video_url: &str, user_id: i64) -> Result<String, SubmitError> {
        let credential = self
            .selector
            .select_credential()
            .await?
            .ok_or(SubmitError::NoCapacity)?;

        let job_id = match self.provider.create_job(&credential.token, video_url).await {
            Ok(job_id) => job_id,
            Err(err) => {
                tracing::warn!(
                    user_id,
                    credential = %credential.name,
                    error = %err,
                    "Job submission failed"
                );
                self.fail_over(&credential).await;
                return Err(err.into());
            }
        };

        if let Err(e) = self.failover.on_submission_success().await {
            tracing::warn!(job_id = %job_id, error = %e, "Could not reset the submission failure count");
        }

        self.ledger
            .record_task(NewTask {
                job_id: job_id.clone(),
                user_id,
                token: credential.token.clone(),
                video_url: video_url.to_string(),
            })
            .await
            .map_err(|err| {
                tracing::error!(
                    job_id = %job_id,
                    user_id,
                    error = %err,
                    "Provider accepted job but the task could not be recorded"
                );
                err
            })?;

        tracing::info!(
            job_id = %job_id,
            user_id,
            credential = %credential.name,
            "Job submitted"
        );
        Ok(job_id)
    }

    async fn fail_over(&self, credential: &Credential) {
        if let Err(e) = self.failover.on_submission_failure(credential).await {
            tracing::error!(
                credential = %credential.name,
                error = %e,
                "Failover after submission failure did not complete"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewCredential;
    use crate::provider::MockProvider;
    use crate::store::memory::MemoryStore;
    use crate::store::{CredentialStore, UserStore};

    struct Fixture {
        store: Arc<MemoryStore>,
        provider: Arc<MockProvider>,
        submitter: JobSubmitter,
    }

    async fn fixture(credentials: &[(&str, i64)]) -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let provider = Arc::new(MockProvider::new());
        store.ensure_user(1).await.unwrap();
        store.grant_attempts(1, 1).await.unwrap();

        for (token, usage) in credentials {
            store
                .create_credential(NewCredential {
                    token: token.to_string(),
                    name: token.to_uppercase(),
                    is_auto_switch: true,
                })
                .await
                .unwrap();
            store.set_usage(token, *usage);
        }

        let submitter = JobSubmitter::new(
            CredentialSelector::new(store.clone()),
            provider.clone(),
            store.clone(),
            FailoverController::new(store.clone()),
        );

        Fixture {
            store,
            provider,
            submitter,
        }
    }

    #[tokio::test]
    async fn test_success_records_task() {
        let f = fixture(&[("a", 0)]).await;
        f.provider.accept("job-1");

        let job_id = f.submitter.submit("https://cdn/v.mp4", 1).await.unwrap();

        assert_eq!(job_id, "job-1");
        let task = f.store.find_task("job-1").await.unwrap().unwrap();
        assert_eq!(task.user_id, 1);
        assert_eq!(task.token, "a");
        assert_eq!(f.provider.calls(), vec![("a".to_string(), "https://cdn/v.mp4".to_string())]);
    }

    #[tokio::test]
    async fn test_no_capacity() {
        let f = fixture(&[]).await;
        assert!(matches!(
            f.submitter.submit("https://cdn/v.mp4", 1).await,
            Err(SubmitError::NoCapacity)
        ));
        assert!(f.provider.calls().is_empty());
    }

    #[tokio::test]
    async fn test_failure_costs_nothing_and_rotates() {
        let f = fixture(&[("a", 0), ("b", 5)]).await;
        f.provider.fail(ProviderError::Rejected("quota exhausted".into()));

        let err = f.submitter.submit("https://cdn/v.mp4", 1).await.unwrap_err();

        assert!(matches!(err, SubmitError::Provider(_)));
        assert_eq!(f.store.task_count(), 0);
        assert_eq!(f.store.find_user(1).await.unwrap().unwrap().attempts, 1);

        let credentials = f.store.list_credentials().await.unwrap();
        let b = credentials.iter().find(|c| c.token == "b").unwrap();
        assert!(b.is_active);
    }

    #[tokio::test]
    async fn test_timeout_maps_and_fails_over() {
        let f = fixture(&[("a", 0), ("b", 5)]).await;
        f.provider.fail(ProviderError::Timeout);

        assert!(matches!(
            f.submitter.submit("https://cdn/v.mp4", 1).await,
            Err(SubmitError::Timeout)
        ));
        assert_eq!(f.store.task_count(), 0);

        // Next submission goes through the rotated-to credential.
        f.provider.accept("job-2");
        f.submitter.submit("https://cdn/v.mp4", 1).await.unwrap();
        assert_eq!(f.provider.calls()[1].0, "b");
    }

    #[tokio::test]
    async fn test_duplicate_job_id_is_store_error() {
        let f = fixture(&[("a", 0)]).await;
        f.provider.accept("dup").accept("dup");

        f.submitter.submit("https://cdn/1.mp4", 1).await.unwrap();
        let err = f.submitter.submit("https://cdn/2.mp4", 1).await.unwrap_err();

        assert!(matches!(err, SubmitError::Store(StoreError::Conflict(_))));
        assert_eq!(f.store.task_count(), 1);
    }

    #[tokio::test]
    async fn test_every_credential_failing_reaches_operator() {
        use crate::messenger::{OperatorAlerts, RecordingMessenger};

        let f = fixture(&[("a", 0), ("b", 5)]).await;
        let messenger = Arc::new(RecordingMessenger::new());
        let submitter = JobSubmitter::new(
            CredentialSelector::new(f.store.clone()),
            f.provider.clone(),
            f.store.clone(),
            FailoverController::new(f.store.clone())
                .with_alerts(OperatorAlerts::new(messenger.clone(), 500)),
        );

        for _ in 0..10 {
            assert!(submitter.submit("https://cdn/v.mp4", 1).await.is_err());
        }

        let tokens: Vec<String> = f.provider.calls().into_iter().map(|(token, _)| token).collect();
        assert_eq!(tokens, ["a", "b"].repeat(5));
        assert_eq!(messenger.texts_to(500).len(), 5);
        assert_eq!(f.store.task_count(), 0);

        // A success clears the run; the next single failure stays quiet.
        f.provider.accept("job-ok");
        submitter.submit("https://cdn/v.mp4", 1).await.unwrap();
        assert!(submitter.submit("https://cdn/v.mp4", 1).await.is_err());
        assert_eq!(messenger.texts_to(500).len(), 5);
    }
}
