//! Webhook reconciliation
//!
//! Turns a provider completion notification into exactly one delivery and one
//! debit. The task ledger is the only shared state between submissions and
//! notifications: claiming the task row is the admission gate, so a duplicate
//! notification that arrives while the first one is being settled finds
//! nothing to claim.
//!
//! # Settlement Order
//!
//! ```text
//! claim task (row removed, uncommitted)
//!   ├─ deliver artifact ──failure──► abort (task back, nothing debited),
//!   │                                keep the result URL on the task
//!   └─ commit: attempts - 1 (clamped at 0), usage + 1, removal durable
//! ```
//!
//! The notification endpoint acknowledges every request, so the provider
//! never sends a notification twice on our account. A result whose delivery
//! failed therefore stays on the task and [`WebhookReconciler::redeliver_pending`]
//! (run by the worker) retries it through the same settlement.

use super::notification::{CompletionState, Notification};
use crate::messenger::{DeliveryError, Messenger};
use crate::store::{Settled, StoreError, StoreResult, TaskLedger};
use std::sync::Arc;
use thiserror::Error;

/// Caption sent with a delivered result
pub const RESULT_CAPTION: &str = "✅ Result ready!";

/// Acknowledgment returned to the provider for every notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ack;

impl Ack {
    pub const BODY: &'static str = "ok";
}

/// Reconciliation failure
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The artifact could not be delivered; the task was put back
    #[error("Delivery failed for job {job_id}: {source}")]
    Delivery {
        job_id: String,
        #[source]
        source: DeliveryError,
    },
}

/// What one notification did
#[derive(Debug, Clone, PartialEq)]
pub enum ReconcileOutcome {
    /// Not JSON, or no job id
    Malformed,

    /// No pending task for the job id (never submitted here, or already settled)
    UnknownJob { job_id: String },

    /// A concurrent notification claimed the task first
    AlreadySettled { job_id: String },

    /// Delivered and debited
    Settled(Settled),

    /// Not a success; the task stays for a later notification or the expiry sweep
    Deferred { job_id: String, state: CompletionState },

    /// Success without a result location; the task stays
    MissingArtifact { job_id: String },
}

/// What one redelivery pass did
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Redelivery {
    pub delivered: usize,
    pub failed: usize,
}

/// Reconciles completion notifications against the task ledger
#[derive(Clone)]
pub struct WebhookReconciler {
    ledger: Arc<dyn TaskLedger>,
    messenger: Arc<dyn Messenger>,
}

impl WebhookReconciler {
    pub fn new(ledger: Arc<dyn TaskLedger>, messenger: Arc<dyn Messenger>) -> Self {
        WebhookReconciler { ledger, messenger }
    }

    /// Endpoint entry point: reconciles and always acknowledges
    pub async fn handle_notification(&self, payload: &[u8]) -> Ack {
        match self.reconcile(payload).await {
            Ok(outcome) => log_outcome(&outcome),
            Err(e) => tracing::error!(error = %e, "Notification reconciliation failed"),
        }
        Ack
    }

    pub async fn reconcile(&self, payload: &[u8]) -> Result<ReconcileOutcome, ReconcileError> {
        let Some(notification) = Notification::parse(payload) else {
            return Ok(ReconcileOutcome::Malformed);
        };
        let Notification {
            job_id,
            state,
            artifact,
        } = notification;

        if self.ledger.find_task(&job_id).await?.is_none() {
            return Ok(ReconcileOutcome::UnknownJob { job_id });
        }

        if !state.is_success() {
            return Ok(ReconcileOutcome::Deferred { job_id, state });
        }
        let Some(artifact) = artifact else {
            return Ok(ReconcileOutcome::MissingArtifact { job_id });
        };

        self.settle(job_id, &artifact).await
    }

    /// Retries delivery for finished jobs whose first delivery failed
    pub async fn redeliver_pending(&self, limit: i64) -> StoreResult<Redelivery> {
        let mut pass = Redelivery::default();

        for task in self.ledger.list_undelivered(limit).await? {
            let Some(artifact) = task.result_url else {
                continue;
            };

            match self.settle(task.job_id, &artifact).await {
                Ok(outcome @ ReconcileOutcome::Settled(_)) => {
                    pass.delivered += 1;
                    log_outcome(&outcome);
                }
                Ok(outcome) => log_outcome(&outcome),
                Err(e) => {
                    pass.failed += 1;
                    tracing::warn!(error = %e, "Result redelivery failed");
                }
            }
        }

        Ok(pass)
    }

    async fn settle(&self, job_id: String, artifact: &str) -> Result<ReconcileOutcome, ReconcileError> {
        let Some(settlement) = self.ledger.claim_task(&job_id).await? else {
            return Ok(ReconcileOutcome::AlreadySettled { job_id });
        };
        let user_id = settlement.task().user_id;

        if let Err(source) = self
            .messenger
            .send_video(user_id, artifact, RESULT_CAPTION)
            .await
        {
            if let Err(e) = settlement.abort().await {
                tracing::error!(job_id = %job_id, error = %e, "Failed to release task after delivery failure");
            }
            match self.ledger.attach_result(&job_id, artifact).await {
                Ok(true) => {}
                Ok(false) => {
                    tracing::warn!(job_id = %job_id, "Task vanished before its result could be kept")
                }
                Err(e) => {
                    tracing::error!(job_id = %job_id, error = %e, "Failed to keep undelivered result")
                }
            }
            return Err(ReconcileError::Delivery { job_id, source });
        }

        let settled = settlement.commit().await.map_err(|e| {
            tracing::error!(
                job_id = %job_id,
                user_id,
                error = %e,
                "Artifact delivered but settlement did not commit"
            );
            e
        })?;

        Ok(ReconcileOutcome::Settled(settled))
    }
}

fn log_outcome(outcome: &ReconcileOutcome) {
    match outcome {
        ReconcileOutcome::Malformed => {
            tracing::warn!("Notification without job id ignored")
        }
        ReconcileOutcome::UnknownJob { job_id } => {
            tracing::info!(job_id = %job_id, "Notification for unknown job ignored")
        }
        ReconcileOutcome::AlreadySettled { job_id } => {
            tracing::info!(job_id = %job_id, "Duplicate notification, job already being settled")
        }
        ReconcileOutcome::Settled(settled) => {
            if settled.attempts_before == 0 {
                tracing::warn!(
                    job_id = %settled.task.job_id,
                    user_id = settled.user.user_id,
                    "Delivered with no attempts left, debit clamped at zero"
                );
            }
            tracing::info!(
                job_id = %settled.task.job_id,
                user_id = settled.user.user_id,
                attempts_left = settled.user.attempts,
                credential_usage = settled.credential_usage,
                "Job settled"
            );
        }
        ReconcileOutcome::Deferred {
            job_id,
            state: CompletionState::Failed(state),
        } => {
            tracing::warn!(job_id = %job_id, state = %state, "Job failed at provider, task kept until expiry")
        }
        ReconcileOutcome::Deferred { job_id, state } => {
            tracing::debug!(job_id = %job_id, state = ?state, "Job not finished yet")
        }
        ReconcileOutcome::MissingArtifact { job_id } => {
            tracing::warn!(job_id = %job_id, "Success notification without result URL")
        }
    }
}
