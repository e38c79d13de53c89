//! Stale task expiry
//!
//! Tasks whose notification never arrives (provider-side failure, lost
//! webhook) would otherwise stay in the ledger forever. The sweep removes
//! tasks older than a TTL and tells each owner the job expired. Attempts are
//! untouched: nothing was debited for these jobs.
//!
//! A task that already holds a result reached this point only because every
//! delivery retry failed. Its owner gets a different notice and the operator
//! is alerted with the result location.

use crate::messenger::{Messenger, OperatorAlerts};
use crate::models::Task;
use crate::store::{StoreResult, TaskLedger};
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;

/// Notice sent to the owner of an expired job
pub const EXPIRED_NOTICE: &str =
    "⚠️ Your video could not be processed in time. No attempt was charged, please try again.";

/// Notice sent when a finished result could never be delivered
pub const UNDELIVERED_NOTICE: &str =
    "⚠️ Your video was processed but could not be sent to you. No attempt was charged, please try again.";

/// Removes stale tasks and notifies their owners
#[derive(Clone)]
pub struct TaskExpiry {
    ledger: Arc<dyn TaskLedger>,
    messenger: Arc<dyn Messenger>,
    ttl: Duration,
    alerts: Option<OperatorAlerts>,
}

impl TaskExpiry {
    pub fn new(ledger: Arc<dyn TaskLedger>, messenger: Arc<dyn Messenger>, ttl: Duration) -> Self {
        TaskExpiry {
            ledger,
            messenger,
            ttl,
            alerts: None,
        }
    }

    /// Alerts the operator about expired tasks that held an undelivered result
    pub fn with_alerts(mut self, alerts: OperatorAlerts) -> Self {
        self.alerts = Some(alerts);
        self
    }

    /// Expires every task created before `now - ttl` and returns them
    pub async fn sweep(&self, now: DateTime<Utc>) -> StoreResult<Vec<Task>> {
        let expired = self.ledger.expire_tasks(now - self.ttl).await?;

        for task in &expired {
            tracing::warn!(
                job_id = %task.job_id,
                user_id = task.user_id,
                age_secs = (now - task.created_at).num_seconds(),
                undelivered = task.result_url.is_some(),
                "Expired stale task"
            );

            let notice = match &task.result_url {
                Some(result_url) => {
                    if let Some(alerts) = &self.alerts {
                        alerts
                            .raise(&format!(
                                "Job {} for user {} finished but was never delivered: {}",
                                task.job_id, task.user_id, result_url
                            ))
                            .await;
                    }
                    UNDELIVERED_NOTICE
                }
                None => EXPIRED_NOTICE,
            };

            if let Err(e) = self.messenger.send_text(task.user_id, notice).await {
                tracing::warn!(job_id = %task.job_id, error = %e, "Could not notify owner of expired task");
            }
        }

        Ok(expired)
    }
}
