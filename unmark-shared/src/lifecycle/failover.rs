//! Credential failover
//!
//! When a submission fails and the store-wide auto-switch flag is on, the
//! active credential is replaced by the least used alternative. This is load
//! steering, not health checking: nothing is deleted or blacklisted, and an
//! administrator can pin any credential again.
//!
//! # Rotation Policy
//!
//! ```text
//! deactivate: every credential currently active
//! candidates: enabled ∧ participates in rotation ∧ not deactivated ∧ not the failed one
//! activate:   candidate with the lowest (usage_count, seq), if any
//! ```
//!
//! If there is no candidate every credential is left inactive; selection then
//! falls back to least-used-enabled and an operator alert is raised.
//!
//! Rotation alone cannot tell a bad credential from a bad provider: with two
//! failing credentials it would swap between them forever. The store keeps a
//! durable count of consecutive rejections, reset by the next accepted
//! submission, and the operator is alerted whenever that run covers every
//! usable credential, with or without auto-switch.

use crate::messenger::OperatorAlerts;
use crate::models::Credential;
use crate::store::{CredentialStore, Rotation, StoreResult};
use std::sync::Arc;

/// Token-level plan produced by [`plan_rotation`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RotationPlan {
    /// Tokens whose active flag is cleared
    pub deactivate: Vec<String>,

    /// Token that becomes the only active credential
    pub activate: Option<String>,
}

/// Computes the rotation for a credential snapshot
pub fn plan_rotation(credentials: &[Credential], failed_token: &str) -> RotationPlan {
    let deactivate: Vec<String> = credentials
        .iter()
        .filter(|c| c.is_active)
        .map(|c| c.token.clone())
        .collect();

    let activate = credentials
        .iter()
        .filter(|c| c.is_usable() && c.is_auto_switch)
        .filter(|c| c.token != failed_token && !deactivate.contains(&c.token))
        .min_by_key(|c| (c.usage_count, c.seq))
        .map(|c| c.token.clone());

    RotationPlan {
        deactivate,
        activate,
    }
}

/// What a failure notification did
#[derive(Debug, Clone, PartialEq)]
pub enum FailoverOutcome {
    /// Auto-switch is off; nothing changed
    Disabled,

    /// A new credential is active
    Rotated(Rotation),

    /// No alternative was available; all credentials are now inactive
    Exhausted(Rotation),
}

/// Whether a run of `failures` rejections should reach the operator
///
/// True each time the run covers every usable credential once more, so a
/// pool that keeps failing alerts once per full cycle rather than per request.
pub fn all_credentials_failing(failures: i64, usable: usize) -> bool {
    let cycle = usable.max(1) as i64;
    failures >= cycle && failures % cycle == 0
}

/// Reacts to submission failures by rotating the active credential
#[derive(Clone)]
pub struct FailoverController {
    credentials: Arc<dyn CredentialStore>,
    alerts: Option<OperatorAlerts>,
}

impl FailoverController {
    pub fn new(credentials: Arc<dyn CredentialStore>) -> Self {
        FailoverController {
            credentials,
            alerts: None,
        }
    }

    /// Sends operator alerts when rotation runs out of alternatives or every
    /// credential keeps failing
    pub fn with_alerts(mut self, alerts: OperatorAlerts) -> Self {
        self.alerts = Some(alerts);
        self
    }

    /// Handles a failed submission made with `failed`
    ///
    /// # Errors
    ///
    /// Returns storage errors; the caller decides whether they matter (the
    /// submitter logs them and still reports the original failure).
    pub async fn on_submission_failure(&self, failed: &Credential) -> StoreResult<FailoverOutcome> {
        let failures = self.credentials.record_submission_failure().await?;

        let outcome = if self.credentials.auto_switch_enabled().await? {
            let rotation = self.credentials.rotate_active(&failed.token).await?;
            match rotation.activated {
                Some(_) => FailoverOutcome::Rotated(rotation),
                None => FailoverOutcome::Exhausted(rotation),
            }
        } else {
            FailoverOutcome::Disabled
        };

        match &outcome {
            FailoverOutcome::Disabled => {
                tracing::info!(
                    credential = %failed.name,
                    consecutive_failures = failures,
                    "Submission failed, auto-switch disabled; keeping credentials as they are"
                );
            }
            FailoverOutcome::Rotated(rotation) => {
                if let Some(next) = &rotation.activated {
                    tracing::warn!(
                        failed = %failed.name,
                        activated = %next.name,
                        deactivated = rotation.deactivated.len(),
                        consecutive_failures = failures,
                        "Rotated active credential after submission failure"
                    );
                }
            }
            FailoverOutcome::Exhausted(rotation) => {
                tracing::error!(
                    failed = %failed.name,
                    deactivated = rotation.deactivated.len(),
                    "Submission failed and no alternative credential is available"
                );
                self.alert(&format!(
                    "Credential '{}' failed and no alternative credential is available. \
                     All credentials are now inactive.",
                    failed.name
                ))
                .await;
                return Ok(outcome);
            }
        }

        let usable = self
            .credentials
            .list_credentials()
            .await?
            .iter()
            .filter(|c| c.is_usable())
            .count();
        if all_credentials_failing(failures, usable) {
            tracing::error!(
                consecutive_failures = failures,
                usable_credentials = usable,
                "Every usable credential is failing"
            );
            self.alert(&format!(
                "{failures} submissions failed in a row across {usable} usable credential(s). \
                 Last failure: '{}'. Check the provider account and credentials.",
                failed.name
            ))
            .await;
        }

        Ok(outcome)
    }

    /// Ends the current run of failures after an accepted submission
    pub async fn on_submission_success(&self) -> StoreResult<()> {
        self.credentials.reset_submission_failures().await
    }

    async fn alert(&self, text: &str) {
        if let Some(alerts) = &self.alerts {
            alerts.raise(text).await;
        }
    }
}
