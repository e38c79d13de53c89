//! Entitlement consumption gate
//!
//! Advisory check run before a submission. It never reserves anything: the
//! debit happens at reconciliation, so a user with one attempt left can start
//! several jobs. An optional per-user cap on pending jobs narrows that window
//! when configured.

use crate::models::User;
use crate::store::{StoreResult, TaskLedger, UserStore};
use std::sync::Arc;

/// Whether `user` may submit: exists, not banned, attempts left
pub fn can_submit(user: Option<&User>) -> bool {
    matches!(user, Some(u) if !u.is_banned && u.attempts > 0)
}

/// Gate verdict with the reason for a refusal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    Allowed,
    UnknownUser,
    Banned,
    NoAttempts,

    /// The user already has `limit` jobs pending
    TooManyInFlight { limit: u32 },
}

impl GateDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, GateDecision::Allowed)
    }
}

/// Store-backed gate
#[derive(Clone)]
pub struct EntitlementGate {
    users: Arc<dyn UserStore>,
    tasks: Arc<dyn TaskLedger>,
    max_in_flight: Option<u32>,
}

impl EntitlementGate {
    pub fn new(users: Arc<dyn UserStore>, tasks: Arc<dyn TaskLedger>) -> Self {
        EntitlementGate {
            users,
            tasks,
            max_in_flight: None,
        }
    }

    /// Refuses submissions while a user has `limit` jobs pending
    pub fn with_max_in_flight(mut self, limit: Option<u32>) -> Self {
        self.max_in_flight = limit;
        self
    }

    pub async fn check(&self, user_id: i64) -> StoreResult<GateDecision> {
        let user = self.users.find_user(user_id).await?;

        if !can_submit(user.as_ref()) {
            return Ok(match user {
                None => GateDecision::UnknownUser,
                Some(u) if u.is_banned => GateDecision::Banned,
                Some(_) => GateDecision::NoAttempts,
            });
        }

        if let Some(limit) = self.max_in_flight {
            let pending = self.tasks.count_user_tasks(user_id).await?;
            if pending >= i64::from(limit) {
                tracing::info!(user_id, pending, limit, "Submission refused, too many jobs in flight");
                return Ok(GateDecision::TooManyInFlight { limit });
            }
        }

        Ok(GateDecision::Allowed)
    }
}
