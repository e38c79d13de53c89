//! User accounts: first contact, profile and the channel bonus

use crate::messenger::{DeliveryError, Messenger};
use crate::models::User;
use crate::store::{StoreError, UserStore};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AccountError {
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Channel membership could not be checked
    #[error(transparent)]
    Membership(#[from] DeliveryError),
}

/// Result of a bonus claim
#[derive(Debug, Clone, PartialEq)]
pub enum BonusOutcome {
    Granted(User),
    AlreadyClaimed,

    /// The user is not a member of the bonus channel
    NotSubscribed,
}

#[derive(Clone)]
pub struct AccountService {
    users: Arc<dyn UserStore>,
    messenger: Arc<dyn Messenger>,
    bonus_channel: String,
}

impl AccountService {
    pub fn new(users: Arc<dyn UserStore>, messenger: Arc<dyn Messenger>, bonus_channel: impl Into<String>) -> Self {
        AccountService {
            users,
            messenger,
            bonus_channel: bonus_channel.into(),
        }
    }

    /// Registers the user on first contact
    pub async fn register(&self, user_id: i64) -> Result<User, AccountError> {
        Ok(self.users.ensure_user(user_id).await?)
    }

    pub async fn profile(&self, user_id: i64) -> Result<User, AccountError> {
        self.register(user_id).await
    }

    /// Grants the one-time bonus attempt to channel members
    pub async fn claim_bonus(&self, user_id: i64) -> Result<BonusOutcome, AccountError> {
        let user = self.register(user_id).await?;
        if user.received_free_bonus {
            return Ok(BonusOutcome::AlreadyClaimed);
        }

        if !self.messenger.is_channel_member(&self.bonus_channel, user_id).await? {
            return Ok(BonusOutcome::NotSubscribed);
        }

        match self.users.claim_bonus(user_id).await? {
            Some(user) => {
                tracing::info!(user_id, "Channel bonus granted");
                Ok(BonusOutcome::Granted(user))
            }
            None => Ok(BonusOutcome::AlreadyClaimed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messenger::RecordingMessenger;
    use crate::store::memory::MemoryStore;

    #[tokio::test]
    async fn test_bonus_requires_membership_and_is_granted_once() {
        let store = Arc::new(MemoryStore::new());
        let messenger = Arc::new(RecordingMessenger::new());
        let accounts = AccountService::new(store.clone(), messenger.clone(), "@channel");

        assert_eq!(accounts.claim_bonus(8).await.unwrap(), BonusOutcome::NotSubscribed);

        messenger.add_member(8);
        let BonusOutcome::Granted(user) = accounts.claim_bonus(8).await.unwrap() else {
            panic!("bonus not granted");
        };
        assert_eq!(user.attempts, 1);

        assert_eq!(accounts.claim_bonus(8).await.unwrap(), BonusOutcome::AlreadyClaimed);
        assert_eq!(accounts.profile(8).await.unwrap().attempts, 1);
    }
}
