//! Credential selection
//!
//! Picks the credential for the next job:
//!
//! 1. among enabled credentials flagged active, the least used;
//! 2. otherwise, the least used enabled credential;
//! 3. otherwise nothing ("no capacity").
//!
//! Ties on usage are broken by insertion order (`seq`), so the result is a
//! pure function of the stored rows. Zero or several active rows are both
//! tolerated.

use crate::models::Credential;
use crate::store::{CredentialStore, StoreResult};
use std::sync::Arc;

/// Applies the selection policy to a credential snapshot
pub fn select_from(credentials: &[Credential]) -> Option<&Credential> {
    let least_used = |pinned_only: bool| {
        credentials
            .iter()
            .filter(|c| c.is_usable() && (!pinned_only || c.is_active))
            .min_by_key(|c| (c.usage_count, c.seq))
    };

    least_used(true).or_else(|| least_used(false))
}

/// Reads the credential store and applies [`select_from`]
#[derive(Clone)]
pub struct CredentialSelector {
    credentials: Arc<dyn CredentialStore>,
}

impl CredentialSelector {
    pub fn new(credentials: Arc<dyn CredentialStore>) -> Self {
        CredentialSelector { credentials }
    }

    /// Returns the credential to use, or `None` when there is no capacity
    ///
    /// # Errors
    ///
    /// Only storage failures are errors; an empty or fully disabled store is `Ok(None)`.
    pub async fn select_credential(&self) -> StoreResult<Option<Credential>> {
        let credentials = self.credentials.list_credentials().await?;
        let selected = select_from(&credentials).cloned();

        match &selected {
            Some(credential) => tracing::debug!(
                credential = %credential.name,
                usage_count = credential.usage_count,
                pinned = credential.is_active,
                "Selected credential"
            ),
            None => tracing::warn!(
                total = credentials.len(),
                "No usable credential available"
            ),
        }

        Ok(selected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn credential(seq: i64, usage_count: i64, is_active: bool) -> Credential {
        Credential {
            token: format!("token-{seq}"),
            seq,
            name: format!("key {seq}"),
            usage_count,
            is_enabled: true,
            is_active,
            is_auto_switch: true,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_pinned_credential_wins_over_less_used() {
        let credentials = vec![credential(1, 5, true), credential(2, 1, false)];
        assert_eq!(select_from(&credentials).unwrap().seq, 1);
    }

    #[test]
    fn test_least_used_when_nothing_pinned() {
        let credentials = vec![credential(1, 5, false), credential(2, 1, false)];
        assert_eq!(select_from(&credentials).unwrap().seq, 2);
    }

    #[test]
    fn test_least_used_among_several_pinned() {
        let credentials = vec![
            credential(1, 9, true),
            credential(2, 0, false),
            credential(3, 4, true),
        ];
        assert_eq!(select_from(&credentials).unwrap().seq, 3);
    }

    #[test]
    fn test_ties_broken_by_insertion_order() {
        let credentials = vec![credential(3, 2, false), credential(1, 2, false), credential(2, 2, false)];
        assert_eq!(select_from(&credentials).unwrap().seq, 1);
    }

    #[test]
    fn test_disabled_credentials_are_skipped() {
        let mut pinned = credential(1, 0, true);
        pinned.is_enabled = false;
        let credentials = vec![pinned, credential(2, 7, false)];
        assert_eq!(select_from(&credentials).unwrap().seq, 2);
    }

    #[test]
    fn test_no_capacity() {
        assert!(select_from(&[]).is_none());

        let mut only = credential(1, 0, false);
        only.is_enabled = false;
        assert!(select_from(&[only]).is_none());
    }
}
