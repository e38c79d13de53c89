//! User model and database operations
//!
//! A user is a chat account identified by the messenger's numeric id. Rows are
//! created on first contact and never deleted; the entitlement counter
//! (`attempts`) is the only quantity the lifecycle debits.
//!
//! # Schema
//!
//! ```sql
//! CREATE TABLE users (
//!     user_id BIGINT PRIMARY KEY,
//!     attempts INTEGER NOT NULL DEFAULT 0 CHECK (attempts >= 0),
//!     total_donated DOUBLE PRECISION NOT NULL DEFAULT 0,
//!     total_downloaded INTEGER NOT NULL DEFAULT 0,
//!     is_banned BOOLEAN NOT NULL DEFAULT FALSE,
//!     received_free_bonus BOOLEAN NOT NULL DEFAULT FALSE,
//!     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
//! );
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgExecutor;

const USER_COLUMNS: &str = "user_id, attempts, total_donated, total_downloaded, is_banned, \
                            received_free_bonus, created_at";

/// User model representing a chat account and its entitlements
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    /// Messenger user id
    pub user_id: i64,

    /// Remaining entitlement units (one per successfully delivered job)
    pub attempts: i32,

    /// Lifetime amount paid, in USD
    pub total_donated: f64,

    /// Lifetime number of delivered artifacts
    pub total_downloaded: i32,

    /// Banned users cannot submit jobs
    pub is_banned: bool,

    /// Whether the one-time channel bonus was already granted
    pub received_free_bonus: bool,

    /// First contact
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Returns a user with default counters, as a fresh row would look
    pub fn new(user_id: i64) -> Self {
        User {
            user_id,
            attempts: 0,
            total_donated: 0.0,
            total_downloaded: 0,
            is_banned: false,
            received_free_bonus: false,
            created_at: Utc::now(),
        }
    }

    /// Inserts the user if missing and returns the current row
    ///
    /// The no-op `DO UPDATE` makes `RETURNING` yield the existing row on conflict,
    /// so this is a single idempotent statement.
    pub async fn ensure<'e, E: PgExecutor<'e>>(
        executor: E,
        user_id: i64,
    ) -> Result<Self, sqlx::Error> {
        let query = format!(
            "INSERT INTO users (user_id) VALUES ($1)
             ON CONFLICT (user_id) DO UPDATE SET user_id = EXCLUDED.user_id
             RETURNING {USER_COLUMNS}"
        );

        sqlx::query_as::<_, User>(&query)
            .bind(user_id)
            .fetch_one(executor)
            .await
    }

    /// Finds a user by id
    pub async fn find_by_id<'e, E: PgExecutor<'e>>(
        executor: E,
        user_id: i64,
    ) -> Result<Option<Self>, sqlx::Error> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE user_id = $1");

        sqlx::query_as::<_, User>(&query)
            .bind(user_id)
            .fetch_optional(executor)
            .await
    }

    /// Finds a user by id and locks the row until the surrounding transaction ends
    pub async fn find_for_update<'e, E: PgExecutor<'e>>(
        executor: E,
        user_id: i64,
    ) -> Result<Option<Self>, sqlx::Error> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE user_id = $1 FOR UPDATE");

        sqlx::query_as::<_, User>(&query)
            .bind(user_id)
            .fetch_optional(executor)
            .await
    }

    /// Lists users in order of first contact
    pub async fn list<'e, E: PgExecutor<'e>>(
        executor: E,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Self>, sqlx::Error> {
        let query = format!(
            "SELECT {USER_COLUMNS} FROM users
             ORDER BY created_at ASC, user_id ASC
             LIMIT $1 OFFSET $2"
        );

        sqlx::query_as::<_, User>(&query)
            .bind(limit)
            .bind(offset)
            .fetch_all(executor)
            .await
    }

    /// Counts all users
    pub async fn count<'e, E: PgExecutor<'e>>(executor: E) -> Result<i64, sqlx::Error> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users")
            .fetch_one(executor)
            .await?;

        Ok(count)
    }

    /// Adds `amount` attempts (administrative grant)
    ///
    /// Returns `None` if the user does not exist.
    pub async fn grant_attempts<'e, E: PgExecutor<'e>>(
        executor: E,
        user_id: i64,
        amount: i32,
    ) -> Result<Option<Self>, sqlx::Error> {
        let query = format!(
            "UPDATE users SET attempts = attempts + $2 WHERE user_id = $1 RETURNING {USER_COLUMNS}"
        );

        sqlx::query_as::<_, User>(&query)
            .bind(user_id)
            .bind(amount)
            .fetch_optional(executor)
            .await
    }

    /// Sets the banned flag
    pub async fn set_banned<'e, E: PgExecutor<'e>>(
        executor: E,
        user_id: i64,
        banned: bool,
    ) -> Result<Option<Self>, sqlx::Error> {
        let query = format!(
            "UPDATE users SET is_banned = $2 WHERE user_id = $1 RETURNING {USER_COLUMNS}"
        );

        sqlx::query_as::<_, User>(&query)
            .bind(user_id)
            .bind(banned)
            .fetch_optional(executor)
            .await
    }

    /// Grants the one-time bonus attempt
    ///
    /// The flag check and the grant are one conditional update, so concurrent
    /// claims grant at most once. Returns `None` if the bonus was already
    /// received (or the user does not exist).
    pub async fn claim_bonus<'e, E: PgExecutor<'e>>(
        executor: E,
        user_id: i64,
    ) -> Result<Option<Self>, sqlx::Error> {
        let query = format!(
            "UPDATE users
             SET attempts = attempts + 1, received_free_bonus = TRUE
             WHERE user_id = $1 AND received_free_bonus = FALSE
             RETURNING {USER_COLUMNS}"
        );

        sqlx::query_as::<_, User>(&query)
            .bind(user_id)
            .fetch_optional(executor)
            .await
    }

    /// Debits one attempt and counts one delivered artifact
    ///
    /// The counter is clamped at zero: a user may have more jobs in flight than
    /// remaining attempts, and the schema forbids negative balances.
    pub async fn consume_attempt<'e, E: PgExecutor<'e>>(
        executor: E,
        user_id: i64,
    ) -> Result<Option<Self>, sqlx::Error> {
        let query = format!(
            "UPDATE users
             SET attempts = GREATEST(attempts - 1, 0), total_downloaded = total_downloaded + 1
             WHERE user_id = $1
             RETURNING {USER_COLUMNS}"
        );

        sqlx::query_as::<_, User>(&query)
            .bind(user_id)
            .fetch_optional(executor)
            .await
    }

    /// Credits a confirmed purchase
    pub async fn credit_purchase<'e, E: PgExecutor<'e>>(
        executor: E,
        user_id: i64,
        attempts: i32,
        amount_usd: f64,
    ) -> Result<Option<Self>, sqlx::Error> {
        let query = format!(
            "UPDATE users
             SET attempts = attempts + $2, total_donated = total_donated + $3
             WHERE user_id = $1
             RETURNING {USER_COLUMNS}"
        );

        sqlx::query_as::<_, User>(&query)
            .bind(user_id)
            .bind(attempts)
            .bind(amount_usd)
            .fetch_optional(executor)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_user_defaults() {
        let user = User::new(42);
        assert_eq!(user.user_id, 42);
        assert_eq!(user.attempts, 0);
        assert_eq!(user.total_downloaded, 0);
        assert!(!user.is_banned);
        assert!(!user.received_free_bonus);
    }
}
