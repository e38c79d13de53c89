//! Credential model and database operations
//!
//! Credentials are the upstream provider API keys. The secret itself is the
//! primary key; `seq` is a stable, non-secret handle used by the admin API and
//! as the deterministic tie-breaker in selection and rotation.
//!
//! # Flags
//!
//! - `is_enabled`: disabled credentials are never selected or rotated to
//! - `is_active`: manually pinned (or rotated-to) credential, preferred by selection
//! - `is_auto_switch`: whether the credential takes part in automatic rotation
//!
//! The store-wide auto-switch toggle lives in [`crate::models::settings`].
//!
//! # Schema
//!
//! ```sql
//! CREATE TABLE credentials (
//!     token TEXT PRIMARY KEY,
//!     seq BIGSERIAL NOT NULL UNIQUE,
//!     name TEXT NOT NULL,
//!     usage_count BIGINT NOT NULL DEFAULT 0,
//!     is_enabled BOOLEAN NOT NULL DEFAULT TRUE,
//!     is_active BOOLEAN NOT NULL DEFAULT FALSE,
//!     is_auto_switch BOOLEAN NOT NULL DEFAULT TRUE,
//!     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
//! );
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgExecutor;

const CREDENTIAL_COLUMNS: &str =
    "token, seq, name, usage_count, is_enabled, is_active, is_auto_switch, created_at";

/// Upstream provider credential
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Credential {
    /// Secret bearer value
    #[serde(skip_serializing)]
    pub token: String,

    /// Insertion order, doubles as the public id
    pub seq: i64,

    /// Human label
    pub name: String,

    /// Number of jobs completed with this credential
    pub usage_count: i64,

    /// Whether the credential may be used at all
    pub is_enabled: bool,

    /// Pinned as the preferred credential
    pub is_active: bool,

    /// Takes part in automatic rotation
    pub is_auto_switch: bool,

    /// When the credential was added
    pub created_at: DateTime<Utc>,
}

/// Input for registering a credential
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewCredential {
    /// Secret bearer value
    pub token: String,

    /// Human label
    pub name: String,

    /// Whether rotation may switch to this credential
    #[serde(default = "default_auto_switch")]
    pub is_auto_switch: bool,
}

fn default_auto_switch() -> bool {
    true
}

impl Credential {
    /// Returns the token with everything but the first and last four characters hidden
    ///
    /// Used wherever a credential must be identifiable in logs or admin output.
    /// Tokens shorter than 12 characters are hidden entirely, so at most two
    /// thirds of a token is ever shown.
    pub fn masked_token(&self) -> String {
        let chars: Vec<char> = self.token.chars().collect();
        if chars.len() < 12 {
            return "*".repeat(chars.len());
        }

        let head: String = chars[..4].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{head}…{tail}")
    }

    /// Whether selection and rotation may consider this credential
    pub fn is_usable(&self) -> bool {
        self.is_enabled
    }

    /// Inserts a new credential
    ///
    /// # Errors
    ///
    /// Fails with a unique-violation database error if the token already exists.
    pub async fn create<'e, E: PgExecutor<'e>>(
        executor: E,
        data: NewCredential,
    ) -> Result<Self, sqlx::Error> {
        let query = format!(
            "INSERT INTO credentials (token, name, is_auto_switch)
             VALUES ($1, $2, $3)
             RETURNING {CREDENTIAL_COLUMNS}"
        );

        sqlx::query_as::<_, Credential>(&query)
            .bind(data.token)
            .bind(data.name)
            .bind(data.is_auto_switch)
            .fetch_one(executor)
            .await
    }

    /// Lists all credentials in insertion order
    pub async fn list<'e, E: PgExecutor<'e>>(executor: E) -> Result<Vec<Self>, sqlx::Error> {
        let query = format!("SELECT {CREDENTIAL_COLUMNS} FROM credentials ORDER BY seq ASC");

        sqlx::query_as::<_, Credential>(&query)
            .fetch_all(executor)
            .await
    }

    /// Lists all credentials and locks them until the surrounding transaction ends
    ///
    /// Rotation and pinning take these locks so two concurrent flag changes
    /// serialize instead of leaving two active rows behind.
    pub async fn list_for_update<'e, E: PgExecutor<'e>>(
        executor: E,
    ) -> Result<Vec<Self>, sqlx::Error> {
        let query = format!(
            "SELECT {CREDENTIAL_COLUMNS} FROM credentials ORDER BY seq ASC FOR UPDATE"
        );

        sqlx::query_as::<_, Credential>(&query)
            .fetch_all(executor)
            .await
    }

    /// Finds a credential by its public id
    pub async fn find_by_seq<'e, E: PgExecutor<'e>>(
        executor: E,
        seq: i64,
    ) -> Result<Option<Self>, sqlx::Error> {
        let query = format!("SELECT {CREDENTIAL_COLUMNS} FROM credentials WHERE seq = $1");

        sqlx::query_as::<_, Credential>(&query)
            .bind(seq)
            .fetch_optional(executor)
            .await
    }

    /// Sets `is_active` on exactly the given tokens and clears it everywhere else
    pub async fn set_active_exclusive<'e, E: PgExecutor<'e>>(
        executor: E,
        active_tokens: &[String],
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE credentials
             SET is_active = (token = ANY($1))
             WHERE is_active <> (token = ANY($1))",
        )
        .bind(active_tokens)
        .execute(executor)
        .await?;

        Ok(result.rows_affected())
    }

    /// Enables or disables a credential; disabling also unpins it
    pub async fn set_enabled<'e, E: PgExecutor<'e>>(
        executor: E,
        seq: i64,
        enabled: bool,
    ) -> Result<Option<Self>, sqlx::Error> {
        let query = format!(
            "UPDATE credentials
             SET is_enabled = $2, is_active = is_active AND $2
             WHERE seq = $1
             RETURNING {CREDENTIAL_COLUMNS}"
        );

        sqlx::query_as::<_, Credential>(&query)
            .bind(seq)
            .bind(enabled)
            .fetch_optional(executor)
            .await
    }

    /// Sets whether rotation may switch to this credential
    pub async fn set_auto_switch<'e, E: PgExecutor<'e>>(
        executor: E,
        seq: i64,
        participates: bool,
    ) -> Result<Option<Self>, sqlx::Error> {
        let query = format!(
            "UPDATE credentials SET is_auto_switch = $2 WHERE seq = $1 RETURNING {CREDENTIAL_COLUMNS}"
        );

        sqlx::query_as::<_, Credential>(&query)
            .bind(seq)
            .bind(participates)
            .fetch_optional(executor)
            .await
    }

    /// Counts one completed job against the credential
    pub async fn increment_usage<'e, E: PgExecutor<'e>>(
        executor: E,
        token: &str,
    ) -> Result<Option<i64>, sqlx::Error> {
        sqlx::query_scalar(
            "UPDATE credentials SET usage_count = usage_count + 1 WHERE token = $1 RETURNING usage_count",
        )
        .bind(token)
        .fetch_optional(executor)
        .await
    }
}
