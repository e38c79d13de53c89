//! Task ledger model and database operations
//!
//! A task row correlates a job the provider has accepted with the user who
//! asked for it and the credential that paid for the call. The provider's job
//! id is the primary key, so at most one row exists per job.
//!
//! # Lifecycle
//!
//! ```text
//! provider acknowledges job ──► INSERT (exactly once)
//! success webhook           ──► DELETE inside the settlement transaction
//! delivery failed           ──► UPDATE result_url, worker retries delivery
//! no webhook within TTL     ──► DELETE by the expiry sweep
//! ```
//!
//! # Schema
//!
//! ```sql
//! CREATE TABLE tasks (
//!     job_id TEXT PRIMARY KEY,
//!     user_id BIGINT NOT NULL REFERENCES users(user_id),
//!     token TEXT NOT NULL REFERENCES credentials(token),
//!     video_url TEXT NOT NULL,
//!     result_url TEXT,
//!     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
//! );
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgExecutor;

const TASK_COLUMNS: &str = "job_id, user_id, token, video_url, result_url, created_at";

/// Pending job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Task {
    /// Provider-assigned job id
    pub job_id: String,

    /// Owner
    pub user_id: i64,

    /// Credential the job was submitted with
    #[serde(skip_serializing)]
    pub token: String,

    /// Source video, kept for user-facing notices
    pub video_url: String,

    /// Finished result that could not be delivered yet
    pub result_url: Option<String>,

    /// When the provider acknowledged the job
    pub created_at: DateTime<Utc>,
}

/// Input for recording an acknowledged job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTask {
    pub job_id: String,
    pub user_id: i64,
    pub token: String,
    pub video_url: String,
}

impl Task {
    /// Inserts a task row
    ///
    /// # Errors
    ///
    /// Fails with a unique-violation database error if the job id is already recorded.
    pub async fn create<'e, E: PgExecutor<'e>>(
        executor: E,
        data: NewTask,
    ) -> Result<Self, sqlx::Error> {
        let query = format!(
            "INSERT INTO tasks (job_id, user_id, token, video_url)
             VALUES ($1, $2, $3, $4)
             RETURNING {TASK_COLUMNS}"
        );

        sqlx::query_as::<_, Task>(&query)
            .bind(data.job_id)
            .bind(data.user_id)
            .bind(data.token)
            .bind(data.video_url)
            .fetch_one(executor)
            .await
    }

    /// Finds a task by job id
    pub async fn find<'e, E: PgExecutor<'e>>(
        executor: E,
        job_id: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        let query = format!("SELECT {TASK_COLUMNS} FROM tasks WHERE job_id = $1");

        sqlx::query_as::<_, Task>(&query)
            .bind(job_id)
            .fetch_optional(executor)
            .await
    }

    /// Deletes a task and returns it
    ///
    /// Inside a transaction the deleted row stays locked until commit or
    /// rollback; a concurrent delete of the same job id waits and then
    /// observes zero rows. This is what makes the delete the admission gate
    /// for settlement.
    pub async fn delete_returning<'e, E: PgExecutor<'e>>(
        executor: E,
        job_id: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        let query = format!("DELETE FROM tasks WHERE job_id = $1 RETURNING {TASK_COLUMNS}");

        sqlx::query_as::<_, Task>(&query)
            .bind(job_id)
            .fetch_optional(executor)
            .await
    }

    /// Counts pending jobs owned by a user
    pub async fn count_for_user<'e, E: PgExecutor<'e>>(
        executor: E,
        user_id: i64,
    ) -> Result<i64, sqlx::Error> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM tasks WHERE user_id = $1")
            .bind(user_id)
            .fetch_one(executor)
            .await?;

        Ok(count)
    }

    /// Lists pending jobs, oldest first
    pub async fn list<'e, E: PgExecutor<'e>>(
        executor: E,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Self>, sqlx::Error> {
        let query = format!(
            "SELECT {TASK_COLUMNS} FROM tasks ORDER BY created_at ASC, job_id ASC LIMIT $1 OFFSET $2"
        );

        sqlx::query_as::<_, Task>(&query)
            .bind(limit)
            .bind(offset)
            .fetch_all(executor)
            .await
    }

    /// Stores the result of a finished job; `false` if the task is gone
    pub async fn set_result_url<'e, E: PgExecutor<'e>>(
        executor: E,
        job_id: &str,
        result_url: &str,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE tasks SET result_url = $2 WHERE job_id = $1")
            .bind(job_id)
            .bind(result_url)
            .execute(executor)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Lists tasks holding an undelivered result, oldest first
    pub async fn list_undelivered<'e, E: PgExecutor<'e>>(
        executor: E,
        limit: i64,
    ) -> Result<Vec<Self>, sqlx::Error> {
        let query = format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE result_url IS NOT NULL
             ORDER BY created_at ASC, job_id ASC LIMIT $1"
        );

        sqlx::query_as::<_, Task>(&query)
            .bind(limit)
            .fetch_all(executor)
            .await
    }

    /// Deletes and returns every task created before `cutoff`
    pub async fn delete_created_before<'e, E: PgExecutor<'e>>(
        executor: E,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Self>, sqlx::Error> {
        let query = format!("DELETE FROM tasks WHERE created_at < $1 RETURNING {TASK_COLUMNS}");

        sqlx::query_as::<_, Task>(&query)
            .bind(cutoff)
            .fetch_all(executor)
            .await
    }
}
