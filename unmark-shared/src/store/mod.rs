//! Storage interfaces
//!
//! Lifecycle components never reach for a global pool. They receive the narrow
//! trait objects they need (`Arc<dyn CredentialStore>`, `Arc<dyn TaskLedger>`,
//! ...) in their constructors. Two implementations exist:
//!
//! - [`postgres::PgStore`]: the durable store used by the binaries
//! - [`memory::MemoryStore`]: an in-process store with the same atomicity
//!   guarantees, used by tests
//!
//! Neither implementation caches rows between calls; every operation reads the
//! current state.

pub mod memory;
pub mod postgres;

use crate::models::{
    Credential, Invoice, InvoiceState, NewCredential, NewInvoice, NewPackage, NewTask, Package,
    Task, User,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Storage error
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying database failure
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A row with the same key already exists
    #[error("Already exists: {0}")]
    Conflict(String),

    /// A row that must exist was not found
    #[error("Not found: {0}")]
    NotFound(String),
}

/// Storage result type alias
pub type StoreResult<T> = Result<T, StoreError>;

/// Result of an atomic credential rotation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Rotation {
    /// Credentials whose active flag was cleared
    pub deactivated: Vec<Credential>,

    /// Credential that became active, if an alternative existed
    pub activated: Option<Credential>,
}

/// Effects applied by a committed settlement
#[derive(Debug, Clone, PartialEq)]
pub struct Settled {
    /// The removed ledger entry
    pub task: Task,

    /// Owner after the debit
    pub user: User,

    /// Attempts the owner had before the debit; zero means the debit was clamped
    pub attempts_before: i32,

    /// Credential usage counter after the credit
    pub credential_usage: i64,
}

/// Credential table plus the store-wide auto-switch flag
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// All credentials in insertion order
    async fn list_credentials(&self) -> StoreResult<Vec<Credential>>;

    async fn find_credential(&self, id: i64) -> StoreResult<Option<Credential>>;

    async fn create_credential(&self, data: NewCredential) -> StoreResult<Credential>;

    /// Makes `id` the only active credential. `None` if it does not exist.
    async fn pin_credential(&self, id: i64) -> StoreResult<Option<Credential>>;

    async fn set_credential_enabled(&self, id: i64, enabled: bool)
        -> StoreResult<Option<Credential>>;

    async fn set_credential_rotation(
        &self,
        id: i64,
        participates: bool,
    ) -> StoreResult<Option<Credential>>;

    async fn auto_switch_enabled(&self) -> StoreResult<bool>;

    async fn set_auto_switch(&self, enabled: bool) -> StoreResult<bool>;

    /// Atomically applies [`crate::lifecycle::failover::plan_rotation`] to the
    /// current credential set
    async fn rotate_active(&self, failed_token: &str) -> StoreResult<Rotation>;

    /// Counts one more rejected submission and returns the run length
    async fn record_submission_failure(&self) -> StoreResult<i64>;

    /// Ends the current run of rejected submissions
    async fn reset_submission_failures(&self) -> StoreResult<()>;
}

/// The pending-job ledger
#[async_trait]
pub trait TaskLedger: Send + Sync {
    /// Records an acknowledged job; [`StoreError::Conflict`] if the job id exists
    async fn record_task(&self, data: NewTask) -> StoreResult<Task>;

    async fn find_task(&self, job_id: &str) -> StoreResult<Option<Task>>;

    async fn count_user_tasks(&self, user_id: i64) -> StoreResult<i64>;

    async fn list_tasks(&self, limit: i64, offset: i64) -> StoreResult<Vec<Task>>;

    /// Removes the task and opens a settlement for it
    ///
    /// Returns `None` when no task exists, including when a concurrent
    /// settlement already took it. At most one caller ever receives a
    /// settlement for a given job id unless that settlement is aborted.
    async fn claim_task(&self, job_id: &str) -> StoreResult<Option<Box<dyn Settlement>>>;

    /// Keeps the result of a finished job whose delivery failed
    ///
    /// Returns `false` when the task no longer exists.
    async fn attach_result(&self, job_id: &str, result_url: &str) -> StoreResult<bool>;

    /// Tasks holding an undelivered result, oldest first
    async fn list_undelivered(&self, limit: i64) -> StoreResult<Vec<Task>>;

    /// Removes and returns every task created before `cutoff`
    async fn expire_tasks(&self, cutoff: DateTime<Utc>) -> StoreResult<Vec<Task>>;
}

/// An open, uncommitted reconciliation of one task
///
/// Dropping a settlement without committing has the same effect as
/// [`Settlement::abort`].
#[async_trait]
pub trait Settlement: Send {
    /// The claimed task
    fn task(&self) -> &Task;

    /// Debits the owner, credits the credential and makes the removal durable
    async fn commit(self: Box<Self>) -> StoreResult<Settled>;

    /// Puts the task back untouched
    async fn abort(self: Box<Self>) -> StoreResult<()>;
}

/// User table
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Creates the user on first contact, returns the current row
    async fn ensure_user(&self, user_id: i64) -> StoreResult<User>;

    async fn find_user(&self, user_id: i64) -> StoreResult<Option<User>>;

    async fn list_users(&self, limit: i64, offset: i64) -> StoreResult<Vec<User>>;

    async fn count_users(&self) -> StoreResult<i64>;

    async fn grant_attempts(&self, user_id: i64, amount: i32) -> StoreResult<Option<User>>;

    async fn set_banned(&self, user_id: i64, banned: bool) -> StoreResult<Option<User>>;

    /// Grants the one-time bonus; `None` if already granted or unknown user
    async fn claim_bonus(&self, user_id: i64) -> StoreResult<Option<User>>;
}

/// Package table
#[async_trait]
pub trait PackageStore: Send + Sync {
    async fn create_package(&self, data: NewPackage) -> StoreResult<Package>;

    /// Cheapest first
    async fn list_packages(&self) -> StoreResult<Vec<Package>>;

    async fn find_package(&self, id: i64) -> StoreResult<Option<Package>>;
}

/// Invoice table
#[async_trait]
pub trait InvoiceStore: Send + Sync {
    async fn record_invoice(&self, data: NewInvoice) -> StoreResult<Invoice>;

    async fn find_invoice(&self, invoice_id: i64) -> StoreResult<Option<Invoice>>;

    async fn list_invoices(&self, state: InvoiceState, limit: i64) -> StoreResult<Vec<Invoice>>;

    /// Marks an active invoice paid and credits its owner in one unit
    ///
    /// `None` if the invoice is unknown or no longer active (already credited).
    async fn credit_invoice(&self, invoice_id: i64) -> StoreResult<Option<(Invoice, User)>>;

    /// Marks an active invoice expired
    async fn expire_invoice(&self, invoice_id: i64) -> StoreResult<Option<Invoice>>;
}

/// Everything the binaries need from storage
#[async_trait]
pub trait Store: CredentialStore + TaskLedger + UserStore + PackageStore + InvoiceStore {
    /// Cheap connectivity probe for health checks
    async fn ping(&self) -> StoreResult<()>;
}

/// Maps a unique violation to [`StoreError::Conflict`]
pub(crate) fn conflict_or_database(err: sqlx::Error, what: impl Into<String>) -> StoreError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.code().as_deref() == Some("23505") {
            return StoreError::Conflict(what.into());
        }
    }
    StoreError::Database(err)
}
