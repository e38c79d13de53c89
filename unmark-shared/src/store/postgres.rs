//! PostgreSQL store
//!
//! Thin adapter from the storage traits to the model queries. Operations that
//! must be atomic (rotation, pinning, settlement, invoice crediting) open a
//! transaction and pass `&mut *tx` to the same model functions the plain
//! operations run against the pool.

use super::{
    conflict_or_database, CredentialStore, InvoiceStore, PackageStore, Rotation, Settled,
    Settlement, Store, StoreError, StoreResult, TaskLedger, UserStore,
};
use crate::db::pool::health_check;
use crate::lifecycle::failover::plan_rotation;
use crate::models::{
    settings, Credential, Invoice, InvoiceState, NewCredential, NewInvoice, NewPackage, NewTask,
    Package, Task, User,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};

/// Store backed by a PostgreSQL pool
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        PgStore { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl CredentialStore for PgStore {
    async fn list_credentials(&self) -> StoreResult<Vec<Credential>> {
        Ok(Credential::list(&self.pool).await?)
    }

    async fn find_credential(&self, id: i64) -> StoreResult<Option<Credential>> {
        Ok(Credential::find_by_seq(&self.pool, id).await?)
    }

    async fn create_credential(&self, data: NewCredential) -> StoreResult<Credential> {
        let name = data.name.clone();
        Credential::create(&self.pool, data)
            .await
            .map_err(|e| conflict_or_database(e, format!("credential '{name}'")))
    }

    async fn pin_credential(&self, id: i64) -> StoreResult<Option<Credential>> {
        let mut tx = self.pool.begin().await?;

        let credentials = Credential::list_for_update(&mut *tx).await?;
        let Some(target) = credentials.iter().find(|c| c.seq == id) else {
            tx.rollback().await?;
            return Ok(None);
        };

        Credential::set_active_exclusive(&mut *tx, std::slice::from_ref(&target.token)).await?;
        let pinned = Credential::find_by_seq(&mut *tx, id).await?;
        tx.commit().await?;

        Ok(pinned)
    }

    async fn set_credential_enabled(
        &self,
        id: i64,
        enabled: bool,
    ) -> StoreResult<Option<Credential>> {
        Ok(Credential::set_enabled(&self.pool, id, enabled).await?)
    }

    async fn set_credential_rotation(
        &self,
        id: i64,
        participates: bool,
    ) -> StoreResult<Option<Credential>> {
        Ok(Credential::set_auto_switch(&self.pool, id, participates).await?)
    }

    async fn auto_switch_enabled(&self) -> StoreResult<bool> {
        Ok(settings::auto_switch_enabled(&self.pool).await?)
    }

    async fn set_auto_switch(&self, enabled: bool) -> StoreResult<bool> {
        Ok(settings::set_auto_switch(&self.pool, enabled).await?)
    }

    async fn rotate_active(&self, failed_token: &str) -> StoreResult<Rotation> {
        let mut tx = self.pool.begin().await?;

        let credentials = Credential::list_for_update(&mut *tx).await?;
        let plan = plan_rotation(&credentials, failed_token);
        Credential::set_active_exclusive(&mut *tx, plan.activate.as_slice()).await?;
        tx.commit().await?;

        let deactivated = credentials
            .iter()
            .filter(|c| plan.deactivate.contains(&c.token))
            .map(|c| Credential {
                is_active: false,
                ..c.clone()
            })
            .collect();
        let activated = plan.activate.as_ref().and_then(|token| {
            credentials
                .iter()
                .find(|c| &c.token == token)
                .map(|c| Credential {
                    is_active: true,
                    ..c.clone()
                })
        });

        Ok(Rotation {
            deactivated,
            activated,
        })
    }

    async fn record_submission_failure(&self) -> StoreResult<i64> {
        Ok(settings::record_submission_failure(&self.pool).await?)
    }

    async fn reset_submission_failures(&self) -> StoreResult<()> {
        Ok(settings::reset_submission_failures(&self.pool).await?)
    }
}

/// Open settlement: the task row is deleted inside `tx` and stays locked
/// until the transaction commits or rolls back
struct PgSettlement {
    tx: Transaction<'static, Postgres>,
    task: Task,
}

#[async_trait]
impl Settlement for PgSettlement {
    fn task(&self) -> &Task {
        &self.task
    }

    async fn commit(self: Box<Self>) -> StoreResult<Settled> {
        let PgSettlement { mut tx, task } = *self;

        let before = User::find_for_update(&mut *tx, task.user_id)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("user {}", task.user_id)))?;
        let user = User::consume_attempt(&mut *tx, task.user_id)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("user {}", task.user_id)))?;
        let credential_usage = Credential::increment_usage(&mut *tx, &task.token)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("credential for job {}", task.job_id)))?;

        tx.commit().await?;

        Ok(Settled {
            task,
            user,
            attempts_before: before.attempts,
            credential_usage,
        })
    }

    async fn abort(self: Box<Self>) -> StoreResult<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}

#[async_trait]
impl TaskLedger for PgStore {
    async fn record_task(&self, data: NewTask) -> StoreResult<Task> {
        let job_id = data.job_id.clone();
        Task::create(&self.pool, data)
            .await
            .map_err(|e| conflict_or_database(e, format!("job {job_id}")))
    }

    async fn find_task(&self, job_id: &str) -> StoreResult<Option<Task>> {
        Ok(Task::find(&self.pool, job_id).await?)
    }

    async fn count_user_tasks(&self, user_id: i64) -> StoreResult<i64> {
        Ok(Task::count_for_user(&self.pool, user_id).await?)
    }

    async fn list_tasks(&self, limit: i64, offset: i64) -> StoreResult<Vec<Task>> {
        Ok(Task::list(&self.pool, limit, offset).await?)
    }

    async fn claim_task(&self, job_id: &str) -> StoreResult<Option<Box<dyn Settlement>>> {
        let mut tx = self.pool.begin().await?;

        match Task::delete_returning(&mut *tx, job_id).await? {
            Some(task) => Ok(Some(Box::new(PgSettlement { tx, task }))),
            None => {
                tx.rollback().await?;
                Ok(None)
            }
        }
    }

    async fn attach_result(&self, job_id: &str, result_url: &str) -> StoreResult<bool> {
        Ok(Task::set_result_url(&self.pool, job_id, result_url).await?)
    }

    async fn list_undelivered(&self, limit: i64) -> StoreResult<Vec<Task>> {
        Ok(Task::list_undelivered(&self.pool, limit).await?)
    }

    async fn expire_tasks(&self, cutoff: DateTime<Utc>) -> StoreResult<Vec<Task>> {
        Ok(Task::delete_created_before(&self.pool, cutoff).await?)
    }
}

#[async_trait]
impl UserStore for PgStore {
    async fn ensure_user(&self, user_id: i64) -> StoreResult<User> {
        Ok(User::ensure(&self.pool, user_id).await?)
    }

    async fn find_user(&self, user_id: i64) -> StoreResult<Option<User>> {
        Ok(User::find_by_id(&self.pool, user_id).await?)
    }

    async fn list_users(&self, limit: i64, offset: i64) -> StoreResult<Vec<User>> {
        Ok(User::list(&self.pool, limit, offset).await?)
    }

    async fn count_users(&self) -> StoreResult<i64> {
        Ok(User::count(&self.pool).await?)
    }

    async fn grant_attempts(&self, user_id: i64, amount: i32) -> StoreResult<Option<User>> {
        Ok(User::grant_attempts(&self.pool, user_id, amount).await?)
    }

    async fn set_banned(&self, user_id: i64, banned: bool) -> StoreResult<Option<User>> {
        Ok(User::set_banned(&self.pool, user_id, banned).await?)
    }

    async fn claim_bonus(&self, user_id: i64) -> StoreResult<Option<User>> {
        Ok(User::claim_bonus(&self.pool, user_id).await?)
    }
}

#[async_trait]
impl PackageStore for PgStore {
    async fn create_package(&self, data: NewPackage) -> StoreResult<Package> {
        Ok(Package::create(&self.pool, data).await?)
    }

    async fn list_packages(&self) -> StoreResult<Vec<Package>> {
        Ok(Package::list(&self.pool).await?)
    }

    async fn find_package(&self, id: i64) -> StoreResult<Option<Package>> {
        Ok(Package::find_by_id(&self.pool, id).await?)
    }
}

#[async_trait]
impl InvoiceStore for PgStore {
    async fn record_invoice(&self, data: NewInvoice) -> StoreResult<Invoice> {
        let invoice_id = data.invoice_id;
        Invoice::create(&self.pool, data)
            .await
            .map_err(|e| conflict_or_database(e, format!("invoice {invoice_id}")))
    }

    async fn find_invoice(&self, invoice_id: i64) -> StoreResult<Option<Invoice>> {
        Ok(Invoice::find_by_id(&self.pool, invoice_id).await?)
    }

    async fn list_invoices(&self, state: InvoiceState, limit: i64) -> StoreResult<Vec<Invoice>> {
        Ok(Invoice::list_by_state(&self.pool, state, limit).await?)
    }

    async fn credit_invoice(&self, invoice_id: i64) -> StoreResult<Option<(Invoice, User)>> {
        let mut tx = self.pool.begin().await?;

        let Some(invoice) = Invoice::transition(&mut *tx, invoice_id, InvoiceState::Paid).await?
        else {
            tx.rollback().await?;
            return Ok(None);
        };

        let user = User::credit_purchase(&mut *tx, invoice.user_id, invoice.attempts, invoice.amount_usd)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("user {}", invoice.user_id)))?;

        tx.commit().await?;
        Ok(Some((invoice, user)))
    }

    async fn expire_invoice(&self, invoice_id: i64) -> StoreResult<Option<Invoice>> {
        Ok(Invoice::transition(&self.pool, invoice_id, InvoiceState::Expired).await?)
    }
}

#[async_trait]
impl Store for PgStore {
    async fn ping(&self) -> StoreResult<()> {
        Ok(health_check(&self.pool).await?)
    }
}
