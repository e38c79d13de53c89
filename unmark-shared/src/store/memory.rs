//! In-process store
//!
//! Keeps every table behind one mutex. Each trait operation takes the lock
//! once, so operations are atomic with respect to each other exactly like the
//! transactional PostgreSQL paths. The lock is never held across an `.await`.
//!
//! A claimed task is removed from the map immediately; committing applies the
//! debit and credit, aborting (or dropping the settlement) puts the task back.

use super::{
    CredentialStore, InvoiceStore, PackageStore, Rotation, Settled, Settlement, Store, StoreError,
    StoreResult, TaskLedger, UserStore,
};
use crate::lifecycle::failover::plan_rotation;
use crate::models::{
    Credential, Invoice, InvoiceState, NewCredential, NewInvoice, NewPackage, NewTask, Package,
    Task, User,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug)]
struct Inner {
    users: BTreeMap<i64, User>,
    credentials: Vec<Credential>,
    next_seq: i64,
    auto_switch: bool,
    consecutive_failures: i64,
    tasks: HashMap<String, Task>,
    packages: Vec<Package>,
    next_package_id: i64,
    invoices: BTreeMap<i64, Invoice>,
}

impl Default for Inner {
    fn default() -> Self {
        Inner {
            users: BTreeMap::new(),
            credentials: Vec::new(),
            next_seq: 1,
            auto_switch: true,
            consecutive_failures: 0,
            tasks: HashMap::new(),
            packages: Vec::new(),
            next_package_id: 1,
            invoices: BTreeMap::new(),
        }
    }
}

impl Inner {
    fn credential_mut(&mut self, seq: i64) -> Option<&mut Credential> {
        self.credentials.iter_mut().find(|c| c.seq == seq)
    }
}

/// Store that lives in process memory
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

fn lock(inner: &Mutex<Inner>) -> MutexGuard<'_, Inner> {
    // A panic while holding the lock leaves the tables consistent: every
    // mutation below is a single assignment or push.
    inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn guard(&self) -> MutexGuard<'_, Inner> {
        lock(&self.inner)
    }

    /// Inserts or replaces a user row as-is
    pub fn put_user(&self, user: User) {
        self.guard().users.insert(user.user_id, user);
    }

    /// Overwrites a credential's usage counter
    pub fn set_usage(&self, token: &str, usage_count: i64) {
        if let Some(credential) = self.guard().credentials.iter_mut().find(|c| c.token == token) {
            credential.usage_count = usage_count;
        }
    }

    /// Backdates a pending task
    pub fn set_task_created_at(&self, job_id: &str, created_at: DateTime<Utc>) {
        if let Some(task) = self.guard().tasks.get_mut(job_id) {
            task.created_at = created_at;
        }
    }

    /// Number of pending tasks
    pub fn task_count(&self) -> usize {
        self.guard().tasks.len()
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn list_credentials(&self) -> StoreResult<Vec<Credential>> {
        Ok(self.guard().credentials.clone())
    }

    async fn find_credential(&self, id: i64) -> StoreResult<Option<Credential>> {
        Ok(self.guard().credentials.iter().find(|c| c.seq == id).cloned())
    }

    async fn create_credential(&self, data: NewCredential) -> StoreResult<Credential> {
        let mut inner = self.guard();
        if inner.credentials.iter().any(|c| c.token == data.token) {
            return Err(StoreError::Conflict(format!("credential '{}'", data.name)));
        }

        let credential = Credential {
            token: data.token,
            seq: inner.next_seq,
            name: data.name,
            usage_count: 0,
            is_enabled: true,
            is_active: false,
            is_auto_switch: data.is_auto_switch,
            created_at: Utc::now(),
        };
        inner.next_seq += 1;
        inner.credentials.push(credential.clone());

        Ok(credential)
    }

    async fn pin_credential(&self, id: i64) -> StoreResult<Option<Credential>> {
        let mut inner = self.guard();
        if !inner.credentials.iter().any(|c| c.seq == id) {
            return Ok(None);
        }

        for credential in inner.credentials.iter_mut() {
            credential.is_active = credential.seq == id;
        }
        Ok(inner.credentials.iter().find(|c| c.seq == id).cloned())
    }

    async fn set_credential_enabled(
        &self,
        id: i64,
        enabled: bool,
    ) -> StoreResult<Option<Credential>> {
        let mut inner = self.guard();
        Ok(inner.credential_mut(id).map(|credential| {
            credential.is_enabled = enabled;
            credential.is_active &= enabled;
            credential.clone()
        }))
    }

    async fn set_credential_rotation(
        &self,
        id: i64,
        participates: bool,
    ) -> StoreResult<Option<Credential>> {
        let mut inner = self.guard();
        Ok(inner.credential_mut(id).map(|credential| {
            credential.is_auto_switch = participates;
            credential.clone()
        }))
    }

    async fn auto_switch_enabled(&self) -> StoreResult<bool> {
        Ok(self.guard().auto_switch)
    }

    async fn set_auto_switch(&self, enabled: bool) -> StoreResult<bool> {
        self.guard().auto_switch = enabled;
        Ok(enabled)
    }

    async fn rotate_active(&self, failed_token: &str) -> StoreResult<Rotation> {
        let mut inner = self.guard();
        let plan = plan_rotation(&inner.credentials, failed_token);

        let mut rotation = Rotation::default();
        for credential in inner.credentials.iter_mut() {
            let activate = plan.activate.as_deref() == Some(credential.token.as_str());
            if credential.is_active && !activate {
                credential.is_active = false;
                rotation.deactivated.push(credential.clone());
            }
            if activate {
                credential.is_active = true;
                rotation.activated = Some(credential.clone());
            }
        }

        Ok(rotation)
    }

    async fn record_submission_failure(&self) -> StoreResult<i64> {
        let mut inner = self.guard();
        inner.consecutive_failures += 1;
        Ok(inner.consecutive_failures)
    }

    async fn reset_submission_failures(&self) -> StoreResult<()> {
        self.guard().consecutive_failures = 0;
        Ok(())
    }
}

struct MemorySettlement {
    inner: Arc<Mutex<Inner>>,
    task: Task,
    open: bool,
}

#[async_trait]
impl Settlement for MemorySettlement {
    fn task(&self) -> &Task {
        &self.task
    }

    async fn commit(self: Box<Self>) -> StoreResult<Settled> {
        let mut this = self;
        let task = this.task.clone();

        let mut inner = lock(&this.inner);
        let credential_index = inner
            .credentials
            .iter()
            .position(|c| c.token == task.token)
            .ok_or_else(|| StoreError::NotFound(format!("credential for job {}", task.job_id)))?;
        let user = inner
            .users
            .get_mut(&task.user_id)
            .ok_or_else(|| StoreError::NotFound(format!("user {}", task.user_id)))?;

        let attempts_before = user.attempts;
        user.attempts = (user.attempts - 1).max(0);
        user.total_downloaded += 1;
        let user = user.clone();

        let credential = &mut inner.credentials[credential_index];
        credential.usage_count += 1;
        let credential_usage = credential.usage_count;
        drop(inner);

        this.open = false;
        Ok(Settled {
            task,
            user,
            attempts_before,
            credential_usage,
        })
    }

    async fn abort(self: Box<Self>) -> StoreResult<()> {
        // Drop puts the task back.
        drop(self);
        Ok(())
    }
}

impl Drop for MemorySettlement {
    fn drop(&mut self) {
        if self.open {
            lock(&self.inner)
                .tasks
                .insert(self.task.job_id.clone(), self.task.clone());
        }
    }
}

#[async_trait]
impl TaskLedger for MemoryStore {
    async fn record_task(&self, data: NewTask) -> StoreResult<Task> {
        let mut inner = self.guard();
        if inner.tasks.contains_key(&data.job_id) {
            return Err(StoreError::Conflict(format!("job {}", data.job_id)));
        }

        let task = Task {
            job_id: data.job_id,
            user_id: data.user_id,
            token: data.token,
            video_url: data.video_url,
            result_url: None,
            created_at: Utc::now(),
        };
        inner.tasks.insert(task.job_id.clone(), task.clone());

        Ok(task)
    }

    async fn find_task(&self, job_id: &str) -> StoreResult<Option<Task>> {
        Ok(self.guard().tasks.get(job_id).cloned())
    }

    async fn count_user_tasks(&self, user_id: i64) -> StoreResult<i64> {
        let count = self
            .guard()
            .tasks
            .values()
            .filter(|t| t.user_id == user_id)
            .count();
        Ok(count as i64)
    }

    async fn list_tasks(&self, limit: i64, offset: i64) -> StoreResult<Vec<Task>> {
        let mut tasks: Vec<Task> = self.guard().tasks.values().cloned().collect();
        tasks.sort_by(|a, b| (a.created_at, &a.job_id).cmp(&(b.created_at, &b.job_id)));

        Ok(tasks
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn claim_task(&self, job_id: &str) -> StoreResult<Option<Box<dyn Settlement>>> {
        let task = self.guard().tasks.remove(job_id);

        Ok(task.map(|task| {
            Box::new(MemorySettlement {
                inner: Arc::clone(&self.inner),
                task,
                open: true,
            }) as Box<dyn Settlement>
        }))
    }

    async fn attach_result(&self, job_id: &str, result_url: &str) -> StoreResult<bool> {
        Ok(self
            .guard()
            .tasks
            .get_mut(job_id)
            .map(|task| task.result_url = Some(result_url.to_string()))
            .is_some())
    }

    async fn list_undelivered(&self, limit: i64) -> StoreResult<Vec<Task>> {
        let mut tasks: Vec<Task> = self
            .guard()
            .tasks
            .values()
            .filter(|t| t.result_url.is_some())
            .cloned()
            .collect();
        tasks.sort_by(|a, b| (a.created_at, &a.job_id).cmp(&(b.created_at, &b.job_id)));
        tasks.truncate(limit.max(0) as usize);

        Ok(tasks)
    }

    async fn expire_tasks(&self, cutoff: DateTime<Utc>) -> StoreResult<Vec<Task>> {
        let mut inner = self.guard();
        let expired: Vec<String> = inner
            .tasks
            .values()
            .filter(|t| t.created_at < cutoff)
            .map(|t| t.job_id.clone())
            .collect();

        Ok(expired
            .iter()
            .filter_map(|job_id| inner.tasks.remove(job_id))
            .collect())
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn ensure_user(&self, user_id: i64) -> StoreResult<User> {
        Ok(self
            .guard()
            .users
            .entry(user_id)
            .or_insert_with(|| User::new(user_id))
            .clone())
    }

    async fn find_user(&self, user_id: i64) -> StoreResult<Option<User>> {
        Ok(self.guard().users.get(&user_id).cloned())
    }

    async fn list_users(&self, limit: i64, offset: i64) -> StoreResult<Vec<User>> {
        let mut users: Vec<User> = self.guard().users.values().cloned().collect();
        users.sort_by_key(|u| (u.created_at, u.user_id));

        Ok(users
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn count_users(&self) -> StoreResult<i64> {
        Ok(self.guard().users.len() as i64)
    }

    async fn grant_attempts(&self, user_id: i64, amount: i32) -> StoreResult<Option<User>> {
        Ok(self.guard().users.get_mut(&user_id).map(|user| {
            user.attempts += amount;
            user.clone()
        }))
    }

    async fn set_banned(&self, user_id: i64, banned: bool) -> StoreResult<Option<User>> {
        Ok(self.guard().users.get_mut(&user_id).map(|user| {
            user.is_banned = banned;
            user.clone()
        }))
    }

    async fn claim_bonus(&self, user_id: i64) -> StoreResult<Option<User>> {
        Ok(self
            .guard()
            .users
            .get_mut(&user_id)
            .filter(|user| !user.received_free_bonus)
            .map(|user| {
                user.received_free_bonus = true;
                user.attempts += 1;
                user.clone()
            }))
    }
}

#[async_trait]
impl PackageStore for MemoryStore {
    async fn create_package(&self, data: NewPackage) -> StoreResult<Package> {
        let mut inner = self.guard();
        let package = Package {
            id: inner.next_package_id,
            name: data.name,
            attempts: data.attempts,
            price_usd: data.price_usd,
            created_at: Utc::now(),
        };
        inner.next_package_id += 1;
        inner.packages.push(package.clone());

        Ok(package)
    }

    async fn list_packages(&self) -> StoreResult<Vec<Package>> {
        let mut packages = self.guard().packages.clone();
        packages.sort_by(|a, b| {
            a.price_usd
                .total_cmp(&b.price_usd)
                .then(a.id.cmp(&b.id))
        });
        Ok(packages)
    }

    async fn find_package(&self, id: i64) -> StoreResult<Option<Package>> {
        Ok(self.guard().packages.iter().find(|p| p.id == id).cloned())
    }
}

#[async_trait]
impl InvoiceStore for MemoryStore {
    async fn record_invoice(&self, data: NewInvoice) -> StoreResult<Invoice> {
        let mut inner = self.guard();
        if inner.invoices.contains_key(&data.invoice_id) {
            return Err(StoreError::Conflict(format!("invoice {}", data.invoice_id)));
        }

        let invoice = Invoice {
            invoice_id: data.invoice_id,
            user_id: data.user_id,
            package_id: data.package_id,
            attempts: data.attempts,
            amount_usd: data.amount_usd,
            pay_url: data.pay_url,
            status: InvoiceState::Active.as_str().to_string(),
            created_at: Utc::now(),
            paid_at: None,
        };
        inner.invoices.insert(invoice.invoice_id, invoice.clone());

        Ok(invoice)
    }

    async fn find_invoice(&self, invoice_id: i64) -> StoreResult<Option<Invoice>> {
        Ok(self.guard().invoices.get(&invoice_id).cloned())
    }

    async fn list_invoices(&self, state: InvoiceState, limit: i64) -> StoreResult<Vec<Invoice>> {
        let mut invoices: Vec<Invoice> = self
            .guard()
            .invoices
            .values()
            .filter(|i| i.state() == state)
            .cloned()
            .collect();
        invoices.sort_by_key(|i| i.created_at);
        invoices.truncate(limit.max(0) as usize);

        Ok(invoices)
    }

    async fn credit_invoice(&self, invoice_id: i64) -> StoreResult<Option<(Invoice, User)>> {
        let mut inner = self.guard();
        let Some(invoice) = inner
            .invoices
            .get(&invoice_id)
            .filter(|i| i.state() == InvoiceState::Active)
            .cloned()
        else {
            return Ok(None);
        };

        let user = inner
            .users
            .get_mut(&invoice.user_id)
            .ok_or_else(|| StoreError::NotFound(format!("user {}", invoice.user_id)))?;
        user.attempts += invoice.attempts;
        user.total_donated += invoice.amount_usd;
        let user = user.clone();

        let invoice = Invoice {
            status: InvoiceState::Paid.as_str().to_string(),
            paid_at: Some(Utc::now()),
            ..invoice
        };
        inner.invoices.insert(invoice_id, invoice.clone());

        Ok(Some((invoice, user)))
    }

    async fn expire_invoice(&self, invoice_id: i64) -> StoreResult<Option<Invoice>> {
        Ok(self
            .guard()
            .invoices
            .get_mut(&invoice_id)
            .filter(|i| i.state() == InvoiceState::Active)
            .map(|invoice| {
                invoice.status = InvoiceState::Expired.as_str().to_string();
                invoice.clone()
            }))
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }
}
