/// Worker orchestrator
///
/// Runs the two periodic jobs that keep the store tidy:
///
/// ```text
/// Orchestrator
///   ├─> sweep loop:   WebhookReconciler retries results whose delivery failed,
///   │                 then TaskExpiry removes jobs that are still pending past the TTL
///   └─> invoice loop: PurchaseService confirms active invoices, expires stale ones
/// ```
///
/// Both loops stop when the shutdown token is cancelled. A failing iteration
/// is logged and the loop carries on at the next tick.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use unmark_worker::orchestrator::{OrchestratorConfig, WorkerOrchestrator};
/// use unmark_shared::messenger::RecordingMessenger;
/// use unmark_shared::payments::MockPayments;
/// use unmark_shared::store::memory::MemoryStore;
///
/// # async fn example() -> anyhow::Result<()> {
/// let orchestrator = WorkerOrchestrator::new(
///     Arc::new(MemoryStore::new()),
///     Arc::new(RecordingMessenger::new()),
///     Arc::new(MockPayments::new()),
///     OrchestratorConfig::default(),
/// );
///
/// let shutdown = orchestrator.shutdown_token();
/// tokio::spawn(async move {
///     let _ = tokio::signal::ctrl_c().await;
///     shutdown.cancel();
/// });
/// orchestrator.run().await?;
/// # Ok(())
/// # }
/// ```

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use unmark_shared::lifecycle::{Redelivery, TaskExpiry, WebhookReconciler};
use unmark_shared::messenger::{Messenger, OperatorAlerts};
use unmark_shared::models::InvoiceState;
use unmark_shared::payments::{PaymentProvider, PurchaseOutcome, PurchaseService};
use unmark_shared::store::{InvoiceStore, Store};

/// Worker orchestrator configuration
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Stale-task sweep period
    pub sweep_interval: Duration,

    /// Age at which a pending job is expired
    pub task_ttl: chrono::Duration,

    /// Invoice watcher period
    pub invoice_poll_interval: Duration,

    /// Age at which an unpaid invoice is expired
    pub invoice_ttl: chrono::Duration,

    /// Active invoices checked per watcher pass
    pub invoice_batch_size: i64,

    /// Undelivered results retried per sweep pass
    pub redelivery_batch_size: i64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        OrchestratorConfig {
            sweep_interval: Duration::from_secs(300),
            task_ttl: chrono::Duration::hours(6),
            invoice_poll_interval: Duration::from_secs(60),
            invoice_ttl: chrono::Duration::hours(1),
            invoice_batch_size: 100,
            redelivery_batch_size: 100,
        }
    }
}

/// What one sweep pass did
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepPass {
    pub redelivery: Redelivery,
    pub expired: usize,
}

/// What one invoice watcher pass did
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct InvoicePass {
    pub credited: usize,
    pub expired: usize,
    pub pending: usize,
    pub failed: usize,
}

/// Worker orchestrator
pub struct WorkerOrchestrator {
    reconciler: WebhookReconciler,
    expiry: TaskExpiry,
    invoices: Arc<dyn InvoiceStore>,
    purchases: PurchaseService,
    messenger: Arc<dyn Messenger>,
    config: OrchestratorConfig,

    /// Shutdown token
    shutdown_token: CancellationToken,
}

impl WorkerOrchestrator {
    pub fn new<S: Store + 'static>(
        store: Arc<S>,
        messenger: Arc<dyn Messenger>,
        payments: Arc<dyn PaymentProvider>,
        config: OrchestratorConfig,
    ) -> Self {
        WorkerOrchestrator {
            reconciler: WebhookReconciler::new(store.clone(), messenger.clone()),
            expiry: TaskExpiry::new(store.clone(), messenger.clone(), config.task_ttl),
            purchases: PurchaseService::new(store.clone(), store.clone(), store.clone(), payments),
            invoices: store,
            messenger,
            config,
            shutdown_token: CancellationToken::new(),
        }
    }

    /// Alerts the operator about results that expired undelivered
    pub fn with_alerts(mut self, alerts: OperatorAlerts) -> Self {
        self.expiry = self.expiry.with_alerts(alerts);
        self
    }

    /// Gets shutdown token
    ///
    /// Used to signal graceful shutdown from external handlers.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }

    /// Runs both loops until shutdown
    pub async fn run(&self) -> anyhow::Result<()> {
        tracing::info!(
            sweep_interval_secs = self.config.sweep_interval.as_secs(),
            task_ttl_secs = self.config.task_ttl.num_seconds(),
            invoice_poll_secs = self.config.invoice_poll_interval.as_secs(),
            "Worker orchestrator starting"
        );

        tokio::join!(self.sweep_loop(), self.invoice_loop());

        tracing::info!("Worker orchestrator shut down");
        Ok(())
    }

    async fn sweep_loop(&self) {
        let mut ticker = interval(self.config.sweep_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = self.shutdown_token.cancelled() => break,
                _ = ticker.tick() => {
                    self.sweep_once(Utc::now()).await;
                }
            }
        }
    }

    async fn invoice_loop(&self) {
        let mut ticker = interval(self.config.invoice_poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = self.shutdown_token.cancelled() => break,
                _ = ticker.tick() => {
                    self.poll_invoices_once(Utc::now()).await;
                }
            }
        }
    }

    /// Retries undelivered results, then expires stale tasks
    ///
    /// Redelivery runs first so a result that can be delivered now is settled
    /// instead of expired.
    pub async fn sweep_once(&self, now: DateTime<Utc>) -> SweepPass {
        let mut pass = SweepPass::default();

        match self
            .reconciler
            .redeliver_pending(self.config.redelivery_batch_size)
            .await
        {
            Ok(redelivery) => pass.redelivery = redelivery,
            Err(e) => tracing::error!(error = %e, "Result redelivery pass failed"),
        }

        match self.expiry.sweep(now).await {
            Ok(expired) => pass.expired = expired.len(),
            Err(e) => tracing::error!(error = %e, "Stale-task sweep failed"),
        }

        if pass != SweepPass::default() {
            tracing::info!(
                redelivered = pass.redelivery.delivered,
                redelivery_failed = pass.redelivery.failed,
                expired = pass.expired,
                "Stale-task sweep finished"
            );
        }
        pass
    }

    /// Confirms every active invoice once
    ///
    /// Invoices still unpaid past the TTL are expired. A paid invoice is
    /// credited at most once even if a user confirms it concurrently.
    pub async fn poll_invoices_once(&self, now: DateTime<Utc>) -> InvoicePass {
        let mut pass = InvoicePass::default();

        let invoices = match self
            .invoices
            .list_invoices(InvoiceState::Active, self.config.invoice_batch_size)
            .await
        {
            Ok(invoices) => invoices,
            Err(e) => {
                tracing::error!(error = %e, "Failed to list active invoices");
                return pass;
            }
        };

        for invoice in invoices {
            let invoice_id = invoice.invoice_id;

            match self.purchases.confirm_purchase(invoice_id).await {
                Ok(PurchaseOutcome::Credited { invoice, user }) => {
                    pass.credited += 1;
                    let notice = format!(
                        "✅ Payment received! +{} attempts, you now have {}.",
                        invoice.attempts, user.attempts
                    );
                    if let Err(e) = self.messenger.send_text(user.user_id, &notice).await {
                        tracing::warn!(invoice_id, error = %e, "Could not notify buyer");
                    }
                }
                Ok(PurchaseOutcome::Pending) if now - invoice.created_at > self.config.invoice_ttl => {
                    match self.purchases.expire(invoice_id).await {
                        Ok(()) => pass.expired += 1,
                        Err(e) => {
                            pass.failed += 1;
                            tracing::error!(invoice_id, error = %e, "Failed to expire invoice");
                        }
                    }
                }
                Ok(PurchaseOutcome::Pending) => pass.pending += 1,
                Ok(PurchaseOutcome::Expired) => pass.expired += 1,
                Ok(PurchaseOutcome::AlreadyCredited) => {}
                Err(e) => {
                    pass.failed += 1;
                    tracing::warn!(invoice_id, error = %e, "Invoice confirmation failed");
                }
            }
        }

        if pass != InvoicePass::default() {
            tracing::debug!(
                credited = pass.credited,
                expired = pass.expired,
                pending = pass.pending,
                failed = pass.failed,
                "Invoice watcher pass finished"
            );
        }
        pass
    }
}
