//! Purchase flow
//!
//! ```text
//! start_purchase   package ──► provider invoice ──► invoices row (active)
//! confirm_purchase provider says paid    ──► active → paid + credit (one transaction)
//!                  provider says expired ──► active → expired
//!                  anything else         ──► pending, nothing changes
//! ```
//!
//! Confirmation may run from the chat command and the worker at the same
//! time; the `active → paid` transition admits only one of them.

use super::{PaymentError, PaymentProvider};
use crate::models::{Invoice, InvoiceState, NewInvoice, User};
use crate::store::{InvoiceStore, PackageStore, StoreError, UserStore};
use std::sync::Arc;
use thiserror::Error;

/// Purchase flow error
#[derive(Debug, Error)]
pub enum PurchaseError {
    #[error("Package {0} does not exist")]
    UnknownPackage(i64),

    #[error("Invoice {0} does not exist")]
    UnknownInvoice(i64),

    #[error(transparent)]
    Payment(#[from] PaymentError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Result of a confirmation
#[derive(Debug, Clone, PartialEq)]
pub enum PurchaseOutcome {
    /// This call credited the invoice
    Credited { invoice: Invoice, user: User },

    /// The invoice was credited before
    AlreadyCredited,

    /// Not paid yet
    Pending,

    /// The invoice expired unpaid
    Expired,
}

/// Opens and confirms package purchases
#[derive(Clone)]
pub struct PurchaseService {
    packages: Arc<dyn PackageStore>,
    invoices: Arc<dyn InvoiceStore>,
    users: Arc<dyn UserStore>,
    payments: Arc<dyn PaymentProvider>,
}

impl PurchaseService {
    pub fn new(
        packages: Arc<dyn PackageStore>,
        invoices: Arc<dyn InvoiceStore>,
        users: Arc<dyn UserStore>,
        payments: Arc<dyn PaymentProvider>,
    ) -> Self {
        PurchaseService {
            packages,
            invoices,
            users,
            payments,
        }
    }

    /// Opens an invoice for `package_id` on behalf of `user_id`
    pub async fn start_purchase(&self, user_id: i64, package_id: i64) -> Result<Invoice, PurchaseError> {
        let package = self
            .packages
            .find_package(package_id)
            .await?
            .ok_or(PurchaseError::UnknownPackage(package_id))?;
        self.users.ensure_user(user_id).await?;

        let created = self
            .payments
            .create_invoice(
                package.price_usd,
                &format!("{} ({} attempts)", package.name, package.attempts),
                &format!("{user_id}:{package_id}"),
            )
            .await?;

        let invoice = self
            .invoices
            .record_invoice(NewInvoice {
                invoice_id: created.invoice_id,
                user_id,
                package_id,
                attempts: package.attempts,
                amount_usd: package.price_usd,
                pay_url: created.pay_url,
            })
            .await?;

        tracing::info!(
            user_id,
            package_id,
            invoice_id = invoice.invoice_id,
            amount_usd = invoice.amount_usd,
            "Opened invoice"
        );
        Ok(invoice)
    }

    /// Confirms an invoice the user says they paid; other users' invoices read as unknown
    pub async fn confirm_owned(
        &self,
        user_id: i64,
        invoice_id: i64,
    ) -> Result<PurchaseOutcome, PurchaseError> {
        match self.invoices.find_invoice(invoice_id).await? {
            Some(invoice) if invoice.user_id == user_id => self.confirm(invoice).await,
            _ => Err(PurchaseError::UnknownInvoice(invoice_id)),
        }
    }

    /// Asks the provider about an invoice and credits it if paid
    pub async fn confirm_purchase(&self, invoice_id: i64) -> Result<PurchaseOutcome, PurchaseError> {
        let invoice = self
            .invoices
            .find_invoice(invoice_id)
            .await?
            .ok_or(PurchaseError::UnknownInvoice(invoice_id))?;

        self.confirm(invoice).await
    }

    async fn confirm(&self, invoice: Invoice) -> Result<PurchaseOutcome, PurchaseError> {
        match invoice.state() {
            InvoiceState::Paid => return Ok(PurchaseOutcome::AlreadyCredited),
            InvoiceState::Expired => return Ok(PurchaseOutcome::Expired),
            InvoiceState::Active => {}
        }

        match self.payments.invoice_status(invoice.invoice_id).await? {
            InvoiceState::Paid => match self.invoices.credit_invoice(invoice.invoice_id).await? {
                Some((invoice, user)) => {
                    tracing::info!(
                        user_id = user.user_id,
                        invoice_id = invoice.invoice_id,
                        attempts = invoice.attempts,
                        "Credited paid invoice"
                    );
                    Ok(PurchaseOutcome::Credited { invoice, user })
                }
                None => Ok(PurchaseOutcome::AlreadyCredited),
            },
            InvoiceState::Expired => {
                self.expire(invoice.invoice_id).await?;
                Ok(PurchaseOutcome::Expired)
            }
            InvoiceState::Active => Ok(PurchaseOutcome::Pending),
        }
    }

    /// Marks an unpaid invoice expired; a no-op if it is no longer active
    pub async fn expire(&self, invoice_id: i64) -> Result<(), PurchaseError> {
        if self.invoices.expire_invoice(invoice_id).await?.is_some() {
            tracing::info!(invoice_id, "Invoice expired unpaid");
        }
        Ok(())
    }
}
