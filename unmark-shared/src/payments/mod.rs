//! Package purchases
//!
//! [`PaymentProvider`] is the invoice processor seen from this side: open an
//! invoice, ask for its status. [`purchase::PurchaseService`] combines it
//! with the invoice and user stores so that a paid invoice is credited
//! exactly once.

pub mod cryptopay;
pub mod mock;
pub mod purchase;

pub use cryptopay::CryptoPayClient;
pub use mock::MockPayments;
pub use purchase::{PurchaseError, PurchaseOutcome, PurchaseService};

use crate::models::InvoiceState;
use async_trait::async_trait;
use thiserror::Error;

/// Payment provider error
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PaymentError {
    #[error("Payment provider unreachable: {0}")]
    Transport(String),

    #[error("Payment provider rejected the request: {0}")]
    Rejected(String),

    #[error("Invoice {0} not known to the payment provider")]
    UnknownInvoice(i64),
}

/// Invoice opened at the provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedInvoice {
    pub invoice_id: i64,
    pub pay_url: String,
}

/// Invoice processor
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    /// Opens an invoice for `amount_usd`
    async fn create_invoice(
        &self,
        amount_usd: f64,
        description: &str,
        payload: &str,
    ) -> Result<CreatedInvoice, PaymentError>;

    /// Current status; statuses the provider adds later read as [`InvoiceState::Active`]
    async fn invoice_status(&self, invoice_id: i64) -> Result<InvoiceState, PaymentError>;
}
