//! Invoice model and database operations
//!
//! An invoice records one purchase attempt against the payment provider. The
//! attempt count and amount are copied from the package when the invoice is
//! opened so later price changes never affect an open invoice.
//!
//! # State Machine
//!
//! ```text
//! active → paid      (credited exactly once)
//! active → expired
//! ```
//!
//! # Schema
//!
//! ```sql
//! CREATE TABLE invoices (
//!     invoice_id BIGINT PRIMARY KEY,
//!     user_id BIGINT NOT NULL REFERENCES users(user_id),
//!     package_id BIGINT NOT NULL REFERENCES packages(id),
//!     attempts INTEGER NOT NULL,
//!     amount_usd DOUBLE PRECISION NOT NULL,
//!     pay_url TEXT NOT NULL,
//!     status TEXT NOT NULL DEFAULT 'active',
//!     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
//!     paid_at TIMESTAMPTZ
//! );
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgExecutor;

const INVOICE_COLUMNS: &str =
    "invoice_id, user_id, package_id, attempts, amount_usd, pay_url, status, created_at, paid_at";

/// Invoice status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvoiceState {
    /// Waiting for payment
    Active,

    /// Paid and credited
    Paid,

    /// Abandoned or expired at the provider
    Expired,
}

impl InvoiceState {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceState::Active => "active",
            InvoiceState::Paid => "paid",
            InvoiceState::Expired => "expired",
        }
    }

    /// Parses the stored column value
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "active" => Some(InvoiceState::Active),
            "paid" => Some(InvoiceState::Paid),
            "expired" => Some(InvoiceState::Expired),
            _ => None,
        }
    }
}

/// Purchase attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Invoice {
    /// Provider-assigned invoice id
    pub invoice_id: i64,
    pub user_id: i64,
    pub package_id: i64,

    /// Attempts credited when paid
    pub attempts: i32,

    /// Amount charged, in USD
    pub amount_usd: f64,

    /// Where the user pays
    pub pay_url: String,

    /// Stored state, see [`Invoice::state`]
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
}

/// Input for recording an opened invoice
#[derive(Debug, Clone, PartialEq)]
pub struct NewInvoice {
    pub invoice_id: i64,
    pub user_id: i64,
    pub package_id: i64,
    pub attempts: i32,
    pub amount_usd: f64,
    pub pay_url: String,
}

impl Invoice {
    /// Typed view of `status`; unknown values read as expired
    pub fn state(&self) -> InvoiceState {
        InvoiceState::parse(&self.status).unwrap_or(InvoiceState::Expired)
    }

    /// Inserts an invoice in `active` state
    pub async fn create<'e, E: PgExecutor<'e>>(
        executor: E,
        data: NewInvoice,
    ) -> Result<Self, sqlx::Error> {
        let query = format!(
            "INSERT INTO invoices (invoice_id, user_id, package_id, attempts, amount_usd, pay_url)
             VALUES ($1, $2, $3, $4, $5, $6)
             RETURNING {INVOICE_COLUMNS}"
        );

        sqlx::query_as::<_, Invoice>(&query)
            .bind(data.invoice_id)
            .bind(data.user_id)
            .bind(data.package_id)
            .bind(data.attempts)
            .bind(data.amount_usd)
            .bind(data.pay_url)
            .fetch_one(executor)
            .await
    }

    /// Finds an invoice by provider id
    pub async fn find_by_id<'e, E: PgExecutor<'e>>(
        executor: E,
        invoice_id: i64,
    ) -> Result<Option<Self>, sqlx::Error> {
        let query = format!("SELECT {INVOICE_COLUMNS} FROM invoices WHERE invoice_id = $1");

        sqlx::query_as::<_, Invoice>(&query)
            .bind(invoice_id)
            .fetch_optional(executor)
            .await
    }

    /// Lists invoices in a given state, oldest first
    pub async fn list_by_state<'e, E: PgExecutor<'e>>(
        executor: E,
        state: InvoiceState,
        limit: i64,
    ) -> Result<Vec<Self>, sqlx::Error> {
        let query = format!(
            "SELECT {INVOICE_COLUMNS} FROM invoices
             WHERE status = $1
             ORDER BY created_at ASC
             LIMIT $2"
        );

        sqlx::query_as::<_, Invoice>(&query)
            .bind(state.as_str())
            .bind(limit)
            .fetch_all(executor)
            .await
    }

    /// Moves an `active` invoice to `target`
    ///
    /// Returns `None` when the invoice is missing or no longer active, so the
    /// caller that wins the transition is the only one that may act on it.
    pub async fn transition<'e, E: PgExecutor<'e>>(
        executor: E,
        invoice_id: i64,
        target: InvoiceState,
    ) -> Result<Option<Self>, sqlx::Error> {
        let query = format!(
            "UPDATE invoices
             SET status = $2, paid_at = CASE WHEN $2 = 'paid' THEN NOW() ELSE paid_at END
             WHERE invoice_id = $1 AND status = 'active'
             RETURNING {INVOICE_COLUMNS}"
        );

        sqlx::query_as::<_, Invoice>(&query)
            .bind(invoice_id)
            .bind(target.as_str())
            .fetch_optional(executor)
            .await
    }
}
