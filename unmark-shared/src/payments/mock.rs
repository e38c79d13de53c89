//! In-memory payment provider for tests

use super::{CreatedInvoice, PaymentError, PaymentProvider};
use crate::models::InvoiceState;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

#[derive(Debug)]
struct State {
    next_id: i64,
    statuses: HashMap<i64, InvoiceState>,
    created: Vec<(i64, f64, String)>,
}

/// Payment provider whose invoice statuses are set by the test
#[derive(Debug)]
pub struct MockPayments {
    state: Mutex<State>,
}

impl Default for MockPayments {
    fn default() -> Self {
        MockPayments {
            state: Mutex::new(State {
                next_id: 1000,
                statuses: HashMap::new(),
                created: Vec::new(),
            }),
        }
    }
}

impl MockPayments {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Sets what the provider reports for an invoice
    pub fn set_status(&self, invoice_id: i64, status: InvoiceState) {
        self.state().statuses.insert(invoice_id, status);
    }

    /// `(invoice_id, amount_usd, payload)` of every invoice opened
    pub fn created(&self) -> Vec<(i64, f64, String)> {
        self.state().created.clone()
    }
}

#[async_trait]
impl PaymentProvider for MockPayments {
    async fn create_invoice(
        &self,
        amount_usd: f64,
        _description: &str,
        payload: &str,
    ) -> Result<CreatedInvoice, PaymentError> {
        let mut state = self.state();
        let invoice_id = state.next_id;
        state.next_id += 1;
        state.statuses.insert(invoice_id, InvoiceState::Active);
        state.created.push((invoice_id, amount_usd, payload.to_string()));

        Ok(CreatedInvoice {
            invoice_id,
            pay_url: format!("https://pay.example/invoice/{invoice_id}"),
        })
    }

    async fn invoice_status(&self, invoice_id: i64) -> Result<InvoiceState, PaymentError> {
        self.state()
            .statuses
            .get(&invoice_id)
            .copied()
            .ok_or(PaymentError::UnknownInvoice(invoice_id))
    }
}
