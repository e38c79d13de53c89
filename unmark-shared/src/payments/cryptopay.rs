//! Crypto Pay API client
//!
//! Invoices are priced in fiat USD; the payer picks the asset. Every method is
//! `{api_base}/{method}` with the `Crypto-Pay-API-Token` header, and answers
//! `{"ok": bool, "result": ..., "error": ...}`.

use super::{CreatedInvoice, PaymentError, PaymentProvider};
use crate::models::InvoiceState;
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Mainnet endpoint
pub const CRYPTO_PAY_API_BASE: &str = "https://pay.crypt.bot/api";

const TOKEN_HEADER: &str = "Crypto-Pay-API-Token";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

#[derive(Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    error: Option<serde_json::Value>,
}

#[derive(Serialize)]
struct CreateInvoiceRequest<'a> {
    currency_type: &'static str,
    fiat: &'static str,
    amount: String,
    description: &'a str,
    payload: &'a str,
}

#[derive(Debug, Deserialize)]
struct ApiInvoice {
    invoice_id: i64,
    status: String,
    #[serde(default)]
    bot_invoice_url: Option<String>,
    #[serde(default)]
    pay_url: Option<String>,
}

#[derive(Deserialize)]
struct InvoiceList {
    items: Vec<ApiInvoice>,
}

fn status_from_api(status: &str) -> InvoiceState {
    match status {
        "paid" => InvoiceState::Paid,
        "expired" => InvoiceState::Expired,
        _ => InvoiceState::Active,
    }
}

/// Crypto Pay client
#[derive(Clone)]
pub struct CryptoPayClient {
    client: Client,
    api_base: String,
    token: String,
}

impl CryptoPayClient {
    pub fn new(token: impl Into<String>, api_base: impl Into<String>) -> Result<Self, PaymentError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| PaymentError::Transport(e.to_string()))?;

        Ok(CryptoPayClient {
            client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            token: token.into(),
        })
    }

    async fn read<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, PaymentError> {
        let parsed: ApiResponse<T> = response
            .json()
            .await
            .map_err(|e| PaymentError::Transport(e.to_string()))?;

        match parsed {
            ApiResponse {
                ok: true,
                result: Some(result),
                ..
            } => Ok(result),
            ApiResponse { error, .. } => Err(PaymentError::Rejected(
                error.map(|e| e.to_string()).unwrap_or_else(|| "unknown error".to_string()),
            )),
        }
    }
}

#[async_trait]
impl PaymentProvider for CryptoPayClient {
    async fn create_invoice(
        &self,
        amount_usd: f64,
        description: &str,
        payload: &str,
    ) -> Result<CreatedInvoice, PaymentError> {
        let request = CreateInvoiceRequest {
            currency_type: "fiat",
            fiat: "USD",
            amount: format!("{amount_usd:.2}"),
            description,
            payload,
        };

        let response = self
            .client
            .post(format!("{}/createInvoice", self.api_base))
            .header(TOKEN_HEADER, &self.token)
            .json(&request)
            .send()
            .await
            .map_err(|e| PaymentError::Transport(e.to_string()))?;

        let invoice: ApiInvoice = Self::read(response).await?;
        let pay_url = invoice
            .bot_invoice_url
            .or(invoice.pay_url)
            .ok_or_else(|| PaymentError::Rejected("invoice without payment URL".to_string()))?;

        Ok(CreatedInvoice {
            invoice_id: invoice.invoice_id,
            pay_url,
        })
    }

    async fn invoice_status(&self, invoice_id: i64) -> Result<InvoiceState, PaymentError> {
        let response = self
            .client
            .get(format!("{}/getInvoices", self.api_base))
            .header(TOKEN_HEADER, &self.token)
            .query(&[("invoice_ids", invoice_id.to_string())])
            .send()
            .await
            .map_err(|e| PaymentError::Transport(e.to_string()))?;

        let list: InvoiceList = Self::read(response).await?;
        list.items
            .iter()
            .find(|i| i.invoice_id == invoice_id)
            .map(|i| status_from_api(&i.status))
            .ok_or(PaymentError::UnknownInvoice(invoice_id))
    }
}
