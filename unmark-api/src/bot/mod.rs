//! Chat bot: turns incoming chat messages into account, purchase and
//! submission operations and replies through the messenger

pub mod command;

pub use command::Command;

use std::sync::Arc;
use thiserror::Error;
use unmark_shared::accounts::{AccountError, AccountService, BonusOutcome};
use unmark_shared::lifecycle::{EntitlementGate, GateDecision, JobSubmitter, SubmitError};
use unmark_shared::messenger::{DeliveryError, Messenger};
use unmark_shared::payments::purchase::{PurchaseError, PurchaseOutcome, PurchaseService};
use unmark_shared::store::{PackageStore, StoreError};

pub const WELCOME: &str = "👋 Send me a link to a Sora video and I will return it without the watermark.\n\n\
Each video costs one attempt, charged only when the result is delivered.\n\
/profile shows your balance, /bonus gives a free attempt, /shop sells more.";
pub const ACCEPTED: &str = "⏳ Video accepted and processing. The result will arrive in this chat.";
pub const NO_ATTEMPTS: &str = "❌ You have no attempts left. Get more with /shop or /bonus.";
pub const NO_CAPACITY: &str = "⚠️ Technical error: no active servers. Please try again later.";
pub const PROCESSING_ERROR: &str = "⚠️ Processing error, please retry.";
pub const BANNED: &str = "🚫 Your account is blocked.";
pub const UNKNOWN: &str = "Send me a video link, or /start for help.";
pub const ALREADY_CLAIMED: &str = "You have already received your bonus.";
pub const MEMBERSHIP_UNAVAILABLE: &str = "Could not check your subscription, please try again later.";
pub const NO_PACKAGES: &str = "No packages are available right now.";
pub const UNKNOWN_PACKAGE: &str = "No such package. See /shop.";
pub const UNKNOWN_INVOICE: &str = "Invoice not found.";
pub const PAYMENTS_UNAVAILABLE: &str = "The payment service is unavailable, please try again later.";
pub const ALREADY_CREDITED: &str = "This invoice was already credited.";
pub const PAYMENT_PENDING: &str = "Payment not received yet. Send /check again in a minute.";
pub const INVOICE_EXPIRED: &str = "This invoice expired. Start a new purchase with /shop.";
pub const INTERNAL_ERROR: &str = "Something went wrong, please try again later.";

#[derive(Debug, Error)]
pub enum BotError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Reply could not be delivered: {0}")]
    Delivery(#[from] DeliveryError),
}

impl From<AccountError> for BotError {
    fn from(err: AccountError) -> Self {
        match err {
            AccountError::Store(e) => BotError::Store(e),
            AccountError::Membership(e) => BotError::Delivery(e),
        }
    }
}

/// Chat front end over the shared services
#[derive(Clone)]
pub struct ChatBot {
    accounts: AccountService,
    purchases: PurchaseService,
    packages: Arc<dyn PackageStore>,
    gate: EntitlementGate,
    submitter: JobSubmitter,
    messenger: Arc<dyn Messenger>,
    channel_url: String,
}

impl ChatBot {
    pub fn new(
        accounts: AccountService,
        purchases: PurchaseService,
        packages: Arc<dyn PackageStore>,
        gate: EntitlementGate,
        submitter: JobSubmitter,
        messenger: Arc<dyn Messenger>,
        channel_url: impl Into<String>,
    ) -> Self {
        ChatBot {
            accounts,
            purchases,
            packages,
            gate,
            submitter,
            messenger,
            channel_url: channel_url.into(),
        }
    }

    /// Handles one message and sends the reply to `chat_id`
    pub async fn handle(&self, chat_id: i64, user_id: i64, text: &str) -> Result<(), BotError> {
        let reply = match self.respond(user_id, text).await {
            Ok(reply) => reply,
            Err(e) => {
                tracing::error!(user_id, error = %e, "Chat message handling failed");
                INTERNAL_ERROR.to_string()
            }
        };

        self.messenger.send_text(chat_id, &reply).await?;
        Ok(())
    }

    /// Computes the reply to one message
    pub async fn respond(&self, user_id: i64, text: &str) -> Result<String, BotError> {
        let user = self.accounts.register(user_id).await?;

        let reply = match Command::parse(text) {
            Command::Start => WELCOME.to_string(),
            Command::Profile => format!(
                "👤 Your profile\n\nAttempts left: {}\nVideos processed: {}",
                user.attempts, user.total_downloaded
            ),
            Command::Bonus => self.bonus(user_id).await?,
            Command::Shop => self.shop().await?,
            Command::Buy(package_id) => self.buy(user_id, package_id).await?,
            Command::Check(invoice_id) => self.check(user_id, invoice_id).await?,
            Command::Submit(url) => self.submit(user_id, &url).await?,
            Command::Usage(usage) => format!("Usage: {usage}"),
            Command::Unknown => UNKNOWN.to_string(),
        };

        Ok(reply)
    }

    async fn bonus(&self, user_id: i64) -> Result<String, BotError> {
        match self.accounts.claim_bonus(user_id).await {
            Ok(BonusOutcome::Granted(user)) => {
                Ok(format!("🎁 Bonus received! Attempts left: {}", user.attempts))
            }
            Ok(BonusOutcome::AlreadyClaimed) => Ok(ALREADY_CLAIMED.to_string()),
            Ok(BonusOutcome::NotSubscribed) => Ok(format!(
                "Subscribe to {} and send /bonus again.",
                self.channel_url
            )),
            Err(AccountError::Membership(e)) => {
                tracing::warn!(user_id, error = %e, "Channel membership check failed");
                Ok(MEMBERSHIP_UNAVAILABLE.to_string())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn shop(&self) -> Result<String, BotError> {
        let packages = self.packages.list_packages().await?;
        if packages.is_empty() {
            return Ok(NO_PACKAGES.to_string());
        }

        let lines: Vec<String> = packages
            .iter()
            .map(|p| format!("{}. {}: {} attempts for ${:.2}", p.id, p.name, p.attempts, p.price_usd))
            .collect();
        Ok(format!("🛒 Packages\n\n{}\n\nBuy with /buy <number>", lines.join("\n")))
    }

    async fn buy(&self, user_id: i64, package_id: i64) -> Result<String, BotError> {
        match self.purchases.start_purchase(user_id, package_id).await {
            Ok(invoice) => Ok(format!(
                "💳 Pay here: {}\n\nAfter paying send /check {}",
                invoice.pay_url, invoice.invoice_id
            )),
            Err(e) => purchase_failure(user_id, e),
        }
    }

    async fn check(&self, user_id: i64, invoice_id: i64) -> Result<String, BotError> {
        match self.purchases.confirm_owned(user_id, invoice_id).await {
            Ok(PurchaseOutcome::Credited { invoice, user }) => Ok(format!(
                "✅ Payment received! +{} attempts, you now have {}.",
                invoice.attempts, user.attempts
            )),
            Ok(PurchaseOutcome::AlreadyCredited) => Ok(ALREADY_CREDITED.to_string()),
            Ok(PurchaseOutcome::Pending) => Ok(PAYMENT_PENDING.to_string()),
            Ok(PurchaseOutcome::Expired) => Ok(INVOICE_EXPIRED.to_string()),
            Err(e) => purchase_failure(user_id, e),
        }
    }

    async fn submit(&self, user_id: i64, url: &str) -> Result<String, BotError> {
        let reply = match self.gate.check(user_id).await? {
            GateDecision::Allowed => match self.submitter.submit(url, user_id).await {
                Ok(_) => ACCEPTED.to_string(),
                Err(SubmitError::NoCapacity) => NO_CAPACITY.to_string(),
                Err(SubmitError::Store(e)) => return Err(e.into()),
                Err(_) => PROCESSING_ERROR.to_string(),
            },
            GateDecision::Banned => BANNED.to_string(),
            GateDecision::UnknownUser | GateDecision::NoAttempts => NO_ATTEMPTS.to_string(),
            GateDecision::TooManyInFlight { limit } => format!(
                "⏳ You already have {limit} videos processing. Wait for a result before sending more."
            ),
        };
        Ok(reply)
    }
}

fn purchase_failure(user_id: i64, err: PurchaseError) -> Result<String, BotError> {
    match err {
        PurchaseError::UnknownPackage(_) => Ok(UNKNOWN_PACKAGE.to_string()),
        PurchaseError::UnknownInvoice(_) => Ok(UNKNOWN_INVOICE.to_string()),
        PurchaseError::Payment(e) => {
            tracing::warn!(user_id, error = %e, "Payment provider call failed");
            Ok(PAYMENTS_UNAVAILABLE.to_string())
        }
        PurchaseError::Store(e) => Err(e.into()),
    }
}
