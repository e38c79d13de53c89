/// Configuration management for the API server
///
/// Configuration is read from environment variables (a `.env` file is loaded
/// first in development).
///
/// # Environment Variables
///
/// - `DATABASE_URL`: PostgreSQL connection string (required)
/// - `DATABASE_MAX_CONNECTIONS`: pool size (default: 10)
/// - `API_HOST` / `API_PORT`: bind address (default: 0.0.0.0:8080)
/// - `BOT_TOKEN`: Telegram bot token (required)
/// - `TELEGRAM_WEBHOOK_SECRET`: path secret of the update endpoint (required)
/// - `CHANNEL_ID` / `CHANNEL_URL`: bonus channel (required)
/// - `ADMIN_TOKEN`: bearer token of the admin API, at least 32 characters (required)
/// - `ADMIN_CHAT_ID`: chat that receives operator alerts (required)
/// - `PROVIDER_API_BASE`, `PROVIDER_MODEL`, `PROVIDER_TIMEOUT_SECS`: job-creation call
/// - `CALLBACK_URL`: address the provider posts completions to (required)
/// - `CRYPTO_TOKEN` (required) / `CRYPTO_API_BASE`: payment provider
/// - `MAX_IN_FLIGHT_PER_USER`: optional cap on pending jobs per user
/// - `LOG_FORMAT`: `json` for JSON logs, anything else for text
use std::collections::HashMap;
use std::env;
use std::time::Duration;
use unmark_shared::payments::cryptopay::CRYPTO_PAY_API_BASE;
use unmark_shared::provider::kie::{DEFAULT_API_BASE, DEFAULT_MODEL};

/// Minimum admin token length
pub const MIN_ADMIN_TOKEN_LEN: usize = 32;

/// Complete application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub api: ApiConfig,
    pub database: DatabaseConfig,
    pub telegram: TelegramConfig,
    pub admin: AdminConfig,
    pub provider: ProviderConfig,
    pub payments: PaymentsConfig,

    /// Optional cap on pending jobs per user; `None` means unlimited
    pub max_in_flight_per_user: Option<u32>,

    /// Emit JSON logs
    pub json_logs: bool,
}

/// API server configuration
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
}

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

/// Chat transport configuration
#[derive(Debug, Clone)]
pub struct TelegramConfig {
    pub bot_token: String,

    /// Path segment that authenticates update deliveries
    pub webhook_secret: String,

    /// Channel whose members may claim the bonus
    pub channel_id: String,

    /// Invite link shown to users who are not members yet
    pub channel_url: String,

    /// Operator chat for alerts
    pub admin_chat_id: i64,
}

/// Admin API configuration
#[derive(Debug, Clone)]
pub struct AdminConfig {
    /// Bearer token; keep secret
    pub token: String,
}

/// Watermark-removal provider configuration
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub api_base: String,
    pub model: String,
    pub callback_url: String,
    pub timeout: Duration,
}

/// Payment provider configuration
#[derive(Debug, Clone)]
pub struct PaymentsConfig {
    pub token: String,
    pub api_base: String,
}

impl Config {
    /// Loads configuration from environment variables
    ///
    /// # Errors
    ///
    /// Returns an error if a required variable is missing or a value does not parse.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Loads configuration from a key/value map
    pub fn from_map(vars: &HashMap<String, String>) -> anyhow::Result<Self> {
        Self::from_lookup(|key| vars.get(key).cloned())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let required = |key: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| anyhow::anyhow!("{key} environment variable is required"))
        };
        let or_default = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let api_port = or_default("API_PORT", "8080").parse::<u16>()?;
        let max_connections = or_default("DATABASE_MAX_CONNECTIONS", "10").parse::<u32>()?;
        let provider_timeout = or_default("PROVIDER_TIMEOUT_SECS", "30").parse::<u64>()?;

        let admin_chat_id = required("ADMIN_CHAT_ID")?
            .parse::<i64>()
            .map_err(|e| anyhow::anyhow!("ADMIN_CHAT_ID must be a chat id: {e}"))?;

        let admin_token = required("ADMIN_TOKEN")?;
        if admin_token.len() < MIN_ADMIN_TOKEN_LEN {
            anyhow::bail!("ADMIN_TOKEN must be at least {MIN_ADMIN_TOKEN_LEN} characters long");
        }

        let max_in_flight_per_user = match lookup("MAX_IN_FLIGHT_PER_USER") {
            Some(raw) if !raw.trim().is_empty() => {
                let limit = raw.trim().parse::<u32>()?;
                if limit == 0 {
                    anyhow::bail!("MAX_IN_FLIGHT_PER_USER must be positive when set");
                }
                Some(limit)
            }
            _ => None,
        };

        Ok(Self {
            api: ApiConfig {
                host: or_default("API_HOST", "0.0.0.0"),
                port: api_port,
            },
            database: DatabaseConfig {
                url: required("DATABASE_URL")?,
                max_connections,
            },
            telegram: TelegramConfig {
                bot_token: required("BOT_TOKEN")?,
                webhook_secret: required("TELEGRAM_WEBHOOK_SECRET")?,
                channel_id: required("CHANNEL_ID")?,
                channel_url: required("CHANNEL_URL")?,
                admin_chat_id,
            },
            admin: AdminConfig { token: admin_token },
            provider: ProviderConfig {
                api_base: or_default("PROVIDER_API_BASE", DEFAULT_API_BASE),
                model: or_default("PROVIDER_MODEL", DEFAULT_MODEL),
                callback_url: required("CALLBACK_URL")?,
                timeout: Duration::from_secs(provider_timeout),
            },
            payments: PaymentsConfig {
                token: required("CRYPTO_TOKEN")?,
                api_base: or_default("CRYPTO_API_BASE", CRYPTO_PAY_API_BASE),
            },
            max_in_flight_per_user,
            json_logs: lookup("LOG_FORMAT").is_some_and(|f| f.eq_ignore_ascii_case("json")),
        })
    }

    /// Returns the server bind address
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.api.host, self.api.port)
    }
}
