/// Worker configuration
///
/// # Environment Variables
///
/// - `DATABASE_URL` (required) / `DATABASE_MAX_CONNECTIONS` (default: 5)
/// - `BOT_TOKEN` (required): used to notify users
/// - `ADMIN_CHAT_ID` (optional): operator chat for undelivered-result alerts
/// - `CRYPTO_TOKEN` (required) / `CRYPTO_API_BASE`: payment provider
/// - `SWEEP_INTERVAL_SECS` (default: 300): stale-task sweep period
/// - `TASK_TTL_SECS` (default: 21600): age at which a pending job expires
/// - `INVOICE_POLL_SECS` (default: 60): invoice watcher period
/// - `INVOICE_TTL_SECS` (default: 3600): age at which an unpaid invoice expires
/// - `LOG_FORMAT`: `json` for JSON logs
use crate::orchestrator::OrchestratorConfig;
use std::collections::HashMap;
use std::env;
use std::time::Duration;
use unmark_shared::payments::cryptopay::CRYPTO_PAY_API_BASE;

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub database_url: String,
    pub max_connections: u32,
    pub bot_token: String,
    pub admin_chat_id: Option<i64>,
    pub crypto_token: String,
    pub crypto_api_base: String,
    pub orchestrator: OrchestratorConfig,
    pub json_logs: bool,
}

impl WorkerConfig {
    /// Loads configuration from environment variables
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
        let seconds = |key: &str, default: u64| -> anyhow::Result<u64> {
            let secs = match lookup(key) {
                Some(raw) => raw
                    .trim()
                    .parse::<u64>()
                    .map_err(|e| anyhow::anyhow!("{key} must be a number of seconds: {e}"))?,
                None => default,
            };
            if secs == 0 {
                anyhow::bail!("{key} must be positive");
            }
            Ok(secs)
        };

        let defaults = OrchestratorConfig::default();
        let orchestrator = OrchestratorConfig {
            sweep_interval: Duration::from_secs(seconds(
                "SWEEP_INTERVAL_SECS",
                defaults.sweep_interval.as_secs(),
            )?),
            task_ttl: chrono::Duration::seconds(
                seconds("TASK_TTL_SECS", defaults.task_ttl.num_seconds().unsigned_abs())? as i64,
            ),
            invoice_poll_interval: Duration::from_secs(seconds(
                "INVOICE_POLL_SECS",
                defaults.invoice_poll_interval.as_secs(),
            )?),
            invoice_ttl: chrono::Duration::seconds(
                seconds("INVOICE_TTL_SECS", defaults.invoice_ttl.num_seconds().unsigned_abs())? as i64,
            ),
            ..defaults
        };

        Ok(Self {
            database_url: required("DATABASE_URL")?,
            max_connections: lookup("DATABASE_MAX_CONNECTIONS")
                .unwrap_or_else(|| "5".to_string())
                .parse()?,
            bot_token: required("BOT_TOKEN")?,
            admin_chat_id: lookup("ADMIN_CHAT_ID")
                .filter(|v| !v.trim().is_empty())
                .map(|v| v.trim().parse::<i64>())
                .transpose()
                .map_err(|e| anyhow::anyhow!("ADMIN_CHAT_ID must be a chat id: {e}"))?,
            crypto_token: required("CRYPTO_TOKEN")?,
            crypto_api_base: lookup("CRYPTO_API_BASE")
                .unwrap_or_else(|| CRYPTO_PAY_API_BASE.to_string()),
            orchestrator,
            json_logs: lookup("LOG_FORMAT").is_some_and(|f| f.eq_ignore_ascii_case("json")),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(extra: &[(&str, &str)]) -> HashMap<String, String> {
        [
            ("DATABASE_URL", "postgresql://localhost/unmark_test"),
            ("BOT_TOKEN", "123:abc"),
            ("CRYPTO_TOKEN", "crypto"),
        ]
        .iter()
        .chain(extra)
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
    }

    #[test]
    fn test_defaults() {
        let config = WorkerConfig::from_map(&vars(&[])).unwrap();
        assert_eq!(config.orchestrator.task_ttl, chrono::Duration::hours(6));
        assert_eq!(config.orchestrator.sweep_interval, Duration::from_secs(300));
        assert_eq!(config.max_connections, 5);
        assert_eq!(config.admin_chat_id, None);
    }

    #[test]
    fn test_admin_chat_id() {
        let config = WorkerConfig::from_map(&vars(&[("ADMIN_CHAT_ID", "-100123")])).unwrap();
        assert_eq!(config.admin_chat_id, Some(-100123));
        assert!(WorkerConfig::from_map(&vars(&[("ADMIN_CHAT_ID", "ops")])).is_err());
    }

    #[test]
    fn test_overrides() {
        let config = WorkerConfig::from_map(&vars(&[
            ("TASK_TTL_SECS", "600"),
            ("INVOICE_POLL_SECS", "15"),
        ]))
        .unwrap();
        assert_eq!(config.orchestrator.task_ttl, chrono::Duration::minutes(10));
        assert_eq!(config.orchestrator.invoice_poll_interval, Duration::from_secs(15));
    }

    #[test]
    fn test_zero_interval_rejected() {
        assert!(WorkerConfig::from_map(&vars(&[("SWEEP_INTERVAL_SECS", "0")])).is_err());
        assert!(WorkerConfig::from_map(&vars(&[("BOT_TOKEN", "")])).is_err());
    }
}
