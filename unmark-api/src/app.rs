/// Application state and router builder
///
/// This module wires the shared services into the application state and
/// builds the Axum router with all routes and middleware.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use unmark_api::{app::AppState, config::Config};
/// use unmark_shared::db::pool::{create_pool, DatabaseConfig};
/// use unmark_shared::messenger::TelegramMessenger;
/// use unmark_shared::payments::CryptoPayClient;
/// use unmark_shared::provider::{KieClient, KieConfig};
/// use unmark_shared::store::postgres::PgStore;
///
/// # async fn example() -> anyhow::Result<()> {
/// let config = Config::from_env()?;
/// let pool = create_pool(DatabaseConfig {
///     url: config.database.url.clone(),
///     ..Default::default()
/// })
/// .await?;
/// let state = AppState::new(
///     Arc::new(PgStore::new(pool)),
///     Arc::new(TelegramMessenger::new(&config.telegram.bot_token)?),
///     Arc::new(KieClient::new(KieConfig::new(&config.provider.callback_url))?),
///     Arc::new(CryptoPayClient::new(&config.payments.token, &config.payments.api_base)?),
///     config,
/// );
/// let app = unmark_api::app::build_router(state);
/// # Ok(())
/// # }
/// ```

use crate::bot::ChatBot;
use crate::config::Config;
use crate::error::ApiError;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;
use unmark_shared::accounts::AccountService;
use unmark_shared::lifecycle::{
    CredentialSelector, EntitlementGate, FailoverController, JobSubmitter, WebhookReconciler,
};
use unmark_shared::messenger::{Messenger, OperatorAlerts};
use unmark_shared::payments::{PaymentProvider, PurchaseService};
use unmark_shared::provider::ProviderClient;
use unmark_shared::store::Store;

/// Shared application state
///
/// Cloned for each request handler via Axum's `State` extractor; every
/// field is reference counted.
#[derive(Clone)]
pub struct AppState {
    /// Storage, used directly by the admin routes
    pub store: Arc<dyn Store>,

    /// Provider notification handler
    pub reconciler: WebhookReconciler,

    /// Chat front end
    pub bot: ChatBot,

    /// Application configuration
    pub config: Arc<Config>,
}

impl AppState {
    /// Builds the service graph over one store and the external clients
    pub fn new<S: Store + 'static>(
        store: Arc<S>,
        messenger: Arc<dyn Messenger>,
        provider: Arc<dyn ProviderClient>,
        payments: Arc<dyn PaymentProvider>,
        config: Config,
    ) -> Self {
        let alerts = OperatorAlerts::new(messenger.clone(), config.telegram.admin_chat_id);
        let failover = FailoverController::new(store.clone()).with_alerts(alerts);
        let submitter = JobSubmitter::new(
            CredentialSelector::new(store.clone()),
            provider,
            store.clone(),
            failover,
        );
        let gate = EntitlementGate::new(store.clone(), store.clone())
            .with_max_in_flight(config.max_in_flight_per_user);
        let accounts = AccountService::new(
            store.clone(),
            messenger.clone(),
            config.telegram.channel_id.clone(),
        );
        let purchases = PurchaseService::new(store.clone(), store.clone(), store.clone(), payments);

        let bot = ChatBot::new(
            accounts,
            purchases,
            store.clone(),
            gate,
            submitter,
            messenger.clone(),
            config.telegram.channel_url.clone(),
        );

        Self {
            reconciler: WebhookReconciler::new(store.clone(), messenger),
            bot,
            store,
            config: Arc::new(config),
        }
    }
}

/// Builds the complete Axum router with all routes and middleware
///
/// # Architecture
///
/// ```text
/// /
/// ├── GET  /health                      # Health check (public)
/// ├── POST /callback                    # Provider notifications (always 200 ok)
/// ├── POST /                            # Same, for older provider configurations
/// ├── POST /telegram/:secret            # Chat updates
/// └── /v1/admin/                        # Admin API (bearer ADMIN_TOKEN)
///     ├── GET|POST /credentials
///     ├── POST     /credentials/:id/pin
///     ├── POST     /credentials/:id/enabled
///     ├── POST     /credentials/:id/rotation
///     ├── GET|PUT  /settings/auto-switch
///     ├── GET      /users
///     ├── GET      /users/:id
///     ├── POST     /users/:id/ban
///     ├── POST     /users/:id/grant
///     ├── GET|POST /packages
///     └── GET      /tasks
/// ```
pub fn build_router(state: AppState) -> Router {
    use crate::routes::{admin, callback, health, telegram};

    let public_routes = Router::new()
        .route("/health", get(health::health_check))
        .route("/callback", post(callback::provider_callback))
        .route("/", post(callback::provider_callback))
        .route("/telegram/:secret", post(telegram::telegram_update));

    let admin_routes = Router::new()
        .route(
            "/credentials",
            get(admin::credentials::list_credentials).post(admin::credentials::create_credential),
        )
        .route("/credentials/:id/pin", post(admin::credentials::pin_credential))
        .route("/credentials/:id/enabled", post(admin::credentials::set_enabled))
        .route("/credentials/:id/rotation", post(admin::credentials::set_rotation))
        .route(
            "/settings/auto-switch",
            get(admin::credentials::get_auto_switch).put(admin::credentials::set_auto_switch),
        )
        .route("/users", get(admin::users::list_users))
        .route("/users/:id", get(admin::users::get_user))
        .route("/users/:id/ban", post(admin::users::set_banned))
        .route("/users/:id/grant", post(admin::users::grant_attempts))
        .route(
            "/packages",
            get(admin::packages::list_packages).post(admin::packages::create_package),
        )
        .route("/tasks", get(admin::tasks::list_tasks))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            admin_auth_layer,
        ));

    Router::new()
        .merge(public_routes)
        .nest("/v1/admin", admin_routes)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .with_state(state)
}

/// Admin authentication middleware layer
///
/// Requires `Authorization: Bearer <ADMIN_TOKEN>`.
async fn admin_auth_layer(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let auth_header = req
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::Unauthorized("Missing authorization header".to_string()))?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or_else(|| ApiError::BadRequest("Expected Bearer token".to_string()))?;

    if !secrets_match(token, &state.config.admin.token) {
        tracing::warn!("Rejected admin request with an invalid token");
        return Err(ApiError::Unauthorized("Invalid admin token".to_string()));
    }

    Ok(next.run(req).await)
}

/// Compares two secrets in time independent of where they differ
pub(crate) fn secrets_match(given: &str, expected: &str) -> bool {
    let (a, b) = (given.as_bytes(), expected.as_bytes());
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secrets_match() {
        assert!(secrets_match("abc", "abc"));
        assert!(!secrets_match("abd", "abc"));
        assert!(!secrets_match("ab", "abc"));
        assert!(!secrets_match("", "abc"));
    }
}
