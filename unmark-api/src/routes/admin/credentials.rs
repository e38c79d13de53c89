/// Credential management endpoints
///
/// # Endpoints
///
/// - `GET  /v1/admin/credentials` - List credentials (tokens masked)
/// - `POST /v1/admin/credentials` - Register a credential
/// - `POST /v1/admin/credentials/:id/pin` - Make one credential the only active one
/// - `POST /v1/admin/credentials/:id/enabled` - Enable or disable
/// - `POST /v1/admin/credentials/:id/rotation` - Join or leave automatic rotation
/// - `GET|PUT /v1/admin/settings/auto-switch` - Store-wide rotation switch

use crate::{
    app::AppState,
    error::{validate, ApiError, ApiResult},
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use unmark_shared::models::{Credential, NewCredential};
use unmark_shared::store::CredentialStore;
use validator::Validate;

/// Register credential request
#[derive(Debug, Deserialize, Validate)]
pub struct CreateCredentialRequest {
    /// Provider bearer token
    #[validate(length(min = 1, message = "Token is required"))]
    pub token: String,

    #[validate(length(min = 1, max = 100, message = "Name must be 1-100 characters"))]
    pub name: String,

    /// Defaults to taking part in rotation
    #[serde(default = "default_true")]
    pub is_auto_switch: bool,
}

fn default_true() -> bool {
    true
}

/// Credential as shown to operators
#[derive(Debug, Serialize, Deserialize)]
pub struct CredentialItem {
    pub id: i64,
    pub name: String,

    /// First and last four characters of the token
    pub token: String,
    pub usage_count: i64,
    pub is_enabled: bool,
    pub is_active: bool,
    pub is_auto_switch: bool,
    pub created_at: DateTime<Utc>,
}

impl From<Credential> for CredentialItem {
    fn from(credential: Credential) -> Self {
        CredentialItem {
            token: credential.masked_token(),
            id: credential.seq,
            name: credential.name,
            usage_count: credential.usage_count,
            is_enabled: credential.is_enabled,
            is_active: credential.is_active,
            is_auto_switch: credential.is_auto_switch,
            created_at: credential.created_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ListCredentialsResponse {
    pub credentials: Vec<CredentialItem>,
}

#[derive(Debug, Deserialize)]
pub struct SetEnabledRequest {
    pub enabled: bool,
}

#[derive(Debug, Deserialize)]
pub struct SetRotationRequest {
    pub participates: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AutoSwitchBody {
    pub enabled: bool,
}

pub async fn list_credentials(
    State(state): State<AppState>,
) -> ApiResult<Json<ListCredentialsResponse>> {
    let credentials = state.store.list_credentials().await?;

    Ok(Json(ListCredentialsResponse {
        credentials: credentials.into_iter().map(CredentialItem::from).collect(),
    }))
}

/// Registers a credential
///
/// # Errors
///
/// - `409 Conflict`: the token is already registered
/// - `422 Unprocessable Entity`: validation failed
pub async fn create_credential(
    State(state): State<AppState>,
    Json(req): Json<CreateCredentialRequest>,
) -> ApiResult<(StatusCode, Json<CredentialItem>)> {
    validate(&req)?;

    let credential = state
        .store
        .create_credential(NewCredential {
            token: req.token.trim().to_string(),
            name: req.name,
            is_auto_switch: req.is_auto_switch,
        })
        .await?;

    tracing::info!(
        credential = %credential.name,
        id = credential.seq,
        "Credential registered"
    );
    Ok((StatusCode::CREATED, Json(credential.into())))
}

pub async fn pin_credential(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<CredentialItem>> {
    let credential = state
        .store
        .pin_credential(id)
        .await?
        .ok_or_else(|| not_found(id))?;

    tracing::info!(credential = %credential.name, "Credential pinned as active");
    Ok(Json(credential.into()))
}

pub async fn set_enabled(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(req): Json<SetEnabledRequest>,
) -> ApiResult<Json<CredentialItem>> {
    let credential = state
        .store
        .set_credential_enabled(id, req.enabled)
        .await?
        .ok_or_else(|| not_found(id))?;

    tracing::info!(credential = %credential.name, enabled = req.enabled, "Credential toggled");
    Ok(Json(credential.into()))
}

pub async fn set_rotation(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(req): Json<SetRotationRequest>,
) -> ApiResult<Json<CredentialItem>> {
    let credential = state
        .store
        .set_credential_rotation(id, req.participates)
        .await?
        .ok_or_else(|| not_found(id))?;

    Ok(Json(credential.into()))
}

pub async fn get_auto_switch(State(state): State<AppState>) -> ApiResult<Json<AutoSwitchBody>> {
    Ok(Json(AutoSwitchBody {
        enabled: state.store.auto_switch_enabled().await?,
    }))
}

pub async fn set_auto_switch(
    State(state): State<AppState>,
    Json(req): Json<AutoSwitchBody>,
) -> ApiResult<Json<AutoSwitchBody>> {
    let enabled = state.store.set_auto_switch(req.enabled).await?;
    tracing::info!(enabled, "Auto-switch updated");
    Ok(Json(AutoSwitchBody { enabled }))
}

fn not_found(id: i64) -> ApiError {
    ApiError::NotFound(format!("Credential {id} not found"))
}
