/// Package catalogue endpoints
///
/// - `GET  /v1/admin/packages` - Cheapest first
/// - `POST /v1/admin/packages` - `{"name": "Starter", "attempts": 10, "price_usd": 4.5}`

use crate::{
    app::AppState,
    error::{validate, ApiResult},
};
use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use unmark_shared::models::{NewPackage, Package};
use unmark_shared::store::PackageStore;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct CreatePackageRequest {
    #[validate(length(min = 1, max = 100, message = "Name must be 1-100 characters"))]
    pub name: String,

    #[validate(range(min = 1, message = "attempts must be positive"))]
    pub attempts: i32,

    #[validate(range(min = 0.01, message = "price_usd must be at least 0.01"))]
    pub price_usd: f64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ListPackagesResponse {
    pub packages: Vec<Package>,
}

pub async fn list_packages(State(state): State<AppState>) -> ApiResult<Json<ListPackagesResponse>> {
    Ok(Json(ListPackagesResponse {
        packages: state.store.list_packages().await?,
    }))
}

pub async fn create_package(
    State(state): State<AppState>,
    Json(req): Json<CreatePackageRequest>,
) -> ApiResult<(StatusCode, Json<Package>)> {
    validate(&req)?;

    let package = state
        .store
        .create_package(NewPackage {
            name: req.name,
            attempts: req.attempts,
            price_usd: req.price_usd,
        })
        .await?;

    tracing::info!(package_id = package.id, name = %package.name, "Package created");
    Ok((StatusCode::CREATED, Json(package)))
}
