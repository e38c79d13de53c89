/// User management endpoints
///
/// - `GET  /v1/admin/users?limit=&offset=` - Page through users
/// - `GET  /v1/admin/users/:id`
/// - `POST /v1/admin/users/:id/ban` - `{"banned": true}` bans, `false` unbans
/// - `POST /v1/admin/users/:id/grant` - `{"amount": 5}` adds attempts

use super::Pagination;
use crate::{
    app::AppState,
    error::{validate, ApiError, ApiResult},
};
use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use unmark_shared::models::User;
use unmark_shared::store::UserStore;
use validator::Validate;

#[derive(Debug, Serialize, Deserialize)]
pub struct ListUsersResponse {
    pub users: Vec<User>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

#[derive(Debug, Deserialize)]
pub struct SetBannedRequest {
    pub banned: bool,
}

#[derive(Debug, Deserialize, Validate)]
pub struct GrantRequest {
    #[validate(range(min = 1, max = 100000, message = "amount must be between 1 and 100000"))]
    pub amount: i32,
}

pub async fn list_users(
    State(state): State<AppState>,
    Query(page): Query<Pagination>,
) -> ApiResult<Json<ListUsersResponse>> {
    validate(&page)?;

    let users = state.store.list_users(page.limit, page.offset).await?;
    let total = state.store.count_users().await?;

    Ok(Json(ListUsersResponse {
        users,
        total,
        limit: page.limit,
        offset: page.offset,
    }))
}

pub async fn get_user(State(state): State<AppState>, Path(id): Path<i64>) -> ApiResult<Json<User>> {
    let user = state.store.find_user(id).await?.ok_or_else(|| not_found(id))?;
    Ok(Json(user))
}

pub async fn set_banned(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(req): Json<SetBannedRequest>,
) -> ApiResult<Json<User>> {
    let user = state
        .store
        .set_banned(id, req.banned)
        .await?
        .ok_or_else(|| not_found(id))?;

    tracing::info!(user_id = id, banned = req.banned, "User ban updated");
    Ok(Json(user))
}

pub async fn grant_attempts(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(req): Json<GrantRequest>,
) -> ApiResult<Json<User>> {
    validate(&req)?;

    let user = state
        .store
        .grant_attempts(id, req.amount)
        .await?
        .ok_or_else(|| not_found(id))?;

    tracing::info!(user_id = id, amount = req.amount, attempts = user.attempts, "Attempts granted");
    Ok(Json(user))
}

fn not_found(id: i64) -> ApiError {
    ApiError::NotFound(format!("User {id} not found"))
}
