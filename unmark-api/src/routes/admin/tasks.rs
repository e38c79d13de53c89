/// Pending job listing
///
/// `GET /v1/admin/tasks?limit=&offset=`; the credential used for each job is
/// not exposed.

use super::Pagination;
use crate::{
    app::AppState,
    error::{validate, ApiResult},
};
use axum::{
    extract::{Query, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use unmark_shared::models::Task;
use unmark_shared::store::TaskLedger;

#[derive(Debug, Serialize, Deserialize)]
pub struct TaskItem {
    pub job_id: String,
    pub user_id: i64,
    pub video_url: String,

    /// Set when the job finished but delivery is still being retried
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_url: Option<String>,

    pub created_at: DateTime<Utc>,
}

impl From<Task> for TaskItem {
    fn from(task: Task) -> Self {
        TaskItem {
            job_id: task.job_id,
            user_id: task.user_id,
            video_url: task.video_url,
            result_url: task.result_url,
            created_at: task.created_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ListTasksResponse {
    pub tasks: Vec<TaskItem>,
}

pub async fn list_tasks(
    State(state): State<AppState>,
    Query(page): Query<Pagination>,
) -> ApiResult<Json<ListTasksResponse>> {
    validate(&page)?;

    let tasks = state.store.list_tasks(page.limit, page.offset).await?;
    Ok(Json(ListTasksResponse {
        tasks: tasks.into_iter().map(TaskItem::from).collect(),
    }))
}
