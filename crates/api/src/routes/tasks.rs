//! Task registry and on-demand runs

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;
use vodum_jobs::run_task;
use vodum_shared::tasks::list_task_statuses;
use vodum_shared::{TaskKind, TaskStatusView};

use crate::{
    error::{ApiError, ApiResult},
    state::AppState,
};

#[derive(Debug, Serialize)]
pub struct TaskRunResponse {
    pub task: &'static str,
    pub summary: serde_json::Value,
}

pub async fn list_tasks(State(state): State<AppState>) -> ApiResult<Json<Vec<TaskStatusView>>> {
    Ok(Json(list_task_statuses(&state.pool).await?))
}

/// Run a task now and return its summary
pub async fn run(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<Json<TaskRunResponse>> {
    let task: TaskKind = name.parse().map_err(|_| ApiError::NotFound)?;
    tracing::info!(task = task.name(), "Task run requested through the API");

    let summary = run_task(&state.jobs, task).await?;
    Ok(Json(TaskRunResponse {
        task: task.name(),
        summary,
    }))
}
