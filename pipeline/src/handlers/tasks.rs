use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::PipelineError;
use crate::engine::CreateTaskInput;
use crate::router;
use crate::store::{Page, TaskFilter};
use crate::task::{FollowUpTask, TaskStatus};

pub async fn create(
    State(state): State<router::State>,
    Json(input): Json<CreateTaskInput>,
) -> Result<(StatusCode, Json<FollowUpTask>), PipelineError> {
    let task = state.engine.create_task(input).await?;
    Ok((StatusCode::CREATED, Json(task)))
}

#[derive(Deserialize)]
pub struct ListQuery {
    pub lead_id: Option<Uuid>,
    pub owner: Option<String>,
    pub status: Option<TaskStatus>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Serialize)]
pub struct ListResponse {
    pub tasks: Vec<FollowUpTask>,
}

pub async fn list(
    State(state): State<router::State>,
    Query(query): Query<ListQuery>,
) -> Result<Json<ListResponse>, PipelineError> {
    let filter = TaskFilter {
        lead_id: query.lead_id,
        owner: query.owner,
        status: query.status,
    };
    let tasks = state
        .engine
        .list_tasks(filter, Page::new(query.page, query.limit))
        .await?;
    Ok(Json(ListResponse { tasks }))
}

pub async fn overdue(
    State(state): State<router::State>,
) -> Result<Json<ListResponse>, PipelineError> {
    let tasks = state.engine.overdue_tasks().await?;
    Ok(Json(ListResponse { tasks }))
}

#[derive(Deserialize)]
pub struct UpdateRequest {
    pub status: TaskStatus,
}

pub async fn update(
    State(state): State<router::State>,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateRequest>,
) -> Result<Json<FollowUpTask>, PipelineError> {
    Ok(Json(
        state.engine.set_task_status(id, request.status).await?,
    ))
}

pub async fn remove(
    State(state): State<router::State>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, PipelineError> {
    state.engine.delete_task(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
