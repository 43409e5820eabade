use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::PipelineError;
use crate::engine::CreateLeadInput;
use crate::ingest::{IngestSummary, ScrapedRecord};
use crate::lead::{Lead, LeadPatch, Stage};
use crate::router;
use crate::store::{LeadFilter, Page, TaskFilter};
use crate::task::FollowUpTask;

pub async fn create(
    State(state): State<router::State>,
    Json(input): Json<CreateLeadInput>,
) -> Result<(StatusCode, Json<Lead>), PipelineError> {
    let lead = state.engine.create_lead(input).await?;
    Ok((StatusCode::CREATED, Json(lead)))
}

#[derive(Deserialize)]
pub struct BulkRequest {
    pub records: Vec<ScrapedRecord>,
    pub owner: String,
}

pub async fn bulk(
    State(state): State<router::State>,
    Json(request): Json<BulkRequest>,
) -> Result<(StatusCode, Json<IngestSummary>), PipelineError> {
    if request.records.is_empty() {
        return Err(PipelineError::ValidationFailed(
            "records array is empty".into(),
        ));
    }
    let summary = state
        .engine
        .ingest_batch(request.records, &request.owner)
        .await;
    Ok((StatusCode::CREATED, Json(summary)))
}

#[derive(Deserialize)]
pub struct ListQuery {
    pub stage: Option<Stage>,
    pub owner: Option<String>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Serialize)]
pub struct ListResponse {
    pub leads: Vec<Lead>,
}

pub async fn list(
    State(state): State<router::State>,
    Query(query): Query<ListQuery>,
) -> Result<Json<ListResponse>, PipelineError> {
    let filter = LeadFilter {
        stage: query.stage,
        owner: query.owner,
    };
    let leads = state
        .engine
        .list_leads(filter, Page::new(query.page, query.limit))
        .await?;
    Ok(Json(ListResponse { leads }))
}

#[derive(Deserialize)]
pub struct ByKeyQuery {
    pub key: String,
}

/// Lookup path used by the scraping extension: the lead for a profile it
/// is looking at, plus that lead's tasks for the sidebar.
#[derive(Serialize)]
pub struct ByKeyResponse {
    pub lead: Option<Lead>,
    pub tasks: Vec<FollowUpTask>,
}

pub async fn by_key(
    State(state): State<router::State>,
    Query(query): Query<ByKeyQuery>,
) -> Result<Json<ByKeyResponse>, PipelineError> {
    let lead = state.engine.lead_by_external_key(&query.key).await?;
    let tasks = match &lead {
        Some(lead) => {
            let filter = TaskFilter {
                lead_id: Some(lead.id),
                ..Default::default()
            };
            state.engine.list_tasks(filter, Page::default()).await?
        }
        None => Vec::new(),
    };
    Ok(Json(ByKeyResponse { lead, tasks }))
}

pub async fn show(
    State(state): State<router::State>,
    Path(id): Path<Uuid>,
) -> Result<Json<Lead>, PipelineError> {
    Ok(Json(state.engine.lead(id).await?))
}

pub async fn update(
    State(state): State<router::State>,
    Path(id): Path<Uuid>,
    Json(patch): Json<LeadPatch>,
) -> Result<Json<Lead>, PipelineError> {
    Ok(Json(state.engine.update_lead(id, patch).await?))
}
