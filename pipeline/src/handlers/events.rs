use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::PipelineError;
use crate::engine::ProcessOutcome;
use crate::event::{EventInput, EventKind, InteractionEvent};
use crate::router;
use crate::store::{EventFilter, Page};

pub async fn create(
    State(state): State<router::State>,
    Json(input): Json<EventInput>,
) -> Result<(StatusCode, Json<ProcessOutcome>), PipelineError> {
    let outcome = state.engine.process_event(input).await?;
    Ok((StatusCode::CREATED, Json(outcome)))
}

#[derive(Deserialize)]
pub struct ListQuery {
    pub lead_id: Option<Uuid>,
    pub actor: Option<String>,
    pub kind: Option<EventKind>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Serialize)]
pub struct ListResponse {
    pub events: Vec<InteractionEvent>,
}

pub async fn list(
    State(state): State<router::State>,
    Query(query): Query<ListQuery>,
) -> Result<Json<ListResponse>, PipelineError> {
    let filter = EventFilter {
        lead_id: query.lead_id,
        actor: query.actor,
        kind: query.kind,
    };
    let events = state
        .engine
        .list_events(filter, Page::new(query.page, query.limit))
        .await?;
    Ok(Json(ListResponse { events }))
}
