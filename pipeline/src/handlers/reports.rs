use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::api::PipelineError;
use crate::router;
use crate::store::StageCount;

#[derive(Serialize)]
pub struct FunnelResponse {
    pub stages: Vec<StageCount>,
}

pub async fn funnel(
    State(state): State<router::State>,
) -> Result<Json<FunnelResponse>, PipelineError> {
    let stages = state.engine.funnel_counts().await?;
    Ok(Json(FunnelResponse { stages }))
}
