use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::event::EventKind;
use crate::store::StoreError;

/// Everything an engine operation can fail with.
///
/// `ValidationFailed` is additionally recovered locally inside the bulk
/// ingestion loop (counted as skipped); every other kind aborts the single
/// operation it occurred in and is surfaced verbatim.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("no transition rule for event kind: {0}")]
    UnknownEventKind(EventKind),

    #[error("validation failed: {0}")]
    ValidationFailed(String),

    #[error("a lead with this external key already exists")]
    Conflict,

    #[error("store unavailable: {0}")]
    StoreUnavailable(StoreError),
}

impl From<StoreError> for PipelineError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::UniqueViolation => PipelineError::Conflict,
            other => PipelineError::StoreUnavailable(other),
        }
    }
}

impl IntoResponse for PipelineError {
    fn into_response(self) -> Response {
        match self {
            PipelineError::NotFound(_) => (StatusCode::NOT_FOUND, self.to_string()),

            PipelineError::UnknownEventKind(_) | PipelineError::ValidationFailed(_) => {
                (StatusCode::BAD_REQUEST, self.to_string())
            }

            PipelineError::Conflict => (StatusCode::CONFLICT, self.to_string()),

            PipelineError::StoreUnavailable(_) => {
                (StatusCode::SERVICE_UNAVAILABLE, self.to_string())
            }
        }
        .into_response()
    }
}
