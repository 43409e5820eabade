use std::future::ready;
use std::sync::Arc;

use axum::{routing::get, Router};
use tower_http::trace::TraceLayer;

use crate::engine::PipelineEngine;
use crate::handlers;
use crate::prometheus::{setup_metrics_recorder, track_metrics};

#[derive(Clone)]
pub struct State {
    pub engine: Arc<PipelineEngine>,
}

async fn index() -> &'static str {
    "pipeline"
}

async fn liveness() -> &'static str {
    "ok"
}

pub fn router(engine: PipelineEngine, metrics: bool) -> Router {
    let state = State {
        engine: Arc::new(engine),
    };

    let router = handlers::add_routes(Router::new())
        .route("/", get(index))
        .route("/_liveness", get(liveness))
        .layer(TraceLayer::new_for_http())
        .layer(axum::middleware::from_fn(track_metrics))
        .with_state(state);

    // Don't install metrics unless asked to
    // Installing a global recorder when the engine is used as a library
    // (during tests etc) does not work well.
    if metrics {
        let recorder_handle = setup_metrics_recorder();

        router.route("/metrics", get(move || ready(recorder_handle.render())))
    } else {
        router
    }
}
