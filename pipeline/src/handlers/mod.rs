use axum::{
    routing::{get, post},
    Router,
};

use crate::router::State;

pub mod events;
pub mod leads;
pub mod reports;
pub mod tasks;

pub fn add_routes(router: Router<State>) -> Router<State> {
    router
        .route("/api/events", post(events::create).get(events::list))
        .route("/api/leads", post(leads::create).get(leads::list))
        .route("/api/leads/bulk", post(leads::bulk))
        .route("/api/leads/by-key", get(leads::by_key))
        .route("/api/leads/:id", get(leads::show).patch(leads::update))
        .route("/api/tasks", post(tasks::create).get(tasks::list))
        .route("/api/tasks/overdue", get(tasks::overdue))
        .route(
            "/api/tasks/:id",
            axum::routing::patch(tasks::update).delete(tasks::remove),
        )
        .route("/api/reports/funnel", get(reports::funnel))
}
