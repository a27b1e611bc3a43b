//! API routes.

pub mod health;
pub mod jobs;
pub mod scheduler;
pub mod schedules;

use axum::Router;
use axum::routing::get;

use crate::AppState;
use crate::ws::progress_ws;

/// Build the main API router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .nest("/api/v1", api_router())
        .nest("/internal/scheduler", scheduler::router())
        .route("/ws/jobs/{id}/progress", get(progress_ws))
        .merge(health::router())
        .with_state(state)
}

fn api_router() -> Router<AppState> {
    Router::new()
        .nest("/jobs", jobs::router())
        .nest("/schedules", schedules::router())
}
