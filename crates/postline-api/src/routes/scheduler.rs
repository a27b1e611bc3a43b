//! Internal scheduler trigger endpoint.
//!
//! An external periodic caller (cron, a systemd timer, an uptime monitor)
//! POSTs here to process due schedules. Guarded by a shared-secret header;
//! leaving the secret unconfigured disables the endpoint.

use axum::extract::State;
use axum::http::HeaderMap;
use axum::routing::post;
use axum::{Json, Router};

use postline_scheduler::TriggerReport;

use crate::AppState;
use crate::error::ApiError;

const SECRET_HEADER: &str = "x-postline-secret";

pub fn router() -> Router<AppState> {
    Router::new().route("/run", post(run_due_schedules))
}

async fn run_due_schedules(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<TriggerReport>, ApiError> {
    let Some(secret) = &state.config.scheduler_secret else {
        return Err(ApiError::Unauthorized(
            "scheduler trigger is not configured".to_string(),
        ));
    };
    let provided = headers.get(SECRET_HEADER).and_then(|v| v.to_str().ok());
    if provided != Some(secret.as_str()) {
        return Err(ApiError::Unauthorized(
            "bad or missing trigger secret".to_string(),
        ));
    }

    let report = state.trigger.process_due().await?;
    Ok(Json(report))
}
