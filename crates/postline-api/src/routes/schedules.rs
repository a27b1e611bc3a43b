//! Schedule management endpoints.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use postline_core::ResourceId;
use postline_core::job::{Category, Template};
use postline_core::schedule::{NewSchedule, Schedule, SchedulePatch, TopicSource};
use postline_scheduler::{CronSpec, parse_timezone};

use crate::AppState;
use crate::error::ApiError;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_schedules).post(create_schedule))
        .route(
            "/{id}",
            get(get_schedule).put(update_schedule).delete(delete_schedule),
        )
}

async fn list_schedules(State(state): State<AppState>) -> Result<Json<Vec<Schedule>>, ApiError> {
    Ok(Json(state.schedules.list().await?))
}

async fn get_schedule(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Schedule>, ApiError> {
    let schedule = state.schedules.get(ResourceId::from_uuid(id)).await?;
    Ok(Json(schedule))
}

#[derive(Debug, Deserialize)]
struct CreateScheduleRequest {
    name: String,
    #[serde(default = "default_enabled")]
    enabled: bool,
    topic_source: TopicSource,
    #[serde(default)]
    topic_list: Vec<String>,
    category: Category,
    template: Option<Template>,
    target_reader: Option<String>,
    #[serde(default)]
    keywords: Vec<String>,
    cron_expression: String,
    #[serde(default = "default_timezone")]
    timezone: String,
}

fn default_enabled() -> bool {
    true
}

fn default_timezone() -> String {
    "UTC".to_string()
}

async fn create_schedule(
    State(state): State<AppState>,
    Json(req): Json<CreateScheduleRequest>,
) -> Result<(StatusCode, Json<Schedule>), ApiError> {
    if req.name.trim().is_empty() {
        return Err(ApiError::BadRequest("name must not be empty".to_string()));
    }
    let spec = CronSpec::parse(&req.cron_expression)
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;
    let next_run_at = spec.next_run(Utc::now(), parse_timezone(&req.timezone));

    let schedule = state
        .schedules
        .create(&NewSchedule {
            name: req.name,
            enabled: req.enabled,
            topic_source: req.topic_source,
            topic_list: req.topic_list,
            category: req.category,
            template: req.template,
            target_reader: req.target_reader,
            keywords: req.keywords,
            cron_expression: req.cron_expression,
            timezone: req.timezone,
            next_run_at: Some(next_run_at),
        })
        .await?;
    Ok((StatusCode::CREATED, Json(schedule)))
}

#[derive(Debug, Deserialize)]
struct UpdateScheduleRequest {
    name: Option<String>,
    enabled: Option<bool>,
    topic_source: Option<TopicSource>,
    topic_list: Option<Vec<String>>,
    topic_index: Option<i32>,
    category: Option<Category>,
    template: Option<Option<Template>>,
    target_reader: Option<Option<String>>,
    keywords: Option<Vec<String>>,
    cron_expression: Option<String>,
    timezone: Option<String>,
}

async fn update_schedule(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateScheduleRequest>,
) -> Result<Json<Schedule>, ApiError> {
    let id = ResourceId::from_uuid(id);
    let current = state.schedules.get(id).await?;

    // a cadence edit moves the next slot immediately
    let next_run_at = if req.cron_expression.is_some() || req.timezone.is_some() {
        let expr = req
            .cron_expression
            .as_deref()
            .unwrap_or(&current.cron_expression);
        let tz = req.timezone.as_deref().unwrap_or(&current.timezone);
        let spec =
            CronSpec::parse(expr).map_err(|e| ApiError::BadRequest(e.to_string()))?;
        Some(Some(spec.next_run(Utc::now(), parse_timezone(tz))))
    } else {
        None
    };

    let updated = state
        .schedules
        .update(
            id,
            &SchedulePatch {
                name: req.name,
                enabled: req.enabled,
                topic_source: req.topic_source,
                topic_list: req.topic_list,
                topic_index: req.topic_index,
                category: req.category,
                template: req.template,
                target_reader: req.target_reader,
                keywords: req.keywords,
                cron_expression: req.cron_expression,
                timezone: req.timezone,
                next_run_at,
            },
        )
        .await?;
    Ok(Json(updated))
}

async fn delete_schedule(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state.schedules.delete(ResourceId::from_uuid(id)).await?;
    Ok(StatusCode::NO_CONTENT)
}
