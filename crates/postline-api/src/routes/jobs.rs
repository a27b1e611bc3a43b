//! Job management endpoints: CRUD, the two decision write paths, and the
//! on-hold resume.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use postline_core::ResourceId;
use postline_core::job::{Category, Job, JobPatch, NewJob, Template};
use postline_core::progress::{EventStatus, LogEntry, NewLogEntry};
use postline_core::status::{JobStatus, ReviewDecision};
use postline_db::JobFilter;

use crate::AppState;
use crate::error::ApiError;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_jobs).post(create_job))
        .route("/{id}", get(get_job).delete(delete_job))
        .route("/{id}/logs", get(get_job_logs))
        .route("/{id}/review", post(submit_review))
        .route("/{id}/deploy", post(submit_deploy))
        .route("/{id}/resume", post(resume_job))
}

#[derive(Debug, Deserialize)]
struct CreateJobRequest {
    topic: String,
    category: Category,
    template: Option<Template>,
    target_reader: Option<String>,
    #[serde(default)]
    keywords: Vec<String>,
}

async fn create_job(
    State(state): State<AppState>,
    Json(req): Json<CreateJobRequest>,
) -> Result<(StatusCode, Json<Job>), ApiError> {
    if req.topic.trim().is_empty() {
        return Err(ApiError::BadRequest("topic must not be empty".to_string()));
    }
    let job = state
        .jobs
        .create(&NewJob {
            topic: req.topic,
            category: req.category,
            template: req.template,
            target_reader: req.target_reader,
            keywords: req.keywords,
        })
        .await?;

    // triggering returns immediately; the run is a detached task
    state.engine.spawn(job.id);
    Ok((StatusCode::CREATED, Json(job)))
}

#[derive(Debug, Deserialize)]
struct ListJobsQuery {
    status: Option<String>,
    category: Option<String>,
    q: Option<String>,
    limit: Option<i64>,
    offset: Option<i64>,
}

#[derive(Debug, Serialize)]
struct JobListResponse {
    jobs: Vec<Job>,
    total: i64,
}

async fn list_jobs(
    State(state): State<AppState>,
    Query(query): Query<ListJobsQuery>,
) -> Result<Json<JobListResponse>, ApiError> {
    let status = query
        .status
        .as_deref()
        .map(|s| s.parse::<JobStatus>())
        .transpose()
        .map_err(ApiError::BadRequest)?;
    let category = query
        .category
        .as_deref()
        .map(|c| c.parse::<Category>())
        .transpose()
        .map_err(ApiError::BadRequest)?;

    let (jobs, total) = state
        .jobs
        .list(&JobFilter {
            status,
            category,
            search: query.q,
            limit: query.limit,
            offset: query.offset,
        })
        .await?;
    Ok(Json(JobListResponse { jobs, total }))
}

async fn get_job(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Job>, ApiError> {
    let job = state.jobs.get(ResourceId::from_uuid(id)).await?;
    Ok(Json(job))
}

async fn get_job_logs(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<LogEntry>>, ApiError> {
    let id = ResourceId::from_uuid(id);
    // distinguish "no such job" from "no logs yet"
    state.jobs.get(id).await?;
    let logs = state.jobs.logs(id).await?;
    Ok(Json(logs))
}

async fn delete_job(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state.jobs.delete(ResourceId::from_uuid(id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
struct ReviewRequest {
    decision: ReviewDecision,
    feedback: Option<String>,
}

/// Record the human-review decision. The engine's wait loop picks it up on
/// its next poll.
async fn submit_review(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<ReviewRequest>,
) -> Result<Json<Job>, ApiError> {
    let id = ResourceId::from_uuid(id);
    let job = state.jobs.get(id).await?;
    if job.status != JobStatus::HumanReview {
        return Err(ApiError::Conflict(format!(
            "job is {}, not awaiting review",
            job.status
        )));
    }

    let patch = match req.decision {
        ReviewDecision::Approve => JobPatch {
            human_approval: Some(Some(true)),
            ..Default::default()
        },
        ReviewDecision::Feedback | ReviewDecision::Rewrite => JobPatch {
            human_approval: Some(Some(false)),
            human_feedback: Some(req.feedback),
            ..Default::default()
        },
        ReviewDecision::Hold => JobPatch {
            status: Some(JobStatus::OnHold),
            ..Default::default()
        },
    };
    let updated = state.jobs.update(id, &patch).await?;
    Ok(Json(updated))
}

#[derive(Debug, Deserialize)]
struct DeployRequest {
    approve: bool,
}

/// Record the deploy decision: approve moves the job to `deploying` for the
/// waiting engine; reject closes it out with no published artifact.
async fn submit_deploy(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<DeployRequest>,
) -> Result<Json<Job>, ApiError> {
    let id = ResourceId::from_uuid(id);
    let job = state.jobs.get(id).await?;
    if job.status != JobStatus::PendingDeploy {
        return Err(ApiError::Conflict(format!(
            "job is {}, not awaiting deploy approval",
            job.status
        )));
    }

    let updated = if req.approve {
        state
            .jobs
            .update(
                id,
                &JobPatch {
                    status: Some(JobStatus::Deploying),
                    ..Default::default()
                },
            )
            .await?
    } else {
        // log first: a terminal job never grows new entries
        state
            .jobs
            .append_log(&NewLogEntry::new(
                id,
                "deploy",
                EventStatus::Completed,
                "Deploy declined; job closed without publishing",
            ))
            .await?;
        state
            .jobs
            .update(id, &JobPatch::transition(JobStatus::Completed, "deploy", 100))
            .await?
    };
    Ok(Json(updated))
}

/// Reactivate a held job: back to `human_review`, engine relaunched.
async fn resume_job(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Job>, ApiError> {
    let id = ResourceId::from_uuid(id);
    let job = state.jobs.get(id).await?;
    if job.status != JobStatus::OnHold {
        return Err(ApiError::Conflict(format!("job is {}, not on hold", job.status)));
    }
    let updated = state
        .jobs
        .update(
            id,
            &JobPatch {
                status: Some(JobStatus::HumanReview),
                ..Default::default()
            },
        )
        .await?;
    state.engine.spawn(id);
    Ok(Json(updated))
}
