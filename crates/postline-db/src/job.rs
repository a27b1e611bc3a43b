//! Job store: CRUD plus the append-only progress log.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, QueryBuilder};
use uuid::Uuid;

use postline_core::ResourceId;
use postline_core::job::{Job, JobPatch, NewJob};
use postline_core::progress::{LogEntry, NewLogEntry};

use crate::{DbError, DbResult};

/// Column list for `jobs` queries; keep in sync with `JobRow`.
const JOB_COLUMNS: &str = "\
    id, topic, category, template, target_reader, keywords, \
    status, current_step, progress, \
    research_data, draft_content, final_content, metadata, \
    review_result, validation_result, \
    human_approval, human_feedback, \
    filepath, pr_result, commit_hash, error, \
    created_at, updated_at";

const LOG_COLUMNS: &str = "id, job_id, step, status, message, data, created_at";

/// Default page size for job listing.
const DEFAULT_LIMIT: i64 = 50;

/// Maximum page size for job listing.
const MAX_LIMIT: i64 = 100;

/// Listing filters. Free-text `search` matches the topic.
#[derive(Debug, Clone, Default)]
pub struct JobFilter {
    pub status: Option<postline_core::status::JobStatus>,
    pub category: Option<postline_core::job::Category>,
    pub search: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl JobFilter {
    pub fn page(&self) -> (i64, i64) {
        let limit = self.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
        let offset = self.offset.unwrap_or(0).max(0);
        (limit, offset)
    }
}

/// Durable CRUD plus the append-only event log for jobs.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Create a job in `queued` with progress 0.
    async fn create(&self, inputs: &NewJob) -> DbResult<Job>;

    /// `DbError::NotFound` is an expected outcome, distinct from failure.
    async fn get(&self, id: ResourceId) -> DbResult<Job>;

    /// Filtered, paginated listing; returns the page and the total count.
    async fn list(&self, filter: &JobFilter) -> DbResult<(Vec<Job>, i64)>;

    /// Partial merge; always bumps `updated_at`.
    async fn update(&self, id: ResourceId, patch: &JobPatch) -> DbResult<Job>;

    async fn append_log(&self, entry: &NewLogEntry) -> DbResult<LogEntry>;

    /// All log entries for a job, ascending by id.
    async fn logs(&self, job_id: ResourceId) -> DbResult<Vec<LogEntry>>;

    /// Delta query: entries with id greater than `cursor`, ascending.
    async fn logs_after(&self, job_id: ResourceId, cursor: i64) -> DbResult<Vec<LogEntry>>;

    /// Remove a job and (cascading) its progress log.
    async fn delete(&self, id: ResourceId) -> DbResult<()>;
}

/// PostgreSQL implementation of `JobStore`.
pub struct PgJobStore {
    pool: PgPool,
}

impl PgJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Raw `jobs` row; artifacts stay JSONB until decoded into domain types.
#[derive(Debug, sqlx::FromRow)]
struct JobRow {
    id: Uuid,
    topic: String,
    category: String,
    template: Option<String>,
    target_reader: Option<String>,
    keywords: serde_json::Value,
    status: String,
    current_step: String,
    progress: i32,
    research_data: Option<serde_json::Value>,
    draft_content: Option<String>,
    final_content: Option<String>,
    metadata: Option<serde_json::Value>,
    review_result: Option<serde_json::Value>,
    validation_result: Option<serde_json::Value>,
    human_approval: Option<bool>,
    human_feedback: Option<String>,
    filepath: Option<String>,
    pr_result: Option<serde_json::Value>,
    commit_hash: Option<String>,
    error: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<JobRow> for Job {
    type Error = DbError;

    fn try_from(row: JobRow) -> DbResult<Job> {
        let template = row
            .template
            .as_deref()
            .map(|t| t.parse().map_err(DbError::Decode))
            .transpose()?;
        Ok(Job {
            id: ResourceId::from_uuid(row.id),
            topic: row.topic,
            category: row.category.parse().map_err(DbError::Decode)?,
            template,
            target_reader: row.target_reader,
            keywords: serde_json::from_value(row.keywords)?,
            status: row.status.parse().map_err(DbError::Decode)?,
            current_step: row.current_step,
            progress: row.progress,
            research_data: row.research_data.map(serde_json::from_value).transpose()?,
            draft_content: row.draft_content,
            final_content: row.final_content,
            metadata: row.metadata.map(serde_json::from_value).transpose()?,
            review_result: row.review_result.map(serde_json::from_value).transpose()?,
            validation_result: row
                .validation_result
                .map(serde_json::from_value)
                .transpose()?,
            human_approval: row.human_approval,
            human_feedback: row.human_feedback,
            filepath: row.filepath,
            pr_result: row.pr_result.map(serde_json::from_value).transpose()?,
            commit_hash: row.commit_hash,
            error: row.error,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Raw `job_logs` row.
#[derive(Debug, sqlx::FromRow)]
struct LogRow {
    id: i64,
    job_id: Uuid,
    step: String,
    status: String,
    message: String,
    data: Option<serde_json::Value>,
    created_at: DateTime<Utc>,
}

impl TryFrom<LogRow> for LogEntry {
    type Error = DbError;

    fn try_from(row: LogRow) -> DbResult<LogEntry> {
        Ok(LogEntry {
            id: row.id,
            job_id: ResourceId::from_uuid(row.job_id),
            step: row.step,
            status: row.status.parse().map_err(DbError::Decode)?,
            message: row.message,
            data: row.data,
            created_at: row.created_at,
        })
    }
}

/// Push the filter's WHERE clause onto a builder (shared by SELECT and
/// COUNT so both always agree).
fn push_filter(builder: &mut QueryBuilder<'_, sqlx::Postgres>, filter: &JobFilter) {
    let mut prefix = " WHERE ";
    if let Some(status) = filter.status {
        builder.push(prefix).push("status = ").push_bind(status.as_str());
        prefix = " AND ";
    }
    if let Some(category) = filter.category {
        builder
            .push(prefix)
            .push("category = ")
            .push_bind(category.as_str());
        prefix = " AND ";
    }
    if let Some(search) = &filter.search {
        builder
            .push(prefix)
            .push("topic ILIKE ")
            .push_bind(format!("%{search}%"));
    }
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn create(&self, inputs: &NewJob) -> DbResult<Job> {
        let query = format!(
            "INSERT INTO jobs (id, topic, category, template, target_reader, keywords, status, current_step, progress) \
             VALUES ($1, $2, $3, $4, $5, $6, 'queued', '', 0) \
             RETURNING {JOB_COLUMNS}"
        );
        let row = sqlx::query_as::<_, JobRow>(&query)
            .bind(Uuid::now_v7())
            .bind(&inputs.topic)
            .bind(inputs.category.as_str())
            .bind(inputs.template.map(|t| t.as_str()))
            .bind(&inputs.target_reader)
            .bind(serde_json::to_value(&inputs.keywords)?)
            .fetch_one(&self.pool)
            .await?;
        row.try_into()
    }

    async fn get(&self, id: ResourceId) -> DbResult<Job> {
        let query = format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = $1");
        let row = sqlx::query_as::<_, JobRow>(&query)
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DbError::NotFound(format!("job {id}")))?;
        row.try_into()
    }

    async fn list(&self, filter: &JobFilter) -> DbResult<(Vec<Job>, i64)> {
        let (limit, offset) = filter.page();

        let mut count = QueryBuilder::new("SELECT COUNT(*) FROM jobs");
        push_filter(&mut count, filter);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        let mut select = QueryBuilder::new(format!("SELECT {JOB_COLUMNS} FROM jobs"));
        push_filter(&mut select, filter);
        select
            .push(" ORDER BY created_at DESC LIMIT ")
            .push_bind(limit)
            .push(" OFFSET ")
            .push_bind(offset);
        let rows: Vec<JobRow> = select.build_query_as().fetch_all(&self.pool).await?;

        let jobs = rows
            .into_iter()
            .map(Job::try_from)
            .collect::<DbResult<Vec<_>>>()?;
        Ok((jobs, total))
    }

    async fn update(&self, id: ResourceId, patch: &JobPatch) -> DbResult<Job> {
        let mut builder = QueryBuilder::new("UPDATE jobs SET updated_at = NOW()");
        if let Some(status) = patch.status {
            builder.push(", status = ").push_bind(status.as_str());
        }
        if let Some(step) = &patch.current_step {
            builder.push(", current_step = ").push_bind(step);
        }
        if let Some(progress) = patch.progress {
            builder.push(", progress = ").push_bind(progress);
        }
        if let Some(research) = &patch.research_data {
            builder
                .push(", research_data = ")
                .push_bind(serde_json::to_value(research)?);
        }
        if let Some(draft) = &patch.draft_content {
            builder.push(", draft_content = ").push_bind(draft);
        }
        if let Some(final_content) = &patch.final_content {
            builder.push(", final_content = ").push_bind(final_content);
        }
        if let Some(metadata) = &patch.metadata {
            builder
                .push(", metadata = ")
                .push_bind(serde_json::to_value(metadata)?);
        }
        if let Some(review) = &patch.review_result {
            builder
                .push(", review_result = ")
                .push_bind(serde_json::to_value(review)?);
        }
        if let Some(validation) = &patch.validation_result {
            builder
                .push(", validation_result = ")
                .push_bind(serde_json::to_value(validation)?);
        }
        if let Some(approval) = &patch.human_approval {
            builder.push(", human_approval = ").push_bind(*approval);
        }
        if let Some(feedback) = &patch.human_feedback {
            builder.push(", human_feedback = ").push_bind(feedback.clone());
        }
        if let Some(filepath) = &patch.filepath {
            builder.push(", filepath = ").push_bind(filepath);
        }
        if let Some(pr) = &patch.pr_result {
            builder
                .push(", pr_result = ")
                .push_bind(serde_json::to_value(pr)?);
        }
        if let Some(commit) = &patch.commit_hash {
            builder.push(", commit_hash = ").push_bind(commit);
        }
        if let Some(error) = &patch.error {
            builder.push(", error = ").push_bind(error);
        }
        builder
            .push(" WHERE id = ")
            .push_bind(*id.as_uuid())
            .push(format!(" RETURNING {JOB_COLUMNS}"));

        let row: Option<JobRow> = builder.build_query_as().fetch_optional(&self.pool).await?;
        row.ok_or_else(|| DbError::NotFound(format!("job {id}")))?.try_into()
    }

    async fn append_log(&self, entry: &NewLogEntry) -> DbResult<LogEntry> {
        let query = format!(
            "INSERT INTO job_logs (job_id, step, status, message, data) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING {LOG_COLUMNS}"
        );
        let row = sqlx::query_as::<_, LogRow>(&query)
            .bind(entry.job_id.as_uuid())
            .bind(&entry.step)
            .bind(entry.status.as_str())
            .bind(&entry.message)
            .bind(&entry.data)
            .fetch_one(&self.pool)
            .await?;
        row.try_into()
    }

    async fn logs(&self, job_id: ResourceId) -> DbResult<Vec<LogEntry>> {
        self.logs_after(job_id, 0).await
    }

    async fn logs_after(&self, job_id: ResourceId, cursor: i64) -> DbResult<Vec<LogEntry>> {
        let query = format!(
            "SELECT {LOG_COLUMNS} FROM job_logs \
             WHERE job_id = $1 AND id > $2 \
             ORDER BY id ASC"
        );
        let rows = sqlx::query_as::<_, LogRow>(&query)
            .bind(job_id.as_uuid())
            .bind(cursor)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(LogEntry::try_from).collect()
    }

    async fn delete(&self, id: ResourceId) -> DbResult<()> {
        let result = sqlx::query("DELETE FROM jobs WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(DbError::NotFound(format!("job {id}")));
        }
        Ok(())
    }
}
