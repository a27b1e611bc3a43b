//! Schedule store: CRUD plus due-schedule queries and run bookkeeping.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, QueryBuilder};
use uuid::Uuid;

use postline_core::ResourceId;
use postline_core::schedule::{NewSchedule, RunOutcome, Schedule, SchedulePatch};

use crate::{DbError, DbResult};

/// Column list for `schedules` queries; keep in sync with `ScheduleRow`.
const SCHEDULE_COLUMNS: &str = "\
    id, name, enabled, topic_source, topic_list, topic_index, \
    category, template, target_reader, keywords, \
    cron_expression, timezone, \
    last_run_at, next_run_at, last_job_id, \
    run_count, error_count, last_error, \
    created_at, updated_at";

/// Durable CRUD for recurring triggers.
#[async_trait]
pub trait ScheduleStore: Send + Sync {
    async fn create(&self, inputs: &NewSchedule) -> DbResult<Schedule>;
    async fn get(&self, id: ResourceId) -> DbResult<Schedule>;
    async fn list(&self) -> DbResult<Vec<Schedule>>;
    async fn update(&self, id: ResourceId, patch: &SchedulePatch) -> DbResult<Schedule>;
    async fn delete(&self, id: ResourceId) -> DbResult<()>;

    /// Schedules with `enabled` and `next_run_at <= now`.
    async fn due(&self, now: DateTime<Utc>) -> DbResult<Vec<Schedule>>;

    /// Record a firing: timestamps, counters, rotation, and the next slot.
    async fn mark_run(&self, id: ResourceId, outcome: &RunOutcome) -> DbResult<Schedule>;
}

/// PostgreSQL implementation of `ScheduleStore`.
pub struct PgScheduleStore {
    pool: PgPool,
}

impl PgScheduleStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ScheduleRow {
    id: Uuid,
    name: String,
    enabled: bool,
    topic_source: String,
    topic_list: serde_json::Value,
    topic_index: i32,
    category: String,
    template: Option<String>,
    target_reader: Option<String>,
    keywords: serde_json::Value,
    cron_expression: String,
    timezone: String,
    last_run_at: Option<DateTime<Utc>>,
    next_run_at: Option<DateTime<Utc>>,
    last_job_id: Option<Uuid>,
    run_count: i32,
    error_count: i32,
    last_error: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ScheduleRow> for Schedule {
    type Error = DbError;

    fn try_from(row: ScheduleRow) -> DbResult<Schedule> {
        let template = row
            .template
            .as_deref()
            .map(|t| t.parse().map_err(DbError::Decode))
            .transpose()?;
        Ok(Schedule {
            id: ResourceId::from_uuid(row.id),
            name: row.name,
            enabled: row.enabled,
            topic_source: row.topic_source.parse().map_err(DbError::Decode)?,
            topic_list: serde_json::from_value(row.topic_list)?,
            topic_index: row.topic_index,
            category: row.category.parse().map_err(DbError::Decode)?,
            template,
            target_reader: row.target_reader,
            keywords: serde_json::from_value(row.keywords)?,
            cron_expression: row.cron_expression,
            timezone: row.timezone,
            last_run_at: row.last_run_at,
            next_run_at: row.next_run_at,
            last_job_id: row.last_job_id.map(ResourceId::from_uuid),
            run_count: row.run_count,
            error_count: row.error_count,
            last_error: row.last_error,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[async_trait]
impl ScheduleStore for PgScheduleStore {
    async fn create(&self, inputs: &NewSchedule) -> DbResult<Schedule> {
        let query = format!(
            "INSERT INTO schedules \
                 (id, name, enabled, topic_source, topic_list, category, template, \
                  target_reader, keywords, cron_expression, timezone, next_run_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12) \
             RETURNING {SCHEDULE_COLUMNS}"
        );
        let row = sqlx::query_as::<_, ScheduleRow>(&query)
            .bind(Uuid::now_v7())
            .bind(&inputs.name)
            .bind(inputs.enabled)
            .bind(inputs.topic_source.as_str())
            .bind(serde_json::to_value(&inputs.topic_list)?)
            .bind(inputs.category.as_str())
            .bind(inputs.template.map(|t| t.as_str()))
            .bind(&inputs.target_reader)
            .bind(serde_json::to_value(&inputs.keywords)?)
            .bind(&inputs.cron_expression)
            .bind(&inputs.timezone)
            .bind(inputs.next_run_at)
            .fetch_one(&self.pool)
            .await?;
        row.try_into()
    }

    async fn get(&self, id: ResourceId) -> DbResult<Schedule> {
        let query = format!("SELECT {SCHEDULE_COLUMNS} FROM schedules WHERE id = $1");
        let row = sqlx::query_as::<_, ScheduleRow>(&query)
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DbError::NotFound(format!("schedule {id}")))?;
        row.try_into()
    }

    async fn list(&self) -> DbResult<Vec<Schedule>> {
        let query = format!("SELECT {SCHEDULE_COLUMNS} FROM schedules ORDER BY name");
        let rows = sqlx::query_as::<_, ScheduleRow>(&query)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(Schedule::try_from).collect()
    }

    async fn update(&self, id: ResourceId, patch: &SchedulePatch) -> DbResult<Schedule> {
        let mut builder = QueryBuilder::new("UPDATE schedules SET updated_at = NOW()");
        if let Some(name) = &patch.name {
            builder.push(", name = ").push_bind(name);
        }
        if let Some(enabled) = patch.enabled {
            builder.push(", enabled = ").push_bind(enabled);
        }
        if let Some(source) = patch.topic_source {
            builder.push(", topic_source = ").push_bind(source.as_str());
        }
        if let Some(list) = &patch.topic_list {
            builder
                .push(", topic_list = ")
                .push_bind(serde_json::to_value(list)?);
        }
        if let Some(index) = patch.topic_index {
            builder.push(", topic_index = ").push_bind(index);
        }
        if let Some(category) = patch.category {
            builder.push(", category = ").push_bind(category.as_str());
        }
        if let Some(template) = &patch.template {
            builder
                .push(", template = ")
                .push_bind(template.map(|t| t.as_str()));
        }
        if let Some(reader) = &patch.target_reader {
            builder.push(", target_reader = ").push_bind(reader.clone());
        }
        if let Some(keywords) = &patch.keywords {
            builder
                .push(", keywords = ")
                .push_bind(serde_json::to_value(keywords)?);
        }
        if let Some(expr) = &patch.cron_expression {
            builder.push(", cron_expression = ").push_bind(expr);
        }
        if let Some(tz) = &patch.timezone {
            builder.push(", timezone = ").push_bind(tz);
        }
        if let Some(next) = &patch.next_run_at {
            builder.push(", next_run_at = ").push_bind(*next);
        }
        builder
            .push(" WHERE id = ")
            .push_bind(*id.as_uuid())
            .push(format!(" RETURNING {SCHEDULE_COLUMNS}"));

        let row: Option<ScheduleRow> = builder.build_query_as().fetch_optional(&self.pool).await?;
        row.ok_or_else(|| DbError::NotFound(format!("schedule {id}")))?
            .try_into()
    }

    async fn delete(&self, id: ResourceId) -> DbResult<()> {
        let result = sqlx::query("DELETE FROM schedules WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(DbError::NotFound(format!("schedule {id}")));
        }
        Ok(())
    }

    async fn due(&self, now: DateTime<Utc>) -> DbResult<Vec<Schedule>> {
        let query = format!(
            "SELECT {SCHEDULE_COLUMNS} FROM schedules \
             WHERE enabled = TRUE AND next_run_at IS NOT NULL AND next_run_at <= $1 \
             ORDER BY next_run_at ASC"
        );
        let rows = sqlx::query_as::<_, ScheduleRow>(&query)
            .bind(now)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(Schedule::try_from).collect()
    }

    async fn mark_run(&self, id: ResourceId, outcome: &RunOutcome) -> DbResult<Schedule> {
        let (run_inc, error_inc) = if outcome.success { (1, 0) } else { (0, 1) };
        let query = format!(
            "UPDATE schedules SET \
                 last_run_at = $2, \
                 next_run_at = $3, \
                 run_count = run_count + $4, \
                 error_count = error_count + $5, \
                 last_job_id = COALESCE($6, last_job_id), \
                 last_error = $7, \
                 topic_index = COALESCE($8, topic_index), \
                 updated_at = NOW() \
             WHERE id = $1 \
             RETURNING {SCHEDULE_COLUMNS}"
        );
        let row = sqlx::query_as::<_, ScheduleRow>(&query)
            .bind(id.as_uuid())
            .bind(outcome.ran_at)
            .bind(outcome.next_run_at)
            .bind(run_inc)
            .bind(error_inc)
            .bind(outcome.job_id.map(|j| *j.as_uuid()))
            .bind(&outcome.error)
            .bind(outcome.topic_index)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DbError::NotFound(format!("schedule {id}")))?;
        row.try_into()
    }
}
