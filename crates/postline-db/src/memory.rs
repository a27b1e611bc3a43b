//! In-memory store implementations.
//!
//! Back the engine and scheduler in tests and local development without a
//! database. Behavior mirrors the PostgreSQL stores, including the
//! store-wide log sequence and NotFound semantics.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use postline_core::ResourceId;
use postline_core::job::{Job, JobPatch, NewJob};
use postline_core::progress::{LogEntry, NewLogEntry};
use postline_core::schedule::{NewSchedule, RunOutcome, Schedule, SchedulePatch};

use crate::job::{JobFilter, JobStore};
use crate::schedule::ScheduleStore;
use crate::{DbError, DbResult};

/// In-memory `JobStore`.
#[derive(Default)]
pub struct MemoryJobStore {
    jobs: RwLock<HashMap<Uuid, Job>>,
    logs: RwLock<Vec<LogEntry>>,
    seq: AtomicI64,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn create(&self, inputs: &NewJob) -> DbResult<Job> {
        let job = Job::create(inputs);
        self.jobs.write().await.insert(*job.id.as_uuid(), job.clone());
        Ok(job)
    }

    async fn get(&self, id: ResourceId) -> DbResult<Job> {
        self.jobs
            .read()
            .await
            .get(id.as_uuid())
            .cloned()
            .ok_or_else(|| DbError::NotFound(format!("job {id}")))
    }

    async fn list(&self, filter: &JobFilter) -> DbResult<(Vec<Job>, i64)> {
        let jobs = self.jobs.read().await;
        let mut matched: Vec<Job> = jobs
            .values()
            .filter(|job| filter.status.is_none_or(|s| job.status == s))
            .filter(|job| filter.category.is_none_or(|c| job.category == c))
            .filter(|job| {
                filter
                    .search
                    .as_deref()
                    .is_none_or(|q| job.topic.to_lowercase().contains(&q.to_lowercase()))
            })
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let total = matched.len() as i64;
        let (limit, offset) = filter.page();
        let page = matched
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect();
        Ok((page, total))
    }

    async fn update(&self, id: ResourceId, patch: &JobPatch) -> DbResult<Job> {
        let mut jobs = self.jobs.write().await;
        let job = jobs
            .get(id.as_uuid())
            .ok_or_else(|| DbError::NotFound(format!("job {id}")))?;
        let mut updated = job.apply(patch);
        updated.updated_at = Utc::now();
        jobs.insert(*id.as_uuid(), updated.clone());
        Ok(updated)
    }

    async fn append_log(&self, entry: &NewLogEntry) -> DbResult<LogEntry> {
        let log = LogEntry {
            id: self.seq.fetch_add(1, Ordering::SeqCst) + 1,
            job_id: entry.job_id,
            step: entry.step.clone(),
            status: entry.status,
            message: entry.message.clone(),
            data: entry.data.clone(),
            created_at: Utc::now(),
        };
        self.logs.write().await.push(log.clone());
        Ok(log)
    }

    async fn logs(&self, job_id: ResourceId) -> DbResult<Vec<LogEntry>> {
        self.logs_after(job_id, 0).await
    }

    async fn logs_after(&self, job_id: ResourceId, cursor: i64) -> DbResult<Vec<LogEntry>> {
        Ok(self
            .logs
            .read()
            .await
            .iter()
            .filter(|entry| entry.job_id == job_id && entry.id > cursor)
            .cloned()
            .collect())
    }

    async fn delete(&self, id: ResourceId) -> DbResult<()> {
        let removed = self.jobs.write().await.remove(id.as_uuid());
        if removed.is_none() {
            return Err(DbError::NotFound(format!("job {id}")));
        }
        // cascade, as the foreign key would
        self.logs.write().await.retain(|entry| entry.job_id != id);
        Ok(())
    }
}

/// In-memory `ScheduleStore`.
#[derive(Default)]
pub struct MemoryScheduleStore {
    schedules: RwLock<HashMap<Uuid, Schedule>>,
}

impl MemoryScheduleStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ScheduleStore for MemoryScheduleStore {
    async fn create(&self, inputs: &NewSchedule) -> DbResult<Schedule> {
        let now = Utc::now();
        let schedule = Schedule {
            id: ResourceId::new(),
            name: inputs.name.clone(),
            enabled: inputs.enabled,
            topic_source: inputs.topic_source,
            topic_list: inputs.topic_list.clone(),
            topic_index: 0,
            category: inputs.category,
            template: inputs.template,
            target_reader: inputs.target_reader.clone(),
            keywords: inputs.keywords.clone(),
            cron_expression: inputs.cron_expression.clone(),
            timezone: inputs.timezone.clone(),
            last_run_at: None,
            next_run_at: inputs.next_run_at,
            last_job_id: None,
            run_count: 0,
            error_count: 0,
            last_error: None,
            created_at: now,
            updated_at: now,
        };
        self.schedules
            .write()
            .await
            .insert(*schedule.id.as_uuid(), schedule.clone());
        Ok(schedule)
    }

    async fn get(&self, id: ResourceId) -> DbResult<Schedule> {
        self.schedules
            .read()
            .await
            .get(id.as_uuid())
            .cloned()
            .ok_or_else(|| DbError::NotFound(format!("schedule {id}")))
    }

    async fn list(&self) -> DbResult<Vec<Schedule>> {
        let mut schedules: Vec<Schedule> = self.schedules.read().await.values().cloned().collect();
        schedules.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(schedules)
    }

    async fn update(&self, id: ResourceId, patch: &SchedulePatch) -> DbResult<Schedule> {
        let mut schedules = self.schedules.write().await;
        let schedule = schedules
            .get(id.as_uuid())
            .ok_or_else(|| DbError::NotFound(format!("schedule {id}")))?;
        let mut updated = schedule.apply(patch);
        updated.updated_at = Utc::now();
        schedules.insert(*id.as_uuid(), updated.clone());
        Ok(updated)
    }

    async fn delete(&self, id: ResourceId) -> DbResult<()> {
        self.schedules
            .write()
            .await
            .remove(id.as_uuid())
            .map(|_| ())
            .ok_or_else(|| DbError::NotFound(format!("schedule {id}")))
    }

    async fn due(&self, now: DateTime<Utc>) -> DbResult<Vec<Schedule>> {
        let mut due: Vec<Schedule> = self
            .schedules
            .read()
            .await
            .values()
            .filter(|s| s.enabled && s.next_run_at.is_some_and(|next| next <= now))
            .cloned()
            .collect();
        due.sort_by_key(|s| s.next_run_at);
        Ok(due)
    }

    async fn mark_run(&self, id: ResourceId, outcome: &RunOutcome) -> DbResult<Schedule> {
        let mut schedules = self.schedules.write().await;
        let schedule = schedules
            .get(id.as_uuid())
            .ok_or_else(|| DbError::NotFound(format!("schedule {id}")))?;
        let mut updated = schedule.record_run(outcome);
        updated.updated_at = Utc::now();
        schedules.insert(*id.as_uuid(), updated.clone());
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use postline_core::job::Category;
    use postline_core::progress::EventStatus;
    use postline_core::status::JobStatus;

    fn new_job(topic: &str, category: Category) -> NewJob {
        NewJob {
            topic: topic.into(),
            category,
            template: None,
            target_reader: None,
            keywords: vec![],
        }
    }

    #[tokio::test]
    async fn create_get_update_delete() {
        let store = MemoryJobStore::new();
        let job = store.create(&new_job("topic", Category::Tech)).await.unwrap();
        assert_eq!(job.status, JobStatus::Queued);
        assert_eq!(job.progress, 0);

        let fetched = store.get(job.id).await.unwrap();
        assert_eq!(fetched.topic, "topic");

        let updated = store
            .update(
                job.id,
                &JobPatch {
                    status: Some(JobStatus::Running),
                    progress: Some(5),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.status, JobStatus::Running);
        assert!(updated.updated_at >= job.updated_at);

        store.delete(job.id).await.unwrap();
        assert!(matches!(store.get(job.id).await, Err(DbError::NotFound(_))));
    }

    #[tokio::test]
    async fn log_ids_increase_and_cursor_queries_work() {
        let store = MemoryJobStore::new();
        let a = store.create(&new_job("a", Category::Tech)).await.unwrap();
        let b = store.create(&new_job("b", Category::Life)).await.unwrap();

        let first = store
            .append_log(&NewLogEntry::new(a.id, "research", EventStatus::Started, "x"))
            .await
            .unwrap();
        store
            .append_log(&NewLogEntry::new(b.id, "research", EventStatus::Started, "y"))
            .await
            .unwrap();
        let third = store
            .append_log(&NewLogEntry::new(a.id, "research", EventStatus::Completed, "z"))
            .await
            .unwrap();
        assert!(third.id > first.id);

        let all = store.logs(a.id).await.unwrap();
        assert_eq!(all.len(), 2);

        let delta = store.logs_after(a.id, first.id).await.unwrap();
        assert_eq!(delta.len(), 1);
        assert_eq!(delta[0].id, third.id);
    }

    #[tokio::test]
    async fn delete_cascades_to_logs() {
        let store = MemoryJobStore::new();
        let job = store.create(&new_job("a", Category::Tech)).await.unwrap();
        store
            .append_log(&NewLogEntry::new(job.id, "research", EventStatus::Started, "x"))
            .await
            .unwrap();
        store.delete(job.id).await.unwrap();
        assert!(store.logs(job.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn list_filters_and_counts() {
        let store = MemoryJobStore::new();
        let tech = store
            .create(&new_job("Rust async patterns", Category::Tech))
            .await
            .unwrap();
        store
            .create(&new_job("Slow mornings", Category::Life))
            .await
            .unwrap();
        store
            .update(
                tech.id,
                &JobPatch {
                    status: Some(JobStatus::Completed),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let (all, total) = store.list(&JobFilter::default()).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(total, 2);

        let (tech_only, _) = store
            .list(&JobFilter {
                category: Some(Category::Tech),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(tech_only.len(), 1);

        let (by_status, _) = store
            .list(&JobFilter {
                status: Some(JobStatus::Completed),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(by_status.len(), 1);

        let (by_search, total) = store
            .list(&JobFilter {
                search: Some("rust".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(by_search.len(), 1);
        assert_eq!(total, 1);
    }

    #[tokio::test]
    async fn due_schedules_respect_enabled_and_next_run() {
        let store = MemoryScheduleStore::new();
        let base = NewSchedule {
            name: "s1".into(),
            enabled: true,
            topic_source: postline_core::schedule::TopicSource::Manual,
            topic_list: vec!["A".into()],
            category: Category::Tech,
            template: None,
            target_reader: None,
            keywords: vec![],
            cron_expression: "0 9 * * *".into(),
            timezone: "UTC".into(),
            next_run_at: Some(Utc::now() - chrono::Duration::minutes(1)),
        };
        let due_one = store.create(&base).await.unwrap();
        store
            .create(&NewSchedule {
                name: "future".into(),
                next_run_at: Some(Utc::now() + chrono::Duration::hours(1)),
                ..base.clone()
            })
            .await
            .unwrap();
        let disabled = store
            .create(&NewSchedule {
                name: "off".into(),
                enabled: false,
                ..base.clone()
            })
            .await
            .unwrap();
        assert!(!disabled.enabled);

        let due = store.due(Utc::now()).await.unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].id, due_one.id);
    }
}
