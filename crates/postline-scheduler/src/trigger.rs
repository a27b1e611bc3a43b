//! Fires due schedules: resolve a topic, create the job, launch the engine
//! detached, and push the schedule bookkeeping forward. Marking a schedule
//! as run never waits on the job it started.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{info, warn};

use postline_core::job::NewJob;
use postline_core::progress::{EventStatus, NewLogEntry};
use postline_core::schedule::{RunOutcome, Schedule, TopicSource};

use postline_db::{DbResult, JobStore, ScheduleStore};
use postline_engine::WorkflowEngine;

use crate::cron::{CronSpec, parse_timezone};

/// What one trigger invocation did, for the caller's response body.
#[derive(Debug, Default, Serialize)]
pub struct TriggerReport {
    pub due: usize,
    pub started: usize,
    pub failed: usize,
}

/// Processes due schedules. Invoked by an external periodic caller; each
/// invocation walks every due schedule once.
pub struct ScheduleTrigger {
    schedules: Arc<dyn ScheduleStore>,
    jobs: Arc<dyn JobStore>,
    engine: Arc<WorkflowEngine>,
}

impl ScheduleTrigger {
    pub fn new(
        schedules: Arc<dyn ScheduleStore>,
        jobs: Arc<dyn JobStore>,
        engine: Arc<WorkflowEngine>,
    ) -> Self {
        Self {
            schedules,
            jobs,
            engine,
        }
    }

    /// Fire every schedule whose slot has arrived. One schedule failing does
    /// not stop the rest.
    pub async fn process_due(&self) -> DbResult<TriggerReport> {
        let now = Utc::now();
        let due = self.schedules.due(now).await?;
        let mut report = TriggerReport {
            due: due.len(),
            ..Default::default()
        };
        for schedule in &due {
            match self.fire(schedule, now).await {
                Ok(true) => report.started += 1,
                Ok(false) => report.failed += 1,
                Err(e) => {
                    warn!(schedule = %schedule.name, error = %e, "schedule firing failed");
                    report.failed += 1;
                }
            }
        }
        Ok(report)
    }

    /// Fire one schedule. Returns whether a job was started. The next slot
    /// is always recorded, success or failure, so the schedule never
    /// re-fires for the same slot.
    async fn fire(&self, schedule: &Schedule, now: DateTime<Utc>) -> DbResult<bool> {
        let next_run_at = Some(self.next_slot(schedule, now));

        let Some(topic) = next_topic(schedule) else {
            info!(schedule = %schedule.name, "no topic available; recording failed run");
            self.schedules
                .mark_run(
                    schedule.id,
                    &RunOutcome {
                        success: false,
                        job_id: None,
                        error: Some("no topic available".to_string()),
                        next_run_at,
                        topic_index: None,
                        ran_at: now,
                    },
                )
                .await?;
            return Ok(false);
        };

        let job = match self
            .jobs
            .create(&NewJob {
                topic: topic.clone(),
                category: schedule.category,
                template: schedule.template,
                target_reader: schedule.target_reader.clone(),
                keywords: schedule.keywords.clone(),
            })
            .await
        {
            Ok(job) => job,
            Err(e) => {
                self.schedules
                    .mark_run(
                        schedule.id,
                        &RunOutcome {
                            success: false,
                            job_id: None,
                            error: Some(e.to_string()),
                            next_run_at,
                            topic_index: None,
                            ran_at: now,
                        },
                    )
                    .await?;
                return Ok(false);
            }
        };

        let entry = NewLogEntry::new(
            job.id,
            "pipeline",
            EventStatus::Started,
            format!("Scheduled run of \"{}\"", schedule.name),
        );
        if let Err(e) = self.jobs.append_log(&entry).await {
            warn!(job_id = %job.id, error = %e, "failed to write the initial progress entry");
        }

        // launch detached; schedule bookkeeping never blocks on the job
        self.engine.spawn(job.id);

        self.schedules
            .mark_run(
                schedule.id,
                &RunOutcome {
                    success: true,
                    job_id: Some(job.id),
                    error: None,
                    next_run_at,
                    topic_index: rotated_index(schedule),
                    ran_at: now,
                },
            )
            .await?;
        info!(schedule = %schedule.name, job_id = %job.id, topic = %topic, "schedule fired");
        Ok(true)
    }

    fn next_slot(&self, schedule: &Schedule, now: DateTime<Utc>) -> DateTime<Utc> {
        let tz = parse_timezone(&schedule.timezone);
        match CronSpec::parse(&schedule.cron_expression) {
            Ok(spec) => spec.next_run(now, tz),
            Err(e) => {
                warn!(schedule = %schedule.name, error = %e, "unparseable cron expression; deferring one day");
                now + Duration::days(1)
            }
        }
    }
}

/// Resolve the topic for a schedule's next job. Manual sources rotate the
/// topic list; feed and suggestion topics come from collaborator services
/// and resolve to nothing here.
pub fn next_topic(schedule: &Schedule) -> Option<String> {
    match schedule.topic_source {
        TopicSource::Manual => {
            if schedule.topic_list.is_empty() {
                return None;
            }
            let len = schedule.topic_list.len() as i32;
            let index = schedule.topic_index.rem_euclid(len) as usize;
            schedule.topic_list.get(index).cloned()
        }
        TopicSource::Feed | TopicSource::Suggestion => None,
    }
}

/// Rotation position after a successful run, wrapping at the list end.
/// `None` leaves the stored index untouched.
fn rotated_index(schedule: &Schedule) -> Option<i32> {
    match schedule.topic_source {
        TopicSource::Manual if !schedule.topic_list.is_empty() => {
            let len = schedule.topic_list.len() as i32;
            Some((schedule.topic_index + 1).rem_euclid(len))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use tokio::sync::mpsc;

    use postline_core::job::{Category, Job, JobPatch};
    use postline_core::progress::StageEvent;
    use postline_core::schedule::{NewSchedule, SchedulePatch};
    use postline_core::stage::StageHandler;
    use postline_db::{JobFilter, MemoryJobStore, MemoryScheduleStore};
    use postline_engine::{EngineConfig, StageHandlers};

    struct NoopStage;

    #[async_trait]
    impl StageHandler for NoopStage {
        async fn handle(
            &self,
            _job: &Job,
            _events: mpsc::Sender<StageEvent>,
        ) -> postline_core::Result<JobPatch> {
            Ok(JobPatch::default())
        }
    }

    fn fixture() -> (Arc<MemoryScheduleStore>, Arc<MemoryJobStore>, ScheduleTrigger) {
        let schedules = Arc::new(MemoryScheduleStore::new());
        let jobs = Arc::new(MemoryJobStore::new());
        let noop: Arc<dyn StageHandler> = Arc::new(NoopStage);
        let handlers = StageHandlers {
            research: noop.clone(),
            write: noop.clone(),
            review: noop.clone(),
            create: noop.clone(),
            export: noop.clone(),
            validate: noop.clone(),
            deploy: noop,
        };
        let jobs_dyn: Arc<dyn JobStore> = jobs.clone();
        let engine = Arc::new(WorkflowEngine::new(
            jobs_dyn,
            handlers,
            EngineConfig::default(),
        ));
        let schedules_dyn: Arc<dyn ScheduleStore> = schedules.clone();
        let jobs_dyn: Arc<dyn JobStore> = jobs.clone();
        let trigger = ScheduleTrigger::new(schedules_dyn, jobs_dyn, engine);
        (schedules, jobs, trigger)
    }

    fn manual_schedule(topics: Vec<&str>) -> NewSchedule {
        NewSchedule {
            name: "weekly".into(),
            enabled: true,
            topic_source: TopicSource::Manual,
            topic_list: topics.into_iter().map(String::from).collect(),
            category: Category::Tech,
            template: None,
            target_reader: None,
            keywords: vec!["rust".into()],
            cron_expression: "0 9 * * *".into(),
            timezone: "UTC".into(),
            next_run_at: Some(Utc::now() - Duration::minutes(1)),
        }
    }

    async fn make_due(schedules: &MemoryScheduleStore, schedule: &Schedule) {
        schedules
            .update(
                schedule.id,
                &SchedulePatch {
                    next_run_at: Some(Some(Utc::now() - Duration::minutes(1))),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn firing_rotates_topics_and_wraps() {
        let (schedules, jobs, trigger) = fixture();
        let schedule = schedules
            .create(&manual_schedule(vec!["A", "B"]))
            .await
            .unwrap();

        let report = trigger.process_due().await.unwrap();
        assert_eq!(report.due, 1);
        assert_eq!(report.started, 1);

        let after_first = schedules.get(schedule.id).await.unwrap();
        assert_eq!(after_first.topic_index, 1);
        assert_eq!(after_first.run_count, 1);
        assert!(after_first.last_job_id.is_some());
        assert!(after_first.next_run_at.unwrap() > Utc::now());

        let (created, _) = jobs.list(&JobFilter::default()).await.unwrap();
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].topic, "A");
        assert_eq!(created[0].keywords, vec!["rust".to_string()]);

        // second firing consumes "B" and wraps back to 0
        make_due(&schedules, &after_first).await;
        trigger.process_due().await.unwrap();

        let after_second = schedules.get(schedule.id).await.unwrap();
        assert_eq!(after_second.topic_index, 0);
        assert_eq!(after_second.run_count, 2);

        let (created, _) = jobs.list(&JobFilter::default()).await.unwrap();
        let topics: Vec<&str> = created.iter().map(|j| j.topic.as_str()).collect();
        assert!(topics.contains(&"A") && topics.contains(&"B"));
    }

    #[tokio::test]
    async fn missing_topic_records_a_failed_run_without_a_job() {
        let (schedules, jobs, trigger) = fixture();
        let schedule = schedules
            .create(&manual_schedule(vec![]))
            .await
            .unwrap();

        let report = trigger.process_due().await.unwrap();
        assert_eq!(report.failed, 1);
        assert_eq!(report.started, 0);

        let after = schedules.get(schedule.id).await.unwrap();
        assert_eq!(after.error_count, 1);
        assert_eq!(after.run_count, 0);
        assert_eq!(after.topic_index, 0);
        assert_eq!(after.last_error.as_deref(), Some("no topic available"));
        // the slot still moved forward
        assert!(after.next_run_at.unwrap() > Utc::now());

        let (created, total) = jobs.list(&JobFilter::default()).await.unwrap();
        assert!(created.is_empty());
        assert_eq!(total, 0);
    }

    #[tokio::test]
    async fn external_topic_sources_resolve_to_nothing_here() {
        let (schedules, _jobs, trigger) = fixture();
        let mut inputs = manual_schedule(vec!["unused"]);
        inputs.topic_source = TopicSource::Feed;
        let schedule = schedules.create(&inputs).await.unwrap();

        trigger.process_due().await.unwrap();
        let after = schedules.get(schedule.id).await.unwrap();
        assert_eq!(after.error_count, 1);
        assert_eq!(after.topic_index, 0);
    }

    #[tokio::test]
    async fn initial_log_entry_lands_before_the_engine_writes() {
        let (schedules, jobs, trigger) = fixture();
        schedules
            .create(&manual_schedule(vec!["A"]))
            .await
            .unwrap();
        trigger.process_due().await.unwrap();

        let (created, _) = jobs.list(&JobFilter::default()).await.unwrap();
        let logs = jobs.logs(created[0].id).await.unwrap();
        assert!(!logs.is_empty());
        assert!(logs[0].message.contains("Scheduled run"));
    }
}
