//! The workflow engine: drives a job from `queued` to a terminal status.
//!
//! The run loop is status-driven, so a relaunched engine resumes a job from
//! whatever stage its row says. Each pass loads the job, executes the stage
//! its status calls for, merges the handler's patch, persists, appends a
//! progress-log entry, and goes around again. The two checkpoint waits are
//! plain bounded polls against the store; store hiccups inside a wait are
//! retried on the poll interval and never touch the job's own status.

use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{Instant, sleep};
use tracing::{error, info, warn};

use postline_core::ResourceId;
use postline_core::job::{Job, JobPatch};
use postline_core::progress::{self, EventStatus, NewLogEntry, StageEvent};
use postline_core::stage::{StageHandler, StageKind};
use postline_core::status::JobStatus;

use postline_db::{DbError, DbResult, JobStore};

/// Timing knobs, injectable so tests can shrink them to milliseconds.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Interval between store reads while waiting on a human decision.
    pub decision_poll: Duration,
    /// How long human review may sit undecided before the engine
    /// auto-approves. Deliberate liveness guarantee; see DESIGN.md.
    pub review_timeout: Duration,
    /// How long the engine waits for a deploy decision before giving up and
    /// leaving the job in `pending_deploy`.
    pub deploy_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            decision_poll: Duration::from_secs(2),
            review_timeout: Duration::from_secs(30 * 60),
            deploy_timeout: Duration::from_secs(24 * 60 * 60),
        }
    }
}

/// The pluggable stage handlers, one per pipeline stage.
#[derive(Clone)]
pub struct StageHandlers {
    pub research: Arc<dyn StageHandler>,
    pub write: Arc<dyn StageHandler>,
    pub review: Arc<dyn StageHandler>,
    pub create: Arc<dyn StageHandler>,
    pub export: Arc<dyn StageHandler>,
    pub validate: Arc<dyn StageHandler>,
    pub deploy: Arc<dyn StageHandler>,
}

impl StageHandlers {
    fn get(&self, kind: StageKind) -> &Arc<dyn StageHandler> {
        match kind {
            StageKind::Research => &self.research,
            StageKind::Write => &self.write,
            StageKind::Review => &self.review,
            StageKind::Create => &self.create,
            StageKind::Export => &self.export,
            StageKind::Validate => &self.validate,
            StageKind::Deploy => &self.deploy,
        }
    }
}

/// Outcome of a checkpoint wait.
enum Wait {
    /// Something changed; re-dispatch on the fresh status.
    Proceed,
    /// Stop driving this job (held, deleted, or wait expired).
    Stop,
}

/// Steps jobs through the pipeline. One engine serves every job; each run
/// is an independent background task.
pub struct WorkflowEngine {
    jobs: Arc<dyn JobStore>,
    handlers: StageHandlers,
    config: EngineConfig,
}

impl WorkflowEngine {
    pub fn new(jobs: Arc<dyn JobStore>, handlers: StageHandlers, config: EngineConfig) -> Self {
        Self {
            jobs,
            handlers,
            config,
        }
    }

    /// Launch a job run detached from the caller. Fire-and-forget: errors
    /// are captured inside the run, never returned here.
    pub fn spawn(self: &Arc<Self>, job_id: ResourceId) {
        let engine = Arc::clone(self);
        tokio::spawn(async move {
            engine.run(job_id).await;
        });
    }

    /// Drive a job until a terminal status, a hold, or an expired deploy
    /// wait. Never returns an error to the caller.
    pub async fn run(&self, job_id: ResourceId) {
        if let Err(e) = self.drive(job_id).await {
            error!(job_id = %job_id, error = %e, "job run aborted on store failure");
        }
    }

    async fn drive(&self, job_id: ResourceId) -> DbResult<()> {
        loop {
            let job = self.jobs.get(job_id).await?;
            match job.status {
                JobStatus::Queued => {
                    self.jobs
                        .update(job_id, &JobPatch::transition(JobStatus::Running, "pipeline", 5))
                        .await?;
                    self.log(job_id, "pipeline", EventStatus::Started, "Pipeline started")
                        .await;
                }
                JobStatus::Running | JobStatus::Research => {
                    if self
                        .run_stage(&job, StageKind::Research, JobStatus::Writing)
                        .await?
                        .is_break()
                    {
                        return Ok(());
                    }
                }
                JobStatus::Writing => {
                    if self
                        .run_stage(&job, StageKind::Write, JobStatus::Review)
                        .await?
                        .is_break()
                    {
                        return Ok(());
                    }
                }
                JobStatus::Review => {
                    if self
                        .run_stage(&job, StageKind::Review, JobStatus::HumanReview)
                        .await?
                        .is_break()
                    {
                        return Ok(());
                    }
                }
                JobStatus::HumanReview => match self.await_review(&job).await? {
                    Wait::Proceed => {}
                    Wait::Stop => return Ok(()),
                },
                JobStatus::OnHold => {
                    info!(job_id = %job_id, "job held; automatic progression stopped");
                    return Ok(());
                }
                JobStatus::Creating => {
                    if job.metadata.is_none() {
                        if self
                            .run_stage(&job, StageKind::Create, JobStatus::Creating)
                            .await?
                            .is_break()
                        {
                            return Ok(());
                        }
                        if self.jobs.get(job_id).await?.metadata.is_none() {
                            self.fail(job_id, "create", "create stage returned no metadata")
                                .await?;
                            return Ok(());
                        }
                    } else if self
                        .run_stage(&job, StageKind::Export, JobStatus::Validating)
                        .await?
                        .is_break()
                    {
                        return Ok(());
                    }
                }
                JobStatus::Validating => {
                    if job.validation_result.is_none() {
                        if self
                            .run_stage(&job, StageKind::Validate, JobStatus::Validating)
                            .await?
                            .is_break()
                        {
                            return Ok(());
                        }
                        if self.jobs.get(job_id).await?.validation_result.is_none() {
                            self.fail(job_id, "validate", "validate stage returned no result")
                                .await?;
                            return Ok(());
                        }
                    } else if job.validation_result.as_ref().is_some_and(|v| v.passed) {
                        self.log(
                            job_id,
                            "validate",
                            EventStatus::Progress,
                            "Validation passed; awaiting deploy approval",
                        )
                        .await;
                        self.jobs
                            .update(
                                job_id,
                                &JobPatch::transition(JobStatus::PendingDeploy, "validate", 90),
                            )
                            .await?;
                    } else {
                        // failed validation is a branch, not an error: close
                        // out without deploying, keeping the errors on the job
                        self.log(
                            job_id,
                            "validate",
                            EventStatus::Completed,
                            "Validation failed; completed without deploy",
                        )
                        .await;
                        self.jobs
                            .update(
                                job_id,
                                &JobPatch::transition(JobStatus::Completed, "validate", 100),
                            )
                            .await?;
                        return Ok(());
                    }
                }
                JobStatus::PendingDeploy => match self.await_deploy(job_id).await? {
                    Wait::Proceed => {}
                    Wait::Stop => return Ok(()),
                },
                JobStatus::Deploying => {
                    if self
                        .run_stage(&job, StageKind::Deploy, JobStatus::Completed)
                        .await?
                        .is_break()
                    {
                        return Ok(());
                    }
                }
                JobStatus::Completed | JobStatus::Failed => return Ok(()),
            }
        }
    }

    /// Execute one stage: enter it, run the handler (draining its events
    /// into the progress log), then persist the handler's patch together
    /// with the advance to `next`.
    async fn run_stage(
        &self,
        job: &Job,
        kind: StageKind,
        next: JobStatus,
    ) -> DbResult<ControlFlow<()>> {
        let step = kind.step();
        let span = progress::span(kind);
        let job_id = job.id;

        self.jobs
            .update(job_id, &JobPatch::transition(kind.status(), step, span.enter))
            .await?;
        self.log(job_id, step, EventStatus::Started, format!("Starting {step}"))
            .await;

        // drain handler events into the log as they arrive
        let (tx, mut rx) = mpsc::channel::<StageEvent>(32);
        let log_store = Arc::clone(&self.jobs);
        let drain = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                if let Err(e) = log_store
                    .append_log(&NewLogEntry::from_event(job_id, event))
                    .await
                {
                    warn!(job_id = %job_id, error = %e, "failed to persist stage event");
                }
            }
        });

        let snapshot = self.jobs.get(job_id).await?;
        let result = self.handlers.get(kind).handle(&snapshot, tx).await;
        let _ = drain.await;

        match result {
            Ok(mut patch) => {
                info!(job_id = %job_id, stage = step, "stage completed");
                self.log(job_id, step, EventStatus::Completed, format!("Finished {step}"))
                    .await;
                patch.status = Some(next);
                patch.current_step = Some(step.to_string());
                patch.progress = Some(span.complete);
                if kind == StageKind::Write {
                    // the writer has consumed any carried review feedback
                    patch.human_feedback = Some(None);
                }
                self.jobs.update(job_id, &patch).await?;
                Ok(ControlFlow::Continue(()))
            }
            Err(e) => {
                error!(job_id = %job_id, stage = step, error = %e, "stage failed");
                self.fail(job_id, step, &e.to_string()).await?;
                Ok(ControlFlow::Break(()))
            }
        }
    }

    /// Terminal failure: error log entry first, then the status flip, so a
    /// terminal job never grows new log entries.
    async fn fail(&self, job_id: ResourceId, step: &str, message: &str) -> DbResult<()> {
        self.log(job_id, step, EventStatus::Error, message).await;
        self.jobs
            .update(
                job_id,
                &JobPatch {
                    status: Some(JobStatus::Failed),
                    current_step: Some(step.to_string()),
                    error: Some(message.to_string()),
                    ..Default::default()
                },
            )
            .await?;
        Ok(())
    }

    /// Block (bounded poll) until a review decision lands, the job is held
    /// or forced elsewhere, or the window expires and we auto-approve.
    async fn await_review(&self, job: &Job) -> DbResult<Wait> {
        let job_id = job.id;
        let deadline = Instant::now() + self.config.review_timeout;
        self.log(
            job_id,
            "human_review",
            EventStatus::Started,
            "Awaiting human review",
        )
        .await;

        loop {
            if Instant::now() >= deadline {
                // liveness guarantee: an undecided review does not stall the
                // pipeline forever
                warn!(job_id = %job_id, "human review timed out; auto-approving");
                self.log(
                    job_id,
                    "human_review",
                    EventStatus::Completed,
                    "No decision within the review window; auto-approved",
                )
                .await;
                self.jobs
                    .update(
                        job_id,
                        &JobPatch {
                            status: Some(JobStatus::Creating),
                            human_approval: Some(None),
                            human_feedback: Some(None),
                            ..Default::default()
                        },
                    )
                    .await?;
                return Ok(Wait::Proceed);
            }

            let current = match self.jobs.get(job_id).await {
                Ok(job) => job,
                Err(DbError::NotFound(_)) => return Ok(Wait::Stop),
                Err(e) => {
                    warn!(job_id = %job_id, error = %e, "store read failed during review wait; retrying");
                    sleep(self.config.decision_poll).await;
                    continue;
                }
            };

            match current.status {
                JobStatus::HumanReview => match current.human_approval {
                    Some(true) => {
                        self.log(
                            job_id,
                            "human_review",
                            EventStatus::Completed,
                            "Approved by reviewer",
                        )
                        .await;
                        self.jobs
                            .update(
                                job_id,
                                &JobPatch {
                                    status: Some(JobStatus::Creating),
                                    human_approval: Some(None),
                                    human_feedback: Some(None),
                                    ..Default::default()
                                },
                            )
                            .await?;
                        return Ok(Wait::Proceed);
                    }
                    Some(false) => {
                        let note = current.human_feedback.clone().unwrap_or_default();
                        self.log(
                            job_id,
                            "human_review",
                            EventStatus::Progress,
                            format!("Revision requested: {note}"),
                        )
                        .await;
                        // rewind: back to writing with the feedback still on
                        // the job; the write pass clears it once consumed
                        self.jobs
                            .update(
                                job_id,
                                &JobPatch {
                                    status: Some(JobStatus::Writing),
                                    current_step: Some("write".to_string()),
                                    progress: Some(progress::rewind_progress()),
                                    human_approval: Some(None),
                                    ..Default::default()
                                },
                            )
                            .await?;
                        return Ok(Wait::Proceed);
                    }
                    None => {}
                },
                // held, forced terminal, or an external transition: let the
                // main loop re-dispatch on the fresh status
                _ => return Ok(Wait::Proceed),
            }

            sleep(self.config.decision_poll).await;
        }
    }

    /// Block (bounded poll) until the deploy decision moves the job out of
    /// `pending_deploy`. On expiry the job is left where it is; deploying
    /// without an approval is never an acceptable fallback.
    async fn await_deploy(&self, job_id: ResourceId) -> DbResult<Wait> {
        let deadline = Instant::now() + self.config.deploy_timeout;
        loop {
            if Instant::now() >= deadline {
                warn!(job_id = %job_id, "deploy approval window elapsed; leaving job in pending_deploy");
                return Ok(Wait::Stop);
            }
            match self.jobs.get(job_id).await {
                Ok(job) if job.status == JobStatus::PendingDeploy => {}
                Ok(_) => return Ok(Wait::Proceed),
                Err(DbError::NotFound(_)) => return Ok(Wait::Stop),
                Err(e) => {
                    warn!(job_id = %job_id, error = %e, "store read failed during deploy wait; retrying");
                }
            }
            sleep(self.config.decision_poll).await;
        }
    }

    /// Append a progress-log entry. Log failures are infrastructure noise,
    /// not job failures; they are traced and swallowed.
    async fn log(
        &self,
        job_id: ResourceId,
        step: &str,
        status: EventStatus,
        message: impl Into<String>,
    ) {
        let entry = NewLogEntry::new(job_id, step, status, message);
        if let Err(e) = self.jobs.append_log(&entry).await {
            warn!(job_id = %job_id, error = %e, "failed to append progress log");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use postline_core::job::{
        Category, NewJob, PostMetadata, PrResult, ResearchData, ReviewResult, ValidationResult,
    };
    use postline_core::{Error, Result};
    use postline_db::MemoryJobStore;

    struct StubStage {
        step: &'static str,
        patch: JobPatch,
        fail: bool,
        calls: AtomicUsize,
        seen_feedback: Mutex<Vec<Option<String>>>,
    }

    impl StubStage {
        fn new(step: &'static str, patch: JobPatch) -> Arc<Self> {
            Arc::new(Self {
                step,
                patch,
                fail: false,
                calls: AtomicUsize::new(0),
                seen_feedback: Mutex::new(Vec::new()),
            })
        }

        fn failing(step: &'static str) -> Arc<Self> {
            Arc::new(Self {
                step,
                patch: JobPatch::default(),
                fail: true,
                calls: AtomicUsize::new(0),
                seen_feedback: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl StageHandler for StubStage {
        async fn handle(&self, job: &Job, events: mpsc::Sender<StageEvent>) -> Result<JobPatch> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen_feedback
                .lock()
                .unwrap()
                .push(job.human_feedback.clone());
            let _ = events
                .send(StageEvent::progress(self.step, "working"))
                .await;
            if self.fail {
                return Err(Error::StageFailed {
                    stage: self.step.to_string(),
                    message: "boom".to_string(),
                });
            }
            Ok(self.patch.clone())
        }
    }

    struct Fixture {
        store: Arc<MemoryJobStore>,
        engine: Arc<WorkflowEngine>,
        write: Arc<StubStage>,
        review: Arc<StubStage>,
        deploy: Arc<StubStage>,
    }

    fn fixture(validation_passes: bool, config: EngineConfig) -> Fixture {
        fixture_with_research(
            StubStage::new(
                "research",
                JobPatch {
                    research_data: Some(ResearchData {
                        summary: "notes".into(),
                        sources: vec![],
                    }),
                    ..Default::default()
                },
            ),
            validation_passes,
            config,
        )
    }

    fn fixture_with_research(
        research: Arc<StubStage>,
        validation_passes: bool,
        config: EngineConfig,
    ) -> Fixture {
        let store = Arc::new(MemoryJobStore::new());
        let write = StubStage::new(
            "write",
            JobPatch {
                draft_content: Some("a draft".into()),
                ..Default::default()
            },
        );
        let review = StubStage::new(
            "review",
            JobPatch {
                review_result: Some(ReviewResult {
                    overall_score: 8.5,
                    scores: Default::default(),
                    issues: vec![],
                }),
                ..Default::default()
            },
        );
        let create = StubStage::new(
            "create",
            JobPatch {
                metadata: Some(PostMetadata {
                    title: "Title".into(),
                    summary: "Summary".into(),
                    slug: "title".into(),
                    tags: vec![],
                    read_minutes: Some(4),
                }),
                final_content: Some("final".into()),
                ..Default::default()
            },
        );
        let export = StubStage::new(
            "export",
            JobPatch {
                filepath: Some("content/tech/title.md".into()),
                ..Default::default()
            },
        );
        let validation = if validation_passes {
            ValidationResult {
                passed: true,
                errors: vec![],
            }
        } else {
            ValidationResult {
                passed: false,
                errors: vec!["title too short".into()],
            }
        };
        let validate = StubStage::new(
            "validate",
            JobPatch {
                validation_result: Some(validation),
                ..Default::default()
            },
        );
        let deploy = StubStage::new(
            "deploy",
            JobPatch {
                pr_result: Some(PrResult {
                    branch: "post/title".into(),
                    pr_number: Some(7),
                    pr_url: Some("https://example.com/pr/7".into()),
                }),
                commit_hash: Some("abc123".into()),
                ..Default::default()
            },
        );
        let handlers = StageHandlers {
            research: research.clone(),
            write: write.clone(),
            review: review.clone(),
            create,
            export,
            validate,
            deploy: deploy.clone(),
        };
        let jobs: Arc<dyn JobStore> = store.clone();
        let engine = Arc::new(WorkflowEngine::new(jobs, handlers, config));
        Fixture {
            store,
            engine,
            write,
            review,
            deploy,
        }
    }

    fn fast_config() -> EngineConfig {
        EngineConfig {
            decision_poll: Duration::from_millis(5),
            review_timeout: Duration::from_secs(5),
            deploy_timeout: Duration::from_secs(5),
        }
    }

    fn new_job() -> NewJob {
        NewJob {
            topic: "X".into(),
            category: Category::Tech,
            template: None,
            target_reader: None,
            keywords: vec![],
        }
    }

    async fn wait_for_status(
        store: &MemoryJobStore,
        id: ResourceId,
        status: JobStatus,
    ) -> Job {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            let job = store.get(id).await.unwrap();
            if job.status == status {
                return job;
            }
            assert!(
                Instant::now() < deadline,
                "timed out waiting for {status}; job is {}",
                job.status
            );
            sleep(Duration::from_millis(5)).await;
        }
    }

    #[tokio::test]
    async fn happy_path_waits_for_deploy_approval_then_completes() {
        let f = fixture(true, fast_config());
        let job = f.store.create(&new_job()).await.unwrap();
        f.engine.spawn(job.id);

        // approve the review checkpoint
        wait_for_status(&f.store, job.id, JobStatus::HumanReview).await;
        f.store
            .update(
                job.id,
                &JobPatch {
                    human_approval: Some(Some(true)),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        // engine parks at the deploy checkpoint
        let pending = wait_for_status(&f.store, job.id, JobStatus::PendingDeploy).await;
        assert!(pending.validation_result.as_ref().unwrap().passed);
        assert!(pending.filepath.is_some());
        assert!(pending.pr_result.is_none());

        // approve the deploy
        f.store
            .update(
                job.id,
                &JobPatch {
                    status: Some(JobStatus::Deploying),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let done = wait_for_status(&f.store, job.id, JobStatus::Completed).await;
        assert_eq!(done.progress, 100);
        assert!(done.pr_result.is_some());
        assert_eq!(done.commit_hash.as_deref(), Some("abc123"));
        assert_eq!(f.deploy.calls(), 1);
    }

    #[tokio::test]
    async fn failed_validation_completes_without_deploy() {
        let f = fixture(false, fast_config());
        let job = f.store.create(&new_job()).await.unwrap();
        f.engine.spawn(job.id);

        wait_for_status(&f.store, job.id, JobStatus::HumanReview).await;
        f.store
            .update(
                job.id,
                &JobPatch {
                    human_approval: Some(Some(true)),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let done = wait_for_status(&f.store, job.id, JobStatus::Completed).await;
        assert!(done.pr_result.is_none());
        let validation = done.validation_result.unwrap();
        assert!(!validation.passed);
        assert_eq!(validation.errors, vec!["title too short".to_string()]);
        assert_eq!(f.deploy.calls(), 0);
    }

    #[tokio::test]
    async fn review_timeout_auto_approves() {
        let mut config = fast_config();
        config.review_timeout = Duration::from_millis(50);
        // fail validation so the run finishes without a deploy decision
        let f = fixture(false, config);
        let job = f.store.create(&new_job()).await.unwrap();
        f.engine.spawn(job.id);

        let done = wait_for_status(&f.store, job.id, JobStatus::Completed).await;
        assert!(done.human_approval.is_none());
        assert!(done.human_feedback.is_none());
        assert_eq!(f.write.calls(), 1);

        let logs = f.store.logs(job.id).await.unwrap();
        assert!(
            logs.iter()
                .any(|entry| entry.message.contains("auto-approved")),
            "auto-approval should be visible in the log"
        );
    }

    #[tokio::test]
    async fn feedback_rewinds_to_writing_and_reruns_review() {
        let f = fixture(true, fast_config());
        let job = f.store.create(&new_job()).await.unwrap();
        f.engine.spawn(job.id);

        wait_for_status(&f.store, job.id, JobStatus::HumanReview).await;
        f.store
            .update(
                job.id,
                &JobPatch {
                    human_approval: Some(Some(false)),
                    human_feedback: Some(Some("make it shorter".into())),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        // the engine re-runs write and review, then parks at review again
        let deadline = Instant::now() + Duration::from_secs(5);
        while f.review.calls() < 2 {
            assert!(Instant::now() < deadline, "review never re-ran");
            sleep(Duration::from_millis(5)).await;
        }
        wait_for_status(&f.store, job.id, JobStatus::HumanReview).await;

        assert_eq!(f.write.calls(), 2);
        let feedback_seen = f.write.seen_feedback.lock().unwrap().clone();
        assert_eq!(feedback_seen[0], None);
        assert_eq!(feedback_seen[1].as_deref(), Some("make it shorter"));

        // second decision approves; the feedback is gone by then
        f.store
            .update(
                job.id,
                &JobPatch {
                    human_approval: Some(Some(true)),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let pending = wait_for_status(&f.store, job.id, JobStatus::PendingDeploy).await;
        assert!(pending.human_feedback.is_none());
    }

    #[tokio::test]
    async fn stage_error_fails_job_and_log_goes_quiet() {
        let f = fixture_with_research(StubStage::failing("research"), true, fast_config());
        let job = f.store.create(&new_job()).await.unwrap();
        f.engine.spawn(job.id);

        let failed = wait_for_status(&f.store, job.id, JobStatus::Failed).await;
        assert!(failed.error.as_deref().unwrap().contains("boom"));
        assert_eq!(f.write.calls(), 0);

        let logs = f.store.logs(job.id).await.unwrap();
        let last = logs.last().unwrap();
        assert_eq!(last.status, EventStatus::Error);

        // terminal means the log stays quiet
        let count = logs.len();
        sleep(Duration::from_millis(50)).await;
        assert_eq!(f.store.logs(job.id).await.unwrap().len(), count);
    }

    #[tokio::test]
    async fn hold_decision_parks_the_job() {
        let f = fixture(true, fast_config());
        let job = f.store.create(&new_job()).await.unwrap();
        f.engine.spawn(job.id);

        wait_for_status(&f.store, job.id, JobStatus::HumanReview).await;
        f.store
            .update(
                job.id,
                &JobPatch {
                    status: Some(JobStatus::OnHold),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        wait_for_status(&f.store, job.id, JobStatus::OnHold).await;
        sleep(Duration::from_millis(50)).await;
        // still held: nothing advanced it
        let held = f.store.get(job.id).await.unwrap();
        assert_eq!(held.status, JobStatus::OnHold);
        assert_eq!(f.write.calls(), 1);
    }

    #[tokio::test]
    async fn progress_is_monotonic_except_for_the_rewind() {
        let f = fixture(true, fast_config());
        let job = f.store.create(&new_job()).await.unwrap();
        f.engine.spawn(job.id);

        let mut observed = vec![0];
        let mut rewound = 0;
        let deadline = Instant::now() + Duration::from_secs(5);
        let mut decided = false;
        loop {
            let current = f.store.get(job.id).await.unwrap();
            let last = *observed.last().unwrap();
            if current.progress < last {
                rewound += 1;
            }
            if current.progress != last {
                observed.push(current.progress);
            }
            if current.status == JobStatus::HumanReview {
                if !decided {
                    decided = true;
                    f.store
                        .update(
                            job.id,
                            &JobPatch {
                                human_approval: Some(Some(false)),
                                human_feedback: Some(Some("again".into())),
                                ..Default::default()
                            },
                        )
                        .await
                        .unwrap();
                } else if f.review.calls() >= 2 {
                    break;
                }
            }
            assert!(Instant::now() < deadline, "pipeline stalled");
            sleep(Duration::from_millis(2)).await;
        }
        assert_eq!(rewound, 1, "exactly one drop, caused by the rewind");
    }
}
