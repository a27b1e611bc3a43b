//! The live progress feed.
//!
//! One subscriber per job: `subscribe` hands back a channel receiver and a
//! background task polls the store, turning new progress-log entries into
//! events. Checkpoint events are re-emitted on every poll while the job sits
//! at a checkpoint — and immediately on connect — so a client reconnecting
//! into `human_review` or `pending_deploy` can never miss the decision it
//! owes. Consumers must therefore tolerate duplicate checkpoint events.
//!
//! Dropping the receiver cancels the poll task; it never cancels the job.

use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::time::sleep;
use tracing::{debug, warn};

use postline_core::ResourceId;
use postline_core::job::{Job, PostMetadata, PrResult, ReviewResult};
use postline_core::progress::EventStatus;
use postline_core::status::JobStatus;

use postline_db::{DbError, JobStore};

/// Feed timing. Transient store errors back the poll off slightly and are
/// retried forever; they never end the feed.
#[derive(Debug, Clone)]
pub struct FeedConfig {
    pub poll: Duration,
    pub error_backoff: Duration,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            poll: Duration::from_secs(2),
            error_backoff: Duration::from_secs(3),
        }
    }
}

/// Typed events the feed emits. The stream always ends with `complete` or
/// `error`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum FeedEvent {
    Progress {
        step: String,
        status: EventStatus,
        message: String,
        progress: i32,
    },
    ReviewRequired {
        draft_content: Option<String>,
        review_result: Option<ReviewResult>,
    },
    PendingDeploy {
        filepath: Option<String>,
        metadata: Option<PostMetadata>,
    },
    Complete {
        filepath: Option<String>,
        pr_result: Option<PrResult>,
        metadata: Option<PostMetadata>,
    },
    Error {
        message: String,
        step: String,
    },
}

/// Opens per-job event feeds over the job store.
pub struct ProgressFeed {
    jobs: Arc<dyn JobStore>,
    config: FeedConfig,
}

impl ProgressFeed {
    pub fn new(jobs: Arc<dyn JobStore>, config: FeedConfig) -> Self {
        Self { jobs, config }
    }

    /// Open a one-way feed for a job. The poll task runs until the job
    /// reaches a terminal status or the receiver is dropped.
    pub fn subscribe(&self, job_id: ResourceId) -> mpsc::Receiver<FeedEvent> {
        let (tx, rx) = mpsc::channel(64);
        let jobs = Arc::clone(&self.jobs);
        let config = self.config.clone();
        tokio::spawn(async move {
            stream(jobs, config, job_id, tx).await;
            debug!(job_id = %job_id, "progress feed closed");
        });
        rx
    }
}

async fn stream(
    jobs: Arc<dyn JobStore>,
    config: FeedConfig,
    job_id: ResourceId,
    tx: mpsc::Sender<FeedEvent>,
) {
    // On connect: surface the checkpoint (or terminal) state before anything
    // else, so a reconnecting client sees the decision it owes first.
    let job = loop {
        match jobs.get(job_id).await {
            Ok(job) => break job,
            Err(DbError::NotFound(_)) => {
                let _ = tx
                    .send(FeedEvent::Error {
                        message: format!("job {job_id} not found"),
                        step: String::new(),
                    })
                    .await;
                return;
            }
            Err(e) => {
                warn!(job_id = %job_id, error = %e, "feed open failed; retrying");
                sleep(config.error_backoff).await;
            }
        }
    };
    if emit_status_events(&job, &tx).await.is_break() {
        return;
    }

    let mut cursor: i64 = 0;
    loop {
        let job = match jobs.get(job_id).await {
            Ok(job) => job,
            Err(DbError::NotFound(_)) => {
                // deleted out from under the feed
                let _ = tx
                    .send(FeedEvent::Error {
                        message: format!("job {job_id} no longer exists"),
                        step: String::new(),
                    })
                    .await;
                return;
            }
            Err(e) => {
                warn!(job_id = %job_id, error = %e, "feed poll failed; retrying");
                sleep(config.error_backoff).await;
                continue;
            }
        };

        let entries = match jobs.logs_after(job_id, cursor).await {
            Ok(entries) => entries,
            Err(e) => {
                warn!(job_id = %job_id, error = %e, "feed log delta failed; retrying");
                sleep(config.error_backoff).await;
                continue;
            }
        };

        for entry in entries {
            cursor = entry.id;
            let event = FeedEvent::Progress {
                step: entry.step,
                status: entry.status,
                message: entry.message,
                progress: job.progress,
            };
            if tx.send(event).await.is_err() {
                // subscriber hung up; the job keeps running headless
                return;
            }
        }

        if emit_status_events(&job, &tx).await.is_break() {
            return;
        }

        if tx.is_closed() {
            // subscriber hung up between events; stop polling
            return;
        }
        sleep(config.poll).await;
    }
}

/// Emit the checkpoint event for the job's current status, or the terminal
/// event. Break ends the feed (terminal reached or subscriber gone).
async fn emit_status_events(job: &Job, tx: &mpsc::Sender<FeedEvent>) -> ControlFlow<()> {
    let event = match job.status {
        JobStatus::HumanReview => FeedEvent::ReviewRequired {
            draft_content: job.draft_content.clone(),
            review_result: job.review_result.clone(),
        },
        JobStatus::PendingDeploy => FeedEvent::PendingDeploy {
            filepath: job.filepath.clone(),
            metadata: job.metadata.clone(),
        },
        JobStatus::Completed => {
            let _ = tx
                .send(FeedEvent::Complete {
                    filepath: job.filepath.clone(),
                    pr_result: job.pr_result.clone(),
                    metadata: job.metadata.clone(),
                })
                .await;
            return ControlFlow::Break(());
        }
        JobStatus::Failed => {
            let _ = tx
                .send(FeedEvent::Error {
                    message: job
                        .error
                        .clone()
                        .unwrap_or_else(|| "job failed".to_string()),
                    step: job.current_step.clone(),
                })
                .await;
            return ControlFlow::Break(());
        }
        _ => return ControlFlow::Continue(()),
    };
    if tx.send(event).await.is_err() {
        return ControlFlow::Break(());
    }
    ControlFlow::Continue(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use postline_core::job::{Category, JobPatch, NewJob};
    use postline_core::progress::NewLogEntry;
    use postline_db::MemoryJobStore;

    fn fast_feed(store: &Arc<MemoryJobStore>) -> ProgressFeed {
        let jobs: Arc<dyn JobStore> = store.clone();
        ProgressFeed::new(
            jobs,
            FeedConfig {
                poll: Duration::from_millis(10),
                error_backoff: Duration::from_millis(10),
            },
        )
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

    async fn recv(rx: &mut mpsc::Receiver<FeedEvent>) -> FeedEvent {
        tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("feed stalled")
            .expect("feed ended early")
    }

    #[tokio::test]
    async fn review_checkpoint_is_emitted_before_anything_else() {
        let store = Arc::new(MemoryJobStore::new());
        let job = store.create(&new_job()).await.unwrap();
        store
            .append_log(&NewLogEntry::new(
                job.id,
                "research",
                EventStatus::Completed,
                "Finished research",
            ))
            .await
            .unwrap();
        store
            .update(
                job.id,
                &JobPatch {
                    status: Some(JobStatus::HumanReview),
                    draft_content: Some("a draft".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let mut rx = fast_feed(&store).subscribe(job.id);
        match recv(&mut rx).await {
            FeedEvent::ReviewRequired { draft_content, .. } => {
                assert_eq!(draft_content.as_deref(), Some("a draft"));
            }
            other => panic!("expected review-required first, got {other:?}"),
        }
        // the backlog arrives after the checkpoint
        match recv(&mut rx).await {
            FeedEvent::Progress { step, .. } => assert_eq!(step, "research"),
            other => panic!("expected progress, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn terminal_job_gets_one_event_and_the_feed_closes() {
        let store = Arc::new(MemoryJobStore::new());
        let job = store.create(&new_job()).await.unwrap();
        store
            .update(
                job.id,
                &JobPatch {
                    status: Some(JobStatus::Completed),
                    filepath: Some("content/x.md".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let mut rx = fast_feed(&store).subscribe(job.id);
        match recv(&mut rx).await {
            FeedEvent::Complete { filepath, .. } => {
                assert_eq!(filepath.as_deref(), Some("content/x.md"));
            }
            other => panic!("expected complete, got {other:?}"),
        }
        assert!(rx.recv().await.is_none(), "feed should close after terminal");
    }

    #[tokio::test]
    async fn new_entries_stream_until_the_job_finishes() {
        let store = Arc::new(MemoryJobStore::new());
        let job = store.create(&new_job()).await.unwrap();
        store
            .update(
                job.id,
                &JobPatch {
                    status: Some(JobStatus::Research),
                    progress: Some(10),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let mut rx = fast_feed(&store).subscribe(job.id);

        store
            .append_log(&NewLogEntry::new(
                job.id,
                "research",
                EventStatus::Started,
                "Starting research",
            ))
            .await
            .unwrap();
        match recv(&mut rx).await {
            FeedEvent::Progress { step, status, .. } => {
                assert_eq!(step, "research");
                assert_eq!(status, EventStatus::Started);
            }
            other => panic!("expected progress, got {other:?}"),
        }

        store
            .update(
                job.id,
                &JobPatch {
                    status: Some(JobStatus::Failed),
                    error: Some("upstream down".into()),
                    current_step: Some("research".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        loop {
            match recv(&mut rx).await {
                FeedEvent::Error { message, step } => {
                    assert_eq!(message, "upstream down");
                    assert_eq!(step, "research");
                    break;
                }
                FeedEvent::Progress { .. } => continue,
                other => panic!("expected error, got {other:?}"),
            }
        }
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn checkpoint_events_serialize_with_kebab_case_tags() {
        let event = FeedEvent::ReviewRequired {
            draft_content: None,
            review_result: None,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "review-required");

        let event = FeedEvent::PendingDeploy {
            filepath: None,
            metadata: None,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "pending-deploy");
    }
}
