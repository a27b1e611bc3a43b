//! The stage handler contract.
//!
//! Stage handlers produce the actual content: research notes, drafts, review
//! scores, exported files, pull requests. The engine only cares that a
//! handler accepts the current job snapshot and returns a partial update.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::Result;
use crate::job::{Job, JobPatch};
use crate::progress::StageEvent;
use crate::status::JobStatus;

/// The stages of the pipeline that run a handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    Research,
    Write,
    Review,
    Create,
    Export,
    Validate,
    Deploy,
}

impl StageKind {
    /// Step label recorded in progress-log entries.
    pub fn step(&self) -> &'static str {
        match self {
            StageKind::Research => "research",
            StageKind::Write => "write",
            StageKind::Review => "review",
            StageKind::Create => "create",
            StageKind::Export => "export",
            StageKind::Validate => "validate",
            StageKind::Deploy => "deploy",
        }
    }

    /// Status the job carries while this stage is in flight. Create and
    /// export both run under `creating`.
    pub fn status(&self) -> JobStatus {
        match self {
            StageKind::Research => JobStatus::Research,
            StageKind::Write => JobStatus::Writing,
            StageKind::Review => JobStatus::Review,
            StageKind::Create | StageKind::Export => JobStatus::Creating,
            StageKind::Validate => JobStatus::Validating,
            StageKind::Deploy => JobStatus::Deploying,
        }
    }
}

/// One step of the content pipeline.
///
/// Implementations must tolerate re-invocation: a review rewind runs write
/// and review again over the same job. Unrecoverable failure is an `Err`;
/// the engine fails the job on it. A *negative but expected* outcome (a
/// validation that finds problems) is a patch, never an `Err`.
#[async_trait]
pub trait StageHandler: Send + Sync {
    /// Intermediate progress goes through `events`; the engine persists each
    /// one to the job's log. Dropping the sender without sending is fine.
    async fn handle(&self, job: &Job, events: mpsc::Sender<StageEvent>) -> Result<JobPatch>;
}
