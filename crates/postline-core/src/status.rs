//! The pipeline status state machine.
//!
//! A job advances queued → running → research → writing → review →
//! human_review → creating → validating → pending_deploy → deploying →
//! completed. Review decisions can rewind human_review back to writing or
//! park the job in on_hold; failed validation short-circuits straight to
//! completed with the deploy skipped. `failed` is reachable from any
//! non-terminal status when a stage errors.

use serde::{Deserialize, Serialize};

/// Lifecycle status of a job. Closed set; the store persists the
/// snake_case form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Research,
    Writing,
    Review,
    HumanReview,
    OnHold,
    Creating,
    Validating,
    PendingDeploy,
    Deploying,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// Whether the job sits at a checkpoint waiting for a human decision.
    pub fn is_checkpoint(&self) -> bool {
        matches!(self, JobStatus::HumanReview | JobStatus::PendingDeploy)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Research => "research",
            JobStatus::Writing => "writing",
            JobStatus::Review => "review",
            JobStatus::HumanReview => "human_review",
            JobStatus::OnHold => "on_hold",
            JobStatus::Creating => "creating",
            JobStatus::Validating => "validating",
            JobStatus::PendingDeploy => "pending_deploy",
            JobStatus::Deploying => "deploying",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(JobStatus::Queued),
            "running" => Ok(JobStatus::Running),
            "research" => Ok(JobStatus::Research),
            "writing" => Ok(JobStatus::Writing),
            "review" => Ok(JobStatus::Review),
            "human_review" => Ok(JobStatus::HumanReview),
            "on_hold" => Ok(JobStatus::OnHold),
            "creating" => Ok(JobStatus::Creating),
            "validating" => Ok(JobStatus::Validating),
            "pending_deploy" => Ok(JobStatus::PendingDeploy),
            "deploying" => Ok(JobStatus::Deploying),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            other => Err(format!("unknown job status: {other}")),
        }
    }
}

/// Decision an external reviewer records against a job in `human_review`.
///
/// `Feedback` and `Rewrite` share one control path (back to writing with the
/// feedback carried along); the distinction is tone, kept for the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewDecision {
    Approve,
    Feedback,
    Rewrite,
    Hold,
}

/// Raw step label → coarse UI stage bucket. Data, not control flow; the
/// buckets group the fine-grained progress-log steps into the five slots the
/// job timeline renders.
pub const STEP_BUCKETS: &[(&str, &str)] = &[
    ("pipeline", "setup"),
    ("research", "research"),
    ("write", "draft"),
    ("review", "review"),
    ("human_review", "review"),
    ("create", "publish"),
    ("export", "publish"),
    ("validate", "publish"),
    ("deploy", "publish"),
];

/// Map a progress-log step label onto its UI stage bucket.
pub fn ui_stage(step: &str) -> &'static str {
    STEP_BUCKETS
        .iter()
        .find(|(raw, _)| *raw == step)
        .map(|(_, bucket)| *bucket)
        .unwrap_or("setup")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_strings() {
        let all = [
            JobStatus::Queued,
            JobStatus::Running,
            JobStatus::Research,
            JobStatus::Writing,
            JobStatus::Review,
            JobStatus::HumanReview,
            JobStatus::OnHold,
            JobStatus::Creating,
            JobStatus::Validating,
            JobStatus::PendingDeploy,
            JobStatus::Deploying,
            JobStatus::Completed,
            JobStatus::Failed,
        ];
        for status in all {
            assert_eq!(status.as_str().parse::<JobStatus>().unwrap(), status);
        }
        assert!("paused".parse::<JobStatus>().is_err());
    }

    #[test]
    fn only_completed_and_failed_are_terminal() {
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(!JobStatus::OnHold.is_terminal());
        assert!(!JobStatus::PendingDeploy.is_terminal());
    }

    #[test]
    fn step_labels_map_to_buckets() {
        assert_eq!(ui_stage("research"), "research");
        assert_eq!(ui_stage("human_review"), "review");
        assert_eq!(ui_stage("export"), "publish");
        assert_eq!(ui_stage("something-new"), "setup");
    }
}
