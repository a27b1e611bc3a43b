//! The job model: inputs, stage artifacts, and patch application.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ResourceId;
use crate::status::JobStatus;

/// Content category a post is filed under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Tech,
    Life,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Tech => "tech",
            Category::Life => "life",
        }
    }
}

impl std::str::FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tech" => Ok(Category::Tech),
            "life" => Ok(Category::Life),
            other => Err(format!("unknown category: {other}")),
        }
    }
}

/// Template shaping the writer's output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Template {
    Standard,
    Listicle,
    DeepDive,
}

impl Template {
    pub fn as_str(&self) -> &'static str {
        match self {
            Template::Standard => "standard",
            Template::Listicle => "listicle",
            Template::DeepDive => "deep_dive",
        }
    }
}

impl std::str::FromStr for Template {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "standard" => Ok(Template::Standard),
            "listicle" => Ok(Template::Listicle),
            "deep_dive" => Ok(Template::DeepDive),
            other => Err(format!("unknown template: {other}")),
        }
    }
}

/// One source collected during research.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    pub title: String,
    pub url: String,
    pub snippet: Option<String>,
}

/// Material gathered before writing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchData {
    pub summary: String,
    pub sources: Vec<Source>,
}

/// Post metadata produced by the create stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostMetadata {
    pub title: String,
    pub summary: String,
    pub slug: String,
    pub tags: Vec<String>,
    pub read_minutes: Option<u32>,
}

/// Automated review scores and the issues the reviewer raised.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewResult {
    pub overall_score: f32,
    pub scores: HashMap<String, f32>,
    pub issues: Vec<String>,
}

/// Outcome of the validation stage. A failed validation is a first-class
/// branch (the job completes without deploying), not an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub passed: bool,
    pub errors: Vec<String>,
}

/// Pull-request coordinates produced by the deploy stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrResult {
    pub branch: String,
    pub pr_number: Option<u64>,
    pub pr_url: Option<String>,
}

/// Inputs for a new job, from a direct request or a schedule firing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewJob {
    pub topic: String,
    pub category: Category,
    pub template: Option<Template>,
    pub target_reader: Option<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
}

/// One content-generation request and its accumulated state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: ResourceId,
    pub topic: String,
    pub category: Category,
    pub template: Option<Template>,
    pub target_reader: Option<String>,
    pub keywords: Vec<String>,

    pub status: JobStatus,
    /// Free-text label of the active stage, for UI mapping only; transitions
    /// key off `status`.
    pub current_step: String,
    /// 0–100; non-decreasing while active, reset only by a review rewind.
    pub progress: i32,

    pub research_data: Option<ResearchData>,
    pub draft_content: Option<String>,
    pub final_content: Option<String>,
    pub metadata: Option<PostMetadata>,
    pub review_result: Option<ReviewResult>,
    pub validation_result: Option<ValidationResult>,

    pub human_approval: Option<bool>,
    pub human_feedback: Option<String>,

    pub filepath: Option<String>,
    pub pr_result: Option<PrResult>,
    pub commit_hash: Option<String>,
    pub error: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// Build the initial row for freshly-created inputs.
    pub fn create(inputs: &NewJob) -> Self {
        let now = Utc::now();
        Self {
            id: ResourceId::new(),
            topic: inputs.topic.clone(),
            category: inputs.category,
            template: inputs.template,
            target_reader: inputs.target_reader.clone(),
            keywords: inputs.keywords.clone(),
            status: JobStatus::Queued,
            current_step: String::new(),
            progress: 0,
            research_data: None,
            draft_content: None,
            final_content: None,
            metadata: None,
            review_result: None,
            validation_result: None,
            human_approval: None,
            human_feedback: None,
            filepath: None,
            pr_result: None,
            commit_hash: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Apply a patch, returning the updated job. Stores bump `updated_at`
    /// when they persist the result.
    pub fn apply(&self, patch: &JobPatch) -> Job {
        let mut job = self.clone();
        if let Some(status) = patch.status {
            job.status = status;
        }
        if let Some(step) = &patch.current_step {
            job.current_step = step.clone();
        }
        if let Some(progress) = patch.progress {
            job.progress = progress;
        }
        if let Some(research) = &patch.research_data {
            job.research_data = Some(research.clone());
        }
        if let Some(draft) = &patch.draft_content {
            job.draft_content = Some(draft.clone());
        }
        if let Some(final_content) = &patch.final_content {
            job.final_content = Some(final_content.clone());
        }
        if let Some(metadata) = &patch.metadata {
            job.metadata = Some(metadata.clone());
        }
        if let Some(review) = &patch.review_result {
            job.review_result = Some(review.clone());
        }
        if let Some(validation) = &patch.validation_result {
            job.validation_result = Some(validation.clone());
        }
        if let Some(approval) = &patch.human_approval {
            job.human_approval = *approval;
        }
        if let Some(feedback) = &patch.human_feedback {
            job.human_feedback = feedback.clone();
        }
        if let Some(filepath) = &patch.filepath {
            job.filepath = Some(filepath.clone());
        }
        if let Some(pr) = &patch.pr_result {
            job.pr_result = Some(pr.clone());
        }
        if let Some(commit) = &patch.commit_hash {
            job.commit_hash = Some(commit.clone());
        }
        if let Some(error) = &patch.error {
            job.error = Some(error.clone());
        }
        job
    }
}

/// Partial update applied to a job.
///
/// `None` leaves a field untouched. The two human-decision fields are doubly
/// wrapped so the engine can clear them back to null after consuming a
/// decision; everything else only ever moves forward to a value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobPatch {
    pub status: Option<JobStatus>,
    pub current_step: Option<String>,
    pub progress: Option<i32>,
    pub research_data: Option<ResearchData>,
    pub draft_content: Option<String>,
    pub final_content: Option<String>,
    pub metadata: Option<PostMetadata>,
    pub review_result: Option<ReviewResult>,
    pub validation_result: Option<ValidationResult>,
    pub human_approval: Option<Option<bool>>,
    pub human_feedback: Option<Option<String>>,
    pub filepath: Option<String>,
    pub pr_result: Option<PrResult>,
    pub commit_hash: Option<String>,
    pub error: Option<String>,
}

impl JobPatch {
    /// Patch that moves the job to a status, relabels the step, and sets
    /// progress — the engine's bread and butter.
    pub fn transition(status: JobStatus, step: &str, progress: i32) -> Self {
        Self {
            status: Some(status),
            current_step: Some(step.to_string()),
            progress: Some(progress),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.status.is_none()
            && self.current_step.is_none()
            && self.progress.is_none()
            && self.research_data.is_none()
            && self.draft_content.is_none()
            && self.final_content.is_none()
            && self.metadata.is_none()
            && self.review_result.is_none()
            && self.validation_result.is_none()
            && self.human_approval.is_none()
            && self.human_feedback.is_none()
            && self.filepath.is_none()
            && self.pr_result.is_none()
            && self.commit_hash.is_none()
            && self.error.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job() -> Job {
        Job::create(&NewJob {
            topic: "Rust error handling".into(),
            category: Category::Tech,
            template: Some(Template::Standard),
            target_reader: None,
            keywords: vec!["rust".into()],
        })
    }

    #[test]
    fn apply_merges_only_present_fields() {
        let base = job();
        let patched = base.apply(&JobPatch {
            status: Some(JobStatus::Writing),
            draft_content: Some("a draft".into()),
            progress: Some(25),
            ..Default::default()
        });

        assert_eq!(patched.status, JobStatus::Writing);
        assert_eq!(patched.progress, 25);
        assert_eq!(patched.draft_content.as_deref(), Some("a draft"));
        // untouched fields survive
        assert_eq!(patched.topic, base.topic);
        assert!(patched.research_data.is_none());
    }

    #[test]
    fn decision_fields_can_be_cleared() {
        let mut base = job();
        base.human_approval = Some(false);
        base.human_feedback = Some("tighten the intro".into());

        let cleared = base.apply(&JobPatch {
            human_approval: Some(None),
            human_feedback: Some(None),
            ..Default::default()
        });
        assert!(cleared.human_approval.is_none());
        assert!(cleared.human_feedback.is_none());

        // and an absent field leaves the decision alone
        let untouched = base.apply(&JobPatch::default());
        assert_eq!(untouched.human_approval, Some(false));
    }

    #[test]
    fn empty_patch_reports_empty() {
        assert!(JobPatch::default().is_empty());
        assert!(!JobPatch::transition(JobStatus::Running, "pipeline", 5).is_empty());
    }
}
