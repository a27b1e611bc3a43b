//! Recurring trigger definitions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ResourceId;
use crate::job::{Category, Template};

/// Where a schedule finds the topic for its next job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TopicSource {
    /// Rotate through `topic_list` using `topic_index`.
    Manual,
    /// External trend feed; resolved by a collaborator service.
    Feed,
    /// Model-generated suggestion; resolved by a collaborator service.
    Suggestion,
}

impl TopicSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            TopicSource::Manual => "manual",
            TopicSource::Feed => "feed",
            TopicSource::Suggestion => "suggestion",
        }
    }
}

impl std::str::FromStr for TopicSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "manual" => Ok(TopicSource::Manual),
            "feed" => Ok(TopicSource::Feed),
            "suggestion" => Ok(TopicSource::Suggestion),
            other => Err(format!("unknown topic source: {other}")),
        }
    }
}

/// A recurring trigger that creates jobs on a calendar cadence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Schedule {
    pub id: ResourceId,
    pub name: String,
    pub enabled: bool,

    pub topic_source: TopicSource,
    pub topic_list: Vec<String>,
    /// Position of the next manual topic; advances (with wraparound) only on
    /// a successful run.
    pub topic_index: i32,

    pub category: Category,
    pub template: Option<Template>,
    pub target_reader: Option<String>,
    pub keywords: Vec<String>,

    pub cron_expression: String,
    /// Fixed-offset zone string ("UTC", "+09:00"); unparseable zones fall
    /// back to UTC.
    pub timezone: String,

    pub last_run_at: Option<DateTime<Utc>>,
    /// Recomputed immediately after every run, success or failure, so the
    /// schedule never re-fires for the same slot.
    pub next_run_at: Option<DateTime<Utc>>,
    pub last_job_id: Option<ResourceId>,
    pub run_count: i32,
    pub error_count: i32,
    pub last_error: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Inputs for a new schedule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewSchedule {
    pub name: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub topic_source: TopicSource,
    #[serde(default)]
    pub topic_list: Vec<String>,
    pub category: Category,
    pub template: Option<Template>,
    pub target_reader: Option<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
    pub cron_expression: String,
    #[serde(default = "default_timezone")]
    pub timezone: String,
    /// First firing slot, computed by the caller from the cron expression.
    pub next_run_at: Option<DateTime<Utc>>,
}

fn default_enabled() -> bool {
    true
}

fn default_timezone() -> String {
    "UTC".to_string()
}

/// Administrator edit of a schedule. Absent fields stay as they are.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchedulePatch {
    pub name: Option<String>,
    pub enabled: Option<bool>,
    pub topic_source: Option<TopicSource>,
    pub topic_list: Option<Vec<String>>,
    pub topic_index: Option<i32>,
    pub category: Option<Category>,
    pub template: Option<Option<Template>>,
    pub target_reader: Option<Option<String>>,
    pub keywords: Option<Vec<String>>,
    pub cron_expression: Option<String>,
    pub timezone: Option<String>,
    pub next_run_at: Option<Option<DateTime<Utc>>>,
}

/// Bookkeeping recorded after a schedule fires.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub success: bool,
    pub job_id: Option<ResourceId>,
    pub error: Option<String>,
    pub next_run_at: Option<DateTime<Utc>>,
    /// New rotation position; `None` leaves the index alone (failed runs).
    pub topic_index: Option<i32>,
    pub ran_at: DateTime<Utc>,
}

impl Schedule {
    /// Apply an administrator edit, returning the updated schedule.
    pub fn apply(&self, patch: &SchedulePatch) -> Schedule {
        let mut schedule = self.clone();
        if let Some(name) = &patch.name {
            schedule.name = name.clone();
        }
        if let Some(enabled) = patch.enabled {
            schedule.enabled = enabled;
        }
        if let Some(source) = patch.topic_source {
            schedule.topic_source = source;
        }
        if let Some(list) = &patch.topic_list {
            schedule.topic_list = list.clone();
        }
        if let Some(index) = patch.topic_index {
            schedule.topic_index = index;
        }
        if let Some(category) = patch.category {
            schedule.category = category;
        }
        if let Some(template) = &patch.template {
            schedule.template = *template;
        }
        if let Some(reader) = &patch.target_reader {
            schedule.target_reader = reader.clone();
        }
        if let Some(keywords) = &patch.keywords {
            schedule.keywords = keywords.clone();
        }
        if let Some(expr) = &patch.cron_expression {
            schedule.cron_expression = expr.clone();
        }
        if let Some(tz) = &patch.timezone {
            schedule.timezone = tz.clone();
        }
        if let Some(next) = &patch.next_run_at {
            schedule.next_run_at = *next;
        }
        schedule
    }

    /// Record a run's bookkeeping, returning the updated schedule.
    pub fn record_run(&self, outcome: &RunOutcome) -> Schedule {
        let mut schedule = self.clone();
        schedule.last_run_at = Some(outcome.ran_at);
        schedule.next_run_at = outcome.next_run_at;
        if outcome.success {
            schedule.run_count += 1;
            schedule.last_job_id = outcome.job_id;
            schedule.last_error = None;
        } else {
            schedule.error_count += 1;
            schedule.last_error = outcome.error.clone();
        }
        if let Some(index) = outcome.topic_index {
            schedule.topic_index = index;
        }
        schedule
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schedule() -> Schedule {
        let now = Utc::now();
        Schedule {
            id: ResourceId::new(),
            name: "weekly tech".into(),
            enabled: true,
            topic_source: TopicSource::Manual,
            topic_list: vec!["A".into(), "B".into()],
            topic_index: 0,
            category: Category::Tech,
            template: None,
            target_reader: None,
            keywords: vec![],
            cron_expression: "0 9 * * 1".into(),
            timezone: "UTC".into(),
            last_run_at: None,
            next_run_at: Some(now),
            last_job_id: None,
            run_count: 0,
            error_count: 0,
            last_error: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn successful_run_advances_counters_and_clears_error() {
        let base = schedule();
        let job_id = ResourceId::new();
        let updated = base.record_run(&RunOutcome {
            success: true,
            job_id: Some(job_id),
            error: None,
            next_run_at: None,
            topic_index: Some(1),
            ran_at: Utc::now(),
        });
        assert_eq!(updated.run_count, 1);
        assert_eq!(updated.error_count, 0);
        assert_eq!(updated.topic_index, 1);
        assert_eq!(updated.last_job_id, Some(job_id));
        assert!(updated.last_error.is_none());
    }

    #[test]
    fn failed_run_keeps_topic_index() {
        let base = schedule();
        let updated = base.record_run(&RunOutcome {
            success: false,
            job_id: None,
            error: Some("no topic available".into()),
            next_run_at: None,
            topic_index: None,
            ran_at: Utc::now(),
        });
        assert_eq!(updated.error_count, 1);
        assert_eq!(updated.topic_index, 0);
        assert_eq!(updated.last_error.as_deref(), Some("no topic available"));
    }
}
