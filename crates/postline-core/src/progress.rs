//! Progress accounting: the per-stage weight table, stage events, and the
//! append-only progress log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ResourceId;
use crate::stage::StageKind;

/// Progress span a stage occupies, as (enter, complete) percent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageSpan {
    pub enter: i32,
    pub complete: i32,
}

/// Fixed per-stage progress weights. The rewind after a review decision
/// drops progress back to the write stage's enter value.
const STAGE_SPANS: &[(StageKind, StageSpan)] = &[
    (StageKind::Research, StageSpan { enter: 10, complete: 20 }),
    (StageKind::Write, StageSpan { enter: 25, complete: 40 }),
    (StageKind::Review, StageSpan { enter: 45, complete: 50 }),
    (StageKind::Create, StageSpan { enter: 60, complete: 65 }),
    (StageKind::Export, StageSpan { enter: 70, complete: 80 }),
    (StageKind::Validate, StageSpan { enter: 85, complete: 90 }),
    (StageKind::Deploy, StageSpan { enter: 95, complete: 100 }),
];

/// Look up the progress span for a stage.
pub fn span(kind: StageKind) -> StageSpan {
    STAGE_SPANS
        .iter()
        .find(|(k, _)| *k == kind)
        .map(|(_, s)| *s)
        .expect("every stage kind has a span")
}

/// Progress the writer restarts from after a feedback/rewrite decision.
pub fn rewind_progress() -> i32 {
    span(StageKind::Write).enter
}

/// Coarse status of a progress event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    Started,
    Progress,
    Completed,
    Error,
}

impl EventStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventStatus::Started => "started",
            EventStatus::Progress => "progress",
            EventStatus::Completed => "completed",
            EventStatus::Error => "error",
        }
    }
}

impl std::str::FromStr for EventStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "started" => Ok(EventStatus::Started),
            "progress" => Ok(EventStatus::Progress),
            "completed" => Ok(EventStatus::Completed),
            "error" => Ok(EventStatus::Error),
            other => Err(format!("unknown event status: {other}")),
        }
    }
}

/// Event emitted by a stage handler while it works. The engine drains these
/// into the job's progress log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageEvent {
    pub step: String,
    pub status: EventStatus,
    pub message: String,
    pub data: Option<serde_json::Value>,
}

impl StageEvent {
    pub fn progress(step: &str, message: impl Into<String>) -> Self {
        Self {
            step: step.to_string(),
            status: EventStatus::Progress,
            message: message.into(),
            data: None,
        }
    }
}

/// Append-only event belonging to a job. Ids come from one store-wide
/// strictly-increasing sequence, so `id > cursor` is a correct and cheap
/// delta query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: i64,
    pub job_id: ResourceId,
    pub step: String,
    pub status: EventStatus,
    pub message: String,
    pub data: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

/// A log entry about to be appended.
#[derive(Debug, Clone)]
pub struct NewLogEntry {
    pub job_id: ResourceId,
    pub step: String,
    pub status: EventStatus,
    pub message: String,
    pub data: Option<serde_json::Value>,
}

impl NewLogEntry {
    pub fn new(
        job_id: ResourceId,
        step: &str,
        status: EventStatus,
        message: impl Into<String>,
    ) -> Self {
        Self {
            job_id,
            step: step.to_string(),
            status,
            message: message.into(),
            data: None,
        }
    }

    pub fn from_event(job_id: ResourceId, event: StageEvent) -> Self {
        Self {
            job_id,
            step: event.step,
            status: event.status,
            message: event.message,
            data: event.data,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spans_are_ordered_and_within_bounds() {
        let mut last = 0;
        for (_, span) in STAGE_SPANS {
            assert!(span.enter < span.complete);
            assert!(span.enter >= last, "stages overlap backwards");
            last = span.complete;
        }
        assert_eq!(span(StageKind::Deploy).complete, 100);
    }

    #[test]
    fn rewind_lands_on_write_enter() {
        assert_eq!(rewind_progress(), 25);
    }
}
