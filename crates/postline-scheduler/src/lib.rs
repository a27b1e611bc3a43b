//! Calendar trigger for Postline.
//!
//! Periodically invoked (by an external timer) to find due schedules,
//! resolve a topic for each, create the job, launch the workflow engine in
//! the background, and push the schedule's bookkeeping forward.

pub mod cron;
pub mod trigger;

pub use cron::{CronError, CronSpec, parse_timezone};
pub use trigger::{ScheduleTrigger, TriggerReport, next_topic};
