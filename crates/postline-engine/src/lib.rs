//! Workflow engine for Postline jobs.
//!
//! Steps a job through the pipeline state machine by invoking stage
//! handlers, persisting after every stage, and pausing at the human-review
//! and deploy-approval checkpoints. Also hosts the progress feed that
//! streams log deltas to a subscriber.

pub mod engine;
pub mod feed;

pub use engine::{EngineConfig, StageHandlers, WorkflowEngine};
pub use feed::{FeedConfig, FeedEvent, ProgressFeed};
