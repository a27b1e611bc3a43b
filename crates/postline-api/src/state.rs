//! Application state.

use std::sync::Arc;

use postline_db::{JobStore, ScheduleStore};
use postline_engine::{EngineConfig, FeedConfig, ProgressFeed, StageHandlers, WorkflowEngine};
use postline_scheduler::ScheduleTrigger;

use crate::config::AppConfig;

/// Shared application state. Stores and handlers are injected; this is the
/// single place the engine, feed, and trigger get wired together.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub jobs: Arc<dyn JobStore>,
    pub schedules: Arc<dyn ScheduleStore>,
    pub engine: Arc<WorkflowEngine>,
    pub feed: Arc<ProgressFeed>,
    pub trigger: Arc<ScheduleTrigger>,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        jobs: Arc<dyn JobStore>,
        schedules: Arc<dyn ScheduleStore>,
        handlers: StageHandlers,
    ) -> Self {
        let engine = Arc::new(WorkflowEngine::new(
            jobs.clone(),
            handlers,
            EngineConfig::default(),
        ));
        let feed = Arc::new(ProgressFeed::new(jobs.clone(), FeedConfig::default()));
        let trigger = Arc::new(ScheduleTrigger::new(
            schedules.clone(),
            jobs.clone(),
            engine.clone(),
        ));
        Self {
            config: Arc::new(config),
            jobs,
            schedules,
            engine,
            feed,
            trigger,
        }
    }
}
