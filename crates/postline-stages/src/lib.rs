//! Stage handlers for the Postline pipeline.
//!
//! The engine treats content production as pluggable handlers; this crate
//! supplies the production set, backed by an OpenAI-compatible inference
//! service, a web-search service, and the GitHub REST API. Validation and
//! export are local.

pub mod github;
pub mod handlers;
pub mod llm;
pub mod search;

pub use github::{GitHubClient, GitHubConfig, GitHubError};
pub use handlers::{
    CreateStage, DeployStage, ExportStage, ResearchStage, ReviewStage, ValidateStage, WriteStage,
};
pub use llm::{InferenceClient, InferenceConfig, InferenceError};
pub use search::{SearchClient, SearchConfig, SearchError};
