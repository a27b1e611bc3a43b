//! API server for Postline.
//!
//! Provides the HTTP REST API, the internal scheduler trigger endpoint, and
//! the WebSocket progress feed.

pub mod config;
pub mod error;
pub mod routes;
pub mod state;
pub mod ws;

pub use config::AppConfig;
pub use state::AppState;
