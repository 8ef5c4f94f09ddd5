//! logtriage: batch triage of machine update logs.
//!
//! For each machine data set, runs preparation and log extraction via
//! external collaborators, classifies the update attempt from the extracted
//! logs and, only on failure, uploads the artifacts to an S3-compatible
//! object store for later analysis. Cumulative success/failure counters are
//! kept in PostgreSQL and a filesystem trigger tells the downstream
//! analyzer whether it has work.

pub mod analytics;
pub mod cli;
pub mod config;
pub mod pipeline;
pub mod storage;
pub mod trigger;

// Re-export commonly used error types
pub use analytics::AnalyticsError;
pub use config::ConfigError;
pub use pipeline::{PipelineError, TaskError};
pub use storage::{ObjectStoreError, UploadError};
pub use trigger::TriggerError;
