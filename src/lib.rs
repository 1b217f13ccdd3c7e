// vidfetch: multi-strategy video extraction and download service.
//
// Submissions flow through the orchestrator: the source URL is validated,
// a task is registered, and a background worker drives the external engine
// (falling back to markup extraction and a raw byte fetch) until the task
// reaches a terminal state. Callers poll task snapshots or register a
// one-shot webhook.

pub mod config;
pub mod engine;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod models;
pub mod orchestrator;
pub mod progress;
pub mod registry;
pub mod store;
pub mod validate;
pub mod webhook;

pub use config::ServiceConfig;
pub use error::{Error, Result};
pub use models::{
    ExtractionMethod, ExtractionResult, TaskSnapshot, TaskStatus, VideoCandidate, VideoFormat,
};
pub use orchestrator::{DownloadOrchestrator, DownloadRequest, DEFAULT_FORMAT_SELECTOR};
