// Error taxonomy for the extraction/download pipeline.

use thiserror::Error;

/// Failure kinds surfaced by the crate.
///
/// `InvalidUrl` is the only kind reported synchronously to a submitter;
/// everything else is captured inside the task worker and converted into the
/// task's terminal `error` snapshot.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed or empty URL, rejected before any work is scheduled.
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    /// No strategy in the chain produced a video candidate.
    #[error("no video could be extracted from {0}")]
    ExtractionFailed(String),

    /// Network failure during a byte transfer or page fetch.
    #[error("fetch failed: {0}")]
    Fetch(#[from] reqwest::Error),

    /// The download engine errored or produced no output file.
    #[error("download engine failed: {0}")]
    Engine(String),

    /// Status or file lookup on an unknown identifier.
    #[error("task not found: {0}")]
    TaskNotFound(String),

    /// Disk I/O failure while storing an artifact.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
