// External video-download engine seam.
//
// The engine is consumed in two modes: a metadata-only probe and a download
// with progress-event subscription. The trait keeps the orchestrator and the
// strategy chain independent of the yt-dlp subprocess plumbing.

mod process;
mod ytdlp;

pub use process::run_output_with_timeout;
pub use ytdlp::YtDlpEngine;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::progress::EngineProgress;

/// Callback receiving engine progress events during a download. `None` marks
/// a progress report the engine emitted but could not be parsed; consumers
/// substitute a fixed fallback value.
pub type ProgressSink = Arc<dyn Fn(Option<EngineProgress>) + Send + Sync>;

/// One format entry from the engine's metadata probe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineFormat {
    pub format_id: String,
    pub ext: String,
    pub resolution: String,
    pub filesize: u64,
    pub quality: i64,
    /// "none" marks audio-only entries.
    pub vcodec: String,
    /// Directly resolved media URL, when the engine exposes one.
    pub url: Option<String>,
}

/// Structured info record from the engine's metadata-only mode.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineInfo {
    pub title: String,
    pub duration_seconds: u64,
    pub formats: Vec<EngineFormat>,
    pub thumbnail: Option<String>,
    pub description: Option<String>,
    pub uploader: Option<String>,
    pub view_count: Option<u64>,
    pub upload_date: Option<String>,
    pub webpage_url: Option<String>,
}

/// The external video-download engine.
#[async_trait]
pub trait VideoEngine: Send + Sync {
    /// Name of the engine (for logging).
    fn name(&self) -> &'static str;

    /// Metadata-only extraction (`download=false`).
    async fn probe(&self, url: &str) -> Result<EngineInfo>;

    /// Download `url` with the given format selector into
    /// `{dest_dir}/{file_stem}.<ext>`, remuxed to a fixed container, emitting
    /// progress events into `on_progress`. Returns the materialized file, or
    /// an engine error when no output file appears.
    async fn download(
        &self,
        url: &str,
        format_selector: &str,
        dest_dir: &Path,
        file_stem: &str,
        on_progress: ProgressSink,
    ) -> Result<PathBuf>;
}

/// Scan `dest_dir` for the file the engine materialized for `file_stem`.
///
/// The engine substitutes its own extension into the output template, so the
/// exact filename is only known after the fact.
pub(crate) fn find_output_file(dest_dir: &Path, file_stem: &str) -> Option<PathBuf> {
    let entries = std::fs::read_dir(dest_dir).ok()?;
    for entry in entries.flatten() {
        let name = entry.file_name().to_string_lossy().to_string();
        if name.starts_with(file_stem) && entry.path().is_file() {
            return Some(entry.path());
        }
    }
    None
}
