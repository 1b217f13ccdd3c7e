// Common data models for the task state machine and extraction results.

use serde::{Deserialize, Serialize};
use std::fmt;
use time::OffsetDateTime;

/// Lifecycle state of an asynchronous download task.
///
/// `Completed` and `Error` are terminal; no transition leaves them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Processing,
    Downloading,
    Completed,
    Error,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Error)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Processing => write!(f, "processing"),
            Self::Downloading => write!(f, "downloading"),
            Self::Completed => write!(f, "completed"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Point-in-time view of a task, as returned to polling clients and posted to
/// webhooks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSnapshot {
    pub task_id: String,
    pub status: TaskStatus,
    /// Human-readable current-step description.
    pub message: String,
    /// 0-100; non-decreasing during a task's life except on the transition to
    /// `Error`, which resets it to 0.
    pub progress: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl TaskSnapshot {
    pub fn new(task_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            status: TaskStatus::Processing,
            message: message.into(),
            progress: 0,
            file_id: None,
            filename: None,
            download_url: None,
            created_at: OffsetDateTime::now_utc(),
        }
    }
}

/// Partial status update merged into a task's snapshot.
///
/// Unsupplied fields keep their previous value, so terminal fields
/// (`file_id`, `filename`, `download_url`) are never cleared once set.
#[derive(Debug, Clone, Default)]
pub struct TaskUpdate {
    pub status: Option<TaskStatus>,
    pub message: Option<String>,
    pub progress: Option<u8>,
    pub file_id: Option<String>,
    pub filename: Option<String>,
    pub download_url: Option<String>,
}

impl TaskUpdate {
    pub fn status(status: TaskStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn progress(percent: u8) -> Self {
        Self {
            progress: Some(percent),
            ..Self::default()
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_progress(mut self, percent: u8) -> Self {
        self.progress = Some(percent);
        self
    }
}

/// Which strategy produced an extraction result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExtractionMethod {
    /// Engine-backed metadata probe.
    #[serde(rename = "yt-dlp")]
    Engine,
    /// Platform-specific markup extraction.
    #[serde(rename = "instagram_parse")]
    InstagramParse,
    /// Generic markup extraction.
    #[serde(rename = "html_parse")]
    HtmlParse,
}

impl ExtractionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Engine => "yt-dlp",
            Self::InstagramParse => "instagram_parse",
            Self::HtmlParse => "html_parse",
        }
    }
}

/// A discovered playable video URL plus hints, prior to download.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoCandidate {
    pub url: String,
    /// MIME-type hint, or a platform tag (`youtube`, `vimeo`) for embed
    /// candidates that need another engine pass.
    pub content_type: String,
    pub quality: String,
}

impl VideoCandidate {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            content_type: "video/mp4".to_string(),
            quality: "unknown".to_string(),
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = content_type.into();
        self
    }

    pub fn with_quality(mut self, quality: impl Into<String>) -> Self {
        self.quality = quality.into();
        self
    }
}

/// One negotiable format, as reported to extraction callers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoFormat {
    pub format_id: String,
    pub ext: String,
    pub resolution: String,
    pub filesize: u64,
    pub quality: i64,
    /// Directly resolved video URL, when the strategy surfaced one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_url: Option<String>,
}

/// Output of the strategy chain.
///
/// Always carries at least one candidate; a strategy that finds none reports
/// no result instead of an empty one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub title: String,
    pub duration_seconds: u64,
    pub method: ExtractionMethod,
    pub candidates: Vec<VideoCandidate>,
    pub formats: Vec<VideoFormat>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uploader: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub view_count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upload_date: Option<String>,
}

impl ExtractionResult {
    pub fn new(title: impl Into<String>, method: ExtractionMethod) -> Self {
        Self {
            title: title.into(),
            duration_seconds: 0,
            method,
            candidates: Vec::new(),
            formats: Vec::new(),
            thumbnail: None,
            description: None,
            uploader: None,
            view_count: None,
            upload_date: None,
        }
    }
}

/// Deduplicate candidates by exact URL equality, preserving first-seen order.
pub fn dedup_candidates(candidates: Vec<VideoCandidate>) -> Vec<VideoCandidate> {
    let mut seen = std::collections::HashSet::new();
    candidates
        .into_iter()
        .filter(|c| seen.insert(c.url.clone()))
        .collect()
}
