// Engine-backed extraction: metadata-only probe of the download engine.

use std::sync::Arc;

use async_trait::async_trait;

use super::ExtractionStrategy;
use crate::engine::{EngineInfo, VideoEngine};
use crate::models::{
    dedup_candidates, ExtractionMethod, ExtractionResult, VideoCandidate, VideoFormat,
};

/// Cap on the formats surfaced to extraction callers.
const MAX_FORMATS: usize = 10;

/// Primary strategy: delegate to the engine's metadata mode. The only
/// strategy able to enumerate multiple negotiable formats; it succeeds iff
/// the engine returns usable info (a title).
pub struct EngineStrategy {
    engine: Arc<dyn VideoEngine>,
}

impl EngineStrategy {
    pub fn new(engine: Arc<dyn VideoEngine>) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl ExtractionStrategy for EngineStrategy {
    fn name(&self) -> &'static str {
        "engine"
    }

    async fn extract(&self, url: &str) -> Option<ExtractionResult> {
        match self.engine.probe(url).await {
            Ok(info) if !info.title.is_empty() => Some(result_from_info(url, info)),
            Ok(_) => {
                log::debug!("engine probe for {url} returned no title");
                None
            }
            Err(e) => {
                log::debug!("engine probe for {url} failed: {e}");
                None
            }
        }
    }
}

fn result_from_info(url: &str, info: EngineInfo) -> ExtractionResult {
    let mut result = ExtractionResult::new(info.title, ExtractionMethod::Engine);
    result.duration_seconds = info.duration_seconds;
    result.thumbnail = info.thumbnail;
    result.description = info.description;
    result.uploader = info.uploader;
    result.view_count = info.view_count;
    result.upload_date = info.upload_date;

    // Audio-only entries are filtered out; formats are capped for callers.
    result.formats = info
        .formats
        .iter()
        .filter(|f| f.vcodec != "none")
        .take(MAX_FORMATS)
        .map(|f| VideoFormat {
            format_id: f.format_id.clone(),
            ext: f.ext.clone(),
            resolution: f.resolution.clone(),
            filesize: f.filesize,
            quality: f.quality,
            video_url: f.url.clone(),
        })
        .collect();

    let mut candidates: Vec<VideoCandidate> = result
        .formats
        .iter()
        .filter_map(|f| {
            f.video_url.clone().map(|u| {
                VideoCandidate::new(u)
                    .with_content_type(format!("video/{}", f.ext))
                    .with_quality(f.resolution.clone())
            })
        })
        .collect();
    if candidates.is_empty() {
        // Keep the ≥1 candidate invariant: the page itself is negotiable by
        // the engine's download mode.
        let fallback = info.webpage_url.unwrap_or_else(|| url.to_string());
        candidates.push(VideoCandidate::new(fallback));
    }
    result.candidates = dedup_candidates(candidates);
    result
}
