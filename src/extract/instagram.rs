// Platform-specific markup extraction for Instagram posts and reels.

use std::time::Duration;

use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use scraper::{Html, Selector};

use super::{url_on_host, ExtractionStrategy};
use crate::models::{dedup_candidates, ExtractionMethod, ExtractionResult, VideoCandidate};

const PAGE_TIMEOUT: Duration = Duration::from_secs(15);
const DEFAULT_TITLE: &str = "Instagram Video";

// Browser-like header set; the platform serves a different page to plain
// clients.
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
    AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
const ACCEPT: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8";
const ACCEPT_LANGUAGE: &str = "en-US,en;q=0.5";

lazy_static! {
    // Known variable-assignment patterns carrying the embedded JSON blob.
    static ref SHARED_DATA_RES: Vec<Regex> = vec![
        Regex::new(r"(?s)window\._sharedData\s*=\s*(\{.+?\});").expect("valid regex"),
        Regex::new(r"(?s)window\.__additionalDataLoaded\s*\([^,]+,\s*(\{.+?\})\)")
            .expect("valid regex"),
    ];
    static ref VIDEO_URL_RE: Regex =
        Regex::new(r#"(?i)"video_url"\s*:\s*"([^"]+)""#).expect("valid regex");
    static ref VIDEO_VERSIONS_RE: Regex =
        Regex::new(r#"(?is)"video_versions"\s*:\s*\[.*?"url"\s*:\s*"([^"]+)""#)
            .expect("valid regex");
    static ref DOMAIN_MP4_RE: Regex =
        Regex::new(r#"(?i)https://[^"]*instagram\.com[^"]*\.mp4[^"]*"#).expect("valid regex");
    static ref OG_VIDEO_SELECTOR: Selector =
        Selector::parse("meta[property='og:video']").expect("valid selector");
    static ref OG_TITLE_SELECTOR: Selector =
        Selector::parse("meta[property='og:title']").expect("valid selector");
}

pub struct InstagramStrategy {
    client: reqwest::Client,
}

impl InstagramStrategy {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ExtractionStrategy for InstagramStrategy {
    fn name(&self) -> &'static str {
        "instagram_parse"
    }

    fn supports(&self, url: &str) -> bool {
        url_on_host(url, "instagram.com")
    }

    async fn extract(&self, url: &str) -> Option<ExtractionResult> {
        let response = self
            .client
            .get(url)
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .header(reqwest::header::ACCEPT, ACCEPT)
            .header(reqwest::header::ACCEPT_LANGUAGE, ACCEPT_LANGUAGE)
            .timeout(PAGE_TIMEOUT)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| log::debug!("instagram page fetch failed for {url}: {e}"))
            .ok()?;
        let page = response.text().await.ok()?;
        parse_page(&page)
    }
}

/// Parse raw page markup, trying sub-steps in order until one yields a
/// candidate: embedded JSON blob, raw-markup regexes, og:video meta tag.
fn parse_page(page: &str) -> Option<ExtractionResult> {
    let document = Html::parse_document(page);
    let mut candidates = candidates_from_shared_data(page);
    if candidates.is_empty() {
        candidates = candidates_from_regexes(page);
    }
    if candidates.is_empty() {
        candidates = candidates_from_og_video(&document);
    }
    let candidates = dedup_candidates(candidates);
    if candidates.is_empty() {
        return None;
    }

    let title = document
        .select(&OG_TITLE_SELECTOR)
        .next()
        .and_then(|el| el.value().attr("content"))
        .filter(|t| !t.is_empty())
        .unwrap_or(DEFAULT_TITLE);

    let mut result = ExtractionResult::new(title, ExtractionMethod::InstagramParse);
    result.formats = synthesized_formats(&candidates);
    result.candidates = candidates;
    Some(result)
}

/// Locate the embedded JSON data blob and search it for a video URL.
fn candidates_from_shared_data(page: &str) -> Vec<VideoCandidate> {
    let mut candidates = Vec::new();
    for pattern in SHARED_DATA_RES.iter() {
        let Some(caps) = pattern.captures(page) else {
            continue;
        };
        let Some(blob) = caps.get(1) else { continue };
        let Ok(data) = serde_json::from_str::<serde_json::Value>(blob.as_str()) else {
            continue;
        };
        if let Some(url) = find_video_url(&data) {
            candidates.push(VideoCandidate::new(url));
        }
    }
    candidates
}

/// Depth-first search of an arbitrarily nested JSON value for a `video_url`
/// key or a `video_versions` list entry with a `url` field. First match wins.
fn find_video_url(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::Object(map) => {
            if let Some(url) = map.get("video_url").and_then(|v| v.as_str()) {
                return Some(url.to_string());
            }
            if let Some(versions) = map.get("video_versions").and_then(|v| v.as_array()) {
                for version in versions {
                    if let Some(url) = version.get("url").and_then(|v| v.as_str()) {
                        return Some(url.to_string());
                    }
                }
            }
            map.values().find_map(find_video_url)
        }
        serde_json::Value::Array(items) => items.iter().find_map(find_video_url),
        _ => None,
    }
}

/// Regex scan for quoted video_url fields, video_versions entries, and
/// platform-hosted mp4 URLs.
fn candidates_from_regexes(page: &str) -> Vec<VideoCandidate> {
    let mut candidates = Vec::new();
    for caps in VIDEO_URL_RE.captures_iter(page) {
        push_if_platform_url(&mut candidates, &caps[1]);
    }
    for caps in VIDEO_VERSIONS_RE.captures_iter(page) {
        push_if_platform_url(&mut candidates, &caps[1]);
    }
    for m in DOMAIN_MP4_RE.find_iter(page) {
        push_if_platform_url(&mut candidates, m.as_str());
    }
    candidates
}

fn push_if_platform_url(candidates: &mut Vec<VideoCandidate>, url: &str) {
    if url.starts_with("http") && url.contains("instagram") {
        candidates.push(VideoCandidate::new(url));
    }
}

fn candidates_from_og_video(document: &Html) -> Vec<VideoCandidate> {
    document
        .select(&OG_VIDEO_SELECTOR)
        .filter_map(|el| el.value().attr("content"))
        .filter(|c| c.starts_with("http"))
        .map(VideoCandidate::new)
        .collect()
}

/// One synthesized format per candidate, for extraction callers.
fn synthesized_formats(candidates: &[VideoCandidate]) -> Vec<crate::models::VideoFormat> {
    candidates
        .iter()
        .enumerate()
        .map(|(idx, c)| crate::models::VideoFormat {
            format_id: format!("instagram_{idx}"),
            ext: c
                .content_type
                .rsplit_once('/')
                .map(|(_, e)| e.to_string())
                .unwrap_or_else(|| "mp4".to_string()),
            resolution: c.quality.clone(),
            filesize: 0,
            quality: 0,
            video_url: Some(c.url.clone()),
        })
        .collect()
}
