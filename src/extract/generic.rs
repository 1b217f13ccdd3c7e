// Generic markup extraction: last-resort scan of an arbitrary page.

use std::time::Duration;

use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use scraper::{Html, Selector};
use url::Url;

use crate::models::{dedup_candidates, ExtractionMethod, ExtractionResult, VideoCandidate};

use super::ExtractionStrategy;

const PAGE_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_TITLE: &str = "Unknown";

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
    AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

lazy_static! {
    static ref VIDEO_SELECTOR: Selector = Selector::parse("video").expect("valid selector");
    static ref SOURCE_SELECTOR: Selector = Selector::parse("source").expect("valid selector");
    static ref LD_JSON_SELECTOR: Selector =
        Selector::parse("script[type='application/ld+json']").expect("valid selector");
    static ref IFRAME_SELECTOR: Selector = Selector::parse("iframe").expect("valid selector");
    static ref TITLE_SELECTOR: Selector = Selector::parse("title").expect("valid selector");
    static ref OG_TITLE_SELECTOR: Selector =
        Selector::parse("meta[property='og:title']").expect("valid selector");

    static ref ABSOLUTE_VIDEO_RE: Regex = Regex::new(
        r#"(?i)https?://[^\s"'<>]+\.(?:mp4|webm|ogg|mov|avi|flv|mkv)(?:\?[^\s"'<>]*)?"#
    )
    .expect("valid regex");
    static ref QUOTED_VIDEO_RE: Regex = Regex::new(
        r#"(?i)["']([^"']*\.(?:mp4|webm|ogg|mov|avi|flv|mkv)[^"']*)["']"#
    )
    .expect("valid regex");
    static ref SRC_VIDEO_RE: Regex =
        Regex::new(r#"(?i)src=["']([^"']*video[^"']*)["']"#).expect("valid regex");
    static ref YOUTUBE_EMBED_RE: Regex =
        Regex::new(r"(?:youtube\.com/embed/|youtu\.be/)([a-zA-Z0-9_-]+)").expect("valid regex");
    static ref VIMEO_EMBED_RE: Regex =
        Regex::new(r"vimeo\.com/(?:video/)?(\d+)").expect("valid regex");
}

/// Scans raw markup for anything playable: video/source elements, JSON-LD
/// blocks, URL patterns, and known embed iframes. Unlike the platform
/// strategy, candidates accumulate across all sub-steps.
pub struct GenericHtmlStrategy {
    client: reqwest::Client,
}

impl GenericHtmlStrategy {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ExtractionStrategy for GenericHtmlStrategy {
    fn name(&self) -> &'static str {
        "html_parse"
    }

    async fn extract(&self, url: &str) -> Option<ExtractionResult> {
        let response = self
            .client
            .get(url)
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .timeout(PAGE_TIMEOUT)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| log::debug!("page fetch failed for {url}: {e}"))
            .ok()?;
        let page = response.text().await.ok()?;
        parse_page(&page, url)
    }
}

/// Parse raw markup, accumulating candidates across every sub-step.
fn parse_page(page: &str, page_url: &str) -> Option<ExtractionResult> {
    let document = Html::parse_document(page);
    let base = Url::parse(page_url).ok();

    let mut title: Option<String> = document
        .select(&TITLE_SELECTOR)
        .next()
        .map(|el| el.text().collect::<String>().trim().to_string())
        .filter(|t| !t.is_empty());

    let mut candidates = Vec::new();
    candidates_from_video_elements(&document, base.as_ref(), &mut candidates);
    candidates_from_ld_json(&document, &mut title, &mut candidates);
    candidates_from_url_patterns(page, base.as_ref(), &mut candidates);
    candidates_from_embeds(&document, &mut candidates);

    let candidates = dedup_candidates(candidates);
    if candidates.is_empty() {
        return None;
    }

    // og:title overrides whatever the title element said.
    if let Some(og_title) = document
        .select(&OG_TITLE_SELECTOR)
        .next()
        .and_then(|el| el.value().attr("content"))
        .filter(|t| !t.is_empty())
    {
        title = Some(og_title.to_string());
    }

    let mut result = ExtractionResult::new(
        title.unwrap_or_else(|| DEFAULT_TITLE.to_string()),
        ExtractionMethod::HtmlParse,
    );
    result.formats = synthesized_formats(&candidates);
    result.candidates = candidates;
    Some(result)
}

/// `<video src>` and nested `<source src>` attributes, resolved against the
/// page base.
fn candidates_from_video_elements(
    document: &Html,
    base: Option<&Url>,
    candidates: &mut Vec<VideoCandidate>,
) {
    for video in document.select(&VIDEO_SELECTOR) {
        if let Some(src) = video.value().attr("src") {
            if let Some(resolved) = resolve(base, src) {
                candidates.push(
                    VideoCandidate::new(resolved)
                        .with_content_type(video.value().attr("type").unwrap_or("video/mp4")),
                );
            }
        }
        for source in video.select(&SOURCE_SELECTOR) {
            if let Some(src) = source.value().attr("src") {
                if let Some(resolved) = resolve(base, src) {
                    candidates.push(
                        VideoCandidate::new(resolved)
                            .with_content_type(source.value().attr("type").unwrap_or("video/mp4"))
                            .with_quality(source.value().attr("data-quality").unwrap_or("unknown")),
                    );
                }
            }
        }
    }
}

/// `application/ld+json` structured data: `contentUrl` yields a candidate;
/// `name` supplies the title when none was set.
fn candidates_from_ld_json(
    document: &Html,
    title: &mut Option<String>,
    candidates: &mut Vec<VideoCandidate>,
) {
    for script in document.select(&LD_JSON_SELECTOR) {
        let raw = script.text().collect::<String>();
        let Ok(parsed) = serde_json::from_str::<serde_json::Value>(&raw) else {
            continue;
        };
        // A list takes its first element.
        let data = match &parsed {
            serde_json::Value::Array(items) => match items.first() {
                Some(first) => first,
                None => continue,
            },
            other => other,
        };
        let Some(object) = data.as_object() else {
            continue;
        };
        if title.is_none() {
            if let Some(name) = object.get("name").and_then(|v| v.as_str()) {
                *title = Some(name.to_string());
            }
        }
        if let Some(content_url) = object.get("contentUrl").and_then(|v| v.as_str()) {
            let content_type = object
                .get("encodingFormat")
                .and_then(|v| v.as_str())
                .unwrap_or("video/mp4");
            candidates.push(VideoCandidate::new(content_url).with_content_type(content_type));
        }
    }
}

/// Regex scan of the raw markup for video-extension URLs and
/// `src="...video..."` attributes. Root-relative matches are resolved
/// against the page base.
fn candidates_from_url_patterns(
    page: &str,
    base: Option<&Url>,
    candidates: &mut Vec<VideoCandidate>,
) {
    for m in ABSOLUTE_VIDEO_RE.find_iter(page) {
        candidates.push(VideoCandidate::new(m.as_str()));
    }
    for caps in QUOTED_VIDEO_RE.captures_iter(page) {
        push_pattern_match(&caps[1], base, candidates);
    }
    for caps in SRC_VIDEO_RE.captures_iter(page) {
        push_pattern_match(&caps[1], base, candidates);
    }
}

fn push_pattern_match(raw: &str, base: Option<&Url>, candidates: &mut Vec<VideoCandidate>) {
    if raw.starts_with("http") {
        candidates.push(VideoCandidate::new(raw));
    } else if raw.starts_with('/') || raw.starts_with("./") {
        if let Some(resolved) = resolve(base, raw) {
            candidates.push(VideoCandidate::new(resolved));
        }
    }
}

/// `<iframe>` embeds of known video hosts, rewritten back into canonical
/// watch URLs and tagged with the platform name.
fn candidates_from_embeds(document: &Html, candidates: &mut Vec<VideoCandidate>) {
    for iframe in document.select(&IFRAME_SELECTOR) {
        let Some(src) = iframe.value().attr("src") else {
            continue;
        };
        if src.contains("youtube.com") || src.contains("youtu.be") {
            if let Some(caps) = YOUTUBE_EMBED_RE.captures(src) {
                candidates.push(
                    VideoCandidate::new(format!("https://www.youtube.com/watch?v={}", &caps[1]))
                        .with_content_type("youtube"),
                );
            }
        } else if src.contains("vimeo.com") {
            if let Some(caps) = VIMEO_EMBED_RE.captures(src) {
                candidates.push(
                    VideoCandidate::new(format!("https://vimeo.com/{}", &caps[1]))
                        .with_content_type("vimeo"),
                );
            }
        }
    }
}

fn resolve(base: Option<&Url>, href: &str) -> Option<String> {
    match base {
        Some(base) => base.join(href).ok().map(String::from),
        None => {
            if href.starts_with("http") {
                Some(href.to_string())
            } else {
                None
            }
        }
    }
}

fn synthesized_formats(candidates: &[VideoCandidate]) -> Vec<crate::models::VideoFormat> {
    candidates
        .iter()
        .enumerate()
        .map(|(idx, c)| crate::models::VideoFormat {
            format_id: format!("html_{idx}"),
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

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE_URL: &str = "https://example.com/videos/page";

    #[test]
    fn video_element_src_is_resolved_against_page_base() {
        let page = r#"<html><head><title>Clips</title></head>
            <body><video src="clip.mp4" type="video/mp4"></video></body></html>"#;
        let result = parse_page(page, PAGE_URL).unwrap();
        assert_eq!(result.method, ExtractionMethod::HtmlParse);
        assert_eq!(
            result.candidates[0].url,
            "https://example.com/videos/clip.mp4"
        );
        assert_eq!(result.title, "Clips");
    }

    #[test]
    fn nested_source_elements_carry_quality_hints() {
        let page = r#"<video>
            <source src="/media/hd.webm" type="video/webm" data-quality="1080p"/>
            <source src="/media/sd.webm" type="video/webm" data-quality="480p"/>
        </video>"#;
        let result = parse_page(page, PAGE_URL).unwrap();
        assert_eq!(result.candidates[0].url, "https://example.com/media/hd.webm");
        assert_eq!(result.candidates[0].quality, "1080p");
        assert_eq!(result.candidates[1].quality, "480p");
    }

    #[test]
    fn ld_json_supplies_candidate_and_title() {
        let page = r#"<html><body><script type="application/ld+json">
            [{"@type":"VideoObject","name":"Launch recap",
              "contentUrl":"https://cdn.example.com/recap.mp4",
              "encodingFormat":"video/mp4"}]
        </script></body></html>"#;
        let result = parse_page(page, PAGE_URL).unwrap();
        assert_eq!(result.title, "Launch recap");
        assert_eq!(result.candidates[0].url, "https://cdn.example.com/recap.mp4");
    }

    #[test]
    fn og_title_overrides_title_element() {
        let page = r#"<html><head>
            <title>raw title</title>
            <meta property="og:title" content="Nice title"/>
        </head><body><video src="https://cdn.example.com/v.mp4"></video></body></html>"#;
        let result = parse_page(page, PAGE_URL).unwrap();
        assert_eq!(result.title, "Nice title");
    }

    #[test]
    fn url_patterns_resolve_root_relative_paths() {
        let page = r#"<script>var sources = ["/assets/movie.mkv",
            "https://cdn.example.com/other.webm"];</script>"#;
        let result = parse_page(page, PAGE_URL).unwrap();
        let urls: Vec<&str> = result.candidates.iter().map(|c| c.url.as_str()).collect();
        assert!(urls.contains(&"https://example.com/assets/movie.mkv"));
        assert!(urls.contains(&"https://cdn.example.com/other.webm"));
    }

    #[test]
    fn youtube_embed_is_rewritten_to_watch_url() {
        let page = r#"<iframe src="https://www.youtube.com/embed/dQw4w9WgXcQ?rel=0"></iframe>"#;
        let result = parse_page(page, PAGE_URL).unwrap();
        assert_eq!(
            result.candidates[0].url,
            "https://www.youtube.com/watch?v=dQw4w9WgXcQ"
        );
        assert_eq!(result.candidates[0].content_type, "youtube");
    }

    #[test]
    fn vimeo_embed_is_rewritten_to_canonical_url() {
        // The raw player URL also matches the src-attribute scan, so the
        // rewritten candidate is not necessarily first.
        let page = r#"<iframe src="https://player.vimeo.com/video/76979871?h=abc"></iframe>"#;
        let result = parse_page(page, PAGE_URL).unwrap();
        let canonical = result
            .candidates
            .iter()
            .find(|c| c.url == "https://vimeo.com/76979871")
            .expect("canonical vimeo candidate");
        assert_eq!(canonical.content_type, "vimeo");
    }

    #[test]
    fn candidates_accumulate_across_sub_steps_and_dedup() {
        let page = r#"<html><body>
            <video src="https://cdn.example.com/a.mp4"></video>
            <script>play("https://cdn.example.com/a.mp4");</script>
            <iframe src="https://www.youtube.com/embed/abc123XYZ_-"></iframe>
        </body></html>"#;
        let result = parse_page(page, PAGE_URL).unwrap();
        assert_eq!(result.candidates.len(), 2);
        assert_eq!(result.candidates[0].url, "https://cdn.example.com/a.mp4");
        assert_eq!(
            result.candidates[1].url,
            "https://www.youtube.com/watch?v=abc123XYZ_-"
        );
        assert_eq!(result.formats.len(), 2);
        assert_eq!(result.formats[0].format_id, "html_0");
    }

    #[test]
    fn page_without_video_reports_no_result() {
        assert!(parse_page("<html><body><p>text only</p></body></html>", PAGE_URL).is_none());
    }
}
