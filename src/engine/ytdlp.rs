// yt-dlp engine implementation.
//
// Probe mode shells out with --dump-json; download mode spawns the binary
// with --newline and a progress template whose lines are parsed into the
// three progress shapes.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command as TokioCommand;

use super::{find_output_file, run_output_with_timeout, EngineFormat, EngineInfo, ProgressSink, VideoEngine};
use crate::config::ServiceConfig;
use crate::error::{Error, Result};
use crate::progress::EngineProgress;

/// Container every download is remuxed to.
const OUTPUT_CONTAINER: &str = "mp4";

const PROGRESS_MARKER: &str = "[vf-progress]";

lazy_static! {
    static ref PROGRESS_RE: Regex = Regex::new(
        // percent comes from %(progress._percent_str)s, which is space-padded.
        r"\[vf-progress\]\s+downloaded=(\S+)\s+total=(\S+)\s+estimate=(\S+)\s+percent=\s*(\S+)"
    )
    .expect("valid progress regex");
}

/// Find the yt-dlp executable in common install locations, then PATH.
fn find_ytdlp() -> String {
    let common_paths = [
        "/opt/homebrew/bin/yt-dlp",
        "/usr/local/bin/yt-dlp",
        "/usr/bin/yt-dlp",
    ];

    for path in common_paths {
        if Path::new(path).exists() {
            return path.to_string();
        }
    }

    if let Ok(output) = std::process::Command::new("which").arg("yt-dlp").output() {
        if output.status.success() {
            if let Ok(path) = String::from_utf8(output.stdout) {
                let trimmed = path.trim();
                if !trimmed.is_empty() {
                    return trimmed.to_string();
                }
            }
        }
    }

    // Last resort: hope it's in PATH.
    "yt-dlp".to_string()
}

pub struct YtDlpEngine {
    binary: String,
    proxy: Option<String>,
    probe_timeout_secs: u64,
    socket_timeout_secs: u64,
}

impl YtDlpEngine {
    pub fn new(config: &ServiceConfig) -> Self {
        Self {
            binary: find_ytdlp(),
            proxy: config.proxy.clone(),
            probe_timeout_secs: config.probe_timeout.as_secs(),
            socket_timeout_secs: config.engine_socket_timeout.as_secs(),
        }
    }

    fn push_common_args(&self, args: &mut Vec<String>) {
        args.push("--no-playlist".to_string());
        args.push("--no-warnings".to_string());
        args.push("--socket-timeout".to_string());
        args.push(self.socket_timeout_secs.to_string());
        if let Some(proxy) = &self.proxy {
            args.push("--proxy".to_string());
            args.push(proxy.clone());
        }
    }
}

#[async_trait]
impl VideoEngine for YtDlpEngine {
    fn name(&self) -> &'static str {
        "yt-dlp"
    }

    async fn probe(&self, url: &str) -> Result<EngineInfo> {
        let mut args = vec![
            "--dump-json".to_string(),
            "--retries".to_string(),
            "2".to_string(),
        ];
        self.push_common_args(&mut args);
        args.push(url.to_string());

        let output = run_output_with_timeout(&self.binary, args, self.probe_timeout_secs).await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::Engine(format!(
                "metadata probe failed: {}",
                error_tail(&stderr)
            )));
        }

        let info = parse_info_json(&output.stdout)?;
        if info.title.is_empty() {
            return Err(Error::Engine("probe returned no title".to_string()));
        }
        Ok(info)
    }

    async fn download(
        &self,
        url: &str,
        format_selector: &str,
        dest_dir: &Path,
        file_stem: &str,
        on_progress: ProgressSink,
    ) -> Result<PathBuf> {
        let output_template = dest_dir
            .join(format!("{file_stem}.%(ext)s"))
            .to_string_lossy()
            .to_string();
        let mut args = vec![
            "-f".to_string(),
            format_selector.to_string(),
            "--newline".to_string(),
            "--retries".to_string(),
            "5".to_string(),
            "--merge-output-format".to_string(),
            OUTPUT_CONTAINER.to_string(),
            "-o".to_string(),
            output_template,
            "--progress-template".to_string(),
            format!(
                "download:{PROGRESS_MARKER} downloaded=%(progress.downloaded_bytes)s \
                 total=%(progress.total_bytes)s estimate=%(progress.total_bytes_estimate)s \
                 percent=%(progress._percent_str)s"
            ),
        ];
        self.push_common_args(&mut args);
        args.push(url.to_string());

        log::info!("starting yt-dlp download for {url} with selector {format_selector}");
        let mut child = TokioCommand::new(&self.binary)
            .args(&args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| Error::Engine(format!("failed to start yt-dlp: {e}")))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Engine("failed to capture yt-dlp stdout".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| Error::Engine("failed to capture yt-dlp stderr".to_string()))?;

        let stderr_task = tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            let mut collected = Vec::new();
            while let Ok(Some(line)) = lines.next_line().await {
                collected.push(line);
            }
            collected.join("\n")
        });

        let mut lines = BufReader::new(stdout).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if line.contains(PROGRESS_MARKER) {
                on_progress(parse_progress_line(&line));
            } else if line.contains("[Merger]") || line.contains("Destination") {
                log::debug!("yt-dlp: {line}");
            }
        }

        let status = child
            .wait()
            .await
            .map_err(|e| Error::Engine(format!("yt-dlp process error: {e}")))?;
        let stderr_output = stderr_task.await.unwrap_or_default();

        if !status.success() {
            return Err(Error::Engine(format!(
                "download failed: {}",
                error_tail(&stderr_output)
            )));
        }

        // A zero exit with no materialized file is still a failure.
        find_output_file(dest_dir, file_stem)
            .ok_or_else(|| Error::Engine("no output file produced".to_string()))
    }
}

/// Parse one progress-template line into a progress shape, preferring exact
/// byte counts, then estimated totals, then the percent string.
fn parse_progress_line(line: &str) -> Option<EngineProgress> {
    let caps = PROGRESS_RE.captures(line)?;
    let downloaded = parse_bytes(caps.get(1)?.as_str());
    let total = parse_bytes(caps.get(2)?.as_str());
    let estimate = parse_bytes(caps.get(3)?.as_str());
    let percent = caps
        .get(4)?
        .as_str()
        .trim_end_matches('%')
        .parse::<f64>()
        .ok();

    match (downloaded, total, estimate, percent) {
        (Some(downloaded), Some(total), _, _) => Some(EngineProgress::Exact { downloaded, total }),
        (Some(downloaded), None, Some(total), _) => {
            Some(EngineProgress::Estimated { downloaded, total })
        }
        (_, _, _, Some(p)) => Some(EngineProgress::Percent(p)),
        _ => None,
    }
}

/// The engine renders missing numeric fields as "NA"; estimates may be
/// fractional byte counts.
fn parse_bytes(field: &str) -> Option<u64> {
    field.parse::<f64>().ok().map(|v| v.max(0.0) as u64)
}

/// Last few meaningful stderr lines, for error messages.
fn error_tail(stderr: &str) -> String {
    let lines: Vec<&str> = stderr
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();
    if lines.is_empty() {
        return "unknown engine error".to_string();
    }
    lines[lines.len().saturating_sub(3)..].join(" | ")
}

fn parse_info_json(stdout: &[u8]) -> Result<EngineInfo> {
    let json: serde_json::Value = serde_json::from_slice(stdout)
        .map_err(|e| Error::Engine(format!("failed to parse engine JSON: {e}")))?;

    let formats = json["formats"]
        .as_array()
        .map(|entries| {
            entries
                .iter()
                .map(|f| EngineFormat {
                    format_id: f["format_id"].as_str().unwrap_or("").to_string(),
                    ext: f["ext"].as_str().unwrap_or("mp4").to_string(),
                    resolution: f["resolution"].as_str().unwrap_or("unknown").to_string(),
                    filesize: f["filesize"].as_u64().unwrap_or(0),
                    quality: f["quality"].as_i64().unwrap_or(0),
                    vcodec: f["vcodec"].as_str().unwrap_or("none").to_string(),
                    url: f["url"].as_str().map(str::to_string),
                })
                .collect()
        })
        .unwrap_or_default();

    Ok(EngineInfo {
        title: json["title"].as_str().unwrap_or("").to_string(),
        duration_seconds: json["duration"].as_f64().unwrap_or(0.0) as u64,
        formats,
        thumbnail: json["thumbnail"].as_str().map(str::to_string),
        description: json["description"].as_str().map(str::to_string),
        uploader: json["uploader"].as_str().map(str::to_string),
        view_count: json["view_count"].as_u64(),
        upload_date: json["upload_date"].as_str().map(str::to_string),
        webpage_url: json["webpage_url"].as_str().map(str::to_string),
    })
}
