// Direct byte fetcher: streams a resolved video URL to local storage.

use std::path::PathBuf;

use tokio::io::AsyncWriteExt;
use url::Url;

use crate::error::{Error, Result};
use crate::progress::direct_fetch_progress;
use crate::store::ArtifactStore;

const FETCH_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

/// Streams a resolved video URL to the artifact store in chunks, reporting
/// progress over the 20-90 slice of the task scale when the server declares a
/// content length.
pub struct DirectFetcher {
    client: reqwest::Client,
}

impl DirectFetcher {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Download `video_url` into `{file_id}.{ext}` under the store.
    ///
    /// `page_url` is the page the candidate was discovered on, sent as the
    /// Referer. A failed stream removes the partial file before returning.
    pub async fn fetch(
        &self,
        page_url: &str,
        video_url: &str,
        store: &ArtifactStore,
        file_id: &str,
        on_progress: &(dyn Fn(u8) + Send + Sync),
    ) -> Result<PathBuf> {
        let response = self
            .client
            .get(video_url)
            .header(reqwest::header::USER_AGENT, FETCH_USER_AGENT)
            .header(reqwest::header::REFERER, page_url)
            .send()
            .await?
            .error_for_status()?;

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        let ext = resolve_extension(&content_type, video_url);
        let total = response.content_length();

        let path = store.path_for(file_id, &ext);
        let mut file = tokio::fs::File::create(&path).await?;
        let mut received: u64 = 0;

        let mut response = response;
        loop {
            let chunk = match response.chunk().await {
                Ok(Some(chunk)) => chunk,
                Ok(None) => break,
                Err(e) => {
                    discard_partial(&path).await;
                    return Err(Error::Fetch(e));
                }
            };
            if let Err(e) = file.write_all(&chunk).await {
                discard_partial(&path).await;
                return Err(Error::Io(e));
            }
            received += chunk.len() as u64;
            if let Some(total) = total {
                on_progress(direct_fetch_progress(received, total));
            }
        }
        if let Err(e) = file.flush().await {
            discard_partial(&path).await;
            return Err(Error::Io(e));
        }

        log::info!("fetched {received} bytes from {video_url} into {}", path.display());
        Ok(path)
    }
}

/// Remove a partially written file so a failed stream is never reported as a
/// stored artifact.
async fn discard_partial(path: &std::path::Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        log::warn!("failed to remove partial file {}: {e}", path.display());
    }
}

/// Resolve the artifact extension: known content-type substrings first, then
/// the URL's path extension, defaulting to mp4.
fn resolve_extension(content_type: &str, video_url: &str) -> String {
    if content_type.contains("webm") {
        return "webm".to_string();
    }
    if content_type.contains("ogg") {
        return "ogg".to_string();
    }
    if content_type.contains("mov") {
        return "mov".to_string();
    }
    if let Ok(parsed) = Url::parse(video_url) {
        let path = parsed.path();
        if let Some((_, ext)) = path.rsplit_once('.') {
            if !ext.is_empty() && !ext.contains('/') {
                return ext.to_string();
            }
        }
    }
    "mp4".to_string()
}
