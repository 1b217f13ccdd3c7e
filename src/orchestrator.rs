// Download orchestrator: the task state machine.
//
// Owns the end-to-end life of a download task: validate, register, run the
// engine (or the direct fetcher), fall back through the markup strategies on
// engine failure, store the artifact, and publish terminal state.

use std::path::PathBuf;
use std::sync::Arc;

use uuid::Uuid;

use crate::config::ServiceConfig;
use crate::engine::{ProgressSink, VideoEngine, YtDlpEngine};
use crate::error::{Error, Result};
use crate::extract::{
    url_on_host, EngineStrategy, ExtractionStrategy, ExtractorChain, GenericHtmlStrategy,
    InstagramStrategy,
};
use crate::fetch::DirectFetcher;
use crate::models::{ExtractionResult, TaskSnapshot, TaskStatus, TaskUpdate, VideoCandidate};
use crate::progress::{ENGINE_PROGRESS_FALLBACK, ENGINE_PROGRESS_FLOOR, FETCH_PROGRESS_FLOOR};
use crate::registry::TaskRegistry;
use crate::store::ArtifactStore;
use crate::validate::is_valid_url;
use crate::webhook::WebhookNotifier;

/// Format selector used when the caller asks for nothing specific. Prefers
/// an mp4 video+audio pair, degrading to whatever the source offers.
pub const DEFAULT_FORMAT_SELECTOR: &str = "bv*[ext=mp4]+ba/b[ext=mp4]/bv*+ba/b";

/// A download submission.
#[derive(Debug, Clone, Default)]
pub struct DownloadRequest {
    /// Page or platform URL the video lives on.
    pub source_url: String,
    /// Engine format selector; empty/`best`/`default` mean the service
    /// default.
    pub format_selector: Option<String>,
    /// Pre-resolved video file URL. When set, the engine is skipped and the
    /// bytes are fetched directly.
    pub direct_video_url: Option<String>,
    /// Callback URL notified once, when the task reaches a terminal state.
    pub webhook_url: Option<String>,
}

/// Drives download tasks from submission to a terminal state. Cheap to
/// clone; clones share the registry and the artifact store.
#[derive(Clone)]
pub struct DownloadOrchestrator {
    inner: Arc<Inner>,
}

struct Inner {
    registry: Arc<TaskRegistry>,
    notifier: Arc<WebhookNotifier>,
    store: Arc<ArtifactStore>,
    engine: Arc<dyn VideoEngine>,
    instagram: Arc<InstagramStrategy>,
    generic: Arc<GenericHtmlStrategy>,
    chain: ExtractorChain,
    fetcher: DirectFetcher,
}

impl DownloadOrchestrator {
    pub fn new(config: ServiceConfig) -> Result<Self> {
        let engine: Arc<dyn VideoEngine> = Arc::new(YtDlpEngine::new(&config));
        Self::with_engine(config, engine)
    }

    /// Build the orchestrator around a caller-supplied engine.
    pub fn with_engine(config: ServiceConfig, engine: Arc<dyn VideoEngine>) -> Result<Self> {
        let client = http_client(config.proxy.as_deref())?;
        let store = Arc::new(ArtifactStore::new(&config.download_dir)?);
        let instagram = Arc::new(InstagramStrategy::new(client.clone()));
        let generic = Arc::new(GenericHtmlStrategy::new(client.clone()));
        let chain = ExtractorChain::new(vec![
            Arc::new(EngineStrategy::new(Arc::clone(&engine))) as Arc<dyn ExtractionStrategy>,
            Arc::clone(&instagram) as Arc<dyn ExtractionStrategy>,
            Arc::clone(&generic) as Arc<dyn ExtractionStrategy>,
        ]);
        Ok(Self {
            inner: Arc::new(Inner {
                registry: Arc::new(TaskRegistry::new()),
                notifier: Arc::new(WebhookNotifier::new(client.clone(), config.webhook_timeout)),
                store,
                engine,
                instagram,
                generic,
                chain,
                fetcher: DirectFetcher::new(client),
            }),
        })
    }

    /// Validate and enqueue a download. Returns the new task id; the work
    /// itself runs on a background task.
    pub fn submit(&self, request: DownloadRequest) -> Result<String> {
        let source_url = request.source_url.trim().to_string();
        if source_url.is_empty() || !is_valid_url(&source_url) {
            return Err(Error::InvalidUrl(source_url));
        }

        let task_id = Uuid::new_v4().to_string();
        self.inner.registry.create(&task_id, "Task accepted");
        if let Some(webhook_url) = request.webhook_url.as_deref() {
            self.inner.notifier.register(&task_id, webhook_url);
        }

        let inner = Arc::clone(&self.inner);
        let id = task_id.clone();
        tokio::spawn(async move {
            inner.run_worker(id, source_url, request).await;
        });
        Ok(task_id)
    }

    /// Run the extraction chain without downloading anything.
    pub async fn extract(&self, url: &str) -> Result<ExtractionResult> {
        let url = url.trim();
        if url.is_empty() || !is_valid_url(url) {
            return Err(Error::InvalidUrl(url.to_string()));
        }
        self.inner.chain.extract(url).await
    }

    pub fn get_status(&self, task_id: &str) -> Result<TaskSnapshot> {
        self.inner
            .registry
            .get(task_id)
            .ok_or_else(|| Error::TaskNotFound(task_id.to_string()))
    }

    /// Locate a stored artifact by file id.
    pub fn get_artifact(&self, file_id: &str) -> Result<(PathBuf, String)> {
        self.inner.store.find(file_id)
    }
}

impl Inner {
    /// Worker body. Every failure path, panics included, lands the task in a
    /// terminal error state, after which the webhook fires exactly once.
    async fn run_worker(self: Arc<Self>, task_id: String, source_url: String, request: DownloadRequest) {
        let this = Arc::clone(&self);
        let id = task_id.clone();
        let handle =
            tokio::spawn(async move { this.run_task(&id, &source_url, &request).await });

        let failure = match handle.await {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(e.to_string()),
            Err(join_err) => {
                log::error!("download task {task_id} panicked: {join_err}");
                Some("download task failed unexpectedly".to_string())
            }
        };
        if let Some(message) = failure {
            log::warn!("task {task_id} failed: {message}");
            self.registry.update(
                &task_id,
                TaskUpdate::status(TaskStatus::Error)
                    .with_message(message)
                    .with_progress(0),
            );
        }

        if let Some(snapshot) = self.registry.get(&task_id) {
            self.notifier.notify_if_registered(&snapshot).await;
        }
    }

    async fn run_task(
        &self,
        task_id: &str,
        source_url: &str,
        request: &DownloadRequest,
    ) -> Result<()> {
        self.registry.update(
            task_id,
            TaskUpdate::progress(5).with_message("Preparing download"),
        );
        let file_id = Uuid::new_v4().to_string();

        let path = match request.direct_video_url.as_deref().filter(|u| !u.is_empty()) {
            Some(video_url) => {
                self.fetch_direct(task_id, source_url, video_url, &file_id)
                    .await?
            }
            None => {
                let selector = normalize_format_selector(request.format_selector.as_deref());
                match self
                    .engine_download(task_id, source_url, &selector, &file_id)
                    .await
                {
                    Ok(path) => path,
                    Err(e) => {
                        log::warn!(
                            "engine download failed for {source_url}, trying markup fallback: {e}"
                        );
                        self.fallback_download(task_id, source_url, &selector, &file_id)
                            .await?
                    }
                }
            }
        };

        self.finalize(task_id, &file_id, &path);
        Ok(())
    }

    async fn fetch_direct(
        &self,
        task_id: &str,
        page_url: &str,
        video_url: &str,
        file_id: &str,
    ) -> Result<PathBuf> {
        self.registry.update(
            task_id,
            TaskUpdate::status(TaskStatus::Downloading)
                .with_message("Downloading video file")
                .with_progress(FETCH_PROGRESS_FLOOR),
        );
        let registry = Arc::clone(&self.registry);
        let id = task_id.to_string();
        let on_progress = move |percent: u8| {
            registry.update(&id, TaskUpdate::progress(percent));
        };
        self.fetcher
            .fetch(page_url, video_url, &self.store, file_id, &on_progress)
            .await
    }

    async fn engine_download(
        &self,
        task_id: &str,
        url: &str,
        selector: &str,
        file_id: &str,
    ) -> Result<PathBuf> {
        self.registry.update(
            task_id,
            TaskUpdate::status(TaskStatus::Downloading)
                .with_message(format!("Downloading via {}", self.engine.name()))
                .with_progress(ENGINE_PROGRESS_FLOOR),
        );
        let registry = Arc::clone(&self.registry);
        let id = task_id.to_string();
        let sink: ProgressSink = Arc::new(move |report| {
            let percent = report
                .map(|p| p.to_task_progress())
                .unwrap_or(ENGINE_PROGRESS_FALLBACK);
            registry.update(&id, TaskUpdate::progress(percent));
        });
        self.engine
            .download(url, selector, self.store.dir(), file_id, sink)
            .await
    }

    /// Engine-less recovery: parse the page with the markup strategies and
    /// download the first candidate. Candidates pointing at hosts the engine
    /// natively handles get one more engine pass against the candidate URL;
    /// whichever way that goes, the candidate still ends at the direct
    /// fetcher if the engine could not produce a file.
    async fn fallback_download(
        &self,
        task_id: &str,
        source_url: &str,
        selector: &str,
        file_id: &str,
    ) -> Result<PathBuf> {
        self.registry.update(
            task_id,
            TaskUpdate::default().with_message("Trying alternate extraction"),
        );

        let mut result = None;
        if self.instagram.supports(source_url) {
            result = self.instagram.extract(source_url).await;
        }
        if result.is_none() {
            result = self.generic.extract(source_url).await;
        }
        let result = result.ok_or_else(|| Error::ExtractionFailed(source_url.to_string()))?;
        let candidate = result
            .candidates
            .first()
            .cloned()
            .ok_or_else(|| Error::ExtractionFailed(source_url.to_string()))?;
        log::info!(
            "fallback candidate for {source_url}: {} ({})",
            candidate.url,
            result.method.as_str()
        );

        if engine_handles(&candidate) {
            match self
                .engine_download(task_id, &candidate.url, selector, file_id)
                .await
            {
                Ok(path) => return Ok(path),
                Err(e) => {
                    log::warn!(
                        "engine pass against candidate {} failed, fetching directly: {e}",
                        candidate.url
                    );
                }
            }
        }
        self.fetch_direct(task_id, source_url, &candidate.url, file_id)
            .await
    }

    fn finalize(&self, task_id: &str, file_id: &str, path: &std::path::Path) {
        self.registry.update(
            task_id,
            TaskUpdate::progress(90).with_message("Finalizing download"),
        );
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| format!("{file_id}.mp4"));
        self.registry.update(
            task_id,
            TaskUpdate {
                status: Some(TaskStatus::Completed),
                message: Some("Download completed".to_string()),
                progress: Some(100),
                file_id: Some(file_id.to_string()),
                filename: Some(filename),
                download_url: Some(format!("/api/file/{file_id}")),
            },
        );
    }
}

fn http_client(proxy: Option<&str>) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder();
    if let Some(proxy) = proxy {
        builder = builder.proxy(reqwest::Proxy::all(proxy)?);
    }
    Ok(builder.build()?)
}

/// Whether the candidate should go through the engine rather than a raw byte
/// fetch.
fn engine_handles(candidate: &VideoCandidate) -> bool {
    url_on_host(&candidate.url, "youtube.com")
        || url_on_host(&candidate.url, "youtu.be")
        || url_on_host(&candidate.url, "vimeo.com")
}

/// Map empty and sentinel format selectors onto the service default.
pub fn normalize_format_selector(raw: Option<&str>) -> String {
    match raw.map(str::trim) {
        None | Some("") | Some("best") | Some("default") => DEFAULT_FORMAT_SELECTOR.to_string(),
        Some(other) => other.to_string(),
    }
}
