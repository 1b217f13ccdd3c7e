// Service configuration.

use std::path::PathBuf;
use std::time::Duration;

/// Configuration for the download service.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Directory where downloaded artifacts are stored.
    pub download_dir: PathBuf,
    /// SOCKS5/HTTP proxy URL passed to the engine and HTTP clients.
    pub proxy: Option<String>,
    /// Timeout for the engine's metadata-only probe.
    pub probe_timeout: Duration,
    /// Socket timeout passed to the engine for downloads.
    pub engine_socket_timeout: Duration,
    /// Timeout for a terminal-state webhook delivery.
    pub webhook_timeout: Duration,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            download_dir: std::env::temp_dir().join("video_downloads"),
            proxy: None,
            probe_timeout: Duration::from_secs(30),
            engine_socket_timeout: Duration::from_secs(30),
            webhook_timeout: Duration::from_secs(5),
        }
    }
}

impl ServiceConfig {
    pub fn with_download_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.download_dir = dir.into();
        self
    }

    pub fn with_proxy(mut self, proxy: Option<String>) -> Self {
        self.proxy = proxy;
        self
    }

    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    pub fn with_engine_socket_timeout(mut self, timeout: Duration) -> Self {
        self.engine_socket_timeout = timeout;
        self
    }

    pub fn with_webhook_timeout(mut self, timeout: Duration) -> Self {
        self.webhook_timeout = timeout;
        self
    }
}
