// Strategy chain extractor.
//
// Three independent strategies discover playable video URLs from a source
// URL; the chain tries them in fixed priority order and stops at the first
// success. Strategies catch their own request/parse errors and report "no
// result" instead of propagating.

mod engine;
mod generic;
mod instagram;

pub use engine::EngineStrategy;
pub use generic::GenericHtmlStrategy;
pub use instagram::InstagramStrategy;

use std::sync::Arc;

use async_trait::async_trait;
use url::Url;

use crate::error::{Error, Result};
use crate::models::ExtractionResult;

/// One self-contained algorithm for discovering playable video URLs.
#[async_trait]
pub trait ExtractionStrategy: Send + Sync {
    /// Name of the strategy (for logging).
    fn name(&self) -> &'static str;

    /// Whether this strategy applies to the URL at all.
    fn supports(&self, url: &str) -> bool {
        let _ = url;
        true
    }

    /// Extract candidates, or `None` when nothing was found. Never errors.
    async fn extract(&self, url: &str) -> Option<ExtractionResult>;
}

/// Fixed-priority chain over the strategies.
pub struct ExtractorChain {
    strategies: Vec<Arc<dyn ExtractionStrategy>>,
}

impl ExtractorChain {
    pub fn new(strategies: Vec<Arc<dyn ExtractionStrategy>>) -> Self {
        Self { strategies }
    }

    /// Run the chain, stopping at the first strategy that yields a result.
    pub async fn extract(&self, url: &str) -> Result<ExtractionResult> {
        for strategy in &self.strategies {
            if !strategy.supports(url) {
                continue;
            }
            log::debug!("trying extraction strategy {}", strategy.name());
            if let Some(result) = strategy.extract(url).await {
                log::info!(
                    "strategy {} found {} candidate(s) for {url}",
                    strategy.name(),
                    result.candidates.len()
                );
                return Ok(result);
            }
            log::debug!("strategy {} found nothing for {url}", strategy.name());
        }
        Err(Error::ExtractionFailed(url.to_string()))
    }
}

/// True when the URL's host is `domain` or a subdomain of it.
pub(crate) fn url_on_host(url: &str, domain: &str) -> bool {
    match Url::parse(url) {
        Ok(parsed) => parsed
            .host_str()
            .map_or(false, |h| h == domain || h.ends_with(&format!(".{domain}"))),
        Err(_) => false,
    }
}
