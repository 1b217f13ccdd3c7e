// Best-effort terminal-state webhook delivery.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

use crate::models::TaskSnapshot;

/// Maps task ids to callback URLs and fires each registration exactly once,
/// when its task reaches a terminal state.
pub struct WebhookNotifier {
    client: reqwest::Client,
    timeout: Duration,
    hooks: RwLock<HashMap<String, String>>,
}

impl WebhookNotifier {
    pub fn new(client: reqwest::Client, timeout: Duration) -> Self {
        Self {
            client,
            timeout,
            hooks: RwLock::new(HashMap::new()),
        }
    }

    /// Register a callback for a task. Idempotent, last write wins.
    pub fn register(&self, task_id: &str, url: &str) {
        let mut hooks = self.hooks.write().expect("webhook map lock poisoned");
        hooks.insert(task_id.to_string(), url.to_string());
    }

    /// POST the snapshot to the task's callback, if one is registered and the
    /// snapshot is terminal. The registration is consumed either way it ends:
    /// delivery failures are logged and swallowed, never retried.
    pub async fn notify_if_registered(&self, snapshot: &TaskSnapshot) {
        if !snapshot.status.is_terminal() {
            return;
        }
        let url = {
            let mut hooks = self.hooks.write().expect("webhook map lock poisoned");
            hooks.remove(&snapshot.task_id)
        };
        let Some(url) = url else {
            return;
        };

        log::debug!(
            "notifying webhook for task {} ({})",
            snapshot.task_id,
            snapshot.status
        );
        let result = self
            .client
            .post(&url)
            .timeout(self.timeout)
            .json(snapshot)
            .send()
            .await;
        match result {
            Ok(response) => {
                if !response.status().is_success() {
                    log::warn!(
                        "webhook for task {} returned {}",
                        snapshot.task_id,
                        response.status()
                    );
                }
            }
            Err(e) => {
                log::warn!("webhook delivery for task {} failed: {e}", snapshot.task_id);
            }
        }
    }
}
