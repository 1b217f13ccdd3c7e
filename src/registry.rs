// In-memory task status registry.
//
// Single source of truth polled by clients. Exactly one worker writes a given
// task during its life, but the key set is mutated by many workers and
// readers may appear at any time, so every access goes through the lock and
// readers always get a cloned, complete snapshot.

use std::collections::HashMap;
use std::sync::RwLock;

use crate::models::{TaskSnapshot, TaskStatus, TaskUpdate};

#[derive(Default)]
pub struct TaskRegistry {
    tasks: RwLock<HashMap<String, TaskSnapshot>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a newly submitted task in `processing` at progress 0.
    pub fn create(&self, task_id: &str, message: &str) -> TaskSnapshot {
        let snapshot = TaskSnapshot::new(task_id, message);
        let mut tasks = self.tasks.write().expect("task registry lock poisoned");
        tasks.insert(task_id.to_string(), snapshot.clone());
        snapshot
    }

    /// Merge `update` into the task's snapshot.
    ///
    /// Fields absent from the update keep their previous value; progress never
    /// decreases except on the transition to `Error`, which resets it to 0.
    /// Updates against unknown or already-terminal tasks are dropped.
    pub fn update(&self, task_id: &str, update: TaskUpdate) {
        let mut tasks = self.tasks.write().expect("task registry lock poisoned");
        let Some(snapshot) = tasks.get_mut(task_id) else {
            log::warn!("status update for unknown task {task_id}");
            return;
        };
        if snapshot.status.is_terminal() {
            log::warn!(
                "dropping status update for terminal task {task_id} ({})",
                snapshot.status
            );
            return;
        }

        if let Some(status) = update.status {
            snapshot.status = status;
        }
        if let Some(message) = update.message {
            snapshot.message = message;
        }
        if snapshot.status == TaskStatus::Error {
            snapshot.progress = 0;
        } else if let Some(progress) = update.progress {
            snapshot.progress = snapshot.progress.max(progress.min(100));
        }
        if update.file_id.is_some() {
            snapshot.file_id = update.file_id;
        }
        if update.filename.is_some() {
            snapshot.filename = update.filename;
        }
        if update.download_url.is_some() {
            snapshot.download_url = update.download_url;
        }
    }

    /// Current snapshot of a task, if known.
    pub fn get(&self, task_id: &str) -> Option<TaskSnapshot> {
        let tasks = self.tasks.read().expect("task registry lock poisoned");
        tasks.get(task_id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_starts_processing_at_zero() {
        let registry = TaskRegistry::new();
        let snapshot = registry.create("t1", "queued");
        assert_eq!(snapshot.status, TaskStatus::Processing);
        assert_eq!(snapshot.progress, 0);
        assert_eq!(registry.get("t1").unwrap().message, "queued");
    }

    #[test]
    fn get_unknown_task_is_none() {
        let registry = TaskRegistry::new();
        assert!(registry.get("missing").is_none());
    }

    #[test]
    fn update_merges_without_clearing_terminal_fields() {
        let registry = TaskRegistry::new();
        registry.create("t1", "queued");
        registry.update(
            "t1",
            TaskUpdate {
                file_id: Some("f1".into()),
                filename: Some("clip.mp4".into()),
                ..TaskUpdate::default()
            },
        );
        registry.update("t1", TaskUpdate::progress(40).with_message("downloading"));

        let snapshot = registry.get("t1").unwrap();
        assert_eq!(snapshot.file_id.as_deref(), Some("f1"));
        assert_eq!(snapshot.filename.as_deref(), Some("clip.mp4"));
        assert_eq!(snapshot.progress, 40);
        assert_eq!(snapshot.message, "downloading");
    }

    #[test]
    fn progress_never_decreases() {
        let registry = TaskRegistry::new();
        registry.create("t1", "queued");
        registry.update("t1", TaskUpdate::progress(60));
        registry.update("t1", TaskUpdate::progress(30));
        assert_eq!(registry.get("t1").unwrap().progress, 60);
    }

    #[test]
    fn error_resets_progress_to_zero() {
        let registry = TaskRegistry::new();
        registry.create("t1", "queued");
        registry.update("t1", TaskUpdate::progress(75));
        registry.update(
            "t1",
            TaskUpdate::status(TaskStatus::Error).with_message("engine failed"),
        );

        let snapshot = registry.get("t1").unwrap();
        assert_eq!(snapshot.status, TaskStatus::Error);
        assert_eq!(snapshot.progress, 0);
        assert!(!snapshot.message.is_empty());
    }

    #[test]
    fn terminal_states_absorb_later_updates() {
        let registry = TaskRegistry::new();
        registry.create("t1", "queued");
        registry.update("t1", TaskUpdate::status(TaskStatus::Completed).with_progress(100));
        registry.update(
            "t1",
            TaskUpdate::status(TaskStatus::Downloading).with_progress(10),
        );

        let snapshot = registry.get("t1").unwrap();
        assert_eq!(snapshot.status, TaskStatus::Completed);
        assert_eq!(snapshot.progress, 100);
    }

    #[test]
    fn tasks_are_independent() {
        let registry = TaskRegistry::new();
        registry.create("a", "queued");
        registry.create("b", "queued");
        registry.update("a", TaskUpdate::progress(50));
        assert_eq!(registry.get("a").unwrap().progress, 50);
        assert_eq!(registry.get("b").unwrap().progress, 0);
    }
}
