//! Task registry: persistent task snapshots plus the per-user history.
//!
//! Records live in the task store under `task:{user}:{task}` with a 24h
//! TTL refreshed on every write. Updates are read-modify-write merges
//! under a registry-wide mutex, so unknown fields written at creation
//! (the request echo, the output location) survive progress updates.
//! History is a score-ordered set under `history:{user}`, trimmed to the
//! last 100 entries, expiring 30 days after the last append.

use std::sync::Arc;

use chrono::Utc;
use serde_json::{json, Map, Value as JsonValue};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use cardmill_core::models::{HistoryEntry, ProgressEvent, TaskRecord, TaskStatus};
use cardmill_core::{defaults, Error, Result};
use cardmill_store::TaskStore;

use crate::broadcaster::ProgressBroadcaster;

fn task_key(user_id: &str, task_id: &str) -> String {
    format!("task:{user_id}:{task_id}")
}

fn history_key(user_id: &str) -> String {
    format!("history:{user_id}")
}

pub struct TaskRegistry {
    store: Arc<dyn TaskStore>,
    broadcaster: Arc<ProgressBroadcaster>,
    write_lock: Mutex<()>,
}

impl TaskRegistry {
    pub fn new(store: Arc<dyn TaskStore>, broadcaster: Arc<ProgressBroadcaster>) -> Self {
        Self {
            store,
            broadcaster,
            write_lock: Mutex::new(()),
        }
    }

    /// Create a task record from initial data (a JSON object). The
    /// registry stamps `timestamp` and `user_id`; store failures
    /// propagate to the caller.
    pub async fn create_task(
        &self,
        user_id: &str,
        task_id: &str,
        initial: JsonValue,
    ) -> Result<()> {
        let JsonValue::Object(mut data) = initial else {
            return Err(Error::InvalidInput(
                "initial task data must be a JSON object".to_string(),
            ));
        };
        data.insert("timestamp".to_string(), json!(Utc::now()));
        data.insert("user_id".to_string(), json!(user_id));

        let _guard = self.write_lock.lock().await;
        self.store
            .set(
                &task_key(user_id, task_id),
                JsonValue::Object(data),
                Some(defaults::TASK_TTL_SECS),
            )
            .await?;
        debug!(task_id, user_id, "Task created");
        Ok(())
    }

    /// Merge a progress snapshot onto the stored record, refresh its
    /// TTL, and broadcast the event. Persistence failures propagate;
    /// broadcast is best-effort and happens outside the write lock.
    pub async fn update_task_progress(
        &self,
        user_id: &str,
        task_id: &str,
        progress: i32,
        status: TaskStatus,
        message: &str,
    ) -> Result<()> {
        let key = task_key(user_id, task_id);
        let timestamp = Utc::now();
        {
            let _guard = self.write_lock.lock().await;
            let mut data = match self.store.get(&key).await? {
                Some(JsonValue::Object(map)) => map,
                _ => Map::new(),
            };
            data.insert("progress".to_string(), json!(progress));
            data.insert("status".to_string(), json!(status));
            data.insert("message".to_string(), json!(message));
            data.insert("timestamp".to_string(), json!(timestamp));
            data.insert("user_id".to_string(), json!(user_id));
            self.store
                .set(&key, JsonValue::Object(data), Some(defaults::TASK_TTL_SECS))
                .await?;
        }

        self.broadcaster.send_progress(
            task_id,
            ProgressEvent {
                progress,
                status,
                message: message.to_string(),
                timestamp,
            },
        );
        Ok(())
    }

    /// Current snapshot, or `NotFound` for an unknown or expired task.
    pub async fn get_task_status(&self, user_id: &str, task_id: &str) -> Result<TaskRecord> {
        match self.store.get(&task_key(user_id, task_id)).await? {
            Some(value) => Ok(serde_json::from_value(value)?),
            None => Err(Error::NotFound(format!("task {task_id}"))),
        }
    }

    /// Append to the user's history. Best-effort: failures are logged
    /// and never fail the completed run they describe.
    pub async fn add_to_history(&self, user_id: &str, entry: &HistoryEntry) {
        if let Err(e) = self.try_add_to_history(user_id, entry).await {
            warn!(user_id, error = %e, "Failed to record task history");
        }
    }

    async fn try_add_to_history(&self, user_id: &str, entry: &HistoryEntry) -> Result<()> {
        let key = history_key(user_id);
        let member = serde_json::to_string(entry)?;
        let score = entry.timestamp.timestamp() as f64;
        self.store.zadd(&key, &[(member, score)]).await?;
        self.store
            .zremrangebyrank(&key, 0, -(defaults::HISTORY_MAX_ENTRIES as i64 + 1))
            .await?;
        self.store.expire(&key, defaults::HISTORY_TTL_SECS).await?;
        Ok(())
    }

    /// Most recent entries first, at most `limit`.
    pub async fn get_user_history(&self, user_id: &str, limit: usize) -> Result<Vec<HistoryEntry>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let raw = self
            .store
            .zrevrange(&history_key(user_id), 0, limit as i64 - 1)
            .await?;
        raw.iter()
            .map(|entry| serde_json::from_str(entry).map_err(Error::from))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cardmill_store::MemoryStore;
    use chrono::{Duration as ChronoDuration, Utc};
    use std::time::Duration;

    fn registry() -> (Arc<TaskRegistry>, Arc<ProgressBroadcaster>) {
        let broadcaster = Arc::new(ProgressBroadcaster::new());
        let registry = Arc::new(TaskRegistry::new(
            Arc::new(MemoryStore::new()),
            broadcaster.clone(),
        ));
        (registry, broadcaster)
    }

    #[tokio::test]
    async fn create_and_fetch_roundtrip() {
        let (registry, _) = registry();
        registry
            .create_task("u1", "t1", json!({"status": "created", "output_file": "o.csv"}))
            .await
            .unwrap();

        let record = registry.get_task_status("u1", "t1").await.unwrap();
        assert_eq!(record.status, TaskStatus::Created);
        assert_eq!(record.user_id, "u1");
        assert_eq!(record.details["output_file"], "o.csv");
    }

    #[tokio::test]
    async fn unknown_task_is_not_found() {
        let (registry, _) = registry();
        let err = registry.get_task_status("u1", "absent").await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn updates_merge_onto_existing_fields() {
        let (registry, _) = registry();
        registry
            .create_task(
                "u1",
                "t1",
                json!({"status": "created", "request": {"page_reference": "p-1"}}),
            )
            .await
            .unwrap();

        registry
            .update_task_progress("u1", "t1", 40, TaskStatus::Processing, "Created flashcard (2/5)")
            .await
            .unwrap();

        let record = registry.get_task_status("u1", "t1").await.unwrap();
        assert_eq!(record.progress, 40);
        assert_eq!(record.status, TaskStatus::Processing);
        assert_eq!(record.message, "Created flashcard (2/5)");
        // fields written at creation survive the merge
        assert_eq!(record.details["request"]["page_reference"], "p-1");
    }

    #[tokio::test]
    async fn update_broadcasts_a_progress_event() {
        let (registry, broadcaster) = registry();
        registry
            .create_task("u1", "t1", json!({"status": "created"}))
            .await
            .unwrap();
        let mut rx = broadcaster.connect("t1");

        registry
            .update_task_progress("u1", "t1", 60, TaskStatus::Warning, "Error with flashcard (3/5): boom")
            .await
            .unwrap();

        let event = rx.recv().await.unwrap();
        assert_eq!(event.progress, 60);
        assert_eq!(event.status, TaskStatus::Warning);
    }

    #[tokio::test]
    async fn update_without_subscriber_still_persists() {
        let (registry, _) = registry();
        registry
            .create_task("u1", "t1", json!({"status": "created"}))
            .await
            .unwrap();
        registry
            .update_task_progress("u1", "t1", 100, TaskStatus::Completed, "done")
            .await
            .unwrap();
        let record = registry.get_task_status("u1", "t1").await.unwrap();
        assert_eq!(record.status, TaskStatus::Completed);
    }

    #[tokio::test(start_paused = true)]
    async fn updates_refresh_the_record_ttl() {
        let (registry, _) = registry();
        registry
            .create_task("u1", "t1", json!({"status": "created"}))
            .await
            .unwrap();

        tokio::time::advance(Duration::from_secs(defaults::TASK_TTL_SECS - 100)).await;
        registry
            .update_task_progress("u1", "t1", 50, TaskStatus::Processing, "halfway")
            .await
            .unwrap();

        tokio::time::advance(Duration::from_secs(defaults::TASK_TTL_SECS - 100)).await;
        assert!(registry.get_task_status("u1", "t1").await.is_ok());

        tokio::time::advance(Duration::from_secs(200)).await;
        assert!(matches!(
            registry.get_task_status("u1", "t1").await,
            Err(Error::NotFound(_))
        ));
    }

    fn history_entry(task_id: &str, offset_secs: i64) -> HistoryEntry {
        HistoryEntry {
            task_id: task_id.to_string(),
            page_reference: "page".to_string(),
            status: TaskStatus::Completed,
            message: "done".to_string(),
            timestamp: Utc::now() + ChronoDuration::seconds(offset_secs),
        }
    }

    #[tokio::test]
    async fn history_is_most_recent_first() {
        let (registry, _) = registry();
        for i in 0..3 {
            registry
                .add_to_history("u1", &history_entry(&format!("t{i}"), i))
                .await;
        }
        let history = registry.get_user_history("u1", 10).await.unwrap();
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].task_id, "t2");
        assert_eq!(history[2].task_id, "t0");
    }

    #[tokio::test]
    async fn history_respects_limit() {
        let (registry, _) = registry();
        for i in 0..5 {
            registry
                .add_to_history("u1", &history_entry(&format!("t{i}"), i))
                .await;
        }
        let history = registry.get_user_history("u1", 2).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].task_id, "t4");

        assert!(registry.get_user_history("u1", 0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn history_is_trimmed_to_the_cap() {
        let (registry, _) = registry();
        let extra = 5;
        for i in 0..(defaults::HISTORY_MAX_ENTRIES + extra) {
            registry
                .add_to_history("u1", &history_entry(&format!("t{i}"), i as i64))
                .await;
        }
        let history = registry.get_user_history("u1", 200).await.unwrap();
        assert_eq!(history.len(), defaults::HISTORY_MAX_ENTRIES);
        // the oldest entries were trimmed
        assert_eq!(
            history.last().unwrap().task_id,
            format!("t{extra}")
        );
    }

    #[tokio::test]
    async fn empty_history_is_empty() {
        let (registry, _) = registry();
        assert!(registry.get_user_history("u1", 10).await.unwrap().is_empty());
    }
}
