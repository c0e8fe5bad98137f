//! Ephemeral progress fan-out.
//!
//! At most one subscriber per task id. Connecting again for the same
//! task replaces the previous subscriber; delivery is fire-and-forget
//! with no replay, and a subscriber whose channel is gone is dropped on
//! the next send. Sending for a task nobody watches is a silent no-op.

use std::collections::HashMap;
use std::sync::Mutex;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use cardmill_core::models::ProgressEvent;

const CHANNEL_CAPACITY: usize = 64;

#[derive(Default)]
pub struct ProgressBroadcaster {
    channels: Mutex<HashMap<String, mpsc::Sender<ProgressEvent>>>,
}

impl ProgressBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to a task's progress, replacing any prior subscriber.
    pub fn connect(&self, task_id: &str) -> mpsc::Receiver<ProgressEvent> {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        if self
            .channels
            .lock()
            .unwrap()
            .insert(task_id.to_string(), tx)
            .is_some()
        {
            debug!(task_id, "Replaced existing progress subscriber");
        }
        rx
    }

    pub fn disconnect(&self, task_id: &str) {
        self.channels.lock().unwrap().remove(task_id);
    }

    /// Best-effort delivery. A send that fails (receiver dropped or
    /// hopelessly behind) removes the subscriber.
    pub fn send_progress(&self, task_id: &str, event: ProgressEvent) {
        let sender = self.channels.lock().unwrap().get(task_id).cloned();
        let Some(sender) = sender else {
            return;
        };
        if sender.try_send(event).is_err() {
            warn!(task_id, "Dropping unreachable progress subscriber");
            self.disconnect(task_id);
        }
    }

    #[cfg(test)]
    fn subscriber_count(&self) -> usize {
        self.channels.lock().unwrap().len()
    }
}
