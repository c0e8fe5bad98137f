//! Process-local task store.
//!
//! Keys live in a plain map guarded by a mutex; a background task sweeps
//! expired keys at a fixed interval, and reads also drop expired keys
//! lazily so the sweep cadence is never observable through `get`.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use tokio::time::Instant;
use tracing::{debug, trace};

use cardmill_core::{defaults, Result};

use crate::TaskStore;

#[derive(Default)]
struct State {
    data: HashMap<String, JsonValue>,
    zsets: HashMap<String, HashMap<String, f64>>,
    /// Expiry deadlines, shared by plain keys and sorted sets.
    expiry: HashMap<String, Instant>,
}

impl State {
    fn drop_if_expired(&mut self, key: &str, now: Instant) {
        if let Some(deadline) = self.expiry.get(key) {
            if *deadline <= now {
                self.data.remove(key);
                self.zsets.remove(key);
                self.expiry.remove(key);
            }
        }
    }

    fn sweep(&mut self, now: Instant) -> usize {
        let expired: Vec<String> = self
            .expiry
            .iter()
            .filter(|(_, deadline)| **deadline <= now)
            .map(|(k, _)| k.clone())
            .collect();
        for key in &expired {
            self.data.remove(key);
            self.zsets.remove(key);
            self.expiry.remove(key);
        }
        expired.len()
    }
}

/// In-process [`TaskStore`] implementation.
///
/// Must be constructed inside a tokio runtime; `new` spawns the expiry
/// sweep task, which is aborted when the store is dropped.
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
    sweeper: tokio::task::JoinHandle<()>,
}

impl MemoryStore {
    /// Create a new store and start its expiry sweep.
    pub fn new() -> Self {
        let state = Arc::new(Mutex::new(State::default()));
        let sweep_state = state.clone();
        let sweeper = tokio::spawn(async move {
            let interval = Duration::from_millis(defaults::STORE_SWEEP_INTERVAL_MS);
            loop {
                tokio::time::sleep(interval).await;
                let removed = sweep_state.lock().unwrap().sweep(Instant::now());
                if removed > 0 {
                    trace!(removed, "Swept expired keys");
                }
            }
        });
        debug!("Memory task store initialized");
        Self { state, sweeper }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for MemoryStore {
    fn drop(&mut self) {
        self.sweeper.abort();
    }
}

/// Resolve an inclusive `(start, end)` index pair with redis semantics:
/// negative indices count from the end, out-of-range bounds are clamped,
/// and an inverted range is empty.
fn resolve_range(len: usize, start: i64, end: i64) -> Option<(usize, usize)> {
    if len == 0 {
        return None;
    }
    let len = len as i64;
    let s = if start < 0 { len + start } else { start }.max(0);
    let e = if end < 0 { len + end } else { end }.min(len - 1);
    if s >= len || e < 0 || s > e {
        return None;
    }
    Some((s as usize, e as usize))
}

/// Members of a sorted set ordered by ascending `(score, member)`.
fn ranked(members: &HashMap<String, f64>) -> Vec<(String, f64)> {
    let mut items: Vec<(String, f64)> = members
        .iter()
        .map(|(m, s)| (m.clone(), *s))
        .collect();
    items.sort_by(|a, b| {
        a.1.partial_cmp(&b.1)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });
    items
}

#[async_trait]
impl TaskStore for MemoryStore {
    async fn set(&self, key: &str, value: JsonValue, expiry_secs: Option<u64>) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.data.insert(key.to_string(), value);
        match expiry_secs {
            Some(secs) => {
                state
                    .expiry
                    .insert(key.to_string(), Instant::now() + Duration::from_secs(secs));
            }
            None => {
                state.expiry.remove(key);
            }
        }
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<JsonValue>> {
        let mut state = self.state.lock().unwrap();
        state.drop_if_expired(key, Instant::now());
        Ok(state.data.get(key).cloned())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.data.remove(key);
        state.zsets.remove(key);
        state.expiry.remove(key);
        Ok(())
    }

    async fn zadd(&self, key: &str, members: &[(String, f64)]) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.drop_if_expired(key, Instant::now());
        let set = state.zsets.entry(key.to_string()).or_default();
        for (member, score) in members {
            set.insert(member.clone(), *score);
        }
        Ok(())
    }

    async fn zrevrange(&self, key: &str, start: i64, end: i64) -> Result<Vec<String>> {
        let mut state = self.state.lock().unwrap();
        state.drop_if_expired(key, Instant::now());
        let Some(set) = state.zsets.get(key) else {
            return Ok(Vec::new());
        };
        let mut items = ranked(set);
        items.reverse();
        Ok(match resolve_range(items.len(), start, end) {
            Some((s, e)) => items[s..=e].iter().map(|(m, _)| m.clone()).collect(),
            None => Vec::new(),
        })
    }

    async fn zremrangebyrank(&self, key: &str, start: i64, end: i64) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.drop_if_expired(key, Instant::now());
        let Some(set) = state.zsets.get_mut(key) else {
            return Ok(());
        };
        let items = ranked(set);
        if let Some((s, e)) = resolve_range(items.len(), start, end) {
            for (member, _) in &items[s..=e] {
                set.remove(member);
            }
        }
        Ok(())
    }

    async fn expire(&self, key: &str, secs: u64) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.data.contains_key(key) || state.zsets.contains_key(key) {
            state
                .expiry
                .insert(key.to_string(), Instant::now() + Duration::from_secs(secs));
        }
        Ok(())
    }
}
