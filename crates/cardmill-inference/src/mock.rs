//! Mock summarizer for tests.
//!
//! Records every prompt it receives and can be scripted to fail a fixed
//! number of times or unconditionally, so retry and give-up paths can be
//! exercised without a network.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use cardmill_core::traits::Summarizer;
use cardmill_core::{Error, Result};

#[derive(Debug, Default)]
struct MockState {
    calls: Vec<String>,
    fail_remaining: u32,
    always_fail: bool,
    responses: Vec<(String, String)>,
    default_response: String,
}

/// Scriptable [`Summarizer`] double. Clones share state, so a clone kept
/// by the test observes calls made through the clone handed to the gate.
#[derive(Clone, Debug)]
pub struct MockSummarizer {
    state: Arc<Mutex<MockState>>,
}

impl MockSummarizer {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState {
                default_response: "mock summary".to_string(),
                ..MockState::default()
            })),
        }
    }

    /// Reply with `response` when the prompt contains `needle`.
    pub fn with_response(self, needle: &str, response: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .responses
            .push((needle.to_string(), response.to_string()));
        self
    }

    /// Reply used when no scripted response matches.
    pub fn with_default_response(self, response: &str) -> Self {
        self.state.lock().unwrap().default_response = response.to_string();
        self
    }

    /// Fail the next `n` calls, then recover.
    pub fn failing_times(self, n: u32) -> Self {
        self.state.lock().unwrap().fail_remaining = n;
        self
    }

    /// Fail every call.
    pub fn always_failing(self) -> Self {
        self.state.lock().unwrap().always_fail = true;
        self
    }

    pub fn call_count(&self) -> usize {
        self.state.lock().unwrap().calls.len()
    }

    /// Prompts received so far, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }
}

impl Default for MockSummarizer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Summarizer for MockSummarizer {
    fn name(&self) -> &str {
        "mock"
    }

    async fn summarize(&self, prompt: &str) -> Result<String> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(prompt.to_string());
        if state.always_fail {
            return Err(Error::Summarizer("mock failure".to_string()));
        }
        if state.fail_remaining > 0 {
            state.fail_remaining -= 1;
            return Err(Error::Summarizer("mock transient failure".to_string()));
        }
        for (needle, response) in &state.responses {
            if prompt.contains(needle) {
                return Ok(response.clone());
            }
        }
        Ok(state.default_response.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn records_calls_and_matches_responses() {
        let mock = MockSummarizer::new()
            .with_response("photosynthesis", "plants make sugar")
            .with_default_response("generic");

        assert_eq!(
            mock.summarize("explain photosynthesis").await.unwrap(),
            "plants make sugar"
        );
        assert_eq!(mock.summarize("anything else").await.unwrap(), "generic");
        assert_eq!(mock.call_count(), 2);
        assert_eq!(mock.calls()[0], "explain photosynthesis");
    }

    #[tokio::test]
    async fn fails_scripted_number_of_times() {
        let mock = MockSummarizer::new().failing_times(2);
        assert!(mock.summarize("a").await.is_err());
        assert!(mock.summarize("a").await.is_err());
        assert!(mock.summarize("a").await.is_ok());
    }

    #[tokio::test]
    async fn clones_share_state() {
        let mock = MockSummarizer::new();
        let handle = mock.clone();
        mock.summarize("x").await.unwrap();
        assert_eq!(handle.call_count(), 1);
    }
}
