//! OpenAI-compatible chat-completions providers.
//!
//! Groq and Mistral expose the same wire shape, so both are thin
//! configurations of one [`ChatProvider`]. The prompt asks the model to
//! enclose its answer in `[[ ]]`; [`extract_summary`] pulls that span out
//! of whatever chatter surrounds it.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use cardmill_core::traits::Summarizer;
use cardmill_core::{defaults, Error, Result, Settings};

/// Provider names accepted by [`build_summarizer`].
pub const ALLOWED_PROVIDERS: &[&str] = &["groq", "mistral"];

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: String,
}

fn summary_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // (?s) so summaries spanning lines still match; non-greedy takes the
    // first bracketed span only
    RE.get_or_init(|| Regex::new(r"(?s)\[\[(.*?)\]\]").expect("summary pattern is valid"))
}

/// Extract the `[[ ]]`-delimited summary from raw model output.
pub fn extract_summary(raw: &str) -> Option<String> {
    summary_re()
        .captures(raw)
        .map(|caps| caps[1].trim().to_string())
}

/// A summarizer backed by an OpenAI-compatible chat-completions endpoint.
#[derive(Debug)]
pub struct ChatProvider {
    name: &'static str,
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl ChatProvider {
    fn new(name: &'static str, base_url: &str, api_key: &str, model: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(defaults::SUMMARIZE_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            name,
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
        })
    }

    /// Groq with its default endpoint and model.
    pub fn groq(api_key: &str) -> Result<Self> {
        Self::new("groq", defaults::GROQ_URL, api_key, defaults::GROQ_MODEL)
    }

    /// Mistral with its default endpoint and model.
    pub fn mistral(api_key: &str) -> Result<Self> {
        Self::new("mistral", defaults::MISTRAL_URL, api_key, defaults::MISTRAL_MODEL)
    }

    /// Override the model slug.
    pub fn with_model(mut self, model: &str) -> Self {
        self.model = model.to_string();
        self
    }
}

#[async_trait]
impl Summarizer for ChatProvider {
    fn name(&self) -> &str {
        self.name
    }

    async fn summarize(&self, prompt: &str) -> Result<String> {
        let body = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
        };

        debug!(provider = self.name, model = %self.model, "Dispatching summarizer call");
        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(Error::Summarizer(format!(
                "{} returned {status}: {detail}",
                self.name
            )));
        }

        let parsed: ChatResponse = response.json().await?;
        let content = parsed
            .choices
            .first()
            .map(|c| c.message.content.as_str())
            .unwrap_or_default();

        extract_summary(content).ok_or_else(|| {
            Error::Summarizer(format!("{} reply contained no [[ ]] summary", self.name))
        })
    }
}

/// Build a summarizer provider by name.
///
/// Unknown names and missing API keys are configuration errors; the
/// caller surfaces them before any task is created.
pub fn build_summarizer(name: &str, settings: &Settings) -> Result<Arc<dyn Summarizer>> {
    match name.to_ascii_lowercase().as_str() {
        "groq" => {
            let key = settings
                .groq_api_key
                .as_deref()
                .ok_or_else(|| Error::Config("GROQ_API_KEY is not set".to_string()))?;
            Ok(Arc::new(ChatProvider::groq(key)?))
        }
        "mistral" => {
            let key = settings
                .mistral_api_key
                .as_deref()
                .ok_or_else(|| Error::Config("MISTRAL_API_KEY is not set".to_string()))?;
            Ok(Arc::new(ChatProvider::mistral(key)?))
        }
        other => Err(Error::Config(format!(
            "unknown summarizer provider: {other} (allowed: {})",
            ALLOWED_PROVIDERS.join(", ")
        ))),
    }
}
