//! Environment-driven configuration.

use crate::defaults;
use crate::error::{Error, Result};

/// Task store backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageKind {
    /// Process-local map with a background expiry sweep.
    Memory,
    /// Networked redis store; TTL delegated to the backend.
    Redis,
}

impl std::str::FromStr for StorageKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "redis" => Ok(Self::Redis),
            other => Err(Error::Config(format!(
                "unknown storage backend: {other} (allowed: memory, redis)"
            ))),
        }
    }
}

/// Runtime settings, read once at startup.
#[derive(Debug, Clone)]
pub struct Settings {
    /// API key for the Notion content source.
    pub notion_api_key: Option<String>,
    /// API key for the Groq summarizer provider.
    pub groq_api_key: Option<String>,
    /// API key for the Mistral summarizer provider.
    pub mistral_api_key: Option<String>,
    /// Maximum attempts per summarizer dispatch.
    pub max_retries: u32,
    /// Rate limit: max summarizer calls per period.
    pub rate_limit_calls: u32,
    /// Rate limit: period in seconds.
    pub rate_limit_period_secs: u64,
    /// Maximum entries in the summary cache.
    pub cache_maxsize: usize,
    /// TTL for summary cache entries in seconds.
    pub cache_expiry_secs: u64,
    /// Task store backend.
    pub storage: StorageKind,
    /// Redis connection URL (used when `storage` is `Redis`).
    pub redis_url: String,
    /// Directory for generated decks.
    pub output_dir: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            notion_api_key: None,
            groq_api_key: None,
            mistral_api_key: None,
            max_retries: defaults::MAX_RETRIES,
            rate_limit_calls: defaults::RATE_LIMIT_CALLS,
            rate_limit_period_secs: defaults::RATE_LIMIT_PERIOD_SECS,
            cache_maxsize: defaults::CACHE_MAXSIZE,
            cache_expiry_secs: defaults::CACHE_EXPIRY_SECS,
            storage: StorageKind::Memory,
            redis_url: defaults::REDIS_URL.to_string(),
            output_dir: defaults::OUTPUT_DIR.to_string(),
        }
    }
}

impl Settings {
    /// Create settings from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `NOTION_API_KEY` | unset | Notion integration token |
    /// | `GROQ_API_KEY` | unset | Groq provider key |
    /// | `MISTRAL_API_KEY` | unset | Mistral provider key |
    /// | `CARDMILL_MAX_RETRIES` | `3` | Attempts per summarizer dispatch |
    /// | `CARDMILL_RATE_LIMIT_CALLS` | `5` | Calls allowed per period |
    /// | `CARDMILL_RATE_LIMIT_PERIOD` | `60` | Rate limit period (seconds) |
    /// | `CARDMILL_CACHE_MAXSIZE` | `100` | Summary cache capacity |
    /// | `CARDMILL_CACHE_EXPIRY` | `3600` | Summary cache TTL (seconds) |
    /// | `CARDMILL_STORAGE` | `memory` | `memory` or `redis` |
    /// | `REDIS_URL` | `redis://localhost:6379` | Redis connection URL |
    /// | `CARDMILL_OUTPUT_DIR` | `output` | Deck output directory |
    pub fn from_env() -> Self {
        let storage = std::env::var("CARDMILL_STORAGE")
            .ok()
            .and_then(|v| v.parse::<StorageKind>().ok())
            .unwrap_or(StorageKind::Memory);

        Self {
            notion_api_key: api_key_from_env("NOTION_API_KEY"),
            groq_api_key: api_key_from_env("GROQ_API_KEY"),
            mistral_api_key: api_key_from_env("MISTRAL_API_KEY"),
            max_retries: env_parse("CARDMILL_MAX_RETRIES", defaults::MAX_RETRIES),
            rate_limit_calls: env_parse("CARDMILL_RATE_LIMIT_CALLS", defaults::RATE_LIMIT_CALLS),
            rate_limit_period_secs: env_parse(
                "CARDMILL_RATE_LIMIT_PERIOD",
                defaults::RATE_LIMIT_PERIOD_SECS,
            ),
            cache_maxsize: env_parse("CARDMILL_CACHE_MAXSIZE", defaults::CACHE_MAXSIZE),
            cache_expiry_secs: env_parse("CARDMILL_CACHE_EXPIRY", defaults::CACHE_EXPIRY_SECS),
            storage,
            redis_url: std::env::var("REDIS_URL")
                .unwrap_or_else(|_| defaults::REDIS_URL.to_string()),
            output_dir: std::env::var("CARDMILL_OUTPUT_DIR")
                .unwrap_or_else(|_| defaults::OUTPUT_DIR.to_string()),
        }
    }
}

/// Read an API key, treating blank or implausibly short values as unset.
fn api_key_from_env(var: &str) -> Option<String> {
    match std::env::var(var) {
        Ok(v) if v.trim().len() >= 10 => Some(v),
        Ok(v) if !v.trim().is_empty() => {
            tracing::warn!(var, "API key looks too short, ignoring");
            None
        }
        _ => None,
    }
}

fn env_parse<T: std::str::FromStr>(var: &str, default: T) -> T {
    std::env::var(var)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}
