//! Centralized default constants for cardmill.
//!
//! **This module is the single source of truth** for shared default values.
//! All crates should reference these constants instead of defining their
//! own magic numbers.

// =============================================================================
// TASK TRACKING
// =============================================================================

/// TTL for a task record, refreshed on every write (24 hours).
pub const TASK_TTL_SECS: u64 = 86_400;

/// TTL for a per-user history log, refreshed on every append (30 days).
pub const HISTORY_TTL_SECS: u64 = 2_592_000;

/// Maximum history entries retained per user.
pub const HISTORY_MAX_ENTRIES: usize = 100;

/// Default page size for history queries.
pub const HISTORY_PAGE_LIMIT: usize = 50;

// =============================================================================
// TASK STORE
// =============================================================================

/// Interval between expired-key sweeps in the in-process store.
pub const STORE_SWEEP_INTERVAL_MS: u64 = 1_000;

/// Default redis connection URL.
pub const REDIS_URL: &str = "redis://localhost:6379";

// =============================================================================
// SUMMARIZATION
// =============================================================================

/// Maximum attempts per summarizer dispatch.
pub const MAX_RETRIES: u32 = 3;

/// Base delay for exponential retry backoff (seconds).
pub const RETRY_BASE_SECS: u64 = 4;

/// Cap on a single retry backoff delay (seconds).
pub const RETRY_CAP_SECS: u64 = 10;

/// Rate limit: max summarizer calls per period.
pub const RATE_LIMIT_CALLS: u32 = 5;

/// Rate limit: period in seconds.
pub const RATE_LIMIT_PERIOD_SECS: u64 = 60;

/// Maximum entries in the summary cache.
pub const CACHE_MAXSIZE: usize = 100;

/// TTL for summary cache entries (seconds).
pub const CACHE_EXPIRY_SECS: u64 = 3_600;

/// Prompt prefix sent to every summarizer provider. The provider is asked
/// to enclose the summary in `[[ ]]` so it can be extracted from chatter.
pub const PROMPT_PREFIX: &str = "Summarize the following text for the back of a flashcard. \
Provide only the summary, enclosed in [[ ]]: \n";

/// Sentinel returned by providers that degraded instead of failing.
/// Cards carrying this text are rejected by validation.
pub const SUMMARY_UNAVAILABLE: &str = "Summary unavailable";

// =============================================================================
// PROVIDERS
// =============================================================================

/// Default Groq API endpoint.
pub const GROQ_URL: &str = "https://api.groq.com/openai/v1";

/// Default Groq model slug.
pub const GROQ_MODEL: &str = "llama-3.1-8b-instant";

/// Default Mistral API endpoint.
pub const MISTRAL_URL: &str = "https://api.mistral.ai/v1";

/// Default Mistral model slug.
pub const MISTRAL_MODEL: &str = "mistral-large-latest";

/// Default timeout for summarizer requests (seconds).
pub const SUMMARIZE_TIMEOUT_SECS: u64 = 60;

// =============================================================================
// CONTENT SOURCE
// =============================================================================

/// Notion REST API base URL.
pub const NOTION_URL: &str = "https://api.notion.com/v1";

/// Notion API version header value.
pub const NOTION_VERSION: &str = "2022-06-28";

/// Default timeout for content-source requests (seconds).
pub const FETCH_TIMEOUT_SECS: u64 = 30;

// =============================================================================
// PIPELINE
// =============================================================================

/// Minimum trimmed front length accepted by validation.
pub const FRONT_MIN_LEN: usize = 3;

/// Maximum trimmed front length accepted by validation.
pub const FRONT_MAX_LEN: usize = 500;

/// Cooperative pause between items so progress delivery is never starved.
pub const ITEM_PAUSE_MS: u64 = 100;

// =============================================================================
// EXPORT
// =============================================================================

/// Default output directory for generated decks.
pub const OUTPUT_DIR: &str = "output";

/// Default page size for sink previews.
pub const SINK_PREVIEW_LIMIT: usize = 5;
