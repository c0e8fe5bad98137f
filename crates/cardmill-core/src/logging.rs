//! Structured logging schema and subscriber initialization for cardmill.
//!
//! All crates use these constants for consistent structured logging fields
//! so log aggregation tools can query by standardized names across every
//! subsystem.
//!
//! ## Log Level Contract
//!
//! | Level | Usage |
//! |-------|-------|
//! | ERROR | Degraded service, requires operator attention |
//! | WARN  | Recoverable issue, automatic fallback applied |
//! | INFO  | Lifecycle events, operation completions |
//! | DEBUG | Decision points, intermediate values, config choices |
//! | TRACE | Per-item iteration, high-volume data |

// ─── Identity fields ───────────────────────────────────────────────────────

/// Subsystem originating the log event.
/// Values: "store", "inference", "export", "notion", "tasks"
pub const SUBSYSTEM: &str = "subsystem";

/// Logical operation name.
/// Examples: "create_task", "update_progress", "summarize", "save"
pub const OPERATION: &str = "op";

// ─── Entity fields ─────────────────────────────────────────────────────────

/// Task id being tracked.
pub const TASK_ID: &str = "task_id";

/// User owning the task or history log.
pub const USER_ID: &str = "user_id";

/// Summarizer provider name.
pub const PROVIDER: &str = "provider";

/// Source page reference being processed.
pub const PAGE_REF: &str = "page_ref";

// ─── Measurement fields ────────────────────────────────────────────────────

/// Wall-clock duration in milliseconds.
pub const DURATION_MS: &str = "duration_ms";

/// Items processed so far in a pipeline run.
pub const PROCESSED: &str = "processed";

/// Items skipped so far in a pipeline run.
pub const SKIPPED: &str = "skipped";

// ─── Outcome fields ────────────────────────────────────────────────────────

/// Error message when an operation fails.
pub const ERROR_MSG: &str = "error";

/// Initialize the tracing subscriber for binaries and integration tests.
///
/// Honors `RUST_LOG`; defaults to `cardmill=debug` otherwise. Safe to call
/// more than once (subsequent calls are no-ops).
pub fn init() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "cardmill=debug".into());

    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .try_init();
}
