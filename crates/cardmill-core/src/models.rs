//! Core data models for cardmill.
//!
//! These types are shared across all cardmill crates and represent the
//! domain entities: flashcards, source records, task records, history
//! entries, and progress events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use crate::error::{Error, Result};

// =============================================================================
// TASK TYPES
// =============================================================================

/// Lifecycle states of a task record.
///
/// `created → starting → processing → {completed | completed_with_errors | failed}`.
/// `processing` (and the non-terminal `warning`) may be visited many times,
/// once per record or batch. The store does not reject updates after a
/// terminal state; callers simply stop issuing them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Created,
    Starting,
    Processing,
    /// Per-item recoverable failure was absorbed; the run continues.
    Warning,
    Completed,
    CompletedWithErrors,
    Failed,
}

impl TaskStatus {
    /// Whether this status ends the task lifecycle.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::CompletedWithErrors | Self::Failed
        )
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Starting => write!(f, "starting"),
            Self::Processing => write!(f, "processing"),
            Self::Warning => write!(f, "warning"),
            Self::Completed => write!(f, "completed"),
            Self::CompletedWithErrors => write!(f, "completed_with_errors"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

fn default_status() -> TaskStatus {
    TaskStatus::Created
}

/// Snapshot of a tracked generation task, keyed by `(user_id, task_id)`.
///
/// Stored as a JSON object so progress updates can merge onto existing
/// fields instead of replacing the record wholesale; unknown fields
/// (the request echo, output location) are carried in `details`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRecord {
    #[serde(default = "default_status")]
    pub status: TaskStatus,
    #[serde(default)]
    pub progress: i32,
    #[serde(default)]
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub user_id: String,
    #[serde(flatten)]
    pub details: Map<String, JsonValue>,
}

/// Immutable entry in a user's bounded generation history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub task_id: String,
    pub page_reference: String,
    pub status: TaskStatus,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// Ephemeral progress event mirroring a task record snapshot.
///
/// Broadcast at most once per record update; delivery is best-effort and
/// never queued for later.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub progress: i32,
    pub status: TaskStatus,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

// =============================================================================
// FLASHCARD TYPES
// =============================================================================

/// One flat record produced by a content source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRecord {
    pub front: String,
    pub back: String,
    pub url: String,
}

impl SourceRecord {
    pub fn new(
        front: impl Into<String>,
        back: impl Into<String>,
        url: impl Into<String>,
    ) -> Self {
        Self {
            front: front.into(),
            back: back.into(),
            url: url.into(),
        }
    }
}

/// A flashcard ready for export.
///
/// Both sides are trimmed on construction and must be non-empty; the back
/// is rewritten once with the summary, then a link suffix is appended,
/// after which the card is handed to the sink and never mutated again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flashcard {
    pub front: String,
    pub back: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl Flashcard {
    /// Create a flashcard, trimming whitespace on both sides.
    ///
    /// Fails with [`Error::InvalidInput`] if either side is empty after
    /// trimming.
    pub fn new(front: &str, back: &str, url: Option<&str>) -> Result<Self> {
        let front = front.trim();
        let back = back.trim();
        if front.is_empty() || back.is_empty() {
            return Err(Error::InvalidInput(
                "flashcard must have both front and back content".to_string(),
            ));
        }
        Ok(Self {
            front: front.to_string(),
            back: back.to_string(),
            url: url.map(String::from),
        })
    }

    /// Replace the back text with a generated summary.
    pub fn set_back(&mut self, summary: impl Into<String>) {
        self.back = summary.into();
    }

    /// Append the trailing source-link line to the back.
    ///
    /// Format: a line containing the URL wrapped in an HTML anchor, so
    /// deck viewers render a clickable link back to the source block.
    pub fn append_link(&mut self, url: &str) {
        self.back.push_str(&format!("\n URL: <a href=\"{}\">Link</a>", url));
    }
}

// =============================================================================
// EXPORT TYPES
// =============================================================================

/// Supported export formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportFormat {
    Csv,
    Anki,
}

impl ExportFormat {
    /// File extension appended to the requested output stem.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Anki => "apkg",
        }
    }
}

impl std::str::FromStr for ExportFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "csv" => Ok(Self::Csv),
            "anki" => Ok(Self::Anki),
            other => Err(Error::Config(format!(
                "unsupported export format: {other} (allowed: csv, anki)"
            ))),
        }
    }
}

impl std::fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Csv => write!(f, "csv"),
            Self::Anki => write!(f, "anki"),
        }
    }
}

// =============================================================================
// REQUEST TYPES
// =============================================================================

/// A flashcard generation request, echoed into the task record's details.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// Source page reference (Notion page id).
    pub page_reference: String,
    /// Output path stem; the sink factory appends the format extension.
    pub output_stem: String,
    #[serde(default = "default_format")]
    pub export_format: ExportFormat,
    /// Summarizer provider name; `None` runs without summarization.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
}

fn default_format() -> ExportFormat {
    ExportFormat::Csv
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flashcard_trims_whitespace() {
        let card = Flashcard::new("  What is Rust?  ", " A language \n", None).unwrap();
        assert_eq!(card.front, "What is Rust?");
        assert_eq!(card.back, "A language");
    }

    #[test]
    fn flashcard_rejects_empty_front() {
        assert!(Flashcard::new("   ", "back", None).is_err());
    }

    #[test]
    fn flashcard_rejects_empty_back() {
        assert!(Flashcard::new("front", "\n\t", None).is_err());
    }

    #[test]
    fn flashcard_link_suffix_format() {
        let mut card = Flashcard::new("Q1", "A1", Some("u1")).unwrap();
        card.append_link("u1");
        assert_eq!(card.back, "A1\n URL: <a href=\"u1\">Link</a>");
    }

    #[test]
    fn task_status_terminal_states() {
        assert!(TaskStatus::Completed.is_terminal());
        assert!(TaskStatus::CompletedWithErrors.is_terminal());
        assert!(TaskStatus::Failed.is_terminal());
        assert!(!TaskStatus::Processing.is_terminal());
        assert!(!TaskStatus::Warning.is_terminal());
        assert!(!TaskStatus::Created.is_terminal());
    }

    #[test]
    fn task_status_serializes_snake_case() {
        let json = serde_json::to_string(&TaskStatus::CompletedWithErrors).unwrap();
        assert_eq!(json, "\"completed_with_errors\"");
    }

    #[test]
    fn task_record_roundtrip_preserves_details() {
        let json = serde_json::json!({
            "status": "processing",
            "progress": 40,
            "message": "Created flashcard (2/5)",
            "timestamp": "2026-01-02T03:04:05Z",
            "user_id": "u-1",
            "request": {"page_reference": "p-1"},
            "output_file": "output/deck.csv"
        });
        let record: TaskRecord = serde_json::from_value(json).unwrap();
        assert_eq!(record.status, TaskStatus::Processing);
        assert_eq!(record.progress, 40);
        assert!(record.details.contains_key("request"));
        assert!(record.details.contains_key("output_file"));

        let back = serde_json::to_value(&record).unwrap();
        assert_eq!(back["output_file"], "output/deck.csv");
    }

    #[test]
    fn export_format_from_str() {
        assert_eq!("csv".parse::<ExportFormat>().unwrap(), ExportFormat::Csv);
        assert_eq!("ANKI".parse::<ExportFormat>().unwrap(), ExportFormat::Anki);
        assert!("pdf".parse::<ExportFormat>().is_err());
    }

    #[test]
    fn export_format_extension() {
        assert_eq!(ExportFormat::Csv.extension(), "csv");
        assert_eq!(ExportFormat::Anki.extension(), "apkg");
    }
}
