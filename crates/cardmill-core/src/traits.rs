//! Collaborator traits consumed by the pipeline core.
//!
//! These are the seams to the thin, replaceable outer layers: the content
//! source, the summarizer providers, and the export sinks. The pipeline
//! only ever sees these contracts.

use std::collections::HashSet;
use std::path::Path;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{Flashcard, SourceRecord};

/// A content source returning a flat ordered list of records.
///
/// Any failure here is fatal to the whole task, not per-item.
#[async_trait]
pub trait ContentSource: Send + Sync {
    /// Fetch and flatten the referenced document.
    async fn fetch(&self, reference: &str) -> Result<Vec<SourceRecord>>;
}

/// An opaque summarization capability.
#[async_trait]
pub trait Summarizer: std::fmt::Debug + Send + Sync {
    /// Provider name used in logs and error messages.
    fn name(&self) -> &str;

    /// Summarize the fully rendered prompt. May fail; the gate treats
    /// every failure as retryable up to its configured limit.
    async fn summarize(&self, prompt: &str) -> Result<String>;
}

#[async_trait]
impl<T: Summarizer + ?Sized> Summarizer for std::sync::Arc<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    async fn summarize(&self, prompt: &str) -> Result<String> {
        (**self).summarize(prompt).await
    }
}

/// Append-only persistence for generated flashcards.
#[async_trait]
pub trait ExportSink: Send + Sync {
    /// Append one card.
    async fn save(&self, card: &Flashcard) -> Result<()>;

    /// Front texts already present in the export, used for dedup.
    async fn existing_fronts(&self) -> Result<HashSet<String>>;

    /// Preview saved cards. Ordering is per-sink (CSV: oldest first,
    /// Anki: most recent first) and documented on each implementation.
    async fn list(&self, limit: usize) -> Result<Vec<Flashcard>>;

    /// Release resources, e.g. finalize a packaged deck file.
    async fn cleanup(&self) -> Result<()>;

    /// Destination path of the export.
    fn destination(&self) -> &Path;
}
