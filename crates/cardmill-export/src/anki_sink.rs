//! Anki export sink.
//!
//! Cards accumulate in memory and the `.apkg` package is written once,
//! during `cleanup`. A crash before cleanup therefore loses the deck
//! file; the CSV sink is the durable-by-default option.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::info;

use cardmill_core::models::Flashcard;
use cardmill_core::traits::ExportSink;
use cardmill_core::{Error, Result};

use crate::apkg;

/// In-memory [`ExportSink`] packaging a deck on cleanup.
pub struct AnkiSink {
    path: PathBuf,
    deck_name: String,
    cards: Mutex<Vec<Flashcard>>,
}

impl AnkiSink {
    /// Create a sink packaging to `path`, creating parent directories.
    /// The deck is named after the file stem.
    pub fn new(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let deck_name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .map(str::to_string)
            .ok_or_else(|| Error::InvalidInput(format!("bad deck path: {}", path.display())))?;
        Ok(Self {
            path,
            deck_name,
            cards: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl ExportSink for AnkiSink {
    async fn save(&self, card: &Flashcard) -> Result<()> {
        self.cards.lock().await.push(card.clone());
        Ok(())
    }

    async fn existing_fronts(&self) -> Result<HashSet<String>> {
        let cards = self.cards.lock().await;
        Ok(cards.iter().map(|c| c.front.clone()).collect())
    }

    /// Most recent first.
    async fn list(&self, limit: usize) -> Result<Vec<Flashcard>> {
        let cards = self.cards.lock().await;
        Ok(cards.iter().rev().take(limit).cloned().collect())
    }

    /// Write the `.apkg` package. Idempotent; a second call rewrites the
    /// same file from the same cards.
    async fn cleanup(&self) -> Result<()> {
        let cards = self.cards.lock().await;
        apkg::write_package(&self.path, &self.deck_name, &cards)?;
        info!(
            path = %self.path.display(),
            cards = cards.len(),
            "Anki package written"
        );
        Ok(())
    }

    fn destination(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn saves_are_buffered_until_cleanup() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("biology.apkg");
        let sink = AnkiSink::new(&path).unwrap();

        sink.save(&Flashcard::new("Q1", "A1", None).unwrap())
            .await
            .unwrap();
        assert!(!path.exists());

        sink.cleanup().await.unwrap();
        assert!(path.exists());
    }

    #[tokio::test]
    async fn list_is_most_recent_first() {
        let dir = tempfile::tempdir().unwrap();
        let sink = AnkiSink::new(dir.path().join("d.apkg")).unwrap();
        for i in 0..4 {
            sink.save(&Flashcard::new(&format!("Q{i}"), "A", None).unwrap())
                .await
                .unwrap();
        }
        let cards = sink.list(2).await.unwrap();
        assert_eq!(cards[0].front, "Q3");
        assert_eq!(cards[1].front, "Q2");
    }

    #[tokio::test]
    async fn existing_fronts_tracks_buffered_cards() {
        let dir = tempfile::tempdir().unwrap();
        let sink = AnkiSink::new(dir.path().join("d.apkg")).unwrap();
        sink.save(&Flashcard::new("Q1", "A1", None).unwrap())
            .await
            .unwrap();
        let fronts = sink.existing_fronts().await.unwrap();
        assert!(fronts.contains("Q1"));
    }

    #[tokio::test]
    async fn deck_name_comes_from_file_stem() {
        let dir = tempfile::tempdir().unwrap();
        let sink = AnkiSink::new(dir.path().join("organic-chem.apkg")).unwrap();
        assert_eq!(sink.deck_name, "organic-chem");
    }
}
