//! CSV export sink.
//!
//! Cards are appended as `front,back` rows with no header, quoted as
//! needed, so a crashed run still leaves every card saved so far on
//! disk. A per-sink async mutex serializes file access; concurrent tasks
//! writing to the same path must share the sink instance.

use std::collections::HashSet;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use cardmill_core::models::Flashcard;
use cardmill_core::traits::ExportSink;
use cardmill_core::{Error, Result};

/// Append-only CSV [`ExportSink`].
pub struct CsvSink {
    path: PathBuf,
    file_lock: Mutex<()>,
}

impl CsvSink {
    /// Create a sink writing to `path`, creating parent directories.
    pub fn new(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(Self {
            path,
            file_lock: Mutex::new(()),
        })
    }

    fn read_all(&self) -> Result<Vec<Flashcard>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_path(&self.path)
            .map_err(|e| Error::Storage(e.to_string()))?;
        let mut cards = Vec::new();
        for row in reader.records() {
            let row = row.map_err(|e| Error::Storage(e.to_string()))?;
            let front = row.get(0).unwrap_or_default();
            let back = row.get(1).unwrap_or_default();
            if front.is_empty() {
                continue;
            }
            cards.push(Flashcard {
                front: front.to_string(),
                back: back.to_string(),
                url: None,
            });
        }
        Ok(cards)
    }
}

#[async_trait]
impl ExportSink for CsvSink {
    async fn save(&self, card: &Flashcard) -> Result<()> {
        let _guard = self.file_lock.lock().await;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        writer
            .write_record([card.front.as_str(), card.back.as_str()])
            .map_err(|e| Error::Storage(e.to_string()))?;
        writer.flush()?;
        debug!(path = %self.path.display(), front = %card.front, "Appended CSV row");
        Ok(())
    }

    async fn existing_fronts(&self) -> Result<HashSet<String>> {
        let _guard = self.file_lock.lock().await;
        Ok(self.read_all()?.into_iter().map(|c| c.front).collect())
    }

    /// Oldest first, matching file order.
    async fn list(&self, limit: usize) -> Result<Vec<Flashcard>> {
        let _guard = self.file_lock.lock().await;
        let mut cards = self.read_all()?;
        cards.truncate(limit);
        Ok(cards)
    }

    /// Rows are flushed per save, so there is nothing to finalize.
    async fn cleanup(&self) -> Result<()> {
        Ok(())
    }

    fn destination(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sink_in(dir: &tempfile::TempDir) -> CsvSink {
        CsvSink::new(dir.path().join("deck.csv")).unwrap()
    }

    #[tokio::test]
    async fn appends_rows_in_save_order() {
        let dir = tempfile::tempdir().unwrap();
        let sink = sink_in(&dir);

        let mut card = Flashcard::new("Q1", "A1", Some("u1")).unwrap();
        card.append_link("u1");
        sink.save(&card).await.unwrap();
        sink.save(&Flashcard::new("Q2", "A2", None).unwrap())
            .await
            .unwrap();

        let cards = sink.list(10).await.unwrap();
        assert_eq!(cards.len(), 2);
        assert_eq!(cards[0].front, "Q1");
        assert_eq!(cards[0].back, "A1\n URL: <a href=\"u1\">Link</a>");
        assert_eq!(cards[1].front, "Q2");
    }

    #[tokio::test]
    async fn quoting_survives_commas_and_newlines() {
        let dir = tempfile::tempdir().unwrap();
        let sink = sink_in(&dir);

        let card = Flashcard::new("a, b, and c", "line one\nline two", None).unwrap();
        sink.save(&card).await.unwrap();

        let cards = sink.list(10).await.unwrap();
        assert_eq!(cards[0].front, "a, b, and c");
        assert_eq!(cards[0].back, "line one\nline two");
    }

    #[tokio::test]
    async fn existing_fronts_reflects_prior_runs() {
        let dir = tempfile::tempdir().unwrap();
        {
            let sink = sink_in(&dir);
            sink.save(&Flashcard::new("Q1", "A1", None).unwrap())
                .await
                .unwrap();
        }
        // a fresh sink over the same file sees the earlier row
        let sink = sink_in(&dir);
        let fronts = sink.existing_fronts().await.unwrap();
        assert!(fronts.contains("Q1"));
        assert_eq!(fronts.len(), 1);
    }

    #[tokio::test]
    async fn empty_file_yields_no_cards() {
        let dir = tempfile::tempdir().unwrap();
        let sink = sink_in(&dir);
        assert!(sink.existing_fronts().await.unwrap().is_empty());
        assert!(sink.list(5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn list_respects_limit() {
        let dir = tempfile::tempdir().unwrap();
        let sink = sink_in(&dir);
        for i in 0..7 {
            sink.save(&Flashcard::new(&format!("Q{i}"), "A", None).unwrap())
                .await
                .unwrap();
        }
        let cards = sink.list(3).await.unwrap();
        assert_eq!(cards.len(), 3);
        assert_eq!(cards[0].front, "Q0");
    }
}
