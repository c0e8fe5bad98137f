//! Flashcard pipeline: the per-record generation loop.
//!
//! Records flow through dedupe, validation, summarization, link
//! suffixing, and the export sink. A failing record is counted and
//! absorbed; only empty input, a store failure while reporting
//! progress, or a broken sink abort the run. Each item ends with a
//! short cooperative pause so progress delivery is never starved.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use cardmill_core::models::{Flashcard, SourceRecord, TaskStatus};
use cardmill_core::traits::ExportSink;
use cardmill_core::{defaults, Error, Result};
use cardmill_inference::SummaryGate;

use crate::registry::TaskRegistry;

/// A record front must be non-trivial, bounded, and not a degraded
/// provider sentinel.
fn valid_front(text: &str) -> bool {
    let trimmed = text.trim();
    if trimmed.is_empty() || trimmed == defaults::SUMMARY_UNAVAILABLE || trimmed == "None" {
        return false;
    }
    (defaults::FRONT_MIN_LEN..=defaults::FRONT_MAX_LEN).contains(&trimmed.len())
}

fn scaled_progress(processed: usize, total: usize) -> i32 {
    ((processed as f64 / total as f64) * 100.0) as i32
}

fn classify(total: usize, skipped: usize) -> (TaskStatus, String) {
    if skipped == total {
        (
            TaskStatus::Failed,
            "All flashcards failed to generate".to_string(),
        )
    } else if skipped > 0 {
        (
            TaskStatus::CompletedWithErrors,
            format!(
                "Flashcard generation completed with {} successful and {} failed",
                total - skipped,
                skipped
            ),
        )
    } else {
        (
            TaskStatus::Completed,
            format!("Flashcard generation completed successfully for all {total} flashcards"),
        )
    }
}

/// What happened to one record.
enum RecordOutcome {
    Saved,
    /// The front already exists in the sink or earlier in this run.
    Duplicate,
    /// The record failed content validation.
    Invalid,
}

/// Progress reporting target for a pipeline run.
struct ProgressTarget {
    registry: Arc<TaskRegistry>,
    user_id: String,
    task_id: String,
}

pub struct FlashcardPipeline {
    sink: Arc<dyn ExportSink>,
    gate: SummaryGate,
    progress: Option<ProgressTarget>,
}

impl FlashcardPipeline {
    pub fn new(sink: Arc<dyn ExportSink>, gate: SummaryGate) -> Self {
        Self {
            sink,
            gate,
            progress: None,
        }
    }

    /// Report progress through the registry while running.
    pub fn with_progress(
        mut self,
        registry: Arc<TaskRegistry>,
        user_id: &str,
        task_id: &str,
    ) -> Self {
        self.progress = Some(ProgressTarget {
            registry,
            user_id: user_id.to_string(),
            task_id: task_id.to_string(),
        });
        self
    }

    async fn report(&self, progress: i32, status: TaskStatus, message: &str) -> Result<()> {
        if let Some(target) = &self.progress {
            target
                .registry
                .update_task_progress(&target.user_id, &target.task_id, progress, status, message)
                .await?;
        }
        Ok(())
    }

    /// Process one record into the sink. A skip outcome is counted by
    /// the run loop; `Err` is a per-item failure the run loop absorbs.
    async fn process_record(
        &self,
        record: &SourceRecord,
        seen: &mut HashSet<String>,
    ) -> Result<RecordOutcome> {
        let Ok(mut card) = Flashcard::new(&record.front, &record.back, Some(&record.url)) else {
            warn!(front = %record.front, "Skipping flashcard with empty content");
            return Ok(RecordOutcome::Invalid);
        };
        if seen.contains(&card.front) {
            debug!(front = %card.front, "Skipping duplicate flashcard");
            return Ok(RecordOutcome::Duplicate);
        }
        if !valid_front(&card.front) {
            warn!(front = %card.front, "Skipping invalid flashcard");
            return Ok(RecordOutcome::Invalid);
        }

        match self.gate.summarize(&card.back).await {
            Some(summary) => card.set_back(summary),
            None => {
                return Err(Error::Summarizer(
                    "failed to generate summary".to_string(),
                ))
            }
        }
        card.append_link(&record.url);
        self.sink.save(&card).await?;
        seen.insert(card.front.clone());
        Ok(RecordOutcome::Saved)
    }

    /// Run the loop over every record and return the final message and
    /// status. Empty input fails before any progress is reported.
    pub async fn run(&self, records: &[SourceRecord]) -> Result<(String, TaskStatus)> {
        if records.is_empty() {
            return Err(Error::InvalidInput("no content provided".to_string()));
        }

        let total = records.len();
        let mut processed = 0usize;
        let mut skipped = 0usize;
        let mut seen = self.sink.existing_fronts().await?;
        info!(total, "Starting flashcard generation");

        for record in records {
            processed += 1;
            match self.process_record(record, &mut seen).await {
                Ok(RecordOutcome::Saved) => {
                    self.report(
                        scaled_progress(processed, total),
                        TaskStatus::Processing,
                        &format!("Created flashcard ({processed}/{total})"),
                    )
                    .await?;
                }
                Ok(RecordOutcome::Duplicate) => {
                    skipped += 1;
                    self.report(
                        scaled_progress(processed, total),
                        TaskStatus::Processing,
                        &format!("Skipped existing flashcard ({processed}/{total})"),
                    )
                    .await?;
                }
                Ok(RecordOutcome::Invalid) => {
                    skipped += 1;
                }
                Err(e) => {
                    skipped += 1;
                    error!(error = %e, front = %record.front, "Error processing flashcard");
                    self.report(
                        scaled_progress(processed, total),
                        TaskStatus::Warning,
                        &format!("Error with flashcard ({processed}/{total}): {e}"),
                    )
                    .await?;
                }
            }
            tokio::time::sleep(Duration::from_millis(defaults::ITEM_PAUSE_MS)).await;
        }

        let (status, message) = classify(total, skipped);
        self.report(100, status, &message).await?;
        info!(
            processed,
            skipped,
            status = %status,
            "Flashcard generation finished"
        );
        Ok((message, status))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cardmill_export::CsvSink;
    use cardmill_inference::{GateConfig, MockSummarizer, SummaryGate};

    fn record(front: &str, back: &str) -> SourceRecord {
        SourceRecord::new(front, back, format!("https://notion.so/p#{front}"))
    }

    fn csv_pipeline(dir: &tempfile::TempDir, gate: SummaryGate) -> (FlashcardPipeline, Arc<CsvSink>) {
        let sink = Arc::new(CsvSink::new(dir.path().join("deck.csv")).unwrap());
        (FlashcardPipeline::new(sink.clone(), gate), sink)
    }

    fn mock_gate(mock: &MockSummarizer) -> SummaryGate {
        let config = GateConfig {
            rate_limit_period_secs: 0,
            ..GateConfig::default()
        };
        SummaryGate::new(Some(Arc::new(mock.clone())), &config)
    }

    #[tokio::test]
    async fn empty_input_fails_before_any_work() {
        let dir = tempfile::tempdir().unwrap();
        let (pipeline, sink) = csv_pipeline(&dir, SummaryGate::passthrough());
        let err = pipeline.run(&[]).await.unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
        assert!(sink.list(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn passthrough_run_completes_all_records() {
        let dir = tempfile::tempdir().unwrap();
        let (pipeline, sink) = csv_pipeline(&dir, SummaryGate::passthrough());

        let records = vec![record("What is DNA?", "Genetic material"), record("What is RNA?", "Messenger")];
        let (message, status) = pipeline.run(&records).await.unwrap();

        assert_eq!(status, TaskStatus::Completed);
        assert_eq!(
            message,
            "Flashcard generation completed successfully for all 2 flashcards"
        );
        let cards = sink.list(10).await.unwrap();
        assert_eq!(cards.len(), 2);
        assert_eq!(
            cards[0].back,
            "Genetic material\n URL: <a href=\"https://notion.so/p#What is DNA?\">Link</a>"
        );
    }

    #[tokio::test]
    async fn summaries_replace_the_back_side() {
        let dir = tempfile::tempdir().unwrap();
        let mock = MockSummarizer::new().with_default_response("short summary");
        let (pipeline, sink) = csv_pipeline(&dir, mock_gate(&mock));

        pipeline.run(&[record("Front text", "Long back text")]).await.unwrap();

        let cards = sink.list(10).await.unwrap();
        assert!(cards[0].back.starts_with("short summary\n URL:"));
        assert_eq!(mock.call_count(), 1);
    }

    #[tokio::test]
    async fn duplicates_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let (pipeline, sink) = csv_pipeline(&dir, SummaryGate::passthrough());

        let records = vec![record("Same front", "first"), record("Same front", "second"), record("Other", "third")];
        let (message, status) = pipeline.run(&records).await.unwrap();

        assert_eq!(status, TaskStatus::CompletedWithErrors);
        assert_eq!(
            message,
            "Flashcard generation completed with 2 successful and 1 failed"
        );
        assert_eq!(sink.list(10).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn duplicate_skips_emit_progress_updates() {
        use crate::broadcaster::ProgressBroadcaster;
        use crate::registry::TaskRegistry;
        use cardmill_store::MemoryStore;

        let dir = tempfile::tempdir().unwrap();
        let broadcaster = Arc::new(ProgressBroadcaster::new());
        let registry = Arc::new(TaskRegistry::new(
            Arc::new(MemoryStore::new()),
            broadcaster.clone(),
        ));
        let mut events = broadcaster.connect("t1");

        let (pipeline, _) = csv_pipeline(&dir, SummaryGate::passthrough());
        let pipeline = pipeline.with_progress(registry, "u1", "t1");
        pipeline
            .run(&[record("Same front", "first"), record("Same front", "second")])
            .await
            .unwrap();

        let mut messages = Vec::new();
        while let Ok(event) = events.try_recv() {
            messages.push(event.message);
        }
        assert!(messages.contains(&"Created flashcard (1/2)".to_string()));
        assert!(messages.contains(&"Skipped existing flashcard (2/2)".to_string()));
    }

    #[tokio::test]
    async fn prior_run_contents_count_as_duplicates() {
        let dir = tempfile::tempdir().unwrap();
        {
            let (pipeline, _) = csv_pipeline(&dir, SummaryGate::passthrough());
            pipeline.run(&[record("Repeat", "back")]).await.unwrap();
        }
        let (pipeline, sink) = csv_pipeline(&dir, SummaryGate::passthrough());
        let (_, status) = pipeline.run(&[record("Repeat", "back")]).await.unwrap();
        assert_eq!(status, TaskStatus::Failed);
        assert_eq!(sink.list(10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn invalid_fronts_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let (pipeline, sink) = csv_pipeline(&dir, SummaryGate::passthrough());

        let long_front = "x".repeat(501);
        let records = vec![
            record("ab", "too short"),
            record(&long_front, "too long"),
            record("None", "sentinel"),
            record("Summary unavailable", "sentinel"),
            record("Valid front", "kept"),
        ];
        let (message, status) = pipeline.run(&records).await.unwrap();

        assert_eq!(status, TaskStatus::CompletedWithErrors);
        assert!(message.contains("1 successful and 4 failed"));
        assert_eq!(sink.list(10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn all_records_failing_fails_the_run() {
        let dir = tempfile::tempdir().unwrap();
        let mock = MockSummarizer::new().always_failing();
        let config = GateConfig {
            max_retries: 1,
            rate_limit_period_secs: 0,
            ..GateConfig::default()
        };
        let gate = SummaryGate::new(Some(Arc::new(mock.clone())), &config);
        let (pipeline, sink) = csv_pipeline(&dir, gate);

        let (message, status) = pipeline.run(&[record("Front one", "b"), record("Front two", "b")]).await.unwrap();
        assert_eq!(status, TaskStatus::Failed);
        assert_eq!(message, "All flashcards failed to generate");
        assert!(sink.list(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn summarizer_failure_only_skips_that_record() {
        let dir = tempfile::tempdir().unwrap();
        let mock = MockSummarizer::new().failing_times(3);
        let config = GateConfig {
            max_retries: 1,
            rate_limit_period_secs: 0,
            ..GateConfig::default()
        };
        let gate = SummaryGate::new(Some(Arc::new(mock.clone())), &config);
        let (pipeline, sink) = csv_pipeline(&dir, gate);

        // three failing dispatches burn the first three records
        let records = vec![
            record("Front one", "a"),
            record("Front two", "b"),
            record("Front three", "c"),
            record("Front four", "d"),
        ];
        let (_, status) = pipeline.run(&records).await.unwrap();
        assert_eq!(status, TaskStatus::CompletedWithErrors);
        let cards = sink.list(10).await.unwrap();
        assert_eq!(cards.len(), 1);
        assert_eq!(cards[0].front, "Front four");
    }

    #[test]
    fn progress_scaling_truncates() {
        assert_eq!(scaled_progress(1, 3), 33);
        assert_eq!(scaled_progress(2, 3), 66);
        assert_eq!(scaled_progress(3, 3), 100);
    }

    #[test]
    fn front_validation_rules() {
        assert!(valid_front("abc"));
        assert!(valid_front(&"x".repeat(500)));
        assert!(!valid_front("ab"));
        assert!(!valid_front(&"x".repeat(501)));
        assert!(!valid_front("  "));
        assert!(!valid_front("None"));
        assert!(!valid_front("Summary unavailable"));
    }
}
