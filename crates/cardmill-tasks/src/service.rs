//! Generation service: the composition root.
//!
//! Owns the store, registry, broadcaster, and content source, and turns
//! a [`GenerationRequest`] into a spawned pipeline run. Provider and
//! sink construction happen before the task record exists, so bad
//! requests fail fast instead of producing a failed task.

use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use tokio::sync::mpsc;
use tracing::{error, info};
use uuid::Uuid;

use cardmill_core::models::{
    GenerationRequest, HistoryEntry, ProgressEvent, TaskRecord, TaskStatus,
};
use cardmill_core::traits::{ContentSource, ExportSink};
use cardmill_core::{defaults, Result, Settings};
use cardmill_export::build_sink;
use cardmill_inference::{build_summarizer, GateConfig, SummaryGate};
use cardmill_notion::NotionSource;
use cardmill_store::{build_store, TaskStore};

use crate::broadcaster::ProgressBroadcaster;
use crate::pipeline::FlashcardPipeline;
use crate::registry::TaskRegistry;

pub struct GenerationService {
    settings: Settings,
    registry: Arc<TaskRegistry>,
    broadcaster: Arc<ProgressBroadcaster>,
    source: Arc<dyn ContentSource>,
}

impl GenerationService {
    /// Build the service from settings: configured store backend plus
    /// the Notion content source.
    pub async fn new(settings: Settings) -> Result<Self> {
        let store = build_store(&settings).await?;
        let source: Arc<dyn ContentSource> = Arc::new(NotionSource::new(
            settings.notion_api_key.as_deref().unwrap_or_default(),
        )?);
        Ok(Self::with_parts(settings, store, source))
    }

    /// Assemble from explicit collaborators (used by tests and embedders).
    pub fn with_parts(
        settings: Settings,
        store: Arc<dyn TaskStore>,
        source: Arc<dyn ContentSource>,
    ) -> Self {
        let broadcaster = Arc::new(ProgressBroadcaster::new());
        let registry = Arc::new(TaskRegistry::new(store, broadcaster.clone()));
        Self {
            settings,
            registry,
            broadcaster,
            source,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Create the task record and spawn the generation run. Returns the
    /// task id to poll or subscribe with.
    pub async fn start_generation(
        &self,
        user_id: &str,
        request: GenerationRequest,
    ) -> Result<String> {
        let summarizer = match &request.provider {
            Some(name) => Some(build_summarizer(name, &self.settings)?),
            None => None,
        };
        let gate = SummaryGate::new(summarizer, &GateConfig::from_settings(&self.settings));
        let sink = build_sink(
            request.export_format,
            &self.settings.output_dir,
            &request.output_stem,
        )?;

        let task_id = format!("task_{}", Uuid::new_v4());
        self.registry
            .create_task(
                user_id,
                &task_id,
                json!({
                    "status": TaskStatus::Created,
                    "output_file": sink.destination().display().to_string(),
                    "request": &request,
                }),
            )
            .await?;
        info!(task_id = %task_id, user_id, page = %request.page_reference, "Generation task created");

        let registry = self.registry.clone();
        let source = self.source.clone();
        let user_id = user_id.to_string();
        let spawned_task_id = task_id.clone();
        tokio::spawn(async move {
            run_generation(registry, source, sink, gate, user_id, spawned_task_id, request).await;
        });

        Ok(task_id)
    }

    pub async fn get_task_status(&self, user_id: &str, task_id: &str) -> Result<TaskRecord> {
        self.registry.get_task_status(user_id, task_id).await
    }

    pub async fn get_user_history(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<HistoryEntry>> {
        self.registry.get_user_history(user_id, limit).await
    }

    /// Subscribe to a task's progress events, replacing any prior
    /// subscriber for that task.
    pub fn subscribe(&self, task_id: &str) -> mpsc::Receiver<ProgressEvent> {
        self.broadcaster.connect(task_id)
    }

    pub fn unsubscribe(&self, task_id: &str) {
        self.broadcaster.disconnect(task_id)
    }
}

/// Drive one generation run to completion; any error marks the task
/// failed with the error text as its message.
async fn run_generation(
    registry: Arc<TaskRegistry>,
    source: Arc<dyn ContentSource>,
    sink: Arc<dyn ExportSink>,
    gate: SummaryGate,
    user_id: String,
    task_id: String,
    request: GenerationRequest,
) {
    if let Err(e) = drive(
        &registry, &source, &sink, gate, &user_id, &task_id, &request,
    )
    .await
    {
        error!(task_id = %task_id, error = %e, "Generation task failed");
        if let Err(update_err) = registry
            .update_task_progress(&user_id, &task_id, 0, TaskStatus::Failed, &e.to_string())
            .await
        {
            error!(task_id = %task_id, error = %update_err, "Failed to record task failure");
        }
    }
}

async fn drive(
    registry: &Arc<TaskRegistry>,
    source: &Arc<dyn ContentSource>,
    sink: &Arc<dyn ExportSink>,
    gate: SummaryGate,
    user_id: &str,
    task_id: &str,
    request: &GenerationRequest,
) -> Result<()> {
    registry
        .update_task_progress(
            user_id,
            task_id,
            0,
            TaskStatus::Starting,
            "Initializing components...",
        )
        .await?;
    registry
        .update_task_progress(
            user_id,
            task_id,
            20,
            TaskStatus::Processing,
            "Fetching Notion content...",
        )
        .await?;
    let records = source.fetch(&request.page_reference).await?;

    registry
        .update_task_progress(
            user_id,
            task_id,
            20,
            TaskStatus::Processing,
            "Creating flashcards...",
        )
        .await?;
    let pipeline = FlashcardPipeline::new(sink.clone(), gate).with_progress(
        registry.clone(),
        user_id,
        task_id,
    );
    // cleanup runs even when the pipeline fails; the run error wins
    let run_outcome = pipeline.run(&records).await;
    let cleanup_outcome = sink.cleanup().await;
    if let Err(e) = &cleanup_outcome {
        error!(task_id = %task_id, error = %e, "Sink cleanup failed");
    }
    let (message, status) = run_outcome?;
    cleanup_outcome?;

    registry
        .add_to_history(
            user_id,
            &HistoryEntry {
                task_id: task_id.to_string(),
                page_reference: request.page_reference.clone(),
                status,
                message,
                timestamp: Utc::now(),
            },
        )
        .await;
    Ok(())
}

/// Default preview page size for saved cards.
pub const PREVIEW_LIMIT: usize = defaults::SINK_PREVIEW_LIMIT;
