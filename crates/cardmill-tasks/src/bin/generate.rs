//! One-shot flashcard generation from the command line.
//!
//! ```text
//! cardmill-generate <page-id-or-url> [output-stem] [csv|anki] [provider]
//! ```
//!
//! Reads configuration from the environment (and a `.env` file if
//! present), runs a single generation, and streams progress to stdout.

use anyhow::{Context, Result};

use cardmill_core::models::{ExportFormat, GenerationRequest, TaskStatus};
use cardmill_core::traits::ExportSink;
use cardmill_core::{logging, Settings};
use cardmill_export::CsvSink;
use cardmill_tasks::service::PREVIEW_LIMIT;
use cardmill_tasks::GenerationService;

const USAGE: &str = "usage: cardmill-generate <page-id-or-url> [output-stem] [csv|anki] [provider]";

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    logging::init();

    let mut args = std::env::args().skip(1);
    let page_reference = args.next().context(USAGE)?;
    let output_stem = args.next().unwrap_or_else(|| "flashcards".to_string());
    let export_format: ExportFormat = args.next().as_deref().unwrap_or("csv").parse()?;
    let provider = args.next();

    let settings = Settings::from_env();
    let service = GenerationService::new(settings).await?;

    let request = GenerationRequest {
        page_reference,
        output_stem,
        export_format,
        provider,
    };
    let task_id = service.start_generation("cli", request).await?;
    let mut events = service.subscribe(&task_id);

    while let Some(event) = events.recv().await {
        println!("[{:>3}%] {}: {}", event.progress, event.status, event.message);
        if event.status.is_terminal() {
            break;
        }
    }

    let record = service.get_task_status("cli", &task_id).await?;
    println!("{}", record.message);
    if let Some(output) = record.details.get("output_file").and_then(|v| v.as_str()) {
        println!("Deck written to {output}");
        if export_format == ExportFormat::Csv && record.status != TaskStatus::Failed {
            let sink = CsvSink::new(output)?;
            for card in sink.list(PREVIEW_LIMIT).await? {
                println!("  {} -> {}", card.front, card.back.replace('\n', " "));
            }
        }
    }
    Ok(())
}
