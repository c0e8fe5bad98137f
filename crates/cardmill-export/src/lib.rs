//! # cardmill-export
//!
//! Export sinks turning generated flashcards into deliverable files.
//!
//! Two sinks implement the [`ExportSink`] contract: [`CsvSink`] appends
//! rows to a plain CSV file as cards arrive, and [`AnkiSink`] collects
//! cards in memory and packages them into an `.apkg` deck on cleanup.
//! The [`build_sink`] factory picks the sink from the requested format
//! and derives the destination path from the output stem.

pub mod anki_sink;
mod apkg;
pub mod csv_sink;

use std::path::PathBuf;
use std::sync::Arc;

use cardmill_core::models::ExportFormat;
use cardmill_core::traits::ExportSink;
use cardmill_core::Result;

pub use anki_sink::AnkiSink;
pub use apkg::{DECK_ID, MODEL_ID};
pub use csv_sink::CsvSink;

/// Build the sink for a requested format.
///
/// The destination is `<output_dir>/<stem>.<ext>` with the extension
/// chosen by the format.
pub fn build_sink(
    format: ExportFormat,
    output_dir: &str,
    stem: &str,
) -> Result<Arc<dyn ExportSink>> {
    let path = PathBuf::from(output_dir).join(format!("{stem}.{}", format.extension()));
    Ok(match format {
        ExportFormat::Csv => Arc::new(CsvSink::new(path)?),
        ExportFormat::Anki => Arc::new(AnkiSink::new(path)?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn factory_derives_destination_from_stem() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().to_str().unwrap();

        let csv = build_sink(ExportFormat::Csv, out, "biology").unwrap();
        assert!(csv.destination().ends_with("biology.csv"));

        let anki = build_sink(ExportFormat::Anki, out, "biology").unwrap();
        assert!(anki.destination().ends_with("biology.apkg"));
    }
}
