//! # cardmill-core
//!
//! Core types, traits, and configuration for the cardmill flashcard
//! generation service.
//!
//! This crate provides the foundational data structures and trait
//! definitions that other cardmill crates depend on: the error taxonomy,
//! domain models, collaborator seams (content source, summarizer, export
//! sink), environment-driven settings, and the structured-logging schema.

pub mod config;
pub mod defaults;
pub mod error;
pub mod logging;
pub mod models;
pub mod traits;

// Re-export commonly used types at crate root
pub use config::{Settings, StorageKind};
pub use error::{Error, Result};
pub use models::{
    ExportFormat, Flashcard, GenerationRequest, HistoryEntry, ProgressEvent, SourceRecord,
    TaskRecord, TaskStatus,
};
pub use traits::{ContentSource, ExportSink, Summarizer};
