//! # cardmill-tasks
//!
//! Task orchestration: the progress broadcaster, the task registry, the
//! flashcard pipeline, and the [`GenerationService`] tying them to the
//! content source, summarization gate, and export sinks.
//!
//! The service is the composition root: callers start a generation and
//! get a task id back; the run itself happens on a spawned task that
//! reports progress through the registry, which persists each snapshot
//! and broadcasts it to at most one subscriber per task.

pub mod broadcaster;
pub mod pipeline;
pub mod registry;
pub mod service;

pub use broadcaster::ProgressBroadcaster;
pub use pipeline::FlashcardPipeline;
pub use registry::TaskRegistry;
pub use service::GenerationService;
