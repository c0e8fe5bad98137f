//! # cardmill-inference
//!
//! Summarizer providers and the summarization gate.
//!
//! Providers speak the OpenAI-compatible chat-completions dialect and are
//! selected by name through [`build_summarizer`]. The pipeline never talks
//! to a provider directly: it goes through the [`SummaryGate`], which
//! layers a bounded TTL cache, a call-rate throttle, and a bounded retry
//! loop around whichever provider is configured.

pub mod gate;
pub mod mock;
pub mod providers;

pub use gate::{GateConfig, SummaryGate};
pub use mock::MockSummarizer;
pub use providers::{build_summarizer, extract_summary, ChatProvider, ALLOWED_PROVIDERS};
