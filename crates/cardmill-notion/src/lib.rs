//! # cardmill-notion
//!
//! Notion content source.
//!
//! [`NotionSource`] fetches a page over the Notion REST API and flattens
//! its headings and bullet items into the flat record list the pipeline
//! consumes. [`StaticSource`] is an in-memory double for tests and
//! offline runs.

pub mod source;
pub mod static_source;

pub use source::NotionSource;
pub use static_source::StaticSource;
