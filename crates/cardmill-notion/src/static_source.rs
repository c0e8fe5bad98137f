//! In-memory content source for tests and offline runs.

use async_trait::async_trait;

use cardmill_core::models::SourceRecord;
use cardmill_core::traits::ContentSource;
use cardmill_core::{Error, Result};

/// A [`ContentSource`] serving canned records, optionally scripted to
/// fail so fetch-failure paths can be exercised.
#[derive(Default, Clone)]
pub struct StaticSource {
    records: Vec<SourceRecord>,
    fail_with: Option<String>,
}

impl StaticSource {
    pub fn new(records: Vec<SourceRecord>) -> Self {
        Self {
            records,
            fail_with: None,
        }
    }

    /// A source that fails every fetch with a content-source error.
    pub fn failing(message: &str) -> Self {
        Self {
            records: Vec::new(),
            fail_with: Some(message.to_string()),
        }
    }
}

#[async_trait]
impl ContentSource for StaticSource {
    async fn fetch(&self, _reference: &str) -> Result<Vec<SourceRecord>> {
        match &self.fail_with {
            Some(message) => Err(Error::ContentSource(message.clone())),
            None => Ok(self.records.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn serves_canned_records() {
        let source = StaticSource::new(vec![SourceRecord::new("f", "b", "u")]);
        let records = source.fetch("any").await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].front, "f");
    }

    #[tokio::test]
    async fn failing_source_errors() {
        let source = StaticSource::failing("page unreachable");
        assert!(source.fetch("any").await.is_err());
    }
}
