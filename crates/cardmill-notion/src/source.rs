//! Notion REST client and block flattening.
//!
//! A page is flattened into one record per heading or bulleted list
//! item: the block text becomes the front, the concatenated text of its
//! children (if any) becomes the back, and the record URL is the page
//! URL plus a `#<blockid>` fragment so a card links straight back to
//! its block.

use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use serde_json::Value as JsonValue;
use tracing::{debug, warn};

use cardmill_core::models::SourceRecord;
use cardmill_core::traits::ContentSource;
use cardmill_core::{defaults, Error, Result};

/// Block types flattened into records.
const RECORD_TYPES: &[&str] = &[
    "heading_1",
    "heading_2",
    "heading_3",
    "bulleted_list_item",
];

/// Block types whose text contributes to a parent's back side.
const NESTED_TYPES: &[&str] = &[
    "paragraph",
    "bulleted_list_item",
    "heading_1",
    "heading_2",
    "heading_3",
];

fn page_id_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[a-f0-9]{32}").expect("page id pattern is valid"))
}

/// Accept either a bare page id or a notion.so URL containing one.
fn extract_page_id(reference: &str) -> String {
    if reference.starts_with("https://www.notion.so/") || reference.starts_with("https://notion.so/")
    {
        if let Some(m) = page_id_re().find(reference) {
            return m.as_str().to_string();
        }
    }
    reference.to_string()
}

/// First text run of a block's payload. Current blocks carry `rich_text`;
/// `text` is kept as a fallback for older payload shapes.
fn block_text(payload: &JsonValue) -> Option<String> {
    for field in ["rich_text", "text"] {
        if let Some(run) = payload.get(field).and_then(|r| r.get(0)) {
            if let Some(content) = run
                .get("text")
                .and_then(|t| t.get("content"))
                .and_then(|c| c.as_str())
            {
                return Some(content.to_string());
            }
            if let Some(plain) = run.get("plain_text").and_then(|p| p.as_str()) {
                return Some(plain.to_string());
            }
        }
    }
    None
}

/// Concatenated text of child blocks, one line per supported child.
fn nested_text(children: &[JsonValue]) -> String {
    let mut lines = Vec::new();
    for child in children {
        let Some(kind) = child.get("type").and_then(|t| t.as_str()) else {
            continue;
        };
        if !NESTED_TYPES.contains(&kind) {
            continue;
        }
        if let Some(text) = child.get(kind).and_then(block_text) {
            lines.push(text);
        }
    }
    lines.join("\n")
}

/// Flatten one top-level block into a record, if it is a supported type.
fn flatten_block(block: &JsonValue, page_url: &str, children: &[JsonValue]) -> Option<SourceRecord> {
    let kind = block.get("type").and_then(|t| t.as_str())?;
    if !RECORD_TYPES.contains(&kind) {
        return None;
    }
    let front = block.get(kind).and_then(block_text)?;
    let block_id = block.get("id").and_then(|i| i.as_str())?.replace('-', "");
    let nested = nested_text(children);
    let back = if nested.is_empty() {
        front.clone()
    } else {
        nested
    };
    Some(SourceRecord::new(front, back, format!("{page_url}#{block_id}")))
}

/// Notion-backed [`ContentSource`].
pub struct NotionSource {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl NotionSource {
    pub fn new(api_key: &str) -> Result<Self> {
        Self::with_base_url(api_key, defaults::NOTION_URL)
    }

    /// Point the client at a different endpoint (used by tests).
    pub fn with_base_url(api_key: &str, base_url: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(defaults::FETCH_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }

    async fn get_json(&self, path: &str) -> Result<JsonValue> {
        let response = self
            .client
            .get(format!("{}{path}", self.base_url))
            .bearer_auth(&self.api_key)
            .header("Notion-Version", defaults::NOTION_VERSION)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(match status.as_u16() {
                404 => Error::NotFound(format!("Notion object: {detail}")),
                401 | 403 => Error::Unauthorized(format!("Notion rejected the request: {detail}")),
                _ => Error::ContentSource(format!("Notion returned {status}: {detail}")),
            });
        }
        Ok(response.json().await?)
    }

    async fn page_url(&self, page_id: &str) -> Result<String> {
        let page = self.get_json(&format!("/pages/{page_id}")).await?;
        Ok(page
            .get("url")
            .and_then(|u| u.as_str())
            .unwrap_or_default()
            .to_string())
    }

    /// All children of a block, following `next_cursor` pagination.
    async fn block_children(&self, block_id: &str) -> Result<Vec<JsonValue>> {
        let mut blocks = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let path = match &cursor {
                Some(c) => format!("/blocks/{block_id}/children?page_size=100&start_cursor={c}"),
                None => format!("/blocks/{block_id}/children?page_size=100"),
            };
            let page = self.get_json(&path).await?;
            if let Some(results) = page.get("results").and_then(|r| r.as_array()) {
                blocks.extend(results.iter().cloned());
            }
            let has_more = page.get("has_more").and_then(|h| h.as_bool()).unwrap_or(false);
            cursor = page
                .get("next_cursor")
                .and_then(|c| c.as_str())
                .map(str::to_string);
            if !has_more || cursor.is_none() {
                return Ok(blocks);
            }
        }
    }
}

#[async_trait]
impl ContentSource for NotionSource {
    async fn fetch(&self, reference: &str) -> Result<Vec<SourceRecord>> {
        let page_id = extract_page_id(reference);
        let page_url = self.page_url(&page_id).await?;
        let blocks = self.block_children(&page_id).await?;
        debug!(page_id = %page_id, blocks = blocks.len(), "Fetched Notion page");

        let mut records = Vec::new();
        for block in &blocks {
            let has_children = block
                .get("has_children")
                .and_then(|h| h.as_bool())
                .unwrap_or(false);
            let children = if has_children {
                match block.get("id").and_then(|i| i.as_str()) {
                    Some(id) => self.block_children(id).await?,
                    None => Vec::new(),
                }
            } else {
                Vec::new()
            };
            if let Some(record) = flatten_block(block, &page_url, &children) {
                records.push(record);
            }
        }
        if records.is_empty() {
            warn!(page_id = %page_id, "Page contained no flattenable blocks");
        }
        Ok(records)
    }
}
