//! Account-summary code block on a Notion page.
//!
//! The target is the first `code` block following a `heading_2` whose text
//! matches the configured heading (trimmed, case-insensitive) and preceding
//! the next `heading_2`. Its content is overwritten on every publish.

use async_trait::async_trait;
use bks_reconcile::{DocumentPublisher, StoreError};
use reqwest::Method;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::client::{plain_text, NotionClient};
use crate::properties::text_runs;

const BLOCK_PAGE_SIZE: u32 = 100;

#[derive(Debug, Clone)]
pub struct NotionSummaryBlock {
    client: NotionClient,
    page_id: String,
    heading: String,
}

#[derive(Debug, Deserialize)]
struct ChildrenResponse {
    #[serde(default)]
    results: Vec<Value>,
    #[serde(default)]
    has_more: bool,
    next_cursor: Option<String>,
}

impl NotionSummaryBlock {
    pub fn new(client: NotionClient, page_id: String, heading: String) -> Self {
        Self {
            client,
            page_id,
            heading,
        }
    }

    /// Every top-level block of the page, following pagination.
    async fn page_blocks(&self) -> Result<Vec<Value>, StoreError> {
        let path = format!("blocks/{}/children", self.page_id);
        let mut blocks = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let mut query = vec![("page_size", BLOCK_PAGE_SIZE.to_string())];
            if let Some(c) = &cursor {
                query.push(("start_cursor", c.clone()));
            }
            let resp: ChildrenResponse = self.client.get(&path, &query).await?;
            blocks.extend(resp.results);

            match (resp.has_more, resp.next_cursor) {
                (true, Some(next)) if cursor.as_deref() != Some(next.as_str()) => {
                    cursor = Some(next)
                }
                (true, _) => {
                    return Err(StoreError::Decode(
                        "notion block listing did not advance".to_string(),
                    ))
                }
                (false, _) => break,
            }
        }
        debug!(page = %self.page_id, blocks = blocks.len(), "notion page blocks read");
        Ok(blocks)
    }
}

/// Id of the code block under `heading`, if any.
pub fn find_code_block_after_heading(blocks: &[Value], heading: &str) -> Option<String> {
    let needle = heading.trim().to_lowercase();
    let mut under_heading = false;

    for block in blocks {
        match block.get("type").and_then(Value::as_str) {
            Some("heading_2") => {
                let runs = block
                    .pointer("/heading_2/rich_text")
                    .and_then(Value::as_array)
                    .map(Vec::as_slice)
                    .unwrap_or(&[]);
                under_heading = plain_text(runs).trim().to_lowercase() == needle;
            }
            Some("code") if under_heading => {
                return block.get("id").and_then(Value::as_str).map(str::to_string);
            }
            _ => {}
        }
    }
    None
}

#[async_trait]
impl DocumentPublisher for NotionSummaryBlock {
    fn name(&self) -> &'static str {
        "notion-summary"
    }

    async fn publish(&self, content: &str) -> Result<(), StoreError> {
        let blocks = self.page_blocks().await?;
        let Some(block_id) = find_code_block_after_heading(&blocks, &self.heading) else {
            return Err(StoreError::Config(format!(
                "no code block under heading '{}' on page {}",
                self.heading, self.page_id
            )));
        };

        let body = json!({
            "code": {
                "rich_text": text_runs(content),
                "language": "plain text",
            }
        });
        let path = format!("blocks/{block_id}");
        let _: Value = self.client.send_json(Method::PATCH, &path, &body).await?;
        info!(page = %self.page_id, block = %block_id, "account summary block updated");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn heading(text: &str) -> Value {
        json!({ "type": "heading_2", "heading_2": { "rich_text": [ { "plain_text": text } ] } })
    }

    fn code(id: &str) -> Value {
        json!({ "id": id, "type": "code", "code": { "rich_text": [] } })
    }

    fn para() -> Value {
        json!({ "type": "paragraph", "paragraph": { "rich_text": [] } })
    }

    #[test]
    fn finds_code_block_under_matching_heading() {
        let blocks = vec![
            heading("Positions"),
            code("wrong"),
            heading("  Account Summary "),
            para(),
            code("right"),
            code("later"),
        ];
        assert_eq!(
            find_code_block_after_heading(&blocks, "account summary").as_deref(),
            Some("right")
        );
    }

    #[test]
    fn next_heading_ends_the_section() {
        let blocks = vec![heading("Account summary"), para(), heading("Notes"), code("notes")];
        assert_eq!(find_code_block_after_heading(&blocks, "account summary"), None);
    }
}
