use async_trait::async_trait;
use bks_reconcile::{
    Cursor, ExternalRecord, Page, QueryFilter, RecordFields, RecordHandle, RecordStore, StoreError,
};
use reqwest::Method;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::client::NotionClient;
use crate::properties::{encode_properties, read_key};

/// Notion database as a [`RecordStore`]: one page per record, the natural
/// key in the `filter.key_field` property, page id as the handle.
#[derive(Debug, Clone)]
pub struct NotionStore {
    client: NotionClient,
}

impl NotionStore {
    pub fn new(client: NotionClient) -> Self {
        Self { client }
    }
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    results: Vec<PageObject>,
    #[serde(default)]
    has_more: bool,
    next_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PageObject {
    id: String,
    #[serde(default)]
    properties: Value,
}

#[async_trait]
impl RecordStore for NotionStore {
    fn name(&self) -> &'static str {
        "notion"
    }

    async fn query_page(
        &self,
        filter: &QueryFilter,
        cursor: Option<&Cursor>,
    ) -> Result<Page, StoreError> {
        let mut body = json!({ "page_size": filter.page_size });
        if let Some(c) = cursor {
            body["start_cursor"] = Value::String(c.0.clone());
        }
        let path = format!("databases/{}/query", filter.collection);
        let resp: QueryResponse = self.client.send_json(Method::POST, &path, &body).await?;

        let records = resp
            .results
            .into_iter()
            .map(|p| ExternalRecord {
                key: read_key(&p.properties, &filter.key_field),
                handle: RecordHandle(p.id),
            })
            .collect::<Vec<_>>();

        let next_cursor = match (resp.has_more, resp.next_cursor) {
            (true, Some(c)) if !c.is_empty() => Some(Cursor(c)),
            (true, _) => {
                return Err(StoreError::Decode(
                    "notion query reported has_more without next_cursor".to_string(),
                ))
            }
            (false, _) => None,
        };
        debug!(
            database = %filter.collection,
            records = records.len(),
            has_more = next_cursor.is_some(),
            "notion query page"
        );
        Ok(Page {
            records,
            next_cursor,
        })
    }

    async fn create_record(
        &self,
        collection: &str,
        fields: &RecordFields,
    ) -> Result<RecordHandle, StoreError> {
        let body = json!({
            "parent": { "database_id": collection },
            "properties": encode_properties(fields),
        });
        let created: PageObject = self.client.send_json(Method::POST, "pages", &body).await?;
        Ok(RecordHandle(created.id))
    }

    async fn update_record(
        &self,
        handle: &RecordHandle,
        fields: &RecordFields,
    ) -> Result<(), StoreError> {
        let body = json!({ "properties": encode_properties(fields) });
        let path = format!("pages/{}", handle.0);
        let _: Value = self.client.send_json(Method::PATCH, &path, &body).await?;
        Ok(())
    }
}
