use async_trait::async_trait;
use bks_reconcile::{
    Cursor, ExternalRecord, FieldValue, Page, QueryFilter, RecordFields, RecordHandle, RecordStore,
    StoreError,
};
use reqwest::{Method, RequestBuilder, Response, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::a1::{column_range, first_row, row_range};

pub(crate) const DEFAULT_BASE_URL: &str = "https://sheets.googleapis.com";

/// Data starts below the header row.
const FIRST_DATA_ROW: u32 = 2;
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One spreadsheet tab as a [`RecordStore`].
///
/// The collection is the tab name, each record one row laid out in
/// `columns` order, and the handle the row's A1 range. Listing reads only the
/// key column, `page_size` rows at a time; the cursor is the next row number.
/// The values API drops trailing blank rows from each window, so only an
/// empty window ends the listing; a short one may sit on a cleared row.
#[derive(Clone)]
pub struct SheetsStore {
    access_token: String,
    http: reqwest::Client,
    base_url: String,
    spreadsheet_id: String,
    columns: Vec<String>,
}

impl std::fmt::Debug for SheetsStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SheetsStore")
            .field("access_token", &"<REDACTED>")
            .field("base_url", &self.base_url)
            .field("spreadsheet_id", &self.spreadsheet_id)
            .field("columns", &self.columns)
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AppendResponse {
    updates: AppendUpdates,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AppendUpdates {
    updated_range: String,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<String>,
    status: Option<String>,
}

impl SheetsStore {
    pub fn new(access_token: String, spreadsheet_id: String, columns: Vec<String>) -> Self {
        Self::new_with_base_url(
            access_token,
            DEFAULT_BASE_URL.to_string(),
            spreadsheet_id,
            columns,
        )
    }

    pub fn new_with_base_url(
        access_token: String,
        base_url: String,
        spreadsheet_id: String,
        columns: Vec<String>,
    ) -> Self {
        Self {
            access_token,
            http: reqwest::Client::new(),
            base_url,
            spreadsheet_id,
            columns,
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Write the header row if row 1 is empty. Returns whether it was written.
    /// A different existing header is left alone and logged.
    pub async fn ensure_header(&self, sheet: &str) -> Result<bool, StoreError> {
        let range = row_range(sheet, 1, self.columns.len());
        let current: ValueRange = self
            .call(self.request(Method::GET, &range, "")?)
            .await?;

        let existing: Vec<String> = current
            .values
            .first()
            .map(|row| row.iter().map(cell_text).collect())
            .unwrap_or_default();
        if existing.iter().any(|c| !c.is_empty()) {
            if existing != self.columns {
                warn!(sheet, ?existing, expected = ?self.columns, "sheet header differs; left as is");
            }
            return Ok(false);
        }

        let header: Vec<Value> = self.columns.iter().map(|c| json!(c)).collect();
        let body = json!({ "range": range, "majorDimension": "ROWS", "values": [header] });
        let _: Value = self
            .call(
                self.request(Method::PUT, &range, "")?
                    .query(&[("valueInputOption", "RAW")])
                    .json(&body),
            )
            .await?;
        info!(sheet, "sheet header written");
        Ok(true)
    }

    fn key_column(&self, key_field: &str) -> Result<usize, StoreError> {
        self.columns
            .iter()
            .position(|c| c == key_field)
            .ok_or_else(|| StoreError::Config(format!("key column '{key_field}' not in sheet layout")))
    }

    fn row_values(&self, fields: &RecordFields) -> Vec<Value> {
        self.columns
            .iter()
            .map(|col| match fields.get(col) {
                Some(FieldValue::Title(s) | FieldValue::Text(s) | FieldValue::Select(s)) => {
                    json!(s)
                }
                Some(FieldValue::Number(n)) if n.is_finite() => json!(n),
                Some(FieldValue::Date(ts)) => json!(ts.format(TIMESTAMP_FORMAT).to_string()),
                Some(FieldValue::Number(_)) | None => json!(""),
            })
            .collect()
    }

    fn values_url(&self, range: &str, suffix: &str) -> Result<Url, StoreError> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| StoreError::Config(format!("invalid sheets base url: {e}")))?;
        url.path_segments_mut()
            .map_err(|_| StoreError::Config("sheets base url cannot carry a path".to_string()))?
            .pop_if_empty()
            .extend(["v4", "spreadsheets", self.spreadsheet_id.as_str(), "values"])
            .push(&format!("{range}{suffix}"));
        Ok(url)
    }

    fn request(&self, method: Method, range: &str, suffix: &str) -> Result<RequestBuilder, StoreError> {
        Ok(self
            .http
            .request(method, self.values_url(range, suffix)?)
            .bearer_auth(&self.access_token))
    }

    async fn call<T: DeserializeOwned>(&self, req: RequestBuilder) -> Result<T, StoreError> {
        let resp = req
            .send()
            .await
            .map_err(|e| StoreError::Transport(format!("sheets request failed: {e}")))?;
        decode(resp).await
    }
}

async fn decode<T: DeserializeOwned>(resp: Response) -> Result<T, StoreError> {
    let status = resp.status();
    let bytes = resp
        .bytes()
        .await
        .map_err(|e| StoreError::Transport(format!("sheets response read failed: {e}")))?;

    if !status.is_success() {
        let message = match serde_json::from_slice::<ErrorEnvelope>(&bytes) {
            Ok(ErrorEnvelope {
                error:
                    ErrorBody {
                        message: Some(m),
                        status: Some(s),
                    },
            }) => format!("{s}: {m}"),
            Ok(ErrorEnvelope {
                error: ErrorBody {
                    message: Some(m), ..
                },
            }) => m,
            _ => String::from_utf8_lossy(&bytes).into_owned(),
        };
        return Err(StoreError::Api {
            status: status.as_u16(),
            message,
        });
    }

    serde_json::from_slice(&bytes)
        .map_err(|e| StoreError::Decode(format!("sheets response json decode failed: {e}")))
}

fn cell_text(v: &Value) -> String {
    match v {
        Value::String(s) => s.trim().to_string(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[async_trait]
impl RecordStore for SheetsStore {
    fn name(&self) -> &'static str {
        "sheets"
    }

    async fn query_page(
        &self,
        filter: &QueryFilter,
        cursor: Option<&Cursor>,
    ) -> Result<Page, StoreError> {
        if filter.page_size == 0 {
            return Err(StoreError::Config("page_size must be positive".to_string()));
        }
        let column = self.key_column(&filter.key_field)?;
        let start = match cursor {
            Some(c) => c
                .0
                .parse::<u32>()
                .map_err(|_| StoreError::Decode(format!("invalid sheets cursor '{}'", c.0)))?,
            None => FIRST_DATA_ROW,
        };
        let end = start.saturating_add(filter.page_size - 1);
        let range = column_range(&filter.collection, column, start, end);

        let resp: ValueRange = self
            .call(
                self.request(Method::GET, &range, "")?
                    .query(&[("majorDimension", "ROWS")]),
            )
            .await?;

        let records: Vec<ExternalRecord> = resp
            .values
            .iter()
            .zip(start..)
            .map(|(row, row_no)| {
                let key = row.first().map(cell_text).filter(|k| !k.is_empty());
                ExternalRecord {
                    handle: RecordHandle(row_range(&filter.collection, row_no, self.columns.len())),
                    key,
                }
            })
            .collect();

        let next_cursor =
            (!resp.values.is_empty()).then(|| Cursor(end.saturating_add(1).to_string()));
        debug!(sheet = %filter.collection, range = %range, rows = records.len(), "sheets key page");
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
        let range = row_range(collection, 1, self.columns.len());
        let body = json!({ "majorDimension": "ROWS", "values": [self.row_values(fields)] });
        let resp: AppendResponse = self
            .call(
                self.request(Method::POST, &range, ":append")?
                    .query(&[
                        ("valueInputOption", "RAW"),
                        ("insertDataOption", "INSERT_ROWS"),
                    ])
                    .json(&body),
            )
            .await?;

        let row = first_row(&resp.updates.updated_range).ok_or_else(|| {
            StoreError::Decode(format!(
                "unexpected updatedRange '{}'",
                resp.updates.updated_range
            ))
        })?;
        Ok(RecordHandle(row_range(collection, row, self.columns.len())))
    }

    async fn update_record(
        &self,
        handle: &RecordHandle,
        fields: &RecordFields,
    ) -> Result<(), StoreError> {
        let body = json!({
            "range": handle.0,
            "majorDimension": "ROWS",
            "values": [self.row_values(fields)],
        });
        let _: Value = self
            .call(
                self.request(Method::PUT, &handle.0, "")?
                    .query(&[("valueInputOption", "RAW")])
                    .json(&body),
            )
            .await?;
        Ok(())
    }
}
