use bks_reconcile::StoreError;
use reqwest::{Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

pub(crate) const NOTION_VERSION: &str = "2022-06-28";
pub(crate) const DEFAULT_BASE_URL: &str = "https://api.notion.com";

/// Authenticated Notion REST client. The token is never logged.
#[derive(Clone)]
pub struct NotionClient {
    token: String,
    http: reqwest::Client,
    base_url: String,
}

impl std::fmt::Debug for NotionClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotionClient")
            .field("token", &"<REDACTED>")
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl NotionClient {
    pub fn new(token: String) -> Self {
        Self::new_with_base_url(token, DEFAULT_BASE_URL.to_string())
    }

    pub fn new_with_base_url(token: String, base_url: String) -> Self {
        Self {
            token,
            http: reqwest::Client::new(),
            base_url,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v1/{}", self.base_url.trim_end_matches('/'), path)
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http
            .request(method, self.url(path))
            .bearer_auth(&self.token)
            .header("Notion-Version", NOTION_VERSION)
    }

    pub(crate) async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, StoreError> {
        let resp = self
            .request(Method::GET, path)
            .query(query)
            .send()
            .await
            .map_err(transport)?;
        decode(resp).await
    }

    pub(crate) async fn send_json<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: &Value,
    ) -> Result<T, StoreError> {
        let resp = self
            .request(method, path)
            .json(body)
            .send()
            .await
            .map_err(transport)?;
        decode(resp).await
    }
}

fn transport(err: reqwest::Error) -> StoreError {
    StoreError::Transport(format!("notion request failed: {err}"))
}

/// Notion error body: `{"object":"error","status":400,"code":"validation_error","message":"..."}`.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    code: Option<String>,
    message: Option<String>,
}

async fn decode<T: DeserializeOwned>(resp: Response) -> Result<T, StoreError> {
    let status = resp.status();
    let bytes = resp.bytes().await.map_err(transport)?;

    if !status.is_success() {
        let message = match serde_json::from_slice::<ErrorBody>(&bytes) {
            Ok(ErrorBody {
                code: Some(c),
                message: Some(m),
            }) => format!("{c}: {m}"),
            Ok(ErrorBody {
                message: Some(m), ..
            }) => m,
            _ => String::from_utf8_lossy(&bytes).into_owned(),
        };
        return Err(StoreError::Api {
            status: status.as_u16(),
            message,
        });
    }

    serde_json::from_slice(&bytes)
        .map_err(|e| StoreError::Decode(format!("notion response json decode failed: {e}")))
}

/// Concatenated text of a rich-text array. Falls back to `text.content`
/// when `plain_text` is absent.
pub(crate) fn plain_text(rich_text: &[Value]) -> String {
    rich_text
        .iter()
        .map(|item| {
            item.get("plain_text")
                .and_then(Value::as_str)
                .or_else(|| item.pointer("/text/content").and_then(Value::as_str))
                .unwrap_or("")
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn plain_text_joins_runs_and_falls_back_to_content() {
        let rt = vec![
            json!({ "plain_text": "Account " }),
            json!({ "text": { "content": "Summary" } }),
            json!({ "annotations": {} }),
        ];
        assert_eq!(plain_text(&rt), "Account Summary");
    }

    #[test]
    fn debug_redacts_token() {
        let c = NotionClient::new("secret_abc".to_string());
        let dbg = format!("{c:?}");
        assert!(!dbg.contains("secret_abc"));
    }
}
