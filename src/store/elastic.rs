//! Elasticsearch `_bulk` client

use super::{BulkStore, Document, DocumentStatus};
use crate::config::StoreConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use tracing::debug;
use url::Url;

#[derive(Debug, Serialize)]
struct IndexAction<'a> {
    index: IndexTarget<'a>,
}

#[derive(Debug, Serialize)]
struct IndexTarget<'a> {
    #[serde(rename = "_index")]
    index: &'a str,
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    id: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct BulkResponse {
    #[serde(default)]
    errors: bool,
    #[serde(default)]
    items: Vec<HashMap<String, BulkItem>>,
}

#[derive(Debug, Deserialize)]
struct BulkItem {
    status: u16,
    #[serde(default)]
    error: Option<Value>,
}

impl BulkItem {
    fn into_status(self) -> DocumentStatus {
        match self.error {
            None if (200..300).contains(&self.status) => DocumentStatus::Accepted,
            None => DocumentStatus::Rejected(format!("status {}", self.status)),
            Some(err) => DocumentStatus::Rejected(describe_item_error(self.status, &err)),
        }
    }
}

fn describe_item_error(status: u16, err: &Value) -> String {
    let kind = err.get("type").and_then(Value::as_str);
    let reason = err.get("reason").and_then(Value::as_str);
    match (kind, reason) {
        (Some(kind), Some(reason)) => format!("{} ({}): {}", kind, status, reason),
        (Some(kind), None) => format!("{} ({})", kind, status),
        _ => format!("status {}: {}", status, err),
    }
}

/// HTTP client for an Elasticsearch-compatible bulk endpoint
pub struct ElasticStore {
    client: Client,
    base_url: Url,
    api_key: Option<String>,
}

impl ElasticStore {
    pub fn new(config: &StoreConfig) -> Result<Self> {
        let mut base_url = Url::parse(&config.url)
            .map_err(|e| Error::Config(format!("Invalid store URL '{}': {}", config.url, e)))?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let client = Client::builder().timeout(config.timeout()).gzip(true).build()?;

        Ok(Self {
            client,
            base_url,
            api_key: config.api_key(),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|e| Error::Config(format!("Invalid store URL: {}", e)))
    }

    fn request(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => builder.header(AUTHORIZATION, format!("ApiKey {}", key)),
            None => builder,
        }
    }

    /// Newline-delimited action/source pairs
    fn encode(collection: &str, docs: &[Document]) -> Result<String> {
        let mut body = String::new();
        for doc in docs {
            let action = IndexAction {
                index: IndexTarget {
                    index: collection,
                    id: doc.id.as_deref(),
                },
            };
            body.push_str(&serde_json::to_string(&action)?);
            body.push('\n');
            body.push_str(&serde_json::to_string(&doc.source)?);
            body.push('\n');
        }
        Ok(body)
    }
}

#[async_trait]
impl BulkStore for ElasticStore {
    async fn bulk(&self, collection: &str, docs: &[Document]) -> Result<Vec<DocumentStatus>> {
        if docs.is_empty() {
            return Ok(Vec::new());
        }

        let url = self.endpoint("_bulk")?;
        let body = Self::encode(collection, docs)?;

        let response = self
            .request(self.client.post(url))
            .header(CONTENT_TYPE, "application/x-ndjson")
            .body(body)
            .send()
            .await
            .map_err(|e| Error::Transport(format!("bulk request failed: {}", e)))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(Error::Transport(format!(
                "store rejected credentials ({})",
                status
            )));
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let snippet: String = text.chars().take(200).collect();
            return Err(Error::Transport(format!(
                "bulk request returned {}: {}",
                status, snippet
            )));
        }

        let parsed: BulkResponse = response
            .json()
            .await
            .map_err(|e| Error::Transport(format!("unreadable bulk response: {}", e)))?;
        debug!(
            collection,
            items = parsed.items.len(),
            errors = parsed.errors,
            "Bulk response received"
        );

        Ok(parsed
            .items
            .into_iter()
            .map(|item| match item.into_values().next() {
                Some(result) => result.into_status(),
                None => DocumentStatus::Rejected("empty bulk item".to_string()),
            })
            .collect())
    }

    async fn ping(&self) -> Result<()> {
        let url = self.endpoint("")?;
        self.request(self.client.get(url))
            .send()
            .await
            .map_err(|e| Error::Transport(format!("store unreachable: {}", e)))?
            .error_for_status()
            .map_err(|e| Error::Transport(format!("store unhealthy: {}", e)))?;
        Ok(())
    }

    fn name(&self) -> &str {
        self.base_url.as_str()
    }
}
