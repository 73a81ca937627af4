use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use charles_github_issues::github_transport_helpers::truncate_for_error;
use serde::Deserialize;
use serde_json::json;

use super::bot_services::{SearchIndex, WebPage};
use super::side_effects::PAGE_DOCUMENT_TYPE;

#[derive(Debug, Deserialize)]
struct BulkResponse {
    #[serde(default)]
    errors: bool,
}

#[derive(Clone)]
/// Elasticsearch REST client. Pages are stored under the `page` type with
/// their URL as document id.
pub struct ElasticsearchIndex {
    http: reqwest::Client,
    endpoint: String,
}

impl ElasticsearchIndex {
    pub fn new(endpoint: String, request_timeout_ms: u64) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent("charles-github-bot")
            .timeout(Duration::from_millis(request_timeout_ms.max(1)))
            .build()
            .context("failed to create elasticsearch client")?;
        Ok(Self {
            http,
            endpoint: endpoint.trim_end_matches('/').to_string(),
        })
    }

    fn index_url(&self, index: &str) -> String {
        format!("{}/{}", self.endpoint, urlencoding::encode(index))
    }

    fn bulk_body(index: &str, pages: &[WebPage]) -> Result<String> {
        let mut body = String::new();
        for page in pages {
            let action = json!({
                "index": { "_index": index, "_type": PAGE_DOCUMENT_TYPE, "_id": page.url }
            });
            body.push_str(&serde_json::to_string(&action).context("failed to encode bulk action")?);
            body.push('\n');
            body.push_str(&serde_json::to_string(page).context("failed to encode page")?);
            body.push('\n');
        }
        Ok(body)
    }

    async fn delete(&self, operation: &str, url: String) -> Result<()> {
        let response = self
            .http
            .delete(&url)
            .send()
            .await
            .with_context(|| format!("elasticsearch {operation} request failed"))?;
        let status = response.status();
        if status.is_success() || status == reqwest::StatusCode::NOT_FOUND {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        bail!(
            "elasticsearch {operation} failed with status {}: {}",
            status.as_u16(),
            truncate_for_error(&body, 800)
        )
    }
}

#[async_trait]
impl SearchIndex for ElasticsearchIndex {
    async fn exists(&self, index: &str) -> Result<bool> {
        let response = self
            .http
            .head(self.index_url(index))
            .send()
            .await
            .context("elasticsearch index lookup failed")?;
        match response.status().as_u16() {
            200..=299 => Ok(true),
            404 => Ok(false),
            status => bail!("elasticsearch index lookup failed with status {status}"),
        }
    }

    async fn export(&self, index: &str, pages: &[WebPage]) -> Result<()> {
        if pages.is_empty() {
            tracing::debug!(index, "nothing to export");
            return Ok(());
        }
        let body = Self::bulk_body(index, pages)?;
        let response = self
            .http
            .post(format!("{}/_bulk", self.endpoint))
            .header(reqwest::header::CONTENT_TYPE, "application/x-ndjson")
            .body(body)
            .send()
            .await
            .context("elasticsearch bulk request failed")?;
        let status = response.status();
        let raw = response.text().await.unwrap_or_default();
        if !status.is_success() {
            bail!(
                "elasticsearch bulk export failed with status {}: {}",
                status.as_u16(),
                truncate_for_error(&raw, 800)
            );
        }
        let outcome: BulkResponse =
            serde_json::from_str(&raw).context("failed to decode elasticsearch bulk response")?;
        if outcome.errors {
            bail!(
                "elasticsearch rejected some documents of {index}: {}",
                truncate_for_error(&raw, 800)
            );
        }
        tracing::debug!(index, documents = pages.len(), "exported pages");
        Ok(())
    }

    async fn delete_index(&self, index: &str) -> Result<()> {
        self.delete("delete index", self.index_url(index)).await
    }

    async fn delete_document(&self, index: &str, doc_type: &str, id: &str) -> Result<()> {
        let url = format!(
            "{}/{}/{}",
            self.index_url(index),
            urlencoding::encode(doc_type),
            urlencoding::encode(id)
        );
        self.delete("delete document", url).await
    }
}
