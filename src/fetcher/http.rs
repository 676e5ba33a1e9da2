//! reqwest-backed collaborators
//!
//! - [`HttpTransfer`] streams a media URL to disk chunk by chunk
//! - [`HttpMetadataFetcher`] GETs a JSON document from a URL template

use super::shared_resources::global_http_client;
use super::{FetchFailure, MediaTransfer, MetadataFetcher};
use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tracing::debug;

/// Placeholder replaced by the work item id in URL templates
pub const ID_PLACEHOLDER: &str = "{id}";

fn transport_failure(error: reqwest::Error) -> FetchFailure {
    let status = error.status().map(|s| s.as_u16());
    // The URL is recorded separately; keep its digits away from the classifier
    let error = error.without_url();
    // Display of reqwest errors omits the cause chain ("error sending request")
    let mut message = format!("request failed: {error}");
    let mut source = std::error::Error::source(&error);
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    FetchFailure {
        message,
        status,
        raw_output: None,
    }
}

/// Streams HTTP resources to local files
#[derive(Debug, Clone)]
pub struct HttpTransfer {
    client: Arc<Client>,
}

impl HttpTransfer {
    /// Transfer using the shared client
    pub fn new() -> Self {
        Self {
            client: global_http_client(),
        }
    }

    /// Transfer using a specific client
    pub fn with_client(client: Arc<Client>) -> Self {
        Self { client }
    }
}

impl Default for HttpTransfer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MediaTransfer for HttpTransfer {
    async fn transfer(&self, url: &str, dest: &Path) -> Result<u64, FetchFailure> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| transport_failure(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchFailure::http(status));
        }

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| FetchFailure::new(format!("failed to create {}: {e}", parent.display())))?;
        }
        let mut file = tokio::fs::File::create(dest)
            .await
            .map_err(|e| FetchFailure::new(format!("failed to create {}: {e}", dest.display())))?;

        let mut written = 0u64;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| transport_failure(e))?;
            file.write_all(&chunk)
                .await
                .map_err(|e| FetchFailure::new(format!("failed to write {}: {e}", dest.display())))?;
            written += chunk.len() as u64;
        }
        file.flush()
            .await
            .map_err(|e| FetchFailure::new(format!("failed to flush {}: {e}", dest.display())))?;

        debug!(url = %url, path = %dest.display(), bytes = written, "Transfer complete");
        Ok(written)
    }
}

/// Fetches metadata documents by substituting the id into a URL template
#[derive(Debug, Clone)]
pub struct HttpMetadataFetcher {
    client: Arc<Client>,
    template: String,
}

impl HttpMetadataFetcher {
    /// Fetcher for `template`, which must contain `{id}`
    pub fn new(template: impl Into<String>) -> Result<Self, String> {
        let template = template.into();
        if !template.contains(ID_PLACEHOLDER) {
            return Err(format!(
                "metadata URL template must contain {ID_PLACEHOLDER}: {template}"
            ));
        }
        reqwest::Url::parse(&template.replace(ID_PLACEHOLDER, "0"))
            .map_err(|e| format!("invalid metadata URL template {template}: {e}"))?;
        Ok(Self {
            client: global_http_client(),
            template,
        })
    }

    /// URL for one id
    pub fn url_for(&self, id: &str) -> String {
        self.template.replace(ID_PLACEHOLDER, id)
    }
}

#[async_trait]
impl MetadataFetcher for HttpMetadataFetcher {
    async fn fetch(&self, id: &str) -> Result<Value, FetchFailure> {
        let url = self.url_for(id);
        debug!(id = %id, url = %url, "Fetching metadata");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| transport_failure(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FetchFailure::http(status).with_raw_output(body));
        }

        let body = response
            .text()
            .await
            .map_err(|e| transport_failure(e))?;
        serde_json::from_str(&body).map_err(|e| {
            FetchFailure::new(format!("failed to parse metadata JSON: {e}"))
        })
    }
}
