//! External collaborators: metadata fetch and byte transfer
//!
//! The download engine only sees the two traits below. Production
//! implementations live in [`http`] (reqwest) and [`command`] (subprocess);
//! tests substitute in-memory fakes.

use crate::ledger::{classify, classify_status, ErrorKind};
use async_trait::async_trait;
use serde_json::Value;
use std::path::Path;

pub mod command;
pub mod http;
pub mod shared_resources;

pub use command::CommandMetadataFetcher;
pub use http::{HttpMetadataFetcher, HttpTransfer};

/// A failed fetch or transfer, kept as plain text for classification
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct FetchFailure {
    /// Human-readable failure text
    pub message: String,
    /// HTTP status, when a response was received
    pub status: Option<u16>,
    /// Auxiliary output (for example subprocess stderr)
    pub raw_output: Option<String>,
}

impl FetchFailure {
    /// Failure with only a message
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status: None,
            raw_output: None,
        }
    }

    /// Failure caused by a non-success HTTP status. The URL is not part of
    /// the message; callers keep it alongside.
    pub fn http(status: reqwest::StatusCode) -> Self {
        Self {
            message: format!(
                "HTTP {} {}",
                status.as_u16(),
                status.canonical_reason().unwrap_or("")
            )
            .trim_end()
            .to_string(),
            status: Some(status.as_u16()),
            raw_output: None,
        }
    }

    /// Attach auxiliary output
    pub fn with_raw_output(mut self, raw: impl Into<String>) -> Self {
        let raw = raw.into();
        if !raw.trim().is_empty() {
            self.raw_output = Some(raw);
        }
        self
    }

    /// Classify this failure, from its status when that decides the kind
    pub fn kind(&self) -> ErrorKind {
        self.status
            .and_then(classify_status)
            .unwrap_or_else(|| classify(&self.message, self.raw_output.as_deref()))
    }
}

/// Source of metadata documents
#[async_trait]
pub trait MetadataFetcher: Send + Sync {
    /// Fetch the metadata document of one work item
    async fn fetch(&self, id: &str) -> Result<Value, FetchFailure>;
}

/// Streams a remote resource to a local file
#[async_trait]
pub trait MediaTransfer: Send + Sync {
    /// Download `url` into `dest`, returning the number of bytes written.
    ///
    /// Succeeds only on a 2xx response. On failure `dest` may hold a partial
    /// file; the caller removes it.
    async fn transfer(&self, url: &str, dest: &Path) -> Result<u64, FetchFailure>;
}
