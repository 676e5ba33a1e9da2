//! # Likes Archiver Library
//!
//! Archives a user's liked posts: fetches each post's metadata document,
//! downloads its media, and keeps durable bookkeeping so that multi-thousand
//! item runs survive network failures, rate limits and interruption.
//!
//! ## Features
//!
//! - **Bounded concurrency**: every media transfer goes through one FIFO
//!   [`downloader::ConcurrencyLimiter`]
//! - **Error ledger**: classified, timestamped failure records with retry
//!   counts and aggregate statistics ([`ledger`])
//! - **Idempotent resume**: a processed set of terminal outcomes, reconciled
//!   against what is actually on disk ([`processed`])
//! - **Chunked runs**: worklists are processed in fixed-size batches with
//!   progress reporting and a checkpoint after every batch
//!
//! ## Quick Start
//!
//! ```no_run
//! use likes_archiver::archive::LocalArchive;
//! use likes_archiver::downloader::{RunConfig, RunExecutor};
//! use likes_archiver::fetcher::HttpTransfer;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let ids = likes_archiver::export::read_export("like.js".as_ref())?;
//! let executor = RunExecutor::open(
//!     LocalArchive::new("archive"),
//!     ".likes-archiver".as_ref(),
//!     Arc::new(HttpTransfer::new()),
//!     RunConfig::default(),
//! );
//! let summary = executor.run(&ids).await?;
//! println!("{}", summary.format_human());
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`export`] - Extract liked-post ids from a platform export file
//! - [`archive`] - Local archive layout and metadata documents
//! - [`fetcher`] - Metadata fetch and byte transfer collaborators
//! - [`ledger`] - Error classification and the durable error ledger
//! - [`processed`] - Processed-set tracking and reconciliation
//! - [`downloader`] - Limiter, batch runner, retry policy and orchestration
//! - [`state`] - Atomic state files and the run lock

#![warn(missing_docs)]
#![warn(clippy::all)]

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Local archive layout
pub mod archive;

/// CLI command implementations
pub mod cli;

/// Download orchestration
pub mod downloader;

/// Identifier extraction from platform exports
pub mod export;

/// Metadata fetch and media transfer collaborators
pub mod fetcher;

/// Error classification and ledger
pub mod ledger;

/// Observability counters
pub mod metrics;

/// Processed-set tracking and reconciliation
pub mod processed;

/// Graceful shutdown coordination shared across modules
pub mod shutdown;

/// Durable state files
pub mod state;

pub use ledger::{ErrorKind, ErrorLedger};
pub use processed::ProcessedSet;

/// Kind of a media entry attached to a post
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    /// Still image with a single URL
    Photo,
    /// Video (animated GIFs are stored as videos too)
    #[serde(alias = "animated_gif")]
    Video,
    /// Any other type; such entries are skipped
    #[serde(other)]
    Unknown,
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            MediaKind::Photo => "photo",
            MediaKind::Video => "video",
            MediaKind::Unknown => "unknown",
        };
        write!(f, "{s}")
    }
}

impl FromStr for MediaKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "photo" => Ok(MediaKind::Photo),
            "video" | "animated_gif" => Ok(MediaKind::Video),
            _ => Err(format!("Invalid media kind: {s}")),
        }
    }
}

/// One encoded rendition of a video
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Variant {
    /// Source URL
    pub url: String,
    /// Bitrate in bits per second; streaming playlists usually have none
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bitrate: Option<u64>,
    /// MIME type, when the metadata provides it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
}

/// Media attached to a post
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MediaEntry {
    /// Photo or video
    #[serde(rename = "type")]
    pub kind: MediaKind,
    /// Direct URL (photos). Platform exports put a short link here.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Media host URL from platform exports: the image for photos, the
    /// poster frame for videos
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_url_https: Option<String>,
    /// Encoded renditions (videos)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub variants: Vec<Variant>,
    /// Thumbnail shown before playback (videos)
    #[serde(
        default,
        alias = "coverUrl",
        alias = "thumbnail",
        skip_serializing_if = "Option::is_none"
    )]
    pub cover_url: Option<String>,
}

impl MediaEntry {
    /// Build a photo entry
    pub fn photo(url: impl Into<String>) -> Self {
        Self {
            kind: MediaKind::Photo,
            url: Some(url.into()),
            media_url_https: None,
            variants: Vec::new(),
            cover_url: None,
        }
    }

    /// Build a video entry
    pub fn video(variants: Vec<Variant>, cover_url: Option<String>) -> Self {
        Self {
            kind: MediaKind::Video,
            url: None,
            media_url_https: None,
            variants,
            cover_url,
        }
    }

    /// Pick the variant with the highest bitrate.
    ///
    /// A missing bitrate counts as zero. On ties the variant listed first
    /// wins, so the choice is deterministic for a given document.
    pub fn best_variant(&self) -> Option<&Variant> {
        self.variants.iter().fold(None, |best: Option<&Variant>, candidate| {
            match best {
                Some(current)
                    if candidate.bitrate.unwrap_or(0) <= current.bitrate.unwrap_or(0) =>
                {
                    Some(current)
                }
                _ => Some(candidate),
            }
        })
    }

    /// URL of the primary file to download for this entry.
    ///
    /// Photos prefer `media_url_https` over `url` (falling back to the first
    /// variant); videos use the best variant. Unknown kinds have none.
    pub fn primary_url(&self) -> Option<&str> {
        match self.kind {
            MediaKind::Photo => self
                .media_url_https
                .as_deref()
                .or(self.url.as_deref())
                .or_else(|| self.variants.first().map(|v| v.url.as_str())),
            MediaKind::Video => self.best_variant().map(|v| v.url.as_str()),
            MediaKind::Unknown => None,
        }
    }

    /// Thumbnail of a video: `cover_url`, else `media_url_https`
    pub fn cover(&self) -> Option<&str> {
        match self.kind {
            MediaKind::Video => self
                .cover_url
                .as_deref()
                .or(self.media_url_https.as_deref()),
            _ => None,
        }
    }
}
