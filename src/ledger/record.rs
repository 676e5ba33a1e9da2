//! Error records, error kinds and aggregate statistics

use crate::MediaKind;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::str::FromStr;

/// Closed set of failure classifications
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Metadata document could not be obtained
    #[serde(rename = "download_failed")]
    DownloadFailed,
    /// Metadata or response could not be parsed
    #[serde(rename = "json_parse_error")]
    JsonParseError,
    /// Media URL returned 404
    #[serde(rename = "media_404")]
    Media404,
    /// Media URL returned 403
    #[serde(rename = "media_403")]
    Media403,
    /// Media transfer failed for another reason
    #[serde(rename = "media_download_failed")]
    MediaDownloadFailed,
    /// Rate limited by the platform
    #[serde(rename = "rate_limit")]
    RateLimit,
    /// Credentials rejected or session expired
    #[serde(rename = "auth_error")]
    AuthError,
    /// DNS, connection or timeout failure
    #[serde(rename = "network_error")]
    NetworkError,
    /// Nothing matched
    #[serde(rename = "unknown_error")]
    UnknownError,
    /// Item marked successful but its metadata is gone from disk
    #[serde(rename = "not_found")]
    NotFound,
}

impl ErrorKind {
    /// Every kind, in declaration order
    pub const ALL: [ErrorKind; 10] = [
        ErrorKind::DownloadFailed,
        ErrorKind::JsonParseError,
        ErrorKind::Media404,
        ErrorKind::Media403,
        ErrorKind::MediaDownloadFailed,
        ErrorKind::RateLimit,
        ErrorKind::AuthError,
        ErrorKind::NetworkError,
        ErrorKind::UnknownError,
        ErrorKind::NotFound,
    ];

    /// Wire name (`media_404`, `rate_limit`, ...)
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::DownloadFailed => "download_failed",
            ErrorKind::JsonParseError => "json_parse_error",
            ErrorKind::Media404 => "media_404",
            ErrorKind::Media403 => "media_403",
            ErrorKind::MediaDownloadFailed => "media_download_failed",
            ErrorKind::RateLimit => "rate_limit",
            ErrorKind::AuthError => "auth_error",
            ErrorKind::NetworkError => "network_error",
            ErrorKind::UnknownError => "unknown_error",
            ErrorKind::NotFound => "not_found",
        }
    }

    /// Worth waiting and trying the metadata fetch again
    pub fn is_transient(&self) -> bool {
        matches!(self, ErrorKind::RateLimit | ErrorKind::NetworkError)
    }

    /// Halts the whole run
    pub fn is_fatal(&self) -> bool {
        matches!(self, ErrorKind::AuthError)
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ErrorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ErrorKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| {
                let valid: Vec<&str> = ErrorKind::ALL.iter().map(|k| k.as_str()).collect();
                format!("Invalid error kind: {s}. Valid options: {}", valid.join(", "))
            })
    }
}

/// Diagnostic context stored with an error record
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ErrorDetails {
    /// Human-readable failure message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// URL being fetched
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// HTTP status code, if a response was received
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    /// Media kind of the failed entry
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_kind: Option<MediaKind>,
    /// Destination path on disk
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<PathBuf>,
    /// Selected variant bitrate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bitrate: Option<u64>,
    /// Anything else worth keeping
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ErrorDetails {
    /// Details with just a message
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::default()
        }
    }

    /// Attach the URL
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Attach an HTTP status
    pub fn with_status(mut self, status: Option<u16>) -> Self {
        self.status = status;
        self
    }

    /// Attach the media kind
    pub fn with_media_kind(mut self, kind: MediaKind) -> Self {
        self.media_kind = Some(kind);
        self
    }

    /// Attach the destination path
    pub fn with_file_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.file_path = Some(path.into());
        self
    }

    /// Attach the variant bitrate
    pub fn with_bitrate(mut self, bitrate: Option<u64>) -> Self {
        self.bitrate = bitrate;
        self
    }

    /// Attach a free-form field
    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }
}

/// Failure state of one work item
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ErrorRecord {
    /// Latest classification
    pub kind: ErrorKind,
    /// When the latest failure was recorded
    pub timestamp: DateTime<Utc>,
    /// Number of failures recorded since the last clear
    pub retry_count: u32,
    /// Diagnostic context of the latest failure
    pub details: ErrorDetails,
}

impl ErrorRecord {
    /// Calendar date (UTC) the record is counted under
    pub fn date(&self) -> NaiveDate {
        self.timestamp.date_naive()
    }
}

/// Aggregate counters derived from the record set
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct LedgerStatistics {
    /// Number of records
    pub total_errors: u64,
    /// Records per kind
    pub by_type: BTreeMap<ErrorKind, u64>,
    /// Records per UTC date (`YYYY-MM-DD`)
    pub by_date: BTreeMap<String, u64>,
}

impl LedgerStatistics {
    /// Count a record
    pub fn record(&mut self, kind: ErrorKind, date: NaiveDate) {
        self.total_errors += 1;
        *self.by_type.entry(kind).or_insert(0) += 1;
        *self.by_date.entry(date_key(date)).or_insert(0) += 1;
    }

    /// Uncount a record. Buckets that reach zero are dropped so an add
    /// followed by a remove restores the exact previous value.
    pub fn forget(&mut self, kind: ErrorKind, date: NaiveDate) {
        self.total_errors = self.total_errors.saturating_sub(1);
        decrement(&mut self.by_type, &kind);
        decrement(&mut self.by_date, &date_key(date));
    }

    /// Rebuild counters from a record set
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a ErrorRecord>) -> Self {
        let mut stats = Self::default();
        for record in records {
            stats.record(record.kind, record.date());
        }
        stats
    }

    /// Count for one kind
    pub fn count_of(&self, kind: ErrorKind) -> u64 {
        self.by_type.get(&kind).copied().unwrap_or(0)
    }
}

fn date_key(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

fn decrement<K: Ord + Clone>(map: &mut BTreeMap<K, u64>, key: &K) {
    if let Some(count) = map.get_mut(key) {
        *count = count.saturating_sub(1);
        if *count == 0 {
            map.remove(key);
        }
    }
}
