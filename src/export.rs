//! Identifier extraction from platform export files
//!
//! Accepted inputs:
//!
//! - the platform's JavaScript export: `window.YTD.like.part0 = [ {"like": {"tweetId": "..."}} ]`
//! - a JSON array of `{"like": {...}}`, `{"tweetId": ...}`, `{"id": ...}`
//!   objects, strings or numbers
//! - plain text, one id (or status URL) per line, `#` starts a comment
//!
//! Ids are validated and de-duplicated, keeping the first occurrence.

use crate::archive::validate_item_id;
use serde_json::Value;
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, info};

const ID_KEYS: [&str; 4] = ["tweetId", "tweet_id", "id_str", "id"];

/// Export parsing errors
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    /// Export file could not be read
    #[error("failed to read export {path}: {message}")]
    IoError {
        /// Export path
        path: String,
        /// Underlying error
        message: String,
    },

    /// Export content is not valid JSON where JSON was expected
    #[error("failed to parse export: {0}")]
    ParseError(String),

    /// An entry has no usable id
    #[error("export entry {index} has no usable id: {entry}")]
    MissingId {
        /// Position in the export
        index: usize,
        /// The entry, abbreviated
        entry: String,
    },

    /// An id cannot be used as an archive directory name
    #[error("invalid id {id:?} at entry {index}")]
    InvalidId {
        /// Position in the export
        index: usize,
        /// The offending id
        id: String,
    },
}

/// Read and parse an export file
pub fn read_export(path: &Path) -> Result<Vec<String>, ExportError> {
    let contents = std::fs::read_to_string(path).map_err(|e| ExportError::IoError {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;
    let ids = parse_export(&contents)?;
    info!(path = %path.display(), ids = ids.len(), "Export loaded");
    Ok(ids)
}

/// Parse export contents into an ordered, de-duplicated id list
pub fn parse_export(contents: &str) -> Result<Vec<String>, ExportError> {
    let trimmed = contents.trim_start_matches('\u{feff}').trim();

    let raw = if let Some(json) = strip_js_assignment(trimmed) {
        ids_from_json(json)?
    } else if trimmed.starts_with('[') {
        ids_from_json(trimmed)?
    } else {
        ids_from_lines(trimmed)
    };

    let mut seen = HashSet::with_capacity(raw.len());
    let mut ids = Vec::with_capacity(raw.len());
    for (index, id) in raw.into_iter().enumerate() {
        validate_item_id(&id).map_err(|_| ExportError::InvalidId {
            index,
            id: id.clone(),
        })?;
        if seen.insert(id.clone()) {
            ids.push(id);
        }
    }
    debug!(unique = ids.len(), "Parsed export");
    Ok(ids)
}

/// `window.YTD.like.part0 = [...]` → `[...]`
fn strip_js_assignment(contents: &str) -> Option<&str> {
    if !contents.starts_with("window.") {
        return None;
    }
    let (_, rhs) = contents.split_once('=')?;
    Some(rhs.trim().trim_end_matches(';'))
}

fn ids_from_json(json: &str) -> Result<Vec<String>, ExportError> {
    let value: Value =
        serde_json::from_str(json).map_err(|e| ExportError::ParseError(e.to_string()))?;
    let Value::Array(entries) = value else {
        return Err(ExportError::ParseError(
            "expected a JSON array of likes".to_string(),
        ));
    };

    entries
        .iter()
        .enumerate()
        .map(|(index, entry)| {
            id_of(entry).ok_or_else(|| ExportError::MissingId {
                index,
                entry: abbreviate(entry),
            })
        })
        .collect()
}

fn id_of(entry: &Value) -> Option<String> {
    match entry {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Object(map) => {
            if let Some(inner) = map.get("like") {
                return id_of(inner);
            }
            ID_KEYS
                .iter()
                .find_map(|key| map.get(*key))
                .and_then(|v| match v {
                    Value::String(s) => Some(s.trim().to_string()),
                    Value::Number(n) => Some(n.to_string()),
                    _ => None,
                })
        }
        _ => None,
    }
}

fn ids_from_lines(contents: &str) -> Vec<String> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(|line| match line.split_once("/status/") {
            Some((_, rest)) => rest
                .split(['/', '?', '#'])
                .next()
                .unwrap_or_default()
                .to_string(),
            None => line.to_string(),
        })
        .collect()
}

fn abbreviate(entry: &Value) -> String {
    let text = entry.to_string();
    if text.chars().count() > 80 {
        let head: String = text.chars().take(77).collect();
        format!("{head}...")
    } else {
        text
    }
}
