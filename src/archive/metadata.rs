//! Metadata document shapes
//!
//! Metadata documents come from more than one producer and their key sets vary.
//! Only `media` (and, for reporting, `author`) matter to the downloader, so the
//! document is classified into a few recognized shapes instead of being forced
//! through one schema.

use crate::MediaEntry;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Author record attached to a post
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Author {
    /// Platform user id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Handle without the leading `@`
    #[serde(
        default,
        alias = "screen_name",
        alias = "username",
        skip_serializing_if = "Option::is_none"
    )]
    pub handle: Option<String>,
    /// Display name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// A parsed metadata document
#[derive(Debug, Clone, PartialEq)]
pub enum MetadataDocument {
    /// Post with a `media` array
    Post {
        /// Author, when present and well-formed
        author: Option<Author>,
        /// Media entries in listed order
        media: Vec<MediaEntry>,
    },
    /// Post without a `media` key
    TextOnly {
        /// Author, when present and well-formed
        author: Option<Author>,
    },
    /// Object matching no known shape
    Unrecognized {
        /// Top-level keys, sorted
        keys: Vec<String>,
    },
}

/// Keys that identify a post even when it carries no media
const POST_KEYS: &[&str] = &["id", "id_str", "tweet_id", "text", "full_text", "author", "user"];

impl MetadataDocument {
    /// Classify a JSON value into a document shape.
    ///
    /// Returns an error if the value is not an object or if `media` is present
    /// but malformed.
    pub fn from_value(value: Value) -> Result<Self, String> {
        let Value::Object(mut map) = value else {
            return Err("metadata document is not a JSON object".to_string());
        };

        let author = map
            .get("author")
            .or_else(|| map.get("user"))
            .and_then(|a| serde_json::from_value::<Author>(a.clone()).ok());

        if let Some(media) = map.remove("media") {
            if media.is_null() {
                return Ok(MetadataDocument::TextOnly { author });
            }
            let media: Vec<MediaEntry> = serde_json::from_value(media)
                .map_err(|e| format!("invalid media list: {e}"))?;
            return Ok(MetadataDocument::Post { author, media });
        }

        if POST_KEYS.iter().any(|k| map.contains_key(*k)) {
            return Ok(MetadataDocument::TextOnly { author });
        }

        let mut keys: Vec<String> = map.keys().cloned().collect();
        keys.sort();
        Ok(MetadataDocument::Unrecognized { keys })
    }

    /// Parse a document from JSON text
    pub fn parse(json: &str) -> Result<Self, String> {
        let value: Value = serde_json::from_str(json).map_err(|e| format!("invalid JSON: {e}"))?;
        Self::from_value(value)
    }

    /// Media entries, or `None` when the document has no media list
    pub fn media(&self) -> Option<&[MediaEntry]> {
        match self {
            MetadataDocument::Post { media, .. } => Some(media),
            _ => None,
        }
    }

    /// Author record, if any
    pub fn author(&self) -> Option<&Author> {
        match self {
            MetadataDocument::Post { author, .. } | MetadataDocument::TextOnly { author } => {
                author.as_ref()
            }
            MetadataDocument::Unrecognized { .. } => None,
        }
    }
}
