//! Processed-set tracker
//!
//! Three disjoint buckets of terminal outcomes, each mapping a work item id to
//! the time it reached that outcome. Membership in any bucket means "do not
//! process again" (subject to `--retry-failed` for the `failed` bucket).

use super::ProcessedError;
use crate::state::{load_or_default, write_json_atomic};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Terminal outcome bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Bucket {
    /// Metadata and all media archived
    Successful,
    /// Gave up on the item
    Failed,
    /// Metadata archived, nothing to download
    NoMedia,
}

impl Bucket {
    /// All buckets
    pub const ALL: [Bucket; 3] = [Bucket::Successful, Bucket::Failed, Bucket::NoMedia];
}

impl std::fmt::Display for Bucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Bucket::Successful => "successful",
            Bucket::Failed => "failed",
            Bucket::NoMedia => "noMedia",
        };
        f.write_str(name)
    }
}

/// On-disk processed-set document
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProcessedDocument {
    /// Ids that completed successfully
    #[serde(default)]
    pub successful: BTreeMap<String, DateTime<Utc>>,
    /// Ids that failed permanently
    #[serde(default)]
    pub failed: BTreeMap<String, DateTime<Utc>>,
    /// Ids whose metadata had no media
    #[serde(default)]
    pub no_media: BTreeMap<String, DateTime<Utc>>,
}

impl ProcessedDocument {
    fn bucket(&self, bucket: Bucket) -> &BTreeMap<String, DateTime<Utc>> {
        match bucket {
            Bucket::Successful => &self.successful,
            Bucket::Failed => &self.failed,
            Bucket::NoMedia => &self.no_media,
        }
    }

    fn bucket_mut(&mut self, bucket: Bucket) -> &mut BTreeMap<String, DateTime<Utc>> {
        match bucket {
            Bucket::Successful => &mut self.successful,
            Bucket::Failed => &mut self.failed,
            Bucket::NoMedia => &mut self.no_media,
        }
    }
}

/// Durable processed set
#[derive(Debug)]
pub struct ProcessedSet {
    path: Option<PathBuf>,
    document: ProcessedDocument,
}

impl ProcessedSet {
    /// Set that never touches disk
    pub fn in_memory() -> Self {
        Self {
            path: None,
            document: ProcessedDocument::default(),
        }
    }

    /// Load from `path`; missing or corrupt files give an empty set.
    ///
    /// An id found in more than one bucket is kept only in the first of
    /// `successful`, `noMedia`, `failed`.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mut document: ProcessedDocument = load_or_default(&path, "processed set");

        let overlapping: BTreeSet<String> = document
            .failed
            .keys()
            .chain(document.no_media.keys())
            .filter(|id| {
                let in_success = document.successful.contains_key(*id);
                let in_both = document.failed.contains_key(*id) && document.no_media.contains_key(*id);
                in_success || in_both
            })
            .cloned()
            .collect();
        for id in overlapping {
            warn!(id = %id, "Id present in several processed buckets, keeping one");
            if document.successful.contains_key(&id) {
                document.failed.remove(&id);
                document.no_media.remove(&id);
            } else {
                document.failed.remove(&id);
            }
        }

        info!(
            path = %path.display(),
            successful = document.successful.len(),
            failed = document.failed.len(),
            no_media = document.no_media.len(),
            "Processed set loaded"
        );
        Self {
            path: Some(path),
            document,
        }
    }

    /// Backing file, if any
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Persist the document
    pub fn save(&self) -> Result<(), ProcessedError> {
        if let Some(path) = &self.path {
            write_json_atomic(path, &self.document)?;
            debug!(path = %path.display(), total = self.len(), "Processed set saved");
        }
        Ok(())
    }

    /// Move `id` into `bucket` now. See [`ProcessedSet::mark_at`].
    pub fn mark(&mut self, id: &str, bucket: Bucket) {
        self.mark_at(id, bucket, Utc::now());
    }

    /// Put `id` into `bucket`, removing it from the other two.
    pub fn mark_at(&mut self, id: &str, bucket: Bucket, at: DateTime<Utc>) {
        for other in Bucket::ALL {
            if other != bucket {
                self.document.bucket_mut(other).remove(id);
            }
        }
        self.document.bucket_mut(bucket).insert(id.to_string(), at);
    }

    /// Bucket currently holding `id`
    pub fn bucket_of(&self, id: &str) -> Option<Bucket> {
        Bucket::ALL
            .into_iter()
            .find(|bucket| self.document.bucket(*bucket).contains_key(id))
    }

    /// Whether `id` is in any bucket
    pub fn contains(&self, id: &str) -> bool {
        self.bucket_of(id).is_some()
    }

    /// When `id` reached its outcome
    pub fn completed_at(&self, id: &str) -> Option<DateTime<Utc>> {
        self.bucket_of(id)
            .and_then(|bucket| self.document.bucket(bucket).get(id).copied())
    }

    /// Remove `id` from whichever bucket holds it
    pub fn remove(&mut self, id: &str) -> Option<Bucket> {
        let bucket = self.bucket_of(id)?;
        self.document.bucket_mut(bucket).remove(id);
        Some(bucket)
    }

    /// Ids in one bucket, sorted
    pub fn ids(&self, bucket: Bucket) -> Vec<String> {
        self.document.bucket(bucket).keys().cloned().collect()
    }

    /// Size of one bucket
    pub fn count(&self, bucket: Bucket) -> usize {
        self.document.bucket(bucket).len()
    }

    /// Total ids across buckets
    pub fn len(&self) -> usize {
        Bucket::ALL.iter().map(|b| self.count(*b)).sum()
    }

    /// Whether every bucket is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The whole document
    pub fn document(&self) -> &ProcessedDocument {
        &self.document
    }
}
