//! Local archive layout
//!
//! Every work item owns one directory under the archive root, named by its id:
//!
//! ```text
//! archive/
//! └── 1234567890/
//!     ├── metadata.json        (generic name)
//!     ├── 1234567890.json      (id-derived name, older archives)
//!     ├── abc.jpg
//!     └── clip.mp4
//! ```
//!
//! The presence of either metadata file is the ground truth for "this item's
//! metadata was fetched".

pub mod metadata;

pub use metadata::{Author, MetadataDocument};

use crate::state::write_json_atomic;
use reqwest::Url;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Generic metadata file name
pub const METADATA_FILENAME: &str = "metadata.json";

/// Archive errors
#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    /// No metadata document exists for the item
    #[error("metadata not found for {0}")]
    MetadataNotFound(String),

    /// Metadata document exists but cannot be parsed
    #[error("metadata parse error for {id}: {message}")]
    MetadataParse {
        /// Work item id
        id: String,
        /// Parser message
        message: String,
    },

    /// Media URL has no usable file name
    #[error("invalid media URL: {0}")]
    InvalidMediaUrl(String),

    /// Work item id cannot be used as a directory name
    #[error("invalid item id: {0:?}")]
    InvalidItemId(String),

    /// IO error
    #[error("IO error: {0}")]
    IoError(String),
}

/// Check that an id is safe to use as a single path component.
pub fn validate_item_id(id: &str) -> Result<(), ArchiveError> {
    let id_ok = !id.is_empty()
        && id != "."
        && id != ".."
        && !id.contains(['/', '\\', '\0'])
        && id.trim() == id;
    if id_ok {
        Ok(())
    } else {
        Err(ArchiveError::InvalidItemId(id.to_string()))
    }
}

/// Derive the local file name for a media URL from its path component.
///
/// Query strings and fragments are ignored, so
/// `https://img.example.com/media/abc.jpg?name=orig` maps to `abc.jpg`.
pub fn media_filename(url: &str) -> Result<String, ArchiveError> {
    let parsed = Url::parse(url).map_err(|e| ArchiveError::InvalidMediaUrl(format!("{url}: {e}")))?;
    let name = parsed
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|segment| !segment.is_empty() && *segment != "." && *segment != "..")
        .ok_or_else(|| ArchiveError::InvalidMediaUrl(url.to_string()))?;
    Ok(name.to_string())
}

/// Local archive rooted at one directory
#[derive(Debug, Clone)]
pub struct LocalArchive {
    root: PathBuf,
}

impl LocalArchive {
    /// Create an archive handle (the directory is created lazily)
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    /// Archive root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory of one work item
    pub fn item_dir(&self, id: &str) -> PathBuf {
        self.root.join(id)
    }

    /// Metadata file candidates in lookup order: generic, then id-derived
    pub fn metadata_candidates(&self, id: &str) -> [PathBuf; 2] {
        let dir = self.item_dir(id);
        [dir.join(METADATA_FILENAME), dir.join(format!("{id}.json"))]
    }

    /// First metadata file that exists for `id`
    pub fn locate_metadata(&self, id: &str) -> Option<PathBuf> {
        self.metadata_candidates(id)
            .into_iter()
            .find(|path| path.is_file())
    }

    /// Whether a recognized metadata file exists for `id`
    pub fn exists_local_metadata(&self, id: &str) -> bool {
        self.locate_metadata(id).is_some()
    }

    /// Read and classify the metadata document of `id`
    pub fn read_metadata(&self, id: &str) -> Result<MetadataDocument, ArchiveError> {
        let path = self
            .locate_metadata(id)
            .ok_or_else(|| ArchiveError::MetadataNotFound(id.to_string()))?;
        let contents = std::fs::read_to_string(&path).map_err(|e| ArchiveError::MetadataParse {
            id: id.to_string(),
            message: format!("{}: {e}", path.display()),
        })?;
        MetadataDocument::parse(&contents).map_err(|message| ArchiveError::MetadataParse {
            id: id.to_string(),
            message,
        })
    }

    /// Atomically write the generic metadata file for `id`
    pub fn write_metadata(&self, id: &str, document: &Value) -> Result<PathBuf, ArchiveError> {
        validate_item_id(id)?;
        let path = self.item_dir(id).join(METADATA_FILENAME);
        write_json_atomic(&path, document).map_err(|e| ArchiveError::IoError(e.to_string()))?;
        // The writer leaves a lock file next to the document; it is not media.
        let _ = std::fs::remove_file(path.with_extension("lock"));
        debug!(id = %id, path = %path.display(), "Metadata written");
        Ok(path)
    }

    /// Destination path of a media URL inside the item directory
    pub fn media_path(&self, id: &str, url: &str) -> Result<PathBuf, ArchiveError> {
        validate_item_id(id)?;
        Ok(self.item_dir(id).join(media_filename(url)?))
    }

    /// Ids of all item directories currently present, sorted
    pub fn list_item_ids(&self) -> Result<Vec<String>, ArchiveError> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }
        let entries =
            std::fs::read_dir(&self.root).map_err(|e| ArchiveError::IoError(e.to_string()))?;

        let mut ids = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| ArchiveError::IoError(e.to_string()))?;
            let is_dir = entry
                .file_type()
                .map_err(|e| ArchiveError::IoError(e.to_string()))?
                .is_dir();
            if is_dir {
                if let Some(name) = entry.file_name().to_str() {
                    ids.push(name.to_string());
                }
            }
        }
        ids.sort();
        Ok(ids)
    }

    /// Delete an item directory and everything in it; missing is fine
    pub fn remove_item(&self, id: &str) -> Result<(), ArchiveError> {
        validate_item_id(id)?;
        let dir = self.item_dir(id);
        match std::fs::remove_dir_all(&dir) {
            Ok(()) => {
                info!(id = %id, path = %dir.display(), "Removed archive directory");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ArchiveError::IoError(e.to_string())),
        }
    }
}
