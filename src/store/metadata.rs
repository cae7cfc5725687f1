//! Metadata tracking for index persistence.
//!
//! `index.json` records the embedding models and dimensions an index was
//! built with, so a mismatched query model is caught at open time rather
//! than by comparing garbage vectors.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{StoreError, StoreResult};
use crate::store::get_utc_timestamp_ms;

/// File name of the metadata document inside an index directory.
pub(crate) const METADATA_FILE: &str = "index.json";

/// Metadata for one index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexMetadata {
    /// Index name, equal to its directory name
    pub name: String,

    /// Dimension of chunk embeddings, absent for vision-only indexes
    #[serde(default)]
    pub text_dimension: Option<usize>,

    /// Dimension of page patch vectors, absent for text-only indexes
    #[serde(default)]
    pub page_dimension: Option<usize>,

    /// Model id used to embed chunks
    #[serde(default)]
    pub text_model: Option<String>,

    /// Model id used to embed pages
    #[serde(default)]
    pub vision_model: Option<String>,

    /// Number of chunks stored
    pub chunk_count: usize,

    /// Number of pages stored
    pub page_count: usize,

    /// Epoch milliseconds when created
    pub created_at: i64,

    /// Epoch milliseconds when last updated
    pub updated_at: i64,

    /// Version of the metadata format
    pub version: u32,
}

impl IndexMetadata {
    /// Current metadata version
    pub const CURRENT_VERSION: u32 = 1;

    /// Create new metadata with current timestamp
    pub fn new(name: impl Into<String>) -> Self {
        let now = get_utc_timestamp_ms();
        Self {
            name: name.into(),
            text_dimension: None,
            page_dimension: None,
            text_model: None,
            vision_model: None,
            chunk_count: 0,
            page_count: 0,
            created_at: now,
            updated_at: now,
            version: Self::CURRENT_VERSION,
        }
    }

    /// Update counts and the timestamp
    pub fn update(&mut self, chunk_count: usize, page_count: usize) {
        self.chunk_count = chunk_count;
        self.page_count = page_count;
        self.updated_at = get_utc_timestamp_ms();
    }

    /// Save metadata to `index.json` in `dir`
    pub fn save(&self, dir: &Path) -> StoreResult<()> {
        let path = dir.join(METADATA_FILE);
        let json = serde_json::to_string_pretty(self).map_err(|e| StoreError::Metadata {
            path: path.clone(),
            reason: format!("Failed to serialize metadata: {e}"),
        })?;
        std::fs::write(&path, json).map_err(|e| StoreError::io(&path, e))
    }

    /// Load metadata from `index.json` in `dir`
    pub fn load(dir: &Path) -> StoreResult<Self> {
        let path = dir.join(METADATA_FILE);
        let json = std::fs::read_to_string(&path).map_err(|e| StoreError::io(&path, e))?;

        let metadata: Self = serde_json::from_str(&json).map_err(|e| StoreError::Metadata {
            path: path.clone(),
            reason: format!("Failed to parse metadata: {e}"),
        })?;

        // Check version compatibility
        if metadata.version > Self::CURRENT_VERSION {
            return Err(StoreError::Metadata {
                path,
                reason: format!(
                    "Metadata version {} is newer than supported version {}",
                    metadata.version,
                    Self::CURRENT_VERSION
                ),
            });
        }

        Ok(metadata)
    }

    /// Check if metadata file exists
    pub fn exists(dir: &Path) -> bool {
        dir.join(METADATA_FILE).exists()
    }
}
