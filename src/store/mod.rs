//! Index storage consumed by the retrieval core.
//!
//! The search and ANN code only see the [`VectorStore`] trait. Rows are
//! decoded into fixed structs at this boundary; nothing downstream handles
//! untyped maps.

mod catalog;
mod import;
mod index;
mod lexical;
mod metadata;

pub use catalog::IndexCatalog;
pub use import::{ImportBatch, ImportRecord, ImportSummary};
pub use index::{IndexSpec, IndexStore};
pub use lexical::{LEXICAL_CANDIDATE_LIMIT, LexicalIndex};
pub use metadata::IndexMetadata;

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::ann::AnnState;
use crate::error::StoreResult;
use crate::vector::{ChunkId, Embedding, PageId, VectorDimension};

/// A chunk to be added to an index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewChunk {
    pub file_path: String,
    pub position: u32,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    /// Epoch milliseconds of the content itself, not the file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_timestamp: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
    pub embedding: Embedding,
}

/// Stored chunk details, as fetched after scoring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkRow {
    pub id: ChunkId,
    pub file_path: String,
    pub position: u32,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_timestamp: Option<i64>,
    pub content_hash: String,
    /// Raw JSON text of the filter metadata; parsed lazily when filtering.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<String>,
}

/// A chunk embedding with the fields needed before details are fetched.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredVector {
    pub id: ChunkId,
    pub content_timestamp: Option<i64>,
    pub embedding: Embedding,
}

/// A rendered page to be added to an index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewPage {
    pub file_path: String,
    pub page_number: u32,
    pub patches: Vec<Embedding>,
}

/// A rendered page with its patch vectors.
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    pub id: PageId,
    pub file_path: String,
    pub page_number: u32,
    pub patches: Vec<Embedding>,
}

/// One lexical match with its rank score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LexicalHit {
    pub id: ChunkId,
    pub score: f32,
}

/// Read access to one index, plus persistence of its ANN snapshot.
///
/// Implementations must be safe to share across threads: searches run
/// concurrently with each other and with ANN builds.
pub trait VectorStore: Send + Sync {
    /// Name the index is known by in search results.
    fn name(&self) -> &str;

    /// Dimension of chunk embeddings, if this index has a text lane.
    fn text_dimension(&self) -> Option<VectorDimension>;

    /// Dimension of page patch vectors, if this index has a vision lane.
    fn page_dimension(&self) -> Option<VectorDimension>;

    /// Embedding model id recorded for the text lane.
    fn text_model(&self) -> Option<&str>;

    /// Embedding model id recorded for the vision lane.
    fn vision_model(&self) -> Option<&str>;

    fn chunk_count(&self) -> usize;

    /// Every chunk embedding in insertion order.
    fn chunk_vectors(&self) -> StoreResult<Arc<[StoredVector]>>;

    /// Every page with its patch vectors.
    fn pages(&self) -> StoreResult<Arc<[Page]>>;

    /// Runs an OR query over `tokens`, returning at most `limit` hits.
    fn lexical_search(&self, tokens: &[String], limit: usize) -> StoreResult<Vec<LexicalHit>>;

    /// Detail rows for `ids`. Unknown ids are skipped; order follows `ids`.
    fn fetch_chunks(&self, ids: &[ChunkId]) -> StoreResult<Vec<ChunkRow>>;

    /// The current ANN snapshot, if one has been built.
    fn ann_state(&self) -> Option<Arc<AnnState>>;

    /// Replaces the ANN snapshot in full.
    fn save_ann_state(&self, state: AnnState) -> StoreResult<()>;

    /// Lock held for the duration of an ANN build on this index.
    fn ann_build_lock(&self) -> &parking_lot::Mutex<()>;
}

/// Calculate SHA256 hash of content
pub fn calculate_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Current UTC time in epoch milliseconds
pub fn get_utc_timestamp_ms() -> i64 {
    Utc::now().timestamp_millis()
}
