//! Multi-index retrieval over pre-embedded text chunks and page images.
//!
//! Chunks are scored by cosine similarity blended with BM25, pages by
//! late-interaction MaxSim, and results from many indexes are fused with
//! reciprocal rank fusion. An optional k-means coarse quantizer prunes the
//! chunk scan on large indexes.

pub mod adapter;
pub mod ann;
pub mod config;
pub mod display;
pub mod error;
pub mod io;
pub mod search;
pub mod store;
pub mod vector;

// Explicit exports for better API clarity
pub use adapter::{Adapter, AdapterRegistry, TextAdapter, VisionAdapter};
pub use ann::{AnnBuildOptions, AnnBuildReport, AnnStatus, build_ann_index, has_ann_index};
pub use config::Settings;
pub use error::{RetrievalError, RetrievalResult, StoreError, StoreResult};
pub use search::{
    QueryVectors, ResultType, SearchEngine, SearchMode, SearchOptions, SearchResponse,
    SearchResult,
};
pub use store::{IndexCatalog, IndexSpec, IndexStore, NewChunk, NewPage, VectorStore};
pub use vector::{ChunkId, Embedding, PageId};
