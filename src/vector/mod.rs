//! Vector primitives for the retrieval engine.
//!
//! This module holds everything that operates on raw embeddings without
//! knowing about indexes or queries: identifiers, similarity kernels, the
//! portable byte encoding, the k-means coarse quantizer and the
//! memory-mapped embedding file.
//!
//! # Architecture
//! The ANN index (see [`crate::ann`]) is an IVF-style coarse quantizer: the
//! clustering here produces its centroids, and candidate selection probes
//! the `nprobe` closest of them before exact scoring.

mod clustering;
mod codec;
mod math;
mod storage;
mod types;

// Re-export core types for public API
pub use clustering::{
    ClusteringError, DEFAULT_MAX_ITERATIONS, DEFAULT_SEED, KMeansConfig, KMeansResult,
    cluster, kmeans_clustering,
};
pub use codec::{BYTES_PER_F32, decode_embedding, decode_multi, encode_embedding, encode_multi};
pub use math::{cosine_with_norms, dot, norm, normalize_vector, squared_euclidean};
pub use storage::{EmbeddingFile, VectorStorageError};
pub use types::{ChunkId, ClusterId, Embedding, PageId, VectorDimension, VectorError};
