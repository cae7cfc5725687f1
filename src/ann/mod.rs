//! Coarse-quantization ANN index.
//!
//! Chunk embeddings are clustered offline; at query time only the chunks in
//! the `nprobe` closest clusters are scored exactly. Brute force stays the
//! default, this path is opt-in per search.

mod builder;
mod selector;
mod state;

pub use builder::{
    AnnBuildOptions, AnnBuildReport, DEFAULT_MIN_CHUNKS, build_ann_index, cluster_count,
    has_ann_index,
};
pub use selector::{ann_candidates, probe, rank_clusters};
pub use state::{AnnState, AnnStateError, AnnStatus};
