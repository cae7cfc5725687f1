//! ANN candidate selection.

use std::collections::HashSet;

use crate::ann::AnnState;
use crate::error::{RetrievalError, RetrievalResult};
use crate::store::VectorStore;
use crate::vector::{ChunkId, VectorError, cosine_with_norms, norm};

/// Union of chunk ids in the `nprobe` clusters closest to `query`.
///
/// Probing a store without an ANN index is a caller bug and fails with
/// [`RetrievalError::AnnIndexMissing`]; check
/// [`has_ann_index`](crate::ann::has_ann_index) first.
pub fn ann_candidates(
    store: &dyn VectorStore,
    query: &[f32],
    nprobe: usize,
) -> RetrievalResult<HashSet<ChunkId>> {
    let state = store
        .ann_state()
        .ok_or_else(|| RetrievalError::AnnIndexMissing {
            index: store.name().to_string(),
        })?;
    probe(&state, query, nprobe)
}

/// Probes a snapshot directly.
pub fn probe(state: &AnnState, query: &[f32], nprobe: usize) -> RetrievalResult<HashSet<ChunkId>> {
    let ranked = rank_clusters(state, query)?;
    Ok(ranked
        .into_iter()
        .take(nprobe)
        .flat_map(|cluster| state.members(cluster).iter().copied())
        .collect())
}

/// Centroid indices ordered by descending cosine similarity to `query`.
///
/// The sort is stable, so equally similar centroids keep build order.
pub fn rank_clusters(state: &AnnState, query: &[f32]) -> RetrievalResult<Vec<usize>> {
    if query.len() != state.dimension() {
        return Err(VectorError::DimensionMismatch {
            expected: state.dimension(),
            actual: query.len(),
        }
        .into());
    }

    let query_norm = norm(query);
    let mut scored: Vec<(usize, f32)> = state
        .centroids()
        .iter()
        .enumerate()
        .map(|(i, centroid)| (i, cosine_with_norms(query, query_norm, centroid, norm(centroid))))
        .collect();
    scored.sort_by(|a, b| b.1.total_cmp(&a.1));

    Ok(scored.into_iter().map(|(i, _)| i).collect())
}
