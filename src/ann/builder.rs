//! Offline ANN index build.
//!
//! A build clusters every chunk embedding of one store and swaps the
//! resulting snapshot in as a whole. Builds are batch operations invoked
//! out of band, never from the query path.

use serde::Serialize;
use tracing::{debug, info};

use crate::ann::AnnState;
use crate::error::{RetrievalResult, StoreError};
use crate::store::{VectorStore, get_utc_timestamp_ms};
use crate::vector::{DEFAULT_MAX_ITERATIONS, DEFAULT_SEED, KMeansConfig, kmeans_clustering};

/// Below this many chunks a brute-force scan is cheap and exact.
pub const DEFAULT_MIN_CHUNKS: usize = 1000;

/// Parameters for [`build_ann_index`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnnBuildOptions {
    pub min_chunks: usize,
    pub max_iterations: usize,
    pub seed: u64,
}

impl Default for AnnBuildOptions {
    fn default() -> Self {
        Self {
            min_chunks: DEFAULT_MIN_CHUNKS,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            seed: DEFAULT_SEED,
        }
    }
}

impl AnnBuildOptions {
    #[must_use]
    pub fn with_min_chunks(mut self, min_chunks: usize) -> Self {
        self.min_chunks = min_chunks;
        self
    }
}

/// Outcome of one build request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnnBuildReport {
    pub built: bool,
    pub num_clusters: usize,
    pub num_chunks: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Number of clusters for a corpus of `num_chunks`: `ceil(sqrt(n))`, at least 1.
#[must_use]
pub fn cluster_count(num_chunks: usize) -> usize {
    ((num_chunks as f64).sqrt().ceil() as usize).max(1)
}

/// Whether a centroid set has been persisted for `store`.
pub fn has_ann_index(store: &dyn VectorStore) -> bool {
    store.ann_state().is_some()
}

/// Clusters every chunk of `store` and replaces its ANN snapshot.
///
/// Builds on the same store are serialized by the store's build lock.
/// Searches keep reading the previous snapshot until the new one has been
/// fully computed and persisted.
pub fn build_ann_index(
    store: &dyn VectorStore,
    options: &AnnBuildOptions,
) -> RetrievalResult<AnnBuildReport> {
    let _build = store.ann_build_lock().lock();

    let vectors = store.chunk_vectors()?;
    let num_chunks = vectors.len();

    if num_chunks == 0 || num_chunks < options.min_chunks {
        let reason = format!(
            "index '{}' has {num_chunks} chunks, below the minimum of {} for an ANN index",
            store.name(),
            options.min_chunks.max(1)
        );
        info!("skipping ANN build: {reason}");
        return Ok(AnnBuildReport {
            built: false,
            num_clusters: 0,
            num_chunks,
            reason: Some(reason),
        });
    }

    let k = cluster_count(num_chunks);
    debug!(
        "building ANN index for '{}': {num_chunks} chunks, {k} clusters",
        store.name()
    );

    let embeddings: Vec<&[f32]> = vectors.iter().map(|v| v.embedding.as_slice()).collect();
    let config = KMeansConfig {
        k,
        max_iterations: options.max_iterations,
        seed: options.seed,
    };
    let result = kmeans_clustering(&embeddings, &config)?;

    let assignments = vectors
        .iter()
        .map(|v| v.id)
        .zip(result.assignments)
        .collect();
    let state = AnnState::new(result.centroids, assignments, get_utc_timestamp_ms())
        .map_err(StoreError::from)?;
    let num_clusters = state.num_clusters();

    store.save_ann_state(state)?;
    info!(
        "built ANN index for '{}': {num_clusters} clusters over {num_chunks} chunks in {} iterations",
        store.name(),
        result.iterations
    );

    Ok(AnnBuildReport {
        built: true,
        num_clusters,
        num_chunks,
        reason: None,
    })
}
