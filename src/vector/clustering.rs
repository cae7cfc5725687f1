//! K-means clustering for the coarse quantizer.
//!
//! This module partitions chunk embeddings into `k` buckets whose centroids
//! are later probed by the ANN candidate selector.
//!
//! # Algorithm Details
//! - Distance metric: squared Euclidean (equivalent to cosine ordering for
//!   unit-normalized inputs, without a normalization per comparison)
//! - Initialization: `k` distinct input vectors sampled by a seeded RNG, so
//!   builds over the same data are reproducible
//! - Max iterations: configurable, 20 by default
//! - Convergence: no assignment changes between two iterations
//! - Empty clusters: reseeded to the vector farthest from its own centroid
//!
//! # Performance Characteristics
//! - O(n * k * d * iterations) time complexity
//! - O(k * d) space for centroids
//! - The assignment step runs in parallel across vectors

use crate::vector::math::squared_euclidean;
use crate::vector::types::ClusterId;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::index;
use rayon::prelude::*;
use thiserror::Error;
use tracing::{debug, warn};

/// Default maximum number of Lloyd iterations.
pub const DEFAULT_MAX_ITERATIONS: usize = 20;

/// Default RNG seed for centroid initialization.
pub const DEFAULT_SEED: u64 = 0x5eed;

/// Parameters for one clustering run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KMeansConfig {
    /// Requested number of clusters, clamped to the number of vectors.
    pub k: usize,

    /// Upper bound on assignment/update rounds.
    pub max_iterations: usize,

    /// Seed for sampling the initial centroids.
    pub seed: u64,
}

impl KMeansConfig {
    /// Creates a config with the default iteration cap and seed.
    #[must_use]
    pub fn new(k: usize) -> Self {
        Self {
            k,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            seed: DEFAULT_SEED,
        }
    }

    #[must_use]
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }
}

/// Result of K-means clustering operation.
#[derive(Debug, Clone, PartialEq)]
pub struct KMeansResult {
    /// Cluster centroids, each a vector of the same dimension as input vectors.
    pub centroids: Vec<Vec<f32>>,

    /// Cluster assignment for each input vector, against the returned centroids.
    pub assignments: Vec<ClusterId>,

    /// Number of assignment rounds performed.
    pub iterations: usize,

    /// Whether a round finished with no assignment changes.
    pub converged: bool,
}

/// Errors that can occur during clustering operations.
#[derive(Error, Debug)]
pub enum ClusteringError {
    #[error(
        "Empty vector set provided for clustering\nSuggestion: Ensure chunks are indexed before building the ANN index"
    )]
    EmptyVectorSet,

    #[error("Invalid cluster count: {0}\nSuggestion: Use k of at least 1")]
    InvalidClusterCount(usize),

    #[error(
        "Dimension mismatch in vectors: expected {expected}, got {actual}\nSuggestion: Ensure all vectors come from the same embedding model"
    )]
    DimensionMismatch { expected: usize, actual: usize },
}

/// Clusters `vectors` and returns exactly `min(k, len(vectors))` centroids.
///
/// This is the narrow contract; the ANN builder calls
/// [`kmeans_clustering`] because it also needs the assignments.
pub fn cluster<V>(
    vectors: &[V],
    k: usize,
    max_iterations: usize,
    seed: u64,
) -> Result<Vec<Vec<f32>>, ClusteringError>
where
    V: AsRef<[f32]> + Sync,
{
    let config = KMeansConfig {
        k,
        max_iterations,
        seed,
    };
    kmeans_clustering(vectors, &config).map(|result| result.centroids)
}

/// Performs K-means clustering on a set of vectors using Euclidean distance.
///
/// # Arguments
/// * `vectors` - Input vectors to cluster (must be non-empty and same dimension)
/// * `config` - Cluster count, iteration cap and seed
///
/// # Algorithm
/// 1. Sample `k` distinct input vectors as initial centroids
/// 2. Iterate until convergence or max iterations:
///    - Assign each vector to nearest centroid (by squared distance)
///    - Update centroids as mean of assigned vectors
///    - Reseed any empty cluster to the worst-fitting vector
#[must_use = "clustering results should be used or the computation is wasted"]
pub fn kmeans_clustering<V>(
    vectors: &[V],
    config: &KMeansConfig,
) -> Result<KMeansResult, ClusteringError>
where
    V: AsRef<[f32]> + Sync,
{
    if vectors.is_empty() {
        return Err(ClusteringError::EmptyVectorSet);
    }

    if config.k == 0 {
        return Err(ClusteringError::InvalidClusterCount(0));
    }

    let dimension = vectors[0].as_ref().len();
    if let Some(bad) = vectors.iter().find(|v| v.as_ref().len() != dimension) {
        return Err(ClusteringError::DimensionMismatch {
            expected: dimension,
            actual: bad.as_ref().len(),
        });
    }

    let k = config.k.min(vectors.len());
    let mut centroids = initialize_centroids(vectors, k, config.seed);
    let mut assignments = vec![usize::MAX; vectors.len()];
    let mut iterations = 0;
    let mut converged = false;

    while iterations < config.max_iterations {
        iterations += 1;

        let nearest = nearest_centroids(vectors, &centroids);
        let changed = nearest
            .iter()
            .zip(assignments.iter())
            .filter(|((cluster, _), previous)| cluster != *previous)
            .count();

        for (slot, (cluster, _)) in assignments.iter_mut().zip(nearest.iter()) {
            *slot = *cluster;
        }

        if changed == 0 {
            converged = true;
            break;
        }

        centroids = update_centroids(vectors, &nearest, k, dimension);
    }

    if !converged {
        // Centroids moved after the last assignment; re-assign so the
        // returned assignments agree with the returned centroids.
        let nearest = nearest_centroids(vectors, &centroids);
        for (slot, (cluster, _)) in assignments.iter_mut().zip(nearest.iter()) {
            *slot = *cluster;
        }
        if config.max_iterations > 0 {
            warn!(
                "k-means did not converge after {} iterations (k={k}, n={})",
                config.max_iterations,
                vectors.len()
            );
        }
    }

    Ok(KMeansResult {
        centroids,
        assignments: assignments
            .into_iter()
            .map(ClusterId::from_index)
            .collect(),
        iterations,
        converged,
    })
}

/// Index of the nearest centroid by squared Euclidean distance, with that
/// distance. Ties go to the centroid that appears first.
fn nearest_centroid(vector: &[f32], centroids: &[Vec<f32>]) -> (usize, f32) {
    let mut best = (0usize, f32::INFINITY);
    for (i, centroid) in centroids.iter().enumerate() {
        let distance = squared_euclidean(vector, centroid);
        if distance < best.1 {
            best = (i, distance);
        }
    }
    best
}

/// Nearest centroid index and squared distance for every vector.
fn nearest_centroids<V>(vectors: &[V], centroids: &[Vec<f32>]) -> Vec<(usize, f32)>
where
    V: AsRef<[f32]> + Sync,
{
    vectors
        .par_iter()
        .map(|vector| nearest_centroid(vector.as_ref(), centroids))
        .collect()
}

/// Samples `k` distinct vectors as the initial centroids.
///
/// Indices are drawn uniformly without replacement, so the same seed over
/// the same input always yields the same starting point.
fn initialize_centroids<V>(vectors: &[V], k: usize, seed: u64) -> Vec<Vec<f32>>
where
    V: AsRef<[f32]>,
{
    let mut rng = StdRng::seed_from_u64(seed);
    index::sample(&mut rng, vectors.len(), k.min(vectors.len()))
        .into_iter()
        .map(|i| vectors[i].as_ref().to_vec())
        .collect()
}

/// Recomputes centroids as the mean of their assigned vectors.
///
/// `nearest` carries each vector's cluster and its squared distance to the
/// centroid it was assigned to; the distances pick reseed points for
/// clusters that ended up empty.
fn update_centroids<V>(
    vectors: &[V],
    nearest: &[(usize, f32)],
    k: usize,
    dimension: usize,
) -> Vec<Vec<f32>>
where
    V: AsRef<[f32]>,
{
    let mut new_centroids = vec![vec![0.0f32; dimension]; k];
    let mut cluster_sizes = vec![0usize; k];

    for (vector, &(cluster, _)) in vectors.iter().zip(nearest.iter()) {
        for (sum, &value) in new_centroids[cluster].iter_mut().zip(vector.as_ref()) {
            *sum += value;
        }
        cluster_sizes[cluster] += 1;
    }

    // Farthest-first order for reseeding; each vector is used at most once.
    let mut reseed_order: Vec<usize> = Vec::new();
    if cluster_sizes.contains(&0) {
        reseed_order = (0..vectors.len()).collect();
        reseed_order.sort_by(|&a, &b| nearest[b].1.total_cmp(&nearest[a].1).then(a.cmp(&b)));
    }
    let mut reseed_iter = reseed_order.into_iter();

    for (cluster, (centroid, &size)) in new_centroids
        .iter_mut()
        .zip(cluster_sizes.iter())
        .enumerate()
    {
        if size == 0 {
            if let Some(far) = reseed_iter.next() {
                debug!("reseeding empty cluster {cluster} to vector {far}");
                *centroid = vectors[far].as_ref().to_vec();
            }
        } else {
            let count = size as f32;
            for value in centroid.iter_mut() {
                *value /= count;
            }
        }
    }

    new_centroids
}
