//! Persisted coarse-quantizer snapshot.
//!
//! An [`AnnState`] is immutable once built. Stores hold it behind an
//! `Arc` and replace the whole snapshot on rebuild, so a reader either sees
//! the previous build or the next one, never a mix.
//!
//! # File Format (`ann.bin`)
//!
//! - Header (32 bytes): magic `QANN`, version, dimension, cluster count `k`,
//!   assignment count `n` (all u32), build time in epoch milliseconds (i64),
//!   4 reserved bytes
//! - `k * dimension` little-endian f32 centroid values
//! - `n` assignment records: `u32` chunk id, `u32` cluster id

use std::collections::HashSet;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use serde::Serialize;
use thiserror::Error;

use crate::error::{ErrorContext, StoreError, StoreResult};
use crate::vector::{ChunkId, ClusterId, Embedding, decode_embedding, encode_embedding};

/// Magic bytes to identify ANN snapshot files.
const MAGIC_BYTES: &[u8; 4] = b"QANN";

/// Current snapshot format version.
const ANN_VERSION: u32 = 1;

/// Size of the snapshot header in bytes.
const HEADER_SIZE: usize = 32;

/// Size of one assignment record in bytes.
const ASSIGNMENT_SIZE: usize = 8;

/// Inconsistent centroids or assignments handed to [`AnnState::new`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AnnStateError {
    #[error("centroid dimension {actual} differs from {expected}")]
    CentroidDimension { expected: usize, actual: usize },

    #[error("chunk {chunk} assigned to cluster {cluster} of {clusters}")]
    ClusterOutOfRange {
        chunk: ChunkId,
        cluster: u32,
        clusters: usize,
    },

    #[error("chunk {chunk} assigned twice")]
    DuplicateAssignment { chunk: ChunkId },
}

/// Centroids and chunk-to-cluster assignments produced by one build.
#[derive(Debug, Clone, PartialEq)]
pub struct AnnState {
    dimension: usize,
    centroids: Vec<Embedding>,
    assignments: Vec<(ChunkId, ClusterId)>,
    /// Chunk ids per cluster, indexed by centroid position, in build order.
    members: Vec<Vec<ChunkId>>,
    assigned: HashSet<ChunkId>,
    built_at: i64,
}

/// Summary of an ANN snapshot for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnnStatus {
    pub num_clusters: usize,
    pub num_chunks: usize,
    pub largest_cluster: usize,
    pub smallest_cluster: usize,
    pub dimension: usize,
    pub built_at: i64,
}

impl AnnState {
    /// Creates a snapshot, validating that every assignment points at an
    /// existing centroid and every centroid has the same dimension.
    pub fn new(
        centroids: Vec<Embedding>,
        assignments: Vec<(ChunkId, ClusterId)>,
        built_at: i64,
    ) -> Result<Self, AnnStateError> {
        let dimension = centroids.first().map(Vec::len).unwrap_or(0);
        if let Some(bad) = centroids.iter().find(|c| c.len() != dimension) {
            return Err(AnnStateError::CentroidDimension {
                expected: dimension,
                actual: bad.len(),
            });
        }

        let mut members = vec![Vec::new(); centroids.len()];
        let mut assigned = HashSet::with_capacity(assignments.len());
        for (chunk, cluster) in &assignments {
            let slot = members.get_mut(cluster.index()).ok_or(AnnStateError::ClusterOutOfRange {
                chunk: *chunk,
                cluster: cluster.get(),
                clusters: centroids.len(),
            })?;
            if !assigned.insert(*chunk) {
                return Err(AnnStateError::DuplicateAssignment { chunk: *chunk });
            }
            slot.push(*chunk);
        }

        Ok(Self {
            dimension,
            centroids,
            assignments,
            members,
            assigned,
            built_at,
        })
    }

    #[must_use]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    #[must_use]
    pub fn centroids(&self) -> &[Embedding] {
        &self.centroids
    }

    #[must_use]
    pub fn num_clusters(&self) -> usize {
        self.centroids.len()
    }

    #[must_use]
    pub fn num_chunks(&self) -> usize {
        self.assignments.len()
    }

    #[must_use]
    pub fn built_at(&self) -> i64 {
        self.built_at
    }

    /// Chunk ids assigned to the cluster at `index`.
    #[must_use]
    pub fn members(&self, index: usize) -> &[ChunkId] {
        self.members.get(index).map_or(&[], Vec::as_slice)
    }

    /// Whether `chunk` was present when this snapshot was built.
    #[must_use]
    pub fn is_assigned(&self, chunk: ChunkId) -> bool {
        self.assigned.contains(&chunk)
    }

    #[must_use]
    pub fn assignments(&self) -> &[(ChunkId, ClusterId)] {
        &self.assignments
    }

    #[must_use]
    pub fn status(&self) -> AnnStatus {
        let sizes = self.members.iter().map(Vec::len);
        AnnStatus {
            num_clusters: self.num_clusters(),
            num_chunks: self.num_chunks(),
            largest_cluster: sizes.clone().max().unwrap_or(0),
            smallest_cluster: sizes.min().unwrap_or(0),
            dimension: self.dimension,
            built_at: self.built_at,
        }
    }

    /// Writes the snapshot to `path` via a temporary file and rename.
    pub fn save(&self, path: &Path) -> StoreResult<()> {
        let tmp_path = path.with_extension("bin.tmp");
        {
            let file = File::create(&tmp_path).with_path(&tmp_path)?;
            let mut writer = BufWriter::new(file);
            writer.write_all(&self.to_bytes()).with_path(&tmp_path)?;
            writer.flush().with_path(&tmp_path)?;
            writer.get_ref().sync_all().with_path(&tmp_path)?;
        }
        std::fs::rename(&tmp_path, path).with_path(path)?;
        Ok(())
    }

    /// Loads a snapshot written by [`AnnState::save`].
    pub fn load(path: &Path) -> StoreResult<Self> {
        let bytes = std::fs::read(path).with_path(path)?;
        Self::from_bytes(&bytes).map_err(|reason| StoreError::CorruptFile {
            path: path.to_path_buf(),
            reason,
        })
    }

    fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(
            HEADER_SIZE
                + self.centroids.len() * self.dimension * 4
                + self.assignments.len() * ASSIGNMENT_SIZE,
        );
        bytes.extend_from_slice(MAGIC_BYTES);
        bytes.extend_from_slice(&ANN_VERSION.to_le_bytes());
        bytes.extend_from_slice(&(self.dimension as u32).to_le_bytes());
        bytes.extend_from_slice(&(self.centroids.len() as u32).to_le_bytes());
        bytes.extend_from_slice(&(self.assignments.len() as u32).to_le_bytes());
        bytes.extend_from_slice(&self.built_at.to_le_bytes());
        bytes.extend_from_slice(&[0u8; 4]);

        for centroid in &self.centroids {
            bytes.extend_from_slice(&encode_embedding(centroid));
        }
        for (chunk, cluster) in &self.assignments {
            bytes.extend_from_slice(&chunk.to_bytes());
            bytes.extend_from_slice(&cluster.get().to_le_bytes());
        }
        bytes
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self, String> {
        if bytes.len() < HEADER_SIZE {
            return Err("file too small to contain header".to_string());
        }
        if &bytes[0..4] != MAGIC_BYTES {
            return Err("invalid magic bytes".to_string());
        }

        let read_u32 = |at: usize| {
            u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
        };
        let version = read_u32(4);
        if version != ANN_VERSION {
            return Err(format!("unsupported version {version}, expected {ANN_VERSION}"));
        }
        let dimension = read_u32(8) as usize;
        let k = read_u32(12) as usize;
        let n = read_u32(16) as usize;
        let mut built_at = [0u8; 8];
        built_at.copy_from_slice(&bytes[20..28]);
        let built_at = i64::from_le_bytes(built_at);

        let centroid_bytes = k * dimension * 4;
        let expected = HEADER_SIZE + centroid_bytes + n * ASSIGNMENT_SIZE;
        if bytes.len() != expected {
            return Err(format!(
                "expected {expected} bytes for k={k} n={n} dim={dimension}, found {}",
                bytes.len()
            ));
        }

        let body = &bytes[HEADER_SIZE..HEADER_SIZE + centroid_bytes];
        let centroids = if dimension == 0 {
            vec![Vec::new(); k]
        } else {
            body.chunks_exact(dimension * 4)
                .map(decode_embedding)
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| e.to_string())?
        };

        let mut assignments = Vec::with_capacity(n);
        for record in bytes[HEADER_SIZE + centroid_bytes..].chunks_exact(ASSIGNMENT_SIZE) {
            let chunk = ChunkId::from_bytes([record[0], record[1], record[2], record[3]])
                .ok_or("assignment with zero chunk id")?;
            let cluster = u32::from_le_bytes([record[4], record[5], record[6], record[7]]);
            let cluster = ClusterId::new(cluster).ok_or("assignment with zero cluster id")?;
            assignments.push((chunk, cluster));
        }

        Self::new(centroids, assignments, built_at).map_err(|e| e.to_string())
    }
}
