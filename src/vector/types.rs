//! Type-safe identifiers and core types for the vector layer.
//!
//! Identifiers are newtypes over `NonZeroU32` so that a zeroed record in a
//! storage file is never mistaken for a valid chunk, page, or cluster.

use serde::{Deserialize, Serialize};
use std::num::NonZeroU32;
use thiserror::Error;

/// A fixed-length single-precision embedding vector.
pub type Embedding = Vec<f32>;

/// Type-safe wrapper for chunk IDs.
///
/// Chunk IDs are assigned sequentially by the store starting at 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct ChunkId(NonZeroU32);

impl ChunkId {
    /// Creates a new `ChunkId` from a non-zero u32.
    ///
    /// Returns `None` if the provided ID is zero.
    #[must_use]
    pub fn new(id: u32) -> Option<Self> {
        NonZeroU32::new(id).map(Self)
    }

    /// Creates a new `ChunkId` from a non-zero u32, panicking if zero.
    ///
    /// # Panics
    /// Panics if `id` is zero. Use `new()` for fallible construction.
    #[must_use]
    pub fn new_unchecked(id: u32) -> Self {
        Self(NonZeroU32::new(id).expect("ChunkId cannot be zero"))
    }

    /// Returns the underlying u32 value.
    #[must_use]
    pub fn get(&self) -> u32 {
        self.0.get()
    }

    /// Converts to little-endian bytes for storage.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; 4] {
        self.0.get().to_le_bytes()
    }

    /// Creates from little-endian bytes.
    ///
    /// Returns `None` if the bytes represent zero.
    #[must_use]
    pub fn from_bytes(bytes: [u8; 4]) -> Option<Self> {
        Self::new(u32::from_le_bytes(bytes))
    }
}

impl std::fmt::Display for ChunkId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Type-safe wrapper for rendered page IDs in the vision lane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct PageId(NonZeroU32);

impl PageId {
    /// Creates a new `PageId` from a non-zero u32.
    #[must_use]
    pub fn new(id: u32) -> Option<Self> {
        NonZeroU32::new(id).map(Self)
    }

    /// Creates a new `PageId` from a non-zero u32, panicking if zero.
    ///
    /// # Panics
    /// Panics if `id` is zero. Use `new()` for fallible construction.
    #[must_use]
    pub fn new_unchecked(id: u32) -> Self {
        Self(NonZeroU32::new(id).expect("PageId cannot be zero"))
    }

    /// Returns the underlying u32 value.
    #[must_use]
    pub fn get(&self) -> u32 {
        self.0.get()
    }
}

macro_rules! impl_u32_conversions {
    ($ty:ident) => {
        impl TryFrom<u32> for $ty {
            type Error = String;

            fn try_from(value: u32) -> Result<Self, Self::Error> {
                Self::new(value).ok_or_else(|| format!("{} cannot be zero", stringify!($ty)))
            }
        }

        impl From<$ty> for u32 {
            fn from(id: $ty) -> u32 {
                id.get()
            }
        }
    };
}

impl_u32_conversions!(ChunkId);
impl_u32_conversions!(PageId);

impl std::fmt::Display for PageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Type-safe wrapper for cluster IDs in the coarse quantizer.
///
/// Cluster IDs are 1-based; cluster `n` owns centroid `n - 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClusterId(NonZeroU32);

impl ClusterId {
    /// Creates a new `ClusterId` from a non-zero u32.
    ///
    /// Returns `None` if the provided ID is zero.
    #[must_use]
    pub fn new(id: u32) -> Option<Self> {
        NonZeroU32::new(id).map(Self)
    }

    /// Creates the cluster ID owning the centroid at `index`.
    #[must_use]
    pub fn from_index(index: usize) -> Self {
        Self(NonZeroU32::MIN.saturating_add(index as u32))
    }

    /// Returns the underlying u32 value.
    #[must_use]
    pub fn get(&self) -> u32 {
        self.0.get()
    }

    /// Returns the zero-based centroid index for this cluster.
    #[must_use]
    pub fn index(&self) -> usize {
        (self.0.get() - 1) as usize
    }
}

/// Type-safe wrapper for vector dimensions.
///
/// All embeddings within one index share a dimension; this type is the
/// single place where that invariant is checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VectorDimension(usize);

impl VectorDimension {
    /// Creates a new `VectorDimension` with validation.
    ///
    /// Returns an error if the dimension is zero.
    pub fn new(dim: usize) -> Result<Self, VectorError> {
        if dim == 0 {
            return Err(VectorError::InvalidDimension {
                dimension: 0,
                reason: "Vector dimension cannot be zero",
            });
        }
        Ok(Self(dim))
    }

    /// Returns the underlying dimension value.
    #[must_use]
    pub const fn get(&self) -> usize {
        self.0
    }

    /// Validates that a vector has the expected dimension.
    pub fn validate_vector(&self, vector: &[f32]) -> Result<(), VectorError> {
        if vector.len() != self.0 {
            return Err(VectorError::DimensionMismatch {
                expected: self.0,
                actual: vector.len(),
            });
        }
        Ok(())
    }
}

impl std::fmt::Display for VectorDimension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Errors that can occur during vector operations.
///
/// All error messages include actionable suggestions for resolution.
#[derive(Error, Debug)]
pub enum VectorError {
    #[error(
        "Vector dimension mismatch: expected {expected}, got {actual}\nSuggestion: Ensure the query and the index use the same embedding model"
    )]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Invalid vector dimension: {dimension}\nReason: {reason}")]
    InvalidDimension {
        dimension: usize,
        reason: &'static str,
    },

    #[error(
        "Invalid embedding blob: {byte_len} bytes is not a whole number of f32 values\nSuggestion: The embedding file may be truncated, rebuild the index"
    )]
    InvalidBlob { byte_len: usize },

    #[error("Storage error: {0}\nSuggestion: Check disk space and file permissions")]
    Storage(#[from] std::io::Error),

    #[error(
        "Serialization error: {0}\nSuggestion: Check that vector data is valid and not corrupted"
    )]
    Serialization(String),

    #[error(
        "Invalid storage version: expected {expected}, got {actual}\nSuggestion: Rebuild the index with this version of quarry"
    )]
    VersionMismatch { expected: u32, actual: u32 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_id_construction() {
        let id = ChunkId::new(42).unwrap();
        assert_eq!(id.get(), 42);
        assert!(ChunkId::new(0).is_none());

        let id = ChunkId::new_unchecked(100);
        assert_eq!(id.get(), 100);
    }

    #[test]
    #[should_panic(expected = "ChunkId cannot be zero")]
    fn test_chunk_id_unchecked_panic() {
        let _ = ChunkId::new_unchecked(0);
    }

    #[test]
    fn test_chunk_id_bytes() {
        let id = ChunkId::new(12345).unwrap();
        assert_eq!(ChunkId::from_bytes(id.to_bytes()), Some(id));
        assert_eq!(ChunkId::from_bytes([0, 0, 0, 0]), None);
    }

    #[test]
    fn test_ids_serialize_as_plain_integers() {
        let id = ChunkId::new(7).unwrap();
        assert_eq!(serde_json::to_string(&id).unwrap(), "7");
        assert_eq!(serde_json::from_str::<ChunkId>("7").unwrap(), id);
        assert!(serde_json::from_str::<PageId>("0").is_err());
    }

    #[test]
    fn test_cluster_id_index_round_trip() {
        let id = ClusterId::from_index(0);
        assert_eq!(id.get(), 1);
        assert_eq!(id.index(), 0);

        let id = ClusterId::from_index(41);
        assert_eq!(id.get(), 42);
        assert_eq!(id.index(), 41);

        assert!(ClusterId::new(0).is_none());
    }

    #[test]
    fn test_vector_dimension() {
        let dim = VectorDimension::new(384).unwrap();
        assert_eq!(dim.get(), 384);
        assert!(VectorDimension::new(0).is_err());

        assert!(dim.validate_vector(&vec![0.1; 384]).is_ok());
        assert!(matches!(
            dim.validate_vector(&vec![0.1; 100]),
            Err(VectorError::DimensionMismatch {
                expected: 384,
                actual: 100
            })
        ));
    }
}
