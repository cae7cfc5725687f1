//! Binary embedding encoding.
//!
//! An embedding is persisted as a contiguous sequence of little-endian
//! IEEE-754 `f32` values with no header; the element count is
//! `byte_len / 4`. Index files written by other runtimes use the same layout.

use crate::vector::types::{Embedding, VectorError};

/// Number of bytes per f32 value.
pub const BYTES_PER_F32: usize = 4;

/// Encodes an embedding into its little-endian byte blob.
#[must_use]
pub fn encode_embedding(vector: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vector.len() * BYTES_PER_F32);
    for value in vector {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

/// Decodes a little-endian byte blob into an embedding.
pub fn decode_embedding(bytes: &[u8]) -> Result<Embedding, VectorError> {
    if bytes.len() % BYTES_PER_F32 != 0 {
        return Err(VectorError::InvalidBlob {
            byte_len: bytes.len(),
        });
    }

    Ok(bytes
        .chunks_exact(BYTES_PER_F32)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

/// Encodes a multi-vector (page patches) as one blob of concatenated vectors.
#[must_use]
pub fn encode_multi(vectors: &[Embedding]) -> Vec<u8> {
    let total: usize = vectors.iter().map(Vec::len).sum();
    let mut bytes = Vec::with_capacity(total * BYTES_PER_F32);
    for vector in vectors {
        for value in vector {
            bytes.extend_from_slice(&value.to_le_bytes());
        }
    }
    bytes
}

/// Decodes a concatenated multi-vector blob into `byte_len / 4 / dimension`
/// vectors of `dimension` elements each.
pub fn decode_multi(bytes: &[u8], dimension: usize) -> Result<Vec<Embedding>, VectorError> {
    let flat = decode_embedding(bytes)?;
    if dimension == 0 || flat.len() % dimension != 0 {
        return Err(VectorError::DimensionMismatch {
            expected: dimension,
            actual: flat.len(),
        });
    }
    Ok(flat.chunks_exact(dimension).map(<[f32]>::to_vec).collect())
}
