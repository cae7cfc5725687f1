//! Shared numeric kernels for similarity and distance.
//!
//! Embeddings are expected, but not required, to be unit-normalized. Every
//! function here tolerates zero vectors: similarity against a zero vector is
//! defined as 0 rather than NaN.

/// Epsilon below which a norm is treated as zero.
const EPSILON: f32 = 1e-10;

/// Dot product of two equal-length vectors.
#[inline]
pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len(), "Vectors must have same dimension");
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Euclidean norm of a vector.
#[inline]
pub fn norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Squared Euclidean distance.
///
/// Used by the coarse quantizer: for unit vectors, ordering by squared
/// distance equals ordering by cosine similarity.
#[inline]
pub fn squared_euclidean(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len(), "Vectors must have same dimension");
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}

/// Cosine similarity when both norms are already known.
///
/// Lets callers that compare one vector against many hoist the norm
/// computation out of the inner loop.
#[inline]
pub fn cosine_with_norms(a: &[f32], norm_a: f32, b: &[f32], norm_b: f32) -> f32 {
    if norm_a < EPSILON || norm_b < EPSILON {
        0.0
    } else {
        dot(a, b) / (norm_a * norm_b)
    }
}

/// Normalizes a vector in-place to unit length.
pub fn normalize_vector(vector: &mut [f32]) {
    let n = norm(vector);
    if n > EPSILON {
        for value in vector.iter_mut() {
            *value /= n;
        }
    }
    // If norm is too small, leave vector as-is (effectively zero vector)
}
