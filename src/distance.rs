//! Distance kernels for dense vectors.
//!
//! Every backend ranks by squared Euclidean distance computed with
//! [`l2_distance_squared`]. Exact backends must call the same kernel over the
//! same element order so that equal inputs produce bit-identical distances;
//! the KD-tree's exactness against the linear scan depends on it.
//!
//! ## Important nuance
//!
//! The flat index uses the norm expansion `|q|^2 + |x|^2 - 2<q,x>` instead,
//! which is faster for batched scans but may differ from the direct kernel in
//! the last few ulps. Its results are exact up to that rounding, not bitwise.

/// Dot product of two vectors.
#[inline]
#[must_use]
pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Squared L2 distance (preserves ordering, skips the sqrt).
///
/// If dimensions mismatch, this returns `f32::INFINITY` (so it is never selected as a
/// nearest neighbor).
#[inline]
#[must_use]
pub fn l2_distance_squared(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return f32::INFINITY;
    }
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}

/// L2 (Euclidean) distance.
#[inline]
#[must_use]
pub fn l2_distance(a: &[f32], b: &[f32]) -> f32 {
    l2_distance_squared(a, b).sqrt()
}

/// Total order on `(distance, gallery index)` pairs.
///
/// Ties on distance fall back to insertion order, which keeps rankings
/// deterministic across backends.
#[inline]
pub(crate) fn cmp_hits(a: &(u32, f32), b: &(u32, f32)) -> std::cmp::Ordering {
    a.1.total_cmp(&b.1).then(a.0.cmp(&b.0))
}
