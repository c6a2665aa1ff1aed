//! Unified trait for all search backends.

use crate::error::RetrieveError;

/// A nearest-neighbor index over a fixed gallery.
///
/// Backends are built once and never mutated afterwards, so `search` takes
/// `&self` and implementations must be shareable across worker threads.
pub trait SearchBackend: Send + Sync {
    /// Search for the `k` nearest gallery items.
    ///
    /// Returns `(gallery index, L2 distance)` pairs in ascending distance,
    /// ties broken by gallery index. Exact backends return
    /// `min(k, num_vectors())` hits; approximate ones may return fewer.
    fn search(&self, query: &[f32], k: usize) -> Result<Vec<(u32, f32)>, RetrieveError>;

    /// Get index statistics.
    fn stats(&self) -> BackendStats;

    /// Get vector dimension.
    fn dimension(&self) -> usize;

    /// Get number of vectors.
    fn num_vectors(&self) -> usize;
}

/// Statistics about a built backend.
#[derive(Debug, Clone)]
pub struct BackendStats {
    pub num_vectors: usize,
    pub dimension: usize,
    /// Index structure overhead beyond the shared gallery vectors (approximate).
    pub size_bytes: usize,
    pub algorithm: String,
    /// Whether results are guaranteed to match the linear scan.
    pub exact: bool,
}

/// Shared argument checks for `search` implementations.
pub(crate) fn check_query(query: &[f32], dimension: usize) -> Result<(), RetrieveError> {
    if query.is_empty() {
        return Err(RetrieveError::EmptyQuery);
    }
    if query.len() != dimension {
        return Err(RetrieveError::DimensionMismatch {
            query_dim: query.len(),
            doc_dim: dimension,
        });
    }
    Ok(())
}
