//! Linear scan: exact brute-force search.
//!
//! The reference behavior every other backend is measured against.

use std::sync::Arc;

use super::traits::{check_query, BackendStats, SearchBackend};
use crate::distance::{cmp_hits, l2_distance_squared};
use crate::error::RetrieveError;
use crate::gallery::Gallery;

/// Brute-force index: one distance per gallery item per query.
pub struct LinearScan {
    gallery: Arc<Gallery>,
}

impl LinearScan {
    /// Wrap a gallery. Nothing is precomputed.
    pub fn new(gallery: Arc<Gallery>) -> Result<Self, RetrieveError> {
        if gallery.is_empty() {
            return Err(RetrieveError::EmptyIndex);
        }
        Ok(Self { gallery })
    }
}

impl SearchBackend for LinearScan {
    fn search(&self, query: &[f32], k: usize) -> Result<Vec<(u32, f32)>, RetrieveError> {
        check_query(query, self.gallery.dimension())?;
        if k == 0 {
            return Ok(Vec::new());
        }

        let mut hits: Vec<(u32, f32)> = self
            .gallery
            .iter()
            .enumerate()
            .map(|(i, (_, v))| (i as u32, l2_distance_squared(query, v)))
            .collect();

        let k = k.min(hits.len());
        if k < hits.len() {
            hits.select_nth_unstable_by(k - 1, cmp_hits);
            hits.truncate(k);
        }
        hits.sort_by(cmp_hits);

        Ok(hits.into_iter().map(|(i, d)| (i, d.sqrt())).collect())
    }

    fn stats(&self) -> BackendStats {
        BackendStats {
            num_vectors: self.gallery.len(),
            dimension: self.gallery.dimension(),
            size_bytes: 0,
            algorithm: "Linear".to_string(),
            exact: true,
        }
    }

    fn dimension(&self) -> usize {
        self.gallery.dimension()
    }

    fn num_vectors(&self) -> usize {
        self.gallery.len()
    }
}
