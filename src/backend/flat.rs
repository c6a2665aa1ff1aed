//! Flat index: exhaustive search tuned for batched distance computation.
//!
//! Vectors stay in one contiguous buffer with precomputed squared norms, and
//! each query computes `|q|^2 + |x|^2 - 2<q,x>` for every row. With the
//! `parallel` feature the scan is spread over a dedicated thread pool.
//!
//! The accelerated path is probed once, at build time. If it cannot be set up
//! the index logs a single warning and scans serially for the rest of the run.
//!
//! # Search width
//!
//! `search_width` fixes the number of results independently of the caller's
//! `k`. Leaving it unset (the default) honours `k` like every other backend;
//! setting it reproduces tools that always fetch a fixed-size result list.

use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, warn};

use super::traits::{check_query, BackendStats, SearchBackend};
use crate::distance::{cmp_hits, dot};
use crate::error::RetrieveError;
use crate::gallery::Gallery;

/// Flat index parameters.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct FlatParams {
    /// Fixed result count overriding the requested `k`.
    pub search_width: Option<usize>,
    /// Try the parallel scan path.
    pub accelerate: bool,
}

impl Default for FlatParams {
    fn default() -> Self {
        Self {
            search_width: None,
            accelerate: true,
        }
    }
}

enum ScanMode {
    Serial,
    #[cfg(feature = "parallel")]
    Parallel(rayon::ThreadPool),
}

/// Flat L2 index.
pub struct FlatIndex {
    gallery: Arc<Gallery>,
    norms: Vec<f32>,
    params: FlatParams,
    mode: ScanMode,
}

impl FlatIndex {
    /// Precompute norms and select the scan path.
    pub fn build(gallery: Arc<Gallery>, params: FlatParams) -> Result<Self, RetrieveError> {
        Self::build_with_probe(gallery, params, probe_accelerator)
    }

    fn build_with_probe(
        gallery: Arc<Gallery>,
        params: FlatParams,
        probe: impl FnOnce() -> Result<ScanMode, RetrieveError>,
    ) -> Result<Self, RetrieveError> {
        if params.search_width == Some(0) {
            return Err(RetrieveError::InvalidParameter(
                "search_width must be greater than 0".to_string(),
            ));
        }
        if gallery.is_empty() {
            return Err(RetrieveError::EmptyIndex);
        }

        let norms = gallery.iter().map(|(_, v)| dot(v, v)).collect();
        let mode = select_mode(params.accelerate, probe);

        if let Some(width) = params.search_width {
            warn!(width, "flat search_width is set; requested k is ignored");
        }

        Ok(Self {
            gallery,
            norms,
            params,
            mode,
        })
    }

    /// Whether queries run on the parallel path.
    pub fn is_accelerated(&self) -> bool {
        !matches!(self.mode, ScanMode::Serial)
    }

    fn row_distance(&self, query: &[f32], query_norm: f32, idx: usize) -> (u32, f32) {
        let d = query_norm + self.norms[idx] - 2.0 * dot(query, self.gallery.vector(idx));
        (idx as u32, d.max(0.0))
    }

    fn scan(&self, query: &[f32]) -> Vec<(u32, f32)> {
        let query_norm = dot(query, query);
        let n = self.gallery.len();
        match &self.mode {
            ScanMode::Serial => (0..n).map(|i| self.row_distance(query, query_norm, i)).collect(),
            #[cfg(feature = "parallel")]
            ScanMode::Parallel(pool) => {
                use rayon::prelude::*;
                pool.install(|| {
                    (0..n)
                        .into_par_iter()
                        .map(|i| self.row_distance(query, query_norm, i))
                        .collect()
                })
            }
        }
    }
}

/// Serial unless acceleration is requested and the probe succeeds. A failed
/// probe is logged once here and never reaches the caller.
fn select_mode(
    accelerate: bool,
    probe: impl FnOnce() -> Result<ScanMode, RetrieveError>,
) -> ScanMode {
    if !accelerate {
        return ScanMode::Serial;
    }
    match probe() {
        Ok(mode) => mode,
        Err(e) => {
            warn!(error = %e, "flat index falling back to serial scan");
            ScanMode::Serial
        }
    }
}

#[cfg(feature = "parallel")]
fn probe_accelerator() -> Result<ScanMode, RetrieveError> {
    let threads = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    if threads < 2 {
        return Err(RetrieveError::AccelerationUnavailable(
            "only one hardware thread available".to_string(),
        ));
    }
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .thread_name(|i| format!("flat-scan-{i}"))
        .build()
        .map_err(|e| RetrieveError::AccelerationUnavailable(e.to_string()))?;
    tracing::info!(threads, "flat index using parallel scan");
    Ok(ScanMode::Parallel(pool))
}

#[cfg(not(feature = "parallel"))]
fn probe_accelerator() -> Result<ScanMode, RetrieveError> {
    Err(RetrieveError::AccelerationUnavailable(
        "built without the `parallel` feature".to_string(),
    ))
}

impl SearchBackend for FlatIndex {
    fn search(&self, query: &[f32], k: usize) -> Result<Vec<(u32, f32)>, RetrieveError> {
        check_query(query, self.gallery.dimension())?;
        let width = match self.params.search_width {
            Some(w) => {
                if w != k {
                    debug!(requested = k, width = w, "flat search width overrides k");
                }
                w
            }
            None => k,
        };
        if width == 0 {
            return Ok(Vec::new());
        }

        let mut hits = self.scan(query);
        let width = width.min(hits.len());
        if width < hits.len() {
            hits.select_nth_unstable_by(width - 1, cmp_hits);
            hits.truncate(width);
        }
        hits.sort_by(cmp_hits);

        Ok(hits.into_iter().map(|(i, d)| (i, d.sqrt())).collect())
    }

    fn stats(&self) -> BackendStats {
        BackendStats {
            num_vectors: self.gallery.len(),
            dimension: self.gallery.dimension(),
            size_bytes: self.norms.len() * std::mem::size_of::<f32>(),
            algorithm: if self.is_accelerated() {
                "Flat(parallel)".to_string()
            } else {
                "Flat".to_string()
            },
            exact: self.params.search_width.is_none(),
        }
    }

    fn dimension(&self) -> usize {
        self.gallery.dimension()
    }

    fn num_vectors(&self) -> usize {
        self.gallery.len()
    }
}
