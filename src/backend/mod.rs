//! Pluggable nearest-neighbor search backends.
//!
//! All backends rank by Euclidean distance, ascending, ties broken by gallery
//! insertion order:
//!
//! | Backend | Kind | Guarantee |
//! |---------|------|-----------|
//! | [`LinearScan`] | `none` | exact, reference ordering |
//! | [`KdTreeIndex`] | `exact-tree` | exact, identical to the linear scan |
//! | [`LshIndex`] | `hash` | approximate, candidates from colliding buckets |
//! | [`FlatIndex`] | `approximate-flat` | exact up to rounding, optionally parallel |
//!
//! The backend is chosen once per run via [`BackendKind`] and wrapped in a
//! [`SearchIndex`], which translates gallery positions into identifiers.
//!
//! ```rust
//! use std::sync::Arc;
//! use landmark_eval::backend::{BackendKind, BackendParams, SearchIndex};
//! use landmark_eval::Gallery;
//!
//! let gallery = Gallery::from_pairs([
//!     ("A", vec![0.0, 0.0]),
//!     ("B", vec![1.0, 0.0]),
//!     ("C", vec![2.0, 0.0]),
//! ])?;
//! let index = SearchIndex::build(BackendKind::Linear, Arc::new(gallery), &BackendParams::default())?;
//! assert_eq!(index.query(&[0.1, 0.0], 3)?, vec!["A", "B", "C"]);
//! # Ok::<(), landmark_eval::RetrieveError>(())
//! ```

pub mod flat;
pub mod kdtree;
pub mod linear;
pub mod lsh;
pub mod traits;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;

use serde::Deserialize;
use tracing::info;

pub use flat::{FlatIndex, FlatParams};
pub use kdtree::{KdTreeIndex, KdTreeParams};
pub use linear::LinearScan;
pub use lsh::{LshIndex, LshParams};
pub use traits::{BackendStats, SearchBackend};

use crate::error::RetrieveError;
use crate::gallery::{Gallery, Identifier};

/// Which backend a run uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(try_from = "String")]
pub enum BackendKind {
    /// Brute-force linear scan.
    #[default]
    Linear,
    /// Exact KD-tree.
    KdTree,
    /// Random-projection LSH.
    Lsh,
    /// Flat batched index.
    Flat,
}

impl BackendKind {
    /// Canonical configuration name.
    pub fn as_str(self) -> &'static str {
        match self {
            BackendKind::Linear => "none",
            BackendKind::KdTree => "exact-tree",
            BackendKind::Lsh => "hash",
            BackendKind::Flat => "approximate-flat",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = RetrieveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" | "linear" => Ok(BackendKind::Linear),
            "exact-tree" | "kdtree" => Ok(BackendKind::KdTree),
            "hash" | "lsh" => Ok(BackendKind::Lsh),
            "approximate-flat" | "flat" | "faiss" => Ok(BackendKind::Flat),
            other => Err(RetrieveError::InvalidParameter(format!(
                "unknown backend '{other}' (expected none, exact-tree, hash, approximate-flat)"
            ))),
        }
    }
}

impl TryFrom<String> for BackendKind {
    type Error = RetrieveError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

/// Per-backend tuning, only the selected backend's section is read.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BackendParams {
    pub kdtree: KdTreeParams,
    pub lsh: LshParams,
    pub flat: FlatParams,
}

/// Build the backend selected by `kind`.
pub fn build_backend(
    kind: BackendKind,
    gallery: Arc<Gallery>,
    params: &BackendParams,
) -> Result<Box<dyn SearchBackend>, RetrieveError> {
    Ok(match kind {
        BackendKind::Linear => Box::new(LinearScan::new(gallery)?),
        BackendKind::KdTree => Box::new(KdTreeIndex::build(gallery, params.kdtree.clone())?),
        BackendKind::Lsh => Box::new(LshIndex::build(gallery, params.lsh.clone())?),
        BackendKind::Flat => Box::new(FlatIndex::build(gallery, params.flat.clone())?),
    })
}

/// A built backend plus the gallery it ranks, answering in identifiers.
pub struct SearchIndex {
    gallery: Arc<Gallery>,
    backend: Box<dyn SearchBackend>,
    kind: BackendKind,
}

impl SearchIndex {
    /// Build once; the result is read-only.
    pub fn build(
        kind: BackendKind,
        gallery: Arc<Gallery>,
        params: &BackendParams,
    ) -> Result<Self, RetrieveError> {
        let start = Instant::now();
        let backend = build_backend(kind, gallery.clone(), params)?;
        let stats = backend.stats();
        info!(
            backend = %kind,
            algorithm = %stats.algorithm,
            vectors = stats.num_vectors,
            dimension = stats.dimension,
            overhead_bytes = stats.size_bytes,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "built search backend"
        );
        Ok(Self {
            gallery,
            backend,
            kind,
        })
    }

    /// Ranked identifiers of the nearest gallery items.
    pub fn query(&self, vector: &[f32], k: usize) -> Result<Vec<Identifier>, RetrieveError> {
        Ok(self
            .backend
            .search(vector, k)?
            .into_iter()
            .map(|(idx, _)| self.gallery.id(idx as usize).to_string())
            .collect())
    }

    pub fn kind(&self) -> BackendKind {
        self.kind
    }

    pub fn gallery(&self) -> &Gallery {
        &self.gallery
    }

    pub fn stats(&self) -> BackendStats {
        self.backend.stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_config_names_and_aliases() {
        assert_eq!("none".parse::<BackendKind>().unwrap(), BackendKind::Linear);
        assert_eq!("exact-tree".parse::<BackendKind>().unwrap(), BackendKind::KdTree);
        assert_eq!("KDTREE".parse::<BackendKind>().unwrap(), BackendKind::KdTree);
        assert_eq!("lsh".parse::<BackendKind>().unwrap(), BackendKind::Lsh);
        assert_eq!("faiss".parse::<BackendKind>().unwrap(), BackendKind::Flat);
        assert!("annoy".parse::<BackendKind>().is_err());
    }

    #[test]
    fn display_round_trips_through_from_str() {
        for kind in [BackendKind::Linear, BackendKind::KdTree, BackendKind::Lsh, BackendKind::Flat] {
            assert_eq!(kind.to_string().parse::<BackendKind>().unwrap(), kind);
        }
    }

    #[test]
    fn every_backend_finds_the_exact_match() {
        let gallery = Arc::new(
            Gallery::from_pairs((0..64).map(|i| {
                let x = i as f32;
                (format!("img_{i}"), vec![x.sin(), x.cos(), x * 0.1])
            }))
            .unwrap(),
        );
        let q = gallery.vector(21).to_vec();
        for kind in [BackendKind::Linear, BackendKind::KdTree, BackendKind::Lsh, BackendKind::Flat] {
            let index = SearchIndex::build(kind, gallery.clone(), &BackendParams::default()).unwrap();
            let ranked = index.query(&q, 5).unwrap();
            assert_eq!(ranked[0], "img_21", "{kind}");
        }
    }

    #[test]
    fn empty_gallery_is_rejected() {
        let gallery = Arc::new(Gallery::new(3).unwrap());
        for kind in [BackendKind::Linear, BackendKind::KdTree, BackendKind::Lsh, BackendKind::Flat] {
            assert!(matches!(
                build_backend(kind, gallery.clone(), &BackendParams::default()),
                Err(RetrieveError::EmptyIndex)
            ));
        }
    }
}
