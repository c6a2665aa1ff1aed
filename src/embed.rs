//! Query embedding collaborators.
//!
//! Feature extraction itself (decode image, crop, run a model) happens outside
//! this crate. The evaluator only needs something that turns a [`QuerySpec`]
//! into a vector of the gallery's dimension, deterministically, and that fails
//! loudly instead of returning a placeholder.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::info;

use crate::error::{EvalError, EvalResult};
use crate::gallery::Gallery;
use crate::relevance::QuerySpec;

/// Produces the query embedding for one benchmark query.
pub trait QueryEmbedder: Send + Sync {
    fn embed(&self, query: &QuerySpec) -> EvalResult<Vec<f32>>;
}

impl<F> QueryEmbedder for F
where
    F: Fn(&QuerySpec) -> EvalResult<Vec<f32>> + Send + Sync,
{
    fn embed(&self, query: &QuerySpec) -> EvalResult<Vec<f32>> {
        self(query)
    }
}

/// Query embeddings extracted ahead of time, keyed by query name.
///
/// File format: `{ "eiffel_1": [0.1, ...], "eiffel_2": [...] }`.
#[derive(Debug, Clone, Default)]
pub struct PrecomputedEmbedder {
    vectors: HashMap<String, Vec<f32>>,
}

impl PrecomputedEmbedder {
    pub fn new(vectors: HashMap<String, Vec<f32>>) -> Self {
        Self { vectors }
    }

    pub fn load_json(path: impl AsRef<Path>) -> EvalResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| EvalError::from_io(path, e))?;
        let vectors: HashMap<String, Vec<f32>> =
            serde_json::from_str(&raw).map_err(|source| EvalError::Json {
                path: path.to_path_buf(),
                source,
            })?;
        info!(path = %path.display(), queries = vectors.len(), "loaded query embeddings");
        Ok(Self { vectors })
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }
}

impl QueryEmbedder for PrecomputedEmbedder {
    fn embed(&self, query: &QuerySpec) -> EvalResult<Vec<f32>> {
        self.vectors
            .get(&query.name)
            .cloned()
            .ok_or_else(|| EvalError::Embedding {
                query: query.name.clone(),
                reason: "no precomputed embedding".to_string(),
            })
    }
}

/// Uses the gallery vector of the query's source image, ignoring the crop.
///
/// Useful as a smoke test of the pipeline: every query then retrieves its own
/// source image first. A source image absent from the gallery is
/// [`EvalError::DataNotFound`].
#[derive(Debug, Clone)]
pub struct GalleryEmbedder {
    gallery: Arc<Gallery>,
}

impl GalleryEmbedder {
    pub fn new(gallery: Arc<Gallery>) -> Self {
        Self { gallery }
    }
}

impl QueryEmbedder for GalleryEmbedder {
    fn embed(&self, query: &QuerySpec) -> EvalResult<Vec<f32>> {
        let idx = self
            .gallery
            .position(&query.image)
            .ok_or_else(|| EvalError::DataNotFound {
                path: PathBuf::from(&query.image),
            })?;
        Ok(self.gallery.vector(idx).to_vec())
    }
}
