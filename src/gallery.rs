//! Gallery of pre-computed embeddings.
//!
//! The gallery is built once at startup and shared read-only by every query.
//! Vectors live in one flat buffer (SoA), indexed by insertion order; that
//! order is what backends use to break distance ties.
//!
//! # On-disk format
//!
//! ```json
//! { "names": ["paris_eiffel_000001.jpg", [112, 97, 114, ...]],
//!   "features": [[0.12, 0.03, ...], [0.40, 0.11, ...]] }
//! ```
//!
//! Names may be plain strings or UTF-8 byte arrays (as written by tools that
//! store identifiers as raw bytes). Either way they are decoded here and the
//! rest of the crate only sees plain [`Identifier`] strings.

use std::path::Path;

use serde::Deserialize;
use tracing::info;

use crate::error::{EvalError, EvalResult, RetrieveError};

/// Stable gallery item identifier: the source file name without extension.
pub type Identifier = String;

/// Derive an identifier from a source file name.
///
/// Everything from the first `.` on is dropped, so `"louvre_000012.jpg"`
/// becomes `"louvre_000012"`.
pub fn identifier_from_name(name: &str) -> Identifier {
    name.split('.').next().unwrap_or(name).to_string()
}

/// Ordered, immutable collection of (identifier, embedding) pairs.
#[derive(Debug, Clone)]
pub struct Gallery {
    ids: Vec<Identifier>,
    vectors: Vec<f32>,
    dimension: usize,
}

impl Gallery {
    /// Create an empty gallery for vectors of `dimension` components.
    pub fn new(dimension: usize) -> Result<Self, RetrieveError> {
        if dimension == 0 {
            return Err(RetrieveError::InvalidParameter(
                "dimension must be greater than 0".to_string(),
            ));
        }
        Ok(Self {
            ids: Vec::new(),
            vectors: Vec::new(),
            dimension,
        })
    }

    /// Build a gallery from `(identifier, vector)` pairs.
    ///
    /// The dimension is taken from the first vector.
    pub fn from_pairs<I, S>(pairs: I) -> Result<Self, RetrieveError>
    where
        I: IntoIterator<Item = (S, Vec<f32>)>,
        S: Into<Identifier>,
    {
        let mut iter = pairs.into_iter().peekable();
        let dimension = iter
            .peek()
            .map(|(_, v)| v.len())
            .ok_or(RetrieveError::EmptyIndex)?;
        let mut gallery = Self::new(dimension)?;
        for (id, vector) in iter {
            gallery.push(id, &vector)?;
        }
        Ok(gallery)
    }

    /// Append one item.
    pub fn push(&mut self, id: impl Into<Identifier>, vector: &[f32]) -> Result<(), RetrieveError> {
        if vector.len() != self.dimension {
            return Err(RetrieveError::DimensionMismatch {
                query_dim: vector.len(),
                doc_dim: self.dimension,
            });
        }
        self.ids.push(id.into());
        self.vectors.extend_from_slice(vector);
        Ok(())
    }

    /// Load a gallery from the JSON format described in the module docs.
    pub fn load_json(path: impl AsRef<Path>) -> EvalResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| EvalError::from_io(path, e))?;
        let file: GalleryFile = serde_json::from_str(&raw).map_err(|source| EvalError::Json {
            path: path.to_path_buf(),
            source,
        })?;

        let parse_err = |reason: String| EvalError::Parse {
            path: path.to_path_buf(),
            reason,
        };

        if file.names.len() != file.features.len() {
            return Err(parse_err(format!(
                "{} names but {} feature vectors",
                file.names.len(),
                file.features.len()
            )));
        }

        let dimension = file
            .features
            .first()
            .map(Vec::len)
            .ok_or_else(|| parse_err("gallery is empty".to_string()))?;
        let mut gallery = Self::new(dimension).map_err(|e| parse_err(e.to_string()))?;

        for (i, (name, vector)) in file.names.into_iter().zip(file.features).enumerate() {
            let name = name
                .decode()
                .map_err(|e| parse_err(format!("name #{i}: {e}")))?;
            gallery
                .push(identifier_from_name(&name), &vector)
                .map_err(|e| parse_err(format!("vector #{i} ({name}): {e}")))?;
        }

        info!(
            path = %path.display(),
            items = gallery.len(),
            dimension = gallery.dimension(),
            "loaded gallery"
        );
        Ok(gallery)
    }

    /// Number of items.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Whether the gallery holds no items.
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Vector dimension.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Identifier at insertion position `idx`.
    pub fn id(&self, idx: usize) -> &str {
        &self.ids[idx]
    }

    /// All identifiers, in insertion order.
    pub fn ids(&self) -> &[Identifier] {
        &self.ids
    }

    /// Vector at insertion position `idx`.
    pub fn vector(&self, idx: usize) -> &[f32] {
        let start = idx * self.dimension;
        &self.vectors[start..start + self.dimension]
    }

    /// Position of `id`, if present. Linear in gallery size.
    pub fn position(&self, id: &str) -> Option<usize> {
        self.ids.iter().position(|x| x == id)
    }

    /// Iterate `(identifier, vector)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[f32])> {
        self.ids
            .iter()
            .map(String::as_str)
            .zip(self.vectors.chunks_exact(self.dimension))
    }
}

#[derive(Deserialize)]
struct GalleryFile {
    names: Vec<RawName>,
    features: Vec<Vec<f32>>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawName {
    Text(String),
    Bytes(Vec<u8>),
}

impl RawName {
    fn decode(self) -> Result<String, std::string::FromUtf8Error> {
        match self {
            RawName::Text(s) => Ok(s),
            RawName::Bytes(b) => String::from_utf8(b),
        }
    }
}
