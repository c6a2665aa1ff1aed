//! Error types for landmark-eval.
//!
//! Two layers: [`RetrieveError`] for index construction and search, and
//! [`EvalError`] for everything that can abort an evaluation run. Every run
//! error names the query or file it came from.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur during indexing/search operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RetrieveError {
    /// Empty query provided.
    #[error("query is empty")]
    EmptyQuery,

    /// Index built over an empty gallery.
    #[error("index is empty")]
    EmptyIndex,

    /// Invalid parameter value.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// Dimension mismatch between query and gallery.
    #[error("dimension mismatch: query has {query_dim} dimensions, gallery has {doc_dim}")]
    DimensionMismatch { query_dim: usize, doc_dim: usize },

    /// The accelerated search path could not be set up.
    #[error("acceleration unavailable: {0}")]
    AccelerationUnavailable(String),
}

/// Errors that abort an evaluation run.
#[derive(Debug, Error)]
pub enum EvalError {
    /// Invalid or missing configuration (fatal at startup).
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A gallery, ground-truth, or query file does not exist.
    #[error("data not found: {}", path.display())]
    DataNotFound { path: PathBuf },

    /// A file exists but its content is malformed.
    #[error("failed to parse {}: {reason}", path.display())]
    Parse { path: PathBuf, reason: String },

    /// A JSON document (gallery or query embeddings) failed to decode.
    #[error("invalid JSON in {}: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// The embedding collaborator could not produce a vector for a query.
    #[error("embedding failed for query {query}: {reason}")]
    Embedding { query: String, reason: String },

    /// The search backend rejected a query.
    #[error("search failed for query {query}: {source}")]
    Search {
        query: String,
        #[source]
        source: RetrieveError,
    },

    /// Backend construction failed.
    #[error("failed to build index: {0}")]
    Index(#[from] RetrieveError),

    /// I/O error other than a missing file.
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl EvalError {
    /// Map an I/O error on `path`, turning `NotFound` into [`EvalError::DataNotFound`].
    pub fn from_io(path: impl Into<PathBuf>, err: std::io::Error) -> Self {
        let path = path.into();
        if err.kind() == std::io::ErrorKind::NotFound {
            EvalError::DataNotFound { path }
        } else {
            EvalError::Io { path, source: err }
        }
    }
}

pub type Result<T> = std::result::Result<T, RetrieveError>;

/// Result type for evaluation runs.
pub type EvalResult<T> = std::result::Result<T, EvalError>;
