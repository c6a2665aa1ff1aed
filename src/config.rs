//! Run configuration.
//!
//! Read from an optional TOML file, then overridden by command-line flags.
//!
//! ```toml
//! backend = "exact-tree"
//! top_k = 100
//! gallery_path = "data/paris_gallery.json"
//! ground_truth_dir = "data/paris_groundtruth"
//! query_embeddings = "data/paris_queries.json"
//! workers = 4
//!
//! [kdtree]
//! leaf_size = 32
//!
//! [lsh]
//! hash_bits = 8
//! num_tables = 2
//!
//! [flat]
//! search_width = 30
//! ```

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::backend::{BackendKind, BackendParams};
use crate::error::{EvalError, EvalResult};

/// Landmarks of the Paris benchmark, in evaluation order.
pub const PARIS_LANDMARKS: [&str; 11] = [
    "defense",
    "eiffel",
    "invalides",
    "louvre",
    "moulinrouge",
    "museedorsay",
    "notredame",
    "pantheon",
    "pompidou",
    "sacrecoeur",
    "triomphe",
];

/// Query variants per landmark in the Paris benchmark.
pub const PARIS_VARIANTS: usize = 5;

/// Where query embeddings come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum QuerySource {
    /// Vectors from the `query_embeddings` file.
    #[default]
    Precomputed,
    /// The gallery vector of each query's source image (crop ignored).
    SourceImage,
}

/// Full configuration for one evaluation run.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EvalConfig {
    pub backend: BackendKind,
    /// Ranked list length. Required.
    pub top_k: Option<usize>,
    pub gallery_path: PathBuf,
    pub ground_truth_dir: PathBuf,
    pub query_source: QuerySource,
    pub query_embeddings: Option<PathBuf>,
    /// Queries evaluated concurrently; 1 runs sequentially.
    pub workers: usize,
    pub landmarks: Vec<String>,
    pub variants: usize,
    #[serde(flatten)]
    pub params: BackendParams,
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            top_k: None,
            gallery_path: PathBuf::from("data/gallery.json"),
            ground_truth_dir: PathBuf::from("data/groundtruth"),
            query_source: QuerySource::default(),
            query_embeddings: None,
            workers: 1,
            landmarks: PARIS_LANDMARKS.iter().map(|s| s.to_string()).collect(),
            variants: PARIS_VARIANTS,
            params: BackendParams::default(),
        }
    }
}

impl EvalConfig {
    /// Parse a TOML file. Missing keys take their defaults.
    pub fn from_toml_file(path: impl AsRef<Path>) -> EvalResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| EvalError::from_io(path, e))?;
        toml::from_str(&raw)
            .map_err(|e| EvalError::Configuration(format!("{}: {e}", path.display())))
    }

    /// The validated ranked-list length.
    pub fn top_k(&self) -> EvalResult<usize> {
        match self.top_k {
            Some(0) => Err(EvalError::Configuration(
                "top_k must be a positive integer".to_string(),
            )),
            Some(k) => Ok(k),
            None => Err(EvalError::Configuration("top_k is required".to_string())),
        }
    }

    /// Check every option that can be checked without touching the filesystem.
    pub fn validate(&self) -> EvalResult<()> {
        self.top_k()?;
        if self.workers == 0 {
            return Err(EvalError::Configuration(
                "workers must be at least 1".to_string(),
            ));
        }
        if self.landmarks.is_empty() || self.variants == 0 {
            return Err(EvalError::Configuration(
                "benchmark query set is empty".to_string(),
            ));
        }
        if self.query_source == QuerySource::Precomputed && self.query_embeddings.is_none() {
            return Err(EvalError::Configuration(
                "query_embeddings is required when query_source = \"precomputed\"".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_cover_paris_benchmark() {
        let cfg = EvalConfig::default();
        assert_eq!(cfg.backend, BackendKind::Linear);
        assert_eq!(cfg.landmarks.len() * cfg.variants, 55);
        assert_eq!(cfg.params.lsh.hash_bits, 8);
        assert_eq!(cfg.params.lsh.num_tables, 2);
    }

    #[test]
    fn top_k_is_required_and_positive() {
        let mut cfg = EvalConfig {
            query_source: QuerySource::SourceImage,
            ..EvalConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(EvalError::Configuration(_))));
        cfg.top_k = Some(0);
        assert!(cfg.validate().is_err());
        cfg.top_k = Some(50);
        cfg.validate().unwrap();
    }

    #[test]
    fn parses_toml_with_backend_sections() {
        let cfg: EvalConfig = toml::from_str(
            r#"
            backend = "hash"
            top_k = 20
            query_source = "source-image"

            [lsh]
            hash_bits = 12
            probe_radius = 1

            [flat]
            search_width = 30
            "#,
        )
        .unwrap();
        assert_eq!(cfg.backend, BackendKind::Lsh);
        assert_eq!(cfg.top_k().unwrap(), 20);
        assert_eq!(cfg.params.lsh.hash_bits, 12);
        assert_eq!(cfg.params.lsh.num_tables, 2);
        assert_eq!(cfg.params.flat.search_width, Some(30));
        assert_eq!(cfg.query_source, QuerySource::SourceImage);
        cfg.validate().unwrap();
    }

    #[test]
    fn unknown_backend_is_a_parse_error() {
        let res: Result<EvalConfig, _> = toml::from_str(r#"backend = "annoy""#);
        assert!(res.is_err());
    }

    #[test]
    fn precomputed_source_needs_a_file() {
        let cfg = EvalConfig {
            top_k: Some(10),
            ..EvalConfig::default()
        };
        assert!(cfg.validate().is_err());
    }
}
