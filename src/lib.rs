//! landmark-eval: ranked-retrieval evaluation for image search.
//!
//! Ranks a gallery of pre-computed image embeddings against query embeddings
//! and scores each ranking with Average Precision against human judgments,
//! reporting mean Average Precision over a fixed benchmark (by default the
//! Paris landmarks set: 11 landmarks, 5 queries each).
//!
//! - `backend/`: pluggable k-NN search (linear scan, KD-tree, LSH, flat)
//! - [`metrics`]: AP / mAP with junk-aware ranking
//! - [`relevance`]: ground-truth directory reader
//! - [`eval`]: the benchmark driver
//!
//! # Critical Nuances
//!
//! ## Ambiguous judgments
//!
//! Items judged "junk" are removed from the ranked list before precision is
//! computed. They do not occupy a rank, so inserting a junk item anywhere in
//! a ranking never changes its AP. An item listed both as positive and as
//! junk counts as junk.
//!
//! ## Tie order
//!
//! Equal distances are broken by gallery insertion order in every backend.
//! The linear scan and the KD-tree are therefore interchangeable bit for bit;
//! the flat index differs only by floating-point rounding, LSH by recall.
//!
//! ## Recall is not penalized
//!
//! AP divides by the number of positives *found*, not the number that exist.
//! A backend that finds one positive at rank 1 and misses the rest scores 1.0.
//! Compare approximate backends against the linear scan, not in isolation.

pub mod backend;
pub mod config;
pub mod distance;
pub mod embed;
pub mod error;
pub mod eval;
pub mod gallery;
pub mod metrics;
pub mod relevance;

#[cfg(test)]
mod test_logs;

// Re-exports
pub use backend::{BackendKind, BackendParams, SearchBackend, SearchIndex};
pub use config::EvalConfig;
pub use embed::QueryEmbedder;
pub use error::{EvalError, Result, RetrieveError};
pub use eval::{BenchmarkQueries, EvaluationResult, Evaluator, Stage};
pub use gallery::{Gallery, Identifier};
pub use metrics::{average_precision, mean_average_precision};
pub use relevance::{GroundTruth, QuerySpec, RelevanceSets};
