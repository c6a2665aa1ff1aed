//! Benchmark CLI: rank every benchmark query and report per-query AP and mAP.
//!
//! ```bash
//! landmark-eval --top 100 --backend exact-tree \
//!     --feature data/paris_gallery.json \
//!     --ground-truth data/paris_groundtruth \
//!     --query-embeddings data/paris_queries.json
//! ```

use std::path::PathBuf;

use clap::Parser;
use landmark_eval::config::QuerySource;
use landmark_eval::{BackendKind, BenchmarkQueries, EvalConfig, Evaluator};
use tracing_subscriber::EnvFilter;

/// Evaluate a retrieval backend on a landmark benchmark.
#[derive(Parser, Debug)]
#[command(name = "landmark-eval", version)]
struct Args {
    /// TOML configuration file; flags below override its values.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Search backend: none, exact-tree, hash, approximate-flat.
    #[arg(long, alias = "large")]
    backend: Option<BackendKind>,

    /// Number of ranked list elements.
    #[arg(long, alias = "top-k")]
    top: Option<usize>,

    /// Gallery features file.
    #[arg(long, alias = "gallery")]
    feature: Option<PathBuf>,

    /// Ground-truth directory.
    #[arg(long)]
    ground_truth: Option<PathBuf>,

    /// Precomputed query embeddings (JSON map of query name to vector).
    #[arg(long)]
    query_embeddings: Option<PathBuf>,

    /// Embed each query with its source image's gallery vector instead.
    #[arg(long, conflicts_with = "query_embeddings")]
    source_image_queries: bool,

    /// Queries evaluated concurrently.
    #[arg(long)]
    workers: Option<usize>,

    /// Fixed flat-index result count (ignores --top for that backend).
    #[arg(long)]
    search_width: Option<usize>,
}

impl Args {
    fn into_config(self) -> anyhow::Result<EvalConfig> {
        let mut config = match &self.config {
            Some(path) => EvalConfig::from_toml_file(path)?,
            None => EvalConfig::default(),
        };

        if let Some(backend) = self.backend {
            config.backend = backend;
        }
        if let Some(top) = self.top {
            config.top_k = Some(top);
        }
        if let Some(path) = self.feature {
            config.gallery_path = path;
        }
        if let Some(dir) = self.ground_truth {
            config.ground_truth_dir = dir;
        }
        if let Some(path) = self.query_embeddings {
            config.query_embeddings = Some(path);
            config.query_source = QuerySource::Precomputed;
        }
        if self.source_image_queries {
            config.query_source = QuerySource::SourceImage;
        }
        if let Some(workers) = self.workers {
            config.workers = workers;
        }
        if let Some(width) = self.search_width {
            config.params.flat.search_width = Some(width);
        }

        config.validate()?;
        Ok(config)
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = Args::parse().into_config()?;
    let queries = BenchmarkQueries::from_landmarks(config.landmarks.as_slice(), config.variants);

    let evaluator = Evaluator::from_config(&config)?;
    let result = evaluator.run(&queries)?;

    for query in &result.queries {
        println!("{} {:.6}", query.name, query.average_precision);
    }
    println!(
        "mAP@{} ({}): {:.6}  [min {:.4}, max {:.4}, std {:.4}]",
        result.top_k,
        result.backend,
        result.mean_average_precision,
        result.summary.min,
        result.summary.max,
        result.summary.std
    );

    Ok(())
}
