//! Benchmark orchestration.
//!
//! A run moves through fixed [`Stage`]s, never back:
//!
//! ```text
//! Idle -> GalleryLoaded -> BackendBuilt -> (Embedded -> Searched -> Scored)* -> Aggregated -> Done
//! ```
//!
//! [`Evaluator`] is the immutable context built by the first three stages
//! (gallery, backend, ground truth, embedder). [`Evaluator::run`] performs the
//! per-query stages and the aggregation. Every transition is logged at debug
//! level with a `stage` field. Queries share no mutable state, so
//! with `workers > 1` they run on a dedicated thread pool; results are always
//! reported in benchmark order.
//!
//! Any query failure aborts the run: a mAP over an incomplete query set is not
//! comparable with published numbers.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info};
#[cfg(not(feature = "parallel"))]
use tracing::warn;

use crate::backend::{BackendKind, SearchIndex};
use crate::config::{EvalConfig, QuerySource, PARIS_LANDMARKS, PARIS_VARIANTS};
use crate::embed::{GalleryEmbedder, PrecomputedEmbedder, QueryEmbedder};
use crate::error::{EvalError, EvalResult};
use crate::gallery::Gallery;
use crate::metrics::{average_precision, mean_average_precision, EvaluationSummary};
use crate::relevance::GroundTruth;

/// Lifecycle stage of an evaluation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Idle,
    GalleryLoaded,
    BackendBuilt,
    Embedded,
    Searched,
    Scored,
    Aggregated,
    Done,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Idle => "idle",
            Stage::GalleryLoaded => "gallery-loaded",
            Stage::BackendBuilt => "backend-built",
            Stage::Embedded => "embedded",
            Stage::Searched => "searched",
            Stage::Scored => "scored",
            Stage::Aggregated => "aggregated",
            Stage::Done => "done",
        }
    }

    /// Whether `next` may follow `self`. `Scored -> Embedded` starts the next query.
    pub fn can_advance_to(self, next: Stage) -> bool {
        use Stage::*;
        matches!(
            (self, next),
            (Idle, GalleryLoaded)
                | (GalleryLoaded, BackendBuilt)
                | (BackendBuilt, Embedded)
                | (Embedded, Searched)
                | (Searched, Scored)
                | (Scored, Embedded)
                | (Scored, Aggregated)
                | (Aggregated, Done)
        )
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Current stage of one scope (setup, a single query, or the aggregate).
struct StageCursor<'a> {
    scope: &'a str,
    stage: Stage,
}

impl<'a> StageCursor<'a> {
    fn new(scope: &'a str, stage: Stage) -> Self {
        Self { scope, stage }
    }

    fn advance(&mut self, next: Stage) {
        debug_assert!(
            self.stage.can_advance_to(next),
            "illegal stage transition {} -> {next}",
            self.stage
        );
        debug!(scope = self.scope, from = %self.stage, stage = %next, "stage");
        self.stage = next;
    }
}

/// Ordered list of benchmark query names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BenchmarkQueries {
    names: Vec<String>,
}

impl BenchmarkQueries {
    /// `<landmark>_<n>` for every landmark and `n` in `1..=variants`.
    pub fn from_landmarks<S: AsRef<str>>(landmarks: &[S], variants: usize) -> Self {
        let names = landmarks
            .iter()
            .flat_map(|l| (1..=variants).map(move |i| format!("{}_{i}", l.as_ref())))
            .collect();
        Self { names }
    }

    /// The Paris landmark benchmark.
    pub fn paris() -> Self {
        Self::from_landmarks(PARIS_LANDMARKS.as_slice(), PARIS_VARIANTS)
    }

    /// Explicit query names.
    pub fn from_names(names: Vec<String>) -> Self {
        Self { names }
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Score of one query.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryOutcome {
    pub name: String,
    pub average_precision: f64,
    /// Length of the ranked list the backend returned.
    pub retrieved: usize,
    pub latency: Duration,
}

/// Per-query scores plus the aggregate.
#[derive(Debug, Clone)]
pub struct EvaluationResult {
    pub backend: BackendKind,
    pub top_k: usize,
    /// In benchmark order.
    pub queries: Vec<QueryOutcome>,
    pub mean_average_precision: f64,
    pub summary: EvaluationSummary,
}

impl EvaluationResult {
    fn aggregate(backend: BackendKind, top_k: usize, queries: Vec<QueryOutcome>) -> Self {
        let scores: Vec<f64> = queries.iter().map(|q| q.average_precision).collect();
        Self {
            backend,
            top_k,
            mean_average_precision: mean_average_precision(&scores),
            summary: EvaluationSummary::from_scores(&scores),
            queries,
        }
    }

    /// AP of the named query, if it was evaluated.
    pub fn ap(&self, name: &str) -> Option<f64> {
        self.queries
            .iter()
            .find(|q| q.name == name)
            .map(|q| q.average_precision)
    }
}

/// Immutable evaluation context shared by every query.
pub struct Evaluator {
    index: SearchIndex,
    ground_truth: GroundTruth,
    embedder: Box<dyn QueryEmbedder>,
    top_k: usize,
    workers: usize,
}

impl Evaluator {
    /// Assemble a context from already-built parts.
    pub fn new(
        index: SearchIndex,
        ground_truth: GroundTruth,
        embedder: Box<dyn QueryEmbedder>,
        top_k: usize,
    ) -> EvalResult<Self> {
        if top_k == 0 {
            return Err(EvalError::Configuration(
                "top_k must be a positive integer".to_string(),
            ));
        }
        Ok(Self {
            index,
            ground_truth,
            embedder,
            top_k,
            workers: 1,
        })
    }

    /// Number of queries evaluated concurrently.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Load the gallery, build the backend and the embedder described by `config`.
    pub fn from_config(config: &EvalConfig) -> EvalResult<Self> {
        config.validate()?;
        let top_k = config.top_k()?;

        let mut stage = StageCursor::new("setup", Stage::Idle);
        let gallery = Arc::new(Gallery::load_json(&config.gallery_path)?);
        stage.advance(Stage::GalleryLoaded);
        let index = SearchIndex::build(config.backend, gallery.clone(), &config.params)?;
        stage.advance(Stage::BackendBuilt);

        let embedder: Box<dyn QueryEmbedder> = match config.query_source {
            QuerySource::Precomputed => {
                let path = config.query_embeddings.as_ref().ok_or_else(|| {
                    EvalError::Configuration("query_embeddings is required".to_string())
                })?;
                Box::new(PrecomputedEmbedder::load_json(path)?)
            }
            QuerySource::SourceImage => Box::new(GalleryEmbedder::new(gallery)),
        };

        Ok(Self::new(
            index,
            GroundTruth::new(&config.ground_truth_dir),
            embedder,
            top_k,
        )?
        .with_workers(config.workers))
    }

    pub fn index(&self) -> &SearchIndex {
        &self.index
    }

    /// Embed, search and score a single query.
    pub fn evaluate_query(&self, name: &str) -> EvalResult<QueryOutcome> {
        let mut stage = StageCursor::new(name, Stage::BackendBuilt);
        let spec = self.ground_truth.query_spec(name)?;

        let vector = self.embedder.embed(&spec)?;
        let dim = self.index.gallery().dimension();
        if vector.len() != dim {
            return Err(EvalError::Embedding {
                query: name.to_string(),
                reason: format!("embedding has {} dimensions, gallery has {dim}", vector.len()),
            });
        }
        if vector.iter().any(|x| !x.is_finite()) {
            return Err(EvalError::Embedding {
                query: name.to_string(),
                reason: "embedding contains non-finite values".to_string(),
            });
        }

        stage.advance(Stage::Embedded);

        let start = Instant::now();
        let ranked = self
            .index
            .query(&vector, self.top_k)
            .map_err(|source| EvalError::Search {
                query: name.to_string(),
                source,
            })?;
        let latency = start.elapsed();
        stage.advance(Stage::Searched);

        let relevance = self.ground_truth.resolve(name)?;
        let ap = average_precision(&ranked, &relevance);
        stage.advance(Stage::Scored);
        debug!(
            query = name,
            retrieved = ranked.len(),
            positives = relevance.num_scorable_positives(),
            ap,
            "scored query"
        );

        Ok(QueryOutcome {
            name: name.to_string(),
            average_precision: ap,
            retrieved: ranked.len(),
            latency,
        })
    }

    /// Evaluate every query and aggregate. The first failure aborts the run.
    pub fn run(&self, queries: &BenchmarkQueries) -> EvalResult<EvaluationResult> {
        if queries.is_empty() {
            return Err(EvalError::Configuration(
                "benchmark query set is empty".to_string(),
            ));
        }

        let start = Instant::now();
        let outcomes = if self.workers > 1 {
            self.run_parallel(queries)?
        } else {
            self.run_sequential(queries)?
        };

        let mut stage = StageCursor::new("run", Stage::Scored);
        let result = EvaluationResult::aggregate(self.index.kind(), self.top_k, outcomes);
        stage.advance(Stage::Aggregated);
        info!(
            backend = %result.backend,
            top_k = result.top_k,
            queries = result.queries.len(),
            map = result.mean_average_precision,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "evaluation complete"
        );
        stage.advance(Stage::Done);
        Ok(result)
    }

    fn run_sequential(&self, queries: &BenchmarkQueries) -> EvalResult<Vec<QueryOutcome>> {
        queries
            .names()
            .iter()
            .map(|name| self.evaluate_query(name))
            .collect()
    }

    #[cfg(feature = "parallel")]
    fn run_parallel(&self, queries: &BenchmarkQueries) -> EvalResult<Vec<QueryOutcome>> {
        use rayon::prelude::*;

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.workers)
            .thread_name(|i| format!("eval-worker-{i}"))
            .build()
            .map_err(|e| EvalError::Configuration(format!("cannot start worker pool: {e}")))?;

        pool.install(|| {
            queries
                .names()
                .par_iter()
                .map(|name| self.evaluate_query(name))
                .collect()
        })
    }

    #[cfg(not(feature = "parallel"))]
    fn run_parallel(&self, queries: &BenchmarkQueries) -> EvalResult<Vec<QueryOutcome>> {
        warn!(
            workers = self.workers,
            "built without the `parallel` feature; evaluating sequentially"
        );
        self.run_sequential(queries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::BackendParams;
    use crate::relevance::QuerySpec;
    use crate::test_logs::with_captured_logs;
    use std::fs;
    use std::path::Path;

    #[test]
    fn paris_has_eleven_landmarks_times_five() {
        let q = BenchmarkQueries::paris();
        assert_eq!(q.len(), 55);
        assert_eq!(q.names()[0], "defense_1");
        assert_eq!(q.names()[4], "defense_5");
        assert_eq!(q.names()[54], "triomphe_5");
    }

    fn write_query(dir: &Path, name: &str, image: &str, good: &str, junk: &str) {
        fs::write(dir.join(format!("{name}_query.txt")), format!("{image} 0 0 10 10\n")).unwrap();
        fs::write(dir.join(format!("{name}_good.txt")), good).unwrap();
        fs::write(dir.join(format!("{name}_ok.txt")), "").unwrap();
        fs::write(dir.join(format!("{name}_junk.txt")), junk).unwrap();
    }

    fn line_index() -> SearchIndex {
        let gallery = Gallery::from_pairs([
            ("A", vec![0.0, 0.0]),
            ("B", vec![1.0, 0.0]),
            ("C", vec![2.0, 0.0]),
        ])
        .unwrap();
        SearchIndex::build(BackendKind::Linear, Arc::new(gallery), &BackendParams::default()).unwrap()
    }

    fn fixed_embedder() -> Box<dyn QueryEmbedder> {
        Box::new(|_: &QuerySpec| -> EvalResult<Vec<f32>> { Ok(vec![0.1, 0.0]) })
    }

    #[test]
    fn scores_reference_scenarios() {
        let dir = tempfile::tempdir().unwrap();
        write_query(dir.path(), "x_1", "A", "A\nC\n", "");
        write_query(dir.path(), "x_2", "A", "B\n", "A\n");

        let eval = Evaluator::new(line_index(), GroundTruth::new(dir.path()), fixed_embedder(), 3).unwrap();
        let result = eval
            .run(&BenchmarkQueries::from_names(vec!["x_1".into(), "x_2".into()]))
            .unwrap();

        assert!((result.ap("x_1").unwrap() - 0.8333).abs() < 1e-4);
        assert_eq!(result.ap("x_2").unwrap(), 1.0);
        let expected = ((1.0 + 2.0 / 3.0) / 2.0 + 1.0) / 2.0;
        assert!((result.mean_average_precision - expected).abs() < 1e-12);
    }

    #[test]
    fn missing_ground_truth_aborts_the_run() {
        let dir = tempfile::tempdir().unwrap();
        write_query(dir.path(), "x_1", "A", "A\n", "");
        fs::remove_file(dir.path().join("x_1_junk.txt")).unwrap();

        let eval = Evaluator::new(line_index(), GroundTruth::new(dir.path()), fixed_embedder(), 3).unwrap();
        let err = eval
            .run(&BenchmarkQueries::from_names(vec!["x_1".into()]))
            .unwrap_err();
        assert!(err.to_string().contains("x_1_junk.txt"), "{err}");
    }

    #[test]
    fn wrong_embedding_dimension_is_an_embedding_error() {
        let dir = tempfile::tempdir().unwrap();
        write_query(dir.path(), "x_1", "A", "A\n", "");
        let embedder: Box<dyn QueryEmbedder> =
            Box::new(|_: &QuerySpec| -> EvalResult<Vec<f32>> { Ok(vec![0.0; 3]) });

        let eval = Evaluator::new(line_index(), GroundTruth::new(dir.path()), embedder, 3).unwrap();
        assert!(matches!(
            eval.evaluate_query("x_1"),
            Err(EvalError::Embedding { .. })
        ));
    }

    #[test]
    fn parallel_run_keeps_benchmark_order() {
        let dir = tempfile::tempdir().unwrap();
        let names: Vec<String> = (1..=8).map(|i| format!("x_{i}")).collect();
        for (i, name) in names.iter().enumerate() {
            let good = if i % 2 == 0 { "A\n" } else { "C\n" };
            write_query(dir.path(), name, "A", good, "");
        }

        let eval = Evaluator::new(line_index(), GroundTruth::new(dir.path()), fixed_embedder(), 3)
            .unwrap()
            .with_workers(4);
        let result = eval.run(&BenchmarkQueries::from_names(names.clone())).unwrap();

        let order: Vec<&str> = result.queries.iter().map(|q| q.name.as_str()).collect();
        assert_eq!(order, names.iter().map(String::as_str).collect::<Vec<_>>());
        assert_eq!(result.queries[0].average_precision, 1.0);
        assert!((result.queries[1].average_precision - 1.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn empty_query_set_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let eval = Evaluator::new(line_index(), GroundTruth::new(dir.path()), fixed_embedder(), 3).unwrap();
        assert!(eval.run(&BenchmarkQueries::from_names(Vec::new())).is_err());
    }

    #[test]
    fn stages_only_move_forward() {
        use Stage::*;
        let path = [Idle, GalleryLoaded, BackendBuilt, Embedded, Searched, Scored, Aggregated, Done];
        for w in path.windows(2) {
            assert!(w[0].can_advance_to(w[1]), "{} -> {}", w[0], w[1]);
            assert!(!w[1].can_advance_to(w[0]), "{} -> {}", w[1], w[0]);
        }
        assert!(Scored.can_advance_to(Embedded));
        assert!(!BackendBuilt.can_advance_to(Aggregated));
        assert!(!Embedded.can_advance_to(Scored));
        assert!(!Done.can_advance_to(Idle));
    }

    #[test]
    fn run_logs_every_stage_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let gallery_path = dir.path().join("gallery.json");
        fs::write(
            &gallery_path,
            r#"{"names": ["A.jpg", "B.jpg", "C.jpg"], "features": [[0.0, 0.0], [1.0, 0.0], [2.0, 0.0]]}"#,
        )
        .unwrap();
        write_query(dir.path(), "x_1", "A", "A\nB\n", "");
        let config = EvalConfig {
            top_k: Some(3),
            gallery_path,
            ground_truth_dir: dir.path().to_path_buf(),
            query_source: QuerySource::SourceImage,
            query_embeddings: None,
            landmarks: vec!["x".to_string()],
            variants: 1,
            ..EvalConfig::default()
        };

        let (result, logs) = with_captured_logs(|| -> EvalResult<EvaluationResult> {
            let eval = Evaluator::from_config(&config)?;
            eval.run(&BenchmarkQueries::from_landmarks(config.landmarks.as_slice(), config.variants))
        });
        assert_eq!(result.unwrap().mean_average_precision, 1.0);
        assert!(logs.contains("positives=2"), "{logs}");

        let stages: Vec<&str> = logs
            .split_whitespace()
            .filter_map(|token| token.strip_prefix("stage="))
            .collect();
        assert_eq!(
            stages,
            ["gallery-loaded", "backend-built", "embedded", "searched", "scored", "aggregated", "done"],
            "{logs}"
        );
    }
}
