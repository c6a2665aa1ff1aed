//! Ranking quality metrics.
//!
//! - Average Precision (AP) over one ranked list, with ambiguous entries skipped
//! - Mean Average Precision (mAP) over a benchmark
//! - Summary statistics over per-query scores

use crate::relevance::{Judgment, RelevanceSets};

/// Average precision of one ranked list.
///
/// Walks the list in order. Ambiguous entries are skipped and do not consume a
/// rank position; every other entry advances the rank `i` (1-based), and each
/// positive at rank `i` adds `hits / i`. The sum is divided by the number of
/// positives found, so positives missing from the list lower recall but not AP.
///
/// Returns 0.0 when no positive is found (including an empty list).
///
/// ```rust
/// use landmark_eval::metrics::average_precision;
/// use landmark_eval::RelevanceSets;
///
/// let sets = RelevanceSets::new(["A", "C"], Vec::<String>::new());
/// let ap = average_precision(&["A", "B", "C"], &sets);
/// assert!((ap - (1.0 + 2.0 / 3.0) / 2.0).abs() < 1e-12);
/// ```
pub fn average_precision<S: AsRef<str>>(ranked: &[S], relevance: &RelevanceSets) -> f64 {
    let mut sum = 0.0;
    let mut hits = 0usize;
    let mut rank = 0usize;

    for id in ranked {
        match relevance.judge(id.as_ref()) {
            Judgment::Ambiguous => continue,
            Judgment::Positive => {
                rank += 1;
                hits += 1;
                sum += hits as f64 / rank as f64;
            }
            Judgment::Negative => rank += 1,
        }
    }

    if hits == 0 {
        return 0.0;
    }
    sum / hits as f64
}

/// Arithmetic mean of per-query AP scores; 0.0 for an empty set.
pub fn mean_average_precision(scores: &[f64]) -> f64 {
    if scores.is_empty() {
        return 0.0;
    }
    scores.iter().sum::<f64>() / scores.len() as f64
}

/// Aggregated per-query scores.
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationSummary {
    pub n_queries: usize,
    pub mean: f64,
    pub min: f64,
    pub max: f64,
    pub std: f64,
}

impl EvaluationSummary {
    /// Compute summary statistics from per-query scores.
    pub fn from_scores(scores: &[f64]) -> Self {
        let n = scores.len();
        if n == 0 {
            return Self {
                n_queries: 0,
                mean: 0.0,
                min: 0.0,
                max: 0.0,
                std: 0.0,
            };
        }

        let mean = mean_average_precision(scores);
        let min = scores.iter().copied().fold(f64::INFINITY, f64::min);
        let max = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let variance = scores.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / n as f64;

        Self {
            n_queries: n,
            mean,
            min,
            max,
            std: variance.sqrt(),
        }
    }
}
