//! LSH (Locality Sensitive Hashing) index.
//!
//! Random hyperplane LSH:
//! - Each table draws `hash_bits` Gaussian hyperplanes
//! - A vector's key in a table is the sign pattern of its projections
//! - A query gathers every gallery item sharing a bucket with it in any table
//!   (optionally also buckets within `probe_radius` bit flips), then ranks the
//!   candidates by true L2 distance
//!
//! Recall is probabilistic: items that never collide with the query are never
//! seen, so a query can return fewer than `k` results.
//!
//! # References
//!
//! - Charikar (2002): "Similarity estimation techniques from rounding algorithms"
//! - Lv et al. (2007): "Multi-probe LSH: efficient indexing for high-dimensional
//!   similarity search"

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Deserialize;

use super::traits::{check_query, BackendStats, SearchBackend};
use crate::distance::{cmp_hits, dot, l2_distance_squared};
use crate::error::RetrieveError;
use crate::gallery::Gallery;

/// Upper bound on buckets a single query may visit in one table.
pub const MAX_PROBES_PER_TABLE: usize = 4096;

/// LSH parameters.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct LshParams {
    /// Bits per hash key (1-64).
    pub hash_bits: usize,
    /// Number of independent hash tables.
    pub num_tables: usize,
    /// Seed for hyperplane sampling.
    pub seed: u64,
    /// Also probe buckets whose key differs by at most this many bits.
    /// The resulting Hamming ball may not exceed [`MAX_PROBES_PER_TABLE`].
    pub probe_radius: usize,
}

impl Default for LshParams {
    fn default() -> Self {
        Self {
            hash_bits: 8,
            num_tables: 2,
            seed: 42,
            probe_radius: 0,
        }
    }
}

/// Random-projection LSH index.
pub struct LshIndex {
    gallery: Arc<Gallery>,
    params: LshParams,
    /// Per table, `hash_bits * dimension` plane coefficients.
    planes: Vec<Vec<f32>>,
    tables: Vec<HashMap<u64, Vec<u32>>>,
}

impl LshIndex {
    /// Sample hyperplanes and bucket every gallery vector.
    pub fn build(gallery: Arc<Gallery>, params: LshParams) -> Result<Self, RetrieveError> {
        if params.hash_bits == 0 || params.hash_bits > 64 {
            return Err(RetrieveError::InvalidParameter(format!(
                "hash_bits must be in 1..=64, got {}",
                params.hash_bits
            )));
        }
        if params.num_tables == 0 {
            return Err(RetrieveError::InvalidParameter(
                "num_tables must be greater than 0".to_string(),
            ));
        }
        if params.probe_radius > params.hash_bits {
            return Err(RetrieveError::InvalidParameter(format!(
                "probe_radius {} exceeds hash_bits {}",
                params.probe_radius, params.hash_bits
            )));
        }
        let probes = probe_count(params.hash_bits, params.probe_radius);
        if probes > MAX_PROBES_PER_TABLE as u128 {
            return Err(RetrieveError::InvalidParameter(format!(
                "probe_radius {} over {} bits visits {probes} buckets per table (limit {MAX_PROBES_PER_TABLE})",
                params.probe_radius, params.hash_bits
            )));
        }
        if gallery.is_empty() {
            return Err(RetrieveError::EmptyIndex);
        }

        let dim = gallery.dimension();
        let mut rng = StdRng::seed_from_u64(params.seed);
        let planes: Vec<Vec<f32>> = (0..params.num_tables)
            .map(|_| (0..params.hash_bits * dim).map(|_| gaussian(&mut rng)).collect())
            .collect();

        let mut tables = vec![HashMap::new(); params.num_tables];
        for (idx, (_, v)) in gallery.iter().enumerate() {
            for (table, table_planes) in tables.iter_mut().zip(&planes) {
                let key = hash_key(table_planes, v, dim);
                table.entry(key).or_insert_with(Vec::new).push(idx as u32);
            }
        }

        Ok(Self {
            gallery,
            params,
            planes,
            tables,
        })
    }

    /// Gallery indices sharing a probed bucket with `query` in any table.
    fn candidates(&self, query: &[f32]) -> HashSet<u32> {
        let dim = self.gallery.dimension();
        let mut out = HashSet::new();
        for (table, table_planes) in self.tables.iter().zip(&self.planes) {
            let key = hash_key(table_planes, query, dim);
            for probe in probe_keys(key, self.params.hash_bits, self.params.probe_radius) {
                if let Some(bucket) = table.get(&probe) {
                    out.extend(bucket.iter().copied());
                }
            }
        }
        out
    }

    /// Number of non-empty buckets across all tables.
    pub fn num_buckets(&self) -> usize {
        self.tables.iter().map(HashMap::len).sum()
    }
}

/// Sign pattern of the projections of `v` onto one table's planes.
fn hash_key(planes: &[f32], v: &[f32], dim: usize) -> u64 {
    planes
        .chunks_exact(dim)
        .enumerate()
        .fold(0u64, |key, (bit, plane)| {
            if dot(plane, v) > 0.0 {
                key | (1 << bit)
            } else {
                key
            }
        })
}

/// Size of the Hamming ball of `radius` over `bits` bits: `sum C(bits, r)` for `r <= radius`.
fn probe_count(bits: usize, radius: usize) -> u128 {
    let (n, mut c, mut total) = (bits as u128, 1u128, 1u128);
    for r in 1..=radius.min(bits) as u128 {
        c = c * (n - r + 1) / r;
        total += c;
    }
    total
}

/// `key` plus every key within `radius` bit flips among the low `bits` bits.
fn probe_keys(key: u64, bits: usize, radius: usize) -> Vec<u64> {
    fn flip(key: u64, start: usize, bits: usize, left: usize, out: &mut Vec<u64>) {
        if left == 0 {
            return;
        }
        for b in start..bits {
            let k = key ^ (1 << b);
            out.push(k);
            flip(k, b + 1, bits, left - 1, out);
        }
    }

    let mut out = vec![key];
    flip(key, 0, bits, radius, &mut out);
    out
}

/// Standard normal sample (Box-Muller).
fn gaussian(rng: &mut StdRng) -> f32 {
    let u1: f32 = rng.random::<f32>().max(f32::MIN_POSITIVE);
    let u2: f32 = rng.random();
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f32::consts::PI * u2).cos()
}

impl SearchBackend for LshIndex {
    fn search(&self, query: &[f32], k: usize) -> Result<Vec<(u32, f32)>, RetrieveError> {
        check_query(query, self.gallery.dimension())?;
        if k == 0 {
            return Ok(Vec::new());
        }

        let mut hits: Vec<(u32, f32)> = self
            .candidates(query)
            .into_iter()
            .map(|idx| (idx, l2_distance_squared(query, self.gallery.vector(idx as usize))))
            .collect();
        hits.sort_by(cmp_hits);
        hits.truncate(k);

        Ok(hits.into_iter().map(|(i, d)| (i, d.sqrt())).collect())
    }

    fn stats(&self) -> BackendStats {
        let bucket_entries: usize = self
            .tables
            .iter()
            .flat_map(|t| t.values())
            .map(Vec::len)
            .sum();
        BackendStats {
            num_vectors: self.gallery.len(),
            dimension: self.gallery.dimension(),
            size_bytes: bucket_entries * std::mem::size_of::<u32>()
                + self.num_buckets() * std::mem::size_of::<u64>()
                + self.planes.iter().map(|p| p.len() * std::mem::size_of::<f32>()).sum::<usize>(),
            algorithm: format!(
                "LSH(bits={},tables={},probe={})",
                self.params.hash_bits, self.params.num_tables, self.params.probe_radius
            ),
            exact: false,
        }
    }

    fn dimension(&self) -> usize {
        self.gallery.dimension()
    }

    fn num_vectors(&self) -> usize {
        self.gallery.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clustered_gallery() -> Arc<Gallery> {
        let mut rng = StdRng::seed_from_u64(3);
        let centers = [[5.0_f32, 5.0, 5.0, 5.0], [-5.0, -5.0, -5.0, -5.0]];
        let pairs = (0..200).map(|i| {
            let c = &centers[i % 2];
            let v: Vec<f32> = c.iter().map(|x| x + rng.random::<f32>() - 0.5).collect();
            (format!("img_{i}"), v)
        });
        Arc::new(Gallery::from_pairs(pairs).unwrap())
    }

    #[test]
    fn probe_keys_enumerates_hamming_ball() {
        assert_eq!(probe_keys(0b101, 3, 0), vec![0b101]);
        let mut r1 = probe_keys(0b101, 3, 1);
        r1.sort_unstable();
        assert_eq!(r1, vec![0b001, 0b100, 0b101, 0b111]);
        // 1 + C(4,1) + C(4,2)
        assert_eq!(probe_keys(0, 4, 2).len(), 11);
    }

    #[test]
    fn exact_duplicate_is_always_found() {
        let gallery = clustered_gallery();
        let index = LshIndex::build(gallery.clone(), LshParams::default()).unwrap();
        let q = gallery.vector(17).to_vec();
        let hits = index.search(&q, 5).unwrap();
        assert_eq!(hits[0], (17, 0.0));
    }

    #[test]
    fn results_are_sorted_and_bounded_by_k() {
        let gallery = clustered_gallery();
        let index = LshIndex::build(gallery, LshParams::default()).unwrap();
        let hits = index.search(&[5.0, 5.0, 5.0, 5.0], 10).unwrap();
        assert!(hits.len() <= 10);
        assert!(hits.windows(2).all(|w| w[0].1 <= w[1].1));
    }

    #[test]
    fn wider_probe_never_loses_candidates() {
        let gallery = clustered_gallery();
        let narrow = LshIndex::build(gallery.clone(), LshParams::default()).unwrap();
        let wide = LshIndex::build(
            gallery,
            LshParams {
                probe_radius: 2,
                ..LshParams::default()
            },
        )
        .unwrap();
        let q = [0.3_f32, -0.2, 0.1, 0.0];
        assert!(wide.candidates(&q).is_superset(&narrow.candidates(&q)));
    }

    #[test]
    fn same_seed_same_buckets() {
        let gallery = clustered_gallery();
        let a = LshIndex::build(gallery.clone(), LshParams::default()).unwrap();
        let b = LshIndex::build(gallery, LshParams::default()).unwrap();
        let q = [1.0_f32, 2.0, -1.0, 0.5];
        assert_eq!(a.search(&q, 20).unwrap(), b.search(&q, 20).unwrap());
    }

    #[test]
    fn probe_count_matches_enumeration() {
        for (bits, radius) in [(3, 0), (3, 1), (4, 2), (8, 3), (12, 12)] {
            assert_eq!(probe_count(bits, radius), probe_keys(0, bits, radius).len() as u128);
        }
        assert_eq!(probe_count(64, 64), 1u128 << 64);
    }

    #[test]
    fn rejects_unbounded_multi_probe() {
        let gallery = clustered_gallery();
        let full_ball = LshParams {
            hash_bits: 64,
            probe_radius: 64,
            ..LshParams::default()
        };
        assert!(matches!(
            LshIndex::build(gallery.clone(), full_ball),
            Err(RetrieveError::InvalidParameter(_))
        ));

        // 1 + 12 + 66 + 220 = 299 probes per table.
        let modest = LshParams {
            hash_bits: 12,
            probe_radius: 3,
            ..LshParams::default()
        };
        assert!(LshIndex::build(gallery.clone(), modest).is_ok());
        // 2^13 probes per table.
        let wide = LshParams {
            hash_bits: 13,
            probe_radius: 13,
            ..LshParams::default()
        };
        assert!(LshIndex::build(gallery, wide).is_err());
    }

    #[test]
    fn rejects_bad_params() {
        let gallery = clustered_gallery();
        let bad = LshParams {
            hash_bits: 65,
            ..LshParams::default()
        };
        assert!(LshIndex::build(gallery, bad).is_err());
    }
}
