//! KD-Tree index.
//!
//! Exact k-NN via recursive axis-aligned splits.
//!
//! **Technical Name**: K-D Tree
//!
//! Algorithm:
//! - Split on the axis of largest spread, at the median point
//! - Descend to the near child first, then visit the far child only if the
//!   splitting plane is no farther than the current k-th best distance
//! - Distances use the same kernel as the linear scan, so results are
//!   bit-identical to it, tie order included
//!
//! Pruning is strict (`bound > worst`): a far subtree whose bound equals the
//! current worst distance is still visited, since it may hold an equidistant
//! point with a lower gallery index.
//!
//! # References
//!
//! - Bentley (1975): "Multidimensional binary search trees used for associative searching"
//! - Friedman, Bentley & Finkel (1977): "An algorithm for finding best matches in
//!   logarithmic expected time"

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::Arc;

use serde::Deserialize;

use super::traits::{check_query, BackendStats, SearchBackend};
use crate::distance::{cmp_hits, l2_distance_squared};
use crate::error::RetrieveError;
use crate::gallery::Gallery;

/// KD-Tree parameters.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct KdTreeParams {
    /// Maximum number of points in a leaf.
    pub leaf_size: usize,
}

impl Default for KdTreeParams {
    fn default() -> Self {
        Self { leaf_size: 16 }
    }
}

/// KD-Tree node.
enum KdNode {
    /// Internal node: left holds coordinates `<= value` on `axis`, right `>= value`.
    Split {
        axis: usize,
        value: f32,
        left: Box<KdNode>,
        right: Box<KdNode>,
    },
    Leaf { indices: Vec<u32> },
}

/// KD-Tree index.
pub struct KdTreeIndex {
    gallery: Arc<Gallery>,
    params: KdTreeParams,
    root: KdNode,
    num_nodes: usize,
}

impl KdTreeIndex {
    /// Build the tree over the whole gallery.
    pub fn build(gallery: Arc<Gallery>, params: KdTreeParams) -> Result<Self, RetrieveError> {
        if params.leaf_size == 0 {
            return Err(RetrieveError::InvalidParameter(
                "leaf_size must be greater than 0".to_string(),
            ));
        }
        if gallery.is_empty() {
            return Err(RetrieveError::EmptyIndex);
        }

        let mut indices: Vec<u32> = (0..gallery.len() as u32).collect();
        let mut num_nodes = 0;
        let root = build_node(&gallery, &mut indices, params.leaf_size, &mut num_nodes);

        Ok(Self {
            gallery,
            params,
            root,
            num_nodes,
        })
    }

    fn search_node(&self, node: &KdNode, query: &[f32], k: usize, best: &mut BinaryHeap<Hit>) {
        match node {
            KdNode::Leaf { indices } => {
                for &idx in indices {
                    let hit = Hit(idx, l2_distance_squared(query, self.gallery.vector(idx as usize)));
                    if best.len() < k {
                        best.push(hit);
                    } else if best.peek().is_some_and(|worst| hit < *worst) {
                        best.pop();
                        best.push(hit);
                    }
                }
            }
            KdNode::Split {
                axis,
                value,
                left,
                right,
            } => {
                let diff = query[*axis] - value;
                let (near, far) = if diff < 0.0 {
                    (left, right)
                } else {
                    (right, left)
                };

                self.search_node(near, query, k, best);

                let bound = diff * diff;
                let prune = best.len() == k && best.peek().is_some_and(|worst| bound > worst.1);
                if !prune {
                    self.search_node(far, query, k, best);
                }
            }
        }
    }
}

fn build_node(gallery: &Gallery, indices: &mut [u32], leaf_size: usize, count: &mut usize) -> KdNode {
    *count += 1;
    if indices.len() <= leaf_size {
        return KdNode::Leaf {
            indices: indices.to_vec(),
        };
    }

    let (axis, spread) = widest_axis(gallery, indices);
    if spread <= 0.0 {
        // All points coincide; no split separates them.
        return KdNode::Leaf {
            indices: indices.to_vec(),
        };
    }

    indices.sort_by(|&a, &b| {
        gallery.vector(a as usize)[axis]
            .total_cmp(&gallery.vector(b as usize)[axis])
            .then(a.cmp(&b))
    });
    let mid = indices.len() / 2;
    let value = gallery.vector(indices[mid] as usize)[axis];

    let (lo, hi) = indices.split_at_mut(mid);
    let left = build_node(gallery, lo, leaf_size, count);
    let right = build_node(gallery, hi, leaf_size, count);

    KdNode::Split {
        axis,
        value,
        left: Box::new(left),
        right: Box::new(right),
    }
}

/// Axis with the largest coordinate range, and that range.
fn widest_axis(gallery: &Gallery, indices: &[u32]) -> (usize, f32) {
    let dim = gallery.dimension();
    let mut lo = vec![f32::INFINITY; dim];
    let mut hi = vec![f32::NEG_INFINITY; dim];
    for &idx in indices {
        for (j, &x) in gallery.vector(idx as usize).iter().enumerate() {
            lo[j] = lo[j].min(x);
            hi[j] = hi[j].max(x);
        }
    }
    (0..dim)
        .map(|j| (j, hi[j] - lo[j]))
        .fold((0, f32::NEG_INFINITY), |best, cur| if cur.1 > best.1 { cur } else { best })
}

/// Max-heap entry ordered by (distance, gallery index).
#[derive(Clone, Copy, PartialEq)]
struct Hit(u32, f32);

impl Eq for Hit {}

impl PartialOrd for Hit {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Hit {
    fn cmp(&self, other: &Self) -> Ordering {
        cmp_hits(&(self.0, self.1), &(other.0, other.1))
    }
}

impl SearchBackend for KdTreeIndex {
    fn search(&self, query: &[f32], k: usize) -> Result<Vec<(u32, f32)>, RetrieveError> {
        check_query(query, self.gallery.dimension())?;
        let k = k.min(self.gallery.len());
        if k == 0 {
            return Ok(Vec::new());
        }

        let mut best = BinaryHeap::with_capacity(k + 1);
        self.search_node(&self.root, query, k, &mut best);

        // into_sorted_vec is ascending under Hit's ordering.
        Ok(best
            .into_sorted_vec()
            .into_iter()
            .map(|Hit(i, d)| (i, d.sqrt()))
            .collect())
    }

    fn stats(&self) -> BackendStats {
        BackendStats {
            num_vectors: self.gallery.len(),
            dimension: self.gallery.dimension(),
            size_bytes: self.gallery.len() * std::mem::size_of::<u32>()
                + self.num_nodes * std::mem::size_of::<KdNode>(),
            algorithm: format!("KD-Tree(leaf={})", self.params.leaf_size),
            exact: true,
        }
    }

    fn dimension(&self) -> usize {
        self.gallery.dimension()
    }

    fn num_vectors(&self) -> usize {
        self.gallery.len()
    }
}
