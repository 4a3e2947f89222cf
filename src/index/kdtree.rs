//! KD-tree over PCA-projected pose vectors.
//!
//! Nodes split the widest dimension of their bounding box at the median.
//! Each split remembers the highest coordinate on its low side and the
//! lowest on its high side so the search can bound the distance to the far
//! child incrementally, one dimension at a time.
//!
//! The tree stores point indices only; callers pass the flat point buffer
//! (`num_points × dimension`) to every query.

use serde::{Deserialize, Serialize};

use super::knn::KnnResultSet;
use crate::search::compare::squared_distance;

/// Default maximum number of points per leaf.
pub const DEFAULT_LEAF_SIZE: usize = 8;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
enum KdNode {
    Leaf {
        start: usize,
        end: usize,
    },
    Split {
        dim: usize,
        low: f32,
        high: f32,
        left: usize,
        right: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KdTree {
    dimension: usize,
    num_points: usize,
    indices: Vec<usize>,
    nodes: Vec<KdNode>,
    root_bbox: Vec<(f32, f32)>,
}

impl KdTree {
    /// Build over `points`, a flat buffer of `points.len() / dimension` vectors.
    ///
    /// # Panics
    ///
    /// Panics if `dimension` is zero or does not divide `points.len()`.
    pub fn build(points: &[f32], dimension: usize, leaf_size: usize) -> Self {
        assert!(dimension > 0, "KD-tree dimension must be positive");
        assert!(
            points.len() % dimension == 0,
            "point buffer length {} is not a multiple of {dimension}",
            points.len()
        );

        let num_points = points.len() / dimension;
        let mut tree = Self {
            dimension,
            num_points,
            indices: (0..num_points).collect(),
            nodes: Vec::new(),
            root_bbox: Vec::new(),
        };

        if num_points > 0 {
            tree.root_bbox = bounding_box(points, dimension, &tree.indices);
            tree.build_node(points, 0, num_points, leaf_size.max(1));
        }
        tree
    }

    pub const fn dimension(&self) -> usize {
        self.dimension
    }

    pub const fn num_points(&self) -> usize {
        self.num_points
    }

    pub fn is_empty(&self) -> bool {
        self.num_points == 0
    }

    fn build_node(&mut self, points: &[f32], start: usize, end: usize, leaf_size: usize) -> usize {
        let node_index = self.nodes.len();
        self.nodes.push(KdNode::Leaf { start, end });

        if end - start <= leaf_size {
            return node_index;
        }

        let bbox = bounding_box(points, self.dimension, &self.indices[start..end]);
        let (dim, spread) = bbox
            .iter()
            .enumerate()
            .map(|(dim, (lo, hi))| (dim, hi - lo))
            .fold((0, f32::NEG_INFINITY), |best, cur| if cur.1 > best.1 { cur } else { best });

        // Every point identical: nothing to split on.
        if spread <= 0.0 {
            return node_index;
        }

        let dimension = self.dimension;
        let coord = |index: usize| points[index * dimension + dim];
        let mid = (end - start) / 2;
        self.indices[start..end]
            .select_nth_unstable_by(mid, |a, b| coord(*a).total_cmp(&coord(*b)).then(a.cmp(b)));

        let split = start + mid;
        let low = self.indices[start..split]
            .iter()
            .map(|&i| coord(i))
            .fold(f32::NEG_INFINITY, f32::max);
        let high = self.indices[split..end]
            .iter()
            .map(|&i| coord(i))
            .fold(f32::INFINITY, f32::min);

        let left = self.build_node(points, start, split, leaf_size);
        let right = self.build_node(points, split, end, leaf_size);
        self.nodes[node_index] = KdNode::Split {
            dim,
            low,
            high,
            left,
            right,
        };
        node_index
    }

    /// Offer every point that may belong in `result` for `query`.
    ///
    /// Squared Euclidean distance; subtrees are skipped only when their lower
    /// bound strictly exceeds the current worst kept distance.
    ///
    /// # Panics
    ///
    /// Panics if `query` or `points` do not match the tree's shape.
    pub fn find_neighbors<R: KnnResultSet>(&self, points: &[f32], query: &[f32], result: &mut R) {
        assert_eq!(query.len(), self.dimension, "KD-tree query dimension mismatch");
        assert_eq!(
            points.len(),
            self.num_points * self.dimension,
            "point buffer does not match the KD-tree"
        );
        if self.nodes.is_empty() {
            return;
        }

        let mut dists = vec![0.0_f32; self.dimension];
        let mut mindist = 0.0;
        for ((dist, (lo, hi)), q) in dists.iter_mut().zip(&self.root_bbox).zip(query) {
            if q < lo {
                *dist = (q - lo) * (q - lo);
            } else if q > hi {
                *dist = (q - hi) * (q - hi);
            }
            mindist += *dist;
        }

        self.search_level(points, query, 0, mindist, &mut dists, result);
    }

    fn search_level<R: KnnResultSet>(
        &self,
        points: &[f32],
        query: &[f32],
        node: usize,
        mindist: f32,
        dists: &mut [f32],
        result: &mut R,
    ) {
        match self.nodes[node] {
            KdNode::Leaf { start, end } => {
                for &index in &self.indices[start..end] {
                    let point = &points[index * self.dimension..(index + 1) * self.dimension];
                    let distance = squared_distance(point, query);
                    if distance <= result.worst_distance() {
                        result.add_point(distance, index);
                    }
                }
            }
            KdNode::Split {
                dim,
                low,
                high,
                left,
                right,
            } => {
                let value = query[dim];
                let diff_low = value - low;
                let diff_high = value - high;

                let (near, far, cut_dist) = if diff_low + diff_high < 0.0 {
                    (left, right, diff_high * diff_high)
                } else {
                    (right, left, diff_low * diff_low)
                };

                self.search_level(points, query, near, mindist, dists, result);

                let saved = dists[dim];
                let far_mindist = mindist + cut_dist - saved;
                dists[dim] = cut_dist;
                if far_mindist <= result.worst_distance() {
                    self.search_level(points, query, far, far_mindist, dists, result);
                }
                dists[dim] = saved;
            }
        }
    }
}

fn bounding_box(points: &[f32], dimension: usize, indices: &[usize]) -> Vec<(f32, f32)> {
    let mut bbox = vec![(f32::INFINITY, f32::NEG_INFINITY); dimension];
    for &index in indices {
        let point = &points[index * dimension..(index + 1) * dimension];
        for ((lo, hi), value) in bbox.iter_mut().zip(point) {
            *lo = lo.min(*value);
            *hi = hi.max(*value);
        }
    }
    bbox
}
