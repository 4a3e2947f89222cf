//! Vantage-point tree over full-dimensional pose vectors.
//!
//! The tree is metric-agnostic: construction and queries receive distance
//! closures, so the owner decides how item indices map to vectors. The
//! distance must satisfy the triangle inequality (the search index uses the
//! square root of the weighted squared distance).

use serde::{Deserialize, Serialize};

use super::knn::KnnResultSet;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct VpNode {
    item: usize,
    threshold: f32,
    inside: Option<usize>,
    outside: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VpTree {
    nodes: Vec<VpNode>,
    num_items: usize,
}

impl VpTree {
    /// Build over items `0..num_items` with `distance(a, b)` between items.
    ///
    /// The vantage point of every subtree is its first item, so the same
    /// input always produces the same tree.
    pub fn build<D>(num_items: usize, distance: D) -> Self
    where
        D: Fn(usize, usize) -> f32,
    {
        let mut items: Vec<usize> = (0..num_items).collect();
        let mut tree = Self {
            nodes: Vec::with_capacity(num_items),
            num_items,
        };
        tree.build_range(&mut items, &distance);
        tree
    }

    pub const fn num_items(&self) -> usize {
        self.num_items
    }

    pub fn is_empty(&self) -> bool {
        self.num_items == 0
    }

    fn build_range<D>(&mut self, items: &mut [usize], distance: &D) -> Option<usize>
    where
        D: Fn(usize, usize) -> f32,
    {
        let (&mut vantage, rest) = items.split_first_mut()?;
        let node_index = self.nodes.len();
        self.nodes.push(VpNode {
            item: vantage,
            threshold: 0.0,
            inside: None,
            outside: None,
        });

        if rest.is_empty() {
            return Some(node_index);
        }

        let median = rest.len() / 2;
        rest.select_nth_unstable_by(median, |a, b| {
            distance(vantage, *a)
                .total_cmp(&distance(vantage, *b))
                .then(a.cmp(b))
        });
        let threshold = distance(vantage, rest[median]);

        let (inside_items, outside_items) = rest.split_at_mut(median);
        let inside = self.build_range(inside_items, distance);
        let outside = self.build_range(outside_items, distance);

        let node = &mut self.nodes[node_index];
        node.threshold = threshold;
        node.inside = inside;
        node.outside = outside;
        Some(node_index)
    }

    /// Offer every item that may belong in `result`; `distance(item)` is the
    /// distance from the query to that item.
    pub fn find_neighbors<D, R>(&self, distance: D, result: &mut R)
    where
        D: Fn(usize) -> f32,
        R: KnnResultSet,
    {
        if !self.nodes.is_empty() {
            self.search(0, &distance, result);
        }
    }

    fn search<D, R>(&self, node_index: usize, distance: &D, result: &mut R)
    where
        D: Fn(usize) -> f32,
        R: KnnResultSet,
    {
        let node = &self.nodes[node_index];
        let dist = distance(node.item);
        if dist <= result.worst_distance() {
            result.add_point(dist, node.item);
        }

        let visit = |child: Option<usize>, result: &mut R| {
            if let Some(child) = child {
                self.search(child, distance, result);
            }
        };

        if dist < node.threshold {
            if dist - result.worst_distance() <= node.threshold {
                visit(node.inside, result);
            }
            if dist + result.worst_distance() >= node.threshold {
                visit(node.outside, result);
            }
        } else {
            if dist + result.worst_distance() >= node.threshold {
                visit(node.outside, result);
            }
            if dist - result.worst_distance() <= node.threshold {
                visit(node.inside, result);
            }
        }
    }
}
