//! Bounded k-nearest-neighbour result sets shared by the KD-tree and VP-tree.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// A candidate point and its distance to the query.
///
/// Ordered by `(distance, index)` so equal distances resolve to the lower
/// index on every strategy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    pub index: usize,
    pub distance: f32,
}

impl Eq for Neighbor {}

impl PartialOrd for Neighbor {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Neighbor {
    fn cmp(&self, other: &Self) -> Ordering {
        self.distance
            .total_cmp(&other.distance)
            .then_with(|| self.index.cmp(&other.index))
    }
}

/// Receives candidate points during a tree traversal.
pub trait KnnResultSet {
    /// Distance a candidate must not exceed to be worth visiting.
    /// Infinite until the set is full.
    fn worst_distance(&self) -> f32;

    /// Offer a point; returns true when it was kept.
    fn add_point(&mut self, distance: f32, index: usize) -> bool;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Keeps the `capacity` smallest neighbours in a max-heap.
#[derive(Debug, Clone)]
pub struct MaxHeapResultSet {
    capacity: usize,
    heap: BinaryHeap<Neighbor>,
}

impl MaxHeapResultSet {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            heap: BinaryHeap::with_capacity(capacity + 1),
        }
    }

    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Neighbours in ascending `(distance, index)` order.
    pub fn into_sorted_vec(self) -> Vec<Neighbor> {
        self.heap.into_sorted_vec()
    }
}

impl KnnResultSet for MaxHeapResultSet {
    fn worst_distance(&self) -> f32 {
        if self.heap.len() < self.capacity {
            return f32::INFINITY;
        }
        self.heap.peek().map_or(f32::INFINITY, |worst| worst.distance)
    }

    fn add_point(&mut self, distance: f32, index: usize) -> bool {
        if self.capacity == 0 {
            return false;
        }
        let candidate = Neighbor { index, distance };
        if self.heap.len() < self.capacity {
            self.heap.push(candidate);
            return true;
        }
        match self.heap.peek() {
            Some(worst) if candidate < *worst => {
                self.heap.pop();
                self.heap.push(candidate);
                true
            }
            _ => false,
        }
    }

    fn len(&self) -> usize {
        self.heap.len()
    }
}

/// [`MaxHeapResultSet`] that refuses indices found in a sorted exclusion list.
#[derive(Debug, Clone)]
pub struct FilteredMaxHeapResultSet<'a> {
    inner: MaxHeapResultSet,
    excluded: &'a [usize],
}

impl<'a> FilteredMaxHeapResultSet<'a> {
    /// # Panics
    ///
    /// Panics if `excluded` is not sorted.
    pub fn new(capacity: usize, excluded: &'a [usize]) -> Self {
        assert!(excluded.is_sorted(), "excluded indices must be sorted");
        Self {
            inner: MaxHeapResultSet::new(capacity),
            excluded,
        }
    }

    pub fn into_sorted_vec(self) -> Vec<Neighbor> {
        self.inner.into_sorted_vec()
    }
}

impl KnnResultSet for FilteredMaxHeapResultSet<'_> {
    fn worst_distance(&self) -> f32 {
        self.inner.worst_distance()
    }

    fn add_point(&mut self, distance: f32, index: usize) -> bool {
        if self.excluded.binary_search(&index).is_ok() {
            return false;
        }
        self.inner.add_point(distance, index)
    }

    fn len(&self) -> usize {
        self.inner.len()
    }
}
