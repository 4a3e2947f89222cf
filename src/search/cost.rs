//! Pose cost: dissimilarity plus additive bias terms.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

/// Cost of selecting one pose for one query.
///
/// `total` is cached on construction. A default-constructed cost is "unset"
/// and compares worse than any real candidate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PoseCost {
    dissimilarity: f32,
    cost_addend: f32,
    continuing_pose_addend: f32,
    continuing_interaction_addend: f32,
    total: f32,
}

impl Default for PoseCost {
    fn default() -> Self {
        Self {
            dissimilarity: 0.0,
            cost_addend: 0.0,
            continuing_pose_addend: 0.0,
            continuing_interaction_addend: 0.0,
            total: f32::MAX,
        }
    }
}

impl PoseCost {
    pub fn new(
        dissimilarity: f32,
        cost_addend: f32,
        continuing_pose_addend: f32,
        continuing_interaction_addend: f32,
    ) -> Self {
        debug_assert!(dissimilarity >= 0.0, "negative dissimilarity {dissimilarity}");
        Self {
            dissimilarity,
            cost_addend,
            continuing_pose_addend,
            continuing_interaction_addend,
            total: dissimilarity + cost_addend + continuing_pose_addend + continuing_interaction_addend,
        }
    }

    pub const fn dissimilarity(&self) -> f32 {
        self.dissimilarity
    }

    pub const fn cost_addend(&self) -> f32 {
        self.cost_addend
    }

    pub const fn continuing_pose_addend(&self) -> f32 {
        self.continuing_pose_addend
    }

    pub const fn continuing_interaction_addend(&self) -> f32 {
        self.continuing_interaction_addend
    }

    pub const fn total(&self) -> f32 {
        self.total
    }

    /// False for the default "no candidate" cost.
    pub fn is_valid(&self) -> bool {
        self.total != f32::MAX
    }

    /// Strict improvement test used by every strategy: ties keep the
    /// earlier candidate.
    #[inline]
    pub fn is_better_than(&self, other: &Self) -> bool {
        self.total < other.total
    }
}

impl PartialOrd for PoseCost {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        self.total.partial_cmp(&other.total)
    }
}

impl std::fmt::Display for PoseCost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if !self.is_valid() {
            return write!(f, "unset");
        }
        write!(
            f,
            "{:.4} (dissimilarity {:.4}, addend {:.4}, continuing {:.4}, interaction {:.4})",
            self.total,
            self.dissimilarity,
            self.cost_addend,
            self.continuing_pose_addend,
            self.continuing_interaction_addend
        )
    }
}
