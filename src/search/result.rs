//! Outcome of one search call.

use crate::database::DatabaseId;
use crate::search::cost::PoseCost;

/// Best pose found, or an empty result when nothing qualified or the index
/// was not ready.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SearchResult {
    pub pose_index: Option<usize>,
    /// Tagged pose the result was reached from, for event searches.
    pub event_pose_index: Option<usize>,
    pub cost: PoseCost,
    /// Normalized asset time of `pose_index`.
    pub asset_time: f32,
    pub database: Option<DatabaseId>,
    pub is_continuing_pose_search: bool,
    /// Brute-force reference cost, when requested through debug options.
    pub brute_force_cost: Option<PoseCost>,
}

impl SearchResult {
    pub fn is_valid(&self) -> bool {
        self.pose_index.is_some() && self.database.is_some()
    }

    /// Keep the better of `self` and `other`; ties keep `self`.
    #[must_use]
    pub fn better_of(self, other: Self) -> Self {
        if other.is_valid() && other.cost.is_better_than(&self.cost) {
            other
        } else {
            self
        }
    }
}
