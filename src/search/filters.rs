//! Per-search pose filter chain.
//!
//! Filters run before any cost is computed, cheapest first:
//! - block transition
//! - non-selectable pose indices (sorted, binary search)
//! - selectable asset indices (sorted, binary search)
//! - schema channel filters
//!
//! The first failing filter rejects the pose. Adding a filter can only shrink
//! the set of valid poses.

use crate::index::PoseMetadata;
use crate::schema::{FeatureChannel, Schema};

#[derive(Debug, Clone, Copy)]
pub enum PoseFilter<'a> {
    BlockTransition,
    NonSelectableIdx(&'a [usize]),
    SelectableAssetIdx(&'a [usize]),
    Channel(&'a dyn FeatureChannel),
}

impl PoseFilter<'_> {
    /// Index-only filters never look at the feature values.
    fn is_valid_by_index(&self, pose_index: usize, metadata: &PoseMetadata) -> bool {
        match self {
            Self::BlockTransition => !metadata.is_block_transition(),
            Self::NonSelectableIdx(excluded) => excluded.binary_search(&pose_index).is_err(),
            Self::SelectableAssetIdx(selectable) => {
                selectable.binary_search(&metadata.asset_index()).is_ok()
            }
            Self::Channel(_) => true,
        }
    }

    fn is_valid(&self, pose_values: &[f32], query_values: &[f32], pose_index: usize, metadata: &PoseMetadata) -> bool {
        match self {
            Self::Channel(channel) => channel.is_filter_valid(pose_values, query_values, pose_index, metadata),
            _ => self.is_valid_by_index(pose_index, metadata),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct FilterChain<'a> {
    filters: Vec<PoseFilter<'a>>,
    index_filter_count: usize,
}

impl<'a> FilterChain<'a> {
    /// Empty lists add no filter.
    ///
    /// # Panics
    ///
    /// Panics if `non_selectable` or `selectable_assets` is not sorted.
    pub fn new(
        schema: Option<&'a Schema>,
        non_selectable: &'a [usize],
        selectable_assets: &'a [usize],
        add_block_transition: bool,
    ) -> Self {
        assert!(non_selectable.is_sorted(), "non-selectable pose indices must be sorted");
        assert!(selectable_assets.is_sorted(), "selectable asset indices must be sorted");

        let mut filters = Vec::new();
        if add_block_transition {
            filters.push(PoseFilter::BlockTransition);
        }
        if !non_selectable.is_empty() {
            filters.push(PoseFilter::NonSelectableIdx(non_selectable));
        }
        if !selectable_assets.is_empty() {
            filters.push(PoseFilter::SelectableAssetIdx(selectable_assets));
        }
        let index_filter_count = filters.len();

        if let Some(schema) = schema {
            filters.extend(
                schema
                    .channels()
                    .iter()
                    .filter(|channel| channel.is_filter_active())
                    .map(|channel| PoseFilter::Channel(channel.as_ref())),
            );
        }

        Self {
            filters,
            index_filter_count,
        }
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    pub fn filters(&self) -> &[PoseFilter<'a>] {
        &self.filters
    }

    /// Cheap pre-check that needs no pose values.
    pub fn passes_index_filters(&self, pose_index: usize, metadata: &PoseMetadata) -> bool {
        self.filters[..self.index_filter_count]
            .iter()
            .all(|filter| filter.is_valid_by_index(pose_index, metadata))
    }

    pub fn has_channel_filters(&self) -> bool {
        self.filters.len() > self.index_filter_count
    }

    pub fn passes_channel_filters(
        &self,
        pose_values: &[f32],
        query_values: &[f32],
        pose_index: usize,
        metadata: &PoseMetadata,
    ) -> bool {
        self.filters[self.index_filter_count..]
            .iter()
            .all(|filter| filter.is_valid(pose_values, query_values, pose_index, metadata))
    }

    /// Full chain in order, short-circuiting on the first rejection.
    pub fn is_valid(
        &self,
        pose_values: &[f32],
        query_values: &[f32],
        pose_index: usize,
        metadata: &PoseMetadata,
    ) -> bool {
        self.filters
            .iter()
            .all(|filter| filter.is_valid(pose_values, query_values, pose_index, metadata))
    }
}
