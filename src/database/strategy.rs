//! Search strategies over one index snapshot.
//!
//! Every strategy funnels candidates through [`Evaluator::evaluate`]: filter,
//! compare, keep on strict improvement. Strategies differ only in which pose
//! indices they offer and in what order.

use std::borrow::Cow;

use tracing::{debug, trace, warn};

use super::{AssetSelection, NEARLY_ZERO, PoseSearchDatabase};
use crate::index::{FilteredMaxHeapResultSet, MaxHeapResultSet, Neighbor, SearchIndex};
use crate::search::compare::{ComparatorPath, squared_distance};
use crate::search::context::{ContinuingPose, SearchContext, SearchParts, SearchStats};
use crate::search::cost::PoseCost;
use crate::search::filters::FilterChain;
use crate::search::result::SearchResult;

/// Distance tolerance when cross-checking KD-tree neighbours.
const KNN_VALIDATION_TOLERANCE: f32 = 1.0e-4;

#[derive(Debug, Clone, Copy, Default)]
struct Best {
    pose_index: Option<usize>,
    event_pose_index: Option<usize>,
    cost: PoseCost,
}

struct Evaluator<'e> {
    index: &'e SearchIndex,
    query: &'e [f32],
    weights_sqrt: &'e [f32],
    filters: &'e FilterChain<'e>,
    path: ComparatorPath,
    continuing_interaction_addend: f32,
}

impl Evaluator<'_> {
    fn evaluate(
        &self,
        pose_index: usize,
        event_pose_index: Option<usize>,
        reconstruction: &mut [f32],
        best: &mut Best,
        stats: &mut SearchStats,
    ) {
        let metadata = self.index.pose_metadata(pose_index);
        if !self.filters.passes_index_filters(pose_index, metadata) {
            stats.poses_filtered += 1;
            return;
        }

        let pose_values = self.index.pose_values_with(pose_index, reconstruction);
        if self.filters.has_channel_filters()
            && !self
                .filters
                .passes_channel_filters(pose_values, self.query, pose_index, metadata)
        {
            stats.poses_filtered += 1;
            return;
        }

        stats.poses_evaluated += 1;
        let cost = PoseCost::new(
            self.path.compare(pose_values, self.query, self.weights_sqrt),
            metadata.cost_addend(),
            0.0,
            self.continuing_interaction_addend,
        );
        if cost.is_better_than(&best.cost) {
            *best = Best {
                pose_index: Some(pose_index),
                event_pose_index,
                cost,
            };
        }
    }
}

/// Inputs shared by every full search.
struct Prepared<'i> {
    weights_sqrt: Cow<'i, [f32]>,
    non_selectable: Vec<usize>,
    selection: AssetSelection,
    continuing_interaction_addend: f32,
}

impl Prepared<'_> {
    /// Sorted selectable assets; `None` when nothing can be selected.
    fn selectable_assets(&self) -> Option<&[usize]> {
        match &self.selection {
            AssetSelection::All => Some(&[][..]),
            AssetSelection::Only(assets) => Some(assets.as_slice()),
            AssetSelection::Nothing => None,
        }
    }
}

impl PoseSearchDatabase {
    fn continuing_interaction_addend(&self, context: &SearchContext<'_>) -> f32 {
        if context.is_continuing_interaction() {
            self.config.continuing_interaction_cost_bias
        } else {
            0.0
        }
    }

    /// Neighbours requested from either tree, clamped to `1..=num_poses`.
    fn tree_query_num_neighbors(&self, index: &SearchIndex) -> usize {
        (self.config.kd_tree_query_num_neighbors as usize).clamp(1, index.num_poses().max(1))
    }

    /// False when no pose of `index` can beat the context's best cost.
    fn should_search(&self, index: &SearchIndex, context: &mut SearchContext<'_>) -> bool {
        if !context.skip_search_if_possible()
            || context.current_best_total_cost() > index.min_cost_addend()
        {
            return true;
        }
        trace!(
            database = %self.name,
            best = context.current_best_total_cost(),
            min_cost_addend = index.min_cost_addend(),
            "Search skipped by cost bound"
        );
        context.stats_mut().searches_skipped += 1;
        false
    }

    fn prepare<'i>(&self, index: &'i SearchIndex, context: &SearchContext<'_>, pose_filters: bool) -> Prepared<'i> {
        Prepared {
            weights_sqrt: self.calculate_dynamic_weights_sqrt(index, context.debug()),
            non_selectable: if pose_filters {
                self.populate_non_selectable(index, context)
            } else {
                Vec::new()
            },
            selection: self.populate_selectable_assets(index, context.assets_to_consider()),
            continuing_interaction_addend: self.continuing_interaction_addend(context),
        }
    }

    fn resolve_query<'c>(&self, index: &SearchIndex, context: &'c mut SearchContext<'_>) -> SearchParts<'c> {
        let Some(parts) = context.split_for_search(&self.schema) else {
            panic!("search context has neither a query nor a query builder");
        };
        assert_eq!(
            parts.query.len(),
            index.dimension(),
            "query dimension mismatch for database {}",
            self.name
        );
        parts
    }

    fn finish(&self, index: &SearchIndex, best: Best) -> SearchResult {
        let Some(pose_index) = best.pose_index else {
            return SearchResult::default();
        };
        SearchResult {
            pose_index: Some(pose_index),
            event_pose_index: best.event_pose_index,
            cost: best.cost,
            asset_time: self.normalized_asset_time(index, pose_index),
            database: Some(self.id),
            ..SearchResult::default()
        }
    }

    pub(super) fn brute_force_search(&self, index: &SearchIndex, context: &mut SearchContext<'_>) -> SearchResult {
        if !self.should_search(index, context) {
            return SearchResult::default();
        }

        let prepared = self.prepare(index, context, true);
        let ranges = match &prepared.selection {
            AssetSelection::All => vec![0..index.num_poses()],
            AssetSelection::Only(assets) => assets
                .iter()
                .map(|&asset_index| index.assets()[asset_index].pose_range())
                .collect(),
            AssetSelection::Nothing => return SearchResult::default(),
        };
        // selection is applied through the ranges above
        let filters = FilterChain::new(
            Some(self.schema.as_ref()),
            &prepared.non_selectable,
            &[],
            index.any_block_transition(),
        );

        let parts = self.resolve_query(index, context);
        let (reconstruction, _) = parts.scratch.buffers(index.dimension(), 0);
        let evaluator = Evaluator {
            index,
            query: parts.query,
            weights_sqrt: &prepared.weights_sqrt,
            filters: &filters,
            path: ComparatorPath::for_dimension(index.dimension()),
            continuing_interaction_addend: prepared.continuing_interaction_addend,
        };

        let mut best = Best::default();
        for pose_index in ranges.into_iter().flatten() {
            evaluator.evaluate(pose_index, None, reconstruction, &mut best, parts.stats);
        }
        self.finish(index, best)
    }

    pub(super) fn pca_kdtree_search(&self, index: &SearchIndex, context: &mut SearchContext<'_>) -> SearchResult {
        let (Some(kd_tree), Some(pca)) = (index.kd_tree(), index.pca()) else {
            warn!(database = %self.name, "PCA KD-tree search requested without a KD-tree");
            return SearchResult::default();
        };
        if !self.should_search(index, context) {
            return SearchResult::default();
        }

        let prepared = self.prepare(index, context, true);
        let Some(selectable) = prepared.selectable_assets() else {
            return SearchResult::default();
        };
        let validate_knn = context.debug().validate_knn_search;
        let deduplicated = index.are_pca_values_deduplicated();
        let filter_after_tree = deduplicated || validate_knn;
        let num_neighbors = self.tree_query_num_neighbors(index);

        let parts = self.resolve_query(index, context);
        let (reconstruction, pca_scratch) = parts.scratch.buffers(index.dimension(), pca.components());
        let pca_query = index.pca_project(parts.query, pca_scratch);

        let neighbors = if filter_after_tree || prepared.non_selectable.is_empty() {
            let mut result_set = MaxHeapResultSet::new(num_neighbors);
            kd_tree.find_neighbors(index.pca_values(), pca_query, &mut result_set);
            result_set.into_sorted_vec()
        } else {
            let mut result_set = FilteredMaxHeapResultSet::new(num_neighbors, &prepared.non_selectable);
            kd_tree.find_neighbors(index.pca_values(), pca_query, &mut result_set);
            result_set.into_sorted_vec()
        };

        if validate_knn {
            self.validate_knn(index, pca_query, &neighbors);
        }

        let non_selectable: &[usize] = if filter_after_tree {
            &prepared.non_selectable
        } else {
            &[]
        };
        let filters = FilterChain::new(
            Some(self.schema.as_ref()),
            non_selectable,
            selectable,
            index.any_block_transition(),
        );
        let evaluator = Evaluator {
            index,
            query: parts.query,
            weights_sqrt: &prepared.weights_sqrt,
            filters: &filters,
            path: ComparatorPath::for_dimension(index.dimension()),
            continuing_interaction_addend: prepared.continuing_interaction_addend,
        };

        let mut best = Best::default();
        if deduplicated {
            let poses = neighbors
                .iter()
                .flat_map(|neighbor| index.pca_values_vector_to_pose_indices(neighbor.index))
                .take(self.config.max_evaluations_with_duplicates());
            for &pose_index in poses {
                evaluator.evaluate(pose_index, None, reconstruction, &mut best, parts.stats);
            }
        } else {
            for neighbor in &neighbors {
                evaluator.evaluate(neighbor.index, None, reconstruction, &mut best, parts.stats);
            }
        }
        self.finish(index, best)
    }

    pub(super) fn vptree_search(&self, index: &SearchIndex, context: &mut SearchContext<'_>) -> SearchResult {
        let Some(vp_tree) = index.vp_tree() else {
            warn!(database = %self.name, "VP-tree search requested without a VP-tree");
            return SearchResult::default();
        };
        if !self.should_search(index, context) {
            return SearchResult::default();
        }

        let prepared = self.prepare(index, context, true);
        let Some(selectable) = prepared.selectable_assets() else {
            return SearchResult::default();
        };
        let filters = FilterChain::new(
            Some(self.schema.as_ref()),
            &prepared.non_selectable,
            selectable,
            index.any_block_transition(),
        );

        let parts = self.resolve_query(index, context);
        let query = parts.query;
        let mut result_set = MaxHeapResultSet::new(self.tree_query_num_neighbors(index));
        vp_tree.find_neighbors(|item| index.vp_distance(item, query), &mut result_set);
        let neighbors = result_set.into_sorted_vec();

        let (reconstruction, _) = parts.scratch.buffers(index.dimension(), 0);
        let evaluator = Evaluator {
            index,
            query,
            weights_sqrt: &prepared.weights_sqrt,
            filters: &filters,
            path: ComparatorPath::for_dimension(index.dimension()),
            continuing_interaction_addend: prepared.continuing_interaction_addend,
        };

        let mut best = Best::default();
        if index.are_values_deduplicated() {
            let poses = neighbors
                .iter()
                .flat_map(|neighbor| index.values_vector_to_pose_indices(neighbor.index))
                .take(self.config.max_evaluations_with_duplicates());
            for &pose_index in poses {
                evaluator.evaluate(pose_index, None, reconstruction, &mut best, parts.stats);
            }
        } else {
            for neighbor in &neighbors {
                evaluator.evaluate(neighbor.index, None, reconstruction, &mut best, parts.stats);
            }
        }
        self.finish(index, best)
    }

    pub(super) fn event_search(&self, index: &SearchIndex, context: &mut SearchContext<'_>) -> SearchResult {
        let Some(event) = context.event_to_search().cloned() else {
            return SearchResult::default();
        };
        let poses_with_event = index.poses_with_event(&event.tag);
        if poses_with_event.is_empty() {
            debug!(database = %self.name, tag = %event.tag, "No poses carry the requested event");
            return SearchResult::default();
        }

        let prepared = self.prepare(index, context, event.enable_pose_filters);
        let Some(selectable) = prepared.selectable_assets() else {
            return SearchResult::default();
        };
        let filters = FilterChain::new(
            Some(self.schema.as_ref()),
            &prepared.non_selectable,
            selectable,
            index.any_block_transition(),
        );

        let parts = self.resolve_query(index, context);
        let (reconstruction, _) = parts.scratch.buffers(index.dimension(), 0);
        let evaluator = Evaluator {
            index,
            query: parts.query,
            weights_sqrt: &prepared.weights_sqrt,
            filters: &filters,
            path: ComparatorPath::for_dimension(index.dimension()),
            continuing_interaction_addend: prepared.continuing_interaction_addend,
        };

        let mut best = Best::default();
        if event.time_to_event.abs() <= NEARLY_ZERO {
            for &event_pose in poses_with_event {
                evaluator.evaluate(event_pose, Some(event_pose), reconstruction, &mut best, parts.stats);
            }
        } else {
            let sample_rate = self.schema.sample_rate();
            let (min_rate, max_rate) = event.play_rate_range;
            let start_offset = event.time_to_event * min_rate;
            let end_offset = event.time_to_event * max_rate;
            for &event_pose in poses_with_event {
                let asset = index.asset_for_pose(event_pose);
                let event_time = asset.time_from_pose_index(event_pose, sample_rate);
                for pose_index in
                    asset.pose_indices_over_time(event_time - end_offset, event_time - start_offset, sample_rate)
                {
                    evaluator.evaluate(pose_index, Some(event_pose), reconstruction, &mut best, parts.stats);
                }
            }
        }
        self.finish(index, best)
    }

    pub(super) fn continuing_pose_search(
        &self,
        index: &SearchIndex,
        context: &mut SearchContext<'_>,
        continuing_pose: ContinuingPose,
    ) -> SearchResult {
        let mut result = SearchResult {
            is_continuing_pose_search: true,
            ..SearchResult::default()
        };
        let pose_index = continuing_pose.pose_index;
        let continuing_pose_addend = index
            .continuing_pose_cost_override(pose_index, self.schema.sample_rate())
            .unwrap_or(self.config.continuing_pose_cost_bias);
        let continuing_interaction_addend = self.continuing_interaction_addend(context);
        let debug = *context.debug();

        let bound = index.min_cost_addend() + continuing_pose_addend + continuing_interaction_addend;
        if !debug.skip_search_if_possible() || context.current_best_total_cost() > bound {
            let weights_sqrt = self.calculate_dynamic_weights_sqrt(index, &debug);
            let parts = self.resolve_query(index, context);
            let (reconstruction, _) = parts.scratch.buffers(index.dimension(), 0);
            let pose_values = index.pose_values_with(pose_index, reconstruction);

            parts.stats.poses_evaluated += 1;
            result.cost = PoseCost::new(
                ComparatorPath::for_dimension(index.dimension()).compare(pose_values, parts.query, &weights_sqrt),
                index.pose_metadata(pose_index).cost_addend(),
                continuing_pose_addend,
                continuing_interaction_addend,
            );
            result.pose_index = Some(pose_index);
            result.asset_time = continuing_pose.asset_time;
            result.database = Some(self.id);
        } else {
            trace!(database = %self.name, bound, "Continuing pose skipped by cost bound");
            context.stats_mut().searches_skipped += 1;
        }

        if debug.compare_against_brute_force {
            result.brute_force_cost = Some(result.cost);
        }
        result
    }

    /// Cross-check KD-tree neighbours against an exhaustive PCA-space ranking.
    fn validate_knn(&self, index: &SearchIndex, pca_query: &[f32], neighbors: &[Neighbor]) {
        let mut exhaustive: Vec<Neighbor> = (0..index.num_pca_vectors())
            .map(|vector_index| Neighbor {
                index: vector_index,
                distance: squared_distance(index.pca_values_vector(vector_index), pca_query),
            })
            .collect();
        exhaustive.sort_unstable();

        for (position, (expected, found)) in exhaustive.iter().zip(neighbors).enumerate() {
            let same_distance = (expected.distance - found.distance).abs() <= KNN_VALIDATION_TOLERANCE;
            if expected.index != found.index {
                if same_distance {
                    debug!(
                        database = %self.name,
                        position,
                        expected = expected.index,
                        found = found.index,
                        "Equidistant KD-tree neighbours returned in a different order"
                    );
                } else {
                    warn!(
                        database = %self.name,
                        position,
                        expected = expected.index,
                        found = found.index,
                        "KD-tree search order is inconsistent with exhaustive search"
                    );
                }
            } else if !same_distance {
                warn!(
                    database = %self.name,
                    position,
                    expected = expected.distance,
                    found = found.distance,
                    "KD-tree distance is inconsistent with exhaustive search"
                );
            }
        }
    }
}
