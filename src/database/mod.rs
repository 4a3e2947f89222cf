//! Pose search databases.
//!
//! A [`PoseSearchDatabase`] pairs a schema and search settings with the
//! currently published [`SearchIndex`]. Searches take a snapshot of the index
//! and run synchronously on the caller's thread; an index that is missing or
//! still building yields an empty [`SearchResult`].

mod strategy;

use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use itertools::Itertools;
use rayon::prelude::*;
use tracing::{debug, warn};

use crate::config::{DatabaseConfig, DebugOptions, SearchMode};
use crate::error::{MatchError, Result};
use crate::index::{BuildStatus, IndexHandle, SearchIndex, SearchIndexAsset};
use crate::schema::Schema;
use crate::search::context::SearchContext;
use crate::search::result::SearchResult;

/// Tolerance below which two times are considered equal.
pub(crate) const NEARLY_ZERO: f32 = 1.0e-8;

static NEXT_DATABASE_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique database identity, used by results and pose history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DatabaseId(u64);

impl DatabaseId {
    fn next() -> Self {
        Self(NEXT_DATABASE_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for DatabaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "db#{}", self.0)
    }
}

/// Assets a search may return poses from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssetSelection {
    All,
    /// Sorted asset indices.
    Only(Vec<usize>),
    /// The request matched no asset of this database.
    Nothing,
}

#[derive(Debug)]
pub struct PoseSearchDatabase {
    id: DatabaseId,
    name: String,
    schema: Arc<Schema>,
    config: DatabaseConfig,
    handle: IndexHandle,
}

impl PoseSearchDatabase {
    pub fn new(name: impl Into<String>, schema: Arc<Schema>, config: DatabaseConfig) -> Self {
        Self {
            id: DatabaseId::next(),
            name: name.into(),
            schema,
            config,
            handle: IndexHandle::new(),
        }
    }

    pub const fn id(&self) -> DatabaseId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub const fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub const fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    /// Publish a freshly built index. Searches started afterwards use it.
    pub fn publish_index(&self, index: SearchIndex) -> Result<u64> {
        if index.dimension() != self.schema.cardinality() {
            return Err(MatchError::DimensionMismatch {
                expected: self.schema.cardinality(),
                actual: index.dimension(),
            });
        }

        let missing = match self.config.mode {
            SearchMode::PcaKdTree if index.kd_tree().is_none() => Some("index has no KD-tree"),
            SearchMode::VpTree if index.vp_tree().is_none() => Some("index has no VP-tree"),
            _ => None,
        };
        if let Some(reason) = missing {
            return Err(MatchError::StrategyUnavailable {
                mode: self.config.mode.to_string(),
                reason: reason.to_string(),
            });
        }

        Ok(self.handle.publish(index))
    }

    pub fn begin_index_build(&self) {
        self.handle.begin_build();
    }

    pub fn fail_index_build(&self, reason: impl Into<String>) {
        self.handle.fail(reason);
    }

    pub fn build_status(&self) -> BuildStatus {
        self.handle.status()
    }

    /// Snapshot of the published index.
    pub fn index(&self) -> Result<Arc<SearchIndex>> {
        self.handle.snapshot()
    }

    fn ready_index(&self, context: &mut SearchContext<'_>) -> Option<Arc<SearchIndex>> {
        match self.handle.snapshot() {
            Ok(index) => Some(index),
            Err(err) => {
                debug!(database = %self.name, error = %err, "Search index not ready");
                context.set_index_not_ready();
                None
            }
        }
    }

    /// Search with the configured strategy, or the event search when the
    /// context carries an event.
    pub fn search(&self, context: &mut SearchContext<'_>) -> SearchResult {
        let Some(index) = self.ready_index(context) else {
            return SearchResult::default();
        };
        if index.is_empty() {
            return SearchResult::default();
        }

        let mut result = if context.event_to_search().is_some() {
            self.event_search(&index, context)
        } else {
            match self.config.mode {
                SearchMode::BruteForce => self.brute_force_search(&index, context),
                SearchMode::PcaKdTree => self.pca_kdtree_search(&index, context),
                SearchMode::VpTree => self.vptree_search(&index, context),
                SearchMode::EventOnly => SearchResult::default(),
            }
        };

        if context.debug().compare_against_brute_force {
            result.brute_force_cost = Some(match self.config.mode {
                SearchMode::PcaKdTree | SearchMode::VpTree => {
                    // the reference pass is not part of this search's work
                    let stats = *context.stats();
                    let cost = self.brute_force_search(&index, context).cost;
                    *context.stats_mut() = stats;
                    cost
                }
                SearchMode::BruteForce | SearchMode::EventOnly => result.cost,
            });
        }

        debug!(
            database = %self.name,
            mode = %self.config.mode,
            pose_index = ?result.pose_index,
            cost = %result.cost,
            poses_evaluated = context.stats().poses_evaluated,
            "Database search finished"
        );
        result
    }

    /// Exhaustive scan, whatever the configured mode.
    pub fn search_brute_force(&self, context: &mut SearchContext<'_>) -> SearchResult {
        self.ready_index(context)
            .map(|index| self.brute_force_search(&index, context))
            .unwrap_or_default()
    }

    pub fn search_pca_kdtree(&self, context: &mut SearchContext<'_>) -> SearchResult {
        self.ready_index(context)
            .map(|index| self.pca_kdtree_search(&index, context))
            .unwrap_or_default()
    }

    pub fn search_vptree(&self, context: &mut SearchContext<'_>) -> SearchResult {
        self.ready_index(context)
            .map(|index| self.vptree_search(&index, context))
            .unwrap_or_default()
    }

    pub fn search_event(&self, context: &mut SearchContext<'_>) -> SearchResult {
        self.ready_index(context)
            .map(|index| self.event_search(&index, context))
            .unwrap_or_default()
    }

    /// Re-score the pose currently playing.
    ///
    /// # Panics
    ///
    /// Panics if the context's continuing pose belongs to another database.
    pub fn search_continuing_pose(&self, context: &mut SearchContext<'_>) -> SearchResult {
        let empty = SearchResult {
            is_continuing_pose_search: true,
            ..SearchResult::default()
        };
        let Some(continuing_pose) = context.continuing_pose() else {
            return empty;
        };
        assert_eq!(
            continuing_pose.database, self.id,
            "continuing pose belongs to another database"
        );
        self.ready_index(context)
            .map_or(empty, |index| self.continuing_pose_search(&index, context, continuing_pose))
    }

    /// Run one full search per context in parallel.
    pub fn search_batch(&self, contexts: &mut [SearchContext<'_>]) -> Vec<SearchResult> {
        contexts
            .par_iter_mut()
            .map(|context| search_databases(&[self], context))
            .collect()
    }

    /// Real time in seconds of `pose_index` inside its asset.
    pub fn get_real_asset_time(&self, pose_index: usize) -> Result<f32> {
        let index = self.handle.snapshot()?;
        Ok(self.real_asset_time(&index, pose_index))
    }

    /// Real time divided by the asset's time factor.
    pub fn get_normalized_asset_time(&self, pose_index: usize) -> Result<f32> {
        let index = self.handle.snapshot()?;
        Ok(self.normalized_asset_time(&index, pose_index))
    }

    pub fn get_pose_index_from_time(&self, real_time: f32, asset: &SearchIndexAsset) -> usize {
        asset.pose_index_from_time(real_time, self.schema.sample_rate())
    }

    /// Pose of `source_asset_index` at `asset_time`, choosing the asset with
    /// matching mirroring whose blend parameters lie closest.
    pub fn get_pose_index(
        &self,
        source_asset_index: usize,
        asset_time: f32,
        mirrored: bool,
        blend_parameters: [f32; 3],
    ) -> Option<usize> {
        let index = self.handle.snapshot().ok()?;
        let sample_rate = self.schema.sample_rate();

        let mut closest: Option<(f32, usize)> = None;
        for &asset_index in index.asset_indices_for_source_asset(source_asset_index) {
            let asset = &index.assets()[asset_index];
            if asset.is_mirrored() != mirrored {
                continue;
            }
            let squared_length: f32 = blend_parameters
                .iter()
                .zip(asset.blend_parameters())
                .map(|(a, b)| (a - b) * (a - b))
                .sum();
            if closest.is_none_or(|(min, _)| squared_length < min) {
                let real_time = asset_time * asset.to_real_time_factor();
                closest = Some((squared_length, asset.pose_index_from_time(real_time, sample_rate)));
            }
        }
        closest.map(|(_, pose_index)| pose_index)
    }

    fn real_asset_time(&self, index: &SearchIndex, pose_index: usize) -> f32 {
        index
            .asset_for_pose(pose_index)
            .time_from_pose_index(pose_index, self.schema.sample_rate())
    }

    fn normalized_asset_time(&self, index: &SearchIndex, pose_index: usize) -> f32 {
        let asset = index.asset_for_pose(pose_index);
        asset.time_from_pose_index(pose_index, self.schema.sample_rate()) / asset.to_real_time_factor()
    }

    /// Index weights with every channel of a foreign debug group zeroed.
    pub fn calculate_dynamic_weights_sqrt<'i>(
        &self,
        index: &'i SearchIndex,
        debug: &DebugOptions,
    ) -> Cow<'i, [f32]> {
        let mut weights = Cow::Borrowed(index.weights_sqrt());
        for channel in self.schema.channels() {
            let Some(group) = channel.debug_weight_group_id() else {
                continue;
            };
            if group == debug.debug_weight_group_id {
                continue;
            }
            let offset = channel.channel_data_offset();
            weights.to_mut()[offset..offset + channel.channel_cardinality()].fill(0.0);
        }
        weights
    }

    /// Sorted, deduplicated poses that may not be selected this search.
    pub fn populate_non_selectable(&self, index: &SearchIndex, context: &SearchContext<'_>) -> Vec<usize> {
        let mut non_selectable = Vec::new();

        if let Some(continuing_pose) = context.continuing_pose_in(self.id) {
            let current = continuing_pose.pose_index;
            let asset = index.asset_for_pose(current);

            if asset.is_disable_reselection() {
                for &asset_index in index.asset_indices_for_source_asset(asset.source_asset_index()) {
                    non_selectable.extend(index.assets()[asset_index].pose_range());
                }
            } else {
                let (min_time, max_time) = context.pose_jump_threshold_time();
                if (min_time - max_time).abs() > NEARLY_ZERO {
                    let sample_rate = self.schema.sample_rate();
                    let current = current as i64;
                    let unbound_min = current + (min_time * sample_rate).floor() as i64;
                    let unbound_max = current + (max_time * sample_rate).ceil() as i64;
                    let first = asset.first_pose_index() as i64;
                    let num_poses = asset.num_poses() as i64;

                    if asset.is_looping() {
                        non_selectable.extend(
                            (unbound_min..unbound_max)
                                .map(|pose| (first + (pose - first).rem_euclid(num_poses)) as usize),
                        );
                    } else {
                        let min = unbound_min.max(first);
                        let max = unbound_max.min(first + num_poses);
                        non_selectable.extend((min..max).map(|pose| pose as usize));
                    }
                }
            }
        }

        if let Some(history) = context.pose_indices_history() {
            non_selectable.extend(history.poses_for(self.id));
        }

        non_selectable.sort_unstable();
        non_selectable.dedup();
        non_selectable
    }

    /// Map source assets to this database's asset indices.
    pub fn populate_selectable_assets(&self, index: &SearchIndex, assets_to_consider: &[usize]) -> AssetSelection {
        if assets_to_consider.is_empty() {
            return AssetSelection::All;
        }

        let selected: Vec<usize> = assets_to_consider
            .iter()
            .flat_map(|&source| index.asset_indices_for_source_asset(source).iter().copied())
            .sorted_unstable()
            .dedup()
            .collect();

        if selected.is_empty() {
            AssetSelection::Nothing
        } else if selected.len() == index.assets().len() {
            AssetSelection::All
        } else {
            AssetSelection::Only(selected)
        }
    }
}

/// Full motion-matching pass over several databases: the continuing pose
/// first, then every database, keeping the strictly cheapest result.
pub fn search_databases(databases: &[&PoseSearchDatabase], context: &mut SearchContext<'_>) -> SearchResult {
    let mut best = SearchResult::default();

    if let Some(continuing_pose) = context.continuing_pose() {
        match databases.iter().find(|db| db.id() == continuing_pose.database) {
            Some(database) => {
                let result = database.search_continuing_pose(context);
                context.update_current_best_total_cost(&result);
                best = best.better_of(result);
            }
            None => warn!(
                database = %continuing_pose.database,
                "Continuing pose database is not part of this search"
            ),
        }
    }

    for database in databases {
        let result = database.search(context);
        context.update_current_best_total_cost(&result);
        best = best.better_of(result);
    }
    best
}
