//! Per-query search state.
//!
//! A [`SearchContext`] is built by the caller for one evaluation tick and
//! owned by one thread. It carries the query (or a way to build it), the best
//! cost found so far across databases, inclusion/exclusion inputs, and the
//! scratch buffers strategies need.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::config::DebugOptions;
use crate::database::DatabaseId;
use crate::schema::Schema;
use crate::search::result::SearchResult;

/// Builds the query vector for a schema on first use.
pub type QueryBuilder = Box<dyn Fn(&Schema) -> Vec<f32> + Send + Sync>;

/// The pose currently being played.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContinuingPose {
    pub database: DatabaseId,
    pub pose_index: usize,
    /// Normalized asset time reported back for a continuing-pose result.
    pub asset_time: f32,
}

impl ContinuingPose {
    /// The continuing pose matching a previous result, if it had one.
    pub fn from_result(result: &SearchResult) -> Option<Self> {
        Some(Self {
            database: result.database?,
            pose_index: result.pose_index?,
            asset_time: result.asset_time,
        })
    }
}

/// Request to land on poses tagged with `tag`, `time_to_event` seconds
/// ahead of the tagged sample.
#[derive(Debug, Clone, PartialEq)]
pub struct PoseSearchEvent {
    pub tag: String,
    pub time_to_event: f32,
    /// Allowed play-rate range scaling `time_to_event`.
    pub play_rate_range: (f32, f32),
    /// Apply continuing-pose, pose-jump and history exclusions.
    pub enable_pose_filters: bool,
}

impl PoseSearchEvent {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            time_to_event: 0.0,
            play_rate_range: (1.0, 1.0),
            enable_pose_filters: true,
        }
    }

    #[must_use]
    pub const fn with_time_to_event(mut self, time_to_event: f32) -> Self {
        self.time_to_event = time_to_event;
        self
    }

    #[must_use]
    pub const fn with_play_rate_range(mut self, min: f32, max: f32) -> Self {
        self.play_rate_range = (min, max);
        self
    }

    #[must_use]
    pub const fn with_pose_filters(mut self, enable: bool) -> Self {
        self.enable_pose_filters = enable;
        self
    }
}

/// Recently selected poses, excluded from reselection until they age out.
#[derive(Debug, Clone, Default)]
pub struct PoseIndicesHistory {
    max_time: f32,
    ages: HashMap<(DatabaseId, usize), f32>,
}

impl PoseIndicesHistory {
    pub fn new(max_time: f32) -> Self {
        Self {
            max_time,
            ages: HashMap::new(),
        }
    }

    /// Age every entry by `delta_time`, drop the expired ones, then record
    /// the pose selected by `result`.
    pub fn update(&mut self, result: &SearchResult, delta_time: f32) {
        if self.max_time <= 0.0 {
            self.ages.clear();
            return;
        }

        let max_time = self.max_time;
        self.ages.retain(|_, age| {
            *age += delta_time;
            *age <= max_time
        });

        if let (Some(database), Some(pose_index)) = (result.database, result.pose_index) {
            self.ages.insert((database, pose_index), 0.0);
        }
    }

    /// Recorded poses of `database`, unordered.
    pub fn poses_for(&self, database: DatabaseId) -> impl Iterator<Item = usize> + '_ {
        self.ages
            .keys()
            .filter(move |(db, _)| *db == database)
            .map(|(_, pose_index)| *pose_index)
    }

    pub fn len(&self) -> usize {
        self.ages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ages.is_empty()
    }

    pub fn clear(&mut self) {
        self.ages.clear();
    }
}

/// Caller-sized buffers reused across the strategies of one context.
///
/// Buffers from [`SearchScratch::with_capacity`] are never resized: a
/// database needing more room than they hold is a caller bug and panics.
/// The default scratch grows on demand.
#[derive(Debug, Clone, Default)]
pub struct SearchScratch {
    reconstruction: Vec<f32>,
    pca_query: Vec<f32>,
    caller_sized: bool,
}

impl SearchScratch {
    pub fn with_capacity(max_dimension: usize, max_components: usize) -> Self {
        Self {
            reconstruction: vec![0.0; max_dimension],
            pca_query: vec![0.0; max_components],
            caller_sized: true,
        }
    }

    /// `(reconstruction, pca_query)` views of exactly the requested sizes.
    pub(crate) fn buffers(&mut self, dimension: usize, components: usize) -> (&mut [f32], &mut [f32]) {
        if self.caller_sized {
            assert!(
                self.reconstruction.len() >= dimension,
                "reconstruction scratch buffer holds {} floats, {dimension} required",
                self.reconstruction.len()
            );
            assert!(
                self.pca_query.len() >= components,
                "PCA scratch buffer holds {} floats, {components} required",
                self.pca_query.len()
            );
        } else {
            if self.reconstruction.len() < dimension {
                self.reconstruction.resize(dimension, 0.0);
            }
            if self.pca_query.len() < components {
                self.pca_query.resize(components, 0.0);
            }
        }
        (
            &mut self.reconstruction[..dimension],
            &mut self.pca_query[..components],
        )
    }
}

/// Work counters accumulated over every search run with one context.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SearchStats {
    /// Candidates whose cost was computed.
    pub poses_evaluated: usize,
    /// Candidates rejected by the filter chain.
    pub poses_filtered: usize,
    /// Searches skipped by a cost bound.
    pub searches_skipped: usize,
}

/// Borrowed pieces handed to a strategy once the query is resolved.
pub(crate) struct SearchParts<'c> {
    pub query: &'c [f32],
    pub scratch: &'c mut SearchScratch,
    pub stats: &'c mut SearchStats,
}

pub struct SearchContext<'h> {
    query: Option<Vec<f32>>,
    query_builder: Option<QueryBuilder>,
    cached_queries: Vec<(Arc<Schema>, Vec<f32>)>,
    current_best_total_cost: f32,
    assets_to_consider: Vec<usize>,
    pose_indices_history: Option<&'h PoseIndicesHistory>,
    continuing_pose: Option<ContinuingPose>,
    event_to_search: Option<PoseSearchEvent>,
    is_continuing_interaction: bool,
    pose_jump_threshold_time: (f32, f32),
    debug: DebugOptions,
    scratch: SearchScratch,
    stats: SearchStats,
    index_not_ready: bool,
}

impl fmt::Debug for SearchContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SearchContext")
            .field("query", &self.query)
            .field("has_query_builder", &self.query_builder.is_some())
            .field("current_best_total_cost", &self.current_best_total_cost)
            .field("assets_to_consider", &self.assets_to_consider)
            .field("continuing_pose", &self.continuing_pose)
            .field("event_to_search", &self.event_to_search)
            .field("is_continuing_interaction", &self.is_continuing_interaction)
            .field("debug", &self.debug)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

impl Default for SearchContext<'_> {
    fn default() -> Self {
        Self {
            query: None,
            query_builder: None,
            cached_queries: Vec::new(),
            current_best_total_cost: f32::MAX,
            assets_to_consider: Vec::new(),
            pose_indices_history: None,
            continuing_pose: None,
            event_to_search: None,
            is_continuing_interaction: false,
            pose_jump_threshold_time: (0.0, 0.0),
            debug: DebugOptions::default(),
            scratch: SearchScratch::default(),
            stats: SearchStats::default(),
            index_not_ready: false,
        }
    }
}

impl<'h> SearchContext<'h> {
    /// Context with a ready-made query vector.
    pub fn new(query: Vec<f32>) -> Self {
        Self {
            query: Some(query),
            ..Self::default()
        }
    }

    /// Context whose query is built lazily, once per schema.
    pub fn with_query_builder(builder: QueryBuilder) -> Self {
        Self {
            query_builder: Some(builder),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_assets_to_consider(mut self, source_assets: Vec<usize>) -> Self {
        self.assets_to_consider = source_assets;
        self
    }

    #[must_use]
    pub const fn with_pose_history(mut self, history: &'h PoseIndicesHistory) -> Self {
        self.pose_indices_history = Some(history);
        self
    }

    #[must_use]
    pub const fn with_continuing_pose(mut self, continuing_pose: ContinuingPose) -> Self {
        self.continuing_pose = Some(continuing_pose);
        self
    }

    #[must_use]
    pub fn with_event(mut self, event: PoseSearchEvent) -> Self {
        self.event_to_search = Some(event);
        self
    }

    #[must_use]
    pub const fn with_continuing_interaction(mut self, is_continuing_interaction: bool) -> Self {
        self.is_continuing_interaction = is_continuing_interaction;
        self
    }

    /// Window in seconds around the continuing pose that may not be jumped to.
    #[must_use]
    pub const fn with_pose_jump_threshold_time(mut self, min: f32, max: f32) -> Self {
        self.pose_jump_threshold_time = (min, max);
        self
    }

    #[must_use]
    pub const fn with_debug_options(mut self, debug: DebugOptions) -> Self {
        self.debug = debug;
        self
    }

    #[must_use]
    pub fn with_scratch(mut self, scratch: SearchScratch) -> Self {
        self.scratch = scratch;
        self
    }

    #[must_use]
    pub const fn with_current_best_total_cost(mut self, cost: f32) -> Self {
        self.current_best_total_cost = cost;
        self
    }

    pub const fn current_best_total_cost(&self) -> f32 {
        self.current_best_total_cost
    }

    /// Lower the running best; never raises it.
    pub fn update_current_best_total_cost(&mut self, result: &SearchResult) {
        if result.is_valid() && result.cost.total() < self.current_best_total_cost {
            self.current_best_total_cost = result.cost.total();
        }
    }

    pub fn assets_to_consider(&self) -> &[usize] {
        &self.assets_to_consider
    }

    pub const fn pose_indices_history(&self) -> Option<&'h PoseIndicesHistory> {
        self.pose_indices_history
    }

    pub const fn continuing_pose(&self) -> Option<ContinuingPose> {
        self.continuing_pose
    }

    /// The continuing pose when it belongs to `database`.
    pub fn continuing_pose_in(&self, database: DatabaseId) -> Option<ContinuingPose> {
        self.continuing_pose.filter(|pose| pose.database == database)
    }

    pub const fn event_to_search(&self) -> Option<&PoseSearchEvent> {
        self.event_to_search.as_ref()
    }

    pub const fn is_continuing_interaction(&self) -> bool {
        self.is_continuing_interaction
    }

    pub const fn pose_jump_threshold_time(&self) -> (f32, f32) {
        self.pose_jump_threshold_time
    }

    pub const fn debug(&self) -> &DebugOptions {
        &self.debug
    }

    pub const fn skip_search_if_possible(&self) -> bool {
        self.debug.skip_search_if_possible()
    }

    pub const fn stats(&self) -> &SearchStats {
        &self.stats
    }

    pub(crate) fn stats_mut(&mut self) -> &mut SearchStats {
        &mut self.stats
    }

    /// True once any database reported its index as not ready.
    pub const fn is_index_not_ready(&self) -> bool {
        self.index_not_ready
    }

    pub(crate) fn set_index_not_ready(&mut self) {
        self.index_not_ready = true;
    }

    /// Query vector for `schema`, building and caching it when needed.
    pub fn query_for(&mut self, schema: &Arc<Schema>) -> Option<&[f32]> {
        self.split_for_search(schema).map(|parts| parts.query)
    }

    pub(crate) fn split_for_search(&mut self, schema: &Arc<Schema>) -> Option<SearchParts<'_>> {
        if self.query.is_none()
            && !self
                .cached_queries
                .iter()
                .any(|(cached, _)| Arc::ptr_eq(cached, schema))
        {
            let builder = self.query_builder.as_ref()?;
            let query = builder(schema);
            self.cached_queries.push((Arc::clone(schema), query));
        }

        let query = match &self.query {
            Some(query) => query.as_slice(),
            None => self
                .cached_queries
                .iter()
                .find(|(cached, _)| Arc::ptr_eq(cached, schema))
                .map(|(_, query)| query.as_slice())?,
        };

        Some(SearchParts {
            query,
            scratch: &mut self.scratch,
            stats: &mut self.stats,
        })
    }
}
