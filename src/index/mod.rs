//! Immutable pose search index.
//!
//! A [`SearchIndex`] is produced by an external builder and shared read-only
//! by every concurrent search. It owns:
//!
//! - the pose feature vectors (or, in reconstruction mode, only their PCA
//!   encodings),
//! - per-pose [`PoseMetadata`] and per-asset [`SearchIndexAsset`] runs,
//! - the square-rooted channel weights,
//! - optional PCA basis + [`KdTree`] and optional [`VpTree`],
//! - optional deduplication maps from a shared vector to the poses using it.
//!
//! [`SearchIndex::from_parts`] validates every structural invariant once, so
//! queries only assert caller preconditions.

pub mod asset;
pub mod handle;
pub mod kdtree;
pub mod knn;
pub mod pca;
pub mod vptree;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{MatchError, Result};
use crate::search::compare::compare_feature_vectors;

pub use asset::SearchIndexAsset;
pub use handle::{BuildStatus, IndexHandle};
pub use kdtree::KdTree;
pub use knn::{FilteredMaxHeapResultSet, KnnResultSet, MaxHeapResultSet, Neighbor};
pub use pca::PcaBasis;
pub use vptree::VpTree;

/// Per-pose record, aligned 1:1 with pose indices.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PoseMetadata {
    asset_index: usize,
    cost_addend: f32,
    block_transition: bool,
}

impl PoseMetadata {
    pub const fn new(asset_index: usize, cost_addend: f32, block_transition: bool) -> Self {
        Self {
            asset_index,
            cost_addend,
            block_transition,
        }
    }

    pub const fn asset_index(&self) -> usize {
        self.asset_index
    }

    pub const fn cost_addend(&self) -> f32 {
        self.cost_addend
    }

    pub const fn is_block_transition(&self) -> bool {
        self.block_transition
    }
}

/// Poses annotated with semantic event tags.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventData {
    tagged: BTreeMap<String, Vec<usize>>,
}

impl EventData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, tag: impl Into<String>, pose_index: usize) {
        self.tagged.entry(tag.into()).or_default().push(pose_index);
    }

    #[must_use]
    pub fn with_event(mut self, tag: impl Into<String>, pose_indices: impl IntoIterator<Item = usize>) -> Self {
        let entry = self.tagged.entry(tag.into()).or_default();
        entry.extend(pose_indices);
        self
    }

    /// Sorted poses carrying `tag`.
    pub fn poses_with_event(&self, tag: &str) -> &[usize] {
        self.tagged.get(tag).map_or(&[], Vec::as_slice)
    }

    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.tagged.keys().map(String::as_str)
    }

    fn normalize(&mut self) {
        for poses in self.tagged.values_mut() {
            poses.sort_unstable();
            poses.dedup();
        }
    }
}

/// Authored replacement for the continuing-pose bias over a time range of
/// one asset.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ContinuingPoseCostOverride {
    pub asset_index: usize,
    pub start_time: f32,
    pub end_time: f32,
    pub cost_addend: f32,
}

/// Everything the index builder hands over; validated by
/// [`SearchIndex::from_parts`].
#[derive(Debug, Clone, Default)]
pub struct SearchIndexParts {
    pub dimension: usize,
    pub weights_sqrt: Vec<f32>,
    /// Flat `num_value_vectors × dimension`; empty in reconstruction mode.
    pub values: Vec<f32>,
    /// Non-empty when identical pose vectors were collapsed.
    pub values_vector_to_pose_indices: Vec<Vec<usize>>,
    pub pca: Option<PcaBasis>,
    /// Flat `num_pca_vectors × components`.
    pub pca_values: Vec<f32>,
    pub pca_values_vector_to_pose_indices: Vec<Vec<usize>>,
    pub kd_tree: Option<KdTree>,
    pub vp_tree: Option<VpTree>,
    pub pose_metadata: Vec<PoseMetadata>,
    pub assets: Vec<SearchIndexAsset>,
    /// Lower bound over all cost addends; derived when `None`.
    pub min_cost_addend: Option<f32>,
    pub events: EventData,
    pub continuing_pose_cost_overrides: Vec<ContinuingPoseCostOverride>,
}

impl SearchIndexParts {
    /// Fill `pca_values` by projecting every stored value vector.
    pub fn project_pca_values(&mut self) -> Result<()> {
        let pca = self.pca.as_ref().ok_or_else(|| {
            MatchError::InvalidIndex("cannot project PCA values without a PCA basis".to_string())
        })?;
        if self.values.is_empty() {
            return Err(MatchError::InvalidIndex(
                "cannot project PCA values without stored pose values".to_string(),
            ));
        }
        if self.weights_sqrt.len() != self.dimension || self.values.len() % self.dimension != 0 {
            return Err(MatchError::DimensionMismatch {
                expected: self.dimension,
                actual: self.weights_sqrt.len(),
            });
        }

        let components = pca.components();
        let mut pca_values = vec![0.0; self.values.len() / self.dimension * components];
        for (vector, out) in self
            .values
            .chunks_exact(self.dimension)
            .zip(pca_values.chunks_exact_mut(components))
        {
            pca.project(vector, &self.weights_sqrt, out);
        }
        self.pca_values = pca_values;
        self.pca_values_vector_to_pose_indices = self.values_vector_to_pose_indices.clone();
        Ok(())
    }

    /// Build the KD-tree over `pca_values`.
    pub fn build_kd_tree(&mut self, leaf_size: usize) -> Result<()> {
        let pca = self.pca.as_ref().ok_or_else(|| {
            MatchError::InvalidIndex("a KD-tree needs a PCA basis".to_string())
        })?;
        self.kd_tree = Some(KdTree::build(&self.pca_values, pca.components(), leaf_size));
        Ok(())
    }

    /// Build the VP-tree over the stored value vectors with the static weights.
    pub fn build_vp_tree(&mut self) -> Result<()> {
        if self.values.is_empty() || self.dimension == 0 {
            return Err(MatchError::InvalidIndex(
                "a VP-tree needs stored pose values".to_string(),
            ));
        }
        let dimension = self.dimension;
        let values = &self.values;
        let weights = &self.weights_sqrt;
        let vector = |i: usize| &values[i * dimension..(i + 1) * dimension];
        self.vp_tree = Some(VpTree::build(values.len() / dimension, |a, b| {
            compare_feature_vectors(vector(a), vector(b), weights).sqrt()
        }));
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct SearchIndex {
    dimension: usize,
    weights_sqrt: Vec<f32>,
    values: Vec<f32>,
    values_vector_to_pose_indices: Vec<Vec<usize>>,
    pose_to_values_vector: Vec<usize>,
    pca: Option<PcaBasis>,
    pca_values: Vec<f32>,
    pca_values_vector_to_pose_indices: Vec<Vec<usize>>,
    kd_tree: Option<KdTree>,
    vp_tree: Option<VpTree>,
    pose_metadata: Vec<PoseMetadata>,
    assets: Vec<SearchIndexAsset>,
    source_asset_map: BTreeMap<usize, Vec<usize>>,
    min_cost_addend: f32,
    any_block_transition: bool,
    events: EventData,
    continuing_pose_cost_overrides: Vec<ContinuingPoseCostOverride>,
}

impl SearchIndex {
    /// Validate `parts` and derive the cached lookups.
    pub fn from_parts(parts: SearchIndexParts) -> Result<Self> {
        let SearchIndexParts {
            dimension,
            weights_sqrt,
            values,
            values_vector_to_pose_indices,
            pca,
            pca_values,
            pca_values_vector_to_pose_indices,
            kd_tree,
            vp_tree,
            pose_metadata,
            assets,
            min_cost_addend,
            mut events,
            continuing_pose_cost_overrides,
        } = parts;

        if dimension == 0 {
            return Err(invalid("dimension must be positive"));
        }
        if weights_sqrt.len() != dimension {
            return Err(MatchError::DimensionMismatch {
                expected: dimension,
                actual: weights_sqrt.len(),
            });
        }
        if weights_sqrt.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(invalid("weights must be finite and non-negative"));
        }

        let num_poses = pose_metadata.len();
        validate_assets(&assets, num_poses)?;
        for (pose_index, metadata) in pose_metadata.iter().enumerate() {
            let asset = assets.get(metadata.asset_index).ok_or_else(|| {
                invalid(format!("pose {pose_index} references missing asset {}", metadata.asset_index))
            })?;
            if !asset.is_pose_in_range(pose_index) {
                return Err(invalid(format!(
                    "pose {pose_index} metadata points at asset {} covering {:?}",
                    metadata.asset_index,
                    asset.pose_range()
                )));
            }
            if !metadata.cost_addend.is_finite() {
                return Err(invalid(format!("pose {pose_index} has a non-finite cost addend")));
            }
        }

        // stored values, possibly deduplicated
        let pose_to_values_vector = if values.is_empty() {
            if !values_vector_to_pose_indices.is_empty() {
                return Err(invalid("value dedup map present without values"));
            }
            Vec::new()
        } else if values_vector_to_pose_indices.is_empty() {
            if values.len() != num_poses * dimension {
                return Err(invalid(format!(
                    "{} values stored for {num_poses} poses of dimension {dimension}",
                    values.len()
                )));
            }
            Vec::new()
        } else {
            if values.len() != values_vector_to_pose_indices.len() * dimension {
                return Err(invalid("deduplicated values do not match their pose map"));
            }
            invert_dedup_map(&values_vector_to_pose_indices, num_poses, "values")?
        };
        if values.iter().any(|v| !v.is_finite()) {
            return Err(invalid("pose values must be finite"));
        }

        // PCA data
        if let Some(pca) = &pca {
            if pca.dimension() != dimension {
                return Err(MatchError::DimensionMismatch {
                    expected: dimension,
                    actual: pca.dimension(),
                });
            }
            let expected_vectors = if pca_values_vector_to_pose_indices.is_empty() {
                num_poses
            } else {
                invert_dedup_map(&pca_values_vector_to_pose_indices, num_poses, "PCA values")?;
                pca_values_vector_to_pose_indices.len()
            };
            if pca_values.len() != expected_vectors * pca.components() {
                return Err(invalid(format!(
                    "{} PCA values stored, expected {expected_vectors}x{}",
                    pca_values.len(),
                    pca.components()
                )));
            }
        } else if !pca_values.is_empty() || !pca_values_vector_to_pose_indices.is_empty() {
            return Err(invalid("PCA values present without a PCA basis"));
        }

        if values.is_empty() && num_poses > 0 {
            if pca.is_none() {
                return Err(invalid("reconstruction mode requires a PCA basis"));
            }
            if !pca_values_vector_to_pose_indices.is_empty() {
                return Err(invalid("reconstruction is not supported with deduplicated PCA values"));
            }
        }

        // trees
        if let Some(kd_tree) = &kd_tree {
            let pca = pca
                .as_ref()
                .ok_or_else(|| invalid("KD-tree present without a PCA basis"))?;
            if kd_tree.dimension() != pca.components() {
                return Err(MatchError::DimensionMismatch {
                    expected: pca.components(),
                    actual: kd_tree.dimension(),
                });
            }
            if kd_tree.num_points() * pca.components() != pca_values.len() {
                return Err(invalid("KD-tree point count does not match the PCA values"));
            }
            if !pca_values_vector_to_pose_indices.is_empty() && values.is_empty() {
                return Err(invalid("deduplicated PCA values require stored pose values"));
            }
        }
        if let Some(vp_tree) = &vp_tree {
            if values.is_empty() {
                return Err(invalid("VP-tree present without stored pose values"));
            }
            if vp_tree.num_items() * dimension != values.len() {
                return Err(invalid("VP-tree item count does not match the stored values"));
            }
        }

        events.normalize();
        for tag in events.tags() {
            if let Some(&last) = events.poses_with_event(tag).last() {
                if last >= num_poses {
                    return Err(invalid(format!("event {tag} references pose {last} out of range")));
                }
            }
        }
        for over in &continuing_pose_cost_overrides {
            if over.asset_index >= assets.len() {
                return Err(invalid(format!(
                    "cost override references missing asset {}",
                    over.asset_index
                )));
            }
        }

        let derived_min = pose_metadata
            .iter()
            .map(PoseMetadata::cost_addend)
            .fold(None, |acc: Option<f32>, c| Some(acc.map_or(c, |a| a.min(c))))
            .unwrap_or(0.0);
        let min_cost_addend = match min_cost_addend {
            Some(bound) if num_poses > 0 && bound > derived_min => {
                return Err(invalid(format!(
                    "min_cost_addend {bound} exceeds the smallest pose cost addend {derived_min}"
                )));
            }
            Some(bound) => bound,
            None => derived_min,
        };

        let mut source_asset_map: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        for (asset_index, asset) in assets.iter().enumerate() {
            source_asset_map
                .entry(asset.source_asset_index())
                .or_default()
                .push(asset_index);
        }

        let any_block_transition = pose_metadata.iter().any(PoseMetadata::is_block_transition);

        Ok(Self {
            dimension,
            weights_sqrt,
            values,
            values_vector_to_pose_indices,
            pose_to_values_vector,
            pca,
            pca_values,
            pca_values_vector_to_pose_indices,
            kd_tree,
            vp_tree,
            pose_metadata,
            assets,
            source_asset_map,
            min_cost_addend,
            any_block_transition,
            events,
            continuing_pose_cost_overrides,
        })
    }

    pub const fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn num_poses(&self) -> usize {
        self.pose_metadata.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pose_metadata.is_empty()
    }

    pub fn weights_sqrt(&self) -> &[f32] {
        &self.weights_sqrt
    }

    /// True in reconstruction mode.
    pub fn is_values_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn are_values_deduplicated(&self) -> bool {
        !self.values_vector_to_pose_indices.is_empty()
    }

    pub fn are_pca_values_deduplicated(&self) -> bool {
        !self.pca_values_vector_to_pose_indices.is_empty()
    }

    pub const fn min_cost_addend(&self) -> f32 {
        self.min_cost_addend
    }

    pub const fn any_block_transition(&self) -> bool {
        self.any_block_transition
    }

    /// # Panics
    ///
    /// Panics if `pose_index` is out of range.
    pub fn pose_metadata(&self, pose_index: usize) -> &PoseMetadata {
        &self.pose_metadata[pose_index]
    }

    pub fn assets(&self) -> &[SearchIndexAsset] {
        &self.assets
    }

    pub fn events(&self) -> &EventData {
        &self.events
    }

    pub fn pca(&self) -> Option<&PcaBasis> {
        self.pca.as_ref()
    }

    pub fn kd_tree(&self) -> Option<&KdTree> {
        self.kd_tree.as_ref()
    }

    pub fn vp_tree(&self) -> Option<&VpTree> {
        self.vp_tree.as_ref()
    }

    pub fn num_value_vectors(&self) -> usize {
        self.values.len() / self.dimension
    }

    pub fn value_vector(&self, vector_index: usize) -> &[f32] {
        &self.values[vector_index * self.dimension..(vector_index + 1) * self.dimension]
    }

    pub fn values_vector_to_pose_indices(&self, vector_index: usize) -> &[usize] {
        &self.values_vector_to_pose_indices[vector_index]
    }

    pub fn num_pca_vectors(&self) -> usize {
        self.pca
            .as_ref()
            .map_or(0, |pca| self.pca_values.len() / pca.components())
    }

    /// Flat `num_pca_vectors × components` buffer the KD-tree indexes into.
    pub fn pca_values(&self) -> &[f32] {
        &self.pca_values
    }

    pub fn pca_values_vector(&self, vector_index: usize) -> &[f32] {
        let components = self.pca.as_ref().map_or(0, PcaBasis::components);
        &self.pca_values[vector_index * components..(vector_index + 1) * components]
    }

    pub fn pca_values_vector_to_pose_indices(&self, vector_index: usize) -> &[usize] {
        &self.pca_values_vector_to_pose_indices[vector_index]
    }

    /// Stored feature vector of `pose_index`.
    ///
    /// # Panics
    ///
    /// Panics in reconstruction mode or when `pose_index` is out of range.
    pub fn pose_values(&self, pose_index: usize) -> &[f32] {
        assert!(!self.values.is_empty(), "pose values are not stored; use pose_values_with");
        assert!(pose_index < self.num_poses(), "pose {pose_index} out of range");
        let vector_index = if self.pose_to_values_vector.is_empty() {
            pose_index
        } else {
            self.pose_to_values_vector[pose_index]
        };
        self.value_vector(vector_index)
    }

    /// Stored vector, or the reconstruction written into `scratch`.
    pub fn pose_values_with<'a>(&'a self, pose_index: usize, scratch: &'a mut [f32]) -> &'a [f32] {
        if self.values.is_empty() {
            self.reconstruct_pose_values(pose_index, scratch)
        } else {
            self.pose_values(pose_index)
        }
    }

    /// Rebuild the (lossy) feature vector of `pose_index` from its PCA
    /// encoding into `scratch`.
    ///
    /// # Panics
    ///
    /// Panics without a PCA basis, or if `scratch` does not hold exactly
    /// `dimension` floats.
    pub fn reconstruct_pose_values<'a>(&self, pose_index: usize, scratch: &'a mut [f32]) -> &'a [f32] {
        assert_eq!(
            scratch.len(),
            self.dimension,
            "reconstruction buffer must hold {} floats",
            self.dimension
        );
        assert!(pose_index < self.num_poses(), "pose {pose_index} out of range");
        let pca = self
            .pca
            .as_ref()
            .unwrap_or_else(|| panic!("reconstruction requires a PCA basis"));
        pca.reconstruct(self.pca_values_vector(pose_index), &self.weights_sqrt, scratch)
    }

    /// Project a full query into PCA space using `scratch` (`components`
    /// floats) as the output.
    ///
    /// # Panics
    ///
    /// Panics without a PCA basis or with a missized buffer.
    pub fn pca_project<'a>(&self, query: &[f32], scratch: &'a mut [f32]) -> &'a [f32] {
        let pca = self
            .pca
            .as_ref()
            .unwrap_or_else(|| panic!("PCA projection requires a PCA basis"));
        pca.project(query, &self.weights_sqrt, scratch)
    }

    /// Index into [`Self::assets`] of the asset owning `pose_index`.
    ///
    /// # Panics
    ///
    /// Panics if `pose_index` is out of range.
    pub fn asset_index_for_pose(&self, pose_index: usize) -> usize {
        assert!(
            pose_index < self.num_poses(),
            "pose {pose_index} out of range 0..{}",
            self.num_poses()
        );
        self.assets
            .partition_point(|asset| asset.first_pose_index() <= pose_index)
            - 1
    }

    pub fn asset_for_pose(&self, pose_index: usize) -> &SearchIndexAsset {
        &self.assets[self.asset_index_for_pose(pose_index)]
    }

    /// Assets sampled from `source_asset_index`, ascending.
    pub fn asset_indices_for_source_asset(&self, source_asset_index: usize) -> &[usize] {
        self.source_asset_map
            .get(&source_asset_index)
            .map_or(&[], Vec::as_slice)
    }

    pub fn poses_with_event(&self, tag: &str) -> &[usize] {
        self.events.poses_with_event(tag)
    }

    /// VP-tree metric between stored vector `vector_index` and `query`.
    pub fn vp_distance(&self, vector_index: usize, query: &[f32]) -> f32 {
        compare_feature_vectors(self.value_vector(vector_index), query, &self.weights_sqrt).sqrt()
    }

    /// Authored continuing-pose bias for `pose_index`, if any range covers it.
    pub fn continuing_pose_cost_override(&self, pose_index: usize, sample_rate: f32) -> Option<f32> {
        if self.continuing_pose_cost_overrides.is_empty() {
            return None;
        }
        let asset_index = self.asset_index_for_pose(pose_index);
        let time = self.assets[asset_index].time_from_pose_index(pose_index, sample_rate);
        self.continuing_pose_cost_overrides
            .iter()
            .find(|over| {
                over.asset_index == asset_index && over.start_time <= time && time <= over.end_time
            })
            .map(|over| over.cost_addend)
    }
}

fn invalid(message: impl Into<String>) -> MatchError {
    MatchError::InvalidIndex(message.into())
}

fn validate_assets(assets: &[SearchIndexAsset], num_poses: usize) -> Result<()> {
    let mut expected_first = 0;
    for (asset_index, asset) in assets.iter().enumerate() {
        if asset.num_poses() == 0 {
            return Err(invalid(format!("asset {asset_index} has no poses")));
        }
        if asset.first_pose_index() != expected_first {
            return Err(invalid(format!(
                "asset {asset_index} starts at pose {}, expected {expected_first}",
                asset.first_pose_index()
            )));
        }
        if !(asset.to_real_time_factor() > f32::EPSILON) {
            return Err(invalid(format!(
                "asset {asset_index} has a non-positive time factor"
            )));
        }
        expected_first = asset.end_pose_index();
    }
    if expected_first != num_poses {
        return Err(invalid(format!(
            "assets cover {expected_first} poses, index holds {num_poses}"
        )));
    }
    Ok(())
}

fn invert_dedup_map(map: &[Vec<usize>], num_poses: usize, what: &str) -> Result<Vec<usize>> {
    let mut pose_to_vector = vec![usize::MAX; num_poses];
    for (vector_index, poses) in map.iter().enumerate() {
        if poses.is_empty() {
            return Err(invalid(format!("{what} vector {vector_index} maps to no pose")));
        }
        for &pose in poses {
            let slot = pose_to_vector
                .get_mut(pose)
                .ok_or_else(|| invalid(format!("{what} map references pose {pose} out of range")))?;
            if *slot != usize::MAX {
                return Err(invalid(format!("{what} map lists pose {pose} twice")));
            }
            *slot = vector_index;
        }
    }
    if pose_to_vector.contains(&usize::MAX) {
        return Err(invalid(format!("{what} map does not cover every pose")));
    }
    Ok(pose_to_vector)
}
