//! Synthetic pose databases for tests and benchmarks.

use std::collections::HashMap;
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};

use crate::config::{DatabaseConfig, SearchMode};
use crate::database::PoseSearchDatabase;
use crate::error::{MatchError, Result};
use crate::index::kdtree::DEFAULT_LEAF_SIZE;
use crate::index::{PcaBasis, PoseMetadata, SearchIndex, SearchIndexAsset, SearchIndexParts};
use crate::schema::Schema;

pub const SAMPLE_RATE: f32 = 30.0;

pub const SCENARIO_NUM_ASSETS: usize = 3;
pub const SCENARIO_POSES_PER_ASSET: usize = 10;
pub const SCENARIO_DIMENSION: usize = 8;

/// Stored vector of scenario pose `pose_index`; every pose is distinct.
pub fn scenario_values(pose_index: usize) -> Vec<f32> {
    (0..SCENARIO_DIMENSION)
        .map(|d| pose_index as f32 + d as f32 * 0.25)
        .collect()
}

/// `num_assets` back-to-back assets; asset `i` is sampled from source asset `i`.
pub fn uniform_assets(num_assets: usize, poses_per_asset: usize) -> Vec<SearchIndexAsset> {
    (0..num_assets)
        .map(|asset| SearchIndexAsset::new(asset, asset * poses_per_asset, poses_per_asset))
        .collect()
}

/// One metadata entry per pose of `assets`, all with `cost_addend`.
pub fn metadata_for(assets: &[SearchIndexAsset], cost_addend: f32) -> Vec<PoseMetadata> {
    assets
        .iter()
        .enumerate()
        .flat_map(|(asset_index, asset)| {
            asset
                .pose_range()
                .map(move |_| PoseMetadata::new(asset_index, cost_addend, false))
        })
        .collect()
}

/// 3 assets x 10 poses, dimension 8, unit weights, zero cost addends.
pub fn scenario_parts() -> SearchIndexParts {
    let assets = uniform_assets(SCENARIO_NUM_ASSETS, SCENARIO_POSES_PER_ASSET);
    let num_poses = SCENARIO_NUM_ASSETS * SCENARIO_POSES_PER_ASSET;
    SearchIndexParts {
        dimension: SCENARIO_DIMENSION,
        weights_sqrt: vec![1.0; SCENARIO_DIMENSION],
        values: (0..num_poses).flat_map(scenario_values).collect(),
        pose_metadata: metadata_for(&assets, 0.0),
        assets,
        ..Default::default()
    }
}

#[derive(Debug, Clone)]
pub struct RandomIndexSpec {
    pub seed: u64,
    pub num_assets: usize,
    pub poses_per_asset: usize,
    pub dimension: usize,
    /// Probability that a pose is flagged as a block transition.
    pub block_transition_ratio: f64,
    /// Cost addends are drawn from `[0, max_cost_addend)`.
    pub max_cost_addend: f32,
}

impl Default for RandomIndexSpec {
    fn default() -> Self {
        Self {
            seed: 0x5eed,
            num_assets: 4,
            poses_per_asset: 50,
            dimension: 12,
            block_transition_ratio: 0.0,
            max_cost_addend: 0.0,
        }
    }
}

/// Gaussian pose vectors with random weights; odd assets loop.
pub fn random_parts(spec: &RandomIndexSpec) -> Result<SearchIndexParts> {
    let mut rng = StdRng::seed_from_u64(spec.seed);
    let normal = Normal::new(0.0_f32, 1.0).map_err(|err| MatchError::InvalidIndex(err.to_string()))?;

    let assets: Vec<SearchIndexAsset> = uniform_assets(spec.num_assets, spec.poses_per_asset)
        .into_iter()
        .enumerate()
        .map(|(i, asset)| asset.with_looping(i % 2 == 1))
        .collect();
    let num_poses = spec.num_assets * spec.poses_per_asset;

    let values = (0..num_poses * spec.dimension)
        .map(|_| normal.sample(&mut rng))
        .collect();
    let weights_sqrt = (0..spec.dimension)
        .map(|_| rng.random_range(0.5..2.0))
        .collect();
    let pose_metadata = metadata_for(&assets, 0.0)
        .into_iter()
        .map(|metadata| {
            let cost_addend = if spec.max_cost_addend > 0.0 {
                rng.random_range(0.0..spec.max_cost_addend)
            } else {
                0.0
            };
            let block = spec.block_transition_ratio > 0.0 && rng.random_bool(spec.block_transition_ratio);
            PoseMetadata::new(metadata.asset_index(), cost_addend, block)
        })
        .collect();

    Ok(SearchIndexParts {
        dimension: spec.dimension,
        weights_sqrt,
        values,
        pose_metadata,
        assets,
        ..Default::default()
    })
}

pub fn random_query(seed: u64, dimension: usize) -> Result<Vec<f32>> {
    let mut rng = StdRng::seed_from_u64(seed);
    let normal = Normal::new(0.0_f32, 1.2).map_err(|err| MatchError::InvalidIndex(err.to_string()))?;
    Ok((0..dimension).map(|_| normal.sample(&mut rng)).collect())
}

/// Attach a truncated-identity PCA basis, a KD-tree and a VP-tree.
///
/// With `components == dimension` the KD-tree ranks candidates exactly by
/// their weighted cost.
pub fn with_search_trees(mut parts: SearchIndexParts, components: usize) -> Result<SearchIndexParts> {
    parts.pca = Some(PcaBasis::truncated_identity(parts.dimension, components)?);
    parts.project_pca_values()?;
    parts.build_kd_tree(DEFAULT_LEAF_SIZE)?;
    parts.build_vp_tree()?;
    Ok(parts)
}

/// Collapse bit-identical pose vectors into shared value and PCA vectors.
pub fn deduplicate_values(mut parts: SearchIndexParts) -> SearchIndexParts {
    let dimension = parts.dimension;
    let mut seen: HashMap<Vec<u32>, usize> = HashMap::new();
    let mut values = Vec::new();
    let mut vector_to_poses: Vec<Vec<usize>> = Vec::new();

    for (pose_index, vector) in parts.values.chunks_exact(dimension).enumerate() {
        let key: Vec<u32> = vector.iter().map(|v| v.to_bits()).collect();
        let vector_index = *seen.entry(key).or_insert_with(|| {
            values.extend_from_slice(vector);
            vector_to_poses.push(Vec::new());
            vector_to_poses.len() - 1
        });
        vector_to_poses[vector_index].push(pose_index);
    }

    parts.values = values;
    parts.values_vector_to_pose_indices = vector_to_poses;
    parts
}

/// Give pose `i` the vector of pose `i % distinct`, leaving at most
/// `distinct` unique vectors.
pub fn repeat_pose_values(mut parts: SearchIndexParts, distinct: usize) -> SearchIndexParts {
    let dimension = parts.dimension;
    let num_poses = parts.values.len() / dimension;
    let distinct = distinct.clamp(1, num_poses.max(1));
    for pose_index in distinct..num_poses {
        let source = (pose_index % distinct) * dimension;
        parts
            .values
            .copy_within(source..source + dimension, pose_index * dimension);
    }
    parts
}

/// Database over `parts` with a single unfiltered channel, index published.
pub fn publish_database(
    name: &str,
    mode: SearchMode,
    num_neighbors: u32,
    parts: SearchIndexParts,
) -> Result<PoseSearchDatabase> {
    let config = DatabaseConfig {
        mode,
        kd_tree_query_num_neighbors: num_neighbors,
        ..DatabaseConfig::default()
    };
    publish_database_with_config(name, config, parts)
}

pub fn publish_database_with_config(
    name: &str,
    config: DatabaseConfig,
    parts: SearchIndexParts,
) -> Result<PoseSearchDatabase> {
    let schema = Arc::new(Schema::single_channel(SAMPLE_RATE, parts.dimension)?);
    let database = PoseSearchDatabase::new(name, schema, config);
    database.publish_index(SearchIndex::from_parts(parts)?)?;
    Ok(database)
}

/// The 30-pose scenario database with both trees and exhaustive `k`.
pub fn scenario_database(mode: SearchMode) -> Result<PoseSearchDatabase> {
    let parts = with_search_trees(scenario_parts(), SCENARIO_DIMENSION)?;
    let num_poses = SCENARIO_NUM_ASSETS * SCENARIO_POSES_PER_ASSET;
    publish_database("scenario", mode, num_poses as u32, parts)
}
