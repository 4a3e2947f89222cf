use proptest::prelude::*;

use crate::index::{PoseMetadata, SearchIndexAsset, SearchIndexParts};

pub fn arb_feature_vector(dimension: usize) -> impl Strategy<Value = Vec<f32>> {
    prop::collection::vec(-10.0_f32..10.0, dimension)
}

pub fn arb_weights_sqrt(dimension: usize) -> impl Strategy<Value = Vec<f32>> {
    prop::collection::vec(0.0_f32..3.0, dimension)
}

/// Pose counts of 1 to 4 back-to-back assets.
pub fn arb_asset_layout() -> impl Strategy<Value = Vec<usize>> {
    prop::collection::vec(1_usize..16, 1..5)
}

fn assets_from_layout(layout: &[usize], looping: &[bool]) -> Vec<SearchIndexAsset> {
    let mut first = 0;
    layout
        .iter()
        .zip(looping)
        .enumerate()
        .map(|(i, (&num_poses, &is_looping))| {
            let asset = SearchIndexAsset::new(i, first, num_poses).with_looping(is_looping);
            first += num_poses;
            asset
        })
        .collect()
}

/// Valid index parts without PCA or trees.
pub fn arb_index_parts() -> impl Strategy<Value = SearchIndexParts> {
    (1_usize..10, arb_asset_layout()).prop_flat_map(|(dimension, layout)| {
        let num_poses: usize = layout.iter().sum();
        (
            Just(dimension),
            Just(layout.clone()),
            prop::collection::vec(any::<bool>(), layout.len()),
            arb_weights_sqrt(dimension),
            arb_feature_vector(num_poses * dimension),
            prop::collection::vec((0.0_f32..2.0, prop::bool::weighted(0.1)), num_poses),
        )
            .prop_map(|(dimension, layout, looping, weights_sqrt, values, metadata)| {
                let assets = assets_from_layout(&layout, &looping);
                let pose_metadata = assets
                    .iter()
                    .enumerate()
                    .flat_map(|(asset_index, asset)| asset.pose_range().map(move |_| asset_index))
                    .zip(metadata)
                    .map(|(asset_index, (addend, block))| PoseMetadata::new(asset_index, addend, block))
                    .collect();
                SearchIndexParts {
                    dimension,
                    weights_sqrt,
                    values,
                    pose_metadata,
                    assets,
                    ..Default::default()
                }
            })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::SearchIndex;
    use crate::search::compare::{compare_aligned_feature_vectors, compare_feature_vectors};

    proptest! {
        #[test]
        fn generated_parts_build_an_index(parts in arb_index_parts()) {
            let num_poses = parts.pose_metadata.len();
            let index = SearchIndex::from_parts(parts).unwrap();
            prop_assert_eq!(index.num_poses(), num_poses);
            prop_assert!(index.min_cost_addend() >= 0.0);
        }

        #[test]
        fn every_pose_maps_back_to_its_asset(parts in arb_index_parts()) {
            let index = SearchIndex::from_parts(parts).unwrap();
            for pose_index in 0..index.num_poses() {
                prop_assert!(index.asset_for_pose(pose_index).is_pose_in_range(pose_index));
            }
        }

        #[test]
        fn aligned_comparator_tracks_generic(
            (pose, query, weights) in (1_usize..6).prop_flat_map(|lanes| {
                let dimension = lanes * 4;
                (arb_feature_vector(dimension), arb_feature_vector(dimension), arb_weights_sqrt(dimension))
            })
        ) {
            let generic = compare_feature_vectors(&pose, &query, &weights);
            let aligned = compare_aligned_feature_vectors(&pose, &query, &weights);
            prop_assert!((generic - aligned).abs() <= 1e-3 * generic.max(1.0));
        }
    }
}
