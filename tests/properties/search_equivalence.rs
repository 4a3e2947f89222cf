use proptest::prelude::*;

use posematch::test_utils::fixtures::{
    RandomIndexSpec, publish_database, random_parts, random_query, with_search_trees,
};
use posematch::{PoseSearchDatabase, SearchContext, SearchMode, SearchResult};

fn arb_index_spec() -> impl Strategy<Value = RandomIndexSpec> {
    (
        any::<u64>(),
        1_usize..4,
        1_usize..40,
        prop_oneof![Just(3_usize), Just(4), Just(5), Just(8)],
        0.0_f64..0.3,
        prop_oneof![Just(0.0_f32), Just(1.0)],
    )
        .prop_map(
            |(seed, num_assets, poses_per_asset, dimension, block_transition_ratio, max_cost_addend)| {
                RandomIndexSpec {
                    seed,
                    num_assets,
                    poses_per_asset,
                    dimension,
                    block_transition_ratio,
                    max_cost_addend,
                }
            },
        )
}

/// One database per strategy over the same index, each tree query exhaustive.
fn databases(spec: &RandomIndexSpec) -> [PoseSearchDatabase; 3] {
    let parts = with_search_trees(random_parts(spec).unwrap(), spec.dimension).unwrap();
    let k = (spec.num_assets * spec.poses_per_asset) as u32;
    [SearchMode::BruteForce, SearchMode::PcaKdTree, SearchMode::VpTree]
        .map(|mode| publish_database(mode.as_str(), mode, k, parts.clone()).unwrap())
}

fn search(database: &PoseSearchDatabase, query: &[f32], assets: &[usize]) -> SearchResult {
    let mut context = SearchContext::new(query.to_vec()).with_assets_to_consider(assets.to_vec());
    database.search(&mut context)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn test_exhaustive_strategies_agree_on_cost(spec in arb_index_spec(), query_seed in any::<u64>()) {
        let [brute_force, kd_tree, vp_tree] = databases(&spec);
        let query = random_query(query_seed, spec.dimension).unwrap();

        let expected = search(&brute_force, &query, &[]);
        for database in [&kd_tree, &vp_tree] {
            let actual = search(database, &query, &[]);
            prop_assert_eq!(actual.is_valid(), expected.is_valid(), "{}", database.name());
            prop_assert_eq!(actual.cost.total(), expected.cost.total(), "{}", database.name());
        }
    }

    #[test]
    fn test_exhaustive_strategies_agree_on_selected_assets(
        spec in arb_index_spec(),
        query_seed in any::<u64>(),
        selected in prop::collection::vec(0_usize..4, 1..3),
    ) {
        let [brute_force, kd_tree, vp_tree] = databases(&spec);
        let query = random_query(query_seed, spec.dimension).unwrap();

        let expected = search(&brute_force, &query, &selected);
        if let Some(pose_index) = expected.pose_index {
            let index = brute_force.index().unwrap();
            prop_assert!(selected.contains(&index.asset_for_pose(pose_index).source_asset_index()));
        }
        for database in [&kd_tree, &vp_tree] {
            let actual = search(database, &query, &selected);
            prop_assert_eq!(actual.cost.total(), expected.cost.total(), "{}", database.name());
        }
    }

    #[test]
    fn test_result_never_beaten_by_any_selectable_pose(spec in arb_index_spec(), query_seed in any::<u64>()) {
        let [brute_force, _, _] = databases(&spec);
        let index = brute_force.index().unwrap();
        let query = random_query(query_seed, spec.dimension).unwrap();
        let result = search(&brute_force, &query, &[]);

        for pose_index in 0..index.num_poses() {
            let metadata = index.pose_metadata(pose_index);
            if metadata.is_block_transition() {
                continue;
            }
            let cost = posematch::search::compare_feature_vectors(
                index.pose_values(pose_index),
                &query,
                index.weights_sqrt(),
            ) + metadata.cost_addend();
            prop_assert!(result.cost.total() <= cost * (1.0 + 1e-5) + 1e-5);
        }
    }
}
