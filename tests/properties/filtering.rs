use proptest::prelude::*;

use posematch::test_utils::fixtures::{
    RandomIndexSpec, publish_database, random_parts, random_query, with_search_trees,
};
use posematch::{
    DebugOptions, PoseIndicesHistory, PoseSearchDatabase, SearchContext, SearchMode,
    SearchResult,
};

fn database(mode: SearchMode, seed: u64, max_cost_addend: f32) -> PoseSearchDatabase {
    let spec = RandomIndexSpec {
        seed,
        num_assets: 3,
        poses_per_asset: 20,
        dimension: 6,
        block_transition_ratio: 0.1,
        max_cost_addend,
    };
    let parts = with_search_trees(random_parts(&spec).unwrap(), 6).unwrap();
    publish_database("filtering", mode, 60, parts).unwrap()
}

fn history_of(database: &PoseSearchDatabase, poses: &[usize]) -> PoseIndicesHistory {
    let mut history = PoseIndicesHistory::new(10.0);
    for &pose_index in poses {
        let selected = SearchResult {
            pose_index: Some(pose_index),
            database: Some(database.id()),
            ..SearchResult::default()
        };
        history.update(&selected, 0.01);
    }
    history
}

fn arb_mode() -> impl Strategy<Value = SearchMode> {
    prop_oneof![
        Just(SearchMode::BruteForce),
        Just(SearchMode::PcaKdTree),
        Just(SearchMode::VpTree),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn test_excluding_more_poses_never_lowers_cost(
        mode in arb_mode(),
        seed in any::<u64>(),
        excluded in prop::collection::vec(0_usize..60, 0..20),
        split in 0_usize..20,
    ) {
        let database = database(mode, seed, 0.0);
        let query = random_query(seed ^ 0xabcd, 6).unwrap();
        let split = split.min(excluded.len());

        let fewer = history_of(&database, &excluded[..split]);
        let more = history_of(&database, &excluded);

        let mut context = SearchContext::new(query.clone()).with_pose_history(&fewer);
        let relaxed = database.search(&mut context);
        let mut context = SearchContext::new(query).with_pose_history(&more);
        let strict = database.search(&mut context);

        prop_assert!(strict.cost.total() >= relaxed.cost.total());
        if let Some(pose_index) = strict.pose_index {
            prop_assert!(!excluded.contains(&pose_index));
        }
    }

    #[test]
    fn test_narrowing_assets_never_lowers_cost(
        mode in arb_mode(),
        seed in any::<u64>(),
        asset in 0_usize..3,
    ) {
        let database = database(mode, seed, 0.0);
        let query = random_query(seed.wrapping_add(7), 6).unwrap();

        let all = database.search(&mut SearchContext::new(query.clone()));
        let narrowed = database.search(&mut SearchContext::new(query).with_assets_to_consider(vec![asset]));
        prop_assert!(narrowed.cost.total() >= all.cost.total());
    }

    #[test]
    fn test_skipped_search_could_not_have_won(
        mode in arb_mode(),
        seed in any::<u64>(),
        best in 0.0_f32..2.0,
    ) {
        let database = database(mode, seed, 1.5);
        let query = random_query(seed.rotate_left(11), 6).unwrap();

        let full = database.search(&mut SearchContext::new(query.clone()));
        let mut bounded = SearchContext::new(query).with_current_best_total_cost(best);
        let result = database.search(&mut bounded);

        if bounded.stats().searches_skipped > 0 {
            prop_assert!(!result.is_valid());
            prop_assert_eq!(bounded.stats().poses_evaluated, 0);
            prop_assert!(full.cost.total() >= best);
        } else {
            prop_assert_eq!(result.cost.total(), full.cost.total());
        }
    }

    #[test]
    fn test_disabled_skipping_always_searches(seed in any::<u64>(), best in 0.0_f32..1.0) {
        let database = database(SearchMode::BruteForce, seed, 1.5);
        let query = random_query(seed, 6).unwrap();
        let debug = DebugOptions {
            disable_search_skipping: true,
            ..DebugOptions::default()
        };
        let mut context = SearchContext::new(query)
            .with_current_best_total_cost(best)
            .with_debug_options(debug);
        let result = database.search(&mut context);

        prop_assert_eq!(context.stats().searches_skipped, 0);
        prop_assert!(result.is_valid() || context.stats().poses_evaluated == 0);
    }
}

