//! Asset selection, block transitions, channel filters and weight groups.

use std::sync::Arc;

use posematch::index::PoseMetadata;
use posematch::test_utils::fixtures::{SAMPLE_RATE, scenario_parts, scenario_values, with_search_trees};
use posematch::test_utils::{TestCase, run_table_tests};
use posematch::{
    AssetSelection, DataChannel, DatabaseConfig, DebugOptions, FeatureChannel, PoseSearchDatabase,
    Schema, SearchContext, SearchIndex, SearchMode, ToleranceFilterChannel,
};

use super::fixture::{ALL_MODES, SearchFixture, scenario_index};

#[test]
fn test_assets_to_consider_restricts_results() {
    let cases = vec![
        TestCase::new("no restriction", vec![], Some(15)),
        TestCase::new("other asset only", vec![2], Some(20)),
        TestCase::new("first asset only", vec![0], Some(9)),
        TestCase::new("every asset", vec![0, 1, 2], Some(15)),
        TestCase::new("unknown source asset", vec![7], None),
    ];

    for mode in ALL_MODES {
        let fixture = SearchFixture::scenario("test_assets_to_consider_restricts_results", mode);
        run_table_tests(cases.clone(), |assets: Vec<usize>| {
            let mut context = SearchFixture::query_at(15).with_assets_to_consider(assets);
            fixture.database.search(&mut context).pose_index
        });
        fixture.logger.pass();
    }
}

#[test]
fn test_selectable_assets_resolution() {
    let fixture = SearchFixture::scenario("test_selectable_assets_resolution", SearchMode::BruteForce);
    let index = fixture.database.index().unwrap();

    assert_eq!(fixture.database.populate_selectable_assets(&index, &[]), AssetSelection::All);
    assert_eq!(
        fixture.database.populate_selectable_assets(&index, &[2, 0, 2]),
        AssetSelection::Only(vec![0, 2])
    );
    assert_eq!(
        fixture.database.populate_selectable_assets(&index, &[1, 0, 2]),
        AssetSelection::All
    );
    assert_eq!(fixture.database.populate_selectable_assets(&index, &[9]), AssetSelection::Nothing);
    fixture.logger.pass();
}

#[test]
fn test_block_transition_poses_are_never_returned() {
    let mut parts = scenario_parts();
    for pose_index in [14, 15, 16] {
        let metadata = parts.pose_metadata[pose_index];
        parts.pose_metadata[pose_index] = PoseMetadata::new(metadata.asset_index(), metadata.cost_addend(), true);
    }

    for mode in ALL_MODES {
        let fixture = SearchFixture::with_parts("test_block_transition_poses_are_never_returned", mode, parts.clone());
        let mut context = SearchFixture::query_at(15);
        let result = fixture.search(&mut context);

        assert_eq!(result.pose_index, Some(13), "{mode}");
        assert!(context.stats().poses_filtered >= 3);
        fixture.logger.pass();
    }
}

/// Scenario index behind a two-channel schema: dims 0..4 always weighted,
/// dims 4..8 tagged with debug weight group 1.
fn grouped_database(mode: SearchMode) -> PoseSearchDatabase {
    let channels: Vec<Arc<dyn FeatureChannel>> = vec![
        Arc::new(DataChannel::new("trajectory", 0, 4)),
        Arc::new(DataChannel::new("pose", 4, 4).with_debug_weight_group(1)),
    ];
    let schema = Arc::new(Schema::new(SAMPLE_RATE, channels).unwrap());
    let database = PoseSearchDatabase::new(
        "grouped",
        schema,
        DatabaseConfig {
            mode,
            kd_tree_query_num_neighbors: 30,
            ..DatabaseConfig::default()
        },
    );
    database.publish_index(scenario_index()).unwrap();
    database
}

#[test]
fn test_debug_weight_group_masks_foreign_channels() {
    let mut query = scenario_values(15);
    query[4..].fill(100.0);

    let database = grouped_database(SearchMode::BruteForce);
    let masked = database.search(&mut SearchContext::new(query.clone()));
    assert_eq!(masked.pose_index, Some(15));
    assert_eq!(masked.cost.dissimilarity(), 0.0);

    let debug = DebugOptions {
        debug_weight_group_id: 1,
        ..DebugOptions::default()
    };
    let weighted = database.search(&mut SearchContext::new(query).with_debug_options(debug));
    assert!(weighted.cost.dissimilarity() > 0.0);

    let index = database.index().unwrap();
    let weights = database.calculate_dynamic_weights_sqrt(&index, &DebugOptions::default());
    assert_eq!(weights.to_vec(), vec![1.0, 1.0, 1.0, 1.0, 0.0, 0.0, 0.0, 0.0]);
    let weights = database.calculate_dynamic_weights_sqrt(&index, &debug);
    assert!(matches!(weights, std::borrow::Cow::Borrowed(_)));
}

#[test]
fn test_tolerance_channel_rejects_distant_poses() {
    let channels: Vec<Arc<dyn FeatureChannel>> = vec![
        Arc::new(ToleranceFilterChannel::new("phase", 0, 1, 2.5)),
        Arc::new(DataChannel::new("rest", 1, 7)),
    ];
    let schema = Arc::new(Schema::new(SAMPLE_RATE, channels).unwrap());
    let database = PoseSearchDatabase::new(
        "tolerance",
        schema,
        DatabaseConfig {
            mode: SearchMode::BruteForce,
            ..DatabaseConfig::default()
        },
    );
    database.publish_index(scenario_index()).unwrap();

    // rest matches pose 25 exactly, phase only admits poses 8..=13
    let mut query = scenario_values(25);
    query[0] = 10.5;
    let mut context = SearchContext::new(query);
    let result = database.search(&mut context);

    assert_eq!(result.pose_index, Some(13));
    assert_eq!(context.stats().poses_evaluated, 6);
    assert_eq!(context.stats().poses_filtered, 24);
}

#[test]
fn test_search_index_can_be_shared_across_modes() {
    let parts = with_search_trees(scenario_parts(), 8).unwrap();
    let index = SearchIndex::from_parts(parts).unwrap();
    assert!(index.kd_tree().is_some());
    assert!(index.vp_tree().is_some());
    assert_eq!(index.asset_indices_for_source_asset(1), &[1]);
}
