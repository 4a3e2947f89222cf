//! Continuing-pose scoring and the exclusions it drives.

use posematch::index::ContinuingPoseCostOverride;
use posematch::test_utils::fixtures::{scenario_parts, uniform_assets};
use posematch::{ContinuingPose, SearchMode, search_databases};

use super::fixture::{ALL_MODES, SearchFixture};

fn continuing(fixture: &SearchFixture, pose_index: usize) -> ContinuingPose {
    ContinuingPose {
        database: fixture.database.id(),
        pose_index,
        asset_time: 0.25,
    }
}

#[test]
fn test_continuing_pose_wins_with_negative_bias() {
    let fixture = SearchFixture::scenario("test_continuing_pose_wins_with_negative_bias", SearchMode::BruteForce);
    let mut context = SearchFixture::query_at(15).with_continuing_pose(continuing(&fixture, 15));

    let result = search_databases(&[&fixture.database], &mut context);
    fixture.logger.log_actual(&result);

    assert!(result.is_continuing_pose_search);
    assert_eq!(result.pose_index, Some(15));
    assert_eq!(result.asset_time, 0.25);
    assert_eq!(result.cost.continuing_pose_addend(), -0.01);
    assert_eq!(result.cost.total(), -0.01);
    // the database scan could not beat -0.01 since every addend is 0
    assert_eq!(context.stats().searches_skipped, 1);
    assert_eq!(context.stats().poses_evaluated, 1);
    fixture.logger.pass();
}

#[test]
fn test_better_pose_beats_continuing_pose() {
    for mode in ALL_MODES {
        let fixture = SearchFixture::scenario("test_better_pose_beats_continuing_pose", mode);
        let mut context = SearchFixture::query_at(15).with_continuing_pose(continuing(&fixture, 3));

        let result = search_databases(&[&fixture.database], &mut context);
        fixture.logger.log_actual(&result);

        assert!(!result.is_continuing_pose_search, "{mode}");
        assert_eq!(result.pose_index, Some(15));
        fixture.logger.pass();
    }
}

#[test]
fn test_cost_override_replaces_bias() {
    let mut parts = scenario_parts();
    parts.continuing_pose_cost_overrides = vec![ContinuingPoseCostOverride {
        asset_index: 1,
        start_time: 0.0,
        end_time: 1.0,
        cost_addend: 2.5,
    }];
    let fixture = SearchFixture::with_parts("test_cost_override_replaces_bias", SearchMode::BruteForce, parts);
    let mut context = SearchFixture::query_at(15).with_continuing_pose(continuing(&fixture, 15));

    let continuing_result = fixture.database.search_continuing_pose(&mut context);
    assert_eq!(continuing_result.cost.continuing_pose_addend(), 2.5);
    assert_eq!(continuing_result.cost.total(), 2.5);

    // with the override the scan runs and finds the same pose at cost 0
    let mut context = SearchFixture::query_at(15).with_continuing_pose(continuing(&fixture, 15));
    let result = search_databases(&[&fixture.database], &mut context);
    assert!(!result.is_continuing_pose_search);
    assert_eq!(result.cost.total(), 0.0);
    fixture.logger.pass();
}

#[test]
fn test_continuing_interaction_bias_applies_to_candidates() {
    let mut fixture = SearchFixture::scenario("test_continuing_interaction_bias_applies_to_candidates", SearchMode::BruteForce);
    let config = posematch::DatabaseConfig {
        mode: SearchMode::BruteForce,
        continuing_interaction_cost_bias: 0.75,
        ..posematch::DatabaseConfig::default()
    };
    fixture.database = super::fixture::empty_database("interaction", config);
    fixture.database.publish_index(super::fixture::scenario_index()).unwrap();

    let mut context = SearchFixture::query_at(4).with_continuing_interaction(true);
    let result = fixture.search(&mut context);
    assert_eq!(result.cost.continuing_interaction_addend(), 0.75);
    assert_eq!(result.cost.total(), 0.75);

    let result = fixture.search(&mut SearchFixture::query_at(4));
    assert_eq!(result.cost.total(), 0.0);
    fixture.logger.pass();
}

#[test]
fn test_pose_jump_threshold_excludes_neighbourhood() {
    for mode in ALL_MODES {
        let fixture = SearchFixture::scenario("test_pose_jump_threshold_excludes_neighbourhood", mode);
        // rate 30: floor(-3.75) and ceil(3.75) exclude poses 11..=18
        let mut context = SearchFixture::query_at(15)
            .with_continuing_pose(continuing(&fixture, 15))
            .with_pose_jump_threshold_time(-0.125, 0.125);

        let result = fixture.search(&mut context);
        assert_eq!(result.pose_index, Some(19), "{mode}");
        fixture.logger.pass();
    }
}

#[test]
fn test_disable_reselection_excludes_source_asset() {
    let assets = uniform_assets(3, 10);
    let mut parts = scenario_parts();
    parts.assets = assets
        .into_iter()
        .map(|asset| asset.with_disable_reselection(true))
        .collect();

    for mode in ALL_MODES {
        let fixture =
            SearchFixture::with_parts("test_disable_reselection_excludes_source_asset", mode, parts.clone());
        let mut context = SearchFixture::query_at(15).with_continuing_pose(continuing(&fixture, 12));

        let result = fixture.search(&mut context);
        assert_eq!(result.pose_index, Some(20), "{mode}");
        fixture.logger.pass();
    }
}

#[test]
#[should_panic(expected = "continuing pose belongs to another database")]
fn test_continuing_pose_of_other_database_panics() {
    let fixture = SearchFixture::scenario("test_continuing_pose_of_other_database_panics", SearchMode::BruteForce);
    let other = SearchFixture::scenario("other", SearchMode::BruteForce);
    let mut context = SearchFixture::query_at(1).with_continuing_pose(continuing(&other, 1));
    fixture.database.search_continuing_pose(&mut context);
}
