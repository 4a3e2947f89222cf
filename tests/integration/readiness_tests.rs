//! Index publication, readiness and precondition failures.

use posematch::error::ErrorCode;
use posematch::test_utils::fixtures::{SCENARIO_DIMENSION, scenario_parts, scenario_values};
use posematch::{
    BuildStatus, DatabaseConfig, MatchError, SearchContext, SearchIndex, SearchMode, SearchScratch,
    search_databases,
};

use super::fixture::{SearchFixture, empty_database, scenario_index};

fn brute_force_config() -> DatabaseConfig {
    DatabaseConfig {
        mode: SearchMode::BruteForce,
        ..DatabaseConfig::default()
    }
}

#[test]
fn test_unpublished_database_reports_not_ready() {
    let database = empty_database("unpublished", brute_force_config());
    assert_eq!(database.build_status(), BuildStatus::InProgress);
    assert!(matches!(database.index(), Err(MatchError::IndexNotReady(_))));

    let mut context = SearchFixture::query_at(3);
    let result = database.search(&mut context);
    assert!(!result.is_valid());
    assert!(context.is_index_not_ready());
    assert!(database.get_real_asset_time(3).is_err());
    assert_eq!(database.get_pose_index(0, 0.0, false, [0.0; 3]), None);
}

#[test]
fn test_failed_build_reports_failure() {
    let database = empty_database("failed", brute_force_config());
    database.publish_index(scenario_index()).unwrap();
    database.fail_index_build("out of memory");

    assert_eq!(database.build_status(), BuildStatus::Failed);
    let err = database.index().unwrap_err();
    assert_eq!(err.code(), ErrorCode::IndexBuildFailed);

    let mut context = SearchFixture::query_at(3);
    assert!(!database.search(&mut context).is_valid());
    assert!(context.is_index_not_ready());
}

#[test]
fn test_rebuild_hides_old_index_until_published() {
    let database = empty_database("rebuild", brute_force_config());
    assert_eq!(database.publish_index(scenario_index()).unwrap(), 1);

    database.begin_index_build();
    assert!(!database.search(&mut SearchFixture::query_at(3)).is_valid());

    assert_eq!(database.publish_index(scenario_index()).unwrap(), 2);
    let mut context = SearchFixture::query_at(3);
    assert_eq!(database.search(&mut context).pose_index, Some(3));
    assert!(!context.is_index_not_ready());
}

#[test]
fn test_not_ready_database_does_not_block_others() {
    let ready = SearchFixture::scenario("test_not_ready_database_does_not_block_others", SearchMode::BruteForce);
    let pending = empty_database("pending", brute_force_config());

    let mut context = SearchFixture::query_at(11);
    let result = search_databases(&[&pending, &ready.database], &mut context);

    assert_eq!(result.pose_index, Some(11));
    assert_eq!(result.database, Some(ready.database.id()));
    assert!(context.is_index_not_ready());
    ready.logger.pass();
}

#[test]
fn test_publish_rejects_mismatched_dimension() {
    let database = empty_database("mismatch", brute_force_config());
    let mut parts = scenario_parts();
    parts.dimension = 4;
    parts.weights_sqrt.truncate(4);
    parts.values.truncate(30 * 4);
    let index = SearchIndex::from_parts(parts).unwrap();

    let err = database.publish_index(index).unwrap_err();
    assert!(matches!(
        err,
        MatchError::DimensionMismatch {
            expected: 8,
            actual: 4
        }
    ));
    assert_eq!(database.build_status(), BuildStatus::InProgress);
}

#[test]
fn test_publish_requires_tree_for_tree_modes() {
    let index = || SearchIndex::from_parts(scenario_parts()).unwrap();
    for mode in [SearchMode::PcaKdTree, SearchMode::VpTree] {
        let database = empty_database(
            "treeless",
            DatabaseConfig {
                mode,
                ..DatabaseConfig::default()
            },
        );
        let err = database.publish_index(index()).unwrap_err();
        assert_eq!(err.code(), ErrorCode::SearchStrategyUnavailable, "{mode}");
    }
}

#[test]
fn test_empty_index_returns_empty_result() {
    let database = empty_database("empty", brute_force_config());
    let index = SearchIndex::from_parts(posematch::SearchIndexParts {
        dimension: SCENARIO_DIMENSION,
        weights_sqrt: vec![1.0; SCENARIO_DIMENSION],
        ..Default::default()
    })
    .unwrap();
    database.publish_index(index).unwrap();

    let mut context = SearchFixture::query_at(0);
    assert!(!database.search(&mut context).is_valid());
    assert!(!context.is_index_not_ready());
}

#[test]
fn test_query_builder_runs_once_per_schema() {
    let fixture = SearchFixture::scenario("test_query_builder_runs_once_per_schema", SearchMode::BruteForce);
    let calls = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));
    let counter = std::sync::Arc::clone(&calls);
    let mut context = SearchContext::with_query_builder(Box::new(move |schema| {
        counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        assert_eq!(schema.cardinality(), SCENARIO_DIMENSION);
        scenario_values(26)
    }));

    assert_eq!(fixture.search(&mut context).pose_index, Some(26));
    assert_eq!(fixture.database.search_brute_force(&mut context).pose_index, Some(26));
    assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    fixture.logger.pass();
}

#[test]
fn test_caller_sized_scratch_supports_reconstruction() {
    let mut parts = posematch::test_utils::fixtures::with_search_trees(scenario_parts(), SCENARIO_DIMENSION).unwrap();
    parts.values.clear();
    parts.vp_tree = None;
    let database = empty_database(
        "reconstruct",
        DatabaseConfig {
            mode: SearchMode::PcaKdTree,
            kd_tree_query_num_neighbors: 30,
            ..DatabaseConfig::default()
        },
    );
    database.publish_index(SearchIndex::from_parts(parts).unwrap()).unwrap();

    let mut context = SearchFixture::query_at(17).with_scratch(SearchScratch::with_capacity(16, 16));
    let result = database.search(&mut context);
    assert_eq!(result.pose_index, Some(17));
    assert!(result.cost.dissimilarity() < 1e-6);
}

#[test]
#[should_panic(expected = "query dimension mismatch")]
fn test_wrong_query_dimension_panics() {
    let fixture = SearchFixture::scenario("test_wrong_query_dimension_panics", SearchMode::BruteForce);
    fixture.database.search(&mut SearchContext::new(vec![0.0; 3]));
}

#[test]
#[should_panic(expected = "reconstruction scratch buffer")]
fn test_undersized_scratch_panics() {
    let fixture = SearchFixture::scenario("test_undersized_scratch_panics", SearchMode::BruteForce);
    let mut context = SearchFixture::query_at(1).with_scratch(SearchScratch::with_capacity(4, 4));
    fixture.database.search(&mut context);
}
