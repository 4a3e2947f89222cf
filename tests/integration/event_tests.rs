//! Event-driven searches.

use posematch::{PoseIndicesHistory, PoseSearchEvent, SearchMode, SearchResult};

use super::fixture::{ALL_MODES, SearchFixture};

#[test]
fn test_event_at_zero_time_scores_tagged_poses_only() {
    for mode in ALL_MODES {
        let fixture = SearchFixture::with_events("test_event_at_zero_time_scores_tagged_poses_only", mode);
        let mut context = SearchFixture::query_at(24).with_event(PoseSearchEvent::new("foot_plant"));

        let result = fixture.search(&mut context);
        assert_eq!(result.pose_index, Some(25), "{mode}");
        assert_eq!(result.event_pose_index, Some(25));
        assert_eq!(context.stats().poses_evaluated, 2);
        fixture.logger.pass();
    }
}

#[test]
fn test_event_ahead_searches_lead_in_window() {
    let fixture = SearchFixture::with_events("test_event_ahead_searches_lead_in_window", SearchMode::BruteForce);
    // window [t - 0.2, t - 0.05] around each tag: local samples 0..=3 of its asset
    let event = PoseSearchEvent::new("foot_plant")
        .with_time_to_event(0.1)
        .with_play_rate_range(0.5, 2.0);
    let mut context = SearchFixture::query_at(24).with_event(event);

    let result = fixture.search(&mut context);
    assert_eq!(result.pose_index, Some(23));
    assert_eq!(result.event_pose_index, Some(25));
    fixture.logger.pass();
}

#[test]
fn test_event_pose_filters_can_be_disabled() {
    let fixture = SearchFixture::with_events("test_event_pose_filters_can_be_disabled", SearchMode::BruteForce);
    let mut history = PoseIndicesHistory::new(1.0);
    history.update(
        &SearchResult {
            pose_index: Some(23),
            database: Some(fixture.database.id()),
            ..SearchResult::default()
        },
        0.0,
    );
    let event = PoseSearchEvent::new("foot_plant")
        .with_time_to_event(0.1)
        .with_play_rate_range(0.5, 2.0);

    let mut filtered = SearchFixture::query_at(24)
        .with_event(event.clone())
        .with_pose_history(&history);
    assert_eq!(fixture.search(&mut filtered).pose_index, Some(22));

    let mut unfiltered = SearchFixture::query_at(24)
        .with_event(event.with_pose_filters(false))
        .with_pose_history(&history);
    assert_eq!(fixture.search(&mut unfiltered).pose_index, Some(23));
    fixture.logger.pass();
}

#[test]
fn test_unknown_event_returns_empty_result() {
    let fixture = SearchFixture::with_events("test_unknown_event_returns_empty_result", SearchMode::PcaKdTree);
    let mut context = SearchFixture::query_at(3).with_event(PoseSearchEvent::new("jump"));

    let result = fixture.search(&mut context);
    assert!(!result.is_valid());
    assert_eq!(context.stats().poses_evaluated, 0);
    fixture.logger.pass();
}

#[test]
fn test_event_only_mode_ignores_plain_queries() {
    let fixture = SearchFixture::with_events("test_event_only_mode_ignores_plain_queries", SearchMode::EventOnly);
    assert!(!fixture.search(&mut SearchFixture::query_at(3)).is_valid());

    let mut context = SearchFixture::query_at(3).with_event(PoseSearchEvent::new("foot_plant"));
    assert_eq!(fixture.search(&mut context).pose_index, Some(5));
    fixture.logger.pass();
}

#[test]
fn test_event_respects_asset_selection() {
    let fixture = SearchFixture::with_events("test_event_respects_asset_selection", SearchMode::BruteForce);
    let mut context = SearchFixture::query_at(24)
        .with_event(PoseSearchEvent::new("foot_plant"))
        .with_assets_to_consider(vec![0]);

    assert_eq!(fixture.search(&mut context).pose_index, Some(5));
    fixture.logger.pass();
}
