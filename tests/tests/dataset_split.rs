//! Event log loading and split construction over the synthetic two-week log.

use std::collections::HashSet;

use dataset::DatasetSplitter;
use integration_tests::{fixtures, setup::TestWorkspace};
use ranker_core::EntityId;
use store::load_events;

#[test]
fn test_log_is_deduplicated_on_load() {
    let workspace = TestWorkspace::with_feed_log();

    let events = load_events(&workspace.log_path()).expect("Failed to load log");

    assert_eq!(events.len(), fixtures::feed_log_distinct_len());
    assert_eq!(events, fixtures::feed_events());
}

#[test]
fn test_workspaces_share_one_subscriber() {
    let first = TestWorkspace::new();
    let second = TestWorkspace::new();

    assert!(tracing::dispatcher::has_been_set());
    assert!(!telemetry::init_tracing_from_env());
    assert_ne!(first.root, second.root);
}

#[test]
fn test_out_of_range_post_age_is_rejected_on_load() {
    let workspace = TestWorkspace::new();
    let mut records = fixtures::feed_log();
    records[3]["post_age_in_minutes"] = serde_json::json!(-1e300);
    workspace.write_log(&records);

    let err = load_events(&workspace.log_path()).unwrap_err();
    assert_eq!(err.kind(), "PARSE");
    assert!(err.to_string().contains("post_age_in_minutes"));
}

#[test]
fn test_missing_log_is_io_error() {
    let workspace = TestWorkspace::new();

    let err = load_events(&workspace.log_path()).unwrap_err();
    assert_eq!(err.kind(), "IO");
}

#[test]
fn test_split_sizes() {
    let splits = DatasetSplitter::new(fixtures::dataset_config()).split(&fixtures::feed_events());

    // May 1-7 in full (the range ends at midnight of May 8), minus the sparse user.
    assert_eq!(splits.train.len(), 7 * 4 * 2);
    // May 9 only.
    assert_eq!(splits.eval.len(), 4 * 2);
    // Seven seeds on May 12 and 13, each joined by both of the day's posts.
    assert_eq!(splits.test.len(), 7 * 3);
}

#[test]
fn test_sparse_negative_user_leaves_train() {
    let splits = DatasetSplitter::new(fixtures::dataset_config()).split(&fixtures::feed_events());

    let sparse = EntityId::new(fixtures::SPARSE_USER);
    assert!(splits.train.iter().all(|r| r.user_id != sparse));
}

#[test]
fn test_test_rows_start_at_test_start() {
    let config = fixtures::dataset_config();
    let test_start = config.test_range().start;
    let splits = DatasetSplitter::new(config).split(&fixtures::feed_events());

    assert!(splits.test.iter().all(|r| r.event_time >= test_start));
    let opened = splits.test.iter().filter(|r| r.opened).count();
    assert_eq!(opened, 7);
}

#[test]
fn test_every_seed_has_its_own_post_as_negative() {
    let splits = DatasetSplitter::new(fixtures::dataset_config()).split(&fixtures::feed_events());

    let negatives: HashSet<_> = splits
        .test
        .iter()
        .filter(|r| !r.opened)
        .map(|r| (&r.post_id, &r.user_id, r.event_time))
        .collect();

    for seed in splits.test.iter().filter(|r| r.opened) {
        assert!(negatives.contains(&(&seed.post_id, &seed.user_id, seed.event_time)));
    }
}
