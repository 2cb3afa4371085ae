//! End-to-end runs of every stage over a compressed event log on disk.
//!
//! Each test gets its own scratch workspace, so the stages read and write
//! real snapshots exactly as the CLI does.

use integration_tests::setup::TestWorkspace;
use model::{LogisticRegression, BEST_MODEL, FINAL_MODEL, HISTORY_FILE, PREDICTIONS_TABLE};
use pipeline::{Pipeline, BuiltTables, EVAL_TABLE, FEATURES_TABLE, FEATURE_TABLES_INDEX, TEST_TABLE, TRAIN_TABLE};
use ranker_core::{SplitRow, Value};
use store::Area;

fn pipeline(workspace: &TestWorkspace, epochs: usize) -> Pipeline {
    Pipeline::new(workspace.pipeline_config(epochs)).expect("Failed to create pipeline")
}

#[test]
fn test_make_dataset_writes_three_splits() {
    let workspace = TestWorkspace::with_feed_log();
    let pipeline = pipeline(&workspace, 2);

    let summaries = pipeline.make_dataset().expect("make-dataset failed");
    let rows: Vec<(&str, usize)> = summaries.iter().map(|s| (s.name.as_str(), s.rows)).collect();
    assert_eq!(rows, vec![(TRAIN_TABLE, 56), (EVAL_TABLE, 8), (TEST_TABLE, 21)]);

    let test = pipeline.store().read_table(Area::Output, TEST_TABLE).unwrap();
    let test = SplitRow::from_table(&test).unwrap();
    assert_eq!(test.iter().filter(|r| r.opened).count(), 7);
}

#[test]
fn test_build_features_indexes_every_table() {
    let workspace = TestWorkspace::with_feed_log();
    let pipeline = pipeline(&workspace, 2);

    pipeline.build_features().expect("build-features failed");

    let index: BuiltTables = pipeline
        .store()
        .read_document(Area::Interim, FEATURE_TABLES_INDEX)
        .unwrap();
    let tables: Vec<&str> = index
        .groups
        .iter()
        .flat_map(|g| g.tables.iter().map(String::as_str))
        .collect();
    assert_eq!(
        tables,
        vec![
            "base_features",
            "extra_features",
            "post_popularity_1d",
            "post_popularity_7d",
            "post_popularity_28d",
            "user_post_popularity_1d",
            "user_post_popularity_7d",
            "user_post_popularity_28d",
        ]
    );
    for table in tables {
        assert!(pipeline.store().table_path(Area::Interim, table).exists(), "{} missing", table);
    }
}

#[test]
fn test_full_run() {
    let workspace = TestWorkspace::with_feed_log();
    let pipeline = pipeline(&workspace, 3);

    let report = pipeline.run_all(&[]).expect("run failed");

    assert_eq!(report.rows, 21);
    assert_eq!(report.opened, 7);
    let mean_rank = report.mean_rank.expect("test split has opens");
    assert!((1.0..=6.0).contains(&mean_rank), "mean rank {}", mean_rank);
    assert!((0.0..=1.0).contains(&report.map_at_10));

    let store = pipeline.store();
    assert!(store.table_path(Area::Output, FEATURES_TABLE).exists());
    assert!(store.table_path(Area::Models, BEST_MODEL).exists());
    assert!(store.table_path(Area::Models, FINAL_MODEL).exists());

    let history = std::fs::read_to_string(workspace.paths.logs_root().join(HISTORY_FILE)).unwrap();
    let epochs = history.lines().count();
    assert!((1..=3).contains(&epochs));

    let predictions = store.read_table(Area::Output, PREDICTIONS_TABLE).unwrap();
    assert_eq!(predictions.len(), 21);
    let ranks = &predictions.column("rank").unwrap().values;
    assert!(ranks.iter().all(|r| matches!(r, Value::Int(n) if *n >= 1)));
    let scores = &predictions.column("prediction").unwrap().values;
    assert!(scores
        .iter()
        .all(|s| s.as_f64().map(|p| (0.0..=1.0).contains(&p)).unwrap_or(false)));
}

#[test]
fn test_runs_with_the_same_seed_agree() {
    let first = TestWorkspace::with_feed_log();
    let second = TestWorkspace::with_feed_log();

    let a = pipeline(&first, 2);
    let b = pipeline(&second, 2);
    a.run_all(&[]).expect("first run failed");
    b.run_all(&[]).expect("second run failed");

    let model_a: LogisticRegression = a.store().read_document(Area::Models, FINAL_MODEL).unwrap();
    let model_b: LogisticRegression = b.store().read_document(Area::Models, FINAL_MODEL).unwrap();
    assert_eq!(model_a, model_b);
}

#[test]
fn test_selected_group_trains_on_its_columns_only() {
    let workspace = TestWorkspace::with_feed_log();
    let pipeline = pipeline(&workspace, 1);
    pipeline.make_dataset().unwrap();
    pipeline.build_features().unwrap();
    pipeline.merge_features().unwrap();

    let report = pipeline.train(&["user_post_popularity".to_string()]).unwrap();

    assert_eq!(report.model.columns().len(), 9);
    assert!(report
        .model
        .columns()
        .iter()
        .all(|c| c.starts_with("user_post_last_")));
}

#[test]
fn test_train_before_merge_fails() {
    let workspace = TestWorkspace::with_feed_log();
    let pipeline = pipeline(&workspace, 1);
    pipeline.make_dataset().unwrap();

    let err = pipeline.train(&[]).unwrap_err();
    assert_eq!(err.kind(), "IO");
}

#[test]
fn test_invalid_config_is_rejected_before_any_stage() {
    let workspace = TestWorkspace::with_feed_log();
    let mut config = workspace.pipeline_config(1);
    config.features.windows.clear();

    let err = Pipeline::new(config).err().expect("empty window list accepted");
    assert!(err.is_config());
    assert!(!workspace.paths.output_data_root().exists());
}
