//! Wide-table merge and as-of binding of the splits, without touching disk.

use dataset::DatasetSplitter;
use features::{
    bind, merge_groups, resolve_bind_plan, to_matrix, ExtractorSettings, FeatureManifest, FeatureRegistry,
    FeaturesConfig,
};
use integration_tests::fixtures::{self, at};
use ranker_core::{EntityId, FeatureMatrix, SplitRow, Table};

fn merged(config: &FeaturesConfig) -> (Table, FeatureManifest) {
    let groups = FeatureRegistry::standard()
        .build_all(&config.groups, &fixtures::feed_events(), &ExtractorSettings::from(config))
        .unwrap();
    merge_groups(&groups).unwrap()
}

fn train_matrix(config: &FeaturesConfig, selected: &[String]) -> FeatureMatrix {
    let (wide, manifest) = merged(config);
    let splits = DatasetSplitter::new(fixtures::dataset_config()).split(&fixtures::feed_events());
    let plan = resolve_bind_plan(&config.bind_groups, &manifest, selected).unwrap();
    let bound = bind(&SplitRow::to_table(&splits.train), &wide, &plan).unwrap();
    to_matrix(&bound).unwrap()
}

fn cell(matrix: &FeatureMatrix, post: &str, user: &str, hour: (u32, u32), column: &str) -> f32 {
    let row = matrix
        .ids
        .iter()
        .position(|id| {
            id.post_id == EntityId::new(post) && id.user_id == EntityId::new(user) && id.event_time == at(hour.0, hour.1)
        })
        .expect("row not bound");
    let col = matrix.columns.iter().position(|c| c == column).expect("column not bound");
    matrix.values[[row, col]]
}

#[test]
fn test_manifest_follows_group_order() {
    let config = FeaturesConfig::default();
    let (wide, manifest) = merged(&config);

    let names: Vec<&str> = manifest.groups.iter().map(|g| g.name.as_str()).collect();
    assert_eq!(
        names,
        vec!["base_features", "extra_features", "post_popularity", "user_post_popularity"]
    );
    // Every later table left-joins onto the base rows, which are unique per event.
    assert_eq!(wide.len(), fixtures::feed_log_distinct_len());
    assert_eq!(manifest.group("post_popularity").unwrap().tables.len(), 3);
}

#[test]
fn test_train_matrix_is_numeric_and_aligned() {
    let config = FeaturesConfig::default();
    let matrix = train_matrix(&config, &[]);

    assert_eq!(matrix.len(), 7 * 4 * 2);
    assert_eq!(matrix.ids.len(), matrix.len());
    assert!(matrix.columns.iter().any(|c| c == "post_last_7d_views_count"));
    assert!(matrix.columns.iter().any(|c| c == "user_post_last_28d_clicks_count"));
    assert!(matrix.columns.iter().any(|c| c == "user_is_mom"));
    // Strings never enter the matrix, nor do identifiers or the label.
    for dropped in ["platform", "post_id", "user_id", "event_time", "opened"] {
        assert!(!matrix.columns.iter().any(|c| c == dropped), "{} was bound", dropped);
    }
    assert!(matrix.values.iter().all(|v| v.is_finite()));

    let events = fixtures::feed_events();
    let train_start = fixtures::dataset_config().train_range().start;
    let train_end = fixtures::dataset_config().train_range().end;
    let opened = events
        .iter()
        .filter(|e| e.opened && e.event_time >= train_start && e.event_time <= train_end)
        .count();
    assert_eq!(matrix.labels.iter().filter(|&&l| l == 1.0).count(), opened);
}

#[test]
fn test_bound_values_come_from_the_same_instant() {
    let config = FeaturesConfig::default();
    let matrix = train_matrix(&config, &[]);

    // u4 sees p03a at 11h, after three earlier views of which one was opened.
    assert_eq!(cell(&matrix, "p03a", "u4", (3, 11), "post_last_1d_views_count"), 3.0);
    assert_eq!(cell(&matrix, "p03a", "u4", (3, 11), "post_last_1d_clicks_count"), 1.0);
    assert_eq!(cell(&matrix, "p03a", "u2", (3, 9), "user_is_mom"), 0.0);
    assert_eq!(cell(&matrix, "p03a", "u1", (3, 8), "user_is_mom"), 1.0);
}

#[test]
fn test_selected_groups_restrict_columns() {
    let config = FeaturesConfig::default();
    let matrix = train_matrix(&config, &["post_popularity".to_string()]);

    assert_eq!(matrix.num_features(), 9);
    assert!(matrix.columns.iter().all(|c| c.starts_with("post_last_")));
}

#[test]
fn test_unknown_selected_group_is_rejected() {
    let config = FeaturesConfig::default();
    let (_, manifest) = merged(&config);

    let err = resolve_bind_plan(&config.bind_groups, &manifest, &["nope".to_string()]).unwrap_err();
    assert!(err.is_config());
}
