//! Windowed popularity features never see the event they describe.
//!
//! Every aggregate is checked against a brute-force count over the raw log.

use chrono::{DateTime, Duration, Utc};
use features::{ExtractorSettings, FeatureRegistry, FeaturesConfig};
use integration_tests::fixtures::{self, at};
use ranker_core::{Event, Table, Value, Window};

fn settings(windows: &[&str]) -> ExtractorSettings {
    let mut config = FeaturesConfig::default();
    config.windows = windows.iter().map(|w| w.parse::<Window>().unwrap()).collect();
    ExtractorSettings::from(&config)
}

fn build(group: &str, windows: &[&str]) -> Vec<features::FeatureTable> {
    let config = FeaturesConfig::default();
    let group = config.group(group).unwrap().clone();
    FeatureRegistry::standard()
        .build_group(&group, &fixtures::feed_events(), &settings(windows))
        .unwrap()
        .tables
}

fn int(table: &Table, column: &str, row: usize) -> i64 {
    match &table.column(column).unwrap().values[row] {
        Value::Int(i) => *i,
        other => panic!("{} is not an integer: {:?}", column, other),
    }
}

fn float(table: &Table, column: &str, row: usize) -> f64 {
    table.column(column).unwrap().values[row].as_f64().unwrap()
}

fn text(table: &Table, column: &str, row: usize) -> String {
    table.column(column).unwrap().values[row].as_str().unwrap().to_string()
}

fn time(table: &Table, row: usize) -> DateTime<Utc> {
    table.column("event_time").unwrap().values[row].as_time().unwrap()
}

/// (views, clicks) of `matches` events inside `[t - w, t)`.
fn brute_force<F>(events: &[Event], t: DateTime<Utc>, w: Duration, matches: F) -> (i64, i64)
where
    F: Fn(&Event) -> bool,
{
    let inside: Vec<&Event> = events
        .iter()
        .filter(|e| matches(e) && e.event_time >= t - w && e.event_time < t)
        .collect();
    (
        inside.len() as i64,
        inside.iter().filter(|e| e.opened).count() as i64,
    )
}

#[test]
fn test_post_popularity_matches_brute_force() {
    let events = fixtures::feed_events();
    let tables = build("post_popularity", &["1d", "2d"]);
    assert_eq!(
        tables.iter().map(|t| t.name.as_str()).collect::<Vec<_>>(),
        vec!["post_popularity_1d", "post_popularity_2d"]
    );

    for (feature, days) in tables.iter().zip([1, 2]) {
        let table = &feature.table;
        let views = format!("post_last_{}d_views_count", days);
        let clicks = format!("post_last_{}d_clicks_count", days);
        let ratio = format!("post_last_{}d_open_ratio", days);

        for row in 0..table.len() {
            let post = text(table, "post_id", row);
            let t = time(table, row);
            let (expected_views, expected_clicks) =
                brute_force(&events, t, Duration::days(days), |e| e.post_id.as_str() == post);

            assert_eq!(int(table, &views, row), expected_views, "{} at {}", post, t);
            assert_eq!(int(table, &clicks, row), expected_clicks, "{} at {}", post, t);
            let r = float(table, &ratio, row);
            assert!((0.0..=1.0).contains(&r));
            if expected_views == 0 {
                assert_eq!(r, 0.0);
            }
        }
    }
}

#[test]
fn test_user_post_popularity_matches_brute_force() {
    let events = fixtures::feed_events();
    let tables = build("user_post_popularity", &["7d"]);
    let table = &tables[0].table;

    for row in 0..table.len() {
        let post = text(table, "post_id", row);
        let user = text(table, "user_id", row);
        let t = time(table, row);
        let (expected_views, expected_clicks) = brute_force(&events, t, Duration::days(7), |e| {
            e.post_id.as_str() == post && e.user_id.as_str() == user
        });

        assert_eq!(int(table, "user_post_last_7d_views_count", row), expected_views);
        assert_eq!(int(table, "user_post_last_7d_clicks_count", row), expected_clicks);
    }
}

#[test]
fn test_open_at_scoring_time_is_not_counted() {
    let tables = build("post_popularity", &["1d"]);
    let table = &tables[0].table;

    // p03a is shown at 8h, 9h, 10h, 11h on May 3 and opened at 9h and 11h.
    let rows: Vec<usize> = (0..table.len())
        .filter(|&row| text(table, "post_id", row) == "p03a")
        .collect();
    let times: Vec<_> = rows.iter().map(|&row| time(table, row)).collect();
    assert_eq!(times, vec![at(3, 8), at(3, 9), at(3, 10), at(3, 11)]);

    let views: Vec<i64> = rows.iter().map(|&row| int(table, "post_last_1d_views_count", row)).collect();
    let clicks: Vec<i64> = rows.iter().map(|&row| int(table, "post_last_1d_clicks_count", row)).collect();
    assert_eq!(views, vec![0, 1, 2, 3]);
    assert_eq!(clicks, vec![0, 0, 1, 1]);
}

#[test]
fn test_one_row_per_post_and_time() {
    let tables = build("post_popularity", &["1d"]);
    let table = &tables[0].table;

    let mut keys: Vec<(String, DateTime<Utc>)> =
        (0..table.len()).map(|row| (text(table, "post_id", row), time(table, row))).collect();
    let total = keys.len();
    keys.sort();
    keys.dedup();
    assert_eq!(keys.len(), total);
}
