//! Test fixtures and event generators.

use chrono::{DateTime, Duration, TimeZone, Utc};
use dataset::DatasetConfig;
use ranker_core::Event;

/// Users that see every day's posts.
pub const ACTIVE_USERS: [&str; 4] = ["u1", "u2", "u3", "u4"];

/// A user with two unopened train-range events.
pub const SPARSE_USER: &str = "u9";

/// First and last day of the synthetic log (May 2021).
pub const FIRST_DAY: u32 = 1;
pub const LAST_DAY: u32 = 15;

/// A May 2021 timestamp.
pub fn at(day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2021, 5, day, hour, 0, 0).unwrap()
}

/// Generate one raw log record as found in the compressed event log.
pub fn event_record(
    post_id: &str,
    user_id: &str,
    time: DateTime<Utc>,
    opened: bool,
    post_age_minutes: f64,
) -> serde_json::Value {
    serde_json::json!({
        "trackable_id": post_id,
        "user_id": user_id,
        "tracker_created_at": time.format("%Y-%m-%d %H:%M:%S").to_string(),
        "post_age_in_minutes": post_age_minutes,
        "has_been_opened": opened,
        "user_is_mom": user_id != "u2",
        "user_posts_count": 7,
        "platform": "ios",
        "has_picture": post_id.ends_with('a'),
        "post_likes_count": 12,
        "author_children_age_year": [1, 4],
        "author_children_age_month": [14, 50],
        "user_children_age_month": [13]
    })
}

/// Posts shown on `day`; both are created the day before.
pub fn posts_of_day(day: u32) -> [String; 2] {
    [format!("p{:02}a", day), format!("p{:02}b", day)]
}

/// Whether `user` opens `post` on `day`.
pub fn opens(user_index: usize, day: u32, post_index: usize) -> bool {
    let turn = user_index as u32 + day;
    match post_index {
        0 => turn % 2 == 0,
        _ => turn % 3 == 0,
    }
}

/// A deterministic two-week log.
///
/// Every active user sees both of the day's posts once, at an hour of their
/// own. The sparse user shows up twice on May 2 without opening anything,
/// and the first record is repeated once.
pub fn feed_log() -> Vec<serde_json::Value> {
    let mut records = Vec::new();

    for day in FIRST_DAY..=LAST_DAY {
        for (u, user) in ACTIVE_USERS.iter().enumerate() {
            let time = at(day, 8 + u as u32);
            // Created at midnight of the previous day.
            let age = Duration::hours(24 + 8 + u as i64).num_minutes() as f64;
            for (p, post) in posts_of_day(day).iter().enumerate() {
                records.push(event_record(post, user, time, opens(u, day, p), age));
            }
        }
    }

    records.push(event_record("p02a", SPARSE_USER, at(2, 20), false, 600.0));
    records.push(event_record("p02b", SPARSE_USER, at(2, 21), false, 600.0));

    let duplicate = records[0].clone();
    records.push(duplicate);
    records
}

/// Number of distinct records in [`feed_log`].
pub fn feed_log_distinct_len() -> usize {
    (LAST_DAY - FIRST_DAY + 1) as usize * ACTIVE_USERS.len() * 2 + 2
}

/// Decoded events of [`feed_log`], without the duplicate.
pub fn feed_events() -> Vec<Event> {
    let mut records = feed_log();
    records.pop();
    records
        .into_iter()
        .map(|r| serde_json::from_value(r).unwrap())
        .collect()
}

/// Train May 1-8, eval May 9-10, test May 12-14.
pub fn dataset_config() -> DatasetConfig {
    serde_json::from_value(serde_json::json!({
        "train_start_date": "2021-05-01",
        "train_end_date": "2021-05-08",
        "eval_start_date": "2021-05-09",
        "eval_end_date": "2021-05-10",
        "test_start_date": "2021-05-12",
        "test_end_date": "2021-05-14"
    }))
    .unwrap()
}
