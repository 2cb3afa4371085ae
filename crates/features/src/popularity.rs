//! Trailing-window popularity aggregates.
//!
//! For an event at `t` and a window `w`, the aggregate covers the entity's
//! events with time in `[t - w, t)`: an event exactly one window earlier is
//! counted, events at `t` itself (including the one being scored) never are.

use std::collections::HashMap;
use std::hash::Hash;

use chrono::{DateTime, Duration, Utc};
use ranker_core::{Column, Event, KeySet, Result, Table, Value, Window};
use tracing::debug;

use crate::base::{key_cells, key_columns};
use crate::registry::{ExtractorSettings, FeatureTable};

/// Aggregate over one trailing window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowStats {
    pub views: u64,
    pub clicks: u64,
    pub open_ratio: f64,
}

impl WindowStats {
    pub const EMPTY: WindowStats = WindowStats {
        views: 0,
        clicks: 0,
        open_ratio: 0.0,
    };

    fn new(views: u64, clicks: u64) -> Self {
        let open_ratio = if views == 0 {
            0.0
        } else {
            clicks as f64 / views as f64
        };
        Self {
            views,
            clicks,
            open_ratio,
        }
    }
}

/// Window aggregates for every event of one entity.
///
/// `times` must be sorted ascending. Two pointers bound the window and a
/// prefix sum of opens yields the click count.
pub fn trailing_window_stats(times: &[DateTime<Utc>], opened: &[bool], window: Duration) -> Vec<WindowStats> {
    debug_assert_eq!(times.len(), opened.len());

    let mut prefix = Vec::with_capacity(opened.len() + 1);
    prefix.push(0u64);
    for &o in opened {
        let last = prefix[prefix.len() - 1];
        prefix.push(last + u64::from(o));
    }

    let mut stats = Vec::with_capacity(times.len());
    // lo: first index with time >= t - w. hi: first index with time >= t.
    let mut lo = 0;
    let mut hi = 0;
    for &t in times {
        let floor = t - window;
        while lo < times.len() && times[lo] < floor {
            lo += 1;
        }
        while hi < times.len() && times[hi] < t {
            hi += 1;
        }

        if hi > lo {
            let views = (hi - lo) as u64;
            let clicks = prefix[hi] - prefix[lo];
            stats.push(WindowStats::new(views, clicks));
        } else {
            stats.push(WindowStats::EMPTY);
        }
    }
    stats
}

/// Column names for one entity prefix and window, in table order.
pub fn window_columns(prefix: &str, window: &Window) -> [String; 3] {
    let w = window.label();
    [
        format!("{}_last_{}_views_count", prefix, w),
        format!("{}_last_{}_clicks_count", prefix, w),
        format!("{}_last_{}_open_ratio", prefix, w),
    ]
}

/// One aggregate row before it is laid out as table cells.
struct StatRow<'a> {
    event: &'a Event,
    stats: WindowStats,
}

/// Compute one windowed table for entities keyed by `key_of`.
///
/// Events are stably sorted by time and grouped by key in first-seen order.
/// Only the first event of each distinct (key, time) produces a row.
fn windowed_rows<'a, K, F>(events: &'a [Event], window: &Window, key_of: F) -> Vec<StatRow<'a>>
where
    K: Eq + Hash,
    F: Fn(&'a Event) -> K,
{
    let mut order: Vec<usize> = (0..events.len()).collect();
    order.sort_by_key(|&i| events[i].event_time);

    let mut group_of: HashMap<K, usize> = HashMap::new();
    let mut groups: Vec<Vec<usize>> = Vec::new();
    for &i in &order {
        let next = groups.len();
        let g = *group_of.entry(key_of(&events[i])).or_insert(next);
        if g == next {
            groups.push(Vec::new());
        }
        groups[g].push(i);
    }

    let mut rows = Vec::with_capacity(events.len());
    for members in &groups {
        let times: Vec<_> = members.iter().map(|&i| events[i].event_time).collect();
        let opened: Vec<_> = members.iter().map(|&i| events[i].opened).collect();
        let stats = trailing_window_stats(&times, &opened, window.duration());

        for (pos, &i) in members.iter().enumerate() {
            if pos > 0 && times[pos - 1] == times[pos] {
                continue;
            }
            rows.push(StatRow {
                event: &events[i],
                stats: stats[pos],
            });
        }
    }

    rows.sort_by_key(|row| row.event.event_time);
    rows
}

fn stats_table(rows: &[StatRow<'_>], key: KeySet, prefix: &str, window: &Window) -> Result<Table> {
    let mut columns = key_columns(key, rows.len());
    let [views_name, clicks_name, ratio_name] = window_columns(prefix, window);
    let mut views = Vec::with_capacity(rows.len());
    let mut clicks = Vec::with_capacity(rows.len());
    let mut ratios = Vec::with_capacity(rows.len());

    for row in rows {
        for (column, cell) in columns.iter_mut().zip(key_cells(row.event, key)) {
            column.values.push(cell);
        }
        views.push(Value::Int(row.stats.views as i64));
        clicks.push(Value::Int(row.stats.clicks as i64));
        ratios.push(Value::Float(row.stats.open_ratio));
    }

    columns.push(Column::new(views_name, views));
    columns.push(Column::new(clicks_name, clicks));
    columns.push(Column::new(ratio_name, ratios));
    Table::from_columns(columns)
}

/// Per-post popularity, one table per window (`post_popularity_<w>`).
pub fn post_popularity(events: &[Event], settings: &ExtractorSettings) -> Result<Vec<FeatureTable>> {
    settings
        .windows
        .iter()
        .map(|window| {
            let rows = windowed_rows(events, window, |e| &e.post_id);
            let table = stats_table(&rows, KeySet::Post, "post", window)?;
            debug!(window = %window, rows = table.len(), "post popularity computed");
            Ok(FeatureTable::new(
                format!("post_popularity_{}", window.label()),
                KeySet::Post,
                table,
            ))
        })
        .collect()
}

/// Per-(post, user) popularity, one table per window (`user_post_popularity_<w>`).
pub fn user_post_popularity(events: &[Event], settings: &ExtractorSettings) -> Result<Vec<FeatureTable>> {
    settings
        .windows
        .iter()
        .map(|window| {
            let rows = windowed_rows(events, window, |e| (&e.post_id, &e.user_id));
            let table = stats_table(&rows, KeySet::UserPost, "user_post", window)?;
            debug!(window = %window, rows = table.len(), "user-post popularity computed");
            Ok(FeatureTable::new(
                format!("user_post_popularity_{}", window.label()),
                KeySet::UserPost,
                table,
            ))
        })
        .collect()
}
