//! Train, eval, and test split construction.
//!
//! Train and eval are time-range filters (train additionally loses its
//! sparse-negative users). Test is synthesized: every open of a post created
//! the day before becomes a seed, and every post eligible on the seed's day is
//! added as a negative for the seed's user and time.

use std::collections::{HashMap, HashSet};

use chrono::NaiveDate;
use ranker_core::{Event, PostId, SplitRow, TimeRange, UserId};
use telemetry::metrics;
use tracing::{debug, info, warn};

use crate::config::DatasetConfig;

/// The three split datasets.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Splits {
    pub train: Vec<SplitRow>,
    pub eval: Vec<SplitRow>,
    pub test: Vec<SplitRow>,
}

/// Outcome of the sparse-negative filter.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrainSplit {
    pub rows: Vec<SplitRow>,
    pub dropped_users: Vec<UserId>,
}

/// Outcome of test synthesis; counts are after the test-start filter.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TestSplit {
    pub rows: Vec<SplitRow>,
    pub seeds: usize,
    pub negatives: usize,
}

/// Builds splits from the deduplicated event log.
#[derive(Debug, Clone)]
pub struct DatasetSplitter {
    config: DatasetConfig,
}

impl DatasetSplitter {
    pub fn new(config: DatasetConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DatasetConfig {
        &self.config
    }

    pub fn split(&self, events: &[Event]) -> Splits {
        if self.config.test_starts_before_eval_end() {
            warn!(
                test_start = %self.config.test_start_date,
                eval_end = %self.config.eval_end_date,
                "Test range starts before eval ends, test rows start at eval end"
            );
        }
        let train = train_split(events, self.config.train_range(), self.config.sparse_user_threshold);
        let eval = eval_split(events, self.config.eval_range());
        let test = test_split(
            events,
            self.config.test_lookback_range(),
            self.config.test_range().start,
        );

        metrics().train_rows.set(train.rows.len() as u64);
        metrics().eval_rows.set(eval.len() as u64);
        metrics().test_rows.set(test.rows.len() as u64);
        metrics().sparse_users_dropped.inc_by(train.dropped_users.len() as u64);
        metrics().test_seeds.inc_by(test.seeds as u64);
        metrics().test_negatives.inc_by(test.negatives as u64);

        info!(
            train = train.rows.len(),
            eval = eval.len(),
            test = test.rows.len(),
            sparse_users_dropped = train.dropped_users.len(),
            test_seeds = test.seeds,
            test_negatives = test.negatives,
            "Built splits"
        );

        Splits {
            train: train.rows,
            eval,
            test: test.rows,
        }
    }
}

/// Events of the train range, minus users with at most `threshold` events and no open.
pub fn train_split(events: &[Event], range: TimeRange, threshold: usize) -> TrainSplit {
    let in_range: Vec<&Event> = events.iter().filter(|e| range.contains(e.event_time)).collect();

    // (event count, any open) per user
    let mut activity: HashMap<&UserId, (usize, bool)> = HashMap::new();
    for event in &in_range {
        let entry = activity.entry(&event.user_id).or_insert((0, false));
        entry.0 += 1;
        entry.1 |= event.opened;
    }

    let sparse_negative: HashSet<&UserId> = activity
        .iter()
        .filter(|(_, &(count, any_open))| count <= threshold && !any_open)
        .map(|(&user, _)| user)
        .collect();

    let rows = in_range
        .iter()
        .filter(|e| !sparse_negative.contains(&e.user_id))
        .map(|e| SplitRow::from(*e))
        .collect();

    let mut dropped_users: Vec<UserId> = sparse_negative.into_iter().cloned().collect();
    dropped_users.sort();

    debug!(dropped = dropped_users.len(), threshold, "Removed sparse-negative users");
    TrainSplit { rows, dropped_users }
}

/// Events of the eval range, unfiltered.
pub fn eval_split(events: &[Event], range: TimeRange) -> Vec<SplitRow> {
    events
        .iter()
        .filter(|e| range.contains(e.event_time))
        .map(SplitRow::from)
        .collect()
}

/// Distinct posts eligible on each day: posts created the day before, in first-seen order.
pub fn eligible_posts_by_day<'a, I>(events: I) -> HashMap<NaiveDate, Vec<PostId>>
where
    I: IntoIterator<Item = &'a Event>,
{
    let mut seen: HashSet<(NaiveDate, &PostId)> = HashSet::new();
    let mut by_day: HashMap<NaiveDate, Vec<PostId>> = HashMap::new();

    for event in events {
        let Some(day) = event.post_creation_date_plus_one() else {
            continue;
        };
        if seen.insert((day, &event.post_id)) {
            by_day.entry(day).or_default().push(event.post_id.clone());
        }
    }

    by_day
}

/// Synthesize the test set from the lookback buffer.
///
/// A seed's own post is also emitted among its negatives; seed and negative
/// rows are concatenated without deduplication.
pub fn test_split(events: &[Event], lookback: TimeRange, test_start: chrono::DateTime<chrono::Utc>) -> TestSplit {
    let buffer: Vec<&Event> = events
        .iter()
        .filter(|e| lookback.contains(e.event_time))
        .collect();

    let eligible = eligible_posts_by_day(buffer.iter().copied());

    let seeds: Vec<&Event> = buffer
        .iter()
        .copied()
        .filter(|e| e.opened && e.post_from_yesterday())
        .collect();

    let mut negatives = Vec::new();
    for seed in &seeds {
        let Some(posts) = eligible.get(&seed.event_time.date_naive()) else {
            continue;
        };
        for post_id in posts {
            negatives.push(SplitRow::new(
                post_id.clone(),
                seed.user_id.clone(),
                seed.event_time,
                false,
            ));
        }
    }

    let seed_rows: Vec<SplitRow> = seeds
        .into_iter()
        .filter(|e| e.event_time >= test_start)
        .map(SplitRow::from)
        .collect();
    let negatives: Vec<SplitRow> = negatives
        .into_iter()
        .filter(|r| r.event_time >= test_start)
        .collect();

    let seed_count = seed_rows.len();
    let negative_count = negatives.len();

    let mut rows = seed_rows;
    rows.extend(negatives);

    TestSplit {
        rows,
        seeds: seed_count,
        negatives: negative_count,
    }
}
