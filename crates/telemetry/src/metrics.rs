//! Pipeline metrics.
//!
//! Counters are bumped by the stages as they run; `snapshot()` freezes them
//! for the end-of-run log line.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// A counter metric.
#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_by(&self, n: u64) {
        self.0.fetch_add(n, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }

    pub fn reset(&self) -> u64 {
        self.0.swap(0, Ordering::Relaxed)
    }
}

/// A gauge metric holding the latest observed value.
#[derive(Debug, Default)]
pub struct Gauge(AtomicU64);

impl Gauge {
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    pub fn set(&self, val: u64) {
        self.0.store(val, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Histogram for stage durations.
#[derive(Debug)]
pub struct Histogram {
    /// Buckets: 10ms, 100ms, 500ms, 1s, 5s, 30s, 1min, 5min, 15min, 1h
    buckets: [AtomicU64; 10],
    sum: AtomicU64,
    count: AtomicU64,
}

impl Default for Histogram {
    fn default() -> Self {
        Self::new()
    }
}

impl Histogram {
    const BUCKET_BOUNDS: [u64; 10] = [
        10, 100, 500, 1_000, 5_000, 30_000, 60_000, 300_000, 900_000, 3_600_000,
    ];

    pub fn new() -> Self {
        Self {
            buckets: Default::default(),
            sum: AtomicU64::new(0),
            count: AtomicU64::new(0),
        }
    }

    /// Records a value in milliseconds.
    pub fn observe(&self, ms: u64) {
        self.sum.fetch_add(ms, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);

        let last = Self::BUCKET_BOUNDS.len() - 1;
        let idx = Self::BUCKET_BOUNDS
            .iter()
            .position(|&bound| ms <= bound)
            .unwrap_or(last);
        self.buckets[idx].fetch_add(1, Ordering::Relaxed);
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    pub fn sum(&self) -> u64 {
        self.sum.load(Ordering::Relaxed)
    }

    pub fn mean(&self) -> f64 {
        let count = self.count();
        if count == 0 {
            0.0
        } else {
            self.sum() as f64 / count as f64
        }
    }

    /// Returns bucket counts.
    pub fn buckets(&self) -> Vec<(u64, u64)> {
        Self::BUCKET_BOUNDS
            .iter()
            .zip(self.buckets.iter())
            .map(|(&bound, count)| (bound, count.load(Ordering::Relaxed)))
            .collect()
    }
}

/// Duration of one completed stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageTiming {
    pub stage: String,
    pub millis: u64,
}

/// Collected metrics for one pipeline run.
#[derive(Debug, Default)]
pub struct Metrics {
    // Event log
    pub events_loaded: Counter,
    pub duplicate_events: Counter,

    // Splits
    pub train_rows: Gauge,
    pub eval_rows: Gauge,
    pub test_rows: Gauge,
    pub sparse_users_dropped: Counter,
    pub test_seeds: Counter,
    pub test_negatives: Counter,

    // Features
    pub feature_tables_built: Counter,
    pub feature_rows: Counter,
    pub merged_rows: Gauge,
    pub bound_rows: Counter,

    // Model
    pub epochs_run: Counter,
    pub rows_scored: Counter,

    // Storage
    pub snapshots_written: Counter,

    pub stage_latency_ms: Histogram,
    stages: Mutex<Vec<StageTiming>>,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a finished stage.
    pub fn record_stage(&self, stage: &str, millis: u64) {
        self.stage_latency_ms.observe(millis);
        self.stages.lock().push(StageTiming {
            stage: stage.to_string(),
            millis,
        });
    }

    /// Start timing a stage; the timing is recorded when the guard drops.
    pub fn time_stage<'a>(&'a self, stage: &'a str) -> StageTimer<'a> {
        StageTimer {
            metrics: self,
            stage,
            started: Instant::now(),
        }
    }

    pub fn stage_timings(&self) -> Vec<StageTiming> {
        self.stages.lock().clone()
    }
}

/// Guard returned by [`Metrics::time_stage`].
pub struct StageTimer<'a> {
    metrics: &'a Metrics,
    stage: &'a str,
    started: Instant,
}

impl Drop for StageTimer<'_> {
    fn drop(&mut self) {
        let millis = self.started.elapsed().as_millis() as u64;
        self.metrics.record_stage(self.stage, millis);
    }
}

/// A snapshot of metrics at a point in time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub timestamp: DateTime<Utc>,
    pub events_loaded: u64,
    pub duplicate_events: u64,
    pub train_rows: u64,
    pub eval_rows: u64,
    pub test_rows: u64,
    pub sparse_users_dropped: u64,
    pub test_seeds: u64,
    pub test_negatives: u64,
    pub feature_tables_built: u64,
    pub feature_rows: u64,
    pub merged_rows: u64,
    pub bound_rows: u64,
    pub epochs_run: u64,
    pub rows_scored: u64,
    pub snapshots_written: u64,
    pub stage_latency_mean_ms: f64,
    pub stages: Vec<StageTiming>,
}

impl Metrics {
    /// Takes a snapshot of current metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            timestamp: Utc::now(),
            events_loaded: self.events_loaded.get(),
            duplicate_events: self.duplicate_events.get(),
            train_rows: self.train_rows.get(),
            eval_rows: self.eval_rows.get(),
            test_rows: self.test_rows.get(),
            sparse_users_dropped: self.sparse_users_dropped.get(),
            test_seeds: self.test_seeds.get(),
            test_negatives: self.test_negatives.get(),
            feature_tables_built: self.feature_tables_built.get(),
            feature_rows: self.feature_rows.get(),
            merged_rows: self.merged_rows.get(),
            bound_rows: self.bound_rows.get(),
            epochs_run: self.epochs_run.get(),
            rows_scored: self.rows_scored.get(),
            snapshots_written: self.snapshots_written.get(),
            stage_latency_mean_ms: self.stage_latency_ms.mean(),
            stages: self.stage_timings(),
        }
    }
}

/// Process-wide metrics registry.
pub static METRICS: std::sync::LazyLock<Metrics> = std::sync::LazyLock::new(Metrics::new);

/// Get the process-wide metrics instance.
pub fn metrics() -> &'static Metrics {
    &METRICS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_histogram_buckets() {
        let histogram = Histogram::new();
        histogram.observe(5);
        histogram.observe(700);
        histogram.observe(10_000_000);

        assert_eq!(histogram.count(), 3);
        let buckets = histogram.buckets();
        assert_eq!(buckets[0], (10, 1));
        assert_eq!(buckets[3], (1_000, 1));
        // Beyond the last bound lands in the last bucket.
        assert_eq!(buckets[9], (3_600_000, 1));
    }

    #[test]
    fn test_stage_timer_records_on_drop() {
        let metrics = Metrics::new();
        {
            let _timer = metrics.time_stage("make_dataset");
        }
        metrics.record_stage("train", 1_500);

        let snapshot = metrics.snapshot();
        let stages: Vec<_> = snapshot.stages.iter().map(|s| s.stage.as_str()).collect();
        assert_eq!(stages, vec!["make_dataset", "train"]);
        assert_eq!(metrics.stage_latency_ms.count(), 2);
    }

    #[test]
    fn test_counter_reset() {
        let counter = Counter::new();
        counter.inc();
        counter.inc_by(4);
        assert_eq!(counter.reset(), 5);
        assert_eq!(counter.get(), 0);
    }
}
