//! Structured logging and in-process pipeline metrics for the feed ranker.
//!
//! Metrics are kept in memory for the duration of one run and logged as a
//! snapshot when the run finishes.

pub mod metrics;
pub mod tracing_setup;

pub use metrics::*;
pub use tracing_setup::*;
