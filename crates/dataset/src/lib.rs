//! Time-ranged train/eval/test splits for the feed ranker.
//!
//! - Train: train range minus sparse-negative users
//! - Eval: eval range, unfiltered
//! - Test: opened "yesterday's posts" seeds plus synthesized negatives

pub mod config;
pub mod splitter;

pub use config::DatasetConfig;
pub use splitter::*;
