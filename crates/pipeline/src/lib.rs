//! Stage orchestration for the feed ranker.

pub mod config;
pub mod runner;

pub use config::PipelineConfig;
pub use runner::*;
