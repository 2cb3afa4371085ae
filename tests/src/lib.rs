//! Shared helpers for the feed ranker integration tests.

pub mod fixtures;
pub mod setup;
