//! Event log reader and table snapshot storage for the feed ranker.

pub mod config;
pub mod reader;
pub mod snapshot;

pub use config::*;
pub use reader::load_events;
pub use snapshot::*;
