//! Core types, tables, and errors for the feed ranker.

pub mod error;
pub mod events;
pub mod matrix;
pub mod schema;
pub mod table;
pub mod time;
pub mod window;

pub use error::{Error, Result};
pub use events::*;
pub use matrix::*;
pub use schema::KeySet;
pub use table::*;
pub use time::TimeRange;
pub use window::Window;
