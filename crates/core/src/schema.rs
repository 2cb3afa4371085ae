//! Canonical column names and join-key sets.

use serde::{Deserialize, Serialize};

pub const POST_ID: &str = "post_id";
pub const USER_ID: &str = "user_id";
pub const EVENT_TIME: &str = "event_time";
pub const OPENED: &str = "opened";

pub const PREDICTION: &str = "prediction";
pub const RANK: &str = "rank";

/// Identifier columns that never enter the feature matrix.
pub const ID_COLUMNS: [&str; 3] = [POST_ID, USER_ID, EVENT_TIME];

/// Users with at most this many train-range events and no open are dropped from train.
pub const DEFAULT_SPARSE_USER_THRESHOLD: usize = 4;

/// Declared join key of a feature table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeySet {
    /// user_id + event_time
    User,
    /// post_id + event_time
    Post,
    /// post_id + user_id + event_time
    UserPost,
}

impl KeySet {
    /// Key columns, event_time last.
    pub fn columns(&self) -> &'static [&'static str] {
        match self {
            Self::User => &[USER_ID, EVENT_TIME],
            Self::Post => &[POST_ID, EVENT_TIME],
            Self::UserPost => &[POST_ID, USER_ID, EVENT_TIME],
        }
    }

    /// Entity columns, without the time axis.
    pub fn by_columns(&self) -> &'static [&'static str] {
        let columns = self.columns();
        &columns[..columns.len() - 1]
    }

    pub fn is_key_column(&self, name: &str) -> bool {
        self.columns().contains(&name)
    }
}
