//! Split boundaries.

use chrono::NaiveDate;
use ranker_core::schema::DEFAULT_SPARSE_USER_THRESHOLD;
use ranker_core::TimeRange;
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

/// Date boundaries of the three splits. Each date is read as UTC midnight.
///
/// All six dates are required.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[validate(schema(function = "validate_boundaries"))]
pub struct DatasetConfig {
    pub train_start_date: NaiveDate,
    pub train_end_date: NaiveDate,
    pub eval_start_date: NaiveDate,
    pub eval_end_date: NaiveDate,
    pub test_start_date: NaiveDate,
    pub test_end_date: NaiveDate,
    /// Train users with at most this many events and no open are dropped
    #[serde(default = "default_sparse_user_threshold")]
    pub sparse_user_threshold: usize,
}

fn default_sparse_user_threshold() -> usize {
    DEFAULT_SPARSE_USER_THRESHOLD
}

fn validate_boundaries(config: &DatasetConfig) -> Result<(), ValidationError> {
    let ranges = [
        ("train", config.train_start_date, config.train_end_date),
        ("eval", config.eval_start_date, config.eval_end_date),
        ("test", config.test_start_date, config.test_end_date),
    ];

    for (name, start, end) in ranges {
        if start > end {
            let mut err = ValidationError::new("inverted_range");
            err.message = Some(format!("{} range starts on {} after it ends on {}", name, start, end).into());
            return Err(err);
        }
    }

    Ok(())
}

impl DatasetConfig {
    pub fn train_range(&self) -> TimeRange {
        TimeRange::between_dates(self.train_start_date, self.train_end_date)
    }

    pub fn eval_range(&self) -> TimeRange {
        TimeRange::between_dates(self.eval_start_date, self.eval_end_date)
    }

    pub fn test_range(&self) -> TimeRange {
        TimeRange::between_dates(self.test_start_date, self.test_end_date)
    }

    /// Whether the test range starts before eval ends.
    ///
    /// Allowed: the lookback buffer then starts at eval end and test rows
    /// before eval end are simply never synthesized.
    pub fn test_starts_before_eval_end(&self) -> bool {
        self.test_start_date < self.eval_end_date
    }

    /// Events the test set is synthesized from: eval end through test end.
    pub fn test_lookback_range(&self) -> TimeRange {
        TimeRange::between_dates(self.eval_end_date, self.test_end_date)
    }
}
