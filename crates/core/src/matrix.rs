//! Model-ready numeric matrices.

use ndarray::Array2;

use crate::events::{PostId, UserId};
use chrono::{DateTime, Utc};

/// Identity of one matrix row.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RowId {
    pub post_id: PostId,
    pub user_id: UserId,
    pub event_time: DateTime<Utc>,
}

/// Bound feature matrix: one row per split row, one column per numeric feature.
#[derive(Debug, Clone)]
pub struct FeatureMatrix {
    pub ids: Vec<RowId>,
    pub columns: Vec<String>,
    pub values: Array2<f32>,
    pub labels: Vec<f32>,
}

impl FeatureMatrix {
    pub fn empty(columns: Vec<String>) -> Self {
        let width = columns.len();
        Self {
            ids: Vec::new(),
            columns,
            values: Array2::zeros((0, width)),
            labels: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.values.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn num_features(&self) -> usize {
        self.values.ncols()
    }

    /// Reorder columns to `columns`; a column this matrix lacks is filled with zeros.
    pub fn aligned_to(&self, columns: &[String]) -> FeatureMatrix {
        let mut values = Array2::zeros((self.len(), columns.len()));
        for (target, name) in columns.iter().enumerate() {
            if let Some(source) = self.columns.iter().position(|c| c == name) {
                values.column_mut(target).assign(&self.values.column(source));
            }
        }
        FeatureMatrix {
            ids: self.ids.clone(),
            columns: columns.to_vec(),
            values,
            labels: self.labels.clone(),
        }
    }
}
