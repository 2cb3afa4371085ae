//! Children-age features derived per event.

use std::collections::HashSet;

use ranker_core::{Column, Event, KeySet, Result, Table, Value};

use crate::base::{key_cells, key_columns};
use crate::registry::{ExtractorSettings, FeatureTable};

pub const SAME_AGE_CHILDREN: &str = "author_has_same_age_children";
pub const SAME_AGE_MONTH_CHILDREN: &str = "author_has_same_age_month_children";
pub const OLDER_CHILDREN: &str = "author_has_older_children";

/// User child ages are recorded in months only.
fn user_ages_in_years(event: &Event) -> Vec<i64> {
    event
        .user_children_age_month
        .iter()
        .map(|m| m.div_euclid(12))
        .collect()
}

fn intersects(a: &[i64], b: &[i64]) -> bool {
    let a: HashSet<_> = a.iter().collect();
    b.iter().any(|x| a.contains(x))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChildrenAges {
    pub same_age: bool,
    pub same_age_month: bool,
    pub older: bool,
}

impl ChildrenAges {
    pub fn of(event: &Event) -> Self {
        let user_years = user_ages_in_years(event);
        let author_max = event.author_children_age_year.iter().copied().max().unwrap_or(-1);
        let user_max = user_years.iter().copied().max().unwrap_or(-1);

        Self {
            same_age: intersects(&event.author_children_age_year, &user_years),
            same_age_month: intersects(&event.author_children_age_month, &event.user_children_age_month),
            older: author_max > user_max,
        }
    }
}

/// Author/user children-age comparisons, one row per event.
pub fn extra_features(events: &[Event], _settings: &ExtractorSettings) -> Result<Vec<FeatureTable>> {
    let key = KeySet::UserPost;
    let mut columns = key_columns(key, events.len());
    let mut same_age = Vec::with_capacity(events.len());
    let mut same_age_month = Vec::with_capacity(events.len());
    let mut older = Vec::with_capacity(events.len());

    for event in events {
        for (column, cell) in columns.iter_mut().zip(key_cells(event, key)) {
            column.values.push(cell);
        }
        let ages = ChildrenAges::of(event);
        same_age.push(Value::Bool(ages.same_age));
        same_age_month.push(Value::Bool(ages.same_age_month));
        older.push(Value::Bool(ages.older));
    }

    columns.push(Column::new(SAME_AGE_CHILDREN, same_age));
    columns.push(Column::new(SAME_AGE_MONTH_CHILDREN, same_age_month));
    columns.push(Column::new(OLDER_CHILDREN, older));
    Ok(vec![FeatureTable::new("extra_features", key, Table::from_columns(columns)?)])
}
