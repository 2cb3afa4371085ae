//! Static profile projection.

use ranker_core::schema::{POST_ID, USER_ID};
use ranker_core::{Column, Event, KeySet, Result, Table, Value};

use crate::registry::{ExtractorSettings, FeatureTable};

/// Key cells of an event for a key set, in key-column order.
pub(crate) fn key_cells(event: &Event, key: KeySet) -> Vec<Value> {
    key.columns()
        .iter()
        .map(|name| match *name {
            POST_ID => Value::Str(event.post_id.to_string()),
            USER_ID => Value::Str(event.user_id.to_string()),
            _ => Value::Time(event.event_time),
        })
        .collect()
}

/// Empty key columns for a key set, sized for `capacity` rows.
pub(crate) fn key_columns(key: KeySet, capacity: usize) -> Vec<Column> {
    key.columns()
        .iter()
        .map(|name| Column::new(*name, Vec::with_capacity(capacity)))
        .collect()
}

/// The configured user and post attributes, unchanged, one row per event.
pub fn base_features(events: &[Event], settings: &ExtractorSettings) -> Result<Vec<FeatureTable>> {
    let key = KeySet::UserPost;
    let mut columns = key_columns(key, events.len());
    let attributes: Vec<&String> = settings
        .user_columns
        .iter()
        .chain(settings.post_columns.iter())
        .collect();
    let mut attribute_columns: Vec<Column> = attributes
        .iter()
        .map(|name| Column::new(name.as_str(), Vec::with_capacity(events.len())))
        .collect();

    for event in events {
        for (column, cell) in columns.iter_mut().zip(key_cells(event, key)) {
            column.values.push(cell);
        }
        for column in attribute_columns.iter_mut() {
            column.values.push(event.attribute(&column.name));
        }
    }

    columns.extend(attribute_columns);
    Ok(vec![FeatureTable::new("base_features", key, Table::from_columns(columns)?)])
}
