//! Left-join merge of feature tables into the wide table.

use std::collections::HashMap;

use ranker_core::{Column, Error, KeySet, KeyValue, Result, Table, Value};
use serde::{Deserialize, Serialize};
use telemetry::metrics;
use tracing::{debug, info, warn};

use crate::registry::GroupTables;

/// Relational left join of `right` into `left` on the `on` columns.
///
/// Unmatched left rows keep one row with nulls on the right; a right key
/// occurring several times repeats the matching left row once per match.
/// Right non-key columns must not already exist on the left.
pub fn left_join<S: AsRef<str>>(left: &Table, right: &Table, on: &[S]) -> Result<Table> {
    let left_keys = on
        .iter()
        .map(|c| left.require_index(c.as_ref()))
        .collect::<Result<Vec<_>>>()?;
    let right_keys = on
        .iter()
        .map(|c| right.require_index(c.as_ref()))
        .collect::<Result<Vec<_>>>()?;

    let carried: Vec<&Column> = right
        .columns()
        .iter()
        .filter(|c| !on.iter().any(|k| k.as_ref() == c.name))
        .collect();
    if let Some(clash) = carried.iter().find(|c| left.has_column(&c.name)) {
        return Err(Error::schema(format!(
            "column '{}' exists on both sides of the join",
            clash.name
        )));
    }

    let mut index: HashMap<Vec<KeyValue>, Vec<usize>> = HashMap::new();
    for row in 0..right.len() {
        index.entry(right.key_at(&right_keys, row)).or_default().push(row);
    }

    let mut left_rows = Vec::with_capacity(left.len());
    let mut right_rows: Vec<Option<usize>> = Vec::with_capacity(left.len());
    for row in 0..left.len() {
        match index.get(&left.key_at(&left_keys, row)) {
            Some(matches) => {
                for &m in matches {
                    left_rows.push(row);
                    right_rows.push(Some(m));
                }
            }
            None => {
                left_rows.push(row);
                right_rows.push(None);
            }
        }
    }

    let mut joined = left.take(&left_rows);
    for column in carried {
        let values = right_rows
            .iter()
            .map(|m| m.map(|i| column.values[i].clone()).unwrap_or(Value::Null))
            .collect();
        joined.add_column(Column::new(column.name.clone(), values))?;
    }
    Ok(joined)
}

/// Columns contributed by one feature group to the wide table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestGroup {
    pub name: String,
    pub key: KeySet,
    pub tables: Vec<String>,
    pub columns: Vec<String>,
}

/// Map of feature group → wide-table columns, written next to the wide table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureManifest {
    pub groups: Vec<ManifestGroup>,
}

impl FeatureManifest {
    pub fn group(&self, name: &str) -> Option<&ManifestGroup> {
        self.groups.iter().find(|g| g.name == name)
    }

    /// Every feature column, in merge order.
    pub fn all_columns(&self) -> Vec<String> {
        self.groups.iter().flat_map(|g| g.columns.iter().cloned()).collect()
    }

    /// Columns of the named groups; an empty selection means all groups.
    pub fn columns_for(&self, selected: &[String]) -> Result<Vec<String>> {
        if selected.is_empty() {
            return Ok(self.all_columns());
        }
        let mut columns = Vec::new();
        for name in selected {
            let group = self
                .group(name)
                .ok_or_else(|| Error::config(format!("feature group '{}' was not merged", name)))?;
            columns.extend(group.columns.iter().cloned());
        }
        Ok(columns)
    }
}

/// Merge built groups into one wide table, in the given order.
///
/// The first table seeds the wide table; every later table is left-joined
/// on its group's declared key.
pub fn merge_groups(groups: &[GroupTables]) -> Result<(Table, FeatureManifest)> {
    let mut wide: Option<Table> = None;
    let mut manifest = FeatureManifest::default();

    for group in groups {
        let mut entry = ManifestGroup {
            name: group.group.clone(),
            key: group.key,
            tables: Vec::new(),
            columns: Vec::new(),
        };
        if group.tables.is_empty() {
            warn!(group = %group.group, "Feature group produced no tables");
        }

        for feature in &group.tables {
            let next = match wide.take() {
                None => feature.table.clone(),
                Some(acc) => left_join(&acc, &feature.table, group.key.columns())?,
            };
            debug!(table = %feature.name, rows = next.len(), columns = next.num_columns(), "Merged feature table");

            entry.tables.push(feature.name.clone());
            entry.columns.extend(feature.feature_columns());
            wide = Some(next);
        }
        manifest.groups.push(entry);
    }

    let wide = wide.unwrap_or_default();
    metrics().merged_rows.set(wide.len() as u64);
    info!(rows = wide.len(), columns = wide.num_columns(), groups = manifest.groups.len(), "Wide feature table merged");
    Ok((wide, manifest))
}
