//! Backward as-of binding of wide-table features onto split rows.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use ndarray::Array2;
use ranker_core::schema::{EVENT_TIME, ID_COLUMNS, OPENED, POST_ID, USER_ID};
use ranker_core::{Column, EntityId, Error, FeatureMatrix, KeySet, KeyValue, Result, RowId, Table, Value};
use serde::{Deserialize, Serialize};
use telemetry::metrics;
use tracing::{debug, info};

use crate::config::BindGroup;
use crate::merge::FeatureManifest;

/// Attach to each left row the right row of the same `by` key with the
/// greatest `time` not after the left row's time.
///
/// Both tables must already be sorted by `time`. When several right rows
/// share that time, the last one in table order wins. Right rows without a
/// timestamp never match.
pub fn asof_backward<S: AsRef<str>>(left: &Table, right: &Table, time: &str, by: &[S]) -> Result<Table> {
    if !left.is_sorted_by_time(time)? {
        return Err(Error::schema(format!("left side of as-of join is not sorted by {}", time)));
    }
    if !right.is_sorted_by_time(time)? {
        return Err(Error::schema(format!("right side of as-of join is not sorted by {}", time)));
    }

    let left_by = by
        .iter()
        .map(|c| left.require_index(c.as_ref()))
        .collect::<Result<Vec<_>>>()?;
    let right_by = by
        .iter()
        .map(|c| right.require_index(c.as_ref()))
        .collect::<Result<Vec<_>>>()?;
    let left_times = &left.require(time)?.values;
    let right_times = &right.require(time)?.values;

    let carried: Vec<&Column> = right
        .columns()
        .iter()
        .filter(|c| c.name != time && !by.iter().any(|k| k.as_ref() == c.name))
        .collect();
    if let Some(clash) = carried.iter().find(|c| left.has_column(&c.name)) {
        return Err(Error::schema(format!(
            "column '{}' exists on both sides of the as-of join",
            clash.name
        )));
    }

    let mut history: HashMap<Vec<KeyValue>, Vec<(DateTime<Utc>, usize)>> = HashMap::new();
    for row in 0..right.len() {
        if let Some(t) = right_times[row].as_time() {
            history.entry(right.key_at(&right_by, row)).or_default().push((t, row));
        }
    }

    let matches: Vec<Option<usize>> = (0..left.len())
        .map(|row| {
            let t = left_times[row].as_time()?;
            let rows = history.get(&left.key_at(&left_by, row))?;
            let upto = rows.partition_point(|(rt, _)| *rt <= t);
            upto.checked_sub(1).map(|i| rows[i].1)
        })
        .collect();

    let mut bound = left.clone();
    for column in carried {
        let values = matches
            .iter()
            .map(|m| m.map(|i| column.values[i].clone()).unwrap_or(Value::Null))
            .collect();
        bound.add_column(Column::new(column.name.clone(), values))?;
    }
    Ok(bound)
}

/// One resolved bind: the entity key and the wide-table columns it attaches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BindStep {
    pub name: String,
    pub by: KeySet,
    pub columns: Vec<String>,
}

/// Resolve configured bind groups against the merged manifest.
///
/// Only columns of the selected feature groups are kept (all groups when
/// `selected` is empty). Steps left without columns are skipped.
pub fn resolve_bind_plan(
    bind_groups: &[BindGroup],
    manifest: &FeatureManifest,
    selected: &[String],
) -> Result<Vec<BindStep>> {
    let known: HashSet<String> = manifest.all_columns().into_iter().collect();
    let allowed: HashSet<String> = manifest.columns_for(selected)?.into_iter().collect();
    let mut plan = Vec::new();

    for group in bind_groups {
        let mut columns: Vec<String> = Vec::new();
        for column in &group.columns {
            if !known.contains(column) {
                return Err(Error::missing_column(format!(
                    "{} (bind group '{}')",
                    column, group.name
                )));
            }
            columns.push(column.clone());
        }
        for included in &group.include_groups {
            let entry = manifest.group(included).ok_or_else(|| {
                Error::config(format!(
                    "bind group '{}' includes feature group '{}' which was not merged",
                    group.name, included
                ))
            })?;
            columns.extend(entry.columns.iter().cloned());
        }

        let mut seen = HashSet::new();
        columns.retain(|c| allowed.contains(c) && seen.insert(c.clone()));
        if columns.is_empty() {
            debug!(bind_group = %group.name, "No selected columns, skipping bind");
            continue;
        }
        plan.push(BindStep {
            name: group.name.clone(),
            by: group.by,
            columns,
        });
    }
    Ok(plan)
}

/// Chain every bind step onto the split rows.
///
/// Both sides are sorted by event time before each join, so the result is in
/// event-time order whatever the input order was.
pub fn bind(rows: &Table, wide: &Table, plan: &[BindStep]) -> Result<Table> {
    let mut bound = rows.sorted_by_time(EVENT_TIME)?;

    for step in plan {
        let mut projection: Vec<&str> = step.by.columns().to_vec();
        projection.extend(step.columns.iter().map(String::as_str));
        let right = wide.select(&projection)?.sorted_by_time(EVENT_TIME)?;

        bound = asof_backward(&bound.sorted_by_time(EVENT_TIME)?, &right, EVENT_TIME, step.by.by_columns())?;
        debug!(bind_group = %step.name, columns = step.columns.len(), rows = bound.len(), "Bound feature group");
    }

    metrics().bound_rows.inc_by(bound.len() as u64);
    info!(rows = bound.len(), columns = bound.num_columns(), steps = plan.len(), "Features bound");
    Ok(bound)
}

fn id_cell(value: &Value, column: &str, row: usize) -> Result<EntityId> {
    match value {
        Value::Str(s) => Ok(EntityId::new(s.clone())),
        Value::Int(i) => Ok(EntityId::new(i.to_string())),
        other => Err(Error::schema(format!("row {}: {} is not an identifier: {:?}", row, column, other))),
    }
}

/// Post-bind cleanup into a numeric matrix.
///
/// Identifier columns and the label are split off. Booleans become 0/1,
/// non-numeric columns are dropped, and nulls or NaNs become 0.
pub fn to_matrix(bound: &Table) -> Result<FeatureMatrix> {
    let post_ids = &bound.require(POST_ID)?.values;
    let user_ids = &bound.require(USER_ID)?.values;
    let times = &bound.require(EVENT_TIME)?.values;

    let ids = (0..bound.len())
        .map(|row| {
            Ok(RowId {
                post_id: id_cell(&post_ids[row], POST_ID, row)?,
                user_id: id_cell(&user_ids[row], USER_ID, row)?,
                event_time: times[row]
                    .as_time()
                    .ok_or_else(|| Error::schema(format!("row {}: {} is not a timestamp", row, EVENT_TIME)))?,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let labels = match bound.column(OPENED) {
        Some(column) => column
            .values
            .iter()
            .map(|v| if v.as_bool().unwrap_or(false) { 1.0 } else { 0.0 })
            .collect(),
        None => vec![0.0; bound.len()],
    };

    let mut dropped = Vec::new();
    let features: Vec<&Column> = bound
        .columns()
        .iter()
        .filter(|c| !ID_COLUMNS.contains(&c.name.as_str()) && c.name != OPENED)
        .filter(|c| {
            let numeric = c.is_numeric();
            if !numeric {
                dropped.push(c.name.clone());
            }
            numeric
        })
        .collect();
    if !dropped.is_empty() {
        debug!(columns = ?dropped, "Dropped non-numeric columns");
    }

    let mut values = Array2::<f32>::zeros((bound.len(), features.len()));
    for (j, column) in features.iter().enumerate() {
        for (i, cell) in column.values.iter().enumerate() {
            let x = cell.as_f64().unwrap_or(0.0);
            values[[i, j]] = if x.is_finite() { x as f32 } else { 0.0 };
        }
    }

    Ok(FeatureMatrix {
        ids,
        columns: features.iter().map(|c| c.name.clone()).collect(),
        values,
        labels,
    })
}
