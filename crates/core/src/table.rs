//! Columnar tables exchanged between pipeline stages.
//!
//! Every stage produces a new `Table` and hands it read-only to the next one.
//! Tables are stored column by column; joins address rows by index.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A single cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Time(DateTime<Utc>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Numeric view of the cell. Booleans coerce to 0/1.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Self::Int(i) => Some(*i as f64),
            Self::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Whether the cell can live in a numeric feature column.
    pub fn is_numeric(&self) -> bool {
        matches!(self, Self::Null | Self::Bool(_) | Self::Int(_) | Self::Float(_))
    }

    pub fn as_time(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Time(t) => Some(*t),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            Self::Int(i) => Some(*i != 0),
            _ => None,
        }
    }

    /// Hashable representation used for join keys.
    pub fn key(&self) -> KeyValue {
        match self {
            Self::Null => KeyValue::Null,
            Self::Bool(b) => KeyValue::Bool(*b),
            Self::Int(i) => KeyValue::Int(*i),
            Self::Float(f) => KeyValue::Float(f.to_bits()),
            Self::Str(s) => KeyValue::Str(s.clone()),
            Self::Time(t) => KeyValue::Time(t.timestamp_micros()),
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Self::Int(i),
                None => n.as_f64().map(Self::Float).unwrap_or(Self::Null),
            },
            serde_json::Value::String(s) => Self::Str(s),
            other => Self::Str(other.to_string()),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Self::Float(f)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Str(s.to_string())
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(t: DateTime<Utc>) -> Self {
        Self::Time(t)
    }
}

/// Join-key form of a `Value`: floats compare by bit pattern, times by microseconds.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum KeyValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(u64),
    Str(String),
    Time(i64),
}

/// A named column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub values: Vec<Value>,
}

impl Column {
    pub fn new(name: impl Into<String>, values: Vec<Value>) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }

    /// Column of `len` nulls.
    pub fn nulls(name: impl Into<String>, len: usize) -> Self {
        Self::new(name, vec![Value::Null; len])
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// True when every non-null cell is numeric or boolean.
    pub fn is_numeric(&self) -> bool {
        self.values.iter().all(Value::is_numeric)
    }
}

/// Immutable-by-convention columnar table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Table {
    columns: Vec<Column>,
    len: usize,
}

impl Table {
    /// Empty table with the given column names.
    pub fn with_columns<S: AsRef<str>>(names: &[S]) -> Result<Self> {
        let columns = names
            .iter()
            .map(|n| Column::new(n.as_ref(), Vec::new()))
            .collect();
        Self::from_columns(columns)
    }

    /// Build a table from columns of equal length and unique names.
    pub fn from_columns(columns: Vec<Column>) -> Result<Self> {
        let len = columns.first().map(Column::len).unwrap_or(0);
        let mut seen = HashSet::new();

        for column in &columns {
            if column.len() != len {
                return Err(Error::schema(format!(
                    "column '{}' has {} rows, expected {}",
                    column.name,
                    column.len(),
                    len
                )));
            }
            if !seen.insert(column.name.as_str()) {
                return Err(Error::schema(format!("duplicate column '{}'", column.name)));
            }
        }

        Ok(Self { columns, len })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn into_columns(self) -> Vec<Column> {
        self.columns
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Like `column`, but a missing column is a schema error.
    pub fn require(&self, name: &str) -> Result<&Column> {
        self.column(name)
            .ok_or_else(|| Error::missing_column(name))
    }

    pub fn require_index(&self, name: &str) -> Result<usize> {
        self.column_index(name)
            .ok_or_else(|| Error::missing_column(name))
    }

    /// Append a row; cell order follows column order.
    pub fn push_row(&mut self, row: Vec<Value>) -> Result<()> {
        if row.len() != self.columns.len() {
            return Err(Error::schema(format!(
                "row has {} cells, table has {} columns",
                row.len(),
                self.columns.len()
            )));
        }
        for (column, value) in self.columns.iter_mut().zip(row) {
            column.values.push(value);
        }
        self.len += 1;
        Ok(())
    }

    /// Append a column of matching length.
    pub fn add_column(&mut self, column: Column) -> Result<()> {
        if self.has_column(&column.name) {
            return Err(Error::schema(format!("duplicate column '{}'", column.name)));
        }
        if !self.columns.is_empty() && column.len() != self.len {
            return Err(Error::schema(format!(
                "column '{}' has {} rows, expected {}",
                column.name,
                column.len(),
                self.len
            )));
        }
        if self.columns.is_empty() {
            self.len = column.len();
        }
        self.columns.push(column);
        Ok(())
    }

    /// Project onto the named columns, in the given order.
    pub fn select<S: AsRef<str>>(&self, names: &[S]) -> Result<Table> {
        let columns = names
            .iter()
            .map(|n| self.require(n.as_ref()).cloned())
            .collect::<Result<Vec<_>>>()?;
        Self::from_columns(columns).map(|mut t| {
            t.len = self.len;
            t
        })
    }

    /// Drop every column for which `keep` returns false.
    pub fn retain_columns<F: FnMut(&Column) -> bool>(&mut self, mut keep: F) {
        self.columns.retain(|c| keep(c));
    }

    /// Rows at `indices`, in that order (indices may repeat).
    pub fn take(&self, indices: &[usize]) -> Table {
        let columns = self
            .columns
            .iter()
            .map(|c| Column::new(c.name.clone(), indices.iter().map(|&i| c.values[i].clone()).collect()))
            .collect();
        Table {
            columns,
            len: indices.len(),
        }
    }

    /// Join key of `row` over the given column positions.
    pub fn key_at(&self, key_columns: &[usize], row: usize) -> Vec<KeyValue> {
        key_columns
            .iter()
            .map(|&c| self.columns[c].values[row].key())
            .collect()
    }

    /// Row permutation that sorts the table by a time column, stable for ties.
    ///
    /// Rows whose cell is not a timestamp sort first.
    pub fn time_order(&self, time_column: &str) -> Result<Vec<usize>> {
        let times = &self.require(time_column)?.values;
        let mut order: Vec<usize> = (0..self.len).collect();
        order.sort_by_key(|&i| times[i].as_time());
        Ok(order)
    }

    /// Stable sort by a time column.
    pub fn sorted_by_time(&self, time_column: &str) -> Result<Table> {
        let order = self.time_order(time_column)?;
        Ok(self.take(&order))
    }

    /// Whether a time column is non-decreasing.
    pub fn is_sorted_by_time(&self, time_column: &str) -> Result<bool> {
        let times = &self.require(time_column)?.values;
        Ok(times
            .windows(2)
            .all(|w| w[0].as_time() <= w[1].as_time()))
    }
}
