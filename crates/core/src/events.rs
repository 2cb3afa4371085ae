//! Interaction events and split rows.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{Error, Result};
use crate::schema::{EVENT_TIME, OPENED, POST_ID, USER_ID};
use crate::table::{Column, Table, Value};
use crate::time::deserialize_timestamp;

/// Opaque entity identifier. The event log uses both numbers and strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl<'de> Deserialize<'de> for EntityId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        match serde_json::Value::deserialize(deserializer)? {
            serde_json::Value::String(s) => Ok(Self(s)),
            serde_json::Value::Number(n) => Ok(Self(n.to_string())),
            other => Err(serde::de::Error::custom(format!(
                "identifier must be a string or number, got {}",
                other
            ))),
        }
    }
}

pub type PostId = EntityId;
pub type UserId = EntityId;

fn null_as_empty<'de, D>(deserializer: D) -> std::result::Result<Vec<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<i64>>::deserialize(deserializer)?.unwrap_or_default())
}

fn default_age() -> f64 {
    0.0
}

/// One exposure of a post to a user, as found in the raw event log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "trackable_id")]
    pub post_id: PostId,
    pub user_id: UserId,
    #[serde(rename = "tracker_created_at", deserialize_with = "deserialize_timestamp")]
    pub event_time: DateTime<Utc>,
    /// Age of the post at exposure time.
    #[serde(rename = "post_age_in_minutes", default = "default_age")]
    pub post_age_minutes: f64,
    #[serde(rename = "has_been_opened", default)]
    pub opened: bool,

    #[serde(default, deserialize_with = "null_as_empty")]
    pub author_children_age_year: Vec<i64>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub author_children_age_month: Vec<i64>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub user_children_age_month: Vec<i64>,

    /// Static user and post profile attributes.
    #[serde(flatten)]
    pub attributes: BTreeMap<String, serde_json::Value>,
}

impl Event {
    /// Bare event with no profile attributes.
    pub fn new(
        post_id: impl Into<PostId>,
        user_id: impl Into<UserId>,
        event_time: DateTime<Utc>,
        opened: bool,
    ) -> Self {
        Self {
            post_id: post_id.into(),
            user_id: user_id.into(),
            event_time,
            post_age_minutes: 0.0,
            opened,
            author_children_age_year: Vec::new(),
            author_children_age_month: Vec::new(),
            user_children_age_month: Vec::new(),
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_post_age_minutes(mut self, minutes: f64) -> Self {
        self.post_age_minutes = minutes;
        self
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: serde_json::Value) -> Self {
        self.attributes.insert(name.into(), value);
        self
    }

    /// Identity after deduplication.
    pub fn key(&self) -> (&PostId, &UserId, DateTime<Utc>) {
        (&self.post_id, &self.user_id, self.event_time)
    }

    /// When the post was created, or `None` when the age puts it outside the
    /// representable time range.
    pub fn post_created_at(&self) -> Option<DateTime<Utc>> {
        let millis = (self.post_age_minutes * 60_000.0).round();
        if !millis.is_finite() {
            return None;
        }
        let age = Duration::try_milliseconds(millis as i64)?;
        self.event_time.checked_sub_signed(age)
    }

    /// Calendar day the post was created on.
    pub fn post_creation_date(&self) -> Option<NaiveDate> {
        self.post_created_at().map(|t| t.date_naive())
    }

    /// Day after the post's creation day: the only day the post counts as "yesterday's post".
    pub fn post_creation_date_plus_one(&self) -> Option<NaiveDate> {
        self.post_creation_date()?.succ_opt()
    }

    pub fn post_from_yesterday(&self) -> bool {
        self.post_creation_date_plus_one() == Some(self.event_time.date_naive())
    }

    /// Reject records whose derived timestamps cannot be represented.
    pub fn check(&self) -> Result<()> {
        if self.post_created_at().is_none() {
            return Err(Error::schema(format!(
                "post_age_in_minutes {} is out of range for event at {}",
                self.post_age_minutes, self.event_time
            )));
        }
        Ok(())
    }

    /// Profile attribute as a table cell (null when absent).
    ///
    /// `post_age_in_minutes` is decoded into a typed field but still projects as a column.
    pub fn attribute(&self, name: &str) -> Value {
        if name == "post_age_in_minutes" {
            return Value::Float(self.post_age_minutes);
        }
        self.attributes
            .get(name)
            .cloned()
            .map(Value::from)
            .unwrap_or(Value::Null)
    }
}

/// Canonical four-column row of the train, eval, and test splits.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SplitRow {
    pub post_id: PostId,
    pub user_id: UserId,
    pub event_time: DateTime<Utc>,
    pub opened: bool,
}

impl SplitRow {
    pub fn new(post_id: PostId, user_id: UserId, event_time: DateTime<Utc>, opened: bool) -> Self {
        Self {
            post_id,
            user_id,
            event_time,
            opened,
        }
    }

    /// Column layout of every split snapshot.
    pub fn columns() -> [&'static str; 4] {
        [POST_ID, USER_ID, EVENT_TIME, OPENED]
    }

    pub fn to_table(rows: &[SplitRow]) -> Table {
        let mut post_ids = Vec::with_capacity(rows.len());
        let mut user_ids = Vec::with_capacity(rows.len());
        let mut times = Vec::with_capacity(rows.len());
        let mut opened = Vec::with_capacity(rows.len());

        for row in rows {
            post_ids.push(Value::Str(row.post_id.to_string()));
            user_ids.push(Value::Str(row.user_id.to_string()));
            times.push(Value::Time(row.event_time));
            opened.push(Value::Bool(row.opened));
        }

        Table::from_columns(vec![
            Column::new(POST_ID, post_ids),
            Column::new(USER_ID, user_ids),
            Column::new(EVENT_TIME, times),
            Column::new(OPENED, opened),
        ])
        .unwrap_or_default()
    }

    pub fn from_table(table: &Table) -> Result<Vec<SplitRow>> {
        let post_ids = &table.require(POST_ID)?.values;
        let user_ids = &table.require(USER_ID)?.values;
        let times = &table.require(EVENT_TIME)?.values;
        let opened = &table.require(OPENED)?.values;

        (0..table.len())
            .map(|i| {
                let time = times[i]
                    .as_time()
                    .ok_or_else(|| Error::schema(format!("row {}: {} is not a timestamp", i, EVENT_TIME)))?;
                Ok(SplitRow {
                    post_id: id_from_cell(&post_ids[i], i, POST_ID)?,
                    user_id: id_from_cell(&user_ids[i], i, USER_ID)?,
                    event_time: time,
                    opened: opened[i].as_bool().unwrap_or(false),
                })
            })
            .collect()
    }
}

fn id_from_cell(value: &Value, row: usize, column: &str) -> Result<EntityId> {
    match value {
        Value::Str(s) => Ok(EntityId::new(s.clone())),
        Value::Int(i) => Ok(EntityId::new(i.to_string())),
        other => Err(Error::schema(format!(
            "row {}: {} must be an identifier, got {:?}",
            row, column, other
        ))),
    }
}

impl From<&Event> for SplitRow {
    fn from(e: &Event) -> Self {
        SplitRow::new(e.post_id.clone(), e.user_id.clone(), e.event_time, e.opened)
    }
}
