//! Trailing time windows such as `1d`, `7d`, `28d`.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use chrono::Duration;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

static WINDOW_LABEL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d+)(s|min|h|d|w)$").expect("window label pattern is valid")
});

/// A fixed trailing duration, identified by its label.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Window {
    label: String,
    duration: Duration,
}

impl Window {
    /// Label used in column and table names (`7d` → `post_last_7d_views_count`).
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn days(n: i64) -> Self {
        Self {
            label: format!("{}d", n),
            duration: Duration::days(n),
        }
    }

    /// The default windows: one day, one week, four weeks.
    pub fn defaults() -> Vec<Window> {
        vec![Self::days(1), Self::days(7), Self::days(28)]
    }
}

impl FromStr for Window {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let label = s.trim();
        let caps = WINDOW_LABEL
            .captures(label)
            .ok_or_else(|| Error::window(format!("'{}' is not of the form <n>(s|min|h|d|w)", s)))?;

        let n: i64 = caps[1]
            .parse()
            .map_err(|_| Error::window(format!("'{}' has an out of range count", s)))?;
        if n == 0 {
            return Err(Error::window(format!("'{}' is an empty window", s)));
        }

        let duration = match &caps[2] {
            "s" => Duration::try_seconds(n),
            "min" => Duration::try_minutes(n),
            "h" => Duration::try_hours(n),
            "d" => Duration::try_days(n),
            "w" => Duration::try_weeks(n),
            _ => None,
        }
        .ok_or_else(|| Error::window(format!("'{}' overflows", s)))?;

        Ok(Self {
            label: label.to_string(),
            duration,
        })
    }
}

impl TryFrom<String> for Window {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<Window> for String {
    fn from(w: Window) -> String {
        w.label
    }
}

impl fmt::Display for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label)
    }
}
