use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Half-open `[start, end)` fetch range, naive UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Window {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl Window {
    pub fn new(start: NaiveDateTime, end: NaiveDateTime) -> Self {
        Self { start, end }
    }

    pub fn is_ordered(&self) -> bool {
        self.start < self.end
    }

    pub fn contains(&self, ts: NaiveDateTime) -> bool {
        self.start <= ts && ts < self.end
    }
}

/// Externally supplied window bounds, not yet parsed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct WindowInput {
    pub start: Option<String>,
    pub end: Option<String>,
}

impl WindowInput {
    pub fn new(start: impl Into<String>, end: impl Into<String>) -> Self {
        Self {
            start: Some(start.into()),
            end: Some(end.into()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }
}
