use crate::value_objects::window::{Window, WindowInput};
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};
use serde::Serialize;

/// Days between "now" and the default window end. Keeps still-open periods out.
pub const DEFAULT_END_LAG_DAYS: i64 = 1;
/// Default lookback; overlaps previous runs so a missed fetch heals itself.
pub const DEFAULT_LOOKBACK_DAYS: i64 = 7;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum WindowSource {
    Explicit,
    Default,
    Fallback { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowResolution {
    pub window: Window,
    pub source: WindowSource,
}

pub fn default_window(now: DateTime<Utc>) -> Window {
    let end = now.naive_utc() - Duration::days(DEFAULT_END_LAG_DAYS);
    let start = end - Duration::days(DEFAULT_LOOKBACK_DAYS);
    Window::new(start, end)
}

/// Picks the window for a run. An explicit input wins only when both bounds are
/// present and parse; anything else degrades to [`default_window`].
pub fn resolve_window(input: Option<&WindowInput>, now: DateTime<Utc>) -> WindowResolution {
    let Some(input) = input.filter(|input| !input.is_empty()) else {
        return WindowResolution {
            window: default_window(now),
            source: WindowSource::Default,
        };
    };

    match parse_window_input(input) {
        Ok(window) => WindowResolution {
            window,
            source: WindowSource::Explicit,
        },
        Err(reason) => WindowResolution {
            window: default_window(now),
            source: WindowSource::Fallback { reason },
        },
    }
}

fn parse_window_input(input: &WindowInput) -> Result<Window, String> {
    let start = input
        .start
        .as_deref()
        .ok_or_else(|| "window start is missing".to_string())?;
    let end = input
        .end
        .as_deref()
        .ok_or_else(|| "window end is missing".to_string())?;
    Ok(Window::new(parse_window_bound(start)?, parse_window_bound(end)?))
}

/// Parses one bound. Offsets are converted to UTC and dropped.
pub fn parse_window_bound(value: &str) -> Result<NaiveDateTime, String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err("empty timestamp".to_string());
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(dt.naive_utc());
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Ok(dt);
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        if let Some(dt) = date.and_hms_opt(0, 0, 0) {
            return Ok(dt);
        }
    }
    Err(format!("unsupported timestamp format: {value}"))
}
