use crate::errors::UnsupportedInterval;
use std::fmt;
use std::str::FromStr;

/// Sampling interval of the requested observations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Interval {
    OneMinute,
    TwoMinutes,
    FiveMinutes,
    FifteenMinutes,
    ThirtyMinutes,
    SixtyMinutes,
    NinetyMinutes,
    OneHour,
    OneDay,
    FiveDays,
    OneWeek,
    OneMonth,
    ThreeMonths,
}

impl Interval {
    pub fn parse(value: &str) -> Result<Self, UnsupportedInterval> {
        let normalized = value.trim().to_lowercase();
        let interval = match normalized.as_str() {
            "1m" | "1min" => Self::OneMinute,
            "2m" | "2min" => Self::TwoMinutes,
            "5m" | "5min" => Self::FiveMinutes,
            "15m" | "15min" => Self::FifteenMinutes,
            "30m" | "30min" => Self::ThirtyMinutes,
            "60m" | "60min" => Self::SixtyMinutes,
            "90m" | "90min" => Self::NinetyMinutes,
            "1h" | "1hour" => Self::OneHour,
            "1d" | "1day" => Self::OneDay,
            "5d" | "5day" => Self::FiveDays,
            "1wk" | "1w" | "1week" => Self::OneWeek,
            "1mo" | "1month" => Self::OneMonth,
            "3mo" | "3month" => Self::ThreeMonths,
            _ => return Err(UnsupportedInterval(value.to_string())),
        };
        Ok(interval)
    }

    /// Interval code understood by the chart API.
    pub fn code(&self) -> &'static str {
        match self {
            Self::OneMinute => "1m",
            Self::TwoMinutes => "2m",
            Self::FiveMinutes => "5m",
            Self::FifteenMinutes => "15m",
            Self::ThirtyMinutes => "30m",
            Self::SixtyMinutes => "60m",
            Self::NinetyMinutes => "90m",
            Self::OneHour => "1h",
            Self::OneDay => "1d",
            Self::FiveDays => "5d",
            Self::OneWeek => "1wk",
            Self::OneMonth => "1mo",
            Self::ThreeMonths => "3mo",
        }
    }

    /// Nominal step; months count as 30 days.
    pub fn step_seconds(&self) -> i64 {
        match self {
            Self::OneMinute => 60,
            Self::TwoMinutes => 120,
            Self::FiveMinutes => 300,
            Self::FifteenMinutes => 900,
            Self::ThirtyMinutes => 1_800,
            Self::SixtyMinutes | Self::OneHour => 3_600,
            Self::NinetyMinutes => 5_400,
            Self::OneDay => 86_400,
            Self::FiveDays => 432_000,
            Self::OneWeek => 604_800,
            Self::OneMonth => 2_592_000,
            Self::ThreeMonths => 7_776_000,
        }
    }
}

impl Default for Interval {
    fn default() -> Self {
        Self::OneDay
    }
}

impl FromStr for Interval {
    type Err = UnsupportedInterval;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::Interval;

    #[test]
    fn parse_accepts_codes_and_aliases() {
        assert_eq!(Interval::parse("1d").unwrap(), Interval::OneDay);
        assert_eq!(Interval::parse(" 1DAY ").unwrap(), Interval::OneDay);
        assert_eq!(Interval::parse("1week").unwrap().code(), "1wk");
        assert_eq!(Interval::parse("1hour").unwrap().step_seconds(), 3_600);
    }

    #[test]
    fn parse_rejects_unknown() {
        let err = Interval::parse("7d").expect_err("unknown interval");
        assert_eq!(err.to_string(), "unsupported interval: 7d");
    }

    #[test]
    fn default_is_daily() {
        assert_eq!(Interval::default(), Interval::OneDay);
        assert_eq!(Interval::default().to_string(), "1d");
    }
}
