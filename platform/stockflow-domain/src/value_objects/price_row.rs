use crate::value_objects::ticker::Ticker;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Canonical row handed from the fetch step to the load step.
///
/// Key fields stay optional here: a row missing either one is discarded
/// by validation before it can reach storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceRow {
    pub ticker: Option<String>,
    pub price_ts: Option<NaiveDateTime>,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub close: Option<f64>,
    pub volume: Option<i64>,
}

impl PriceRow {
    pub fn new(ticker: impl Into<String>, price_ts: NaiveDateTime) -> Self {
        Self {
            ticker: Some(ticker.into()),
            price_ts: Some(price_ts),
            open: None,
            high: None,
            low: None,
            close: None,
            volume: None,
        }
    }

    pub fn with_prices(mut self, open: f64, high: f64, low: f64, close: f64) -> Self {
        self.open = Some(open);
        self.high = Some(high);
        self.low = Some(low);
        self.close = Some(close);
        self
    }

    pub fn with_volume(mut self, volume: i64) -> Self {
        self.volume = Some(volume);
        self
    }

    /// True when at least one of the five value fields is present.
    pub fn has_values(&self) -> bool {
        self.open.is_some()
            || self.high.is_some()
            || self.low.is_some()
            || self.close.is_some()
            || self.volume.is_some()
    }
}

/// A row whose identity fields are known to be present.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub ticker: Ticker,
    pub price_ts: NaiveDateTime,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub close: Option<f64>,
    pub volume: Option<i64>,
}

impl Observation {
    pub fn key(&self) -> (&str, NaiveDateTime) {
        (self.ticker.as_str(), self.price_ts)
    }
}

impl From<Observation> for PriceRow {
    fn from(obs: Observation) -> Self {
        Self {
            ticker: Some(obs.ticker.as_str().to_string()),
            price_ts: Some(obs.price_ts),
            open: obs.open,
            high: obs.high,
            low: obs.low,
            close: obs.close,
            volume: obs.volume,
        }
    }
}
