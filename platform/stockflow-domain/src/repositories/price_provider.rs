use crate::errors::ProviderError;
use crate::value_objects::interval::Interval;
use crate::value_objects::ticker::Ticker;
use crate::value_objects::window::Window;
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDateTime};

/// Timestamp as reported by a provider: either offset-aware or already naive UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderTimestamp {
    Zoned(DateTime<FixedOffset>),
    Naive(NaiveDateTime),
}

impl ProviderTimestamp {
    pub fn to_utc_naive(self) -> NaiveDateTime {
        match self {
            Self::Zoned(dt) => dt.naive_utc(),
            Self::Naive(dt) => dt,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProviderBar {
    pub timestamp: Option<ProviderTimestamp>,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub close: Option<f64>,
    pub volume: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SymbolSeries {
    pub bars: Vec<ProviderBar>,
}

impl SymbolSeries {
    pub fn new(bars: Vec<ProviderBar>) -> Self {
        Self { bars }
    }
}

/// Shape of a provider answer. A single-symbol request may come back as a bare
/// table with no symbol attached to it.
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderResponse {
    Single(SymbolSeries),
    PerSymbol(Vec<(String, SymbolSeries)>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct FetchRequest {
    pub tickers: Vec<Ticker>,
    pub window: Window,
    pub interval: Interval,
}

#[async_trait]
pub trait PriceProvider: Send + Sync {
    async fn fetch(&self, request: &FetchRequest) -> Result<ProviderResponse, ProviderError>;
}
