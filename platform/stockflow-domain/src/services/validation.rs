use crate::value_objects::price_row::{Observation, PriceRow};
use crate::value_objects::ticker::Ticker;
use chrono::NaiveDateTime;
use std::collections::HashMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscardReason {
    MissingTicker,
    MissingTimestamp,
}

impl fmt::Display for DiscardReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingTicker => f.write_str("missing ticker"),
            Self::MissingTimestamp => f.write_str("missing price_ts"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DiscardedRow {
    pub row: PriceRow,
    pub reason: DiscardReason,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RowValidation {
    Valid(Observation),
    Discarded(DiscardedRow),
}

pub fn validate_row(row: PriceRow) -> RowValidation {
    let Some(ticker) = row.ticker.as_deref().and_then(Ticker::parse) else {
        return RowValidation::Discarded(DiscardedRow {
            row,
            reason: DiscardReason::MissingTicker,
        });
    };
    let Some(price_ts) = row.price_ts else {
        return RowValidation::Discarded(DiscardedRow {
            row,
            reason: DiscardReason::MissingTimestamp,
        });
    };

    RowValidation::Valid(Observation {
        ticker,
        price_ts,
        open: row.open,
        high: row.high,
        low: row.low,
        close: row.close,
        volume: row.volume,
    })
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidatedBatch {
    pub observations: Vec<Observation>,
    pub discarded: Vec<DiscardedRow>,
    /// Valid rows folded into a later row with the same key.
    pub duplicates: usize,
}

/// Validates every row and collapses repeated keys, last occurrence wins.
pub fn validate_rows<I>(rows: I) -> ValidatedBatch
where
    I: IntoIterator<Item = PriceRow>,
{
    let mut batch = ValidatedBatch::default();
    let mut index: HashMap<(Ticker, NaiveDateTime), usize> = HashMap::new();

    for row in rows {
        match validate_row(row) {
            RowValidation::Valid(obs) => {
                let key = (obs.ticker.clone(), obs.price_ts);
                if let Some(&idx) = index.get(&key) {
                    batch.duplicates += 1;
                    batch.observations[idx] = obs;
                } else {
                    index.insert(key, batch.observations.len());
                    batch.observations.push(obs);
                }
            }
            RowValidation::Discarded(discarded) => batch.discarded.push(discarded),
        }
    }

    batch
}
