use crate::repositories::price_provider::{ProviderBar, ProviderResponse, SymbolSeries};
use crate::value_objects::price_row::PriceRow;
use crate::value_objects::ticker::Ticker;
use crate::value_objects::window::Window;
use chrono::NaiveDateTime;
use std::collections::HashMap;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizedRows {
    pub rows: Vec<PriceRow>,
    /// Bars where every value field was missing.
    pub dropped_empty: usize,
    /// Bars that repeated an earlier `(ticker, price_ts)` and replaced it.
    pub duplicates: usize,
    /// Rows stamped outside the requested window, see [`NormalizedRows::retain_window`].
    pub out_of_window: usize,
}

impl NormalizedRows {
    /// Keeps only rows inside the half-open `window`. Rows without a timestamp
    /// are left for validation to discard.
    pub fn retain_window(&mut self, window: &Window) {
        let before = self.rows.len();
        self.rows
            .retain(|row| row.price_ts.map_or(true, |ts| window.contains(ts)));
        self.out_of_window += before - self.rows.len();
    }
}

/// Flattens a provider answer into canonical rows.
///
/// `Single` tables belong to the first requested ticker. Timestamps are brought
/// to naive UTC, empty bars are dropped and repeated keys keep the last bar at the
/// position of the first one.
pub fn normalize_response(response: ProviderResponse, tickers: &[Ticker]) -> NormalizedRows {
    let series: Vec<(Option<String>, SymbolSeries)> = match response {
        ProviderResponse::Single(series) => {
            vec![(tickers.first().map(|t| t.as_str().to_string()), series)]
        }
        ProviderResponse::PerSymbol(per_symbol) => per_symbol
            .into_iter()
            .map(|(symbol, series)| (Ticker::parse(&symbol).map(|t| t.as_str().to_string()), series))
            .collect(),
    };

    let mut out = NormalizedRows::default();
    let mut seen: HashMap<(String, NaiveDateTime), usize> = HashMap::new();

    for (ticker, series) in series {
        for bar in series.bars {
            let row = bar_to_row(ticker.clone(), bar);
            if !row.has_values() {
                out.dropped_empty += 1;
                continue;
            }

            let key = match (&row.ticker, row.price_ts) {
                (Some(ticker), Some(ts)) => (ticker.clone(), ts),
                _ => {
                    out.rows.push(row);
                    continue;
                }
            };
            match seen.get(&key) {
                Some(&idx) => {
                    out.duplicates += 1;
                    out.rows[idx] = row;
                }
                None => {
                    seen.insert(key, out.rows.len());
                    out.rows.push(row);
                }
            }
        }
    }

    out
}

fn bar_to_row(ticker: Option<String>, bar: ProviderBar) -> PriceRow {
    PriceRow {
        ticker,
        price_ts: bar.timestamp.map(|ts| ts.to_utc_naive()),
        open: finite(bar.open),
        high: finite(bar.high),
        low: finite(bar.low),
        close: finite(bar.close),
        volume: bar.volume,
    }
}

fn finite(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite())
}

#[cfg(test)]
mod tests {
    use super::normalize_response;
    use crate::repositories::price_provider::{
        ProviderBar, ProviderResponse, ProviderTimestamp, SymbolSeries,
    };
    use crate::value_objects::ticker::{parse_ticker_list, Ticker};
    use crate::value_objects::window::Window;
    use chrono::{DateTime, NaiveDate, NaiveDateTime};

    fn naive(d: u32, h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, d)
            .and_then(|date| date.and_hms_opt(h, 30, 0))
            .expect("valid timestamp")
    }

    fn bar(ts: ProviderTimestamp, close: Option<f64>, volume: Option<i64>) -> ProviderBar {
        ProviderBar {
            timestamp: Some(ts),
            open: close,
            high: close,
            low: close,
            close,
            volume,
        }
    }

    fn tickers(raw: &str) -> Vec<Ticker> {
        parse_ticker_list(raw)
    }

    #[test]
    fn offset_and_naive_timestamps_land_identically() {
        let utc = DateTime::parse_from_rfc3339("2024-01-02T14:30:00+00:00").unwrap();
        let eastern = DateTime::parse_from_rfc3339("2024-01-02T09:30:00-05:00").unwrap();
        let response = ProviderResponse::PerSymbol(vec![
            (
                "A".to_string(),
                SymbolSeries::new(vec![bar(ProviderTimestamp::Zoned(utc), Some(1.0), None)]),
            ),
            (
                "B".to_string(),
                SymbolSeries::new(vec![bar(ProviderTimestamp::Naive(naive(2, 14)), Some(1.0), None)]),
            ),
            (
                "C".to_string(),
                SymbolSeries::new(vec![bar(ProviderTimestamp::Zoned(eastern), Some(1.0), None)]),
            ),
        ]);

        let out = normalize_response(response, &tickers("A,B,C"));
        assert_eq!(out.rows.len(), 3);
        assert!(out.rows.iter().all(|row| row.price_ts == Some(naive(2, 14))));
    }

    #[test]
    fn all_missing_bars_are_dropped_partial_bars_kept() {
        let series = SymbolSeries::new(vec![
            bar(ProviderTimestamp::Naive(naive(1, 14)), None, None),
            bar(ProviderTimestamp::Naive(naive(2, 14)), Some(10.0), None),
            bar(ProviderTimestamp::Naive(naive(3, 14)), None, Some(100)),
        ]);

        let out = normalize_response(ProviderResponse::Single(series), &tickers("AAPL"));
        assert_eq!(out.dropped_empty, 1);
        assert_eq!(out.rows.len(), 2);
        assert_eq!(out.rows[0].close, Some(10.0));
        assert_eq!(out.rows[0].volume, None);
        assert_eq!(out.rows[1].close, None);
        assert_eq!(out.rows[1].volume, Some(100));
    }

    #[test]
    fn non_finite_values_count_as_missing() {
        let series = SymbolSeries::new(vec![bar(
            ProviderTimestamp::Naive(naive(1, 14)),
            Some(f64::NAN),
            None,
        )]);
        let out = normalize_response(ProviderResponse::Single(series), &tickers("AAPL"));
        assert!(out.rows.is_empty());
        assert_eq!(out.dropped_empty, 1);
    }

    #[test]
    fn single_table_takes_first_requested_ticker() {
        let series = SymbolSeries::new(vec![bar(
            ProviderTimestamp::Naive(naive(1, 14)),
            Some(1.0),
            Some(1),
        )]);
        let out = normalize_response(ProviderResponse::Single(series), &tickers("AAPL"));
        assert_eq!(out.rows[0].ticker.as_deref(), Some("AAPL"));
    }

    #[test]
    fn single_and_per_symbol_shapes_normalize_to_the_same_rows() {
        let bars = vec![
            bar(ProviderTimestamp::Naive(naive(1, 14)), Some(1.0), Some(1)),
            bar(ProviderTimestamp::Naive(naive(2, 14)), Some(2.0), Some(2)),
        ];
        let single = normalize_response(
            ProviderResponse::Single(SymbolSeries::new(bars.clone())),
            &tickers("AAPL"),
        );
        let per_symbol = normalize_response(
            ProviderResponse::PerSymbol(vec![("AAPL".to_string(), SymbolSeries::new(bars))]),
            &tickers("AAPL"),
        );
        assert_eq!(single, per_symbol);
    }

    #[test]
    fn repeated_keys_keep_last_bar() {
        let series = SymbolSeries::new(vec![
            bar(ProviderTimestamp::Naive(naive(1, 14)), Some(1.0), None),
            bar(ProviderTimestamp::Naive(naive(2, 14)), Some(2.0), None),
            bar(ProviderTimestamp::Naive(naive(1, 14)), Some(3.0), None),
        ]);
        let out = normalize_response(ProviderResponse::Single(series), &tickers("AAPL"));
        assert_eq!(out.duplicates, 1);
        assert_eq!(out.rows.len(), 2);
        assert_eq!(out.rows[0].price_ts, Some(naive(1, 14)));
        assert_eq!(out.rows[0].close, Some(3.0));
    }

    #[test]
    fn bars_without_timestamp_pass_through_for_validation() {
        let series = SymbolSeries::new(vec![ProviderBar {
            timestamp: None,
            open: Some(1.0),
            high: None,
            low: None,
            close: None,
            volume: None,
        }]);
        let out = normalize_response(ProviderResponse::Single(series), &tickers("AAPL"));
        assert_eq!(out.rows.len(), 1);
        assert_eq!(out.rows[0].price_ts, None);
    }

    #[test]
    fn retain_window_drops_bars_at_or_past_end_and_before_start() {
        let series = SymbolSeries::new(vec![
            bar(ProviderTimestamp::Naive(naive(1, 0)), Some(1.0), None),
            bar(ProviderTimestamp::Naive(naive(2, 14)), Some(2.0), None),
            bar(ProviderTimestamp::Naive(naive(3, 14)), Some(3.0), None),
            bar(ProviderTimestamp::Naive(naive(9, 14)), Some(4.0), None),
        ]);
        let mut out = normalize_response(ProviderResponse::Single(series), &tickers("AAPL"));
        let window = Window::new(naive(2, 0), naive(3, 14));

        out.retain_window(&window);

        assert_eq!(out.out_of_window, 3);
        assert_eq!(out.rows.len(), 1);
        assert_eq!(out.rows[0].price_ts, Some(naive(2, 14)));
    }

    #[test]
    fn retain_window_keeps_rows_without_timestamp() {
        let series = SymbolSeries::new(vec![ProviderBar {
            timestamp: None,
            open: Some(1.0),
            high: None,
            low: None,
            close: None,
            volume: None,
        }]);
        let mut out = normalize_response(ProviderResponse::Single(series), &tickers("AAPL"));
        out.retain_window(&Window::new(naive(1, 0), naive(2, 0)));
        assert_eq!(out.rows.len(), 1);
        assert_eq!(out.out_of_window, 0);
    }
}
