use std::collections::HashSet;
use std::fmt;

/// A trimmed, non-empty ticker symbol.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Ticker(String);

impl Ticker {
    pub fn parse(value: &str) -> Option<Self> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return None;
        }
        Some(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Ticker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Ticker {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Splits a comma separated symbol list, dropping blanks and repeated symbols.
/// First-seen order is kept.
pub fn parse_ticker_list(raw: &str) -> Vec<Ticker> {
    let mut seen = HashSet::new();
    raw.split(',')
        .filter_map(Ticker::parse)
        .filter(|ticker| seen.insert(ticker.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{parse_ticker_list, Ticker};

    #[test]
    fn parse_trims_and_rejects_blank() {
        assert_eq!(Ticker::parse("  AAPL ").unwrap().as_str(), "AAPL");
        assert!(Ticker::parse("").is_none());
        assert!(Ticker::parse("   ").is_none());
    }

    #[test]
    fn ticker_list_drops_blanks_and_duplicates_in_order() {
        let tickers = parse_ticker_list("MSFT, AAPL,, MSFT ,BRK-B");
        let names: Vec<&str> = tickers.iter().map(Ticker::as_str).collect();
        assert_eq!(names, vec!["MSFT", "AAPL", "BRK-B"]);
    }

    #[test]
    fn ticker_list_of_only_separators_is_empty() {
        assert!(parse_ticker_list(" , ,").is_empty());
        assert!(parse_ticker_list("").is_empty());
    }
}
