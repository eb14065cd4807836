use crate::errors::StoreError;
use crate::value_objects::price_row::Observation;
use crate::value_objects::ticker::Ticker;
use async_trait::async_trait;

#[async_trait]
pub trait PriceStore: Send + Sync {
    /// Creates the destination table when absent. Must not touch existing rows.
    async fn ensure_schema(&self) -> Result<(), StoreError>;

    /// Inserts or overwrites every row keyed on `(ticker, price_ts)`, all or nothing.
    /// Returns the number of rows written.
    async fn upsert(&self, observations: &[Observation]) -> Result<u64, StoreError>;

    async fn count_rows(&self) -> Result<u64, StoreError>;

    async fn fetch_rows(&self, ticker: &Ticker) -> Result<Vec<Observation>, StoreError>;
}
