use async_trait::async_trait;
use chrono::NaiveDateTime;
use std::future::Future;
use std::time::{Duration, Instant};
use stockflow_domain::errors::StoreError;
use stockflow_domain::repositories::price_store::PriceStore;
use stockflow_domain::value_objects::price_row::Observation;
use stockflow_domain::value_objects::ticker::Ticker;
use tokio_postgres::types::ToSql;
use tokio_postgres::{Client as PgClient, NoTls, Row};
use tracing::Instrument;

const COLUMNS_PER_ROW: usize = 7;
const MAX_BIND_PARAMS: usize = 65_535;
const MAX_BATCH_SIZE: usize = MAX_BIND_PARAMS / COLUMNS_PER_ROW;

/// PostgreSQL-backed price table keyed on `(ticker, price_ts)`.
///
/// Each operation opens its own connection; the store holds no open session.
#[derive(Debug, Clone)]
pub struct PostgresPriceStore {
    config: tokio_postgres::Config,
    table: String,
    batch_size: usize,
    timeout: Duration,
}

impl PostgresPriceStore {
    pub fn new(
        connection: &str,
        table: &str,
        batch_size: usize,
        timeout: Duration,
    ) -> Result<Self, StoreError> {
        validate_table_name(table)?;
        let mut config: tokio_postgres::Config = connection
            .parse()
            .map_err(|err| StoreError::Configuration(format!("invalid postgres db url: {err}")))?;
        config.connect_timeout(timeout);

        Ok(Self {
            config,
            table: table.to_string(),
            batch_size: batch_size.clamp(1, MAX_BATCH_SIZE),
            timeout,
        })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    async fn connect(&self) -> Result<PgClient, StoreError> {
        let (client, connection) = self
            .config
            .connect(NoTls)
            .await
            .map_err(|err| StoreError::Connect(err.to_string()))?;
        tokio::spawn(async move {
            if let Err(err) = connection.await {
                tracing::error!(error = %err, "postgres connection error");
            }
        });
        Ok(client)
    }

    async fn bounded<T, F>(&self, operation: &'static str, fut: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout {
                operation,
                secs: self.timeout.as_secs(),
            }),
        }
    }

    async fn write_batches(&self, observations: &[Observation]) -> Result<u64, StoreError> {
        let mut client = self.connect().await?;
        let transaction = client
            .transaction()
            .await
            .map_err(|err| StoreError::Transaction(format!("failed to start transaction: {err}")))?;

        let mut written = 0u64;
        for chunk in observations.chunks(self.batch_size) {
            let statement = upsert_statement(&self.table, chunk.len());
            let tickers: Vec<&str> = chunk.iter().map(|obs| obs.ticker.as_str()).collect();
            let mut params: Vec<&(dyn ToSql + Sync)> =
                Vec::with_capacity(chunk.len() * COLUMNS_PER_ROW);
            for (obs, ticker) in chunk.iter().zip(tickers.iter()) {
                params.push(ticker);
                params.push(&obs.price_ts);
                params.push(&obs.open);
                params.push(&obs.high);
                params.push(&obs.low);
                params.push(&obs.close);
                params.push(&obs.volume);
            }
            written += transaction
                .execute(statement.as_str(), &params)
                .await
                .map_err(|err| StoreError::Query(format!("failed to upsert rows: {err}")))?;
        }

        transaction
            .commit()
            .await
            .map_err(|err| StoreError::Transaction(format!("failed to commit: {err}")))?;
        Ok(written)
    }
}

#[async_trait]
impl PriceStore for PostgresPriceStore {
    async fn ensure_schema(&self) -> Result<(), StoreError> {
        let sql = create_table_statement(&self.table);
        self.bounded("ensure_schema", async {
            let client = self.connect().await?;
            client
                .batch_execute(&sql)
                .await
                .map_err(|err| StoreError::Query(format!("failed to create table: {err}")))
        })
        .await?;
        tracing::debug!(table = %self.table, "ensured price table");
        Ok(())
    }

    async fn upsert(&self, observations: &[Observation]) -> Result<u64, StoreError> {
        if observations.is_empty() {
            return Ok(0);
        }
        let span = tracing::info_span!(
            "postgres.upsert",
            table = %self.table,
            rows = observations.len(),
            batch_size = self.batch_size
        );
        let start = Instant::now();
        let written = self
            .bounded("upsert", self.write_batches(observations))
            .instrument(span)
            .await?;
        metrics::counter!("stockflow.postgres.rows_upserted_total").increment(written);
        metrics::histogram!("stockflow.postgres.upsert_ms")
            .record(start.elapsed().as_secs_f64() * 1000.0);
        Ok(written)
    }

    async fn count_rows(&self) -> Result<u64, StoreError> {
        let sql = format!("SELECT COUNT(*) FROM {}", self.table);
        let count: i64 = self
            .bounded("count_rows", async {
                let client = self.connect().await?;
                let row = client
                    .query_one(sql.as_str(), &[])
                    .await
                    .map_err(|err| StoreError::Query(format!("failed to count rows: {err}")))?;
                row.try_get(0)
                    .map_err(|err| StoreError::Query(format!("failed to read count: {err}")))
            })
            .await?;
        Ok(count.max(0) as u64)
    }

    async fn fetch_rows(&self, ticker: &Ticker) -> Result<Vec<Observation>, StoreError> {
        let sql = format!(
            "SELECT ticker, price_ts, open::FLOAT8, high::FLOAT8, low::FLOAT8, close::FLOAT8, volume
             FROM {}
             WHERE ticker = $1
             ORDER BY price_ts",
            self.table
        );
        let rows = self
            .bounded("fetch_rows", async {
                let client = self.connect().await?;
                client
                    .query(sql.as_str(), &[&ticker.as_str()])
                    .await
                    .map_err(|err| StoreError::Query(format!("failed to fetch rows: {err}")))
            })
            .await?;
        rows.iter().map(observation_from_row).collect()
    }
}

fn observation_from_row(row: &Row) -> Result<Observation, StoreError> {
    let read = |err: tokio_postgres::Error| StoreError::Query(format!("failed to decode row: {err}"));
    let raw_ticker: String = row.try_get(0).map_err(read)?;
    let ticker = Ticker::parse(&raw_ticker)
        .ok_or_else(|| StoreError::Query("stored row has an empty ticker".to_string()))?;
    let price_ts: NaiveDateTime = row.try_get(1).map_err(read)?;
    Ok(Observation {
        ticker,
        price_ts,
        open: row.try_get(2).map_err(read)?,
        high: row.try_get(3).map_err(read)?,
        low: row.try_get(4).map_err(read)?,
        close: row.try_get(5).map_err(read)?,
        volume: row.try_get(6).map_err(read)?,
    })
}

fn create_table_statement(table: &str) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {table} (
            ticker TEXT NOT NULL,
            price_ts TIMESTAMP WITHOUT TIME ZONE NOT NULL,
            open NUMERIC,
            high NUMERIC,
            low NUMERIC,
            close NUMERIC,
            volume BIGINT,
            PRIMARY KEY (ticker, price_ts)
        )"
    )
}

fn upsert_statement(table: &str, rows: usize) -> String {
    let mut values = Vec::with_capacity(rows);
    for row in 0..rows {
        let base = row * COLUMNS_PER_ROW;
        values.push(format!(
            "(${}, ${}, ${}::FLOAT8, ${}::FLOAT8, ${}::FLOAT8, ${}::FLOAT8, ${})",
            base + 1,
            base + 2,
            base + 3,
            base + 4,
            base + 5,
            base + 6,
            base + 7
        ));
    }
    format!(
        "INSERT INTO {table} (ticker, price_ts, open, high, low, close, volume)
         VALUES {}
         ON CONFLICT (ticker, price_ts) DO UPDATE SET
            open = EXCLUDED.open,
            high = EXCLUDED.high,
            low = EXCLUDED.low,
            close = EXCLUDED.close,
            volume = EXCLUDED.volume",
        values.join(", ")
    )
}

fn validate_table_name(table: &str) -> Result<(), StoreError> {
    let invalid = || StoreError::InvalidTable(table.to_string());
    if table.is_empty() {
        return Err(invalid());
    }
    let parts: Vec<&str> = table.split('.').collect();
    if parts.len() > 2 {
        return Err(invalid());
    }
    for part in parts {
        let mut chars = part.chars();
        let first = chars.next().ok_or_else(invalid)?;
        if !(first.is_ascii_alphabetic() || first == '_') {
            return Err(invalid());
        }
        if !chars.all(|ch| ch.is_ascii_alphanumeric() || ch == '_') {
            return Err(invalid());
        }
    }
    Ok(())
}
