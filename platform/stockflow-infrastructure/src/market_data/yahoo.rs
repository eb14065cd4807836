use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, Utc};
use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use stockflow_domain::errors::ProviderError;
use stockflow_domain::repositories::price_provider::{
    FetchRequest, PriceProvider, ProviderBar, ProviderResponse, ProviderTimestamp, SymbolSeries,
};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

pub const YAHOO_CHART_BASE: &str = "https://query1.finance.yahoo.com";
const USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

/// Yahoo Finance chart API client. One request per symbol, run concurrently.
#[derive(Debug, Clone)]
pub struct YahooPriceProvider {
    client: Client,
    base_url: Url,
    max_concurrency: usize,
}

impl YahooPriceProvider {
    pub fn new(
        base_url: &str,
        timeout: Duration,
        max_concurrency: usize,
    ) -> Result<Self, ProviderError> {
        let base_url = Url::parse(base_url).map_err(|err| {
            ProviderError::Configuration(format!("invalid provider url {base_url}: {err}"))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(ProviderError::Configuration(format!(
                "provider url cannot be a base: {base_url}"
            )));
        }

        let client = Client::builder()
            .timeout(timeout)
            .pool_idle_timeout(Duration::from_secs(90))
            .user_agent(USER_AGENT)
            .build()
            .map_err(|err| {
                ProviderError::Configuration(format!("failed to build http client: {err}"))
            })?;

        Ok(Self {
            client,
            base_url,
            max_concurrency: max_concurrency.max(1),
        })
    }

    fn chart_url(&self, symbol: &str) -> Url {
        chart_url(&self.base_url, symbol)
    }
}

#[async_trait]
impl PriceProvider for YahooPriceProvider {
    async fn fetch(&self, request: &FetchRequest) -> Result<ProviderResponse, ProviderError> {
        let period1 = request.window.start.and_utc().timestamp();
        let period2 = request.window.end.and_utc().timestamp();
        let interval = request.interval.code();
        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));

        let mut tasks = JoinSet::new();
        for (idx, ticker) in request.tickers.iter().enumerate() {
            let client = self.client.clone();
            let url = self.chart_url(ticker.as_str());
            let symbol = ticker.as_str().to_string();
            let semaphore = semaphore.clone();
            tasks.spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|err| ProviderError::Task(err.to_string()))?;
                let series = fetch_symbol(&client, url, &symbol, period1, period2, interval).await?;
                Ok::<_, ProviderError>((idx, symbol, series))
            });
        }

        // Dropping the set on the first error aborts the remaining requests.
        let mut fetched = Vec::with_capacity(request.tickers.len());
        while let Some(joined) = tasks.join_next().await {
            let outcome = joined.map_err(|err| ProviderError::Task(err.to_string()))?;
            fetched.push(outcome?);
        }
        fetched.sort_by_key(|(idx, _, _)| *idx);

        if request.tickers.len() == 1 {
            if let Some((_, _, series)) = fetched.pop() {
                return Ok(ProviderResponse::Single(series));
            }
        }
        Ok(ProviderResponse::PerSymbol(
            fetched
                .into_iter()
                .map(|(_, symbol, series)| (symbol, series))
                .collect(),
        ))
    }
}

async fn fetch_symbol(
    client: &Client,
    url: Url,
    symbol: &str,
    period1: i64,
    period2: i64,
    interval: &str,
) -> Result<SymbolSeries, ProviderError> {
    let start = Instant::now();
    let response = client
        .get(url)
        .query(&[
            ("period1", period1.to_string()),
            ("period2", period2.to_string()),
            ("interval", interval.to_string()),
            ("includePrePost", "false".to_string()),
            ("events", "div,splits".to_string()),
        ])
        .send()
        .await
        .map_err(|err| request_error(symbol, err))?;

    let status = response.status();
    if status == StatusCode::TOO_MANY_REQUESTS {
        record_request("rate_limited", start);
        return Err(ProviderError::RateLimited {
            symbol: symbol.to_string(),
        });
    }

    let body = response
        .text()
        .await
        .map_err(|err| request_error(symbol, err))?;

    if status == StatusCode::NOT_FOUND && is_unknown_symbol(&body) {
        record_request("unknown_symbol", start);
        tracing::warn!(symbol, "provider does not know symbol, skipping");
        return Ok(SymbolSeries::default());
    }
    if !status.is_success() {
        record_request("err", start);
        return Err(ProviderError::Status {
            symbol: symbol.to_string(),
            status: status.as_u16(),
        });
    }

    let series = match parse_chart_payload(symbol, &body) {
        Ok(series) => series,
        Err(err) => {
            record_request("err", start);
            return Err(err);
        }
    };
    record_request("ok", start);
    tracing::debug!(symbol, bars = series.bars.len(), "fetched chart");
    Ok(series)
}

fn record_request(result: &'static str, start: Instant) {
    metrics::counter!("stockflow.provider.requests_total", "result" => result).increment(1);
    metrics::histogram!("stockflow.provider.request_ms")
        .record(start.elapsed().as_secs_f64() * 1000.0);
}

fn request_error(symbol: &str, err: reqwest::Error) -> ProviderError {
    if err.is_timeout() {
        ProviderError::Timeout(format!("{symbol}: {err}"))
    } else {
        ProviderError::Request(format!("{symbol}: {err}"))
    }
}

fn chart_url(base_url: &Url, symbol: &str) -> Url {
    let mut url = base_url.clone();
    if let Ok(mut segments) = url.path_segments_mut() {
        segments
            .pop_if_empty()
            .extend(["v8", "finance", "chart", symbol]);
    }
    url
}

#[derive(Debug, Deserialize)]
struct ChartEnvelope {
    chart: ChartBody,
}

#[derive(Debug, Deserialize)]
struct ChartBody {
    #[serde(default)]
    result: Option<Vec<ChartResult>>,
    #[serde(default)]
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    code: String,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    #[serde(default)]
    meta: ChartMeta,
    #[serde(default)]
    timestamp: Option<Vec<i64>>,
    #[serde(default)]
    indicators: Indicators,
}

#[derive(Debug, Default, Deserialize)]
struct ChartMeta {
    #[serde(default)]
    gmtoffset: Option<i32>,
}

#[derive(Debug, Default, Deserialize)]
struct Indicators {
    #[serde(default)]
    quote: Vec<QuoteColumns>,
}

#[derive(Debug, Default, Deserialize)]
struct QuoteColumns {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<f64>>,
}

fn is_unknown_symbol(body: &str) -> bool {
    serde_json::from_str::<ChartEnvelope>(body)
        .ok()
        .and_then(|envelope| envelope.chart.error)
        .is_some_and(|error| error.code.eq_ignore_ascii_case("not found"))
}

/// Maps one chart payload into bars stamped in the exchange's UTC offset.
fn parse_chart_payload(symbol: &str, body: &str) -> Result<SymbolSeries, ProviderError> {
    let malformed = |reason: String| ProviderError::Malformed {
        symbol: symbol.to_string(),
        reason,
    };

    let envelope: ChartEnvelope =
        serde_json::from_str(body).map_err(|err| malformed(err.to_string()))?;
    if let Some(error) = envelope.chart.error {
        return Err(ProviderError::Api {
            symbol: symbol.to_string(),
            code: error.code,
            description: error.description.unwrap_or_default(),
        });
    }

    let result = envelope
        .chart
        .result
        .and_then(|results| results.into_iter().next())
        .ok_or_else(|| malformed("chart result is empty".to_string()))?;

    let Some(timestamps) = result.timestamp else {
        return Ok(SymbolSeries::default());
    };

    let gmtoffset = result.meta.gmtoffset.unwrap_or(0);
    let offset = FixedOffset::east_opt(gmtoffset)
        .ok_or_else(|| malformed(format!("invalid gmtoffset {gmtoffset}")))?;
    let quote = result.indicators.quote.into_iter().next().unwrap_or_default();

    let mut bars = Vec::with_capacity(timestamps.len());
    for (idx, epoch) in timestamps.iter().copied().enumerate() {
        let utc = DateTime::<Utc>::from_timestamp(epoch, 0)
            .ok_or_else(|| malformed(format!("invalid epoch {epoch}")))?;
        bars.push(ProviderBar {
            timestamp: Some(ProviderTimestamp::Zoned(utc.with_timezone(&offset))),
            open: column(&quote.open, idx),
            high: column(&quote.high, idx),
            low: column(&quote.low, idx),
            close: column(&quote.close, idx),
            volume: column(&quote.volume, idx).map(|v| v as i64),
        });
    }

    Ok(SymbolSeries::new(bars))
}

fn column(values: &[Option<f64>], idx: usize) -> Option<f64> {
    values
        .get(idx)
        .copied()
        .flatten()
        .filter(|v| v.is_finite())
}
