//! The three orchestrator-callable steps and the sequenced run built on them.

mod errors;
mod retry;

pub use errors::{
    ExtractError, LoadError, PipelineError, PipelineStep, SchemaError, StepError,
};
pub use retry::{retry_step, Attempted, RetryPolicy};

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Serialize;
use std::time::Instant;
use stockflow_domain::repositories::price_provider::{FetchRequest, PriceProvider};
use stockflow_domain::repositories::price_store::PriceStore;
use stockflow_domain::services::normalize::normalize_response;
use stockflow_domain::services::validation::validate_rows;
use stockflow_domain::services::window::{resolve_window, WindowSource};
use stockflow_domain::value_objects::interval::Interval;
use stockflow_domain::value_objects::price_row::PriceRow;
use stockflow_domain::value_objects::ticker::Ticker;
use stockflow_domain::value_objects::window::{Window, WindowInput};
use tracing::Instrument;

pub async fn ensure_schema<S>(store: &S) -> Result<(), SchemaError>
where
    S: PriceStore + ?Sized,
{
    let start = Instant::now();
    store.ensure_schema().await?;
    metrics::histogram!("stockflow.pipeline.ensure_schema_ms")
        .record(start.elapsed().as_secs_f64() * 1000.0);
    tracing::debug!("schema present");
    Ok(())
}

/// Fetches and normalizes rows for `tickers` inside `window`.
///
/// No tickers means no provider call. An inverted window is refused before the
/// provider is contacted. Bars stamped outside `[start, end)` are dropped.
pub async fn extract<P>(
    provider: &P,
    tickers: &[Ticker],
    window: &Window,
    interval: Interval,
) -> Result<Vec<PriceRow>, ExtractError>
where
    P: PriceProvider + ?Sized,
{
    if tickers.is_empty() {
        tracing::info!("no tickers configured, skipping fetch");
        return Ok(Vec::new());
    }
    if !window.is_ordered() {
        return Err(ExtractError::InvalidWindow {
            start: window.start,
            end: window.end,
        });
    }

    let start = Instant::now();
    let request = FetchRequest {
        tickers: tickers.to_vec(),
        window: *window,
        interval,
    };
    let response = match provider.fetch(&request).await {
        Ok(response) => response,
        Err(err) => {
            metrics::counter!("stockflow.extract.calls_total", "result" => "err").increment(1);
            return Err(err.into());
        }
    };

    let mut normalized = normalize_response(response, tickers);
    normalized.retain_window(window);
    metrics::counter!("stockflow.extract.calls_total", "result" => "ok").increment(1);
    metrics::counter!("stockflow.extract.rows_total").increment(normalized.rows.len() as u64);
    metrics::counter!("stockflow.extract.empty_bars_total")
        .increment(normalized.dropped_empty as u64);
    metrics::counter!("stockflow.extract.out_of_window_total")
        .increment(normalized.out_of_window as u64);
    metrics::histogram!("stockflow.extract_ms").record(start.elapsed().as_secs_f64() * 1000.0);

    tracing::info!(
        rows = normalized.rows.len(),
        dropped_empty = normalized.dropped_empty,
        duplicates = normalized.duplicates,
        out_of_window = normalized.out_of_window,
        "fetched rows"
    );
    Ok(normalized.rows)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LoadOutcome {
    pub written: u64,
    pub discarded: usize,
    pub duplicates: usize,
}

/// Validates `rows` and upserts the survivors in one call to the store.
/// Returns the number of rows written.
pub async fn load<S>(store: &S, rows: &[PriceRow]) -> Result<u64, LoadError>
where
    S: PriceStore + ?Sized,
{
    load_rows(store, rows).await.map(|outcome| outcome.written)
}

pub async fn load_rows<S>(store: &S, rows: &[PriceRow]) -> Result<LoadOutcome, LoadError>
where
    S: PriceStore + ?Sized,
{
    if rows.is_empty() {
        tracing::warn!("no rows to upsert, skipping load");
        return Ok(LoadOutcome::default());
    }

    let batch = validate_rows(rows.iter().cloned());
    for discarded in &batch.discarded {
        tracing::warn!(
            ticker = ?discarded.row.ticker,
            price_ts = ?discarded.row.price_ts,
            reason = %discarded.reason,
            "skipping invalid row"
        );
    }
    metrics::counter!("stockflow.load.discarded_total").increment(batch.discarded.len() as u64);

    let mut outcome = LoadOutcome {
        written: 0,
        discarded: batch.discarded.len(),
        duplicates: batch.duplicates,
    };
    if batch.observations.is_empty() {
        tracing::warn!(discarded = outcome.discarded, "every row was invalid, skipping load");
        return Ok(outcome);
    }

    let start = Instant::now();
    outcome.written = store
        .upsert(&batch.observations)
        .await
        .map_err(|source| LoadError {
            attempted: batch.observations.len(),
            source,
        })?;

    metrics::counter!("stockflow.load.rows_written_total").increment(outcome.written);
    metrics::histogram!("stockflow.load_ms").record(start.elapsed().as_secs_f64() * 1000.0);
    tracing::info!(
        written = outcome.written,
        discarded = outcome.discarded,
        duplicates = outcome.duplicates,
        "upserted rows"
    );
    Ok(outcome)
}

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineRequest {
    pub tickers: Vec<Ticker>,
    pub window: Option<WindowInput>,
    pub interval: Interval,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StepAttempts {
    pub ensure_schema: u32,
    pub extract: u32,
    pub load: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    pub window_start: NaiveDateTime,
    pub window_end: NaiveDateTime,
    pub window_source: WindowSource,
    pub tickers: Vec<String>,
    pub interval: String,
    pub rows_fetched: usize,
    pub rows_discarded: usize,
    pub rows_duplicate: usize,
    pub rows_written: u64,
    pub attempts: StepAttempts,
}

/// Runs schema init, extract and load in order, retrying each step per `policy`.
pub async fn run_pipeline<P, S>(
    provider: &P,
    store: &S,
    request: &PipelineRequest,
    now: DateTime<Utc>,
    policy: RetryPolicy,
) -> Result<RunReport, PipelineError>
where
    P: PriceProvider + ?Sized,
    S: PriceStore + ?Sized,
{
    let span = tracing::info_span!("pipeline.run", interval = %request.interval);
    run_steps(provider, store, request, now, policy)
        .instrument(span)
        .await
}

async fn run_steps<P, S>(
    provider: &P,
    store: &S,
    request: &PipelineRequest,
    now: DateTime<Utc>,
    policy: RetryPolicy,
) -> Result<RunReport, PipelineError>
where
    P: PriceProvider + ?Sized,
    S: PriceStore + ?Sized,
{
    let resolution = resolve_window(request.window.as_ref(), now);
    if let WindowSource::Fallback { reason } = &resolution.source {
        tracing::warn!(%reason, "explicit window rejected, using default lookback");
    }
    let window = resolution.window;
    tracing::info!(
        start = %window.start,
        end = %window.end,
        tickers = request.tickers.len(),
        "resolved window"
    );

    let mut attempts = StepAttempts::default();

    let schema = retry_step("ensure_schema", policy, SchemaError::is_retryable, || {
        ensure_schema(store)
    })
    .await;
    attempts.ensure_schema = schema.attempts;
    if let Err(err) = schema.result {
        return Err(failed(PipelineStep::EnsureSchema, schema.attempts, 0, 0, err.into()));
    }

    let fetched = retry_step("extract", policy, ExtractError::is_retryable, || {
        extract(provider, &request.tickers, &window, request.interval)
    })
    .await;
    attempts.extract = fetched.attempts;
    let rows = match fetched.result {
        Ok(rows) => rows,
        Err(err) => {
            return Err(failed(PipelineStep::Extract, fetched.attempts, 0, 0, err.into()));
        }
    };

    let loaded = retry_step("load", policy, LoadError::is_retryable, || {
        load_rows(store, &rows)
    }).await;
    attempts.load = loaded.attempts;
    let outcome = match loaded.result {
        Ok(outcome) => outcome,
        Err(err) => {
            return Err(failed(
                PipelineStep::Load,
                loaded.attempts,
                rows.len(),
                0,
                err.into(),
            ));
        }
    };

    Ok(RunReport {
        window_start: window.start,
        window_end: window.end,
        window_source: resolution.source,
        tickers: request.tickers.iter().map(|t| t.as_str().to_string()).collect(),
        interval: request.interval.to_string(),
        rows_fetched: rows.len(),
        rows_discarded: outcome.discarded,
        rows_duplicate: outcome.duplicates,
        rows_written: outcome.written,
        attempts,
    })
}

fn failed(
    step: PipelineStep,
    attempts: u32,
    rows_fetched: usize,
    rows_written: u64,
    source: StepError,
) -> PipelineError {
    tracing::error!(
        %step,
        attempts,
        rows_fetched,
        rows_written,
        error = %source,
        "pipeline step failed"
    );
    metrics::counter!("stockflow.pipeline.failures_total", "step" => step.to_string())
        .increment(1);
    PipelineError {
        step,
        attempts,
        rows_fetched,
        rows_written,
        source,
    }
}
