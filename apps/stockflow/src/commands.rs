use crate::cli::{Command, SelectionArgs};
use crate::CliError;
use chrono::{DateTime, Utc};
use serde_json::json;
use std::path::Path;
use std::time::Duration;
use stockflow_application::config::{load_config_file, Config, ConfigError};
use stockflow_application::pipeline::{self, PipelineRequest, RetryPolicy};
use stockflow_domain::repositories::price_store::PriceStore;
use stockflow_domain::services::window::{resolve_window, WindowSource};
use stockflow_domain::value_objects::interval::Interval;
use stockflow_domain::value_objects::price_row::PriceRow;
use stockflow_domain::value_objects::ticker::{parse_ticker_list, Ticker};
use stockflow_domain::value_objects::window::WindowInput;
use stockflow_infrastructure::market_data::yahoo::YahooPriceProvider;
use stockflow_infrastructure::persistence::postgres_prices::PostgresPriceStore;

/// File (when given) overlaid by the process environment.
pub fn load_config(path: Option<&Path>) -> Result<Config, CliError> {
    let file = path.map(load_config_file).transpose()?;
    Ok(Config::from_sources(file, |key| std::env::var(key).ok())?)
}

/// Command-line selection wins over env and file. A bound given on the
/// command line replaces only that bound.
pub fn apply_selection(config: &mut Config, args: &SelectionArgs) -> Result<(), CliError> {
    if let Some(raw) = &args.tickers {
        config.tickers = parse_ticker_list(raw);
    }
    if let Some(raw) = &args.interval {
        config.interval = Interval::parse(raw).map_err(ConfigError::from)?;
    }
    if args.start.is_some() || args.end.is_some() {
        let base = config.window.take().unwrap_or_default();
        config.window = Some(WindowInput {
            start: args.start.clone().or(base.start),
            end: args.end.clone().or(base.end),
        });
    }
    Ok(())
}

pub fn build_provider(config: &Config) -> Result<YahooPriceProvider, CliError> {
    Ok(YahooPriceProvider::new(
        &config.provider.base_url,
        Duration::from_secs(config.provider.timeout_secs),
        config.provider.max_concurrency,
    )?)
}

pub fn build_store(config: &Config) -> Result<PostgresPriceStore, CliError> {
    Ok(PostgresPriceStore::new(
        &config.db.connection_string(),
        &config.db.table,
        config.db.batch_size,
        Duration::from_secs(config.db.timeout_secs),
    )?)
}

/// Runs one command and returns what should be printed on stdout.
pub async fn execute(
    command: Command,
    mut config: Config,
    now: DateTime<Utc>,
) -> Result<String, CliError> {
    match command {
        Command::InitSchema => {
            metrics::counter!("stockflow.cli.commands_total", "command" => "init-schema")
                .increment(1);
            init_schema(&config).await
        }
        Command::Extract(args) => {
            metrics::counter!("stockflow.cli.commands_total", "command" => "extract").increment(1);
            apply_selection(&mut config, &args)?;
            extract(&config, now).await
        }
        Command::Run(args) => {
            metrics::counter!("stockflow.cli.commands_total", "command" => "run").increment(1);
            apply_selection(&mut config, &args)?;
            run(&config, now).await
        }
        Command::Status { ticker } => {
            metrics::counter!("stockflow.cli.commands_total", "command" => "status").increment(1);
            status(&config, ticker.as_deref()).await
        }
    }
}

async fn init_schema(config: &Config) -> Result<String, CliError> {
    let store = build_store(config)?;
    pipeline::ensure_schema(&store).await?;
    tracing::info!(table = %store.table(), "schema ready");
    Ok(serde_json::to_string(
        &json!({ "table": store.table(), "status": "ok" }),
    )?)
}

async fn extract(config: &Config, now: DateTime<Utc>) -> Result<String, CliError> {
    let provider = build_provider(config)?;
    let resolution = resolve_window(config.window.as_ref(), now);
    if let WindowSource::Fallback { reason } = &resolution.source {
        tracing::warn!(%reason, "explicit window rejected, using default lookback");
    }

    let rows = pipeline::extract(
        &provider,
        &config.tickers,
        &resolution.window,
        config.interval,
    )
    .await?;
    render_rows(&rows)
}

async fn run(config: &Config, now: DateTime<Utc>) -> Result<String, CliError> {
    let provider = build_provider(config)?;
    let store = build_store(config)?;
    let request = PipelineRequest {
        tickers: config.tickers.clone(),
        window: config.window.clone(),
        interval: config.interval,
    };

    let report = pipeline::run_pipeline(
        &provider,
        &store,
        &request,
        now,
        RetryPolicy::from(config.retry),
    )
    .await?;
    Ok(serde_json::to_string_pretty(&report)?)
}

async fn status(config: &Config, ticker: Option<&str>) -> Result<String, CliError> {
    let ticker = status_ticker(ticker)?;
    let store = build_store(config)?;
    let count = store.count_rows().await?;

    let mut out = json!({ "table": store.table(), "rows": count });
    if let Some(ticker) = ticker {
        let rows: Vec<PriceRow> = store
            .fetch_rows(&ticker)
            .await?
            .into_iter()
            .map(PriceRow::from)
            .collect();
        out["ticker"] = json!(ticker.as_str());
        out["ticker_rows"] = serde_json::to_value(rows)?;
    }
    Ok(serde_json::to_string_pretty(&out)?)
}

/// A given `--ticker` must name a symbol; blank input is an error, not "no ticker".
pub fn status_ticker(raw: Option<&str>) -> Result<Option<Ticker>, CliError> {
    match raw {
        None => Ok(None),
        Some(raw) => Ticker::parse(raw)
            .map(Some)
            .ok_or_else(|| CliError::Argument("--ticker must not be blank".to_string())),
    }
}

/// One JSON object per line.
pub fn render_rows(rows: &[PriceRow]) -> Result<String, CliError> {
    let mut out = String::new();
    for row in rows {
        out.push_str(&serde_json::to_string(row)?);
        out.push('\n');
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::{apply_selection, render_rows, status_ticker};
    use crate::cli::SelectionArgs;
    use crate::CliError;
    use chrono::NaiveDate;
    use stockflow_application::config::Config;
    use stockflow_domain::value_objects::interval::Interval;
    use stockflow_domain::value_objects::price_row::PriceRow;
    use stockflow_domain::value_objects::window::WindowInput;

    fn config() -> Config {
        Config::from_sources(None, |key| match key {
            "STOCKFLOW_WINDOW_START" => Some("2024-01-01".to_string()),
            "STOCKFLOW_WINDOW_END" => Some("2024-01-05".to_string()),
            _ => None,
        })
        .expect("config")
    }

    #[test]
    fn selection_overrides_tickers_and_interval() {
        let mut config = config();
        let args = SelectionArgs {
            tickers: Some("nvda, amd".to_string()),
            interval: Some("1h".to_string()),
            ..SelectionArgs::default()
        };
        apply_selection(&mut config, &args).expect("apply");

        let tickers: Vec<&str> = config.tickers.iter().map(|t| t.as_str()).collect();
        assert_eq!(tickers, vec!["nvda", "amd"]);
        assert_eq!(config.interval, Interval::OneHour);
        assert_eq!(config.window, Some(WindowInput::new("2024-01-01", "2024-01-05")));
    }

    #[test]
    fn selection_replaces_only_given_bound() {
        let mut config = config();
        let args = SelectionArgs {
            end: Some("2024-01-03".to_string()),
            ..SelectionArgs::default()
        };
        apply_selection(&mut config, &args).expect("apply");
        assert_eq!(config.window, Some(WindowInput::new("2024-01-01", "2024-01-03")));
    }

    #[test]
    fn selection_rejects_unknown_interval() {
        let mut config = config();
        let args = SelectionArgs {
            interval: Some("7d".to_string()),
            ..SelectionArgs::default()
        };
        let err = apply_selection(&mut config, &args).expect_err("unknown interval");
        assert!(err.to_string().contains("7d"));
    }

    #[test]
    fn rows_render_as_json_lines() {
        let ts = NaiveDate::from_ymd_opt(2024, 1, 2)
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .unwrap();
        let rows = vec![
            PriceRow::new("AAPL", ts).with_prices(1.0, 2.0, 0.5, 1.5),
            PriceRow::new("MSFT", ts).with_volume(10),
        ];
        let out = render_rows(&rows).expect("render");
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: PriceRow = serde_json::from_str(lines[0]).expect("json line");
        assert_eq!(first, rows[0]);
        assert!(lines[1].contains("\"volume\":10"));
    }

    #[test]
    fn status_rejects_blank_ticker() {
        let err = status_ticker(Some("   ")).expect_err("blank ticker");
        assert!(matches!(err, CliError::Argument(_)));
        assert!(err.to_string().contains("--ticker"));

        let ticker = status_ticker(Some(" AAPL ")).expect("ticker").expect("present");
        assert_eq!(ticker.as_str(), "AAPL");
        assert!(status_ticker(None).expect("no ticker").is_none());
    }
}
