use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "stockflow")]
#[command(about = "Daily OHLCV ingestion from Yahoo Finance into PostgreSQL.", version)]
pub struct Cli {
    /// Config file path (TOML). Environment variables override its values.
    #[arg(long, global = true, env = "STOCKFLOW_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log output format: text | json
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    /// Expose Prometheus metrics on host:port.
    #[arg(long, global = true, env = "STOCKFLOW_METRICS_ADDR")]
    pub metrics_addr: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create the price table when it does not exist.
    InitSchema,
    /// Fetch and print canonical rows as JSON lines without touching storage.
    Extract(SelectionArgs),
    /// Run schema init, extract and load with per-step retries.
    Run(SelectionArgs),
    /// Print the stored row count, and the rows of one ticker when given.
    Status {
        #[arg(long)]
        ticker: Option<String>,
    },
}

#[derive(Args, Debug, Clone, Default)]
pub struct SelectionArgs {
    /// Window start (RFC3339, naive datetime or YYYY-MM-DD, UTC).
    #[arg(long)]
    pub start: Option<String>,

    /// Window end, exclusive.
    #[arg(long)]
    pub end: Option<String>,

    /// Comma-separated tickers, e.g. AAPL,MSFT
    #[arg(long)]
    pub tickers: Option<String>,

    /// Bar interval, e.g. 1d, 1h, 5m
    #[arg(long)]
    pub interval: Option<String>,
}
