use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use stockflow_domain::errors::UnsupportedInterval;
use stockflow_domain::value_objects::interval::Interval;
use stockflow_domain::value_objects::ticker::{parse_ticker_list, Ticker};
use stockflow_domain::value_objects::window::WindowInput;
use thiserror::Error;

pub const ENV_DB_URL: &str = "STOCKFLOW_DB_URL";
pub const ENV_DB_HOST: &str = "POSTGRES_HOST";
pub const ENV_DB_PORT: &str = "POSTGRES_PORT";
pub const ENV_DB_USER: &str = "POSTGRES_USER";
pub const ENV_DB_PASSWORD: &str = "POSTGRES_PASSWORD";
pub const ENV_DB_NAME: &str = "POSTGRES_DB_STOCKS";
pub const ENV_DB_TABLE: &str = "STOCKFLOW_TABLE";
pub const ENV_DB_BATCH_SIZE: &str = "STOCKFLOW_BATCH_SIZE";
pub const ENV_DB_TIMEOUT_SECS: &str = "STOCKFLOW_DB_TIMEOUT_SECS";
pub const ENV_TICKERS: &str = "STOCK_TICKERS";
pub const ENV_INTERVAL: &str = "STOCKFLOW_INTERVAL";
pub const ENV_WINDOW_START: &str = "STOCKFLOW_WINDOW_START";
pub const ENV_WINDOW_END: &str = "STOCKFLOW_WINDOW_END";
pub const ENV_PROVIDER_URL: &str = "STOCKFLOW_PROVIDER_URL";
pub const ENV_HTTP_TIMEOUT_SECS: &str = "STOCKFLOW_HTTP_TIMEOUT_SECS";
pub const ENV_MAX_CONCURRENCY: &str = "STOCKFLOW_MAX_CONCURRENCY";
pub const ENV_RETRIES: &str = "STOCKFLOW_RETRIES";
pub const ENV_RETRY_DELAY_SECS: &str = "STOCKFLOW_RETRY_DELAY_SECS";

pub const DEFAULT_TICKERS: &str = "AAPL,MSFT";
pub const DEFAULT_TABLE: &str = "public.stock_prices";
pub const DEFAULT_PROVIDER_URL: &str = "https://query1.finance.yahoo.com";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse TOML {}: {message}", path.display())]
    Parse { path: PathBuf, message: String },

    #[error("invalid value for {key}: {value:?}")]
    InvalidValue { key: String, value: String },

    #[error(transparent)]
    Interval(#[from] UnsupportedInterval),
}

/// Optional on-disk configuration; every field falls back to env or defaults.
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub tickers: Option<Vec<String>>,
    pub interval: Option<String>,
    pub db: Option<DbFileConfig>,
    pub window: Option<WindowInput>,
    pub provider: Option<ProviderFileConfig>,
    pub retry: Option<RetryFileConfig>,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
#[serde(deny_unknown_fields)]
pub struct DbFileConfig {
    pub url: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub name: Option<String>,
    pub table: Option<String>,
    pub batch_size: Option<usize>,
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
#[serde(deny_unknown_fields)]
pub struct ProviderFileConfig {
    pub base_url: Option<String>,
    pub timeout_secs: Option<u64>,
    pub max_concurrency: Option<usize>,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
#[serde(deny_unknown_fields)]
pub struct RetryFileConfig {
    pub attempts: Option<u32>,
    pub delay_secs: Option<u64>,
}

#[derive(Clone, PartialEq, Eq)]
pub struct DbConfig {
    pub url: Option<String>,
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub name: String,
    pub table: String,
    pub batch_size: usize,
    pub timeout_secs: u64,
}

impl DbConfig {
    /// Connection string for the store. A full URL wins over the discrete parts;
    /// SQLAlchemy-style driver suffixes are stripped from it.
    pub fn connection_string(&self) -> String {
        if let Some(url) = self.url.as_deref() {
            return normalize_db_url(url);
        }
        format!(
            "host={} port={} user={} password={} dbname={}",
            quote_conn_value(&self.host),
            self.port,
            quote_conn_value(&self.user),
            quote_conn_value(&self.password),
            quote_conn_value(&self.name)
        )
    }
}

impl fmt::Debug for DbConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DbConfig")
            .field("url", &self.url.as_ref().map(|_| "<redacted>"))
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("name", &self.name)
            .field("table", &self.table)
            .field("batch_size", &self.batch_size)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderConfig {
    pub base_url: String,
    pub timeout_secs: u64,
    pub max_concurrency: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryConfig {
    /// Retries after the first failed attempt of a step.
    pub attempts: u32,
    pub delay_secs: u64,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub db: DbConfig,
    pub tickers: Vec<Ticker>,
    pub interval: Interval,
    pub window: Option<WindowInput>,
    pub provider: ProviderConfig,
    pub retry: RetryConfig,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_sources(None, |key| std::env::var(key).ok())
    }

    /// Builds the run configuration. Environment values override the file,
    /// the file overrides built-in defaults.
    pub fn from_sources<F>(file: Option<FileConfig>, env: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let file = file.unwrap_or_default();
        let db_file = file.db.unwrap_or_default();
        let provider_file = file.provider.unwrap_or_default();
        let retry_file = file.retry.unwrap_or_default();
        let set = |key: &str| env(key).filter(|v| !v.trim().is_empty());

        let db = DbConfig {
            url: set(ENV_DB_URL).or(db_file.url.filter(|v| !v.trim().is_empty())),
            host: set(ENV_DB_HOST)
                .or(db_file.host)
                .unwrap_or_else(|| "localhost".to_string()),
            port: parse_or(set(ENV_DB_PORT), ENV_DB_PORT, db_file.port, 5432)?,
            user: set(ENV_DB_USER)
                .or(db_file.user)
                .unwrap_or_else(|| "postgres".to_string()),
            password: set(ENV_DB_PASSWORD)
                .or(db_file.password)
                .unwrap_or_else(|| "postgres".to_string()),
            name: set(ENV_DB_NAME)
                .or(db_file.name)
                .unwrap_or_else(|| "stocks".to_string()),
            table: set(ENV_DB_TABLE)
                .or(db_file.table)
                .unwrap_or_else(|| DEFAULT_TABLE.to_string()),
            batch_size: parse_or(
                set(ENV_DB_BATCH_SIZE),
                ENV_DB_BATCH_SIZE,
                db_file.batch_size,
                1000,
            )?,
            timeout_secs: parse_or(
                set(ENV_DB_TIMEOUT_SECS),
                ENV_DB_TIMEOUT_SECS,
                db_file.timeout_secs,
                30,
            )?,
        };
        if db.batch_size == 0 {
            let key = if set(ENV_DB_BATCH_SIZE).is_some() {
                ENV_DB_BATCH_SIZE
            } else {
                "db.batch_size"
            };
            return Err(invalid(key, "0"));
        }

        // A present-but-blank ticker list is honoured as "no tickers".
        let tickers = match env(ENV_TICKERS) {
            Some(raw) => parse_ticker_list(&raw),
            None => match file.tickers {
                Some(list) => parse_ticker_list(&list.join(",")),
                None => parse_ticker_list(DEFAULT_TICKERS),
            },
        };

        let interval = match set(ENV_INTERVAL).or(file.interval) {
            Some(raw) => Interval::parse(&raw)?,
            None => Interval::default(),
        };

        // Each bound is taken from env when set, otherwise from the file.
        let file_window = file.window.unwrap_or_default();
        let non_blank = |v: &String| !v.trim().is_empty();
        let window = WindowInput {
            start: set(ENV_WINDOW_START).or(file_window.start.filter(non_blank)),
            end: set(ENV_WINDOW_END).or(file_window.end.filter(non_blank)),
        };
        let window = (!window.is_empty()).then_some(window);

        let provider = ProviderConfig {
            base_url: set(ENV_PROVIDER_URL)
                .or(provider_file.base_url)
                .unwrap_or_else(|| DEFAULT_PROVIDER_URL.to_string()),
            timeout_secs: parse_or(
                set(ENV_HTTP_TIMEOUT_SECS),
                ENV_HTTP_TIMEOUT_SECS,
                provider_file.timeout_secs,
                30,
            )?,
            max_concurrency: parse_or(
                set(ENV_MAX_CONCURRENCY),
                ENV_MAX_CONCURRENCY,
                provider_file.max_concurrency,
                4,
            )?,
        };
        if provider.max_concurrency == 0 {
            let key = if set(ENV_MAX_CONCURRENCY).is_some() {
                ENV_MAX_CONCURRENCY
            } else {
                "provider.max_concurrency"
            };
            return Err(invalid(key, "0"));
        }

        let retry = RetryConfig {
            attempts: parse_or(set(ENV_RETRIES), ENV_RETRIES, retry_file.attempts, 2)?,
            delay_secs: parse_or(
                set(ENV_RETRY_DELAY_SECS),
                ENV_RETRY_DELAY_SECS,
                retry_file.delay_secs,
                300,
            )?,
        };

        Ok(Self {
            db,
            tickers,
            interval,
            window,
            provider,
            retry,
        })
    }
}

pub fn load_config_file(path: &Path) -> Result<FileConfig, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&contents).map_err(|err| ConfigError::Parse {
        path: path.to_path_buf(),
        message: err.to_string(),
    })
}

pub fn normalize_db_url(url: &str) -> String {
    let url = url.trim();
    for (from, to) in [
        ("postgresql+psycopg2://", "postgresql://"),
        ("postgres+psycopg2://", "postgres://"),
    ] {
        if let Some(rest) = url.strip_prefix(from) {
            return format!("{to}{rest}");
        }
    }
    url.to_string()
}

fn quote_conn_value(value: &str) -> String {
    let escaped = value.replace('\\', "\\\\").replace('\'', "\\'");
    format!("'{escaped}'")
}

fn parse_or<T: FromStr>(
    env_value: Option<String>,
    key: &str,
    file_value: Option<T>,
    default: T,
) -> Result<T, ConfigError> {
    match env_value {
        Some(raw) => raw.trim().parse().map_err(|_| invalid(key, &raw)),
        None => Ok(file_value.unwrap_or(default)),
    }
}

fn invalid(key: &str, value: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    }
}
