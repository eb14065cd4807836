use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unsupported interval: {0}")]
pub struct UnsupportedInterval(pub String);

/// Failures reported by a market-data provider adapter.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ProviderError {
    #[error("provider request failed: {0}")]
    Request(String),

    #[error("provider request timed out: {0}")]
    Timeout(String),

    #[error("provider rate limit exceeded for {symbol}")]
    RateLimited { symbol: String },

    #[error("provider returned status {status} for {symbol}")]
    Status { symbol: String, status: u16 },

    #[error("provider error for {symbol}: {code}: {description}")]
    Api {
        symbol: String,
        code: String,
        description: String,
    },

    #[error("malformed provider response for {symbol}: {reason}")]
    Malformed { symbol: String, reason: String },

    #[error("provider task failed: {0}")]
    Task(String),

    #[error("provider configuration error: {0}")]
    Configuration(String),
}

impl ProviderError {
    /// False for failures that repeat identically on every attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Request(_)
            | Self::Timeout(_)
            | Self::RateLimited { .. }
            | Self::Malformed { .. }
            | Self::Task(_) => true,
            Self::Status { status, .. } => *status >= 500 || *status == 408,
            Self::Api { .. } | Self::Configuration(_) => false,
        }
    }
}

/// Failures reported by a storage adapter.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StoreError {
    #[error("invalid table name: {0}")]
    InvalidTable(String),

    #[error("invalid connection settings: {0}")]
    Configuration(String),

    #[error("failed to connect to storage: {0}")]
    Connect(String),

    #[error("storage {operation} timed out after {secs}s")]
    Timeout { operation: &'static str, secs: u64 },

    #[error("storage query failed: {0}")]
    Query(String),

    #[error("storage transaction failed: {0}")]
    Transaction(String),
}

impl StoreError {
    /// False for failures that repeat identically on every attempt.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::InvalidTable(_) | Self::Configuration(_))
    }
}
