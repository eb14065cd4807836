use chrono::NaiveDateTime;
use serde::Serialize;
use std::fmt;
use stockflow_domain::errors::{ProviderError, StoreError};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStep {
    EnsureSchema,
    Extract,
    Load,
}

impl fmt::Display for PipelineStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EnsureSchema => f.write_str("ensure_schema"),
            Self::Extract => f.write_str("extract"),
            Self::Load => f.write_str("load"),
        }
    }
}

#[derive(Debug, Error)]
#[error("schema initialization failed: {0}")]
pub struct SchemaError(#[from] pub StoreError);

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("invalid window: start {start} is not before end {end}")]
    InvalidWindow {
        start: NaiveDateTime,
        end: NaiveDateTime,
    },

    #[error(transparent)]
    Provider(#[from] ProviderError),
}

#[derive(Debug, Error)]
#[error("failed to write {attempted} validated rows: {source}")]
pub struct LoadError {
    pub attempted: usize,
    #[source]
    pub source: StoreError,
}

#[derive(Debug, Error)]
pub enum StepError {
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error(transparent)]
    Extract(#[from] ExtractError),
    #[error(transparent)]
    Load(#[from] LoadError),
}

/// A failed run: which step gave up and what had been processed by then.
#[derive(Debug, Error)]
#[error(
    "{step} step failed after {attempts} attempt(s) (rows_fetched={rows_fetched}, rows_written={rows_written}): {source}"
)]
pub struct PipelineError {
    pub step: PipelineStep,
    pub attempts: u32,
    pub rows_fetched: usize,
    pub rows_written: u64,
    #[source]
    pub source: StepError,
}

impl SchemaError {
    pub fn is_retryable(&self) -> bool {
        self.0.is_retryable()
    }
}

impl ExtractError {
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::InvalidWindow { .. } => false,
            Self::Provider(err) => err.is_retryable(),
        }
    }
}

impl LoadError {
    pub fn is_retryable(&self) -> bool {
        self.source.is_retryable()
    }
}
