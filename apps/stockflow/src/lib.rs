pub mod cli;
pub mod commands;
pub mod obs;

use stockflow_application::config::ConfigError;
use stockflow_application::pipeline::{ExtractError, PipelineError, SchemaError};
use stockflow_domain::errors::{ProviderError, StoreError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Extract(#[from] ExtractError),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error("{0}")]
    Observability(String),

    #[error("invalid argument: {0}")]
    Argument(String),

    #[error("failed to render output: {0}")]
    Output(#[from] serde_json::Error),
}
