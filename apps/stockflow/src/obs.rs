use crate::cli::LogFormat;
use crate::CliError;
use std::net::SocketAddr;

pub const ENV_LOG: &str = "STOCKFLOW_LOG";

/// Logs go to stderr; stdout carries command output.
pub fn init_tracing(log_level: &str, log_format: LogFormat) -> Result<(), CliError> {
    let filter = std::env::var(ENV_LOG).unwrap_or_else(|_| log_level.to_string());
    let env_filter = tracing_subscriber::EnvFilter::try_new(filter)
        .map_err(|err| CliError::Observability(format!("invalid log filter: {err}")))?;

    match log_format {
        LogFormat::Json => tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .json()
            .init(),
        LogFormat::Text => tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .init(),
    }
    Ok(())
}

#[cfg(feature = "prometheus")]
pub fn init_metrics(metrics_addr: Option<&str>) -> Result<Option<SocketAddr>, CliError> {
    use metrics_exporter_prometheus::PrometheusBuilder;

    let Some(raw) = metrics_addr else {
        return Ok(None);
    };
    let addr: SocketAddr = raw.parse().map_err(|err| {
        CliError::Observability(format!("invalid --metrics-addr (expected host:port): {err}"))
    })?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|err| {
            CliError::Observability(format!("failed to install prometheus exporter: {err}"))
        })?;

    tracing::info!(metrics_addr = %addr, "prometheus metrics exporter enabled");
    Ok(Some(addr))
}

#[cfg(not(feature = "prometheus"))]
pub fn init_metrics(metrics_addr: Option<&str>) -> Result<Option<SocketAddr>, CliError> {
    if metrics_addr.is_some() {
        return Err(CliError::Observability(
            "metrics exporter requires stockflow feature `prometheus`".to_string(),
        ));
    }
    Ok(None)
}
