use crate::config::RetryConfig;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

/// Fixed-delay retry applied per pipeline step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub retries: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            retries: 0,
            delay: Duration::ZERO,
        }
    }
}

impl From<RetryConfig> for RetryPolicy {
    fn from(config: RetryConfig) -> Self {
        Self {
            retries: config.attempts,
            delay: Duration::from_secs(config.delay_secs),
        }
    }
}

/// Result of a retried step plus the number of attempts it took.
pub struct Attempted<T, E> {
    pub result: Result<T, E>,
    pub attempts: u32,
}

/// Runs `op` until it succeeds, the retries are spent or `retryable` rejects the error.
pub async fn retry_step<T, E, R, F, Fut>(
    step: &str,
    policy: RetryPolicy,
    retryable: R,
    mut op: F,
) -> Attempted<T, E>
where
    R: Fn(&E) -> bool,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let mut attempts = 0u32;
    loop {
        attempts += 1;
        match op().await {
            Ok(value) => {
                return Attempted {
                    result: Ok(value),
                    attempts,
                }
            }
            Err(err) if attempts <= policy.retries && retryable(&err) => {
                tracing::warn!(
                    step,
                    attempt = attempts,
                    max_attempts = policy.retries + 1,
                    delay_ms = policy.delay.as_millis() as u64,
                    error = %err,
                    "step failed, retrying"
                );
                metrics::counter!("stockflow.pipeline.retries_total", "step" => step.to_string())
                    .increment(1);
                tokio::time::sleep(policy.delay).await;
            }
            Err(err) => {
                if !retryable(&err) {
                    tracing::debug!(
                        step,
                        attempt = attempts,
                        error = %err,
                        "step failure is not retryable"
                    );
                }
                return Attempted {
                    result: Err(err),
                    attempts,
                }
            }
        }
    }
}
