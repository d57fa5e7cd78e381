// Bounded retry with timeout and exponential backoff for capability calls

use std::future::Future;
use std::time::Duration;

use tokio::time::{sleep, timeout};
use tracing::warn;

use crate::config::PipelineConfig;
use crate::types::{AppError, AppResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Upper bound for a single attempt
    pub timeout: Duration,
    /// Extra attempts after the first one
    pub max_retries: u32,
    pub initial_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&PipelineConfig::default())
    }
}

impl RetryPolicy {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            timeout: config.capability_timeout(),
            max_retries: config.max_retries,
            initial_backoff: config.backoff(),
        }
    }

    /// Delay before retry number `attempt` (1-based)
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(5);
        self.initial_backoff * 2u32.pow(exponent)
    }
}

/// Run `operation` under `policy`. Only transient failures (and timeouts) are retried.
pub async fn with_retry<F, Fut, T>(policy: &RetryPolicy, label: &str, mut operation: F) -> AppResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = AppResult<T>>,
{
    let mut attempt = 0;

    loop {
        let outcome = match timeout(policy.timeout, operation()).await {
            Ok(result) => result,
            Err(_) => Err(AppError::CapabilityUnavailable(format!(
                "{} timed out after {:?}",
                label, policy.timeout
            ))),
        };

        match outcome {
            Ok(value) => return Ok(value),
            Err(error) if error.is_transient() && attempt < policy.max_retries => {
                attempt += 1;
                let delay = policy.backoff_for(attempt);
                warn!(
                    call = label,
                    attempt,
                    max_retries = policy.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "Capability call failed, retrying"
                );
                sleep(delay).await;
            }
            Err(error) => return Err(error),
        }
    }
}
