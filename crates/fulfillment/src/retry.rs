//! Retry of whole units of work after a lost concurrent update.

use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;

use crate::Result;

/// Exponential backoff for conflict retries.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the first attempt. Zero disables retrying.
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(200),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    fn next_delay(&self, delay: Duration) -> Duration {
        delay.mul_f64(self.multiplier).min(self.max_delay)
    }
}

/// Runs `attempt` until it succeeds, fails with a non-conflict error, or
/// the policy's retries are used up.
///
/// Each attempt must be a complete unit of work: the failed attempt's
/// transaction has already rolled back when the next one starts.
pub(crate) async fn retry_on_conflict<T, F, Fut>(
    policy: &RetryPolicy,
    operation: &'static str,
    mut attempt: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut retries = 0;
    let mut delay = policy.initial_delay;

    loop {
        match attempt().await {
            Err(err) if err.is_conflict() && retries < policy.max_retries => {
                retries += 1;
                metrics::counter!("fulfillment_conflict_retries_total", "operation" => operation)
                    .increment(1);
                tracing::warn!(
                    operation,
                    retry = retries,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "concurrent update conflict, retrying"
                );
                sleep(delay).await;
                delay = policy.next_delay(delay);
            }
            result => return result,
        }
    }
}
