// Retry logic: exponential backoff with jitter
use crate::application::constants::*;
use crate::port::GatewayError;
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::{info, warn};

/// Exponential backoff policy
///
/// delay(n) = min(initial * factor^n, max) * (1.0 ± jitter)
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffPolicy {
    pub initial: Duration,
    pub max: Duration,
    pub factor: f64,
    pub jitter: f64,
    /// Total attempts (first call included)
    pub max_attempts: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial: DEFAULT_BACKOFF_INITIAL,
            max: DEFAULT_BACKOFF_MAX,
            factor: DEFAULT_BACKOFF_FACTOR,
            jitter: DEFAULT_BACKOFF_JITTER,
            max_attempts: DEFAULT_GATEWAY_ATTEMPTS,
        }
    }
}

impl BackoffPolicy {
    /// Delay before retry number `retry` (0-based), without jitter
    pub fn base_delay(&self, retry: u32) -> Duration {
        let exp = self.factor.max(1.0).powi(retry.min(32) as i32);
        let millis = (self.initial.as_millis() as f64 * exp).min(self.max.as_millis() as f64);
        Duration::from_millis(millis as u64)
    }

    /// Delay before retry number `retry` (0-based), jittered to avoid
    /// synchronized load against the remote service
    pub fn delay_for(&self, retry: u32) -> Duration {
        let base = self.base_delay(retry);
        let jitter = self.jitter.clamp(0.0, 1.0);
        if jitter == 0.0 {
            return base;
        }
        let factor = rand::thread_rng().gen_range((1.0 - jitter)..=(1.0 + jitter));
        Duration::from_millis((base.as_millis() as f64 * factor) as u64)
    }
}

/// Run `operation` until it succeeds, fails permanently, or the attempt
/// budget is spent. Only retryable gateway errors are retried.
pub async fn retry_transient<T, F, Fut>(
    policy: &BackoffPolicy,
    operation: &str,
    mut call: F,
) -> Result<T, GatewayError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, GatewayError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match call().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt < max_attempts => {
                let delay = policy.delay_for(attempt - 1);
                info!(
                    operation = %operation,
                    attempt = attempt,
                    max_attempts = max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Retrying after transient failure"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => {
                warn!(
                    operation = %operation,
                    attempt = attempt,
                    error = %e,
                    "Giving up"
                );
                return Err(e);
            }
        }
    }
}
