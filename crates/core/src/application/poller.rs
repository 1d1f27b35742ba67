//! Status Poller - turns a remote job into a locally observable transition
//!
//! Generic over a `poll_once` closure so audit tracking and PDF status
//! waiting share one backoff implementation.

use crate::application::constants::DEFAULT_MAX_POLL_DURATION;
use crate::application::retry::BackoffPolicy;
use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::debug;

/// Result of a single poll
#[derive(Debug, Clone, PartialEq)]
pub enum PollStep<T, E> {
    /// Terminal value observed
    Done(T),
    /// Still in progress
    Pending,
    /// Poll itself failed (counted towards `max_consecutive_errors`)
    Error(E),
}

/// Why polling stopped
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome<T, E> {
    Ready(T),
    DeadlineExceeded { attempts: u32 },
    Exhausted { attempts: u32, last_error: E },
}

/// Poll loop parameters
#[derive(Debug, Clone, PartialEq)]
pub struct PollConfig {
    /// Interval bounds and growth (`max_attempts` is not used here)
    pub backoff: BackoffPolicy,
    /// Total wait when no explicit deadline is given
    pub max_wait: Duration,
    /// Consecutive poll errors tolerated before giving up
    pub max_consecutive_errors: u32,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            backoff: BackoffPolicy::default(),
            max_wait: DEFAULT_MAX_POLL_DURATION,
            max_consecutive_errors: BackoffPolicy::default().max_attempts,
        }
    }
}

/// Poll until done, `config.max_wait` elapsed, or errors exhausted
pub async fn poll_until<T, E, F, Fut>(config: &PollConfig, poll_once: F) -> PollOutcome<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = PollStep<T, E>>,
{
    poll_until_deadline(config, Instant::now() + config.max_wait, poll_once).await
}

/// Poll against an absolute deadline (used when resuming a job that
/// already consumed part of its budget)
pub async fn poll_until_deadline<T, E, F, Fut>(
    config: &PollConfig,
    deadline: Instant,
    mut poll_once: F,
) -> PollOutcome<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = PollStep<T, E>>,
{
    let mut attempts = 0u32;
    let mut consecutive_errors = 0u32;

    loop {
        if Instant::now() >= deadline {
            return PollOutcome::DeadlineExceeded { attempts };
        }

        let delay = config.backoff.delay_for(attempts);
        attempts += 1;

        match poll_once().await {
            PollStep::Done(value) => return PollOutcome::Ready(value),
            PollStep::Pending => consecutive_errors = 0,
            PollStep::Error(e) => {
                consecutive_errors += 1;
                if consecutive_errors >= config.max_consecutive_errors.max(1) {
                    return PollOutcome::Exhausted {
                        attempts,
                        last_error: e,
                    };
                }
            }
        }

        let now = Instant::now();
        if now >= deadline {
            return PollOutcome::DeadlineExceeded { attempts };
        }
        let wait = delay.min(deadline - now);
        debug!(
            attempt = attempts,
            wait_ms = wait.as_millis() as u64,
            "Poll pending, sleeping"
        );
        sleep(wait).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_config() -> PollConfig {
        PollConfig {
            backoff: BackoffPolicy {
                jitter: 0.0,
                ..BackoffPolicy::default()
            },
            max_wait: Duration::from_secs(60),
            max_consecutive_errors: 3,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_ready_after_pending_polls() {
        let calls = AtomicU32::new(0);
        let outcome: PollOutcome<&str, ()> = poll_until(&fast_config(), || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 3 {
                    PollStep::Pending
                } else {
                    PollStep::Done("finished")
                }
            }
        })
        .await;

        assert_eq!(outcome, PollOutcome::Ready("finished"));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_grows_between_attempts() {
        let started = Instant::now();
        let stamps = std::sync::Mutex::new(Vec::new());
        let _: PollOutcome<(), ()> = poll_until(&fast_config(), || {
            let mut s = stamps.lock().unwrap();
            s.push(started.elapsed());
            let done = s.len() == 4;
            async move {
                if done {
                    PollStep::Done(())
                } else {
                    PollStep::Pending
                }
            }
        })
        .await;

        let stamps = stamps.into_inner().unwrap();
        let gaps: Vec<u64> = stamps
            .windows(2)
            .map(|w| (w[1] - w[0]).as_secs())
            .collect();
        assert_eq!(gaps, vec![2, 4, 8]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_exceeded() {
        let config = PollConfig {
            max_wait: Duration::from_secs(20),
            ..fast_config()
        };
        let started = Instant::now();
        let outcome: PollOutcome<(), ()> =
            poll_until(&config, || async { PollStep::Pending }).await;

        assert!(matches!(outcome, PollOutcome::DeadlineExceeded { .. }));
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(20));
        assert!(elapsed < Duration::from_secs(21));
    }

    #[tokio::test(start_paused = true)]
    async fn test_consecutive_errors_exhaust() {
        let outcome: PollOutcome<(), &str> =
            poll_until(&fast_config(), || async { PollStep::Error("unreachable") }).await;

        assert_eq!(
            outcome,
            PollOutcome::Exhausted {
                attempts: 3,
                last_error: "unreachable"
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_pending_resets_error_count() {
        let config = PollConfig {
            max_wait: Duration::from_secs(300),
            ..fast_config()
        };
        let calls = AtomicU32::new(0);
        let outcome: PollOutcome<u32, &str> = poll_until(&config, || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                match n {
                    0 | 1 | 3 | 4 => PollStep::Error("flaky"),
                    2 => PollStep::Pending,
                    _ => PollStep::Done(n),
                }
            }
        })
        .await;

        assert_eq!(outcome, PollOutcome::Ready(5));
    }
}
