// Application constants (no magic values)
use std::time::Duration;

/// First retry / poll delay (2s)
pub const DEFAULT_BACKOFF_INITIAL: Duration = Duration::from_secs(2);

/// Upper bound for a single backoff delay (30s)
pub const DEFAULT_BACKOFF_MAX: Duration = Duration::from_secs(30);

/// Exponential backoff multiplier
pub const DEFAULT_BACKOFF_FACTOR: f64 = 2.0;

/// Jitter applied to every delay (±10%)
pub const DEFAULT_BACKOFF_JITTER: f64 = 0.1;

/// Attempts for a crawler call before giving up with ServiceUnavailable
pub const DEFAULT_GATEWAY_ATTEMPTS: u32 = 3;

/// Maximum time an audit may stay Running while being polled (30 minutes)
pub const DEFAULT_MAX_POLL_DURATION: Duration = Duration::from_secs(30 * 60);

/// Default PDF retry budget
pub const DEFAULT_PDF_MAX_ATTEMPTS: i32 = 3;

/// Processing PDF job without heartbeat for this long is abandoned (10 minutes)
pub const DEFAULT_PDF_STALE_AFTER_MS: i64 = 10 * 60 * 1000;

/// Queued PDF job not picked up within this window is re-dispatched (10 minutes)
pub const DEFAULT_PDF_DISPATCH_TIMEOUT_MS: i64 = 10 * 60 * 1000;

/// Reconciliation sweep period (60s)
pub const DEFAULT_RECONCILE_INTERVAL: Duration = Duration::from_secs(60);

/// Sleep after a failed sweep before the next tick may run (1s)
pub const ERROR_RECOVERY_SLEEP_DURATION: Duration = Duration::from_secs(1);

/// Pending audit older than this was interrupted between insert and start (5 minutes)
pub const DEFAULT_PENDING_TIMEOUT_MS: i64 = 5 * 60 * 1000;

/// Poll interval used by `await_terminal` on PDF jobs (1s)
pub const DEFAULT_PDF_AWAIT_INTERVAL: Duration = Duration::from_secs(1);

/// A Running audit polled by a tracker within this window is left to that tracker (2 minutes)
pub const DEFAULT_TRACKER_LEASE_MS: i64 = 2 * 60 * 1000;
