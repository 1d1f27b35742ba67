// Crawler Gateway Port
// The one genuinely unreliable boundary: every call is time-bounded, none are retried here.

use crate::domain::{AuditResult, RemoteStatus};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Health check timeout
pub const HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(5);

/// Default timeout for start / status / results calls
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors from the crawler or the render worker
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    /// Timeout, connection failure, or 5xx
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Request rejected with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl GatewayError {
    /// Transient errors worth retrying with backoff
    pub fn is_retryable(&self) -> bool {
        matches!(self, GatewayError::ServiceUnavailable(_))
    }
}

/// Ephemeral availability snapshot; never cached beyond one request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlerHealth {
    pub available: bool,
    pub checked_at: i64, // epoch ms
    pub latency_ms: i64,
}

/// Typed client for the external crawler service
#[async_trait]
pub trait CrawlerGateway: Send + Sync {
    /// `GET /health`, bounded by the health timeout.
    /// Never fails: unreachable means `available = false`.
    async fn health_check(&self) -> CrawlerHealth;

    /// `POST /api/audit/start`. NOT idempotent.
    async fn start_audit(
        &self,
        project_id: &str,
        options: &serde_json::Value,
        timeout: Option<Duration>,
    ) -> Result<String, GatewayError>;

    /// `GET /api/audit/status/{job_id}`
    async fn poll_status(
        &self,
        remote_job_id: &str,
        timeout: Option<Duration>,
    ) -> Result<RemoteStatus, GatewayError>;

    /// `GET /api/audit/results/{job_id}`
    async fn fetch_results(
        &self,
        remote_job_id: &str,
        timeout: Option<Duration>,
    ) -> Result<AuditResult, GatewayError>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use crate::domain::RemoteState;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Crawler that replays scripted responses.
    ///
    /// When a script runs dry the last configured fallback is used.
    pub struct ScriptedCrawlerGateway {
        available: Mutex<bool>,
        starts: Mutex<VecDeque<Result<String, GatewayError>>>,
        statuses: Mutex<VecDeque<Result<RemoteStatus, GatewayError>>>,
        results: Mutex<Result<AuditResult, GatewayError>>,
        start_calls: Mutex<usize>,
        poll_calls: Mutex<usize>,
        fetch_calls: Mutex<usize>,
    }

    impl ScriptedCrawlerGateway {
        pub fn new() -> Self {
            Self {
                available: Mutex::new(true),
                starts: Mutex::new(VecDeque::new()),
                statuses: Mutex::new(VecDeque::new()),
                results: Mutex::new(Ok(AuditResult::new(serde_json::json!({"score": 90})))),
                start_calls: Mutex::new(0),
                poll_calls: Mutex::new(0),
                fetch_calls: Mutex::new(0),
            }
        }

        pub fn set_available(&self, available: bool) {
            *self.available.lock().unwrap() = available;
        }

        pub fn push_start(&self, result: Result<String, GatewayError>) {
            self.starts.lock().unwrap().push_back(result);
        }

        pub fn push_status(&self, result: Result<RemoteStatus, GatewayError>) {
            self.statuses.lock().unwrap().push_back(result);
        }

        pub fn push_state(&self, state: RemoteState) {
            self.push_status(Ok(RemoteStatus {
                state,
                progress: None,
            }));
        }

        pub fn set_results(&self, result: Result<AuditResult, GatewayError>) {
            *self.results.lock().unwrap() = result;
        }

        pub fn start_calls(&self) -> usize {
            *self.start_calls.lock().unwrap()
        }

        pub fn poll_calls(&self) -> usize {
            *self.poll_calls.lock().unwrap()
        }

        pub fn fetch_calls(&self) -> usize {
            *self.fetch_calls.lock().unwrap()
        }
    }

    impl Default for ScriptedCrawlerGateway {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait]
    impl CrawlerGateway for ScriptedCrawlerGateway {
        async fn health_check(&self) -> CrawlerHealth {
            CrawlerHealth {
                available: *self.available.lock().unwrap(),
                checked_at: 0,
                latency_ms: 1,
            }
        }

        async fn start_audit(
            &self,
            project_id: &str,
            _options: &serde_json::Value,
            _timeout: Option<Duration>,
        ) -> Result<String, GatewayError> {
            *self.start_calls.lock().unwrap() += 1;
            self.starts
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(format!("remote-{}", project_id)))
        }

        async fn poll_status(
            &self,
            _remote_job_id: &str,
            _timeout: Option<Duration>,
        ) -> Result<RemoteStatus, GatewayError> {
            *self.poll_calls.lock().unwrap() += 1;
            self.statuses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Ok(RemoteStatus {
                    state: RemoteState::Running,
                    progress: None,
                }))
        }

        async fn fetch_results(
            &self,
            _remote_job_id: &str,
            _timeout: Option<Duration>,
        ) -> Result<AuditResult, GatewayError> {
            *self.fetch_calls.lock().unwrap() += 1;
            self.results.lock().unwrap().clone()
        }
    }
}
