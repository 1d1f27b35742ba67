// Audit Dispatcher - admission, start, tracking and reconciliation of audits

pub mod request;
pub mod tracking;

pub use request::AuditRequest;
pub use tracking::{ReconcileReport, TrackOutcome};

use crate::application::constants::{
    DEFAULT_MAX_POLL_DURATION, DEFAULT_PENDING_TIMEOUT_MS, DEFAULT_TRACKER_LEASE_MS,
};
use crate::application::poller::PollConfig;
use crate::application::quota_ledger::QuotaLedger;
use crate::application::retry::BackoffPolicy;
use crate::domain::{AuditJob, AuditResult, AuditStatus};
use crate::error::{AppError, Result};
use crate::port::{
    AuditJobRepository, CrawlerGateway, IdProvider, TimeProvider, DEFAULT_CALL_TIMEOUT,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Why an audit request was not admitted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RejectReason {
    LimitReached,
    AuditInProgress,
    ServiceUnavailable,
    DatastoreError,
}

impl RejectReason {
    pub fn as_str(self) -> &'static str {
        match self {
            RejectReason::LimitReached => "LIMIT_REACHED",
            RejectReason::AuditInProgress => "AUDIT_IN_PROGRESS",
            RejectReason::ServiceUnavailable => "SERVICE_UNAVAILABLE",
            RejectReason::DatastoreError => "DATASTORE_ERROR",
        }
    }
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of `request_audit`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchDecision {
    /// Job is Running remotely
    Admitted {
        job_id: String,
        remote_job_id: String,
    },
    Rejected {
        reason: RejectReason,
    },
}

/// Dispatcher tuning
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Retry budget for start / results calls
    pub call_retry: BackoffPolicy,
    /// Status polling backoff and error budget
    pub poll: PollConfig,
    /// Timeout for every crawler call except the health check
    pub request_timeout: Duration,
    /// Tracking deadline measured from `started_at`
    pub max_poll_duration: Duration,
    /// Age after which a Pending job is considered interrupted
    pub pending_timeout_ms: i64,
    /// Reconciliation skips Running jobs a tracker polled within this window
    pub tracker_lease_ms: i64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            call_retry: BackoffPolicy::default(),
            poll: PollConfig::default(),
            request_timeout: DEFAULT_CALL_TIMEOUT,
            max_poll_duration: DEFAULT_MAX_POLL_DURATION,
            pending_timeout_ms: DEFAULT_PENDING_TIMEOUT_MS,
            tracker_lease_ms: DEFAULT_TRACKER_LEASE_MS,
        }
    }
}

/// Job counts for the monitoring surface
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditSummary {
    pub pending: i64,
    pub running: i64,
    pub completed: i64,
    pub failed: i64,
}

/// Audit Dispatcher
///
/// Sole owner of AuditJob state. Every transition goes through a conditional
/// repository update, so concurrent trackers and sweeps cannot regress a job.
pub struct AuditDispatcher {
    jobs: Arc<dyn AuditJobRepository>,
    ledger: Arc<QuotaLedger>,
    crawler: Arc<dyn CrawlerGateway>,
    id_provider: Arc<dyn IdProvider>,
    time_provider: Arc<dyn TimeProvider>,
    config: DispatchConfig,
}

impl AuditDispatcher {
    pub fn new(
        jobs: Arc<dyn AuditJobRepository>,
        ledger: Arc<QuotaLedger>,
        crawler: Arc<dyn CrawlerGateway>,
        id_provider: Arc<dyn IdProvider>,
        time_provider: Arc<dyn TimeProvider>,
        config: DispatchConfig,
    ) -> Self {
        Self {
            jobs,
            ledger,
            crawler,
            id_provider,
            time_provider,
            config,
        }
    }

    /// Admit and start an audit
    pub async fn request_audit(&self, req: AuditRequest) -> Result<DispatchDecision> {
        request::execute(self, req).await
    }

    /// Poll a Running job until it reaches a terminal state
    pub async fn track(&self, job_id: &str) -> Result<TrackOutcome> {
        tracking::track(self, job_id).await
    }

    /// One pass over Pending and Running jobs
    pub async fn reconcile_running(&self) -> Result<ReconcileReport> {
        tracking::reconcile(self).await
    }

    pub async fn get_status(&self, job_id: &str) -> Result<AuditJob> {
        self.jobs
            .find_by_id(job_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("audit job {}", job_id)))
    }

    /// Stored result of a Completed job
    pub async fn get_result(&self, job_id: &str) -> Result<Option<AuditResult>> {
        let job = self.get_status(job_id).await?;
        match job.result_ref {
            Some(result_ref) => self.jobs.find_result(&result_ref).await,
            None => Ok(None),
        }
    }

    pub async fn summary(&self) -> Result<AuditSummary> {
        let counts = self.jobs.count_by_status().await?;
        let count = |status| counts.get(&status).copied().unwrap_or(0);
        Ok(AuditSummary {
            pending: count(AuditStatus::Pending),
            running: count(AuditStatus::Running),
            completed: count(AuditStatus::Completed),
            failed: count(AuditStatus::Failed),
        })
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }
}
