// Audit tracking and reconciliation

use super::AuditDispatcher;
use crate::application::poller::{poll_until_deadline, PollOutcome, PollStep};
use crate::application::retry::retry_transient;
use crate::domain::{AuditJob, AuditStatus, RemoteState};
use crate::error::{AppError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

const REASON_REMOTE_FAILED: &str = "remote audit failed";
const REASON_DEADLINE: &str = "tracking deadline exceeded";
const REASON_INTERRUPTED: &str = "dispatch interrupted before start";

/// How tracking ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackOutcome {
    Completed { result_ref: String },
    Failed { reason: String },
    /// Someone else already finished the job
    AlreadyTerminal(AuditStatus),
}

/// One reconciliation pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileReport {
    pub checked: usize,
    pub completed: usize,
    pub failed: usize,
    pub interrupted: usize,
}

/// Terminal state as seen from the crawler
enum RemoteEnd {
    Succeeded,
    Failed(String),
}

pub async fn track(d: &AuditDispatcher, job_id: &str) -> Result<TrackOutcome> {
    let job = d.get_status(job_id).await?;
    if job.status.is_terminal() {
        return Ok(TrackOutcome::AlreadyTerminal(job.status));
    }
    let remote_job_id = running_remote_id(&job)?;

    let deadline = tokio_deadline(d, &job);
    let timeout = Some(d.config.request_timeout);
    let remote_id = remote_job_id.as_str();
    let job_id = job.id.as_str();

    info!(job_id = %job_id, remote_job_id = %remote_id, "Tracking audit");
    stamp_poll(d, job_id).await;
    let outcome = poll_until_deadline(&d.config.poll, deadline, move || async move {
        let polled = d.crawler.poll_status(remote_id, timeout).await;
        stamp_poll(d, job_id).await;
        match polled {
            Ok(status) => match status.state {
                RemoteState::Completed => PollStep::Done(RemoteEnd::Succeeded),
                RemoteState::Failed => {
                    PollStep::Done(RemoteEnd::Failed(REASON_REMOTE_FAILED.to_string()))
                }
                state => {
                    debug!(remote_job_id = %remote_id, state = ?state, progress = ?status.progress, "Audit in progress");
                    PollStep::Pending
                }
            },
            Err(e) if e.is_retryable() => PollStep::Error(e),
            Err(e) => PollStep::Done(RemoteEnd::Failed(format!("status poll rejected: {}", e))),
        }
    })
    .await;

    match outcome {
        PollOutcome::Ready(RemoteEnd::Succeeded) => finish_success(d, &job.id, remote_id).await,
        PollOutcome::Ready(RemoteEnd::Failed(reason)) => fail_job(d, &job.id, &reason).await,
        PollOutcome::DeadlineExceeded { attempts } => {
            warn!(job_id = %job.id, attempts = attempts, "Audit tracking deadline exceeded");
            fail_job(d, &job.id, REASON_DEADLINE).await
        }
        PollOutcome::Exhausted {
            attempts,
            last_error,
        } => {
            warn!(
                job_id = %job.id,
                attempts = attempts,
                error = %last_error,
                "Crawler unreachable while tracking audit"
            );
            fail_job(d, &job.id, &format!("crawler unavailable: {}", last_error)).await
        }
    }
}

pub async fn reconcile(d: &AuditDispatcher) -> Result<ReconcileReport> {
    let now = d.time_provider.now_millis();
    let mut report = ReconcileReport::default();

    // Errors here must not keep the Running pass from enforcing deadlines
    match d.jobs.find_by_status(AuditStatus::Pending).await {
        Ok(pending) => {
            for job in pending {
                if now - job.created_at <= d.config.pending_timeout_ms {
                    continue;
                }
                warn!(job_id = %job.id, created_at = job.created_at, "Pending audit never started");
                match d.jobs.mark_failed(&job.id, REASON_INTERRUPTED, now).await {
                    Ok(true) => report.interrupted += 1,
                    Ok(false) => {}
                    Err(e) => {
                        error!(job_id = %job.id, error = %e, "Failed to fail interrupted audit job");
                    }
                }
            }
        }
        Err(e) => error!(error = %e, "Failed to load pending audit jobs"),
    }

    for job in d.jobs.find_by_status(AuditStatus::Running).await? {
        report.checked += 1;
        match reconcile_one(d, &job, now).await {
            Ok(TrackOutcome::Completed { .. }) => report.completed += 1,
            Ok(TrackOutcome::Failed { .. }) => report.failed += 1,
            Ok(TrackOutcome::AlreadyTerminal(_)) => {}
            Err(e) => {
                error!(job_id = %job.id, error = %e, "Failed to reconcile audit job");
            }
        }
    }

    if report != ReconcileReport::default() {
        info!(
            checked = report.checked,
            completed = report.completed,
            failed = report.failed,
            interrupted = report.interrupted,
            "Audit reconciliation complete"
        );
    }
    Ok(report)
}

/// Single poll for a Running job; returns AlreadyTerminal(Running) when still in
/// flight or when a live tracker is following it
async fn reconcile_one(d: &AuditDispatcher, job: &AuditJob, now: i64) -> Result<TrackOutcome> {
    let remote_job_id = running_remote_id(job)?;
    let max_poll_ms = d.config.max_poll_duration.as_millis() as i64;

    if job.poll_deadline(max_poll_ms).map_or(true, |deadline| now >= deadline) {
        warn!(job_id = %job.id, "Running audit past its deadline");
        return fail_job(d, &job.id, REASON_DEADLINE).await;
    }

    if job.recently_polled(now, d.config.tracker_lease_ms) {
        debug!(job_id = %job.id, last_polled_at = ?job.last_polled_at, "Audit has a live tracker");
        return Ok(TrackOutcome::AlreadyTerminal(AuditStatus::Running));
    }

    match d
        .crawler
        .poll_status(&remote_job_id, Some(d.config.request_timeout))
        .await
    {
        Ok(status) => match status.state {
            RemoteState::Completed => finish_success(d, &job.id, &remote_job_id).await,
            RemoteState::Failed => fail_job(d, &job.id, REASON_REMOTE_FAILED).await,
            _ => Ok(TrackOutcome::AlreadyTerminal(AuditStatus::Running)),
        },
        Err(e) => {
            debug!(job_id = %job.id, error = %e, "Status poll failed during reconciliation");
            Ok(TrackOutcome::AlreadyTerminal(AuditStatus::Running))
        }
    }
}

/// Fetch results and complete the job in one repository transaction
async fn finish_success(
    d: &AuditDispatcher,
    job_id: &str,
    remote_job_id: &str,
) -> Result<TrackOutcome> {
    let timeout = Some(d.config.request_timeout);
    let crawler = &d.crawler;
    let fetched = retry_transient(&d.config.call_retry, "fetch_results", move || {
        crawler.fetch_results(remote_job_id, timeout)
    })
    .await;

    let result = match fetched {
        Ok(result) => result,
        Err(e) => return fail_job(d, job_id, &format!("results unavailable: {}", e)).await,
    };

    let result_id = d.id_provider.generate_id();
    let now = d.time_provider.now_millis();
    match d
        .jobs
        .mark_completed(job_id, &result_id, &result, now)
        .await?
    {
        Some(result_ref) => {
            info!(job_id = %job_id, result_ref = %result_ref, "Audit completed");
            Ok(TrackOutcome::Completed { result_ref })
        }
        None => already_terminal(d, job_id).await,
    }
}

/// Tell reconciliation this job has a live tracker
async fn stamp_poll(d: &AuditDispatcher, job_id: &str) {
    let now = d.time_provider.now_millis();
    if let Err(e) = d.jobs.record_poll(job_id, now).await {
        debug!(job_id = %job_id, error = %e, "Failed to record tracker poll");
    }
}

async fn fail_job(d: &AuditDispatcher, job_id: &str, reason: &str) -> Result<TrackOutcome> {
    let now = d.time_provider.now_millis();
    if d.jobs.mark_failed(job_id, reason, now).await? {
        warn!(job_id = %job_id, reason = %reason, "Audit failed");
        Ok(TrackOutcome::Failed {
            reason: reason.to_string(),
        })
    } else {
        already_terminal(d, job_id).await
    }
}

async fn already_terminal(d: &AuditDispatcher, job_id: &str) -> Result<TrackOutcome> {
    let job = d.get_status(job_id).await?;
    Ok(TrackOutcome::AlreadyTerminal(job.status))
}

fn running_remote_id(job: &AuditJob) -> Result<String> {
    if job.status != AuditStatus::Running {
        return Err(AppError::InvalidState(format!(
            "audit job {} is {}, not RUNNING",
            job.id, job.status
        )));
    }
    job.remote_job_id.clone().ok_or_else(|| {
        AppError::InvalidState(format!("audit job {} has no remote job id", job.id))
    })
}

/// Convert the wall-clock deadline (from `started_at`) into a tokio instant
fn tokio_deadline(d: &AuditDispatcher, job: &AuditJob) -> Instant {
    let max_poll_ms = d.config.max_poll_duration.as_millis() as i64;
    let now = d.time_provider.now_millis();
    let remaining = job
        .poll_deadline(max_poll_ms)
        .map_or(0, |deadline| (deadline - now).max(0));
    Instant::now() + Duration::from_millis(remaining as u64)
}
