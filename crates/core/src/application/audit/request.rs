// Request Audit Use Case

use super::{AuditDispatcher, DispatchDecision, RejectReason};
use crate::application::quota_ledger::QuotaError;
use crate::application::retry::retry_transient;
use crate::domain::{Admission, AuditJob};
use crate::error::{AppError, Result};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

/// Audit request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRequest {
    pub project_id: String,
    pub user_id: String,

    #[serde(default)]
    pub options: serde_json::Value,
}

/// Validate request fields
pub fn validate_request(req: &AuditRequest) -> Result<()> {
    if req.project_id.trim().is_empty() {
        return Err(AppError::Validation("project_id cannot be empty".to_string()));
    }
    if req.user_id.trim().is_empty() {
        return Err(AppError::Validation("user_id cannot be empty".to_string()));
    }
    if !(req.options.is_null() || req.options.is_object()) {
        return Err(AppError::Validation(
            "options must be a JSON object".to_string(),
        ));
    }
    Ok(())
}

fn rejected(reason: RejectReason) -> Result<DispatchDecision> {
    Ok(DispatchDecision::Rejected { reason })
}

/// Execute request-audit use case
///
/// Order matters: cheap local checks first, then crawler health (so an outage
/// never consumes quota), then the reservation, then the insert whose unique
/// index is the authoritative duplicate guard.
pub async fn execute(d: &AuditDispatcher, req: AuditRequest) -> Result<DispatchDecision> {
    validate_request(&req)?;
    let project_id = req.project_id.as_str();
    let user_id = req.user_id.as_str();

    // 1. Active job for this project
    match d.jobs.find_active_for_project(project_id).await {
        Ok(Some(active)) => {
            info!(project_id = %project_id, job_id = %active.id, "Audit already in progress");
            return rejected(RejectReason::AuditInProgress);
        }
        Ok(None) => {}
        Err(e) => {
            error!(project_id = %project_id, error = %e, "Active job lookup failed");
            return rejected(RejectReason::DatastoreError);
        }
    }

    // 2. Crawler availability
    let health = d.crawler.health_check().await;
    if !health.available {
        warn!(
            project_id = %project_id,
            latency_ms = health.latency_ms,
            "Crawler unavailable, rejecting audit"
        );
        return rejected(RejectReason::ServiceUnavailable);
    }

    // 3. Quota
    match d.ledger.check_and_reserve(user_id).await {
        Ok(Admission::Allowed { .. }) => {}
        Ok(Admission::Denied { .. }) => return rejected(RejectReason::LimitReached),
        Err(QuotaError::Unavailable(e)) => {
            error!(user_id = %user_id, error = %e, "Quota ledger unavailable, failing closed");
            return rejected(RejectReason::DatastoreError);
        }
    }

    // 4. Pending job
    let job = AuditJob::new(
        d.id_provider.generate_id(),
        d.time_provider.now_millis(),
        project_id,
        user_id,
        req.options.clone(),
    );
    if let Err(e) = d.jobs.insert_pending(&job).await {
        release_quota(d, user_id).await;
        return match e {
            AppError::Conflict(_) => {
                info!(project_id = %project_id, "Concurrent audit request lost the insert race");
                rejected(RejectReason::AuditInProgress)
            }
            other => {
                error!(project_id = %project_id, error = %other, "Failed to persist audit job");
                rejected(RejectReason::DatastoreError)
            }
        };
    }

    // 5. Remote start, at most once per successful attempt
    let timeout = Some(d.config.request_timeout);
    let crawler = &d.crawler;
    let options = &req.options;
    let started = retry_transient(&d.config.call_retry, "start_audit", move || {
        crawler.start_audit(project_id, options, timeout)
    })
    .await;

    let remote_job_id = match started {
        Ok(remote_job_id) => remote_job_id,
        Err(e) => {
            let now = d.time_provider.now_millis();
            let reason = format!("crawler start failed: {}", e);
            if let Err(db) = d.jobs.mark_failed(&job.id, &reason, now).await {
                error!(job_id = %job.id, error = %db, "Failed to mark audit job as failed");
            }
            release_quota(d, user_id).await;
            warn!(job_id = %job.id, project_id = %project_id, error = %e, "Audit start failed");
            return rejected(RejectReason::ServiceUnavailable);
        }
    };

    // 6. Pending -> Running
    let now = d.time_provider.now_millis();
    match d.jobs.mark_running(&job.id, &remote_job_id, now).await {
        Ok(true) => {
            info!(
                job_id = %job.id,
                project_id = %project_id,
                remote_job_id = %remote_job_id,
                "Audit started"
            );
            Ok(DispatchDecision::Admitted {
                job_id: job.id,
                remote_job_id,
            })
        }
        Ok(false) => Err(AppError::InvalidState(format!(
            "audit job {} left Pending before it was started",
            job.id
        ))),
        Err(e) => {
            // The remote audit runs but is not recorded; the pending sweep will fail it
            error!(
                job_id = %job.id,
                remote_job_id = %remote_job_id,
                error = %e,
                "Failed to record audit start"
            );
            rejected(RejectReason::DatastoreError)
        }
    }
}

async fn release_quota(d: &AuditDispatcher, user_id: &str) {
    if let Err(e) = d.ledger.release(user_id).await {
        error!(user_id = %user_id, error = %e, "Failed to release quota reservation");
    }
}
