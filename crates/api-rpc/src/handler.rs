//! RPC Method Handlers
//!
//! Thin adapters from JSON-RPC params onto the application services.

use crate::error::{quota_to_rpc_error, reject_to_rpc_error, to_rpc_error};
use crate::types::{
    AuditRequestParams, AuditRequestResponse, AuditStatusRequest, AuditStatusResponse,
    PdfEnqueueRequest, PdfEnqueueResponse, PdfJobsResponse, PdfStatusRequest, QuotaUsageRequest,
    QuotaUsageResponse, SetTierRequest, SummaryResponse, WorkerCallback, WorkerCompleted,
    WorkerFailed,
};
use auditdesk_core::application::{
    AuditDispatcher, AuditRequest, DispatchDecision, PdfJobManager, PdfRequest, QuotaLedger,
};
use auditdesk_core::domain::{AuditStatus, PdfJob, PdfJobFilter, PdfStatus, Tier};
use auditdesk_core::error::AppError;
use jsonrpsee::types::ErrorObjectOwned;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// RPC Handler with injected services
pub struct RpcHandler {
    audits: Arc<AuditDispatcher>,
    ledger: Arc<QuotaLedger>,
    pdf_jobs: Arc<PdfJobManager>,
    callback_token: String,
    start_time: std::time::Instant,
}

impl RpcHandler {
    pub fn new(
        audits: Arc<AuditDispatcher>,
        ledger: Arc<QuotaLedger>,
        pdf_jobs: Arc<PdfJobManager>,
        callback_token: impl Into<String>,
    ) -> Self {
        Self {
            audits,
            ledger,
            pdf_jobs,
            callback_token: callback_token.into(),
            start_time: std::time::Instant::now(),
        }
    }

    /// audit.request.v1
    ///
    /// Admitted audits are tracked in a background task; the caller gets the
    /// job id straight away and follows up with `audit.status.v1`.
    pub async fn request_audit(
        &self,
        params: AuditRequestParams,
    ) -> Result<AuditRequestResponse, ErrorObjectOwned> {
        let req = AuditRequest {
            project_id: params.project_id,
            user_id: params.user_id,
            options: params.options,
        };

        match self.audits.request_audit(req).await.map_err(to_rpc_error)? {
            DispatchDecision::Admitted {
                job_id,
                remote_job_id,
            } => {
                self.spawn_tracking(job_id.clone());
                Ok(AuditRequestResponse {
                    job_id,
                    remote_job_id,
                    status: AuditStatus::Running.as_str().to_string(),
                })
            }
            DispatchDecision::Rejected { reason } => Err(reject_to_rpc_error(reason)),
        }
    }

    fn spawn_tracking(&self, job_id: String) {
        let audits = self.audits.clone();
        tokio::spawn(async move {
            match audits.track(&job_id).await {
                Ok(outcome) => info!(job_id = %job_id, outcome = ?outcome, "Audit tracking finished"),
                // The reconciliation sweep picks the job up again
                Err(e) => warn!(job_id = %job_id, error = %e, "Audit tracking aborted"),
            }
        });
    }

    /// audit.status.v1
    pub async fn audit_status(
        &self,
        params: AuditStatusRequest,
    ) -> Result<AuditStatusResponse, ErrorObjectOwned> {
        let job = self
            .audits
            .get_status(&params.job_id)
            .await
            .map_err(to_rpc_error)?;

        let result = if job.status == AuditStatus::Completed {
            self.audits
                .get_result(&params.job_id)
                .await
                .map_err(to_rpc_error)?
                .map(|r| r.into_value())
        } else {
            None
        };

        Ok(AuditStatusResponse { job, result })
    }

    /// quota.usage.v1
    pub async fn quota_usage(
        &self,
        params: QuotaUsageRequest,
    ) -> Result<QuotaUsageResponse, ErrorObjectOwned> {
        require_id("user_id", &params.user_id)?;
        let record = self
            .ledger
            .usage(&params.user_id)
            .await
            .map_err(quota_to_rpc_error)?;
        Ok(record.into())
    }

    /// quota.set_tier.v1
    pub async fn set_tier(
        &self,
        params: SetTierRequest,
    ) -> Result<QuotaUsageResponse, ErrorObjectOwned> {
        require_id("user_id", &params.user_id)?;
        let tier: Tier = params
            .tier
            .parse()
            .map_err(|e| to_rpc_error(AppError::Domain(e)))?;

        let record = self
            .ledger
            .set_tier(&params.user_id, tier)
            .await
            .map_err(quota_to_rpc_error)?;
        info!(user_id = %params.user_id, tier = %tier, "Tier changed");
        Ok(record.into())
    }

    /// pdf.enqueue.v1
    pub async fn enqueue_pdf(
        &self,
        params: PdfEnqueueRequest,
    ) -> Result<PdfEnqueueResponse, ErrorObjectOwned> {
        let req = PdfRequest {
            requested_by: params.requested_by,
            project_id: params.project_id,
            template_id: params.template_id,
            theme: params.theme,
        };

        let job_id = self.pdf_jobs.enqueue(req).await.map_err(to_rpc_error)?;

        Ok(PdfEnqueueResponse {
            job_id,
            status: PdfStatus::Queued.as_str().to_string(),
        })
    }

    /// pdf.status.v1
    pub async fn pdf_status(&self, params: PdfStatusRequest) -> Result<PdfJob, ErrorObjectOwned> {
        match params.wait_ms {
            Some(wait_ms) => self
                .pdf_jobs
                .await_terminal(&params.job_id, Some(Duration::from_millis(wait_ms)))
                .await
                .map_err(to_rpc_error),
            None => self
                .pdf_jobs
                .get_status(&params.job_id)
                .await
                .map_err(to_rpc_error),
        }
    }

    /// admin.pdf_jobs.v1
    pub async fn list_pdf_jobs(
        &self,
        filter: Option<PdfJobFilter>,
    ) -> Result<PdfJobsResponse, ErrorObjectOwned> {
        let jobs = self
            .pdf_jobs
            .list_jobs(filter.unwrap_or_default())
            .await
            .map_err(to_rpc_error)?;
        Ok(PdfJobsResponse { jobs })
    }

    /// admin.summary.v1
    pub async fn summary(&self) -> Result<SummaryResponse, ErrorObjectOwned> {
        let audits = self.audits.summary().await.map_err(to_rpc_error)?;
        let pdf_jobs = self.pdf_jobs.summary().await.map_err(to_rpc_error)?;

        Ok(SummaryResponse {
            audits,
            pdf_jobs,
            uptime_seconds: self.start_time.elapsed().as_secs() as i64,
        })
    }

    /// pdf.processing.v1
    pub async fn pdf_processing(&self, params: WorkerCallback) -> Result<PdfJob, ErrorObjectOwned> {
        self.authorize(&params.callback_token)?;
        self.pdf_jobs
            .mark_processing(&params.job_id)
            .await
            .map_err(to_rpc_error)
    }

    /// pdf.heartbeat.v1
    pub async fn pdf_heartbeat(&self, params: WorkerCallback) -> Result<PdfJob, ErrorObjectOwned> {
        self.authorize(&params.callback_token)?;
        self.pdf_jobs
            .heartbeat(&params.job_id)
            .await
            .map_err(to_rpc_error)
    }

    /// pdf.completed.v1
    pub async fn pdf_completed(
        &self,
        params: WorkerCompleted,
    ) -> Result<PdfJob, ErrorObjectOwned> {
        self.authorize(&params.callback_token)?;
        self.pdf_jobs
            .mark_completed(&params.job_id, &params.artifact_ref)
            .await
            .map_err(to_rpc_error)
    }

    /// pdf.failed.v1
    pub async fn pdf_failed(&self, params: WorkerFailed) -> Result<PdfJob, ErrorObjectOwned> {
        self.authorize(&params.callback_token)?;
        self.pdf_jobs
            .mark_failed(&params.job_id, &params.error, params.retryable)
            .await
            .map_err(to_rpc_error)
    }

    /// Worker callbacks must present the configured callback token
    fn authorize(&self, token: &str) -> Result<(), ErrorObjectOwned> {
        if self.callback_token.is_empty() || token != self.callback_token {
            warn!("Rejected worker callback with invalid token");
            return Err(to_rpc_error(AppError::Unauthorized(
                "invalid callback token".to_string(),
            )));
        }
        Ok(())
    }
}

fn require_id(field: &str, value: &str) -> Result<(), ErrorObjectOwned> {
    if value.trim().is_empty() {
        return Err(to_rpc_error(AppError::Validation(format!(
            "{} is required",
            field
        ))));
    }
    Ok(())
}
