//! RPC Request/Response Types
//!
//! Defines the JSON-RPC method parameters and results.

use auditdesk_core::application::{AuditSummary, PdfSummary};
use auditdesk_core::domain::{AuditJob, PdfJob, QuotaRecord, Tier};
use serde::{Deserialize, Serialize};

/// audit.request.v1 - Admit and start an audit
#[derive(Debug, Deserialize)]
pub struct AuditRequestParams {
    pub project_id: String,
    pub user_id: String,
    #[serde(default)]
    pub options: serde_json::Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct AuditRequestResponse {
    pub job_id: String,
    pub remote_job_id: String,
    pub status: String,
}

/// audit.status.v1 - Job snapshot, with the stored result once completed
#[derive(Debug, Deserialize)]
pub struct AuditStatusRequest {
    pub job_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AuditStatusResponse {
    pub job: AuditJob,
    pub result: Option<serde_json::Value>,
}

/// quota.usage.v1
#[derive(Debug, Deserialize)]
pub struct QuotaUsageRequest {
    pub user_id: String,
}

/// quota.set_tier.v1
#[derive(Debug, Deserialize)]
pub struct SetTierRequest {
    pub user_id: String,
    pub tier: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct QuotaUsageResponse {
    pub user_id: String,
    pub tier: Tier,
    pub period_start: i64,
    pub audits_used: i64,
    pub audits_limit: i64,
    pub remaining: i64,
}

impl From<QuotaRecord> for QuotaUsageResponse {
    fn from(record: QuotaRecord) -> Self {
        Self {
            remaining: record.remaining(),
            user_id: record.user_id,
            tier: record.tier,
            period_start: record.period_start,
            audits_used: record.audits_used,
            audits_limit: record.audits_limit,
        }
    }
}

/// pdf.enqueue.v1
#[derive(Debug, Deserialize)]
pub struct PdfEnqueueRequest {
    pub requested_by: String,
    pub project_id: String,
    pub template_id: String,
    #[serde(default)]
    pub theme: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PdfEnqueueResponse {
    pub job_id: String,
    pub status: String,
}

/// pdf.status.v1 - `wait_ms` blocks until the job is terminal or the wait ends
#[derive(Debug, Deserialize)]
pub struct PdfStatusRequest {
    pub job_id: String,
    #[serde(default)]
    pub wait_ms: Option<u64>,
}

/// admin.pdf_jobs.v1
#[derive(Debug, Clone, Serialize)]
pub struct PdfJobsResponse {
    pub jobs: Vec<PdfJob>,
}

/// admin.summary.v1
#[derive(Debug, Clone, Serialize)]
pub struct SummaryResponse {
    pub audits: AuditSummary,
    pub pdf_jobs: PdfSummary,
    pub uptime_seconds: i64,
}

/// pdf.processing.v1 / pdf.heartbeat.v1
#[derive(Debug, Deserialize)]
pub struct WorkerCallback {
    pub callback_token: String,
    pub job_id: String,
}

/// pdf.completed.v1
#[derive(Debug, Deserialize)]
pub struct WorkerCompleted {
    pub callback_token: String,
    pub job_id: String,
    pub artifact_ref: String,
}

/// pdf.failed.v1
#[derive(Debug, Deserialize)]
pub struct WorkerFailed {
    pub callback_token: String,
    pub job_id: String,
    pub error: String,
    #[serde(default = "default_retryable")]
    pub retryable: bool,
}

fn default_retryable() -> bool {
    true
}
