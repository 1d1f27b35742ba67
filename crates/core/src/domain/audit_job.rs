// Audit Job Domain Model

use serde::{Deserialize, Serialize};

use super::error::{DomainError, Result};

/// Audit job status. Monotonic: Pending -> Running -> {Completed | Failed}
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl AuditStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, AuditStatus::Completed | AuditStatus::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AuditStatus::Pending => "PENDING",
            AuditStatus::Running => "RUNNING",
            AuditStatus::Completed => "COMPLETED",
            AuditStatus::Failed => "FAILED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(AuditStatus::Pending),
            "RUNNING" => Some(AuditStatus::Running),
            "COMPLETED" => Some(AuditStatus::Completed),
            "FAILED" => Some(AuditStatus::Failed),
            _ => None,
        }
    }
}

impl std::fmt::Display for AuditStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Audit job, mirrored locally while the crawler runs it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditJob {
    pub id: String,
    pub project_id: String,
    pub user_id: String,
    pub remote_job_id: Option<String>,
    pub status: AuditStatus,
    pub options: serde_json::Value,

    pub created_at: i64, // epoch ms
    pub started_at: Option<i64>,
    pub completed_at: Option<i64>,

    pub result_ref: Option<String>, // set only when Completed
    pub failure_reason: Option<String>,

    /// Last status poll by a live tracker
    #[serde(default)]
    pub last_polled_at: Option<i64>,
}

impl AuditJob {
    /// Create a Pending job
    ///
    /// ID and timestamp are injected (IdProvider / TimeProvider)
    pub fn new(
        id: impl Into<String>,
        created_at: i64,
        project_id: impl Into<String>,
        user_id: impl Into<String>,
        options: serde_json::Value,
    ) -> Self {
        Self {
            id: id.into(),
            project_id: project_id.into(),
            user_id: user_id.into(),
            remote_job_id: None,
            status: AuditStatus::Pending,
            options,
            created_at,
            started_at: None,
            completed_at: None,
            result_ref: None,
            failure_reason: None,
            last_polled_at: None,
        }
    }

    /// Pending -> Running, once the crawler accepted the job
    pub fn start(&mut self, remote_job_id: impl Into<String>, now_millis: i64) -> Result<()> {
        self.ensure(AuditStatus::Pending, AuditStatus::Running)?;
        self.status = AuditStatus::Running;
        self.remote_job_id = Some(remote_job_id.into());
        self.started_at = Some(now_millis);
        Ok(())
    }

    /// Running -> Completed with the stored result reference
    pub fn complete(&mut self, result_ref: impl Into<String>, now_millis: i64) -> Result<()> {
        self.ensure(AuditStatus::Running, AuditStatus::Completed)?;
        self.status = AuditStatus::Completed;
        self.result_ref = Some(result_ref.into());
        self.completed_at = Some(now_millis);
        Ok(())
    }

    /// Pending | Running -> Failed
    pub fn fail(&mut self, reason: impl Into<String>, now_millis: i64) -> Result<()> {
        if self.status.is_terminal() {
            return Err(DomainError::InvalidStateTransition {
                from: self.status.to_string(),
                to: AuditStatus::Failed.to_string(),
            });
        }
        self.status = AuditStatus::Failed;
        self.failure_reason = Some(reason.into());
        self.completed_at = Some(now_millis);
        Ok(())
    }

    /// A tracker polled this job less than `lease_ms` ago
    pub fn recently_polled(&self, now_millis: i64, lease_ms: i64) -> bool {
        self.last_polled_at
            .map_or(false, |polled| now_millis - polled < lease_ms)
    }

    /// Deadline for tracking (epoch ms), measured from `started_at`
    pub fn poll_deadline(&self, max_poll_ms: i64) -> Option<i64> {
        self.started_at.map(|started| started + max_poll_ms)
    }

    fn ensure(&self, expected: AuditStatus, to: AuditStatus) -> Result<()> {
        if self.status != expected {
            return Err(DomainError::InvalidStateTransition {
                from: self.status.to_string(),
                to: to.to_string(),
            });
        }
        Ok(())
    }
}

/// Remote job state as reported by the crawler
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RemoteState {
    Queued,
    Running,
    Completed,
    Failed,
    Unknown(String),
}

impl RemoteState {
    /// Map a crawler state string (case-insensitive)
    pub fn from_wire(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "queued" | "pending" => RemoteState::Queued,
            "running" | "processing" | "in_progress" => RemoteState::Running,
            "completed" | "done" | "success" => RemoteState::Completed,
            "failed" | "error" | "cancelled" => RemoteState::Failed,
            _ => RemoteState::Unknown(raw.to_string()),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RemoteState::Completed | RemoteState::Failed)
    }
}

/// Status snapshot of a remote audit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteStatus {
    pub state: RemoteState,
    pub progress: Option<f64>,
}

/// Full crawler results payload (opaque)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditResult(serde_json::Value);

impl AuditResult {
    pub fn new(value: serde_json::Value) -> Self {
        Self(value)
    }

    pub fn as_value(&self) -> &serde_json::Value {
        &self.0
    }

    pub fn into_value(self) -> serde_json::Value {
        self.0
    }
}
