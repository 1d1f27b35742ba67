// PDF Job Domain Model

use serde::{Deserialize, Serialize};

use super::error::{DomainError, Result};

/// `last_error` recorded when the staleness sweep gives up on a job
pub const ABANDONED_ERROR: &str = "abandoned";

/// PDF job status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PdfStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

impl PdfStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, PdfStatus::Completed | PdfStatus::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PdfStatus::Queued => "QUEUED",
            PdfStatus::Processing => "PROCESSING",
            PdfStatus::Completed => "COMPLETED",
            PdfStatus::Failed => "FAILED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "QUEUED" => Some(PdfStatus::Queued),
            "PROCESSING" => Some(PdfStatus::Processing),
            "COMPLETED" => Some(PdfStatus::Completed),
            "FAILED" => Some(PdfStatus::Failed),
            _ => None,
        }
    }
}

impl std::fmt::Display for PdfStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Report theme understood by the render worker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PdfTheme {
    #[default]
    Light,
    Dark,
    Brand,
}

impl PdfTheme {
    pub fn as_str(self) -> &'static str {
        match self {
            PdfTheme::Light => "light",
            PdfTheme::Dark => "dark",
            PdfTheme::Brand => "brand",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "light" => Ok(PdfTheme::Light),
            "dark" => Ok(PdfTheme::Dark),
            "brand" => Ok(PdfTheme::Brand),
            other => Err(DomainError::ValidationError(format!(
                "unknown theme '{}'",
                other
            ))),
        }
    }
}

/// Outcome of a failure report on a job that may be retried
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryOutcome {
    /// Back to Queued; `attempts` is the new retry count
    Requeued { attempts: i32 },
    /// Attempts exhausted, job is Failed
    Failed,
}

/// PDF generation request and its lifecycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PdfJob {
    pub id: String,
    pub requested_by: String,
    pub project_id: String,
    pub template_id: String,
    pub theme: PdfTheme,
    pub status: PdfStatus,

    pub attempts: i32,
    pub max_attempts: i32,
    pub last_error: Option<String>,
    pub artifact_ref: Option<String>, // set only when Completed

    pub created_at: i64, // epoch ms
    pub updated_at: i64,
    pub heartbeat_at: Option<i64>,
    pub finished_at: Option<i64>,

    /// Row version, bumped by every persisted write (heartbeats included)
    #[serde(default)]
    pub version: i64,
}

impl PdfJob {
    pub fn new(
        id: impl Into<String>,
        created_at: i64,
        requested_by: impl Into<String>,
        project_id: impl Into<String>,
        template_id: impl Into<String>,
        theme: PdfTheme,
        max_attempts: i32,
    ) -> Self {
        Self {
            id: id.into(),
            requested_by: requested_by.into(),
            project_id: project_id.into(),
            template_id: template_id.into(),
            theme,
            status: PdfStatus::Queued,
            attempts: 0,
            max_attempts: max_attempts.max(0),
            last_error: None,
            artifact_ref: None,
            created_at,
            updated_at: created_at,
            heartbeat_at: None,
            finished_at: None,
            version: 0,
        }
    }

    /// Queued -> Processing (worker picked the job up)
    pub fn mark_processing(&mut self, now_millis: i64) -> Result<()> {
        self.ensure(PdfStatus::Queued, PdfStatus::Processing)?;
        self.status = PdfStatus::Processing;
        self.heartbeat_at = Some(now_millis);
        self.updated_at = now_millis;
        Ok(())
    }

    /// Worker liveness signal while Processing
    pub fn heartbeat(&mut self, now_millis: i64) -> Result<()> {
        self.ensure(PdfStatus::Processing, PdfStatus::Processing)?;
        self.heartbeat_at = Some(now_millis);
        self.updated_at = now_millis;
        Ok(())
    }

    /// Processing -> Completed
    pub fn complete(&mut self, artifact_ref: impl Into<String>, now_millis: i64) -> Result<()> {
        self.ensure(PdfStatus::Processing, PdfStatus::Completed)?;
        self.status = PdfStatus::Completed;
        self.artifact_ref = Some(artifact_ref.into());
        self.finished_at = Some(now_millis);
        self.updated_at = now_millis;
        Ok(())
    }

    /// Requeue for another attempt, or fail when attempts are exhausted.
    ///
    /// `attempts` never exceeds `max_attempts`.
    pub fn retry_or_fail(&mut self, error: impl Into<String>, now_millis: i64) -> Result<RetryOutcome> {
        self.ensure_active(PdfStatus::Queued)?;
        self.last_error = Some(error.into());
        self.updated_at = now_millis;

        if self.attempts < self.max_attempts {
            self.attempts += 1;
            self.status = PdfStatus::Queued;
            self.heartbeat_at = None;
            Ok(RetryOutcome::Requeued {
                attempts: self.attempts,
            })
        } else {
            self.status = PdfStatus::Failed;
            self.finished_at = Some(now_millis);
            Ok(RetryOutcome::Failed)
        }
    }

    /// Any non-terminal state -> Failed
    pub fn fail(&mut self, error: impl Into<String>, now_millis: i64) -> Result<()> {
        self.ensure_active(PdfStatus::Failed)?;
        self.status = PdfStatus::Failed;
        self.last_error = Some(error.into());
        self.finished_at = Some(now_millis);
        self.updated_at = now_millis;
        Ok(())
    }

    /// Processing job with no heartbeat for longer than `stale_after_ms`
    pub fn is_stale(&self, now_millis: i64, stale_after_ms: i64) -> bool {
        if self.status != PdfStatus::Processing {
            return false;
        }
        let last_seen = self.heartbeat_at.unwrap_or(self.updated_at);
        now_millis - last_seen > stale_after_ms
    }

    fn ensure(&self, expected: PdfStatus, to: PdfStatus) -> Result<()> {
        if self.status != expected {
            return Err(DomainError::InvalidStateTransition {
                from: self.status.to_string(),
                to: to.to_string(),
            });
        }
        Ok(())
    }

    fn ensure_active(&self, to: PdfStatus) -> Result<()> {
        if self.status.is_terminal() {
            return Err(DomainError::InvalidStateTransition {
                from: self.status.to_string(),
                to: to.to_string(),
            });
        }
        Ok(())
    }
}

/// Admin listing filter
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PdfJobFilter {
    pub status: Option<PdfStatus>,
    pub requested_by: Option<String>,
    pub project_id: Option<String>,
    pub limit: Option<i64>,
    #[serde(default)]
    pub offset: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queued(max_attempts: i32) -> PdfJob {
        PdfJob::new(
            "pdf-1",
            1_000,
            "user-1",
            "project-1",
            "template-1",
            PdfTheme::Dark,
            max_attempts,
        )
    }

    #[test]
    fn test_lifecycle() {
        let mut job = queued(3);
        job.mark_processing(2_000).unwrap();
        job.heartbeat(2_500).unwrap();
        job.complete("s3://reports/pdf-1.pdf", 3_000).unwrap();

        assert_eq!(job.status, PdfStatus::Completed);
        assert_eq!(job.artifact_ref.as_deref(), Some("s3://reports/pdf-1.pdf"));
        assert_eq!(job.finished_at, Some(3_000));
    }

    #[test]
    fn test_complete_requires_processing() {
        let mut job = queued(3);
        assert!(job.complete("artifact", 2_000).is_err());
        assert!(job.artifact_ref.is_none());
    }

    #[test]
    fn test_attempts_bounded_by_max() {
        let mut job = queued(2);

        for expected in 1..=2 {
            job.mark_processing(1_000).unwrap();
            let outcome = job.retry_or_fail("render crashed", 2_000).unwrap();
            assert_eq!(outcome, RetryOutcome::Requeued { attempts: expected });
            assert_eq!(job.status, PdfStatus::Queued);
        }

        job.mark_processing(3_000).unwrap();
        let outcome = job.retry_or_fail("render crashed again", 4_000).unwrap();
        assert_eq!(outcome, RetryOutcome::Failed);
        assert_eq!(job.status, PdfStatus::Failed);
        assert_eq!(job.attempts, 2);
        assert_eq!(job.last_error.as_deref(), Some("render crashed again"));

        // Only Failed is reachable now
        assert!(job.mark_processing(5_000).is_err());
        assert!(job.retry_or_fail("x", 5_000).is_err());
        assert!(job.attempts <= job.max_attempts);
    }

    #[test]
    fn test_staleness_uses_heartbeat() {
        let mut job = queued(3);
        assert!(!job.is_stale(1_000_000, 10));

        job.mark_processing(1_000).unwrap();
        assert!(!job.is_stale(1_010, 10));
        assert!(job.is_stale(1_011, 10));

        job.heartbeat(1_011).unwrap();
        assert!(!job.is_stale(1_015, 10));
    }

    #[test]
    fn test_theme_parse() {
        assert_eq!(PdfTheme::parse("").unwrap(), PdfTheme::Light);
        assert_eq!(PdfTheme::parse("DARK").unwrap(), PdfTheme::Dark);
        assert!(PdfTheme::parse("neon").is_err());
    }
}
