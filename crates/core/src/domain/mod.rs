// Domain Layer - Pure business logic and entities

pub mod audit_job;
pub mod error;
pub mod pdf_job;
pub mod quota;

// Re-exports
pub use audit_job::{AuditJob, AuditResult, AuditStatus, RemoteState, RemoteStatus};
pub use error::DomainError;
pub use pdf_job::{PdfJob, PdfJobFilter, PdfStatus, PdfTheme, RetryOutcome, ABANDONED_ERROR};
pub use quota::{Admission, DenialReason, QuotaPeriod, QuotaRecord, Tier};

/// Job ID (UUID v4)
pub type JobId = String;

/// User identifier (issued by the identity provider)
pub type UserId = String;

/// Project identifier
pub type ProjectId = String;
