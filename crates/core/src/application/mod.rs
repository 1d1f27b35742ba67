// Application Layer - Use Cases and Business Logic

pub mod audit;
pub mod constants;
pub mod pdf_jobs;
pub mod poller;
pub mod quota_ledger;
pub mod reconciler;
pub mod retry;

// Re-exports
pub use audit::{
    AuditDispatcher, AuditRequest, AuditSummary, DispatchConfig, DispatchDecision, RejectReason,
    TrackOutcome,
};
pub use pdf_jobs::{PdfConfig, PdfJobManager, PdfRequest, PdfSummary, SweepReport};
pub use poller::{poll_until, poll_until_deadline, PollConfig, PollOutcome, PollStep};
pub use quota_ledger::{QuotaError, QuotaLedger};
pub use reconciler::{shutdown_channel, Reconciler, ShutdownSender, ShutdownToken};
pub use retry::{retry_transient, BackoffPolicy};
