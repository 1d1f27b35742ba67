// AuditDesk Infrastructure - SQLite Adapter
// Implements: QuotaRepository, AuditJobRepository, PdfJobRepository

mod audit_job_repository;
mod connection;
mod error;
mod migration;
mod pdf_job_repository;
mod quota_repository;

pub use audit_job_repository::SqliteAuditJobRepository;
pub use connection::create_pool;
pub use migration::run_migrations;
pub use pdf_job_repository::SqlitePdfJobRepository;
pub use quota_repository::SqliteQuotaRepository;

// Note: sqlx::Error conversion is handled by `error::map_sqlx_error`
// due to Rust's orphan rules (cannot implement From<sqlx::Error> for AppError here)
