// Port Layer - Interfaces for external dependencies

pub mod audit_job_repository;
pub mod crawler_gateway;
pub mod id_provider; // For deterministic testing
pub mod pdf_job_repository;
pub mod quota_repository;
pub mod render_dispatcher;
pub mod time_provider;

// Re-exports
pub use audit_job_repository::AuditJobRepository;
pub use crawler_gateway::{
    CrawlerGateway, CrawlerHealth, GatewayError, DEFAULT_CALL_TIMEOUT, HEALTH_CHECK_TIMEOUT,
};
pub use id_provider::IdProvider;
pub use pdf_job_repository::PdfJobRepository;
pub use quota_repository::QuotaRepository;
pub use render_dispatcher::{RenderDispatcher, RenderRequest};
pub use time_provider::TimeProvider;
