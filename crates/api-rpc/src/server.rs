//! JSON-RPC Server
//!
//! Serves the JSON-RPC 2.0 methods over HTTP on a localhost TCP port.

use crate::handler::RpcHandler;
use crate::types::{
    AuditRequestParams, AuditStatusRequest, PdfEnqueueRequest, PdfStatusRequest,
    QuotaUsageRequest, SetTierRequest, WorkerCallback, WorkerCompleted, WorkerFailed,
};
use auditdesk_core::domain::PdfJobFilter;
use jsonrpsee::server::{Server, ServerHandle};
use jsonrpsee::RpcModule;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

const DEFAULT_RPC_HOST: &str = "127.0.0.1";
const DEFAULT_RPC_PORT: u16 = 9637;

/// RPC Server Configuration
#[derive(Debug, Clone)]
pub struct RpcServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for RpcServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_RPC_HOST.to_string(),
            port: DEFAULT_RPC_PORT,
        }
    }
}

/// Registers `$method`, parsing params into `$params` and calling `$call`
macro_rules! register {
    ($module:expr, $handler:expr, $method:literal, $params:ty, $call:ident) => {{
        let handler = $handler.clone();
        $module
            .register_async_method($method, move |params, _, _| {
                let handler = handler.clone();
                async move {
                    let req: $params = params.parse()?;
                    handler.$call(req).await
                }
            })
            .map_err(|e| e.to_string())?;
    }};
}

/// RPC Server
pub struct RpcServer {
    config: RpcServerConfig,
    handler: Arc<RpcHandler>,
}

impl RpcServer {
    pub fn new(config: RpcServerConfig, handler: Arc<RpcHandler>) -> Self {
        Self { config, handler }
    }

    /// Start the JSON-RPC server.
    ///
    /// Returns the bound address (port 0 picks a free one) and the handle
    /// used to stop it.
    pub async fn start(self) -> Result<(SocketAddr, ServerHandle), String> {
        let addr = format!("{}:{}", self.config.host, self.config.port);

        let server = Server::builder()
            .build(&addr)
            .await
            .map_err(|e| format!("Failed to build server on {}: {}", addr, e))?;
        let local_addr = server
            .local_addr()
            .map_err(|e| format!("Failed to read bound address: {}", e))?;

        let module = self.build_module()?;
        info!(addr = %local_addr, "JSON-RPC server started");

        Ok((local_addr, server.start(module)))
    }

    fn build_module(&self) -> Result<RpcModule<()>, String> {
        let mut module = RpcModule::new(());

        // Audits and quota
        register!(module, self.handler, "audit.request.v1", AuditRequestParams, request_audit);
        register!(module, self.handler, "audit.status.v1", AuditStatusRequest, audit_status);
        register!(module, self.handler, "quota.usage.v1", QuotaUsageRequest, quota_usage);
        register!(module, self.handler, "quota.set_tier.v1", SetTierRequest, set_tier);

        // PDF jobs
        register!(module, self.handler, "pdf.enqueue.v1", PdfEnqueueRequest, enqueue_pdf);
        register!(module, self.handler, "pdf.status.v1", PdfStatusRequest, pdf_status);

        // Admin (read-only)
        register!(module, self.handler, "admin.pdf_jobs.v1", Option<PdfJobFilter>, list_pdf_jobs);
        let handler = self.handler.clone();
        module
            .register_async_method("admin.summary.v1", move |_, _, _| {
                let handler = handler.clone();
                async move { handler.summary().await }
            })
            .map_err(|e| e.to_string())?;

        // Render worker callbacks
        register!(module, self.handler, "pdf.processing.v1", WorkerCallback, pdf_processing);
        register!(module, self.handler, "pdf.heartbeat.v1", WorkerCallback, pdf_heartbeat);
        register!(module, self.handler, "pdf.completed.v1", WorkerCompleted, pdf_completed);
        register!(module, self.handler, "pdf.failed.v1", WorkerFailed, pdf_failed);

        Ok(module)
    }
}
