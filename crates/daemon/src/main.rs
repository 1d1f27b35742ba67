//! AuditDesk - Main Entry Point
//! Composition root: config, logging, DI wiring, reconciliation loop, RPC server

mod logging;
mod settings;

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use auditdesk_api_rpc::{RpcHandler, RpcServer, RpcServerConfig};
use auditdesk_core::application::{
    shutdown_channel, AuditDispatcher, DispatchConfig, PdfConfig, PdfJobManager, QuotaLedger,
    Reconciler,
};
use auditdesk_core::port::id_provider::UuidProvider;
use auditdesk_core::port::time_provider::SystemTimeProvider;
use auditdesk_infra_http::{
    CrawlerConfig, HttpCrawlerGateway, HttpRenderDispatcher, RenderWorkerConfig,
};
use auditdesk_infra_sqlite::{
    create_pool, run_migrations, SqliteAuditJobRepository, SqlitePdfJobRepository,
    SqliteQuotaRepository,
};
use settings::Settings;

const VERSION: &str = env!("CARGO_PKG_VERSION");
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Configuration, then logging (the log section lives in the config)
    let settings = Settings::load()?;
    let _log_guard = logging::init_logging(&settings.log)?;

    info!("AuditDesk v{} starting...", VERSION);
    if settings.worker.callback_token.is_empty() {
        warn!("worker.callback_token is empty; render worker callbacks will be refused");
    }

    // 2. Database
    let database_url = settings.database_url();
    info!(database_url = %database_url, "Initializing database...");
    let pool = create_pool(&database_url)
        .await
        .context("DB pool creation failed")?;
    run_migrations(&pool).await.context("Migration failed")?;

    // 3. DI wiring
    let time_provider = Arc::new(SystemTimeProvider);
    let id_provider = Arc::new(UuidProvider);

    let ledger = Arc::new(QuotaLedger::new(
        Arc::new(SqliteQuotaRepository::new(pool.clone())),
        time_provider.clone(),
        settings.quota_period()?,
    ));

    let crawler = Arc::new(
        HttpCrawlerGateway::new(
            CrawlerConfig {
                base_url: settings.crawler.base_url.clone(),
                health_timeout: Duration::from_millis(settings.crawler.health_timeout_ms),
                request_timeout: Duration::from_millis(settings.crawler.request_timeout_ms),
            },
            time_provider.clone(),
        )
        .context("Crawler gateway setup failed")?,
    );

    let dispatch_config = DispatchConfig {
        request_timeout: Duration::from_millis(settings.crawler.request_timeout_ms),
        max_poll_duration: settings.max_poll_duration(),
        ..DispatchConfig::default()
    };
    let audits = Arc::new(AuditDispatcher::new(
        Arc::new(SqliteAuditJobRepository::new(pool.clone())),
        ledger.clone(),
        crawler,
        id_provider.clone(),
        time_provider.clone(),
        dispatch_config,
    ));

    let render = Arc::new(
        HttpRenderDispatcher::new(RenderWorkerConfig::new(
            settings.worker.base_url.clone(),
            settings.worker.token.clone(),
            settings.worker.caller_id.clone(),
        ))
        .context("Render dispatcher setup failed")?,
    );
    let stale_after_ms = settings.pdf.stale_after_minutes * 60_000;
    let pdf_jobs = Arc::new(PdfJobManager::new(
        Arc::new(SqlitePdfJobRepository::new(pool.clone())),
        render,
        id_provider,
        time_provider,
        PdfConfig {
            max_attempts: settings.pdf.max_attempts,
            stale_after_ms,
            dispatch_timeout_ms: stale_after_ms,
            ..PdfConfig::default()
        },
    ));

    // 4. Startup reconciliation: settle whatever a previous run left in flight
    let reconciler = Reconciler::new(audits.clone(), pdf_jobs.clone())
        .with_period(settings.reconcile_interval());
    match reconciler.run_once().await {
        Ok((audit_report, pdf_report)) => info!(
            audits = ?audit_report,
            pdf_jobs = ?pdf_report,
            "Startup reconciliation completed"
        ),
        Err(e) => error!(error = %e, "Startup reconciliation failed"),
    }

    // 5. JSON-RPC server
    let handler = Arc::new(RpcHandler::new(
        audits,
        ledger,
        pdf_jobs,
        settings.worker.callback_token.clone(),
    ));
    let rpc_config = RpcServerConfig {
        host: settings.rpc.host.clone(),
        port: settings.rpc.port,
    };
    let (rpc_addr, rpc_handle) = RpcServer::new(rpc_config, handler)
        .start()
        .await
        .map_err(|e| anyhow::anyhow!("RPC server start failed: {}", e))?;

    // 6. Periodic reconciliation, first pass one period after the startup pass
    let (shutdown_tx, shutdown_rx) = shutdown_channel();
    let reconciler_handle = tokio::spawn(async move {
        if let Err(e) = reconciler.run(shutdown_rx).await {
            error!(error = %e, "Reconciler failed");
        }
    });

    info!(rpc_addr = %rpc_addr, "System ready. Press Ctrl+C to shutdown");

    // 7. Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received. Exiting gracefully...");

    shutdown_tx.shutdown();
    rpc_handle
        .stop()
        .map_err(|e| anyhow::anyhow!("RPC server stop failed: {}", e))?;
    if tokio::time::timeout(SHUTDOWN_GRACE, reconciler_handle)
        .await
        .is_err()
    {
        warn!("Reconciler did not stop within the grace period");
    }
    pool.close().await;

    info!("Shutdown complete.");
    Ok(())
}
