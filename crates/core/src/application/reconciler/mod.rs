// Reconciler - periodic convergence of jobs whose tracking was lost

mod shutdown;

pub use shutdown::{shutdown_channel, ShutdownSender, ShutdownToken};

use crate::application::audit::{AuditDispatcher, ReconcileReport};
use crate::application::constants::{DEFAULT_RECONCILE_INTERVAL, ERROR_RECOVERY_SLEEP_DURATION};
use crate::application::pdf_jobs::{PdfJobManager, SweepReport};
use crate::error::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, sleep, MissedTickBehavior};
use tracing::{error, info};

/// Runs the audit reconciliation and the PDF staleness sweep on a fixed period
pub struct Reconciler {
    audits: Arc<AuditDispatcher>,
    pdf_jobs: Arc<PdfJobManager>,
    period: Duration,
}

impl Reconciler {
    pub fn new(audits: Arc<AuditDispatcher>, pdf_jobs: Arc<PdfJobManager>) -> Self {
        Self {
            audits,
            pdf_jobs,
            period: DEFAULT_RECONCILE_INTERVAL,
        }
    }

    pub fn with_period(mut self, period: Duration) -> Self {
        self.period = period;
        self
    }

    /// One pass of both sweeps. A failing sweep does not prevent the other.
    pub async fn run_once(&self) -> Result<(ReconcileReport, SweepReport)> {
        let audits = self.audits.reconcile_running().await;
        let pdfs = self.pdf_jobs.reconcile().await;
        Ok((audits?, pdfs?))
    }

    /// Loop until shutdown. The first pass runs one period after start;
    /// callers that need a pass at boot call `run_once` first.
    pub async fn run(&self, mut shutdown: ShutdownToken) -> Result<()> {
        info!(period_secs = self.period.as_secs(), "Reconciler started");
        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // interval completes its first tick immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {},
                _ = shutdown.cancelled() => break,
            }

            if let Err(e) = self.run_once().await {
                error!(error = %e, "Reconciliation pass failed");
                tokio::select! {
                    _ = sleep(ERROR_RECOVERY_SLEEP_DURATION) => {},
                    _ = shutdown.cancelled() => break,
                }
            }
        }

        info!("Reconciler stopped");
        Ok(())
    }
}
