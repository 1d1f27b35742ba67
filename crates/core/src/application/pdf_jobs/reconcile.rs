// PDF staleness sweep
use super::PdfJobManager;
use crate::domain::{PdfStatus, RetryOutcome, ABANDONED_ERROR};
use crate::error::Result;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

const DISPATCH_TIMEOUT_ERROR: &str = "not picked up by render worker";

/// Outcome of one sweep
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    /// Processing jobs failed for lack of heartbeat
    pub abandoned: usize,
    /// Queued jobs handed to the worker again
    pub redispatched: usize,
    /// Queued jobs failed because their attempts ran out
    pub exhausted: usize,
}

/// Sweep stale jobs
///
/// 1. Processing with no heartbeat for `stale_after_ms` -> Failed("abandoned")
/// 2. Queued and untouched for `dispatch_timeout_ms` -> one retry attempt and a
///    fresh dispatch, or Failed once attempts are exhausted
///
/// Lost compare-and-set races are skipped: another writer (a late heartbeat or
/// a worker callback) already touched the job.
pub async fn sweep(m: &PdfJobManager) -> Result<SweepReport> {
    let now = m.time_provider.now_millis();
    let mut report = SweepReport::default();

    let stale_cutoff = now - m.config.stale_after_ms;
    for mut job in m.repo.find_inactive(PdfStatus::Processing, stale_cutoff).await? {
        if !job.is_stale(now, m.config.stale_after_ms) {
            continue;
        }
        job.fail(ABANDONED_ERROR, now)?;
        if m.repo.update_if(&job).await? {
            warn!(
                job_id = %job.id,
                last_heartbeat = ?job.heartbeat_at,
                "PDF job abandoned by render worker"
            );
            report.abandoned += 1;
        }
    }

    let dispatch_cutoff = now - m.config.dispatch_timeout_ms;
    for mut job in m.repo.find_inactive(PdfStatus::Queued, dispatch_cutoff).await? {
        let outcome = job.retry_or_fail(DISPATCH_TIMEOUT_ERROR, now)?;
        if !m.repo.update_if(&job).await? {
            continue;
        }
        match outcome {
            RetryOutcome::Requeued { attempts } => {
                info!(job_id = %job.id, attempts = attempts, "Re-dispatching queued PDF job");
                m.dispatch(&job).await;
                report.redispatched += 1;
            }
            RetryOutcome::Failed => {
                error!(job_id = %job.id, "PDF job never picked up, attempts exhausted");
                report.exhausted += 1;
            }
        }
    }

    if report != SweepReport::default() {
        info!(
            abandoned = report.abandoned,
            redispatched = report.redispatched,
            exhausted = report.exhausted,
            "PDF sweep complete"
        );
    }
    Ok(report)
}
