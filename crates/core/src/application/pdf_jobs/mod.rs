// PDF Job Manager - lifecycle of report renders handed to the render worker

pub mod enqueue;
pub mod reconcile;

pub use enqueue::PdfRequest;
pub use reconcile::SweepReport;

use crate::application::constants::*;
use crate::application::poller::{poll_until, PollConfig, PollOutcome, PollStep};
use crate::application::retry::BackoffPolicy;
use crate::domain::{PdfJob, PdfJobFilter, PdfStatus};
use crate::error::{AppError, Result};
use crate::port::{IdProvider, PdfJobRepository, RenderDispatcher, RenderRequest, TimeProvider};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Default page size for admin listings
const DEFAULT_LIST_LIMIT: i64 = 50;
const MAX_LIST_LIMIT: i64 = 500;

/// PDF manager tuning
#[derive(Debug, Clone)]
pub struct PdfConfig {
    pub max_attempts: i32,
    pub stale_after_ms: i64,
    pub dispatch_timeout_ms: i64,
    /// Polling used by `await_terminal`
    pub await_poll: PollConfig,
}

impl Default for PdfConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_PDF_MAX_ATTEMPTS,
            stale_after_ms: DEFAULT_PDF_STALE_AFTER_MS,
            dispatch_timeout_ms: DEFAULT_PDF_DISPATCH_TIMEOUT_MS,
            await_poll: PollConfig {
                backoff: BackoffPolicy {
                    initial: DEFAULT_PDF_AWAIT_INTERVAL,
                    ..BackoffPolicy::default()
                },
                ..PollConfig::default()
            },
        }
    }
}

/// Job counts for the admin dashboard
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PdfSummary {
    pub queued: i64,
    pub processing: i64,
    pub completed: i64,
    pub failed: i64,
}

/// PDF Job Manager
///
/// Every transition is validated by the domain model, then persisted with a
/// compare-and-set on the row version before it is reported.
pub struct PdfJobManager {
    repo: Arc<dyn PdfJobRepository>,
    dispatcher: Arc<dyn RenderDispatcher>,
    id_provider: Arc<dyn IdProvider>,
    time_provider: Arc<dyn TimeProvider>,
    config: PdfConfig,
}

impl PdfJobManager {
    pub fn new(
        repo: Arc<dyn PdfJobRepository>,
        dispatcher: Arc<dyn RenderDispatcher>,
        id_provider: Arc<dyn IdProvider>,
        time_provider: Arc<dyn TimeProvider>,
        config: PdfConfig,
    ) -> Self {
        Self {
            repo,
            dispatcher,
            id_provider,
            time_provider,
            config,
        }
    }

    /// Persist a Queued job and hand it to the render worker.
    ///
    /// A failed dispatch leaves the job Queued for the sweep to retry.
    pub async fn enqueue(&self, req: PdfRequest) -> Result<String> {
        let job = enqueue::execute(
            self.repo.as_ref(),
            self.id_provider.as_ref(),
            self.time_provider.as_ref(),
            self.config.max_attempts,
            req,
        )
        .await?;
        info!(
            job_id = %job.id,
            project_id = %job.project_id,
            template_id = %job.template_id,
            theme = %job.theme.as_str(),
            "PDF job queued"
        );
        self.dispatch(&job).await;
        Ok(job.id)
    }

    pub async fn get_status(&self, job_id: &str) -> Result<PdfJob> {
        self.repo
            .find_by_id(job_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("pdf job {}", job_id)))
    }

    /// Admin listing, newest first
    pub async fn list_jobs(&self, filter: PdfJobFilter) -> Result<Vec<PdfJob>> {
        let mut filter = filter;
        filter.limit = Some(
            filter
                .limit
                .unwrap_or(DEFAULT_LIST_LIMIT)
                .clamp(1, MAX_LIST_LIMIT),
        );
        filter.offset = filter.offset.max(0);
        self.repo.list(&filter).await
    }

    /// Queued -> Processing
    pub async fn mark_processing(&self, job_id: &str) -> Result<PdfJob> {
        let now = self.time_provider.now_millis();
        self.transition(job_id, |job| Ok(job.mark_processing(now)?))
            .await
    }

    /// Worker liveness while Processing
    pub async fn heartbeat(&self, job_id: &str) -> Result<PdfJob> {
        let now = self.time_provider.now_millis();
        self.transition(job_id, |job| Ok(job.heartbeat(now)?)).await
    }

    /// Processing -> Completed
    pub async fn mark_completed(&self, job_id: &str, artifact_ref: &str) -> Result<PdfJob> {
        if artifact_ref.trim().is_empty() {
            return Err(AppError::Validation(
                "artifact_ref cannot be empty".to_string(),
            ));
        }
        let now = self.time_provider.now_millis();
        let job = self
            .transition(job_id, |job| Ok(job.complete(artifact_ref, now)?))
            .await?;
        info!(job_id = %job.id, artifact_ref = %artifact_ref, "PDF job completed");
        Ok(job)
    }

    /// Worker-reported failure. Retryable failures go back to Queued while
    /// attempts remain and are dispatched again.
    pub async fn mark_failed(&self, job_id: &str, error: &str, retryable: bool) -> Result<PdfJob> {
        let now = self.time_provider.now_millis();
        let job = self
            .transition(job_id, |job| {
                if retryable {
                    job.retry_or_fail(error, now)?;
                } else {
                    job.fail(error, now)?;
                }
                Ok(())
            })
            .await?;

        if job.status == PdfStatus::Queued {
            info!(job_id = %job.id, attempts = job.attempts, error = %error, "PDF job requeued");
            self.dispatch(&job).await;
        } else {
            warn!(job_id = %job.id, attempts = job.attempts, error = %error, "PDF job failed");
        }
        Ok(job)
    }

    /// Staleness sweep
    pub async fn reconcile(&self) -> Result<SweepReport> {
        reconcile::sweep(self).await
    }

    /// Wait until the job is Completed or Failed.
    ///
    /// Returns the latest snapshot, which is still non-terminal if `max_wait`
    /// elapsed first.
    pub async fn await_terminal(&self, job_id: &str, max_wait: Option<Duration>) -> Result<PdfJob> {
        let mut config = self.config.await_poll.clone();
        if let Some(max_wait) = max_wait {
            config.max_wait = max_wait;
        }

        let repo = &self.repo;
        let outcome = poll_until(&config, move || async move {
            match repo.find_by_id(job_id).await {
                Ok(Some(job)) if job.status.is_terminal() => PollStep::Done(job),
                Ok(Some(_)) => PollStep::Pending,
                Ok(None) => PollStep::Error(AppError::NotFound(format!("pdf job {}", job_id))),
                Err(e) => PollStep::Error(e),
            }
        })
        .await;

        match outcome {
            PollOutcome::Ready(job) => Ok(job),
            PollOutcome::DeadlineExceeded { .. } => self.get_status(job_id).await,
            PollOutcome::Exhausted { last_error, .. } => Err(last_error),
        }
    }

    pub async fn summary(&self) -> Result<PdfSummary> {
        let counts = self.repo.count_by_status().await?;
        let count = |status| counts.get(&status).copied().unwrap_or(0);
        Ok(PdfSummary {
            queued: count(PdfStatus::Queued),
            processing: count(PdfStatus::Processing),
            completed: count(PdfStatus::Completed),
            failed: count(PdfStatus::Failed),
        })
    }

    /// Load, apply a domain transition, compare-and-set
    async fn transition<F>(&self, job_id: &str, apply: F) -> Result<PdfJob>
    where
        F: FnOnce(&mut PdfJob) -> Result<()>,
    {
        let mut job = self.get_status(job_id).await?;

        apply(&mut job).map_err(|e| match e {
            AppError::Domain(domain) => AppError::InvalidState(domain.to_string()),
            other => other,
        })?;

        if !self.repo.update_if(&job).await? {
            return Err(AppError::Conflict(format!(
                "pdf job {} was modified concurrently",
                job_id
            )));
        }
        job.version += 1;
        Ok(job)
    }

    /// Send to the render worker; failures are logged and left to the sweep
    async fn dispatch(&self, job: &PdfJob) -> bool {
        let request = RenderRequest {
            job_id: job.id.clone(),
            project_id: job.project_id.clone(),
            template_id: job.template_id.clone(),
            theme: job.theme.as_str().to_string(),
        };
        match self.dispatcher.dispatch(&request).await {
            Ok(()) => true,
            Err(e) => {
                warn!(job_id = %job.id, error = %e, "Render dispatch failed, job stays queued");
                false
            }
        }
    }
}
