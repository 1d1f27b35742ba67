// Audit Job Repository Port (Interface)

use crate::domain::{AuditJob, AuditResult, AuditStatus};
use crate::error::Result;
use async_trait::async_trait;
use std::collections::HashMap;

/// Persistence for audit jobs and their results.
///
/// Transitions are conditional updates on the current status, so a job can
/// never leave a terminal state even with several service instances running.
#[async_trait]
pub trait AuditJobRepository: Send + Sync {
    /// Insert a Pending job.
    ///
    /// Fails with `AppError::Conflict` if the project already has an active
    /// (Pending or Running) job.
    async fn insert_pending(&self, job: &AuditJob) -> Result<()>;

    /// Find job by ID
    async fn find_by_id(&self, id: &str) -> Result<Option<AuditJob>>;

    /// Active (Pending or Running) job for a project, if any
    async fn find_active_for_project(&self, project_id: &str) -> Result<Option<AuditJob>>;

    /// Pending -> Running. Returns false if the job was not Pending.
    async fn mark_running(&self, id: &str, remote_job_id: &str, now: i64) -> Result<bool>;

    /// Running -> Completed, storing the result in the same transaction.
    ///
    /// Returns the result reference, or None if the job was not Running.
    async fn mark_completed(
        &self,
        id: &str,
        result_id: &str,
        result: &AuditResult,
        now: i64,
    ) -> Result<Option<String>>;

    /// Pending | Running -> Failed. Returns false if already terminal.
    async fn mark_failed(&self, id: &str, reason: &str, now: i64) -> Result<bool>;

    /// Stamp `last_polled_at` on a Running job. Returns false otherwise.
    async fn record_poll(&self, id: &str, now: i64) -> Result<bool>;

    /// All jobs in a given status (oldest first)
    async fn find_by_status(&self, status: AuditStatus) -> Result<Vec<AuditJob>>;

    /// Stored result payload
    async fn find_result(&self, result_ref: &str) -> Result<Option<AuditResult>>;

    /// Job counts per status
    async fn count_by_status(&self) -> Result<HashMap<AuditStatus, i64>>;
}

pub mod mocks {
    use super::*;
    use crate::error::AppError;
    use std::collections::HashSet;
    use std::sync::Mutex;

    #[derive(Default)]
    struct State {
        jobs: Vec<AuditJob>,
        results: HashMap<String, AuditResult>,
        broken: HashSet<String>,
    }

    impl State {
        fn check_writable(&self, id: &str) -> Result<()> {
            if self.broken.contains(id) {
                return Err(AppError::Database(format!("disk I/O error writing {}", id)));
            }
            Ok(())
        }
    }

    /// In-memory audit job store with the same conditional semantics as SQL
    #[derive(Default)]
    pub struct InMemoryAuditJobRepository {
        state: Mutex<State>,
    }

    impl InMemoryAuditJobRepository {
        pub fn new() -> Self {
            Self::default()
        }

        /// Every later write to this job fails with a database error
        pub fn break_writes_for(&self, id: &str) {
            self.state.lock().unwrap().broken.insert(id.to_string());
        }
    }

    #[async_trait]
    impl AuditJobRepository for InMemoryAuditJobRepository {
        async fn insert_pending(&self, job: &AuditJob) -> Result<()> {
            let mut state = self.state.lock().unwrap();
            let active = state
                .jobs
                .iter()
                .any(|j| j.project_id == job.project_id && !j.status.is_terminal());
            if active {
                return Err(AppError::Conflict(format!(
                    "project {} already has an active audit",
                    job.project_id
                )));
            }
            state.jobs.push(job.clone());
            Ok(())
        }

        async fn find_by_id(&self, id: &str) -> Result<Option<AuditJob>> {
            let state = self.state.lock().unwrap();
            Ok(state.jobs.iter().find(|j| j.id == id).cloned())
        }

        async fn find_active_for_project(&self, project_id: &str) -> Result<Option<AuditJob>> {
            let state = self.state.lock().unwrap();
            Ok(state
                .jobs
                .iter()
                .find(|j| j.project_id == project_id && !j.status.is_terminal())
                .cloned())
        }

        async fn mark_running(&self, id: &str, remote_job_id: &str, now: i64) -> Result<bool> {
            let mut state = self.state.lock().unwrap();
            state.check_writable(id)?;
            Ok(match state.jobs.iter_mut().find(|j| j.id == id) {
                Some(job) => job.start(remote_job_id, now).is_ok(),
                None => false,
            })
        }

        async fn mark_completed(
            &self,
            id: &str,
            result_id: &str,
            result: &AuditResult,
            now: i64,
        ) -> Result<Option<String>> {
            let mut state = self.state.lock().unwrap();
            state.check_writable(id)?;
            let completed = match state.jobs.iter_mut().find(|j| j.id == id) {
                Some(job) => job.complete(result_id, now).is_ok(),
                None => false,
            };
            if !completed {
                return Ok(None);
            }
            state.results.insert(result_id.to_string(), result.clone());
            Ok(Some(result_id.to_string()))
        }

        async fn mark_failed(&self, id: &str, reason: &str, now: i64) -> Result<bool> {
            let mut state = self.state.lock().unwrap();
            state.check_writable(id)?;
            Ok(match state.jobs.iter_mut().find(|j| j.id == id) {
                Some(job) => job.fail(reason, now).is_ok(),
                None => false,
            })
        }

        async fn record_poll(&self, id: &str, now: i64) -> Result<bool> {
            let mut state = self.state.lock().unwrap();
            state.check_writable(id)?;
            Ok(match state.jobs.iter_mut().find(|j| j.id == id) {
                Some(job) if job.status == AuditStatus::Running => {
                    job.last_polled_at = Some(now);
                    true
                }
                _ => false,
            })
        }

        async fn find_by_status(&self, status: AuditStatus) -> Result<Vec<AuditJob>> {
            let state = self.state.lock().unwrap();
            Ok(state
                .jobs
                .iter()
                .filter(|j| j.status == status)
                .cloned()
                .collect())
        }

        async fn find_result(&self, result_ref: &str) -> Result<Option<AuditResult>> {
            Ok(self.state.lock().unwrap().results.get(result_ref).cloned())
        }

        async fn count_by_status(&self) -> Result<HashMap<AuditStatus, i64>> {
            let state = self.state.lock().unwrap();
            let mut counts = HashMap::new();
            for job in &state.jobs {
                *counts.entry(job.status).or_insert(0) += 1;
            }
            Ok(counts)
        }
    }
}
