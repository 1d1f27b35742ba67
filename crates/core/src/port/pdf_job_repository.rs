// PDF Job Repository Port (Interface)

use crate::domain::{PdfJob, PdfJobFilter, PdfStatus};
use crate::error::Result;
use async_trait::async_trait;
use std::collections::HashMap;

/// Persistence for PDF jobs
#[async_trait]
pub trait PdfJobRepository: Send + Sync {
    /// Insert a new job
    async fn insert(&self, job: &PdfJob) -> Result<()>;

    /// Find job by ID
    async fn find_by_id(&self, id: &str) -> Result<Option<PdfJob>>;

    /// Compare-and-set: write `job` only if the stored row is still at
    /// `job.version`. A successful write bumps the stored version.
    ///
    /// Returns false if another writer got there first.
    async fn update_if(&self, job: &PdfJob) -> Result<bool>;

    /// Filtered listing (newest first) for the admin dashboard
    async fn list(&self, filter: &PdfJobFilter) -> Result<Vec<PdfJob>>;

    /// Jobs in `status` whose last activity (heartbeat, else update) is before `older_than`
    async fn find_inactive(&self, status: PdfStatus, older_than: i64) -> Result<Vec<PdfJob>>;

    /// Job counts per status
    async fn count_by_status(&self) -> Result<HashMap<PdfStatus, i64>>;
}

pub mod mocks {
    use super::*;
    use std::sync::Mutex;

    /// In-memory PDF job store
    #[derive(Default)]
    pub struct InMemoryPdfJobRepository {
        jobs: Mutex<Vec<PdfJob>>,
    }

    impl InMemoryPdfJobRepository {
        pub fn new() -> Self {
            Self::default()
        }
    }

    #[async_trait]
    impl PdfJobRepository for InMemoryPdfJobRepository {
        async fn insert(&self, job: &PdfJob) -> Result<()> {
            self.jobs.lock().unwrap().push(job.clone());
            Ok(())
        }

        async fn find_by_id(&self, id: &str) -> Result<Option<PdfJob>> {
            Ok(self.jobs.lock().unwrap().iter().find(|j| j.id == id).cloned())
        }

        async fn update_if(&self, job: &PdfJob) -> Result<bool> {
            let mut jobs = self.jobs.lock().unwrap();
            match jobs.iter_mut().find(|j| j.id == job.id) {
                Some(stored) if stored.version == job.version => {
                    *stored = job.clone();
                    stored.version += 1;
                    Ok(true)
                }
                _ => Ok(false),
            }
        }

        async fn list(&self, filter: &PdfJobFilter) -> Result<Vec<PdfJob>> {
            let jobs = self.jobs.lock().unwrap();
            let mut matched: Vec<PdfJob> = jobs
                .iter()
                .filter(|j| filter.status.map_or(true, |s| j.status == s))
                .filter(|j| {
                    filter
                        .requested_by
                        .as_deref()
                        .map_or(true, |u| j.requested_by == u)
                })
                .filter(|j| {
                    filter
                        .project_id
                        .as_deref()
                        .map_or(true, |p| j.project_id == p)
                })
                .cloned()
                .collect();
            matched.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            let offset = filter.offset.max(0) as usize;
            let limit = filter.limit.map_or(usize::MAX, |l| l.max(0) as usize);
            Ok(matched.into_iter().skip(offset).take(limit).collect())
        }

        async fn find_inactive(&self, status: PdfStatus, older_than: i64) -> Result<Vec<PdfJob>> {
            let jobs = self.jobs.lock().unwrap();
            Ok(jobs
                .iter()
                .filter(|j| j.status == status && j.heartbeat_at.unwrap_or(j.updated_at) < older_than)
                .cloned()
                .collect())
        }

        async fn count_by_status(&self) -> Result<HashMap<PdfStatus, i64>> {
            let jobs = self.jobs.lock().unwrap();
            let mut counts = HashMap::new();
            for job in jobs.iter() {
                *counts.entry(job.status).or_insert(0) += 1;
            }
            Ok(counts)
        }
    }
}
