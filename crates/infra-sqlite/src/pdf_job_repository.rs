// SQLite PdfJobRepository Implementation

use crate::error::{corrupt, map_sqlx_error};
use async_trait::async_trait;
use auditdesk_core::domain::{PdfJob, PdfJobFilter, PdfStatus, PdfTheme};
use auditdesk_core::error::Result;
use auditdesk_core::port::PdfJobRepository;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use std::collections::HashMap;

pub struct SqlitePdfJobRepository {
    pool: SqlitePool,
}

impl SqlitePdfJobRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PdfJobRepository for SqlitePdfJobRepository {
    async fn insert(&self, job: &PdfJob) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO pdf_jobs (
                id, requested_by, project_id, template_id, theme, status,
                attempts, max_attempts, last_error, artifact_ref,
                created_at, updated_at, heartbeat_at, finished_at, version
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&job.id)
        .bind(&job.requested_by)
        .bind(&job.project_id)
        .bind(&job.template_id)
        .bind(job.theme.as_str())
        .bind(job.status.as_str())
        .bind(job.attempts)
        .bind(job.max_attempts)
        .bind(&job.last_error)
        .bind(&job.artifact_ref)
        .bind(job.created_at)
        .bind(job.updated_at)
        .bind(job.heartbeat_at)
        .bind(job.finished_at)
        .bind(job.version)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<PdfJob>> {
        let row = sqlx::query_as::<_, PdfJobRow>("SELECT * FROM pdf_jobs WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        row.map(PdfJobRow::into_job).transpose()
    }

    async fn update_if(&self, job: &PdfJob) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE pdf_jobs
            SET status = ?, attempts = ?, last_error = ?, artifact_ref = ?,
                updated_at = ?, heartbeat_at = ?, finished_at = ?,
                version = version + 1
            WHERE id = ? AND version = ?
            "#,
        )
        .bind(job.status.as_str())
        .bind(job.attempts)
        .bind(&job.last_error)
        .bind(&job.artifact_ref)
        .bind(job.updated_at)
        .bind(job.heartbeat_at)
        .bind(job.finished_at)
        .bind(&job.id)
        .bind(job.version)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(result.rows_affected() == 1)
    }

    async fn list(&self, filter: &PdfJobFilter) -> Result<Vec<PdfJob>> {
        let mut query: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT * FROM pdf_jobs WHERE 1 = 1");
        if let Some(status) = filter.status {
            query.push(" AND status = ").push_bind(status.as_str());
        }
        if let Some(requested_by) = &filter.requested_by {
            query.push(" AND requested_by = ").push_bind(requested_by.clone());
        }
        if let Some(project_id) = &filter.project_id {
            query.push(" AND project_id = ").push_bind(project_id.clone());
        }
        query
            .push(" ORDER BY created_at DESC, id DESC LIMIT ")
            .push_bind(filter.limit.unwrap_or(-1))
            .push(" OFFSET ")
            .push_bind(filter.offset.max(0));

        let rows: Vec<PdfJobRow> = query
            .build_query_as()
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        rows.into_iter().map(PdfJobRow::into_job).collect()
    }

    async fn find_inactive(&self, status: PdfStatus, older_than: i64) -> Result<Vec<PdfJob>> {
        let rows: Vec<PdfJobRow> = sqlx::query_as(
            r#"
            SELECT * FROM pdf_jobs
            WHERE status = ? AND COALESCE(heartbeat_at, updated_at) < ?
            ORDER BY created_at ASC
            "#,
        )
        .bind(status.as_str())
        .bind(older_than)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        rows.into_iter().map(PdfJobRow::into_job).collect()
    }

    async fn count_by_status(&self) -> Result<HashMap<PdfStatus, i64>> {
        let rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT status, COUNT(*) FROM pdf_jobs GROUP BY status")
                .fetch_all(&self.pool)
                .await
                .map_err(map_sqlx_error)?;

        rows.into_iter()
            .map(|(status, count)| {
                PdfStatus::parse(&status)
                    .map(|s| (s, count))
                    .ok_or_else(|| corrupt("pdf status", &status))
            })
            .collect()
    }
}

/// SQLite row representation
#[derive(Debug, sqlx::FromRow)]
struct PdfJobRow {
    id: String,
    requested_by: String,
    project_id: String,
    template_id: String,
    theme: String,
    status: String,
    attempts: i32,
    max_attempts: i32,
    last_error: Option<String>,
    artifact_ref: Option<String>,
    created_at: i64,
    updated_at: i64,
    heartbeat_at: Option<i64>,
    finished_at: Option<i64>,
    version: i64,
}

impl PdfJobRow {
    fn into_job(self) -> Result<PdfJob> {
        let status =
            PdfStatus::parse(&self.status).ok_or_else(|| corrupt("pdf status", &self.status))?;
        let theme = PdfTheme::parse(&self.theme).map_err(|_| corrupt("theme", &self.theme))?;

        Ok(PdfJob {
            id: self.id,
            requested_by: self.requested_by,
            project_id: self.project_id,
            template_id: self.template_id,
            theme,
            status,
            attempts: self.attempts,
            max_attempts: self.max_attempts,
            last_error: self.last_error,
            artifact_ref: self.artifact_ref,
            created_at: self.created_at,
            updated_at: self.updated_at,
            heartbeat_at: self.heartbeat_at,
            finished_at: self.finished_at,
            version: self.version,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{create_pool, run_migrations};

    async fn setup_test_db() -> SqlitePdfJobRepository {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();
        SqlitePdfJobRepository::new(pool)
    }

    fn queued(id: &str, created_at: i64, requested_by: &str) -> PdfJob {
        PdfJob::new(
            id,
            created_at,
            requested_by,
            "project-1",
            "executive",
            PdfTheme::Brand,
            3,
        )
    }

    #[tokio::test]
    async fn test_insert_and_find() {
        let repo = setup_test_db().await;
        let job = queued("pdf-1", 1_000, "user-1");
        repo.insert(&job).await.unwrap();

        let found = repo.find_by_id("pdf-1").await.unwrap().unwrap();
        assert_eq!(found, job);
    }

    #[tokio::test]
    async fn test_update_if_detects_concurrent_writer() {
        let repo = setup_test_db().await;
        let job = queued("pdf-1", 1_000, "user-1");
        repo.insert(&job).await.unwrap();

        let mut first = job.clone();
        first.mark_processing(2_000).unwrap();
        let mut second = job.clone();
        second.fail("cancelled", 2_000).unwrap();

        assert!(repo.update_if(&first).await.unwrap());
        assert!(!repo.update_if(&second).await.unwrap());

        let stored = repo.find_by_id("pdf-1").await.unwrap().unwrap();
        assert_eq!(stored.status, PdfStatus::Processing);
        assert_eq!(stored.heartbeat_at, Some(2_000));
        assert_eq!(stored.version, 1);
    }

    #[tokio::test]
    async fn test_heartbeat_after_read_blocks_abandon() {
        let repo = setup_test_db().await;
        let mut job = queued("pdf-1", 1_000, "user-1");
        job.mark_processing(1_000).unwrap();
        repo.insert(&job).await.unwrap();

        // Sweep reads the job as stale...
        let mut snapshot = repo
            .find_inactive(PdfStatus::Processing, 5_000)
            .await
            .unwrap()
            .remove(0);

        // ...the worker heartbeats before the sweep writes
        let mut live = repo.find_by_id("pdf-1").await.unwrap().unwrap();
        live.heartbeat(9_000).unwrap();
        assert!(repo.update_if(&live).await.unwrap());

        snapshot.fail("abandoned", 9_500).unwrap();
        assert!(!repo.update_if(&snapshot).await.unwrap());

        let stored = repo.find_by_id("pdf-1").await.unwrap().unwrap();
        assert_eq!(stored.status, PdfStatus::Processing);
        assert_eq!(stored.heartbeat_at, Some(9_000));
        assert!(stored.last_error.is_none());
    }

    #[tokio::test]
    async fn test_list_filters_and_pages() {
        let repo = setup_test_db().await;
        for i in 0..5 {
            let user = if i % 2 == 0 { "user-a" } else { "user-b" };
            repo.insert(&queued(&format!("pdf-{}", i), 1_000 + i, user))
                .await
                .unwrap();
        }

        let all = repo.list(&PdfJobFilter::default()).await.unwrap();
        let ids: Vec<&str> = all.iter().map(|j| j.id.as_str()).collect();
        assert_eq!(ids, vec!["pdf-4", "pdf-3", "pdf-2", "pdf-1", "pdf-0"]);

        let user_a = repo
            .list(&PdfJobFilter {
                requested_by: Some("user-a".to_string()),
                limit: Some(2),
                offset: 1,
                ..PdfJobFilter::default()
            })
            .await
            .unwrap();
        let ids: Vec<&str> = user_a.iter().map(|j| j.id.as_str()).collect();
        assert_eq!(ids, vec!["pdf-2", "pdf-0"]);

        let processing = repo
            .list(&PdfJobFilter {
                status: Some(PdfStatus::Processing),
                ..PdfJobFilter::default()
            })
            .await
            .unwrap();
        assert!(processing.is_empty());
    }

    #[tokio::test]
    async fn test_find_inactive_uses_heartbeat() {
        let repo = setup_test_db().await;
        let mut silent = queued("pdf-1", 1_000, "user-1");
        silent.mark_processing(1_000).unwrap();
        let mut alive = queued("pdf-2", 1_000, "user-1");
        alive.mark_processing(1_000).unwrap();
        alive.heartbeat(9_000).unwrap();
        repo.insert(&silent).await.unwrap();
        repo.insert(&alive).await.unwrap();

        let stale = repo
            .find_inactive(PdfStatus::Processing, 5_000)
            .await
            .unwrap();
        assert_eq!(stale.len(), 1);
        assert_eq!(stale[0].id, "pdf-1");

        let counts = repo.count_by_status().await.unwrap();
        assert_eq!(counts.get(&PdfStatus::Processing), Some(&2));
    }
}
