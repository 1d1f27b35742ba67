// SQLite AuditJobRepository Implementation

use crate::error::{corrupt, map_sqlx_error};
use async_trait::async_trait;
use auditdesk_core::domain::{AuditJob, AuditResult, AuditStatus};
use auditdesk_core::error::Result;
use auditdesk_core::port::AuditJobRepository;
use sqlx::SqlitePool;
use std::collections::HashMap;

pub struct SqliteAuditJobRepository {
    pool: SqlitePool,
}

impl SqliteAuditJobRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuditJobRepository for SqliteAuditJobRepository {
    async fn insert_pending(&self, job: &AuditJob) -> Result<()> {
        // idx_audit_jobs_active_project turns a second active job into a Conflict
        sqlx::query(
            r#"
            INSERT INTO audit_jobs (
                id, project_id, user_id, remote_job_id, status, options,
                created_at, started_at, completed_at, result_ref, failure_reason
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&job.id)
        .bind(&job.project_id)
        .bind(&job.user_id)
        .bind(&job.remote_job_id)
        .bind(AuditStatus::Pending.as_str())
        .bind(job.options.to_string())
        .bind(job.created_at)
        .bind(job.started_at)
        .bind(job.completed_at)
        .bind(&job.result_ref)
        .bind(&job.failure_reason)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<AuditJob>> {
        let row = sqlx::query_as::<_, AuditJobRow>("SELECT * FROM audit_jobs WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        row.map(AuditJobRow::into_job).transpose()
    }

    async fn find_active_for_project(&self, project_id: &str) -> Result<Option<AuditJob>> {
        let row = sqlx::query_as::<_, AuditJobRow>(
            r#"
            SELECT * FROM audit_jobs
            WHERE project_id = ? AND status IN ('PENDING', 'RUNNING')
            LIMIT 1
            "#,
        )
        .bind(project_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        row.map(AuditJobRow::into_job).transpose()
    }

    async fn mark_running(&self, id: &str, remote_job_id: &str, now: i64) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE audit_jobs
            SET status = 'RUNNING', remote_job_id = ?, started_at = ?
            WHERE id = ? AND status = 'PENDING'
            "#,
        )
        .bind(remote_job_id)
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(result.rows_affected() == 1)
    }

    async fn mark_completed(
        &self,
        id: &str,
        result_id: &str,
        result: &AuditResult,
        now: i64,
    ) -> Result<Option<String>> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

        let updated = sqlx::query(
            r#"
            UPDATE audit_jobs
            SET status = 'COMPLETED', result_ref = ?, completed_at = ?
            WHERE id = ? AND status = 'RUNNING'
            "#,
        )
        .bind(result_id)
        .bind(now)
        .bind(id)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        if updated.rows_affected() == 0 {
            // Dropping the transaction rolls it back
            return Ok(None);
        }

        sqlx::query(
            "INSERT INTO audit_results (id, job_id, payload, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(result_id)
        .bind(id)
        .bind(result.as_value().to_string())
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(Some(result_id.to_string()))
    }

    async fn mark_failed(&self, id: &str, reason: &str, now: i64) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE audit_jobs
            SET status = 'FAILED', failure_reason = ?, completed_at = ?
            WHERE id = ? AND status IN ('PENDING', 'RUNNING')
            "#,
        )
        .bind(reason)
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(result.rows_affected() == 1)
    }

    async fn record_poll(&self, id: &str, now: i64) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE audit_jobs SET last_polled_at = ? WHERE id = ? AND status = 'RUNNING'",
        )
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(result.rows_affected() == 1)
    }

    async fn find_by_status(&self, status: AuditStatus) -> Result<Vec<AuditJob>> {
        let rows: Vec<AuditJobRow> = sqlx::query_as(
            r#"
            SELECT * FROM audit_jobs
            WHERE status = ?
            ORDER BY created_at ASC
            "#,
        )
        .bind(status.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        rows.into_iter().map(AuditJobRow::into_job).collect()
    }

    async fn find_result(&self, result_ref: &str) -> Result<Option<AuditResult>> {
        let payload: Option<String> =
            sqlx::query_scalar("SELECT payload FROM audit_results WHERE id = ?")
                .bind(result_ref)
                .fetch_optional(&self.pool)
                .await
                .map_err(map_sqlx_error)?;

        match payload {
            Some(payload) => Ok(Some(AuditResult::new(serde_json::from_str(&payload)?))),
            None => Ok(None),
        }
    }

    async fn count_by_status(&self) -> Result<HashMap<AuditStatus, i64>> {
        let rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT status, COUNT(*) FROM audit_jobs GROUP BY status")
                .fetch_all(&self.pool)
                .await
                .map_err(map_sqlx_error)?;

        rows.into_iter()
            .map(|(status, count)| {
                AuditStatus::parse(&status)
                    .map(|s| (s, count))
                    .ok_or_else(|| corrupt("audit status", &status))
            })
            .collect()
    }
}

/// SQLite row representation
#[derive(Debug, sqlx::FromRow)]
struct AuditJobRow {
    id: String,
    project_id: String,
    user_id: String,
    remote_job_id: Option<String>,
    status: String,
    options: String,
    created_at: i64,
    started_at: Option<i64>,
    completed_at: Option<i64>,
    result_ref: Option<String>,
    failure_reason: Option<String>,
    last_polled_at: Option<i64>,
}

impl AuditJobRow {
    fn into_job(self) -> Result<AuditJob> {
        let status =
            AuditStatus::parse(&self.status).ok_or_else(|| corrupt("audit status", &self.status))?;

        Ok(AuditJob {
            id: self.id,
            project_id: self.project_id,
            user_id: self.user_id,
            remote_job_id: self.remote_job_id,
            status,
            options: serde_json::from_str(&self.options)?,
            created_at: self.created_at,
            started_at: self.started_at,
            completed_at: self.completed_at,
            result_ref: self.result_ref,
            failure_reason: self.failure_reason,
            last_polled_at: self.last_polled_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{create_pool, run_migrations};
    use auditdesk_core::error::AppError;
    use serde_json::json;

    async fn setup_test_db() -> SqliteAuditJobRepository {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();
        SqliteAuditJobRepository::new(pool)
    }

    fn pending(id: &str, project_id: &str) -> AuditJob {
        AuditJob::new(id, 1_000, project_id, "user-1", json!({"depth": 3}))
    }

    #[tokio::test]
    async fn test_insert_and_find() {
        let repo = setup_test_db().await;
        repo.insert_pending(&pending("job-1", "project-1")).await.unwrap();

        let found = repo.find_by_id("job-1").await.unwrap().unwrap();
        assert_eq!(found.status, AuditStatus::Pending);
        assert_eq!(found.options, json!({"depth": 3}));
        assert!(repo.find_by_id("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_second_active_job_for_project_conflicts() {
        let repo = setup_test_db().await;
        repo.insert_pending(&pending("job-1", "project-1")).await.unwrap();

        let err = repo
            .insert_pending(&pending("job-2", "project-1"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        // Other projects are unaffected, and a terminal job frees the slot
        repo.insert_pending(&pending("job-3", "project-2")).await.unwrap();
        assert!(repo.mark_failed("job-1", "crawler down", 2_000).await.unwrap());
        repo.insert_pending(&pending("job-4", "project-1")).await.unwrap();
    }

    #[tokio::test]
    async fn test_lifecycle_with_result() {
        let repo = setup_test_db().await;
        repo.insert_pending(&pending("job-1", "project-1")).await.unwrap();

        assert!(repo.mark_running("job-1", "abc", 2_000).await.unwrap());
        assert!(!repo.mark_running("job-1", "abc", 2_000).await.unwrap());

        let result = AuditResult::new(json!({"score": 81}));
        let result_ref = repo
            .mark_completed("job-1", "result-1", &result, 3_000)
            .await
            .unwrap();
        assert_eq!(result_ref.as_deref(), Some("result-1"));

        let job = repo.find_by_id("job-1").await.unwrap().unwrap();
        assert_eq!(job.status, AuditStatus::Completed);
        assert_eq!(job.remote_job_id.as_deref(), Some("abc"));
        assert_eq!(job.result_ref.as_deref(), Some("result-1"));
        assert_eq!(job.completed_at, Some(3_000));
        assert_eq!(repo.find_result("result-1").await.unwrap(), Some(result));
    }

    #[tokio::test]
    async fn test_terminal_jobs_do_not_move() {
        let repo = setup_test_db().await;
        repo.insert_pending(&pending("job-1", "project-1")).await.unwrap();
        repo.mark_running("job-1", "abc", 2_000).await.unwrap();
        assert!(repo.mark_failed("job-1", "remote failure", 3_000).await.unwrap());

        let completed = repo
            .mark_completed("job-1", "result-1", &AuditResult::new(json!({})), 4_000)
            .await
            .unwrap();
        assert!(completed.is_none());
        assert!(!repo.mark_failed("job-1", "again", 4_000).await.unwrap());

        // The rolled back transaction left no result behind
        assert!(repo.find_result("result-1").await.unwrap().is_none());
        let job = repo.find_by_id("job-1").await.unwrap().unwrap();
        assert_eq!(job.status, AuditStatus::Failed);
        assert_eq!(job.failure_reason.as_deref(), Some("remote failure"));
        assert!(job.result_ref.is_none());
    }

    #[tokio::test]
    async fn test_find_by_status_and_counts() {
        let repo = setup_test_db().await;
        repo.insert_pending(&pending("job-1", "project-1")).await.unwrap();
        repo.insert_pending(&pending("job-2", "project-2")).await.unwrap();
        repo.insert_pending(&pending("job-3", "project-3")).await.unwrap();
        repo.mark_running("job-2", "r2", 2_000).await.unwrap();
        repo.mark_running("job-3", "r3", 2_000).await.unwrap();

        let running = repo.find_by_status(AuditStatus::Running).await.unwrap();
        assert_eq!(running.len(), 2);

        // Only Running jobs carry a tracker stamp
        assert!(repo.record_poll("job-2", 2_500).await.unwrap());
        assert!(!repo.record_poll("job-1", 2_500).await.unwrap());
        let job = repo.find_by_id("job-2").await.unwrap().unwrap();
        assert_eq!(job.last_polled_at, Some(2_500));

        let counts = repo.count_by_status().await.unwrap();
        assert_eq!(counts.get(&AuditStatus::Pending), Some(&1));
        assert_eq!(counts.get(&AuditStatus::Running), Some(&2));
        assert_eq!(counts.get(&AuditStatus::Completed), None);
    }
}
