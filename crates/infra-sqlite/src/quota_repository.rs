// SQLite QuotaRepository Implementation

use crate::error::{corrupt, map_sqlx_error};
use async_trait::async_trait;
use auditdesk_core::domain::{QuotaRecord, Tier};
use auditdesk_core::error::Result;
use auditdesk_core::port::QuotaRepository;
use sqlx::SqlitePool;

const QUOTA_COLUMNS: &str = "user_id, tier, period_start, audits_used, audits_limit";

/// Quota counters. Every mutation is one conditional statement, so the
/// database serialises concurrent reservations, across processes too.
pub struct SqliteQuotaRepository {
    pool: SqlitePool,
}

impl SqliteQuotaRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl QuotaRepository for SqliteQuotaRepository {
    async fn find(&self, user_id: &str) -> Result<Option<QuotaRecord>> {
        let row = sqlx::query_as::<_, QuotaRow>(&format!(
            "SELECT {} FROM quotas WHERE user_id = ?",
            QUOTA_COLUMNS
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        row.map(QuotaRow::into_record).transpose()
    }

    async fn insert_if_absent(&self, record: &QuotaRecord) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO quotas (user_id, tier, period_start, audits_used, audits_limit)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(user_id) DO NOTHING
            "#,
        )
        .bind(&record.user_id)
        .bind(record.tier.to_string())
        .bind(record.period_start)
        .bind(record.audits_used)
        .bind(record.audits_limit)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(result.rows_affected() == 1)
    }

    async fn roll_period(&self, user_id: &str, expected_start: i64, new_start: i64) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE quotas
            SET period_start = ?, audits_used = 0
            WHERE user_id = ? AND period_start = ?
            "#,
        )
        .bind(new_start)
        .bind(user_id)
        .bind(expected_start)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(result.rows_affected() == 1)
    }

    async fn try_increment(&self, user_id: &str, period_start: i64) -> Result<Option<QuotaRecord>> {
        let row = sqlx::query_as::<_, QuotaRow>(&format!(
            r#"
            UPDATE quotas
            SET audits_used = audits_used + 1
            WHERE user_id = ? AND period_start = ? AND audits_used < audits_limit
            RETURNING {}
            "#,
            QUOTA_COLUMNS
        ))
        .bind(user_id)
        .bind(period_start)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        row.map(QuotaRow::into_record).transpose()
    }

    async fn release(&self, user_id: &str, period_start: i64) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE quotas
            SET audits_used = audits_used - 1
            WHERE user_id = ? AND period_start = ? AND audits_used > 0
            "#,
        )
        .bind(user_id)
        .bind(period_start)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(result.rows_affected() == 1)
    }

    async fn set_tier(&self, user_id: &str, tier: Tier, period_start: i64) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO quotas (user_id, tier, period_start, audits_used, audits_limit)
            VALUES (?, ?, ?, 0, ?)
            ON CONFLICT(user_id) DO UPDATE
            SET tier = excluded.tier, audits_limit = excluded.audits_limit
            "#,
        )
        .bind(user_id)
        .bind(tier.to_string())
        .bind(period_start)
        .bind(tier.audits_limit())
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }
}

#[derive(Debug, sqlx::FromRow)]
struct QuotaRow {
    user_id: String,
    tier: String,
    period_start: i64,
    audits_used: i64,
    audits_limit: i64,
}

impl QuotaRow {
    fn into_record(self) -> Result<QuotaRecord> {
        let tier: Tier = self.tier.parse().map_err(|_| corrupt("tier", &self.tier))?;
        Ok(QuotaRecord {
            user_id: self.user_id,
            tier,
            period_start: self.period_start,
            audits_used: self.audits_used,
            audits_limit: self.audits_limit,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{create_pool, run_migrations};

    async fn setup_test_db() -> SqliteQuotaRepository {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();
        SqliteQuotaRepository::new(pool)
    }

    #[tokio::test]
    async fn test_insert_if_absent_keeps_existing() {
        let repo = setup_test_db().await;
        let record = QuotaRecord::new("user-1", Tier::Pro, 1_000);

        assert!(repo.insert_if_absent(&record).await.unwrap());
        let again = QuotaRecord::new("user-1", Tier::Free, 2_000);
        assert!(!repo.insert_if_absent(&again).await.unwrap());

        let stored = repo.find("user-1").await.unwrap().unwrap();
        assert_eq!(stored.tier, Tier::Pro);
        assert_eq!(stored.audits_limit, 10);
        assert_eq!(stored.period_start, 1_000);
    }

    #[tokio::test]
    async fn test_increment_stops_at_limit() {
        let repo = setup_test_db().await;
        repo.insert_if_absent(&QuotaRecord::new("user-1", Tier::Free, 1_000))
            .await
            .unwrap();

        for expected in 1..=3 {
            let updated = repo.try_increment("user-1", 1_000).await.unwrap().unwrap();
            assert_eq!(updated.audits_used, expected);
        }
        assert!(repo.try_increment("user-1", 1_000).await.unwrap().is_none());
        assert_eq!(repo.find("user-1").await.unwrap().unwrap().audits_used, 3);
    }

    #[tokio::test]
    async fn test_increment_requires_current_period() {
        let repo = setup_test_db().await;
        repo.insert_if_absent(&QuotaRecord::new("user-1", Tier::Free, 1_000))
            .await
            .unwrap();

        assert!(repo.try_increment("user-1", 999).await.unwrap().is_none());
        assert!(repo.try_increment("unknown", 1_000).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_roll_period_is_compare_and_set() {
        let repo = setup_test_db().await;
        repo.insert_if_absent(&QuotaRecord::new("user-1", Tier::Free, 1_000))
            .await
            .unwrap();
        repo.try_increment("user-1", 1_000).await.unwrap();

        assert!(repo.roll_period("user-1", 1_000, 5_000).await.unwrap());
        // Second roller loses
        assert!(!repo.roll_period("user-1", 1_000, 5_000).await.unwrap());

        let stored = repo.find("user-1").await.unwrap().unwrap();
        assert_eq!(stored.period_start, 5_000);
        assert_eq!(stored.audits_used, 0);
    }

    #[tokio::test]
    async fn test_release_never_below_zero() {
        let repo = setup_test_db().await;
        repo.insert_if_absent(&QuotaRecord::new("user-1", Tier::Free, 1_000))
            .await
            .unwrap();
        repo.try_increment("user-1", 1_000).await.unwrap();

        assert!(repo.release("user-1", 1_000).await.unwrap());
        assert!(!repo.release("user-1", 1_000).await.unwrap());
        assert_eq!(repo.find("user-1").await.unwrap().unwrap().audits_used, 0);
    }

    #[tokio::test]
    async fn test_set_tier_upserts_and_keeps_usage() {
        let repo = setup_test_db().await;

        repo.set_tier("user-1", Tier::Enterprise, 1_000).await.unwrap();
        let created = repo.find("user-1").await.unwrap().unwrap();
        assert_eq!(created.audits_limit, 100);

        repo.try_increment("user-1", 1_000).await.unwrap();
        repo.set_tier("user-1", Tier::Free, 1_000).await.unwrap();
        let downgraded = repo.find("user-1").await.unwrap().unwrap();
        assert_eq!(downgraded.tier, Tier::Free);
        assert_eq!(downgraded.audits_limit, 3);
        assert_eq!(downgraded.audits_used, 1);
    }
}
