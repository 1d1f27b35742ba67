// Migration Runner

use crate::error::map_sqlx_error;
use auditdesk_core::error::Result;
use sqlx::SqlitePool;
use tracing::info;

/// Embedded migrations, applied in order
const MIGRATIONS: &[(i64, &str, &str)] = &[(
    1,
    "Initial schema",
    include_str!("../migrations/001_initial_schema.sql"),
)];

/// Run pending database migrations
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    let current_version = current_version(pool).await?;
    info!(current_version = current_version, "Checking database migrations");

    for (version, name, sql) in MIGRATIONS {
        if *version <= current_version {
            continue;
        }
        info!(version = version, name = %name, "Applying migration");
        apply_migration(pool, *version, sql).await?;
    }

    Ok(())
}

async fn current_version(pool: &SqlitePool) -> Result<i64> {
    let table_exists: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='schema_version'",
    )
    .fetch_one(pool)
    .await
    .map_err(map_sqlx_error)?;

    if table_exists == 0 {
        return Ok(0);
    }

    let version: Option<i64> = sqlx::query_scalar("SELECT MAX(version) FROM schema_version")
        .fetch_one(pool)
        .await
        .map_err(map_sqlx_error)?;
    Ok(version.unwrap_or(0))
}

/// Apply a single migration and record its version in one transaction
async fn apply_migration(pool: &SqlitePool, version: i64, sql: &str) -> Result<()> {
    let mut tx = pool.begin().await.map_err(map_sqlx_error)?;

    for statement in sql.split(';') {
        let clean_statement = statement
            .lines()
            .filter(|line| !line.trim().starts_with("--"))
            .collect::<Vec<_>>()
            .join("\n");
        let clean_statement = clean_statement.trim();

        if !clean_statement.is_empty() {
            sqlx::query(clean_statement)
                .execute(&mut *tx)
                .await
                .map_err(map_sqlx_error)?;
        }
    }

    sqlx::query(
        "INSERT INTO schema_version (version, applied_at) \
         VALUES (?, CAST(strftime('%s', 'now') AS INTEGER) * 1000)",
    )
    .bind(version)
    .execute(&mut *tx)
    .await
    .map_err(map_sqlx_error)?;

    tx.commit().await.map_err(map_sqlx_error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::create_pool;

    #[tokio::test]
    async fn test_run_migrations() {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();

        for table in ["quotas", "audit_jobs", "audit_results", "pdf_jobs"] {
            let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
                .fetch_one(&pool)
                .await
                .unwrap();
            assert_eq!(count, 0, "table {} should be empty", table);
        }
    }

    #[tokio::test]
    async fn test_migrations_are_idempotent() {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();
        run_migrations(&pool).await.unwrap();

        let versions: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM schema_version")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(versions, 1);
    }
}
