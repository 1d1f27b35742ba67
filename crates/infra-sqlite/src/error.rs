// sqlx::Error -> AppError mapping

use auditdesk_core::error::AppError;

/// Convert sqlx::Error to AppError with structured information.
///
/// Unique violations become `Conflict` so callers can tell a lost insert
/// race apart from an unavailable datastore.
pub(crate) fn map_sqlx_error(err: sqlx::Error) -> AppError {
    match &err {
        sqlx::Error::Database(db_err) => {
            let Some(code) = db_err.code() else {
                return AppError::Database(format!("Database error: {}", db_err.message()));
            };

            // SQLite extended result codes: https://www.sqlite.org/rescode.html
            match code.as_ref() {
                "2067" | "1555" => AppError::Conflict(format!(
                    "Unique constraint violation: {}",
                    db_err.message()
                )),
                "787" | "3850" => AppError::Database(format!(
                    "Foreign key constraint violation: {}",
                    db_err.message()
                )),
                "275" | "531" => AppError::Validation(format!(
                    "Check constraint violation: {}",
                    db_err.message()
                )),
                "5" | "517" => AppError::Database(format!(
                    "Database locked (SQLITE_BUSY): {}",
                    db_err.message()
                )),
                "13" => AppError::Database(format!("Database full: {}", db_err.message())),
                other => AppError::Database(format!(
                    "Database error [{}]: {}",
                    other,
                    db_err.message()
                )),
            }
        }
        sqlx::Error::RowNotFound => AppError::Database("Row not found".to_string()),
        sqlx::Error::ColumnNotFound(col) => {
            AppError::Database(format!("Column not found: {}", col))
        }
        // Connection, pool, protocol errors
        _ => AppError::Database(err.to_string()),
    }
}

/// Stored value that no longer parses into a domain type
pub(crate) fn corrupt(column: &str, value: &str) -> AppError {
    AppError::Database(format!("Unexpected {} value in database: {}", column, value))
}
