use crate::application::repos::RepoError;

use sqlx::error::ErrorKind;

pub fn map_sqlx_error(err: sqlx::Error) -> RepoError {
    match err {
        sqlx::Error::RowNotFound => RepoError::NotFound,
        sqlx::Error::Database(db) => match db.kind() {
            ErrorKind::UniqueViolation => RepoError::Duplicate {
                constraint: db
                    .constraint()
                    .map(str::to_string)
                    .unwrap_or_else(|| constraint_from_message(db.message())),
            },
            ErrorKind::ForeignKeyViolation => RepoError::InvalidInput {
                message: db.message().to_string(),
            },
            ErrorKind::NotNullViolation | ErrorKind::CheckViolation => RepoError::Integrity {
                message: db.message().to_string(),
            },
            _ if db.message().contains("database is locked") => RepoError::Timeout,
            _ => RepoError::from_persistence(db),
        },
        sqlx::Error::PoolTimedOut => RepoError::Timeout,
        other => RepoError::from_persistence(other),
    }
}

/// SQLite reports `UNIQUE constraint failed: posts.slug` without a constraint name.
fn constraint_from_message(message: &str) -> String {
    message
        .rsplit_once(": ")
        .map(|(_, columns)| columns.to_string())
        .unwrap_or_else(|| "unknown".to_string())
}
