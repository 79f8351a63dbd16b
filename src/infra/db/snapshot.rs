use std::str::FromStr;

use async_trait::async_trait;
use sqlx::{
    Acquire, Executor, SqlitePool,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};
use tracing::warn;

use crate::application::replica::ReplicaTarget;
use crate::application::repos::{RepoError, SnapshotRepo};
use crate::infra::error::InfraError;

use super::{SqliteRepositories, map_sqlx_error};

const MIGRATIONS_TABLE: &str = "_sqlx_migrations";

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

#[async_trait]
impl SnapshotRepo for SqliteRepositories {
    async fn list_tables(&self) -> Result<Vec<String>, RepoError> {
        sqlx::query_scalar(
            r#"
            SELECT name
            FROM sqlite_master
            WHERE type = 'table' AND name NOT LIKE 'sqlite_%' AND name != ?
            ORDER BY name
            "#,
        )
        .bind(MIGRATIONS_TABLE)
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)
    }

    async fn table_schema(&self, table: &str) -> Result<Option<String>, RepoError> {
        let sql: Option<Option<String>> =
            sqlx::query_scalar("SELECT sql FROM sqlite_master WHERE type = 'table' AND name = ?")
                .bind(table)
                .fetch_optional(self.pool())
                .await
                .map_err(map_sqlx_error)?;
        Ok(sql.flatten())
    }

    async fn table_indexes(&self, table: &str) -> Result<Vec<String>, RepoError> {
        // Automatic indexes for UNIQUE and PRIMARY KEY constraints have no SQL.
        sqlx::query_scalar(
            r#"
            SELECT sql
            FROM sqlite_master
            WHERE type = 'index' AND tbl_name = ? AND sql IS NOT NULL
            ORDER BY name
            "#,
        )
        .bind(table)
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)
    }

    async fn export_rows(&self, table: &str) -> Result<Vec<String>, RepoError> {
        let columns: Vec<String> =
            sqlx::query_scalar("SELECT name FROM pragma_table_info(?) ORDER BY cid")
                .bind(table)
                .fetch_all(self.pool())
                .await
                .map_err(map_sqlx_error)?;
        if columns.is_empty() {
            return Err(RepoError::InvalidInput {
                message: format!("table `{table}` has no columns"),
            });
        }

        let column_list = columns
            .iter()
            .map(|column| quote_ident(column))
            .collect::<Vec<_>>()
            .join(",");
        let values = columns
            .iter()
            .map(|column| format!("quote({})", quote_ident(column)))
            .collect::<Vec<_>>()
            .join(" || ',' || ");
        let prefix = format!("INSERT INTO {} ({column_list}) VALUES (", quote_ident(table))
            .replace('\'', "''");
        let sql = format!(
            "SELECT '{prefix}' || {values} || ');' FROM {} ORDER BY rowid",
            quote_ident(table)
        );

        sqlx::query_scalar(&sql)
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)
    }
}

/// A second SQLite database receiving full-table pushes.
#[derive(Clone)]
pub struct SqliteReplica {
    pool: SqlitePool,
    label: String,
}

impl SqliteReplica {
    /// Accepts `sqlite:` URLs and plain file paths.
    pub async fn connect(url: &str) -> Result<Self, InfraError> {
        let normalized = if url.starts_with("sqlite:") {
            url.to_string()
        } else {
            format!("sqlite:{url}")
        };
        let options = SqliteConnectOptions::from_str(&normalized)
            .map_err(|err| InfraError::configuration(format!("invalid replica url: {err}")))?
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|err| InfraError::database(err.to_string()))?;

        Ok(Self {
            pool,
            label: url.to_string(),
        })
    }
}

#[async_trait]
impl ReplicaTarget for SqliteReplica {
    fn describe(&self) -> String {
        self.label.clone()
    }

    async fn apply(&self, statements: &[String]) -> Result<(), RepoError> {
        let mut conn = self.pool.acquire().await.map_err(map_sqlx_error)?;
        (&mut *conn)
            .execute(sqlx::raw_sql("PRAGMA foreign_keys = OFF"))
            .await
            .map_err(map_sqlx_error)?;

        let mut tx = conn.begin().await.map_err(map_sqlx_error)?;
        let mut failure = None;
        for statement in statements {
            if let Err(err) = (&mut *tx).execute(sqlx::raw_sql(statement)).await {
                failure = Some(err);
                break;
            }
        }

        let result = match failure {
            Some(err) => {
                if let Err(rollback) = tx.rollback().await {
                    warn!(
                        target = "inkbridge::replica",
                        error = %rollback,
                        "replica rollback failed"
                    );
                }
                Err(map_sqlx_error(err))
            }
            None => tx.commit().await.map_err(map_sqlx_error),
        };

        (&mut *conn)
            .execute(sqlx::raw_sql("PRAGMA foreign_keys = ON"))
            .await
            .map_err(map_sqlx_error)?;
        result
    }
}
