//! Full-table pushes from the local database to a replica.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use time::{OffsetDateTime, format_description::FormatItem, macros::format_description};
use tracing::{info, warn};

use crate::application::repos::{RepoError, SnapshotRepo};

const BACKUP_PREFIX: &str = "backup-";
const BACKUP_EXTENSION: &str = ".sql";
const BACKUP_STAMP: &[FormatItem<'static>] =
    format_description!("[year][month][day]-[hour][minute][second]");

#[derive(Debug, Error)]
pub enum ReplicaError {
    #[error("replica is not configured: {0}")]
    Configuration(String),
    #[error("unknown table `{0}`")]
    UnknownTable(String),
    #[error("failed to write backup `{path}`: {source}")]
    Backup {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Repo(#[from] RepoError),
}

/// Destination database that receives a dump in a single transaction.
#[async_trait]
pub trait ReplicaTarget: Send + Sync {
    fn describe(&self) -> String;

    async fn apply(&self, statements: &[String]) -> Result<(), RepoError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TablePush {
    pub table: String,
    pub rows: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReplicaPushReport {
    pub dry_run: bool,
    pub tables: Vec<TablePush>,
    pub backup_file: String,
    pub statements: u64,
}

#[derive(Clone)]
pub struct ReplicaService {
    snapshot: Arc<dyn SnapshotRepo>,
    target: Option<Arc<dyn ReplicaTarget>>,
    backup_dir: PathBuf,
    keep_backups: usize,
}

impl ReplicaService {
    pub fn new(
        snapshot: Arc<dyn SnapshotRepo>,
        target: Option<Arc<dyn ReplicaTarget>>,
        backup_dir: impl Into<PathBuf>,
        keep_backups: usize,
    ) -> Self {
        Self {
            snapshot,
            target,
            backup_dir: backup_dir.into(),
            keep_backups: keep_backups.max(1),
        }
    }

    /// Export `tables` (all user tables when empty), write a backup, and apply
    /// the dump to the replica unless `dry_run`.
    pub async fn push(
        &self,
        tables: &[String],
        dry_run: bool,
    ) -> Result<ReplicaPushReport, ReplicaError> {
        let available = self.snapshot.list_tables().await?;
        let selected = if tables.is_empty() {
            available
        } else {
            for table in tables {
                if !available.contains(table) {
                    return Err(ReplicaError::UnknownTable(table.clone()));
                }
            }
            tables.to_vec()
        };

        let target = match (&self.target, dry_run) {
            (Some(target), _) => Some(target.clone()),
            (None, true) => None,
            (None, false) => {
                return Err(ReplicaError::Configuration(
                    "set replica.url or TURSO_DATABASE_URL".to_string(),
                ));
            }
        };

        let mut statements = Vec::new();
        let mut pushed = Vec::with_capacity(selected.len());
        for table in &selected {
            let Some(schema) = self.snapshot.table_schema(table).await? else {
                return Err(ReplicaError::UnknownTable(table.clone()));
            };
            let rows = self.snapshot.export_rows(table).await?;
            let indexes = self.snapshot.table_indexes(table).await?;

            statements.push(format!("DROP TABLE IF EXISTS \"{table}\";"));
            statements.push(format!("{};", schema.trim_end_matches(';')));
            pushed.push(TablePush {
                table: table.clone(),
                rows: rows.len() as u64,
            });
            statements.extend(rows);
            statements.extend(
                indexes
                    .iter()
                    .map(|index| format!("{};", index.trim_end_matches(';'))),
            );
        }

        let now = OffsetDateTime::now_utc();
        let backup = self.write_backup(&statements, now).await?;
        self.rotate_backups().await;

        if let (Some(target), false) = (target, dry_run) {
            target.apply(&statements).await?;
            info!(
                target = "inkbridge::replica",
                replica = %target.describe(),
                tables = pushed.len(),
                statements = statements.len(),
                "replica updated"
            );
        }

        Ok(ReplicaPushReport {
            dry_run,
            tables: pushed,
            backup_file: backup.display().to_string(),
            statements: statements.len() as u64,
        })
    }

    async fn write_backup(
        &self,
        statements: &[String],
        now: OffsetDateTime,
    ) -> Result<PathBuf, ReplicaError> {
        let stamp = now
            .format(BACKUP_STAMP)
            .map_err(|err| ReplicaError::Configuration(err.to_string()))?;
        let path = self
            .backup_dir
            .join(format!("{BACKUP_PREFIX}{stamp}{BACKUP_EXTENSION}"));

        let mut body = format!("-- inkbridge backup {stamp}\n");
        for statement in statements {
            body.push_str(statement);
            body.push('\n');
        }

        let to_error = |source| ReplicaError::Backup {
            path: path.display().to_string(),
            source,
        };
        tokio::fs::create_dir_all(&self.backup_dir)
            .await
            .map_err(to_error)?;
        tokio::fs::write(&path, body).await.map_err(to_error)?;
        Ok(path)
    }

    /// Keep only the newest backups. Failures are logged, not returned.
    async fn rotate_backups(&self) {
        let mut backups = match list_backups(&self.backup_dir).await {
            Ok(backups) => backups,
            Err(err) => {
                warn!(target = "inkbridge::replica", error = %err, "failed to list backups");
                return;
            }
        };
        if backups.len() <= self.keep_backups {
            return;
        }

        backups.sort();
        let excess = backups.len() - self.keep_backups;
        for stale in backups.into_iter().take(excess) {
            if let Err(err) = tokio::fs::remove_file(&stale).await {
                warn!(
                    target = "inkbridge::replica",
                    path = %stale.display(),
                    error = %err,
                    "failed to remove old backup"
                );
            }
        }
    }
}

async fn list_backups(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut backups = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.starts_with(BACKUP_PREFIX) && name.ends_with(BACKUP_EXTENSION) {
            backups.push(entry.path());
        }
    }
    Ok(backups)
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    struct StaticSnapshot;

    #[async_trait]
    impl SnapshotRepo for StaticSnapshot {
        async fn list_tables(&self) -> Result<Vec<String>, RepoError> {
            Ok(vec!["posts".to_string(), "tags".to_string()])
        }

        async fn table_schema(&self, table: &str) -> Result<Option<String>, RepoError> {
            Ok(Some(format!("CREATE TABLE {table} (id TEXT)")))
        }

        async fn export_rows(&self, table: &str) -> Result<Vec<String>, RepoError> {
            Ok(vec![format!("INSERT INTO \"{table}\" (\"id\") VALUES ('1');")])
        }

        async fn table_indexes(&self, table: &str) -> Result<Vec<String>, RepoError> {
            Ok(vec![format!("CREATE INDEX idx_{table}_id ON {table} (id)")])
        }
    }

    #[derive(Default)]
    struct RecordingTarget {
        applied: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ReplicaTarget for RecordingTarget {
        fn describe(&self) -> String {
            "memory".to_string()
        }

        async fn apply(&self, statements: &[String]) -> Result<(), RepoError> {
            self.applied
                .lock()
                .expect("lock")
                .extend(statements.iter().cloned());
            Ok(())
        }
    }

    #[tokio::test]
    async fn dry_run_writes_backup_without_applying() {
        let dir = tempfile::tempdir().expect("tempdir");
        let target = Arc::new(RecordingTarget::default());
        let service = ReplicaService::new(
            Arc::new(StaticSnapshot),
            Some(target.clone()),
            dir.path(),
            5,
        );

        let report = service.push(&[], true).await.expect("push");

        assert!(report.dry_run);
        assert_eq!(report.tables.len(), 2);
        assert_eq!(report.statements, 8);
        assert!(target.applied.lock().expect("lock").is_empty());
        let backup = std::fs::read_to_string(&report.backup_file).expect("backup");
        assert!(backup.contains("DROP TABLE IF EXISTS \"posts\";"));
    }

    #[tokio::test]
    async fn push_applies_selected_tables() {
        let dir = tempfile::tempdir().expect("tempdir");
        let target = Arc::new(RecordingTarget::default());
        let service = ReplicaService::new(
            Arc::new(StaticSnapshot),
            Some(target.clone()),
            dir.path(),
            5,
        );

        let report = service
            .push(&["tags".to_string()], false)
            .await
            .expect("push");

        assert_eq!(report.tables[0].table, "tags");
        let applied = target.applied.lock().expect("lock");
        assert_eq!(applied.len(), 4);
        assert!(applied[1].starts_with("CREATE TABLE tags"));
        assert_eq!(applied[3], "CREATE INDEX idx_tags_id ON tags (id);");
    }

    #[tokio::test]
    async fn unknown_table_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let service = ReplicaService::new(Arc::new(StaticSnapshot), None, dir.path(), 5);

        let err = service
            .push(&["missing".to_string()], true)
            .await
            .expect_err("unknown table");
        assert!(matches!(err, ReplicaError::UnknownTable(name) if name == "missing"));
    }

    #[tokio::test]
    async fn push_without_target_requires_dry_run() {
        let dir = tempfile::tempdir().expect("tempdir");
        let service = ReplicaService::new(Arc::new(StaticSnapshot), None, dir.path(), 5);

        let err = service.push(&[], false).await.expect_err("no target");
        assert!(matches!(err, ReplicaError::Configuration(_)));
    }

    #[tokio::test]
    async fn old_backups_are_rotated() {
        let dir = tempfile::tempdir().expect("tempdir");
        for day in 1..=4 {
            std::fs::write(
                dir.path().join(format!("backup-2024010{day}-000000.sql")),
                "-- old",
            )
            .expect("seed backup");
        }
        let service = ReplicaService::new(Arc::new(StaticSnapshot), None, dir.path(), 2);

        service.push(&[], true).await.expect("push");

        let mut remaining = list_backups(dir.path()).await.expect("list");
        remaining.sort();
        assert_eq!(remaining.len(), 2);
        assert!(remaining[0].ends_with("backup-20240104-000000.sql"));
    }
}
