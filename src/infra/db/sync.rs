use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::{Uuid, fmt::Hyphenated};

use crate::application::repos::{
    NewSyncQueueItem, QueueFailureParams, RepoError, SyncQueueRepo, SyncStatusRepo,
};
use crate::domain::entities::SyncQueueItem;
use crate::domain::types::{QueueStatus, SyncOperation};

use super::{SqliteRepositories, map_sqlx_error};

const QUEUE_COLUMNS: &str =
    "id, operation, status, error, path, slug, retry_count, next_attempt_at, created_at";

#[derive(sqlx::FromRow)]
struct QueueRow {
    id: Hyphenated,
    operation: String,
    status: String,
    error: Option<String>,
    path: Option<String>,
    slug: Option<String>,
    retry_count: i64,
    next_attempt_at: Option<OffsetDateTime>,
    created_at: OffsetDateTime,
}

impl TryFrom<QueueRow> for SyncQueueItem {
    type Error = RepoError;

    fn try_from(row: QueueRow) -> Result<Self, Self::Error> {
        let operation = SyncOperation::try_from(row.operation.as_str()).map_err(|err| {
            RepoError::Integrity {
                message: err.to_string(),
            }
        })?;
        let status = QueueStatus::try_from(row.status.as_str()).map_err(|err| {
            RepoError::Integrity {
                message: err.to_string(),
            }
        })?;

        Ok(Self {
            id: row.id.into_uuid(),
            operation,
            status,
            error: row.error,
            path: row.path,
            slug: row.slug,
            retry_count: row.retry_count,
            next_attempt_at: row.next_attempt_at,
            created_at: row.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct StatusRow {
    last_sync_time: Option<OffsetDateTime>,
    sync_in_progress: bool,
}

#[async_trait]
impl SyncQueueRepo for SqliteRepositories {
    async fn enqueue(&self, item: NewSyncQueueItem) -> Result<SyncQueueItem, RepoError> {
        let id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO sync_queue (id, operation, status, path, slug, retry_count, created_at, updated_at)
            VALUES (?1, ?2, 'pending', ?3, ?4, 0, ?5, ?5)
            "#,
        )
        .bind(id.hyphenated())
        .bind(item.operation.as_str())
        .bind(&item.path)
        .bind(&item.slug)
        .bind(item.now)
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        self.find_item(id).await?.ok_or(RepoError::NotFound)
    }

    async fn next_batch(
        &self,
        now: OffsetDateTime,
        limit: u32,
    ) -> Result<Vec<SyncQueueItem>, RepoError> {
        // Due times are compared as values, not as stored text.
        let rows = sqlx::query_as::<_, QueueRow>(&format!(
            "SELECT {QUEUE_COLUMNS} FROM sync_queue \
             WHERE status IN ('pending', 'error') \
             ORDER BY created_at, rowid"
        ))
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        rows.into_iter()
            .filter(|row| row.next_attempt_at.is_none_or(|due| due <= now))
            .take(limit as usize)
            .map(SyncQueueItem::try_from)
            .collect()
    }

    async fn find_item(&self, id: Uuid) -> Result<Option<SyncQueueItem>, RepoError> {
        let row = sqlx::query_as::<_, QueueRow>(&format!(
            "SELECT {QUEUE_COLUMNS} FROM sync_queue WHERE id = ?"
        ))
        .bind(id.hyphenated())
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        row.map(SyncQueueItem::try_from).transpose()
    }

    async fn mark_success(&self, id: Uuid, now: OffsetDateTime) -> Result<(), RepoError> {
        let result = sqlx::query(
            r#"
            UPDATE sync_queue
            SET status = 'success', error = NULL, next_attempt_at = NULL, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(now)
        .bind(id.hyphenated())
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }

    async fn mark_failure(&self, params: QueueFailureParams) -> Result<(), RepoError> {
        let result = sqlx::query(
            r#"
            UPDATE sync_queue
            SET status = ?, retry_count = ?, error = ?, next_attempt_at = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(params.status.as_str())
        .bind(params.retry_count)
        .bind(&params.error)
        .bind(params.next_attempt_at)
        .bind(params.now)
        .bind(params.id.hyphenated())
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }

    async fn count_by_status(&self, status: QueueStatus) -> Result<u64, RepoError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sync_queue WHERE status = ?")
            .bind(status.as_str())
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Self::convert_count(count)
    }

    async fn reset_failed(&self, now: OffsetDateTime) -> Result<u64, RepoError> {
        let result = sqlx::query(
            r#"
            UPDATE sync_queue
            SET status = 'pending', retry_count = 0, next_attempt_at = NULL, updated_at = ?
            WHERE status = 'failed'
            "#,
        )
        .bind(now)
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl SyncStatusRepo for SqliteRepositories {
    async fn load_status(&self) -> Result<(bool, Option<OffsetDateTime>), RepoError> {
        let row = sqlx::query_as::<_, StatusRow>(
            "SELECT last_sync_time, sync_in_progress FROM sync_status WHERE id = 1",
        )
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row
            .map(|row| (row.sync_in_progress, row.last_sync_time))
            .unwrap_or((false, None)))
    }

    async fn set_in_progress(&self, in_progress: bool) -> Result<(), RepoError> {
        sqlx::query(
            r#"
            INSERT INTO sync_status (id, sync_in_progress) VALUES (1, ?1)
            ON CONFLICT (id) DO UPDATE SET sync_in_progress = excluded.sync_in_progress
            "#,
        )
        .bind(in_progress)
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn record_completed(&self, at: OffsetDateTime) -> Result<(), RepoError> {
        sqlx::query(
            r#"
            INSERT INTO sync_status (id, last_sync_time, sync_in_progress) VALUES (1, ?1, 0)
            ON CONFLICT (id) DO UPDATE SET last_sync_time = excluded.last_sync_time
            "#,
        )
        .bind(at)
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;
        Ok(())
    }
}
