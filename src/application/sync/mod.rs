//! Reconciliation between the database and Markdown content stores.

mod retry;
mod store;

pub use retry::{FailureTransition, RetryPolicy};
pub use store::{ContentEntry, ContentStore, ContentStoreError};

use std::sync::Arc;

use metrics::counter;
use serde::Serialize;
use thiserror::Error;
use time::OffsetDateTime;
use tracing::{debug, info, warn};

use crate::application::posts::{
    ChangeOrigin, PostService, PostServiceError, SavePostCommand, default_content_path,
};
use crate::application::repos::{
    NewSyncQueueItem, PostsRepo, QueueFailureParams, RepoError, SyncQueueRepo, SyncStatusRepo,
};
use crate::domain::entities::{PostRecord, SyncQueueItem, SyncStatusSnapshot};
use crate::domain::front_matter::{
    ImportedPost, ParseOptions, parse_date_prefix, parse_document, serialize_post,
};
use crate::domain::taxonomy::UNCATEGORIZED;
use crate::domain::types::{QueueStatus, SyncDirection, SyncOperation, SyncState};

pub const DEFAULT_BATCH_SIZE: u32 = 10;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("no remote content store is configured")]
    RemoteUnavailable,
    #[error(transparent)]
    Store(#[from] ContentStoreError),
    #[error(transparent)]
    Posts(#[from] PostServiceError),
    #[error(transparent)]
    Repo(#[from] RepoError),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub success: bool,
    pub processed: u64,
    pub skipped: u64,
    pub errors: u64,
}

impl SyncReport {
    fn finish(mut self) -> Self {
        self.success = self.errors == 0;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum SyncOutcome {
    Single(SyncReport),
    Bidirectional {
        to_github: SyncReport,
        from_github: SyncReport,
    },
}

impl SyncOutcome {
    pub fn success(&self) -> bool {
        match self {
            SyncOutcome::Single(report) => report.success,
            SyncOutcome::Bidirectional {
                to_github,
                from_github,
            } => to_github.success && from_github.success,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PushOutcome {
    Pushed,
    /// The post was deleted after the change was queued.
    Superseded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ImportOutcome {
    Created,
    Updated,
    Unchanged,
}

#[derive(Clone)]
pub struct SyncService {
    posts: PostService,
    reader: Arc<dyn PostsRepo>,
    queue: Arc<dyn SyncQueueRepo>,
    status: Arc<dyn SyncStatusRepo>,
    remote: Option<Arc<dyn ContentStore>>,
    local: Arc<dyn ContentStore>,
    retry: RetryPolicy,
    batch_size: u32,
    raw_base_url: Option<String>,
}

#[derive(Clone)]
pub struct SyncStores {
    /// GitHub, when a token is configured.
    pub remote: Option<Arc<dyn ContentStore>>,
    /// Local Markdown mirror, also used as the import source without a remote.
    pub local: Arc<dyn ContentStore>,
}

impl SyncService {
    pub fn new(
        posts: PostService,
        reader: Arc<dyn PostsRepo>,
        queue: Arc<dyn SyncQueueRepo>,
        status: Arc<dyn SyncStatusRepo>,
        stores: SyncStores,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            posts,
            reader,
            queue,
            status,
            remote: stores.remote,
            local: stores.local,
            retry,
            batch_size: DEFAULT_BATCH_SIZE,
            raw_base_url: None,
        }
    }

    pub fn with_batch_size(mut self, batch_size: u32) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Base URL used to absolutize relative cover images on import.
    pub fn with_raw_base_url(mut self, raw_base_url: Option<String>) -> Self {
        self.raw_base_url = raw_base_url;
        self
    }

    pub fn with_local_store(mut self, local: Arc<dyn ContentStore>) -> Self {
        self.local = local;
        self
    }

    pub async fn sync(&self, direction: SyncDirection) -> Result<SyncOutcome, SyncError> {
        self.status.set_in_progress(true).await?;
        let result = self.run_direction(direction).await;
        let cleared = self.status.set_in_progress(false).await;

        let outcome = result?;
        cleared?;
        self.status.record_completed(OffsetDateTime::now_utc()).await?;

        info!(
            target = "inkbridge::sync",
            direction = %direction,
            success = outcome.success(),
            "sync finished"
        );
        Ok(outcome)
    }

    async fn run_direction(&self, direction: SyncDirection) -> Result<SyncOutcome, SyncError> {
        let outcome = match direction {
            SyncDirection::ToGithub => SyncOutcome::Single(self.sync_to_remote().await?),
            SyncDirection::FromGithub => SyncOutcome::Single(self.sync_from_remote().await?),
            SyncDirection::ToLocal => SyncOutcome::Single(self.sync_to_local().await?),
            SyncDirection::FromLocal => SyncOutcome::Single(self.sync_from_local().await?),
            SyncDirection::Bidirectional => {
                let to_github = self.sync_to_remote().await?;
                let from_github = self.sync_from_remote().await?;
                SyncOutcome::Bidirectional {
                    to_github,
                    from_github,
                }
            }
        };
        Ok(outcome)
    }

    pub async fn status(&self) -> Result<SyncStatusSnapshot, SyncError> {
        let (in_progress, last_sync) = self.status.load_status().await?;
        let pending = self.queue.count_by_status(QueueStatus::Pending).await?;
        let retrying = self.queue.count_by_status(QueueStatus::Error).await?;
        let failed = self.queue.count_by_status(QueueStatus::Failed).await?;

        Ok(SyncStatusSnapshot {
            status: if in_progress {
                SyncState::Syncing
            } else {
                SyncState::Idle
            },
            last_sync,
            pending_operations: pending + retrying,
            failed_operations: failed,
        })
    }

    pub async fn enqueue(
        &self,
        operation: SyncOperation,
        slug: Option<String>,
        path: Option<String>,
    ) -> Result<SyncQueueItem, SyncError> {
        let item = self
            .queue
            .enqueue(NewSyncQueueItem {
                operation,
                slug,
                path,
                now: OffsetDateTime::now_utc(),
            })
            .await?;
        Ok(item)
    }

    pub async fn retry_failed(&self) -> Result<u64, SyncError> {
        let reset = self.queue.reset_failed(OffsetDateTime::now_utc()).await?;
        info!(target = "inkbridge::sync", reset, "failed queue items reset");
        Ok(reset)
    }

    /// Import every Markdown file from GitHub, or from the local mirror when
    /// no remote is configured.
    pub async fn sync_from_remote(&self) -> Result<SyncReport, SyncError> {
        match self.remote.as_ref() {
            Some(remote) => self.import_from(remote.as_ref()).await,
            None => {
                warn!(
                    target = "inkbridge::sync",
                    "no GitHub token configured; importing from local content"
                );
                self.import_from(self.local.as_ref()).await
            }
        }
    }

    pub async fn sync_from_local(&self) -> Result<SyncReport, SyncError> {
        self.import_from(self.local.as_ref()).await
    }

    /// Drain the queue in FIFO batches, pushing each change to GitHub.
    pub async fn sync_to_remote(&self) -> Result<SyncReport, SyncError> {
        let remote = self.remote.clone().ok_or(SyncError::RemoteUnavailable)?;
        let started = OffsetDateTime::now_utc();
        let mut report = SyncReport::default();

        loop {
            let batch = self.queue.next_batch(started, self.batch_size).await?;
            if batch.is_empty() {
                break;
            }

            for item in batch {
                match self.push_item(remote.as_ref(), &item).await {
                    Ok(PushOutcome::Pushed) => {
                        self.queue
                            .mark_success(item.id, OffsetDateTime::now_utc())
                            .await?;
                        report.processed += 1;
                        counter!("inkbridge_sync_processed_total", "direction" => "to-github")
                            .increment(1);
                    }
                    Ok(PushOutcome::Superseded) => {
                        self.queue
                            .mark_success(item.id, OffsetDateTime::now_utc())
                            .await?;
                        report.skipped += 1;
                    }
                    Err(err) => {
                        report.errors += 1;
                        self.record_failure(&item, &err).await?;
                    }
                }
            }
        }

        Ok(report.finish())
    }

    /// Write every post as Markdown into the local mirror.
    pub async fn sync_to_local(&self) -> Result<SyncReport, SyncError> {
        let posts = self.reader.list_posts().await?;
        let mut report = SyncReport::default();

        for entry in posts {
            let category = entry
                .categories
                .first()
                .map(String::as_str)
                .unwrap_or(UNCATEGORIZED);
            let path = format!("content/posts/{category}/{}.md", entry.post.slug);
            let document = serialize_post(&entry.post, &entry.categories, &entry.tags);

            match self
                .local
                .put(&path, &document, &format!("Backup post: {}", entry.post.title))
                .await
            {
                Ok(()) => report.processed += 1,
                Err(err) => {
                    report.errors += 1;
                    warn!(
                        target = "inkbridge::sync",
                        path = %path,
                        error = %err,
                        "failed to write local copy"
                    );
                }
            }
        }

        counter!("inkbridge_sync_processed_total", "direction" => "to-local")
            .increment(report.processed);
        Ok(report.finish())
    }

    async fn import_from(&self, store: &dyn ContentStore) -> Result<SyncReport, SyncError> {
        let entries = store.list_markdown().await?;
        let options = ParseOptions {
            raw_base_url: self.raw_base_url.clone(),
            today: OffsetDateTime::now_utc().date(),
        };
        let mut report = SyncReport::default();

        info!(
            target = "inkbridge::sync",
            store = store.name(),
            files = entries.len(),
            "importing content"
        );

        for entry in entries {
            match self.import_entry(store, &entry.path, &options).await {
                Ok(ImportOutcome::Created | ImportOutcome::Updated) => report.processed += 1,
                Ok(ImportOutcome::Unchanged) => report.skipped += 1,
                Err(err) => {
                    report.errors += 1;
                    counter!("inkbridge_sync_errors_total", "direction" => "import").increment(1);
                    warn!(
                        target = "inkbridge::sync",
                        path = %entry.path,
                        error = %err,
                        "failed to import file"
                    );
                }
            }
        }

        counter!("inkbridge_sync_processed_total", "direction" => "import")
            .increment(report.processed);
        Ok(report.finish())
    }

    async fn import_entry(
        &self,
        store: &dyn ContentStore,
        path: &str,
        options: &ParseOptions,
    ) -> Result<ImportOutcome, SyncError> {
        let text = store.read(path).await?;
        let mut imported = parse_document(path, &text, options);
        imported.canonicalize_categories();

        let existing = match self.reader.find_by_original_file(path).await? {
            Some(post) => Some(post),
            None => self.reader.resolve_slug(&imported.slug).await?,
        };
        // A file found through an old slug is a stale copy of a renamed post. It
        // only wins when newer, and keeps the post's current slug and file.
        let stale_copy = existing.as_ref().is_some_and(|current| {
            current.slug != imported.slug && current.original_file.as_deref() != Some(path)
        });
        let outcome = match existing.as_ref() {
            Some(current) if stale_copy && !is_newer(current, &imported) => {
                return Ok(ImportOutcome::Unchanged);
            }
            Some(current) if !should_overwrite(current, &imported) => {
                return Ok(ImportOutcome::Unchanged);
            }
            Some(_) => ImportOutcome::Updated,
            None => ImportOutcome::Created,
        };

        let (slug, original_file) = match existing.as_ref() {
            Some(current) if stale_copy => (current.slug.clone(), current.original_file.clone()),
            _ => (imported.slug, Some(imported.original_file)),
        };

        let command = SavePostCommand {
            id: existing.map(|post| post.id),
            slug: Some(slug),
            title: imported.title,
            date: Some(imported.date),
            updated: imported.updated,
            content: imported.content,
            excerpt: Some(imported.excerpt),
            description: imported.description,
            published: imported.published,
            featured: imported.featured,
            cover_image: imported.cover_image,
            original_file,
            categories: imported.categories,
            tags: imported.tags,
            origin: ChangeOrigin::Import,
        };
        self.posts.save_post(command).await?;

        Ok(outcome)
    }

    async fn push_item(
        &self,
        remote: &dyn ContentStore,
        item: &SyncQueueItem,
    ) -> Result<PushOutcome, SyncError> {
        match item.operation {
            SyncOperation::Create | SyncOperation::Update => {
                let slug = item
                    .slug
                    .as_deref()
                    .ok_or_else(|| RepoError::InvalidInput {
                        message: "queued change has no slug".to_string(),
                    })?;
                let Some(post) = self.posts.resolve_slug(slug).await? else {
                    debug!(
                        target = "inkbridge::sync",
                        slug = %slug,
                        "post no longer exists; skipping queued change"
                    );
                    return Ok(PushOutcome::Superseded);
                };

                let path = item
                    .path
                    .clone()
                    .or_else(|| post.post.original_file.clone())
                    .unwrap_or_else(|| {
                        default_content_path(
                            post.categories.first().map(String::as_str),
                            &post.post.slug,
                        )
                    });
                let document = serialize_post(&post.post, &post.categories, &post.tags);
                let message = format!("Update post: {}", post.post.title);
                remote.put(&path, &document, &message).await?;
            }
            SyncOperation::Delete => {
                let path = item.path.as_deref().ok_or_else(|| RepoError::InvalidInput {
                    message: "queued delete has no path".to_string(),
                })?;
                let message = format!(
                    "Delete post: {}",
                    item.slug.as_deref().unwrap_or(path)
                );
                remote.delete(path, &message).await?;
            }
        }
        Ok(PushOutcome::Pushed)
    }

    async fn record_failure(&self, item: &SyncQueueItem, err: &SyncError) -> Result<(), SyncError> {
        let now = OffsetDateTime::now_utc();
        let transition = self.retry.on_failure(item.retry_count, now);

        self.queue
            .mark_failure(QueueFailureParams {
                id: item.id,
                status: transition.status,
                retry_count: transition.retry_count,
                error: err.to_string(),
                next_attempt_at: transition.next_attempt_at,
                now,
            })
            .await?;

        counter!("inkbridge_sync_errors_total", "direction" => "to-github").increment(1);
        if transition.status == QueueStatus::Failed {
            counter!("inkbridge_sync_failed_permanently_total").increment(1);
        }

        warn!(
            target = "inkbridge::sync",
            item_id = %item.id,
            operation = item.operation.as_str(),
            retry_count = transition.retry_count,
            status = transition.status.as_str(),
            error = %err,
            "queued change failed"
        );
        Ok(())
    }
}

/// An existing row is replaced only by a newer file or one whose body differs.
///
/// Bodies are compared without surrounding whitespace since serialized posts
/// always end in a single newline.
fn should_overwrite(current: &PostRecord, incoming: &ImportedPost) -> bool {
    current.content.trim() != incoming.content.trim() || is_newer(current, incoming)
}

fn is_newer(current: &PostRecord, incoming: &ImportedPost) -> bool {
    let current_date = current.updated.as_deref().unwrap_or(&current.date);
    match (
        parse_date_prefix(incoming.effective_date()),
        parse_date_prefix(current_date),
    ) {
        (Some(incoming), Some(current)) => incoming > current,
        _ => false,
    }
}
