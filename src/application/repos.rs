//! Repository traits describing persistence adapters.

use async_trait::async_trait;
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::domain::entities::{
    CategoryRecord, PostRecord, PostWithTaxonomy, SlugMappingRecord, SyncQueueItem, TagRecord,
};
use crate::domain::types::{QueueStatus, SyncOperation};

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("duplicate record violates unique constraint `{constraint}`")]
    Duplicate { constraint: String },
    #[error("resource not found")]
    NotFound,
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("integrity error: {message}")]
    Integrity { message: String },
    #[error("database busy")]
    Timeout,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }
}

/// Fully-resolved post fields handed to the write repository.
#[derive(Debug, Clone)]
pub struct SavePostParams {
    pub id: Uuid,
    /// Slug currently stored for an existing post; `None` when inserting.
    pub previous_slug: Option<String>,
    pub slug: String,
    pub title: String,
    pub date: String,
    pub updated: Option<String>,
    pub content: String,
    pub excerpt: String,
    pub description: String,
    pub published: bool,
    pub featured: bool,
    pub cover_image: Option<String>,
    pub reading_time: i64,
    pub original_file: Option<String>,
    /// Category slugs or display names.
    pub categories: Vec<String>,
    /// Tag names or slugs.
    pub tags: Vec<String>,
    pub now: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct MergeDuplicatesParams {
    pub survivor_id: Uuid,
    pub survivor_slug: String,
    /// Replacement for a survivor slug that carried a random suffix.
    pub survivor_new_slug: Option<String>,
    pub removed: Vec<(Uuid, String)>,
    pub now: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct NewSyncQueueItem {
    pub operation: SyncOperation,
    pub slug: Option<String>,
    pub path: Option<String>,
    pub now: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct QueueFailureParams {
    pub id: Uuid,
    pub status: QueueStatus,
    pub retry_count: i64,
    pub error: String,
    pub next_attempt_at: Option<OffsetDateTime>,
    pub now: OffsetDateTime,
}

#[async_trait]
pub trait PostsRepo: Send + Sync {
    async fn list_posts(&self) -> Result<Vec<PostWithTaxonomy>, RepoError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<PostRecord>, RepoError>;

    async fn find_by_slug(&self, slug: &str) -> Result<Option<PostRecord>, RepoError>;

    /// The post imported from, or last pushed to, `path` in the content repository.
    async fn find_by_original_file(&self, path: &str) -> Result<Option<PostRecord>, RepoError>;

    /// Resolve a primary slug or any historical alias to its post.
    async fn resolve_slug(&self, slug: &str) -> Result<Option<PostRecord>, RepoError>;

    async fn load_taxonomy(&self, post: PostRecord) -> Result<PostWithTaxonomy, RepoError>;

    /// Whether `slug` is used by another post, either as its slug or as an alias.
    async fn slug_taken(&self, slug: &str, exclude: Option<Uuid>) -> Result<bool, RepoError>;

    async fn slug_mappings(&self, post_id: Uuid) -> Result<Vec<SlugMappingRecord>, RepoError>;
}

#[async_trait]
pub trait PostsWriteRepo: Send + Sync {
    /// Insert or update a post with its category and tag links, slug history,
    /// and recomputed counts, atomically.
    async fn save_post(&self, params: SavePostParams) -> Result<PostRecord, RepoError>;

    /// Delete a post with its links and slug history; returns the removed row.
    async fn delete_post(&self, id: Uuid) -> Result<Option<PostRecord>, RepoError>;

    async fn merge_duplicates(&self, params: MergeDuplicatesParams) -> Result<(), RepoError>;

    /// Remove slug mappings pointing at posts that no longer exist.
    async fn purge_orphan_slugs(&self) -> Result<u64, RepoError>;
}

#[async_trait]
pub trait TaxonomyRepo: Send + Sync {
    async fn list_categories(&self) -> Result<Vec<CategoryRecord>, RepoError>;

    async fn list_tags(&self) -> Result<Vec<TagRecord>, RepoError>;

    /// Recompute `post_count` for every category and tag from published posts.
    async fn recount(&self) -> Result<(), RepoError>;
}

#[async_trait]
pub trait SyncQueueRepo: Send + Sync {
    async fn enqueue(&self, item: NewSyncQueueItem) -> Result<SyncQueueItem, RepoError>;

    /// Oldest drainable items (`pending`, or `error` whose retry time has come).
    async fn next_batch(
        &self,
        now: OffsetDateTime,
        limit: u32,
    ) -> Result<Vec<SyncQueueItem>, RepoError>;

    async fn find_item(&self, id: Uuid) -> Result<Option<SyncQueueItem>, RepoError>;

    async fn mark_success(&self, id: Uuid, now: OffsetDateTime) -> Result<(), RepoError>;

    async fn mark_failure(&self, params: QueueFailureParams) -> Result<(), RepoError>;

    async fn count_by_status(&self, status: QueueStatus) -> Result<u64, RepoError>;

    /// Move permanently failed items back to `pending` with a fresh retry budget.
    async fn reset_failed(&self, now: OffsetDateTime) -> Result<u64, RepoError>;
}

#[async_trait]
pub trait SyncStatusRepo: Send + Sync {
    /// Returns the advisory in-progress flag and the last completed sync time.
    async fn load_status(&self) -> Result<(bool, Option<OffsetDateTime>), RepoError>;

    async fn set_in_progress(&self, in_progress: bool) -> Result<(), RepoError>;

    async fn record_completed(&self, at: OffsetDateTime) -> Result<(), RepoError>;
}

/// Read side of a database snapshot used for replica pushes.
#[async_trait]
pub trait SnapshotRepo: Send + Sync {
    /// User tables, excluding SQLite internals and migration bookkeeping.
    async fn list_tables(&self) -> Result<Vec<String>, RepoError>;

    async fn table_schema(&self, table: &str) -> Result<Option<String>, RepoError>;

    /// One `INSERT` statement per row of `table`.
    async fn export_rows(&self, table: &str) -> Result<Vec<String>, RepoError>;

    /// `CREATE INDEX` statements for the explicit indexes on `table`.
    async fn table_indexes(&self, table: &str) -> Result<Vec<String>, RepoError>;
}
