//! Domain entities mirrored from persistent storage.

use serde::Serialize;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::domain::types::{QueueStatus, SyncOperation, SyncState};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PostRecord {
    pub id: Uuid,
    pub slug: String,
    pub title: String,
    /// Publication date as written in front matter (`YYYY-MM-DD` or RFC 3339).
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
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// A post together with the slugs of its categories and tag names.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PostWithTaxonomy {
    pub post: PostRecord,
    pub categories: Vec<String>,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryRecord {
    pub id: i64,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub parent_id: Option<i64>,
    pub post_count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TagRecord {
    pub id: i64,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub post_count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SlugMappingRecord {
    pub slug: String,
    pub post_id: Uuid,
    pub is_primary: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncQueueItem {
    pub id: Uuid,
    pub operation: SyncOperation,
    pub status: QueueStatus,
    pub error: Option<String>,
    pub path: Option<String>,
    pub slug: Option<String>,
    pub retry_count: i64,
    #[serde(with = "time::serde::rfc3339::option")]
    pub next_attempt_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncStatusSnapshot {
    pub status: SyncState,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_sync: Option<OffsetDateTime>,
    pub pending_operations: u64,
    pub failed_operations: u64,
}
