use std::sync::Arc;

use thiserror::Error;
use time::OffsetDateTime;
use tracing::info;
use uuid::Uuid;

use crate::application::repos::{
    NewSyncQueueItem, PostsRepo, PostsWriteRepo, RepoError, SavePostParams, SyncQueueRepo,
    TaxonomyRepo,
};
use crate::domain::entities::{PostRecord, PostWithTaxonomy, SlugMappingRecord};
use crate::domain::front_matter::{format_date, reading_time, summarize};
use crate::domain::slug::{SlugAsyncError, SlugError, UNTITLED_SLUG, derive_slug, ensure_unique_slug_async};
use crate::domain::taxonomy::UNCATEGORIZED;
use crate::domain::types::SyncOperation;

#[derive(Debug, Error)]
pub enum PostServiceError {
    #[error("{0}")]
    ConstraintViolation(&'static str),
    #[error("post `{0}` not found")]
    NotFound(String),
    #[error(transparent)]
    Slug(#[from] SlugError),
    #[error(transparent)]
    Repo(#[from] RepoError),
}

impl From<SlugAsyncError<RepoError>> for PostServiceError {
    fn from(err: SlugAsyncError<RepoError>) -> Self {
        match err {
            SlugAsyncError::Slug(inner) => Self::Slug(inner),
            SlugAsyncError::Predicate(inner) => Self::Repo(inner),
        }
    }
}

/// Where a post change came from; only admin edits are queued for the remote store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeOrigin {
    Admin,
    Import,
}

#[derive(Debug, Clone)]
pub struct SavePostCommand {
    pub id: Option<Uuid>,
    /// Explicit slug; when absent the slug is derived from the title.
    pub slug: Option<String>,
    pub title: String,
    pub date: Option<String>,
    pub updated: Option<String>,
    pub content: String,
    pub excerpt: Option<String>,
    pub description: String,
    pub published: bool,
    pub featured: bool,
    pub cover_image: Option<String>,
    pub original_file: Option<String>,
    pub categories: Vec<String>,
    pub tags: Vec<String>,
    pub origin: ChangeOrigin,
}

impl SavePostCommand {
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: None,
            slug: None,
            title: title.into(),
            date: None,
            updated: None,
            content: content.into(),
            excerpt: None,
            description: String::new(),
            published: true,
            featured: false,
            cover_image: None,
            original_file: None,
            categories: Vec::new(),
            tags: Vec::new(),
            origin: ChangeOrigin::Admin,
        }
    }
}

#[derive(Clone)]
pub struct PostService {
    reader: Arc<dyn PostsRepo>,
    writer: Arc<dyn PostsWriteRepo>,
    taxonomy: Arc<dyn TaxonomyRepo>,
    queue: Arc<dyn SyncQueueRepo>,
}

impl PostService {
    pub fn new(
        reader: Arc<dyn PostsRepo>,
        writer: Arc<dyn PostsWriteRepo>,
        taxonomy: Arc<dyn TaxonomyRepo>,
        queue: Arc<dyn SyncQueueRepo>,
    ) -> Self {
        Self {
            reader,
            writer,
            taxonomy,
            queue,
        }
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<PostRecord>, PostServiceError> {
        self.reader.find_by_id(id).await.map_err(PostServiceError::from)
    }

    /// Resolve a current or historical slug.
    pub async fn resolve_slug(&self, slug: &str) -> Result<Option<PostWithTaxonomy>, PostServiceError> {
        match self.reader.resolve_slug(slug).await? {
            Some(post) => Ok(Some(self.reader.load_taxonomy(post).await?)),
            None => Ok(None),
        }
    }

    pub async fn slug_history(&self, id: Uuid) -> Result<Vec<SlugMappingRecord>, PostServiceError> {
        self.reader.slug_mappings(id).await.map_err(PostServiceError::from)
    }

    /// First free slug among `base`, `base-1`, `base-2`, … ignoring `exclude`.
    pub async fn ensure_unique_slug(
        &self,
        base: &str,
        exclude: Option<Uuid>,
    ) -> Result<String, PostServiceError> {
        let reader = self.reader.clone();
        let slug = ensure_unique_slug_async(base, |candidate| {
            let reader = reader.clone();
            let candidate = candidate.to_string();
            async move { reader.slug_taken(&candidate, exclude).await.map(|taken| !taken) }
        })
        .await?;
        Ok(slug)
    }

    pub async fn save_post(&self, command: SavePostCommand) -> Result<PostRecord, PostServiceError> {
        let title = command.title.trim().to_string();
        if title.is_empty() {
            return Err(PostServiceError::ConstraintViolation("title cannot be empty"));
        }

        let existing = match (command.id, command.slug.as_deref()) {
            (Some(id), _) => self.reader.find_by_id(id).await?,
            (None, Some(slug)) => self.reader.find_by_slug(slug).await?,
            (None, None) => None,
        };

        let slug = self.resolve_target_slug(&command, &title, existing.as_ref()).await?;
        let now = OffsetDateTime::now_utc();
        let id = existing
            .as_ref()
            .map(|post| post.id)
            .or(command.id)
            .unwrap_or_else(Uuid::new_v4);

        let date = command
            .date
            .clone()
            .or_else(|| existing.as_ref().map(|post| post.date.clone()))
            .unwrap_or_else(|| format_date(now.date()));
        let excerpt = command
            .excerpt
            .clone()
            .filter(|excerpt| !excerpt.trim().is_empty())
            .unwrap_or_else(|| default_excerpt(&command.description, &command.content));
        let original_file = command
            .original_file
            .clone()
            .or_else(|| existing.as_ref().and_then(|post| post.original_file.clone()));

        let params = SavePostParams {
            id,
            previous_slug: existing.as_ref().map(|post| post.slug.clone()),
            slug,
            title,
            updated: command.updated.clone(),
            date,
            reading_time: reading_time(&command.content),
            content: command.content,
            excerpt,
            description: command.description,
            published: command.published,
            featured: command.featured,
            cover_image: command.cover_image,
            original_file,
            categories: command.categories,
            tags: command.tags,
            now,
        };
        let first_category = params.categories.first().cloned();
        let previous_path = match existing.as_ref() {
            Some(post) if command.origin == ChangeOrigin::Admin && post.original_file.is_none() => {
                let previous = self.reader.load_taxonomy(post.clone()).await?;
                Some(default_content_path(
                    previous.categories.first().map(String::as_str),
                    &previous.post.slug,
                ))
            }
            _ => None,
        };

        let saved = self.writer.save_post(params).await?;

        info!(
            target = "inkbridge::posts",
            post_id = %saved.id,
            slug = %saved.slug,
            created = existing.is_none(),
            "post saved"
        );

        if command.origin == ChangeOrigin::Admin {
            let operation = if existing.is_some() {
                SyncOperation::Update
            } else {
                SyncOperation::Create
            };
            let path = saved
                .original_file
                .clone()
                .unwrap_or_else(|| default_content_path(first_category.as_deref(), &saved.slug));
            self.queue
                .enqueue(NewSyncQueueItem {
                    operation,
                    slug: Some(saved.slug.clone()),
                    path: Some(path.clone()),
                    now,
                })
                .await?;

            // A post without an imported file lives at a path derived from its
            // slug and category; the file at the old path must go.
            if let Some(previous_path) = previous_path.filter(|previous| *previous != path) {
                self.queue
                    .enqueue(NewSyncQueueItem {
                        operation: SyncOperation::Delete,
                        slug: Some(saved.slug.clone()),
                        path: Some(previous_path),
                        now,
                    })
                    .await?;
            }
        }

        Ok(saved)
    }

    /// Delete a post and queue removal of its file from the remote store.
    pub async fn delete_post(&self, id: Uuid) -> Result<PostRecord, PostServiceError> {
        let categories = match self.reader.find_by_id(id).await? {
            Some(post) => self.reader.load_taxonomy(post).await?.categories,
            None => return Err(PostServiceError::NotFound(id.to_string())),
        };

        let removed = self
            .writer
            .delete_post(id)
            .await?
            .ok_or_else(|| PostServiceError::NotFound(id.to_string()))?;

        let path = removed.original_file.clone().unwrap_or_else(|| {
            default_content_path(categories.first().map(String::as_str), &removed.slug)
        });
        self.queue
            .enqueue(NewSyncQueueItem {
                operation: SyncOperation::Delete,
                slug: Some(removed.slug.clone()),
                path: Some(path),
                now: OffsetDateTime::now_utc(),
            })
            .await?;

        info!(
            target = "inkbridge::posts",
            post_id = %removed.id,
            slug = %removed.slug,
            "post deleted"
        );

        Ok(removed)
    }

    pub async fn recount(&self) -> Result<(), PostServiceError> {
        self.taxonomy.recount().await.map_err(PostServiceError::from)
    }

    async fn resolve_target_slug(
        &self,
        command: &SavePostCommand,
        title: &str,
        existing: Option<&PostRecord>,
    ) -> Result<String, PostServiceError> {
        let exclude = existing.map(|post| post.id);

        if let Some(explicit) = command.slug.as_deref().filter(|slug| !slug.trim().is_empty()) {
            let base = derive_slug(explicit)?;
            if existing.is_some_and(|post| post.slug == base) {
                return Ok(base);
            }
            return self.ensure_unique_slug(&base, exclude).await;
        }

        match existing {
            Some(post) if post.title != title && slug_follows_title(&post.slug, &post.title) => {
                let base = derive_slug(title).unwrap_or_else(|_| UNTITLED_SLUG.to_string());
                if slug_follows_title(&post.slug, title) {
                    return Ok(post.slug.clone());
                }
                self.ensure_unique_slug(&base, exclude).await
            }
            Some(post) => Ok(post.slug.clone()),
            None => {
                let base = derive_slug(title).unwrap_or_else(|_| UNTITLED_SLUG.to_string());
                self.ensure_unique_slug(&base, None).await
            }
        }
    }
}

/// Whether `slug` is what `title` generates, allowing a numeric uniqueness suffix.
pub fn slug_follows_title(slug: &str, title: &str) -> bool {
    let Ok(base) = derive_slug(title) else {
        return slug == UNTITLED_SLUG;
    };
    if slug == base {
        return true;
    }
    slug.strip_prefix(&base)
        .and_then(|rest| rest.strip_prefix('-'))
        .is_some_and(|counter| !counter.is_empty() && counter.bytes().all(|b| b.is_ascii_digit()))
}

/// Repository path used for posts that were not imported from a file.
pub fn default_content_path(category: Option<&str>, slug: &str) -> String {
    format!(
        "content/posts/{}/{slug}.md",
        category.filter(|c| !c.is_empty()).unwrap_or(UNCATEGORIZED)
    )
}

fn default_excerpt(description: &str, content: &str) -> String {
    if !description.trim().is_empty() {
        return description.trim().to_string();
    }
    summarize(content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slug_follows_title_accepts_counter_suffix() {
        assert!(slug_follows_title("hello-world", "Hello World"));
        assert!(slug_follows_title("hello-world-2", "Hello World"));
        assert!(!slug_follows_title("hello-world-final", "Hello World"));
        assert!(!slug_follows_title("my-custom-slug", "Hello World"));
    }

    #[test]
    fn default_path_uses_first_category() {
        assert_eq!(
            default_content_path(Some("finance"), "budget"),
            "content/posts/finance/budget.md"
        );
        assert_eq!(
            default_content_path(None, "budget"),
            "content/posts/uncategorized/budget.md"
        );
    }

    #[test]
    fn excerpt_prefers_description() {
        assert_eq!(default_excerpt(" Short ", "ignored"), "Short");
        assert_eq!(default_excerpt("", "line one\nline two"), "line one line two...");
    }
}
