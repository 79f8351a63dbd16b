use std::sync::Arc;

use metrics::counter;
use serde::Serialize;
use thiserror::Error;
use time::OffsetDateTime;
use tracing::info;
use uuid::Uuid;

use crate::application::repos::{
    MergeDuplicatesParams, PostsRepo, PostsWriteRepo, RepoError, TaxonomyRepo,
};
use crate::domain::duplicates::{DuplicatePolicy, core_slug, find_duplicate_groups, has_random_suffix};
use crate::domain::entities::PostWithTaxonomy;
use crate::domain::slug::{SlugAsyncError, SlugError, ensure_unique_slug_async};

#[derive(Debug, Error)]
pub enum DedupeError {
    #[error(transparent)]
    Slug(#[from] SlugError),
    #[error(transparent)]
    Repo(#[from] RepoError),
}

impl From<SlugAsyncError<RepoError>> for DedupeError {
    fn from(err: SlugAsyncError<RepoError>) -> Self {
        match err {
            SlugAsyncError::Slug(inner) => Self::Slug(inner),
            SlugAsyncError::Predicate(inner) => Self::Repo(inner),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DedupePost {
    pub id: Uuid,
    pub slug: String,
    pub title: String,
}

impl DedupePost {
    fn from_post(entry: &PostWithTaxonomy) -> Self {
        Self {
            id: entry.post.id,
            slug: entry.post.slug.clone(),
            title: entry.post.title.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DedupeGroupReport {
    pub keep: DedupePost,
    /// Clean slug the survivor is (or would be) renamed to.
    pub new_slug: Option<String>,
    pub remove: Vec<DedupePost>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DedupeReport {
    pub applied: bool,
    pub groups: Vec<DedupeGroupReport>,
    pub removed: u64,
    pub orphan_slugs_purged: u64,
}

#[derive(Clone)]
pub struct DedupeService {
    reader: Arc<dyn PostsRepo>,
    writer: Arc<dyn PostsWriteRepo>,
    taxonomy: Arc<dyn TaxonomyRepo>,
    policy: DuplicatePolicy,
}

impl DedupeService {
    pub fn new(
        reader: Arc<dyn PostsRepo>,
        writer: Arc<dyn PostsWriteRepo>,
        taxonomy: Arc<dyn TaxonomyRepo>,
        policy: DuplicatePolicy,
    ) -> Self {
        Self {
            reader,
            writer,
            taxonomy,
            policy,
        }
    }

    /// Group duplicate posts and, when `apply` is set, merge each group into
    /// its best-scoring post.
    pub async fn process_duplicate_groups(&self, apply: bool) -> Result<DedupeReport, DedupeError> {
        let now = OffsetDateTime::now_utc();
        let posts = self.reader.list_posts().await?;
        let groups = find_duplicate_groups(&posts, &self.policy, now);

        let mut report = DedupeReport {
            applied: apply,
            ..DedupeReport::default()
        };

        for group in groups {
            let survivor = &posts[group.survivor];
            let removed: Vec<&PostWithTaxonomy> = group.removed.iter().map(|&i| &posts[i]).collect();
            let new_slug = self.clean_slug_for(survivor, &removed).await?;

            if apply {
                self.writer
                    .merge_duplicates(MergeDuplicatesParams {
                        survivor_id: survivor.post.id,
                        survivor_slug: survivor.post.slug.clone(),
                        survivor_new_slug: new_slug.clone(),
                        removed: removed
                            .iter()
                            .map(|entry| (entry.post.id, entry.post.slug.clone()))
                            .collect(),
                        now,
                    })
                    .await?;
                counter!("inkbridge_dedupe_removed_total").increment(removed.len() as u64);
            }

            info!(
                target = "inkbridge::dedupe",
                keep = %survivor.post.slug,
                remove = removed.len(),
                applied = apply,
                "duplicate group"
            );

            report.removed += removed.len() as u64;
            report.groups.push(DedupeGroupReport {
                keep: DedupePost::from_post(survivor),
                new_slug,
                remove: removed.into_iter().map(DedupePost::from_post).collect(),
            });
        }

        if apply {
            report.orphan_slugs_purged = self.writer.purge_orphan_slugs().await?;
            self.taxonomy.recount().await?;
        }

        Ok(report)
    }

    /// Replacement slug for a survivor whose slug carries a random suffix.
    ///
    /// The core slug is preferred, then `core-1`, `core-2`, … Slugs held by the
    /// group's own posts are free since those posts are merged away.
    async fn clean_slug_for(
        &self,
        survivor: &PostWithTaxonomy,
        removed: &[&PostWithTaxonomy],
    ) -> Result<Option<String>, DedupeError> {
        let current = survivor.post.slug.as_str();
        if !has_random_suffix(current) {
            return Ok(None);
        }

        let group: Vec<Uuid> = std::iter::once(survivor.post.id)
            .chain(removed.iter().map(|entry| entry.post.id))
            .collect();
        let reader = self.reader.clone();
        let candidate = ensure_unique_slug_async(core_slug(current), |candidate| {
            let reader = reader.clone();
            let candidate = candidate.to_string();
            let group = group.clone();
            async move {
                let owner = reader.resolve_slug(&candidate).await?;
                Ok::<bool, RepoError>(owner.is_none_or(|post| group.contains(&post.id)))
            }
        })
        .await?;

        Ok((candidate != current).then_some(candidate))
    }
}
