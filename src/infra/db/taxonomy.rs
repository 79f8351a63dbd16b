use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use sqlx::{Sqlite, Transaction};
use time::OffsetDateTime;
use uuid::fmt::Hyphenated;

use crate::application::repos::{RepoError, TaxonomyRepo};
use crate::domain::entities::{CategoryRecord, TagRecord};
use crate::domain::slug::derive_slug;
use crate::domain::taxonomy;

use super::{SqliteRepositories, map_sqlx_error};

static SLUG_LIKE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-z0-9-]+$").expect("slug regex"));

#[derive(sqlx::FromRow)]
struct CategoryRow {
    id: i64,
    name: String,
    slug: String,
    description: Option<String>,
    parent_id: Option<i64>,
    post_count: i64,
}

impl From<CategoryRow> for CategoryRecord {
    fn from(row: CategoryRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            slug: row.slug,
            description: row.description,
            parent_id: row.parent_id,
            post_count: row.post_count,
        }
    }
}

#[derive(sqlx::FromRow)]
struct TagRow {
    id: i64,
    name: String,
    slug: String,
    description: Option<String>,
    post_count: i64,
}

impl From<TagRow> for TagRecord {
    fn from(row: TagRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            slug: row.slug,
            description: row.description,
            post_count: row.post_count,
        }
    }
}

#[async_trait]
impl TaxonomyRepo for SqliteRepositories {
    async fn list_categories(&self) -> Result<Vec<CategoryRecord>, RepoError> {
        let rows = sqlx::query_as::<_, CategoryRow>(
            r#"
            SELECT id, name, slug, description, parent_id, post_count
            FROM categories
            ORDER BY name
            "#,
        )
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(CategoryRecord::from).collect())
    }

    async fn list_tags(&self) -> Result<Vec<TagRecord>, RepoError> {
        let rows = sqlx::query_as::<_, TagRow>(
            r#"
            SELECT id, name, slug, description, post_count
            FROM tags
            ORDER BY name
            "#,
        )
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(TagRecord::from).collect())
    }

    async fn recount(&self) -> Result<(), RepoError> {
        let mut tx = self.begin().await.map_err(map_sqlx_error)?;
        Self::recount_in(&mut tx, OffsetDateTime::now_utc()).await?;
        tx.commit().await.map_err(map_sqlx_error)
    }
}

impl SqliteRepositories {
    /// Recompute category and tag counts from published posts.
    pub(super) async fn recount_in(
        tx: &mut Transaction<'_, Sqlite>,
        now: OffsetDateTime,
    ) -> Result<(), RepoError> {
        sqlx::query(
            r#"
            UPDATE categories
            SET post_count = (
                SELECT COUNT(DISTINCT pc.post_id)
                FROM post_categories pc
                JOIN posts p ON p.id = pc.post_id
                WHERE pc.category_id = categories.id AND p.published = 1
            ),
            updated_at = ?
            "#,
        )
        .bind(now)
        .execute(tx.as_mut())
        .await
        .map_err(map_sqlx_error)?;

        sqlx::query(
            r#"
            UPDATE tags
            SET post_count = (
                SELECT COUNT(DISTINCT pt.post_id)
                FROM post_tags pt
                JOIN posts p ON p.id = pt.post_id
                WHERE pt.tag_id = tags.id AND p.published = 1
            ),
            updated_at = ?
            "#,
        )
        .bind(now)
        .execute(tx.as_mut())
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    /// Replace the category links of a post, creating missing categories.
    pub(super) async fn link_categories(
        tx: &mut Transaction<'_, Sqlite>,
        post_id: Hyphenated,
        categories: &[String],
        now: OffsetDateTime,
    ) -> Result<(), RepoError> {
        sqlx::query("DELETE FROM post_categories WHERE post_id = ?")
            .bind(post_id)
            .execute(tx.as_mut())
            .await
            .map_err(map_sqlx_error)?;

        for value in categories.iter().map(|v| v.trim()).filter(|v| !v.is_empty()) {
            let category_id = Self::resolve_category(tx, value, now).await?;
            sqlx::query(
                "INSERT OR IGNORE INTO post_categories (post_id, category_id) VALUES (?, ?)",
            )
            .bind(post_id)
            .bind(category_id)
            .execute(tx.as_mut())
            .await
            .map_err(map_sqlx_error)?;
        }
        Ok(())
    }

    /// Replace the tag links of a post, creating missing tags.
    pub(super) async fn link_tags(
        tx: &mut Transaction<'_, Sqlite>,
        post_id: Hyphenated,
        tags: &[String],
        now: OffsetDateTime,
    ) -> Result<(), RepoError> {
        sqlx::query("DELETE FROM post_tags WHERE post_id = ?")
            .bind(post_id)
            .execute(tx.as_mut())
            .await
            .map_err(map_sqlx_error)?;

        for value in tags.iter().map(|v| v.trim()).filter(|v| !v.is_empty()) {
            let tag_id = Self::resolve_tag(tx, value, now).await?;
            sqlx::query("INSERT OR IGNORE INTO post_tags (post_id, tag_id) VALUES (?, ?)")
                .bind(post_id)
                .bind(tag_id)
                .execute(tx.as_mut())
                .await
                .map_err(map_sqlx_error)?;
        }
        Ok(())
    }

    async fn resolve_category(
        tx: &mut Transaction<'_, Sqlite>,
        value: &str,
        now: OffsetDateTime,
    ) -> Result<i64, RepoError> {
        let (slug, name) = if SLUG_LIKE.is_match(value) {
            (
                value.to_string(),
                taxonomy::display_name_or_slug(value).to_string(),
            )
        } else {
            let by_name: Option<i64> = sqlx::query_scalar("SELECT id FROM categories WHERE name = ?")
                .bind(value)
                .fetch_optional(tx.as_mut())
                .await
                .map_err(map_sqlx_error)?;
            if let Some(id) = by_name {
                return Ok(id);
            }
            let known = taxonomy::slug_for_name(value);
            let slug = if known != value {
                known.to_string()
            } else {
                derive_slug(value).unwrap_or_else(|_| value.to_lowercase())
            };
            (slug, value.to_string())
        };

        let existing: Option<i64> = sqlx::query_scalar("SELECT id FROM categories WHERE slug = ?")
            .bind(&slug)
            .fetch_optional(tx.as_mut())
            .await
            .map_err(map_sqlx_error)?;
        if let Some(id) = existing {
            return Ok(id);
        }

        sqlx::query_scalar(
            r#"
            INSERT INTO categories (name, slug, created_at, updated_at)
            VALUES (?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(&name)
        .bind(&slug)
        .bind(now)
        .bind(now)
        .fetch_one(tx.as_mut())
        .await
        .map_err(map_sqlx_error)
    }

    async fn resolve_tag(
        tx: &mut Transaction<'_, Sqlite>,
        value: &str,
        now: OffsetDateTime,
    ) -> Result<i64, RepoError> {
        let slug = derive_slug(value).unwrap_or_else(|_| value.to_lowercase());

        let existing: Option<i64> =
            sqlx::query_scalar("SELECT id FROM tags WHERE name = ? OR slug = ? OR slug = ? LIMIT 1")
                .bind(value)
                .bind(value)
                .bind(&slug)
                .fetch_optional(tx.as_mut())
                .await
                .map_err(map_sqlx_error)?;
        if let Some(id) = existing {
            return Ok(id);
        }

        sqlx::query_scalar(
            r#"
            INSERT INTO tags (name, slug, created_at, updated_at)
            VALUES (?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(value)
        .bind(&slug)
        .bind(now)
        .bind(now)
        .fetch_one(tx.as_mut())
        .await
        .map_err(map_sqlx_error)
    }
}
