use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::{Sqlite, Transaction};
use time::OffsetDateTime;
use uuid::{Uuid, fmt::Hyphenated};

use crate::application::repos::{
    MergeDuplicatesParams, PostsRepo, PostsWriteRepo, RepoError, SavePostParams,
};
use crate::domain::entities::{PostRecord, PostWithTaxonomy, SlugMappingRecord};

use super::{SqliteRepositories, map_sqlx_error};

const POST_COLUMNS: &str = "id, slug, title, date, updated, content, excerpt, description, \
    published, featured, cover_image, reading_time, original_file, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct PostRow {
    id: Hyphenated,
    slug: String,
    title: String,
    date: String,
    updated: Option<String>,
    content: String,
    excerpt: String,
    description: String,
    published: bool,
    featured: bool,
    cover_image: Option<String>,
    reading_time: i64,
    original_file: Option<String>,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl From<PostRow> for PostRecord {
    fn from(row: PostRow) -> Self {
        Self {
            id: row.id.into_uuid(),
            slug: row.slug,
            title: row.title,
            date: row.date,
            updated: row.updated,
            content: row.content,
            excerpt: row.excerpt,
            description: row.description,
            published: row.published,
            featured: row.featured,
            cover_image: row.cover_image,
            reading_time: row.reading_time,
            original_file: row.original_file,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct SlugMappingRow {
    slug: String,
    post_id: Hyphenated,
    is_primary: bool,
}

#[derive(sqlx::FromRow)]
struct LinkRow {
    post_id: Hyphenated,
    value: String,
}

fn group_links(rows: Vec<LinkRow>) -> HashMap<Uuid, Vec<String>> {
    let mut grouped: HashMap<Uuid, Vec<String>> = HashMap::new();
    for row in rows {
        grouped
            .entry(row.post_id.into_uuid())
            .or_default()
            .push(row.value);
    }
    grouped
}

#[async_trait]
impl PostsRepo for SqliteRepositories {
    async fn list_posts(&self) -> Result<Vec<PostWithTaxonomy>, RepoError> {
        let rows = sqlx::query_as::<_, PostRow>(&format!(
            "SELECT {POST_COLUMNS} FROM posts ORDER BY date DESC, created_at DESC"
        ))
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        let category_rows = sqlx::query_as::<_, LinkRow>(
            r#"
            SELECT pc.post_id AS post_id, c.slug AS value
            FROM post_categories pc
            JOIN categories c ON c.id = pc.category_id
            ORDER BY pc.rowid
            "#,
        )
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        let tag_rows = sqlx::query_as::<_, LinkRow>(
            r#"
            SELECT pt.post_id AS post_id, t.name AS value
            FROM post_tags pt
            JOIN tags t ON t.id = pt.tag_id
            ORDER BY pt.rowid
            "#,
        )
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        let mut categories = group_links(category_rows);
        let mut tags = group_links(tag_rows);

        Ok(rows
            .into_iter()
            .map(PostRecord::from)
            .map(|post| PostWithTaxonomy {
                categories: categories.remove(&post.id).unwrap_or_default(),
                tags: tags.remove(&post.id).unwrap_or_default(),
                post,
            })
            .collect())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<PostRecord>, RepoError> {
        let row = sqlx::query_as::<_, PostRow>(&format!(
            "SELECT {POST_COLUMNS} FROM posts WHERE id = ?"
        ))
        .bind(id.hyphenated())
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(PostRecord::from))
    }

    async fn find_by_slug(&self, slug: &str) -> Result<Option<PostRecord>, RepoError> {
        let row = sqlx::query_as::<_, PostRow>(&format!(
            "SELECT {POST_COLUMNS} FROM posts WHERE slug = ?"
        ))
        .bind(slug)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(PostRecord::from))
    }

    async fn find_by_original_file(&self, path: &str) -> Result<Option<PostRecord>, RepoError> {
        let row = sqlx::query_as::<_, PostRow>(&format!(
            "SELECT {POST_COLUMNS} FROM posts WHERE original_file = ? ORDER BY created_at LIMIT 1"
        ))
        .bind(path)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(PostRecord::from))
    }

    async fn resolve_slug(&self, slug: &str) -> Result<Option<PostRecord>, RepoError> {
        if let Some(post) = self.find_by_slug(slug).await? {
            return Ok(Some(post));
        }

        let target: Option<Hyphenated> =
            sqlx::query_scalar("SELECT post_id FROM slug_mapping WHERE slug = ?")
                .bind(slug)
                .fetch_optional(self.pool())
                .await
                .map_err(map_sqlx_error)?;

        match target {
            Some(id) => self.find_by_id(id.into_uuid()).await,
            None => Ok(None),
        }
    }

    async fn load_taxonomy(&self, post: PostRecord) -> Result<PostWithTaxonomy, RepoError> {
        let categories: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT c.slug
            FROM post_categories pc
            JOIN categories c ON c.id = pc.category_id
            WHERE pc.post_id = ?
            ORDER BY pc.rowid
            "#,
        )
        .bind(post.id.hyphenated())
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        let tags: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT t.name
            FROM post_tags pt
            JOIN tags t ON t.id = pt.tag_id
            WHERE pt.post_id = ?
            ORDER BY pt.rowid
            "#,
        )
        .bind(post.id.hyphenated())
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(PostWithTaxonomy {
            post,
            categories,
            tags,
        })
    }

    async fn slug_taken(&self, slug: &str, exclude: Option<Uuid>) -> Result<bool, RepoError> {
        let exclude = exclude.map(|id| id.hyphenated().to_string()).unwrap_or_default();
        let taken: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (SELECT 1 FROM posts WHERE slug = ?1 AND id != ?2)
                OR EXISTS (SELECT 1 FROM slug_mapping WHERE slug = ?1 AND post_id != ?2)
            "#,
        )
        .bind(slug)
        .bind(exclude)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(taken)
    }

    async fn slug_mappings(&self, post_id: Uuid) -> Result<Vec<SlugMappingRecord>, RepoError> {
        let rows = sqlx::query_as::<_, SlugMappingRow>(
            r#"
            SELECT slug, post_id, is_primary
            FROM slug_mapping
            WHERE post_id = ?
            ORDER BY is_primary DESC, created_at
            "#,
        )
        .bind(post_id.hyphenated())
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows
            .into_iter()
            .map(|row| SlugMappingRecord {
                slug: row.slug,
                post_id: row.post_id.into_uuid(),
                is_primary: row.is_primary,
            })
            .collect())
    }
}

#[async_trait]
impl PostsWriteRepo for SqliteRepositories {
    async fn save_post(&self, params: SavePostParams) -> Result<PostRecord, RepoError> {
        let SavePostParams {
            id,
            previous_slug,
            slug,
            title,
            date,
            updated,
            content,
            excerpt,
            description,
            published,
            featured,
            cover_image,
            reading_time,
            original_file,
            categories,
            tags,
            now,
        } = params;
        let post_id = id.hyphenated();

        let mut tx = self.begin().await.map_err(map_sqlx_error)?;

        let updated_rows = sqlx::query(
            r#"
            UPDATE posts SET
                slug = ?2, title = ?3, date = ?4, updated = ?5, content = ?6,
                excerpt = ?7, description = ?8, published = ?9, featured = ?10,
                cover_image = ?11, reading_time = ?12, original_file = ?13,
                updated_at = ?14
            WHERE id = ?1
            "#,
        )
        .bind(post_id)
        .bind(&slug)
        .bind(&title)
        .bind(&date)
        .bind(&updated)
        .bind(&content)
        .bind(&excerpt)
        .bind(&description)
        .bind(published)
        .bind(featured)
        .bind(&cover_image)
        .bind(reading_time)
        .bind(&original_file)
        .bind(now)
        .execute(tx.as_mut())
        .await
        .map_err(map_sqlx_error)?
        .rows_affected();

        if updated_rows == 0 {
            sqlx::query(
                r#"
                INSERT INTO posts (
                    id, slug, title, date, updated, content, excerpt, description,
                    published, featured, cover_image, reading_time, original_file,
                    created_at, updated_at
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?14)
                "#,
            )
            .bind(post_id)
            .bind(&slug)
            .bind(&title)
            .bind(&date)
            .bind(&updated)
            .bind(&content)
            .bind(&excerpt)
            .bind(&description)
            .bind(published)
            .bind(featured)
            .bind(&cover_image)
            .bind(reading_time)
            .bind(&original_file)
            .bind(now)
            .execute(tx.as_mut())
            .await
            .map_err(map_sqlx_error)?;
        }

        if let Some(previous) = previous_slug.as_deref().filter(|prev| *prev != slug) {
            Self::upsert_slug_mapping(&mut tx, previous, post_id, false, now).await?;
        }
        sqlx::query("UPDATE slug_mapping SET is_primary = 0 WHERE post_id = ? AND slug != ?")
            .bind(post_id)
            .bind(&slug)
            .execute(tx.as_mut())
            .await
            .map_err(map_sqlx_error)?;
        Self::upsert_slug_mapping(&mut tx, &slug, post_id, true, now).await?;

        Self::link_categories(&mut tx, post_id, &categories, now).await?;
        Self::link_tags(&mut tx, post_id, &tags, now).await?;
        Self::recount_in(&mut tx, now).await?;

        let row = Self::fetch_post_in(&mut tx, post_id)
            .await?
            .ok_or(RepoError::NotFound)?;

        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(PostRecord::from(row))
    }

    async fn delete_post(&self, id: Uuid) -> Result<Option<PostRecord>, RepoError> {
        let post_id = id.hyphenated();
        let mut tx = self.begin().await.map_err(map_sqlx_error)?;

        let Some(row) = Self::fetch_post_in(&mut tx, post_id).await? else {
            return Ok(None);
        };

        Self::delete_post_rows(&mut tx, post_id).await?;
        Self::recount_in(&mut tx, OffsetDateTime::now_utc()).await?;

        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(Some(PostRecord::from(row)))
    }

    async fn merge_duplicates(&self, params: MergeDuplicatesParams) -> Result<(), RepoError> {
        let MergeDuplicatesParams {
            survivor_id,
            survivor_slug,
            survivor_new_slug,
            removed,
            now,
        } = params;
        let survivor = survivor_id.hyphenated();

        let mut tx = self.begin().await.map_err(map_sqlx_error)?;

        for (removed_id, removed_slug) in &removed {
            let removed_id = removed_id.hyphenated();
            sqlx::query("UPDATE slug_mapping SET post_id = ?, is_primary = 0 WHERE post_id = ?")
                .bind(survivor)
                .bind(removed_id)
                .execute(tx.as_mut())
                .await
                .map_err(map_sqlx_error)?;
            Self::delete_post_rows(&mut tx, removed_id).await?;
            Self::upsert_slug_mapping(&mut tx, removed_slug, survivor, false, now).await?;
        }

        if let Some(new_slug) = survivor_new_slug {
            sqlx::query("UPDATE posts SET slug = ?, updated_at = ? WHERE id = ?")
                .bind(&new_slug)
                .bind(now)
                .bind(survivor)
                .execute(tx.as_mut())
                .await
                .map_err(map_sqlx_error)?;
            Self::upsert_slug_mapping(&mut tx, &survivor_slug, survivor, false, now).await?;
            Self::upsert_slug_mapping(&mut tx, &new_slug, survivor, true, now).await?;
        }

        Self::recount_in(&mut tx, now).await?;
        tx.commit().await.map_err(map_sqlx_error)
    }

    async fn purge_orphan_slugs(&self) -> Result<u64, RepoError> {
        let result =
            sqlx::query("DELETE FROM slug_mapping WHERE post_id NOT IN (SELECT id FROM posts)")
                .execute(self.pool())
                .await
                .map_err(map_sqlx_error)?;
        Ok(result.rows_affected())
    }
}

impl SqliteRepositories {
    async fn fetch_post_in(
        tx: &mut Transaction<'_, Sqlite>,
        post_id: Hyphenated,
    ) -> Result<Option<PostRow>, RepoError> {
        sqlx::query_as::<_, PostRow>(&format!("SELECT {POST_COLUMNS} FROM posts WHERE id = ?"))
            .bind(post_id)
            .fetch_optional(tx.as_mut())
            .await
            .map_err(map_sqlx_error)
    }

    async fn delete_post_rows(
        tx: &mut Transaction<'_, Sqlite>,
        post_id: Hyphenated,
    ) -> Result<(), RepoError> {
        for statement in [
            "DELETE FROM post_categories WHERE post_id = ?",
            "DELETE FROM post_tags WHERE post_id = ?",
            "DELETE FROM slug_mapping WHERE post_id = ?",
            "DELETE FROM posts WHERE id = ?",
        ] {
            sqlx::query(statement)
                .bind(post_id)
                .execute(tx.as_mut())
                .await
                .map_err(map_sqlx_error)?;
        }
        Ok(())
    }

    async fn upsert_slug_mapping(
        tx: &mut Transaction<'_, Sqlite>,
        slug: &str,
        post_id: Hyphenated,
        is_primary: bool,
        now: OffsetDateTime,
    ) -> Result<(), RepoError> {
        sqlx::query(
            r#"
            INSERT INTO slug_mapping (slug, post_id, is_primary, created_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT (slug) DO UPDATE SET
                post_id = excluded.post_id,
                is_primary = excluded.is_primary
            "#,
        )
        .bind(slug)
        .bind(post_id)
        .bind(is_primary)
        .bind(now)
        .execute(tx.as_mut())
        .await
        .map_err(map_sqlx_error)?;
        Ok(())
    }
}
