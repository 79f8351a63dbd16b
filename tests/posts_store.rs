mod support;

use inkbridge::application::posts::PostServiceError;
use inkbridge::application::repos::{PostsRepo, SyncQueueRepo, TaxonomyRepo};
use inkbridge::domain::types::{QueueStatus, SyncOperation};
use time::OffsetDateTime;

use support::{TestContext, post};

#[tokio::test]
async fn repeated_titles_get_counter_suffixes() {
    let ctx = TestContext::new().await;

    let first = ctx.save(post("Foo", "one", &["tech"])).await;
    let second = ctx.save(post("Foo", "two", &["tech"])).await;
    let third = ctx.save(post("Foo", "three", &["tech"])).await;

    assert_eq!(first.slug, "foo");
    assert_eq!(second.slug, "foo-1");
    assert_eq!(third.slug, "foo-2");
    assert_eq!(
        ctx.posts
            .ensure_unique_slug("foo", None)
            .await
            .expect("unique slug"),
        "foo-3"
    );
}

#[tokio::test]
async fn title_change_regenerates_slug_and_keeps_alias() {
    let ctx = TestContext::new().await;
    let original = ctx.save(post("Hello World", "body", &["life"])).await;
    assert_eq!(original.slug, "hello-world");

    let mut edit = post("Goodbye World", "body", &["life"]);
    edit.id = Some(original.id);
    let renamed = ctx.save(edit).await;

    assert_eq!(renamed.id, original.id);
    assert_eq!(renamed.slug, "goodbye-world");

    let via_alias = ctx
        .posts
        .resolve_slug("hello-world")
        .await
        .expect("resolve")
        .expect("alias resolves");
    assert_eq!(via_alias.post.id, original.id);
    assert_eq!(via_alias.categories, vec!["life"]);

    let history = ctx.posts.slug_history(original.id).await.expect("history");
    let primary: Vec<_> = history.iter().filter(|m| m.is_primary).collect();
    assert_eq!(primary.len(), 1);
    assert_eq!(primary[0].slug, "goodbye-world");
    assert!(history.iter().any(|m| m.slug == "hello-world" && !m.is_primary));

    // The retired slug stays reserved for the renamed post.
    let newcomer = ctx.save(post("Hello World", "other", &["life"])).await;
    assert_eq!(newcomer.slug, "hello-world-1");
}

#[tokio::test]
async fn custom_slug_survives_title_edit() {
    let ctx = TestContext::new().await;
    let mut create = post("Release Notes", "body", &[]);
    create.slug = Some("changelog".to_string());
    let saved = ctx.save(create).await;
    assert_eq!(saved.slug, "changelog");

    let mut edit = post("Release Notes 2024", "body", &[]);
    edit.id = Some(saved.id);
    let edited = ctx.save(edit).await;
    assert_eq!(edited.slug, "changelog");
}

#[tokio::test]
async fn counts_follow_saves_and_deletes() {
    let ctx = TestContext::new().await;

    let kept = ctx.save(post("Kept", "a", &["tech"])).await;
    let removed = ctx.save(post("Removed", "b", &["tech"])).await;
    let mut draft = post("Draft", "c", &["tech"]);
    draft.published = false;
    ctx.save(draft).await;

    let tech = ctx.category("tech").await.expect("tech category");
    assert_eq!(tech.post_count, 2);
    assert_eq!(tech.name, "技术");

    ctx.posts.delete_post(removed.id).await.expect("delete");

    let tech = ctx.category("tech").await.expect("tech category");
    assert_eq!(tech.post_count, 1);
    assert!(
        ctx.repos
            .find_by_id(removed.id)
            .await
            .expect("lookup")
            .is_none()
    );
    assert!(
        ctx.repos
            .resolve_slug(&removed.slug)
            .await
            .expect("lookup")
            .is_none()
    );
    assert!(ctx.repos.find_by_id(kept.id).await.expect("lookup").is_some());
}

#[tokio::test]
async fn delete_removes_links_aliases_and_tag_counts() {
    let ctx = TestContext::new().await;
    let mut create = post("Tagged", "body", &["tech"]);
    create.tags = vec!["rust".to_string()];
    let saved = ctx.save(create).await;
    let mut other = post("Also Tagged", "body", &["tech"]);
    other.tags = vec!["rust".to_string()];
    ctx.save(other).await;

    let mut rename = post("Tagged Again", "body", &["tech"]);
    rename.id = Some(saved.id);
    rename.tags = vec!["rust".to_string()];
    ctx.save(rename).await;

    let rust_count = |tags: Vec<inkbridge::domain::entities::TagRecord>| {
        tags.into_iter()
            .find(|tag| tag.slug == "rust")
            .map_or(0, |tag| tag.post_count)
    };
    let tags = TaxonomyRepo::list_tags(ctx.repos.as_ref()).await.expect("tags");
    assert_eq!(rust_count(tags), 2);

    ctx.posts.delete_post(saved.id).await.expect("delete");

    let id = saved.id.hyphenated().to_string();
    for table in ["post_tags", "post_categories", "slug_mapping"] {
        let remaining: i64 =
            sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table} WHERE post_id = ?"))
                .bind(&id)
                .fetch_one(ctx.repos.pool())
                .await
                .expect("count links");
        assert_eq!(remaining, 0, "{table} rows left for deleted post");
    }
    assert!(
        ctx.repos
            .resolve_slug("tagged")
            .await
            .expect("lookup")
            .is_none()
    );

    let tags = TaxonomyRepo::list_tags(ctx.repos.as_ref()).await.expect("tags");
    assert_eq!(rust_count(tags), 1);
}

#[tokio::test]
async fn renaming_queues_removal_of_previous_file() {
    let ctx = TestContext::new().await;
    let created = ctx.save(post("Moving", "a", &["tech"])).await;

    let mut edit = post("Moving Out", "a", &["finance"]);
    edit.id = Some(created.id);
    ctx.save(edit).await;

    let batch = ctx
        .repos
        .next_batch(OffsetDateTime::now_utc(), 10)
        .await
        .expect("batch");
    let queued: Vec<_> = batch
        .iter()
        .map(|item| (item.operation, item.path.as_deref()))
        .collect();
    assert_eq!(
        queued,
        vec![
            (SyncOperation::Create, Some("content/posts/tech/moving.md")),
            (SyncOperation::Update, Some("content/posts/finance/moving-out.md")),
            (SyncOperation::Delete, Some("content/posts/tech/moving.md")),
        ]
    );
}

#[tokio::test]
async fn admin_changes_are_queued_in_order() {
    let ctx = TestContext::new().await;

    let created = ctx.save(post("Queued", "a", &["finance"])).await;
    let mut edit = post("Queued", "a, edited", &["finance"]);
    edit.id = Some(created.id);
    ctx.save(edit).await;
    ctx.posts.delete_post(created.id).await.expect("delete");

    let batch = ctx
        .repos
        .next_batch(OffsetDateTime::now_utc(), 10)
        .await
        .expect("batch");
    let operations: Vec<_> = batch.iter().map(|item| item.operation).collect();
    assert_eq!(
        operations,
        vec![
            SyncOperation::Create,
            SyncOperation::Update,
            SyncOperation::Delete
        ]
    );
    assert!(batch.iter().all(|item| item.status == QueueStatus::Pending));
    assert_eq!(
        batch[2].path.as_deref(),
        Some("content/posts/finance/queued.md")
    );
}

#[tokio::test]
async fn deleting_unknown_post_is_not_found() {
    let ctx = TestContext::new().await;
    let err = ctx
        .posts
        .delete_post(uuid::Uuid::new_v4())
        .await
        .expect_err("missing post");
    assert!(matches!(err, PostServiceError::NotFound(_)));
    assert_eq!(
        ctx.repos
            .count_by_status(QueueStatus::Pending)
            .await
            .expect("count"),
        0
    );
}

#[tokio::test]
async fn empty_title_is_rejected() {
    let ctx = TestContext::new().await;
    let err = ctx
        .posts
        .save_post(post("   ", "body", &[]))
        .await
        .expect_err("empty title");
    assert!(matches!(err, PostServiceError::ConstraintViolation(_)));
}

#[tokio::test]
async fn admin_saves_use_import_excerpt_and_reading_time() {
    let ctx = TestContext::new().await;
    let body = "word ".repeat(401);
    let saved = ctx.save(post("Long Read", &body, &[])).await;

    assert_eq!(saved.reading_time, 3);
    assert_eq!(
        saved.excerpt,
        inkbridge::domain::front_matter::summarize(&body)
    );
    assert!(saved.excerpt.ends_with("..."));
}
