mod support;

use std::sync::Arc;

use inkbridge::application::replica::ReplicaError;
use inkbridge::application::repos::PostsRepo;
use inkbridge::infra::db::SqliteRepositories;
use inkbridge::infra::replica::connect_replica;

use support::{TestContext, post};

#[tokio::test]
async fn dedupe_apply_merges_group_and_keeps_aliases() {
    let ctx = TestContext::new().await;
    let first = ctx
        .save(post("Same Story", "identical body text for both", &["tech"]))
        .await;
    let second = ctx
        .save(post("Same Story", "identical body text for both", &["tech"]))
        .await;
    ctx.save(post("Different", "unrelated words entirely", &["tech"]))
        .await;
    assert_eq!(ctx.category("tech").await.expect("tech").post_count, 3);

    let report = ctx
        .dedupe_service()
        .process_duplicate_groups(true)
        .await
        .expect("dedupe");

    assert!(report.applied);
    assert_eq!(report.groups.len(), 1);
    assert_eq!(report.removed, 1);

    let remaining = ctx.repos.list_posts().await.expect("posts");
    assert_eq!(remaining.len(), 2);
    assert_eq!(ctx.category("tech").await.expect("tech").post_count, 2);

    let survivor_id = report.groups[0].keep.id;
    for slug in [&first.slug, &second.slug] {
        let resolved = ctx
            .repos
            .resolve_slug(slug)
            .await
            .expect("lookup")
            .expect("slug still resolves");
        assert_eq!(resolved.id, survivor_id);
    }
}

fn with_slug(title: &str, slug: &str, content: &str) -> inkbridge::application::posts::SavePostCommand {
    let mut command = post(title, content, &["tech"]);
    command.slug = Some(slug.to_string());
    command
}

#[tokio::test]
async fn dedupe_survivor_takes_core_slug_of_removed_post() {
    let ctx = TestContext::new().await;
    let mut best = with_slug("测试文章", "ce-shi-wen-zhang-a1b2", &"long body text ".repeat(150));
    best.tags = vec!["rust".to_string(), "sqlite".to_string()];
    let best = ctx.save(best).await;
    let plain = ctx
        .save(with_slug("测试文章", "ce-shi-wen-zhang", "short body"))
        .await;

    let report = ctx
        .dedupe_service()
        .process_duplicate_groups(true)
        .await
        .expect("dedupe");

    assert_eq!(report.groups.len(), 1);
    assert_eq!(report.groups[0].keep.id, best.id);
    assert_eq!(report.groups[0].remove[0].id, plain.id);
    assert_eq!(report.groups[0].new_slug.as_deref(), Some("ce-shi-wen-zhang"));

    let survivor = ctx
        .repos
        .find_by_id(best.id)
        .await
        .expect("lookup")
        .expect("survivor");
    assert_eq!(survivor.slug, "ce-shi-wen-zhang");
    let via_old = ctx
        .repos
        .resolve_slug("ce-shi-wen-zhang-a1b2")
        .await
        .expect("lookup")
        .expect("old slug resolves");
    assert_eq!(via_old.id, best.id);
}

#[tokio::test]
async fn dedupe_clean_slug_counts_past_other_posts() {
    let ctx = TestContext::new().await;
    // An unrelated post keeps `ce-shi-wen-zhang` as an alias after a rename.
    let unrelated = ctx.save(post("测试文章", "unrelated words entirely", &["life"])).await;
    assert_eq!(unrelated.slug, "ce-shi-wen-zhang");
    let mut rename = post("Other Topic", "unrelated words entirely", &["life"]);
    rename.id = Some(unrelated.id);
    ctx.save(rename).await;

    let best = ctx
        .save(with_slug("测试文章", "ce-shi-wen-zhang-a1b2", &"long body text ".repeat(150)))
        .await;
    ctx.save(with_slug("测试文章", "ce-shi-wen-zhang-x9y8", "short body"))
        .await;

    let report = ctx
        .dedupe_service()
        .process_duplicate_groups(false)
        .await
        .expect("dedupe");

    assert_eq!(report.groups.len(), 1);
    assert_eq!(report.groups[0].keep.id, best.id);
    assert_eq!(report.groups[0].new_slug.as_deref(), Some("ce-shi-wen-zhang-1"));
}

#[tokio::test]
async fn dedupe_dry_run_changes_nothing() {
    let ctx = TestContext::new().await;
    ctx.save(post("Twin", "same content here", &[])).await;
    ctx.save(post("Twin", "same content here", &[])).await;

    let report = ctx
        .dedupe_service()
        .process_duplicate_groups(false)
        .await
        .expect("dedupe");

    assert!(!report.applied);
    assert_eq!(report.groups.len(), 1);
    assert_eq!(ctx.repos.list_posts().await.expect("posts").len(), 2);
}

#[tokio::test]
async fn replica_push_copies_tables_and_writes_backup() {
    let ctx = TestContext::new().await;
    ctx.save(post("Replicated", "body", &["tech"])).await;

    let replica_path = ctx.dir.path().join("replica.db");
    let target = connect_replica(replica_path.to_str().expect("utf-8 path"), None)
        .await
        .expect("replica");

    let report = ctx
        .replica_service(Some(target.clone()))
        .push(&["posts".to_string(), "categories".to_string()], false)
        .await
        .expect("push");

    assert!(!report.dry_run);
    assert_eq!(report.tables.len(), 2);
    assert_eq!(report.tables[0].rows, 1);
    assert!(std::path::Path::new(&report.backup_file).is_file());

    let replica = SqliteRepositories::connect(&replica_path, 1)
        .await
        .expect("open replica");
    let titles: Vec<String> = sqlx::query_scalar("SELECT title FROM posts")
        .fetch_all(&replica)
        .await
        .expect("replica posts");
    assert_eq!(titles, vec!["Replicated"]);

    let tech_count: i64 =
        sqlx::query_scalar("SELECT post_count FROM categories WHERE slug = 'tech'")
            .fetch_one(&replica)
            .await
            .expect("replica category");
    assert_eq!(tech_count, 1);

    let indexes: Vec<String> = sqlx::query_scalar(
        "SELECT name FROM sqlite_master WHERE type = 'index' AND tbl_name = 'posts' AND sql IS NOT NULL",
    )
    .fetch_all(&replica)
    .await
    .expect("replica indexes");
    assert!(indexes.iter().any(|name| name == "idx_posts_date"));

    // A second push replaces rather than duplicates.
    ctx.replica_service(Some(target))
        .push(&["posts".to_string()], false)
        .await
        .expect("second push");
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM posts")
        .fetch_one(&replica)
        .await
        .expect("count");
    assert_eq!(count, 1);
}

#[tokio::test]
async fn replica_dry_run_needs_no_target() {
    let ctx = TestContext::new().await;
    ctx.save(post("Only Backup", "body", &[])).await;

    let report = ctx
        .replica_service(None)
        .push(&[], true)
        .await
        .expect("dry run");

    assert!(report.dry_run);
    assert!(report.tables.iter().any(|t| t.table == "posts"));
    assert!(report.tables.iter().all(|t| t.table != "_sqlx_migrations"));
    let backup = std::fs::read_to_string(&report.backup_file).expect("backup");
    assert!(backup.contains("INSERT INTO \"posts\""));
    assert!(backup.contains("'Only Backup'"));
}

#[tokio::test]
async fn replica_rejects_unknown_table() {
    let ctx = TestContext::new().await;
    let err = ctx
        .replica_service(None)
        .push(&["nope".to_string()], true)
        .await
        .expect_err("unknown table");
    assert!(matches!(err, ReplicaError::UnknownTable(table) if table == "nope"));
}
