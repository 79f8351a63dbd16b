#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;

use inkbridge::application::duplicates::DedupeService;
use inkbridge::application::posts::{PostService, SavePostCommand};
use inkbridge::application::replica::{ReplicaService, ReplicaTarget};
use inkbridge::application::repos::{
    PostsRepo, PostsWriteRepo, SnapshotRepo, SyncQueueRepo, SyncStatusRepo, TaxonomyRepo,
};
use inkbridge::application::sync::{ContentStore, RetryPolicy, SyncService, SyncStores};
use inkbridge::application::taxonomy::TaxonomyService;
use inkbridge::domain::duplicates::DuplicatePolicy;
use inkbridge::domain::entities::{CategoryRecord, PostRecord};
use inkbridge::infra::db::SqliteRepositories;
use inkbridge::infra::http::AdminApiState;
use inkbridge::infra::local::LocalContentStore;
use tempfile::TempDir;

pub struct TestContext {
    pub dir: TempDir,
    pub repos: Arc<SqliteRepositories>,
    pub posts: PostService,
}

impl TestContext {
    pub async fn new() -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let pool = SqliteRepositories::connect(&dir.path().join("data/blog.db"), 2)
            .await
            .expect("connect sqlite");
        SqliteRepositories::run_migrations(&pool)
            .await
            .expect("run migrations");
        let repos = Arc::new(SqliteRepositories::new(pool));

        let posts = PostService::new(
            repos.clone() as Arc<dyn PostsRepo>,
            repos.clone() as Arc<dyn PostsWriteRepo>,
            repos.clone() as Arc<dyn TaxonomyRepo>,
            repos.clone() as Arc<dyn SyncQueueRepo>,
        );

        Self { dir, repos, posts }
    }

    pub fn local_store(&self) -> Arc<LocalContentStore> {
        Arc::new(LocalContentStore::new(self.dir.path().join("mirror")))
    }

    pub fn sync_service(&self, remote: Option<Arc<dyn ContentStore>>) -> SyncService {
        self.sync_service_with(remote, RetryPolicy::default())
    }

    pub fn sync_service_with(
        &self,
        remote: Option<Arc<dyn ContentStore>>,
        retry: RetryPolicy,
    ) -> SyncService {
        SyncService::new(
            self.posts.clone(),
            self.repos.clone() as Arc<dyn PostsRepo>,
            self.repos.clone() as Arc<dyn SyncQueueRepo>,
            self.repos.clone() as Arc<dyn SyncStatusRepo>,
            SyncStores {
                remote,
                local: self.local_store(),
            },
            retry,
        )
    }

    /// Sync service reading local content from another context's mirror.
    pub fn sync_service_with_mirror(&self, mirror: &Path) -> SyncService {
        self.sync_service(None)
            .with_local_store(Arc::new(LocalContentStore::new(mirror)))
    }

    pub fn dedupe_service(&self) -> DedupeService {
        DedupeService::new(
            self.repos.clone() as Arc<dyn PostsRepo>,
            self.repos.clone() as Arc<dyn PostsWriteRepo>,
            self.repos.clone() as Arc<dyn TaxonomyRepo>,
            DuplicatePolicy::default(),
        )
    }

    pub fn replica_service(&self, target: Option<Arc<dyn ReplicaTarget>>) -> ReplicaService {
        ReplicaService::new(
            self.repos.clone() as Arc<dyn SnapshotRepo>,
            target,
            self.dir.path().join("backups"),
            3,
        )
    }

    pub fn api_state(&self) -> AdminApiState {
        AdminApiState {
            db: self.repos.clone(),
            posts: Arc::new(self.posts.clone()),
            taxonomy: Arc::new(TaxonomyService::new(
                self.repos.clone() as Arc<dyn TaxonomyRepo>
            )),
            sync: Arc::new(self.sync_service(None)),
            dedupe: Arc::new(self.dedupe_service()),
            replica: Arc::new(self.replica_service(None)),
        }
    }

    pub async fn save(&self, command: SavePostCommand) -> PostRecord {
        self.posts.save_post(command).await.expect("save post")
    }

    pub async fn category(&self, slug: &str) -> Option<CategoryRecord> {
        TaxonomyRepo::list_categories(self.repos.as_ref())
            .await
            .expect("list categories")
            .into_iter()
            .find(|category| category.slug == slug)
    }
}

pub fn post(title: &str, content: &str, categories: &[&str]) -> SavePostCommand {
    let mut command = SavePostCommand::new(title, content);
    command.date = Some("2024-03-01".to_string());
    command.categories = categories.iter().map(|c| c.to_string()).collect();
    command
}
