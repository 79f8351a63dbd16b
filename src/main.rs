use std::{path::PathBuf, process, sync::Arc};

use inkbridge::{
    application::{
        duplicates::DedupeService,
        error::AppError,
        posts::PostService,
        replica::ReplicaService,
        repos::{PostsRepo, PostsWriteRepo, SnapshotRepo, SyncQueueRepo, SyncStatusRepo, TaxonomyRepo},
        sync::{ContentStore, SyncService, SyncStores},
        taxonomy::TaxonomyService,
    },
    config,
    infra::{
        db::SqliteRepositories,
        error::InfraError,
        github::{self, GithubContentStore},
        http::{self, AdminApiState},
        local::LocalContentStore,
        replica::connect_replica,
        telemetry,
    },
};
use serde::Serialize;
use tokio::signal;
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::Sync(args) => run_sync(settings, args).await,
        config::Command::Dedupe(args) => run_dedupe(settings, args).await,
        config::Command::Recount(_) => run_recount(settings).await,
        config::Command::Replica(args) => match args.command {
            config::ReplicaCommand::Push(push) => run_replica_push(settings, push).await,
        },
        config::Command::Status(_) => run_status(settings).await,
        config::Command::RetryFailed(_) => run_retry_failed(settings).await,
    }
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let repositories = init_repositories(&settings).await?;
    let app = build_application_context(repositories, &settings, None).await?;

    let state = AdminApiState {
        db: app.repositories,
        posts: app.posts,
        taxonomy: app.taxonomy,
        sync: app.sync,
        dedupe: app.dedupe,
        replica: app.replica,
    };
    let router = http::build_router(state);

    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;
    info!(
        target = "inkbridge::serve",
        addr = %settings.server.addr,
        "admin API listening"
    );

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
    let server = tokio::spawn(async move {
        axum::serve(listener, router.into_make_service())
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
    });

    shutdown_signal().await;
    info!(target = "inkbridge::serve", "shutdown requested");
    let _ = shutdown_tx.send(());

    match tokio::time::timeout(settings.server.graceful_shutdown, server).await {
        Ok(Ok(Ok(()))) => Ok(()),
        Ok(Ok(Err(err))) => Err(AppError::unexpected(format!("server error: {err}"))),
        Ok(Err(join)) => Err(AppError::unexpected(format!("server task failed: {join}"))),
        Err(_) => {
            warn!(
                target = "inkbridge::serve",
                timeout_secs = settings.server.graceful_shutdown.as_secs(),
                "graceful shutdown timed out"
            );
            Ok(())
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            error!(error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                error!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

async fn run_sync(settings: config::Settings, args: config::SyncArgs) -> Result<(), AppError> {
    let repositories = init_repositories(&settings).await?;
    let app = build_application_context(repositories, &settings, args.dir).await?;

    info!(
        target = "inkbridge::sync",
        direction = %args.direction,
        "starting sync"
    );
    let outcome = app.sync.sync(args.direction).await?;
    print_json(&outcome)?;

    if outcome.success() {
        Ok(())
    } else {
        Err(AppError::unexpected(format!(
            "sync `{}` finished with errors",
            args.direction
        )))
    }
}

async fn run_dedupe(settings: config::Settings, args: config::DedupeArgs) -> Result<(), AppError> {
    let repositories = init_repositories(&settings).await?;
    let app = build_application_context(repositories, &settings, None).await?;

    let report = app.dedupe.process_duplicate_groups(args.apply).await?;
    info!(
        target = "inkbridge::dedupe",
        applied = report.applied,
        groups = report.groups.len(),
        removed = report.removed,
        "duplicate scan finished"
    );
    print_json(&report)
}

async fn run_recount(settings: config::Settings) -> Result<(), AppError> {
    let repositories = init_repositories(&settings).await?;
    let app = build_application_context(repositories, &settings, None).await?;

    app.posts.recount().await?;
    info!(target = "inkbridge::recount", "post counts recomputed");
    Ok(())
}

async fn run_replica_push(
    settings: config::Settings,
    args: config::ReplicaPushArgs,
) -> Result<(), AppError> {
    let repositories = init_repositories(&settings).await?;
    let app = build_application_context(repositories, &settings, None).await?;

    let report = app.replica.push(&args.tables, args.dry_run).await?;
    print_json(&report)
}

async fn run_status(settings: config::Settings) -> Result<(), AppError> {
    let repositories = init_repositories(&settings).await?;
    let app = build_application_context(repositories, &settings, None).await?;

    let status = app.sync.status().await?;
    print_json(&status)
}

async fn run_retry_failed(settings: config::Settings) -> Result<(), AppError> {
    let repositories = init_repositories(&settings).await?;
    let app = build_application_context(repositories, &settings, None).await?;

    let reset = app.sync.retry_failed().await?;
    info!(
        target = "inkbridge::sync",
        reset, "failed queue items returned to pending"
    );
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<(), AppError> {
    let rendered = serde_json::to_string_pretty(value)
        .map_err(|err| AppError::unexpected(format!("failed to render output: {err}")))?;
    println!("{rendered}");
    Ok(())
}

struct ApplicationContext {
    repositories: Arc<SqliteRepositories>,
    posts: Arc<PostService>,
    taxonomy: Arc<TaxonomyService>,
    sync: Arc<SyncService>,
    dedupe: Arc<DedupeService>,
    replica: Arc<ReplicaService>,
}

async fn init_repositories(
    settings: &config::Settings,
) -> Result<Arc<SqliteRepositories>, AppError> {
    let pool = SqliteRepositories::connect(
        &settings.database.path,
        settings.database.max_connections.get(),
    )
    .await
    .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;

    SqliteRepositories::run_migrations(&pool)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;

    info!(
        target = "inkbridge::db",
        path = %settings.database.path.display(),
        "database ready"
    );
    Ok(Arc::new(SqliteRepositories::new(pool)))
}

async fn build_application_context(
    repositories: Arc<SqliteRepositories>,
    settings: &config::Settings,
    local_dir: Option<PathBuf>,
) -> Result<ApplicationContext, AppError> {
    let posts_repo: Arc<dyn PostsRepo> = repositories.clone();
    let posts_write_repo: Arc<dyn PostsWriteRepo> = repositories.clone();
    let taxonomy_repo: Arc<dyn TaxonomyRepo> = repositories.clone();
    let queue_repo: Arc<dyn SyncQueueRepo> = repositories.clone();
    let status_repo: Arc<dyn SyncStatusRepo> = repositories.clone();
    let snapshot_repo: Arc<dyn SnapshotRepo> = repositories.clone();

    let post_service = PostService::new(
        posts_repo.clone(),
        posts_write_repo.clone(),
        taxonomy_repo.clone(),
        queue_repo.clone(),
    );

    let stores = SyncStores {
        remote: build_remote_store(&settings.github)?,
        local: Arc::new(LocalContentStore::new(
            local_dir.unwrap_or_else(|| settings.sync.local_content_dir.clone()),
        )),
    };
    let sync_service = SyncService::new(
        post_service.clone(),
        posts_repo.clone(),
        queue_repo,
        status_repo,
        stores,
        settings.sync.retry,
    )
    .with_batch_size(settings.sync.batch_size.get())
    .with_raw_base_url(settings.github.raw_base_url());

    let dedupe_service = DedupeService::new(
        posts_repo,
        posts_write_repo,
        taxonomy_repo.clone(),
        settings.duplicates,
    );

    let replica_target = match settings.replica.url.as_deref() {
        Some(url) => Some(connect_replica(url, settings.replica.auth_token.as_deref()).await?),
        None => None,
    };
    let replica_service = ReplicaService::new(
        snapshot_repo,
        replica_target,
        settings.replica.backup_dir.clone(),
        settings.replica.keep_backups,
    );

    Ok(ApplicationContext {
        repositories,
        posts: Arc::new(post_service),
        taxonomy: Arc::new(TaxonomyService::new(taxonomy_repo)),
        sync: Arc::new(sync_service),
        dedupe: Arc::new(dedupe_service),
        replica: Arc::new(replica_service),
    })
}

fn build_remote_store(
    github_settings: &config::GithubSettings,
) -> Result<Option<Arc<dyn ContentStore>>, AppError> {
    let (Some(token), Some((owner, repo))) = (
        github_settings.token.as_ref(),
        github_settings.repository(),
    ) else {
        info!(
            target = "inkbridge::github",
            "github is not configured; remote sync falls back to the local mirror"
        );
        return Ok(None);
    };

    let store = GithubContentStore::new(github::GithubSettings {
        api_base: github_settings.api_base.clone(),
        owner: owner.to_string(),
        repo: repo.to_string(),
        branch: github_settings.branch.clone(),
        token: token.clone(),
    })?;
    Ok(Some(Arc::new(store)))
}
