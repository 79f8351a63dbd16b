//! Configuration layer: typed settings with layered precedence (file → env → CLI).

mod cli;

pub use cli::*;

use std::{net::SocketAddr, num::NonZeroU32, path::PathBuf, str::FromStr, time::Duration};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use url::Url;

use crate::application::sync::RetryPolicy;
use crate::domain::duplicates::DuplicatePolicy;

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "inkbridge";
const ENV_PREFIX: &str = "INKBRIDGE";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_GRACEFUL_SHUTDOWN_SECS: u64 = 30;
const DEFAULT_DB_PATH: &str = "data/blog.db";
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 4;
const DEFAULT_GITHUB_BRANCH: &str = "main";
const DEFAULT_GITHUB_API_BASE: &str = "https://api.github.com";
const DEFAULT_SYNC_BATCH_SIZE: u32 = 10;
const DEFAULT_LOCAL_CONTENT_DIR: &str = "content-backup";
const DEFAULT_BACKUP_DIR: &str = "backups";
const DEFAULT_KEEP_BACKUPS: u64 = 5;

/// Environment names read when the prefixed keys are absent.
pub mod legacy_env {
    pub const GITHUB_TOKEN: &str = "GITHUB_TOKEN";
    pub const GITHUB_OWNER: &str = "NEXT_PUBLIC_GITHUB_REPO_OWNER";
    pub const GITHUB_REPO: &str = "NEXT_PUBLIC_GITHUB_REPO_NAME";
    pub const DB_PATH: &str = "DB_PATH";
    pub const REPLICA_URL: &str = "TURSO_DATABASE_URL";
    pub const REPLICA_AUTH_TOKEN: &str = "TURSO_AUTH_TOKEN";
}

/// Fully-resolved settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub database: DatabaseSettings,
    pub github: GithubSettings,
    pub sync: SyncSettings,
    pub duplicates: DuplicatePolicy,
    pub replica: ReplicaSettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub addr: SocketAddr,
    pub graceful_shutdown: Duration,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct DatabaseSettings {
    pub path: PathBuf,
    pub max_connections: NonZeroU32,
}

#[derive(Debug, Clone)]
pub struct GithubSettings {
    pub owner: Option<String>,
    pub repo: Option<String>,
    pub branch: String,
    pub api_base: Url,
    pub token: Option<String>,
}

impl GithubSettings {
    /// Owner and repository, when both are set.
    pub fn repository(&self) -> Option<(&str, &str)> {
        Some((self.owner.as_deref()?, self.repo.as_deref()?))
    }

    /// Whether writes to GitHub are possible.
    pub fn is_configured(&self) -> bool {
        self.token.is_some() && self.repository().is_some()
    }

    /// Base for absolutizing relative image paths found in front matter.
    pub fn raw_base_url(&self) -> Option<String> {
        self.repository().map(|(owner, repo)| {
            format!(
                "https://raw.githubusercontent.com/{owner}/{repo}/{}",
                self.branch
            )
        })
    }
}

#[derive(Debug, Clone)]
pub struct SyncSettings {
    pub batch_size: NonZeroU32,
    pub retry: RetryPolicy,
    pub local_content_dir: PathBuf,
}

#[derive(Debug, Clone)]
pub struct ReplicaSettings {
    pub url: Option<String>,
    pub auth_token: Option<String>,
    pub backup_dir: PathBuf,
    pub keep_backups: usize,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;
    raw.apply_legacy_env(|key| std::env::var(key).ok());

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        Some(Command::Sync(args)) => raw.apply_database_override(&args.database),
        Some(Command::Dedupe(args)) => raw.apply_database_override(&args.database),
        Some(Command::Recount(args))
        | Some(Command::Status(args))
        | Some(Command::RetryFailed(args)) => raw.apply_database_override(&args.database),
        Some(Command::Replica(args)) => match &args.command {
            ReplicaCommand::Push(push) => raw.apply_replica_push_overrides(push),
        },
        None => raw.apply_serve_overrides(&ServeOverrides::default()),
    }

    Settings::from_raw(raw)
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    database: RawDatabaseSettings,
    github: RawGithubSettings,
    sync: RawSyncSettings,
    duplicates: RawDuplicateSettings,
    replica: RawReplicaSettings,
}

impl RawSettings {
    /// Fill unset keys from the legacy environment names.
    fn apply_legacy_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        fn fill(slot: &mut Option<String>, value: Option<String>) {
            let unset = slot.as_deref().is_none_or(|v| v.trim().is_empty());
            if unset && let Some(value) = value.filter(|v| !v.trim().is_empty()) {
                *slot = Some(value);
            }
        }

        fill(&mut self.github.token, lookup(legacy_env::GITHUB_TOKEN));
        fill(&mut self.github.owner, lookup(legacy_env::GITHUB_OWNER));
        fill(&mut self.github.repo, lookup(legacy_env::GITHUB_REPO));
        fill(&mut self.replica.url, lookup(legacy_env::REPLICA_URL));
        fill(
            &mut self.replica.auth_token,
            lookup(legacy_env::REPLICA_AUTH_TOKEN),
        );
        if self.database.path.is_none()
            && let Some(path) = lookup(legacy_env::DB_PATH).filter(|v| !v.trim().is_empty())
        {
            self.database.path = Some(PathBuf::from(path));
        }
    }

    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        if let Some(host) = overrides.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(port) = overrides.server_port {
            self.server.port = Some(port);
        }
        if let Some(seconds) = overrides.server_graceful_shutdown_seconds {
            self.server.graceful_shutdown_seconds = Some(seconds);
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(max) = overrides.database_max_connections {
            self.database.max_connections = Some(max);
        }

        self.apply_database_override(&overrides.database);
    }

    fn apply_database_override(&mut self, overrides: &DatabaseOverride) {
        if let Some(path) = overrides.database_path.as_ref() {
            self.database.path = Some(path.clone());
        }
    }

    fn apply_replica_push_overrides(&mut self, overrides: &ReplicaPushArgs) {
        if let Some(url) = overrides.replica_url.as_ref() {
            self.replica.url = Some(url.clone());
        }
        self.apply_database_override(&overrides.database);
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            database,
            github,
            sync,
            duplicates,
            replica,
        } = raw;

        Ok(Self {
            server: build_server_settings(server)?,
            logging: build_logging_settings(logging)?,
            database: build_database_settings(database)?,
            github: build_github_settings(github)?,
            sync: build_sync_settings(sync)?,
            duplicates: build_duplicate_policy(duplicates)?,
            replica: build_replica_settings(replica)?,
        })
    }
}

fn build_server_settings(server: RawServerSettings) -> Result<ServerSettings, LoadError> {
    let host = server.host.unwrap_or_else(|| DEFAULT_HOST.to_string());

    let port = server.port.unwrap_or(DEFAULT_PORT);
    if port == 0 {
        return Err(LoadError::invalid(
            "server.port",
            "port must be greater than zero",
        ));
    }

    let addr = parse_socket_addr(&host, port)
        .map_err(|reason| LoadError::invalid("server.addr", reason))?;

    let graceful_secs = server
        .graceful_shutdown_seconds
        .unwrap_or(DEFAULT_GRACEFUL_SHUTDOWN_SECS);
    if graceful_secs == 0 {
        return Err(LoadError::invalid(
            "server.graceful_shutdown_seconds",
            "must be greater than zero",
        ));
    }

    Ok(ServerSettings {
        addr,
        graceful_shutdown: Duration::from_secs(graceful_secs),
    })
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_database_settings(database: RawDatabaseSettings) -> Result<DatabaseSettings, LoadError> {
    let path = database
        .path
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DB_PATH));
    if path.as_os_str().is_empty() {
        return Err(LoadError::invalid("database.path", "path must not be empty"));
    }

    let max_connections = non_zero_u32(
        database
            .max_connections
            .unwrap_or(DEFAULT_DB_MAX_CONNECTIONS)
            .into(),
        "database.max_connections",
    )?;

    Ok(DatabaseSettings {
        path,
        max_connections,
    })
}

fn build_github_settings(github: RawGithubSettings) -> Result<GithubSettings, LoadError> {
    let api_base = github
        .api_base
        .and_then(non_blank)
        .unwrap_or_else(|| DEFAULT_GITHUB_API_BASE.to_string());
    let api_base = Url::parse(&api_base)
        .map_err(|err| LoadError::invalid("github.api_base", format!("invalid url: {err}")))?;

    Ok(GithubSettings {
        owner: github.owner.and_then(non_blank),
        repo: github.repo.and_then(non_blank),
        branch: github
            .branch
            .and_then(non_blank)
            .unwrap_or_else(|| DEFAULT_GITHUB_BRANCH.to_string()),
        api_base,
        token: github.token.and_then(non_blank),
    })
}

fn build_sync_settings(sync: RawSyncSettings) -> Result<SyncSettings, LoadError> {
    let defaults = RetryPolicy::default();

    let batch_size = non_zero_u32(
        sync.batch_size.unwrap_or(DEFAULT_SYNC_BATCH_SIZE).into(),
        "sync.batch_size",
    )?;
    let max_retries = non_zero_u32(
        sync.max_retries.unwrap_or(defaults.max_retries).into(),
        "sync.max_retries",
    )?;

    let backoff_base = sync
        .backoff_base_seconds
        .map(Duration::from_secs)
        .unwrap_or(defaults.backoff_base);
    if backoff_base.is_zero() {
        return Err(LoadError::invalid(
            "sync.backoff_base_seconds",
            "must be greater than zero",
        ));
    }
    let max_backoff = sync
        .max_backoff_seconds
        .map(Duration::from_secs)
        .unwrap_or(defaults.max_backoff);
    if max_backoff < backoff_base {
        return Err(LoadError::invalid(
            "sync.max_backoff_seconds",
            "must not be smaller than sync.backoff_base_seconds",
        ));
    }

    Ok(SyncSettings {
        batch_size,
        retry: RetryPolicy {
            max_retries: max_retries.get(),
            backoff_base,
            max_backoff,
        },
        local_content_dir: sync
            .local_content_dir
            .unwrap_or_else(|| PathBuf::from(DEFAULT_LOCAL_CONTENT_DIR)),
    })
}

fn build_duplicate_policy(raw: RawDuplicateSettings) -> Result<DuplicatePolicy, LoadError> {
    let defaults = DuplicatePolicy::default();
    let title_threshold = raw.title_threshold.unwrap_or(defaults.title_threshold);
    let content_threshold = raw.content_threshold.unwrap_or(defaults.content_threshold);

    for (key, value) in [
        ("duplicates.title_threshold", title_threshold),
        ("duplicates.content_threshold", content_threshold),
    ] {
        if !(0.0..=1.0).contains(&value) {
            return Err(LoadError::invalid(key, "must be between 0 and 1"));
        }
    }

    let content_prefix_chars = raw
        .content_prefix_chars
        .unwrap_or(defaults.content_prefix_chars as u64);
    if content_prefix_chars == 0 {
        return Err(LoadError::invalid(
            "duplicates.content_prefix_chars",
            "must be greater than zero",
        ));
    }
    let content_prefix_chars = usize::try_from(content_prefix_chars).map_err(|_| {
        LoadError::invalid(
            "duplicates.content_prefix_chars",
            "value exceeds supported range for usize",
        )
    })?;

    Ok(DuplicatePolicy {
        title_threshold,
        content_threshold,
        content_prefix_chars,
    })
}

fn build_replica_settings(replica: RawReplicaSettings) -> Result<ReplicaSettings, LoadError> {
    let keep_backups = replica.keep_backups.unwrap_or(DEFAULT_KEEP_BACKUPS);
    if keep_backups == 0 {
        return Err(LoadError::invalid(
            "replica.keep_backups",
            "must be greater than zero",
        ));
    }
    let keep_backups = usize::try_from(keep_backups).map_err(|_| {
        LoadError::invalid(
            "replica.keep_backups",
            "value exceeds supported range for usize",
        )
    })?;

    Ok(ReplicaSettings {
        url: replica.url.and_then(non_blank),
        auth_token: replica.auth_token.and_then(non_blank),
        backup_dir: replica
            .backup_dir
            .unwrap_or_else(|| PathBuf::from(DEFAULT_BACKUP_DIR)),
        keep_backups,
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    port: Option<u16>,
    graceful_shutdown_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawDatabaseSettings {
    path: Option<PathBuf>,
    max_connections: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawGithubSettings {
    owner: Option<String>,
    repo: Option<String>,
    branch: Option<String>,
    api_base: Option<String>,
    token: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSyncSettings {
    batch_size: Option<u32>,
    max_retries: Option<u32>,
    backoff_base_seconds: Option<u64>,
    max_backoff_seconds: Option<u64>,
    local_content_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawDuplicateSettings {
    title_threshold: Option<f64>,
    content_threshold: Option<f64>,
    content_prefix_chars: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawReplicaSettings {
    url: Option<String>,
    auth_token: Option<String>,
    backup_dir: Option<PathBuf>,
    keep_backups: Option<u64>,
}

fn non_blank(value: String) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = format!("{host}:{port}");
    candidate
        .parse()
        .map_err(|err| format!("invalid address `{candidate}`: {err}"))
}

fn non_zero_u32(value: u64, key: &'static str) -> Result<NonZeroU32, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    let value_u32: u32 = value
        .try_into()
        .map_err(|_| LoadError::invalid(key, "value exceeds supported range for u32"))?;
    NonZeroU32::new(value_u32).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}
