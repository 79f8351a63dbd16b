use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueHint, builder::BoolishValueParser};

use crate::domain::types::SyncDirection;

/// Command-line arguments for the inkbridge binary.
#[derive(Debug, Parser)]
#[command(
    name = "inkbridge",
    version,
    about = "Blog content sync between SQLite and a GitHub Markdown repository"
)]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "INKBRIDGE_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the admin HTTP API.
    Serve(Box<ServeArgs>),
    /// Synchronize posts in one direction.
    Sync(SyncArgs),
    /// Find duplicate posts and optionally merge them.
    Dedupe(DedupeArgs),
    /// Recompute category and tag post counts.
    Recount(DatabaseArgs),
    /// Replica utilities.
    Replica(ReplicaArgs),
    /// Print the sync status.
    Status(DatabaseArgs),
    /// Move permanently failed queue items back to pending.
    RetryFailed(DatabaseArgs),
}

#[derive(Debug, Args, Default, Clone)]
pub struct DatabaseOverride {
    /// Override the SQLite database path.
    #[arg(long = "database-path", value_name = "PATH", value_hint = ValueHint::FilePath)]
    pub database_path: Option<PathBuf>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct DatabaseArgs {
    #[command(flatten)]
    pub database: DatabaseOverride,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    #[command(flatten)]
    pub database: DatabaseOverride,

    /// Override the listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the listener port.
    #[arg(long = "server-port", value_name = "PORT")]
    pub server_port: Option<u16>,

    /// Override the graceful shutdown timeout.
    #[arg(long = "server-graceful-shutdown-seconds", value_name = "SECONDS")]
    pub server_graceful_shutdown_seconds: Option<u64>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,

    /// Override the database pool size.
    #[arg(long = "database-max-connections", value_name = "COUNT")]
    pub database_max_connections: Option<u32>,
}

#[derive(Debug, Args, Clone)]
pub struct SyncArgs {
    /// to-github, from-github, bidirectional, to-local or from-local.
    #[arg(value_name = "DIRECTION")]
    pub direction: SyncDirection,

    /// Local content root used by the to-local and from-local directions.
    #[arg(long = "dir", value_name = "PATH", value_hint = ValueHint::DirPath)]
    pub dir: Option<PathBuf>,

    #[command(flatten)]
    pub database: DatabaseOverride,
}

#[derive(Debug, Args, Default, Clone)]
pub struct DedupeArgs {
    /// Merge duplicates instead of only reporting them.
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub apply: bool,

    #[command(flatten)]
    pub database: DatabaseOverride,
}

#[derive(Debug, Args, Clone)]
pub struct ReplicaArgs {
    #[command(subcommand)]
    pub command: ReplicaCommand,
}

#[derive(Debug, Subcommand, Clone)]
pub enum ReplicaCommand {
    /// Copy tables from the local database to the replica.
    Push(ReplicaPushArgs),
}

#[derive(Debug, Args, Default, Clone)]
pub struct ReplicaPushArgs {
    /// Table to push; repeat for several. Defaults to every table.
    #[arg(long = "table", value_name = "TABLE")]
    pub tables: Vec<String>,

    /// Write the backup file without touching the replica.
    #[arg(long = "dry-run", action = clap::ArgAction::SetTrue)]
    pub dry_run: bool,

    /// Override the replica URL.
    #[arg(long = "replica-url", value_name = "URL")]
    pub replica_url: Option<String>,

    #[command(flatten)]
    pub database: DatabaseOverride,
}
