//! Replica targets: a remote libsql (Turso) database or a second SQLite file.

use std::sync::Arc;

use async_trait::async_trait;
use libsql::{Builder, Connection, Database};
use tracing::{info, warn};

use crate::application::replica::ReplicaTarget;
use crate::application::repos::RepoError;
use crate::infra::db::SqliteReplica;
use crate::infra::error::InfraError;

const REMOTE_SCHEMES: [&str; 3] = ["libsql://", "https://", "http://"];

pub fn is_remote_url(url: &str) -> bool {
    REMOTE_SCHEMES.iter().any(|scheme| url.starts_with(scheme))
}

/// Connect to the replica named by `url`.
///
/// Remote URLs go through libsql with `auth_token`; anything else is opened as
/// a SQLite database.
pub async fn connect_replica(
    url: &str,
    auth_token: Option<&str>,
) -> Result<Arc<dyn ReplicaTarget>, InfraError> {
    if is_remote_url(url) {
        let replica = LibsqlReplica::connect(url, auth_token.unwrap_or_default()).await?;
        return Ok(Arc::new(replica));
    }

    if auth_token.is_some() {
        warn!(
            target = "inkbridge::replica",
            "replica auth token is only used for remote replicas"
        );
    }
    Ok(Arc::new(SqliteReplica::connect(url).await?))
}

/// Remote libsql database, such as a Turso production replica.
pub struct LibsqlReplica {
    _database: Database,
    conn: Connection,
    label: String,
}

impl LibsqlReplica {
    pub async fn connect(url: &str, auth_token: &str) -> Result<Self, InfraError> {
        if auth_token.is_empty() {
            warn!(
                target = "inkbridge::replica",
                url = %url,
                "connecting to remote replica without an auth token"
            );
        }

        let database = Builder::new_remote(url.to_string(), auth_token.to_string())
            .build()
            .await
            .map_err(|err| InfraError::database(format!("replica `{url}`: {err}")))?;
        let conn = database
            .connect()
            .map_err(|err| InfraError::database(format!("replica `{url}`: {err}")))?;

        info!(target = "inkbridge::replica", url = %url, "remote replica configured");
        Ok(Self {
            _database: database,
            conn,
            label: url.to_string(),
        })
    }
}

#[async_trait]
impl ReplicaTarget for LibsqlReplica {
    fn describe(&self) -> String {
        self.label.clone()
    }

    async fn apply(&self, statements: &[String]) -> Result<(), RepoError> {
        self.conn
            .execute("PRAGMA foreign_keys = OFF", ())
            .await
            .map_err(RepoError::from_persistence)?;

        let script = statements.join("\n");
        let applied = self
            .conn
            .execute_transactional_batch(&script)
            .await
            .map(|_| ())
            .map_err(RepoError::from_persistence);

        if let Err(err) = self.conn.execute("PRAGMA foreign_keys = ON", ()).await {
            warn!(
                target = "inkbridge::replica",
                error = %err,
                "failed to re-enable replica foreign keys"
            );
        }
        applied
    }
}
