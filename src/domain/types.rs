//! Shared domain enumerations aligned with persisted text columns.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::domain::error::DomainError;

/// Operation recorded in the sync queue for replay against the remote store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncOperation {
    Create,
    Update,
    Delete,
}

impl SyncOperation {
    pub fn as_str(self) -> &'static str {
        match self {
            SyncOperation::Create => "create",
            SyncOperation::Update => "update",
            SyncOperation::Delete => "delete",
        }
    }
}

impl TryFrom<&str> for SyncOperation {
    type Error = DomainError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "create" => Ok(SyncOperation::Create),
            "update" => Ok(SyncOperation::Update),
            "delete" => Ok(SyncOperation::Delete),
            other => Err(DomainError::unknown_value("sync operation", other)),
        }
    }
}

/// Lifecycle of a queued sync item.
///
/// `Pending` and `Error` are drainable; `Success` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueStatus {
    Pending,
    Success,
    Error,
    Failed,
}

impl QueueStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            QueueStatus::Pending => "pending",
            QueueStatus::Success => "success",
            QueueStatus::Error => "error",
            QueueStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, QueueStatus::Success | QueueStatus::Failed)
    }
}

impl TryFrom<&str> for QueueStatus {
    type Error = DomainError;

    fn try_from(value: &str) -> Result<Self, DomainError> {
        match value {
            "pending" => Ok(QueueStatus::Pending),
            "success" => Ok(QueueStatus::Success),
            "error" => Ok(QueueStatus::Error),
            "failed" => Ok(QueueStatus::Failed),
            other => Err(DomainError::unknown_value("queue status", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SyncDirection {
    ToGithub,
    FromGithub,
    Bidirectional,
    ToLocal,
    FromLocal,
}

impl SyncDirection {
    pub fn as_str(self) -> &'static str {
        match self {
            SyncDirection::ToGithub => "to-github",
            SyncDirection::FromGithub => "from-github",
            SyncDirection::Bidirectional => "bidirectional",
            SyncDirection::ToLocal => "to-local",
            SyncDirection::FromLocal => "from-local",
        }
    }
}

impl fmt::Display for SyncDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncDirection {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "to-github" => Ok(SyncDirection::ToGithub),
            "from-github" => Ok(SyncDirection::FromGithub),
            "bidirectional" => Ok(SyncDirection::Bidirectional),
            "to-local" => Ok(SyncDirection::ToLocal),
            "from-local" => Ok(SyncDirection::FromLocal),
            other => Err(DomainError::unknown_value("sync direction", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    Syncing,
    Idle,
}
