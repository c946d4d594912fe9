//! Custom error types for the hot backup agent.

use std::path::PathBuf;
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Secret error: {0}")]
    Secret(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Object store error: {0}")]
    ObjectStore(#[from] object_store::Error),

    #[error("Invalid bucket URL: {0}")]
    BucketUrl(#[from] url::ParseError),

    #[error("No backup sequences found in {}", .0.display())]
    EmptyBackupDir(PathBuf),

    #[error("Member index {index} is out of range, only {count} available")]
    MemberIndexOutOfRange { index: usize, count: usize },

    #[error("No archived backups found under '{0}'")]
    NoArchivedBackups(String),

    #[error("Local member count {local} does not match archived member count {archived}")]
    TopologyMismatch { local: usize, archived: usize },

    #[error("Hostname '{0}' does not end with a member ordinal")]
    BadHostname(String),

    #[error("'{0}' is not a backup sequence name")]
    NotASequence(String),

    #[error("Upload task {0} not found")]
    TaskNotFound(Uuid),

    #[error("Upload canceled")]
    Cancelled,

    #[error("Worker task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

pub type Result<T> = std::result::Result<T, AgentError>;
