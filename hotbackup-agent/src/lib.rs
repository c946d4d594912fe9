//! Hot Backup Agent Library
//!
//! Sidecar agent that uploads persistence snapshots ("hot backups") of a
//! cluster member to object storage and restores them on startup.

pub mod api;
pub mod archive;
pub mod config;
pub mod daemon;
pub mod executor;
pub mod fs;
pub mod storage;
pub mod utils;

// Re-export commonly used types
pub use config::Config;
pub use utils::errors::AgentError;
pub type Result<T> = std::result::Result<T, AgentError>;
