//! Backup and restore orchestration.
//!
//! - [`backup`]: pick this member's snapshot from the latest local sequence
//!   and upload it as an archive
//! - [`restore`]: pick this member's archive from the bucket and unpack it
//!   over the local hot-restart folders
//! - [`lock`]: markers that keep a restore attempt from running twice

pub mod backup;
pub mod lock;
pub mod restore;

use crate::utils::errors::{AgentError, Result};
use tokio_util::sync::CancellationToken;

/// Cooperative cancellation point between the coarse phases of an operation.
pub fn checkpoint(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        Err(AgentError::Cancelled)
    } else {
        Ok(())
    }
}
