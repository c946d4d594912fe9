//! Restore lock markers.
//!
//! A zero-byte `.restore_lock.<restore-id>.<member-index>` file in the restore
//! destination proves that restore attempt already completed for that member,
//! so a restarted pod does not wipe and re-extract its hot-restart folder.

use crate::utils::errors::{AgentError, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const LOCK_PREFIX: &str = ".restore_lock.";

#[derive(Debug, Clone)]
pub struct RestoreLock {
    dir: PathBuf,
    restore_id: String,
    member_index: usize,
}

impl RestoreLock {
    pub fn new(dir: &Path, restore_id: &str, member_index: usize) -> Result<Self> {
        if restore_id.is_empty() || restore_id.contains(['/', '\\']) || restore_id.starts_with('.') {
            return Err(AgentError::Config(format!("invalid restore id '{}'", restore_id)));
        }

        Ok(Self {
            dir: dir.to_path_buf(),
            restore_id: restore_id.to_string(),
            member_index,
        })
    }

    pub fn path(&self) -> PathBuf {
        self.dir
            .join(format!("{}{}.{}", LOCK_PREFIX, self.restore_id, self.member_index))
    }

    /// Whether this attempt already restored this member.
    pub fn is_held(&self) -> bool {
        self.path().is_file()
    }

    /// Record a successful restore. Only call after extraction finished.
    pub fn acquire(&self) -> Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        std::fs::File::create(self.path())?;
        info!("Wrote restore lock {}", self.path().display());
        Ok(())
    }

    /// Delete locks left by other restore attempts for the same member index.
    /// Returns how many were removed.
    pub fn purge_stale(&self) -> Result<usize> {
        let suffix = format!(".{}", self.member_index);
        let mut purged = 0;

        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            let Some(restore_id) = name
                .strip_prefix(LOCK_PREFIX)
                .and_then(|rest| rest.strip_suffix(suffix.as_str()))
            else {
                continue;
            };
            if restore_id == self.restore_id || restore_id.is_empty() {
                continue;
            }
            if !entry.file_type()?.is_file() {
                continue;
            }

            std::fs::remove_file(entry.path())?;
            debug!("Removed stale restore lock {}", name);
            purged += 1;
        }

        Ok(purged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_acquire_and_check() {
        let dir = TempDir::new().unwrap();
        let lock = RestoreLock::new(dir.path(), "restore-42", 1).unwrap();

        assert!(!lock.is_held());
        lock.acquire().unwrap();
        assert!(lock.is_held());
        assert_eq!(lock.path(), dir.path().join(".restore_lock.restore-42.1"));

        assert!(!RestoreLock::new(dir.path(), "restore-42", 2).unwrap().is_held());
        assert!(!RestoreLock::new(dir.path(), "restore-43", 1).unwrap().is_held());
    }

    #[test]
    fn test_acquire_creates_dir() {
        let dir = TempDir::new().unwrap();
        let lock = RestoreLock::new(&dir.path().join("fresh"), "r1", 0).unwrap();
        lock.acquire().unwrap();
        assert!(lock.is_held());
    }

    #[test]
    fn test_purge_stale_only_same_member() {
        let dir = TempDir::new().unwrap();
        for name in [
            ".restore_lock.old.1",
            ".restore_lock.older.1",
            ".restore_lock.old.0",
            ".restore_lock.old.11",
            "restore_lock.old.1",
        ] {
            fs::write(dir.path().join(name), b"").unwrap();
        }

        let lock = RestoreLock::new(dir.path(), "new", 1).unwrap();
        lock.acquire().unwrap();
        assert_eq!(lock.purge_stale().unwrap(), 2);

        assert!(lock.is_held());
        assert!(!dir.path().join(".restore_lock.old.1").exists());
        assert!(!dir.path().join(".restore_lock.older.1").exists());
        assert!(dir.path().join(".restore_lock.old.0").exists());
        assert!(dir.path().join(".restore_lock.old.11").exists());
        assert!(dir.path().join("restore_lock.old.1").exists());
    }

    #[test]
    fn test_invalid_restore_id() {
        let dir = TempDir::new().unwrap();
        assert!(RestoreLock::new(dir.path(), "", 0).is_err());
        assert!(RestoreLock::new(dir.path(), "../x", 0).is_err());
    }
}
