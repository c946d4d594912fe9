//! Unix permission bits for archive entries.

use std::fs;
use std::path::Path;

/// Permission bits recorded for entries when the platform has none.
pub const DEFAULT_FILE_MODE: u32 = 0o644;
pub const DEFAULT_DIR_MODE: u32 = 0o755;

/// Read the permission bits (`0o7777` mask) of `path`, following symlinks.
#[cfg(unix)]
pub fn mode_of(path: &Path) -> std::io::Result<u32> {
    use std::os::unix::fs::PermissionsExt;

    Ok(fs::metadata(path)?.permissions().mode() & 0o7777)
}

#[cfg(not(unix))]
pub fn mode_of(path: &Path) -> std::io::Result<u32> {
    let metadata = fs::metadata(path)?;
    Ok(if metadata.is_dir() { DEFAULT_DIR_MODE } else { DEFAULT_FILE_MODE })
}

/// Apply permission bits to `path`.
#[cfg(unix)]
pub fn apply_mode(path: &Path, mode: u32) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    fs::set_permissions(path, fs::Permissions::from_mode(mode & 0o7777))
}

#[cfg(not(unix))]
pub fn apply_mode(_path: &Path, _mode: u32) -> std::io::Result<()> {
    // Only the read-only bit is meaningful elsewhere; leave defaults.
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    #[cfg(unix)]
    fn test_mode_roundtrip() -> std::io::Result<()> {
        let temp_file = NamedTempFile::new()?;

        apply_mode(temp_file.path(), 0o640)?;
        assert_eq!(mode_of(temp_file.path())?, 0o640);

        apply_mode(temp_file.path(), 0o100755)?;
        assert_eq!(mode_of(temp_file.path())?, 0o755);

        Ok(())
    }
}
