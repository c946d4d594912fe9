//! Deterministic directory traversal for archiving.
//!
//! Entries are yielded parents-first and siblings in file-name order, so two
//! walks over the same tree always produce the same sequence.

use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

/// Kind of an entry discovered during a walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Directory,
    File,
}

/// Information about an entry discovered during walking
#[derive(Debug, Clone)]
pub struct TreeEntry {
    /// Full path to the entry
    pub path: PathBuf,

    /// Relative path from the root (empty for the root itself)
    pub relative_path: PathBuf,

    /// File size in bytes (0 for directories)
    pub size: u64,

    pub kind: EntryKind,
}

impl TreeEntry {
    /// Create a TreeEntry from a DirEntry.
    /// Symlinks to files resolve to the target file; symlinks to directories
    /// and broken symlinks are skipped (returns None).
    fn from_entry(entry: &DirEntry, root: &Path) -> std::io::Result<Option<Self>> {
        let path = entry.path().to_path_buf();
        let relative_path = path.strip_prefix(root).unwrap_or(&path).to_path_buf();

        let metadata = if entry.path_is_symlink() {
            match std::fs::metadata(&path) {
                Ok(resolved) if resolved.is_file() => resolved,
                _ => return Ok(None),
            }
        } else {
            entry.metadata()?
        };

        let kind = if metadata.is_dir() {
            EntryKind::Directory
        } else if metadata.is_file() {
            EntryKind::File
        } else {
            // sockets, fifos, devices
            return Ok(None);
        };

        Ok(Some(Self {
            path,
            relative_path,
            size: if kind == EntryKind::File { metadata.len() } else { 0 },
            kind,
        }))
    }
}

/// Walk a directory tree, including `root` itself and every nested directory.
pub fn walk_tree(root: &Path) -> std::io::Result<Vec<TreeEntry>> {
    let mut entries = Vec::new();
    walk_tree_with_callback(root, |entry| {
        entries.push(entry.clone());
        Ok(())
    })?;
    Ok(entries)
}

/// Walk a directory tree and hand each entry to `callback` as it is found,
/// without buffering the whole listing.
pub fn walk_tree_with_callback<F>(root: &Path, mut callback: F) -> std::io::Result<()>
where
    F: FnMut(&TreeEntry) -> std::io::Result<()>,
{
    let walker = WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name();

    for entry in walker {
        let entry = entry?;
        if let Some(tree_entry) = TreeEntry::from_entry(&entry, root)? {
            callback(&tree_entry)?;
        }
    }

    Ok(())
}

/// Names of the immediate subdirectories of `dir`, sorted.
pub fn child_dir_names(dir: &Path) -> std::io::Result<Vec<String>> {
    let mut names = Vec::new();

    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        if let Some(name) = entry.file_name().to_str() {
            names.push(name.to_string());
        }
    }

    names.sort();
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_walk_includes_root_and_directories() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;

        fs::create_dir(temp_dir.path().join("subdir"))?;
        fs::create_dir(temp_dir.path().join("empty"))?;
        fs::write(temp_dir.path().join("file1.txt"), b"content1")?;
        fs::write(temp_dir.path().join("subdir/file2.txt"), b"content2")?;

        let entries = walk_tree(temp_dir.path())?;
        let rel: Vec<String> = entries
            .iter()
            .map(|e| e.relative_path.to_string_lossy().to_string())
            .collect();

        assert_eq!(rel, vec!["", "empty", "file1.txt", "subdir", "subdir/file2.txt"]);
        assert_eq!(entries[0].kind, EntryKind::Directory);
        assert_eq!(entries[2].size, 8);

        Ok(())
    }

    #[test]
    #[cfg(unix)]
    fn test_symlinks() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;

        fs::write(temp_dir.path().join("target.txt"), b"12345")?;
        fs::create_dir(temp_dir.path().join("dir"))?;
        std::os::unix::fs::symlink(temp_dir.path().join("target.txt"), temp_dir.path().join("link.txt"))?;
        std::os::unix::fs::symlink(temp_dir.path().join("dir"), temp_dir.path().join("dirlink"))?;
        std::os::unix::fs::symlink(temp_dir.path().join("missing"), temp_dir.path().join("broken"))?;

        let entries = walk_tree(temp_dir.path())?;
        let link = entries
            .iter()
            .find(|e| e.relative_path == Path::new("link.txt"))
            .expect("file symlink is kept");
        assert_eq!(link.kind, EntryKind::File);
        assert_eq!(link.size, 5);
        assert!(entries.iter().all(|e| e.relative_path != Path::new("dirlink")));
        assert!(entries.iter().all(|e| e.relative_path != Path::new("broken")));

        Ok(())
    }

    #[test]
    fn test_child_dir_names() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;

        fs::create_dir(temp_dir.path().join("b"))?;
        fs::create_dir(temp_dir.path().join("a"))?;
        fs::write(temp_dir.path().join("c"), b"file")?;

        assert_eq!(child_dir_names(temp_dir.path())?, vec!["a", "b"]);

        Ok(())
    }
}
