//! Streaming tar+gzip codec for member snapshot directories.
//!
//! Archives hold a single root directory entry named after the member UUID,
//! followed by the snapshot subtree in walk order. Both directions work one
//! entry at a time; callers own and close the underlying reader/writer.

use crate::fs::metadata::{apply_mode, mode_of};
use crate::fs::walker::{walk_tree_with_callback, EntryKind};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Component, Path, PathBuf};
use std::time::UNIX_EPOCH;
use tar::{Archive, Builder, EntryType, Header};
use tracing::debug;

/// Suffix of every archive object in the bucket.
pub const ARCHIVE_EXTENSION: &str = ".tar.gz";

/// Write `source_dir` as a gzip-compressed tar stream into `writer`.
///
/// Every entry is stored under `root_name`, with `source_dir` itself stored as
/// the `root_name` directory entry. Returns the writer once the gzip trailer
/// has been written; flushing or closing it is left to the caller.
pub fn create_archive<W: Write>(writer: W, source_dir: &Path, root_name: &str) -> io::Result<W> {
    let encoder = GzEncoder::new(writer, Compression::default());
    let mut builder = Builder::new(encoder);

    walk_tree_with_callback(source_dir, |entry| {
        let name = if entry.relative_path.as_os_str().is_empty() {
            PathBuf::from(root_name)
        } else {
            Path::new(root_name).join(&entry.relative_path)
        };

        let mut header = Header::new_gnu();
        header.set_mode(mode_of(&entry.path)?);
        header.set_mtime(modified_secs(&entry.path));

        match entry.kind {
            EntryKind::Directory => {
                header.set_entry_type(EntryType::Directory);
                header.set_size(0);
                builder.append_data(&mut header, &name, io::empty())
            }
            EntryKind::File => {
                let mut file = File::open(&entry.path)?;
                let size = file.metadata()?.len();
                header.set_entry_type(EntryType::Regular);
                header.set_size(size);
                builder.append_data(&mut header, &name, (&mut file).take(size))
            }
        }
    })?;

    builder.into_inner()?.finish()
}

/// Unpack a gzip-compressed tar stream into `dest_dir`.
///
/// Each entry lands at `dest_dir/<entry path>`. Directories get their
/// archived mode, regular files are truncated and rewritten. The first failing
/// entry aborts extraction; whatever was already written stays in place.
pub fn extract_archive<R: Read>(reader: R, dest_dir: &Path) -> io::Result<()> {
    let mut archive = Archive::new(GzDecoder::new(reader));

    for entry in archive.entries()? {
        let mut entry = entry?;
        let relative = entry.path()?.into_owned();
        let target = join_entry(dest_dir, &relative)?;
        let entry_type = entry.header().entry_type();
        let mode = entry.header().mode()?;

        if entry_type.is_dir() {
            fs::create_dir_all(&target)?;
            apply_mode(&target, mode)?;
        } else if entry_type.is_file() {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            let mut file = File::create(&target)?;
            io::copy(&mut entry, &mut file)?;
            apply_mode(&target, mode)?;
        } else {
            debug!("Skipping archive entry {} of type {:?}", relative.display(), entry_type);
        }
    }

    Ok(())
}

fn join_entry(dest_dir: &Path, relative: &Path) -> io::Result<PathBuf> {
    let mut target = dest_dir.to_path_buf();

    for component in relative.components() {
        match component {
            Component::Normal(part) => target.push(part),
            Component::CurDir => {}
            _ => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("archive entry escapes destination: {}", relative.display()),
                ))
            }
        }
    }

    Ok(target)
}

fn modified_secs(path: &Path) -> u64 {
    fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::walker::walk_tree;
    use tempfile::TempDir;

    const ROOT: &str = "00000000-0000-0000-0000-000000000001";

    fn sample_tree() -> io::Result<TempDir> {
        let dir = TempDir::new()?;
        fs::create_dir_all(dir.path().join("s00/tstore/00000001"))?;
        fs::create_dir(dir.path().join("empty"))?;
        fs::write(dir.path().join("cluster-state.txt"), b"ACTIVE")?;
        fs::write(dir.path().join("s00/tstore/00000001/chunk-1"), vec![7u8; 64 * 1024])?;
        fs::write(dir.path().join("s00/value.bin"), b"")?;
        Ok(dir)
    }

    fn snapshot(root: &Path) -> Vec<(String, EntryKind, Vec<u8>)> {
        walk_tree(root)
            .unwrap()
            .into_iter()
            .map(|e| {
                let content = match e.kind {
                    EntryKind::File => fs::read(&e.path).unwrap(),
                    EntryKind::Directory => Vec::new(),
                };
                (e.relative_path.to_string_lossy().to_string(), e.kind, content)
            })
            .collect()
    }

    #[test]
    fn test_roundtrip_preserves_tree() -> io::Result<()> {
        let source = sample_tree()?;
        let bytes = create_archive(Vec::new(), source.path(), ROOT)?;

        let dest = TempDir::new()?;
        extract_archive(bytes.as_slice(), dest.path())?;

        assert_eq!(snapshot(source.path()), snapshot(&dest.path().join(ROOT)));
        Ok(())
    }

    #[test]
    fn test_entries_are_rooted_at_logical_name() -> io::Result<()> {
        let source = sample_tree()?;
        let bytes = create_archive(Vec::new(), source.path(), ROOT)?;

        let mut archive = Archive::new(GzDecoder::new(bytes.as_slice()));
        let names: Vec<String> = archive
            .entries()?
            .map(|e| e.unwrap().path().unwrap().to_string_lossy().trim_end_matches('/').to_string())
            .collect();

        assert_eq!(names[0], ROOT);
        assert!(names.contains(&format!("{ROOT}/empty")));
        assert!(names.contains(&format!("{ROOT}/s00/tstore/00000001/chunk-1")));
        assert!(names.iter().all(|n| n.starts_with(ROOT)));
        Ok(())
    }

    #[test]
    #[cfg(unix)]
    fn test_roundtrip_preserves_modes() -> io::Result<()> {
        let source = sample_tree()?;
        apply_mode(&source.path().join("cluster-state.txt"), 0o600)?;
        apply_mode(&source.path().join("empty"), 0o700)?;

        let bytes = create_archive(Vec::new(), source.path(), ROOT)?;
        let dest = TempDir::new()?;
        extract_archive(bytes.as_slice(), dest.path())?;

        assert_eq!(mode_of(&dest.path().join(ROOT).join("cluster-state.txt"))?, 0o600);
        assert_eq!(mode_of(&dest.path().join(ROOT).join("empty"))?, 0o700);
        Ok(())
    }

    #[test]
    fn test_extract_overwrites_existing_files() -> io::Result<()> {
        let source = sample_tree()?;
        let bytes = create_archive(Vec::new(), source.path(), ROOT)?;

        let dest = TempDir::new()?;
        fs::create_dir_all(dest.path().join(ROOT))?;
        fs::write(dest.path().join(ROOT).join("cluster-state.txt"), b"PASSIVE-AND-LONGER")?;

        extract_archive(bytes.as_slice(), dest.path())?;
        assert_eq!(fs::read(dest.path().join(ROOT).join("cluster-state.txt"))?, b"ACTIVE");
        Ok(())
    }

    #[test]
    fn test_extract_rejects_parent_components() -> io::Result<()> {
        let mut header = Header::new_gnu();
        let name = b"../evil.txt";
        header.as_gnu_mut().unwrap().name[..name.len()].copy_from_slice(name);
        header.set_entry_type(EntryType::Regular);
        header.set_mode(0o644);
        header.set_size(4);
        header.set_cksum();

        let mut builder = Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
        builder.append(&header, &b"evil"[..])?;
        let bytes = builder.into_inner()?.finish()?;

        let dest = TempDir::new()?;
        let err = extract_archive(bytes.as_slice(), &dest.path().join("inner")).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
        assert!(!dest.path().join("evil.txt").exists());
        Ok(())
    }

    #[test]
    fn test_extract_corrupt_stream_fails() {
        let dest = TempDir::new().unwrap();
        assert!(extract_archive(&b"definitely not gzip"[..], dest.path()).is_err());
    }
}
