//! Backup selection and upload.
//!
//! The cluster member writes every backup event into `backup-<epoch-ms>/`,
//! with one UUID directory per member. Each member's sidecar uploads the
//! snapshot at its own member index from the latest sequence, then leaves a
//! `<uuid>.delete` marker beside it. The sequence directory is only removed
//! once every snapshot in it carries a marker, so sidecars of sibling members
//! can work on the same sequence without coordinating.

use crate::archive::{create_archive, ARCHIVE_EXTENSION};
use crate::executor::checkpoint;
use crate::fs::naming::{human_timestamp, is_member_uuid, parse_sequence};
use crate::fs::walker::child_dir_names;
use crate::storage::Bucket;
use crate::utils::errors::{AgentError, Result};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio_util::io::SyncIoBridge;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Suffix of the marker written next to an uploaded member snapshot.
pub const DELETE_MARKER_SUFFIX: &str = ".delete";

/// The member snapshot chosen for upload.
#[derive(Debug, Clone)]
pub struct SnapshotSelection {
    /// `backup-<epoch-ms>` directory holding the snapshot
    pub sequence_dir: PathBuf,
    pub epoch_ms: i64,
    /// UUID directory name of the chosen snapshot
    pub member_uuid: String,
    /// Every member snapshot in the sequence, sorted
    pub members: Vec<String>,
}

impl SnapshotSelection {
    pub fn snapshot_dir(&self) -> PathBuf {
        self.sequence_dir.join(&self.member_uuid)
    }

    /// `<prefix>/<YYYY-MM-DD-HH-MM-SS>/<uuid>.tar.gz`
    pub fn remote_key(&self, key_prefix: &str) -> Result<String> {
        let folder = human_timestamp(self.epoch_ms)?;
        let prefix = key_prefix.trim_matches('/');
        let object = format!("{}/{}{}", folder, self.member_uuid, ARCHIVE_EXTENSION);

        Ok(if prefix.is_empty() {
            object
        } else {
            format!("{}/{}", prefix, object)
        })
    }
}

fn marker_path(sequence_dir: &Path, member_uuid: &str) -> PathBuf {
    sequence_dir.join(format!("{}{}", member_uuid, DELETE_MARKER_SUFFIX))
}

/// Sequence directories under `root`, oldest first.
fn sequences(root: &Path) -> Result<Vec<(String, i64)>> {
    let sequences: Vec<(String, i64)> = child_dir_names(root)?
        .into_iter()
        .filter_map(|name| parse_sequence(&name).ok().map(|epoch| (name, epoch)))
        .collect();

    if sequences.is_empty() {
        return Err(AgentError::EmptyBackupDir(root.to_path_buf()));
    }
    Ok(sequences)
}

fn member_uuids(sequence_dir: &Path) -> Result<Vec<String>> {
    Ok(child_dir_names(sequence_dir)?
        .into_iter()
        .filter(|name| is_member_uuid(name))
        .collect())
}

/// Position of this member's snapshot among `count` siblings. A lone snapshot
/// always belongs to whoever asks, whatever their index.
fn member_position(count: usize, member_index: usize) -> Result<usize> {
    if count == 1 {
        return Ok(0);
    }
    if member_index >= count {
        return Err(AgentError::MemberIndexOutOfRange {
            index: member_index,
            count,
        });
    }
    Ok(member_index)
}

/// Choose the snapshot `member_index` should upload from the latest sequence under `root`.
pub fn select_snapshot(root: &Path, member_index: usize) -> Result<SnapshotSelection> {
    let (sequence, epoch_ms) = sequences(root)?
        .pop()
        .ok_or_else(|| AgentError::EmptyBackupDir(root.to_path_buf()))?;
    let sequence_dir = root.join(&sequence);

    let members = member_uuids(&sequence_dir)?;
    let position = member_position(members.len(), member_index)?;
    let member_uuid = members[position].clone();

    debug!(
        "Selected snapshot {} from {} ({} members, index {})",
        member_uuid,
        sequence,
        members.len(),
        member_index
    );

    Ok(SnapshotSelection {
        sequence_dir,
        epoch_ms,
        member_uuid,
        members,
    })
}

/// Every snapshot `member_index` would upload, one per sequence, oldest first.
/// Sequences without a snapshot at that index are left out.
pub fn list_member_snapshots(root: &Path, member_index: usize) -> Result<Vec<PathBuf>> {
    let mut snapshots = Vec::new();

    for (sequence, _) in sequences(root)? {
        let sequence_dir = root.join(&sequence);
        let members = member_uuids(&sequence_dir)?;
        match member_position(members.len(), member_index) {
            Ok(position) => snapshots.push(sequence_dir.join(&members[position])),
            Err(e) => debug!("Skipping {}: {}", sequence, e),
        }
    }

    Ok(snapshots)
}

/// Record that the selected snapshot reached the bucket.
pub fn mark_uploaded(selection: &SnapshotSelection) -> Result<()> {
    let marker = marker_path(&selection.sequence_dir, &selection.member_uuid);
    std::fs::File::create(&marker)?;
    debug!("Wrote upload marker {}", marker.display());
    Ok(())
}

/// Remove `sequence_dir` if every member snapshot in it is marked as uploaded.
/// Returns whether the directory is gone.
pub fn remove_sequence_if_complete(sequence_dir: &Path) -> Result<bool> {
    let members = match member_uuids(sequence_dir) {
        Ok(members) => members,
        Err(AgentError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => return Ok(true),
        Err(e) => return Err(e),
    };

    let pending: Vec<&String> = members
        .iter()
        .filter(|uuid| !marker_path(sequence_dir, uuid).exists())
        .collect();
    if !pending.is_empty() {
        debug!(
            "Keeping {}: {} snapshot(s) not uploaded yet",
            sequence_dir.display(),
            pending.len()
        );
        return Ok(false);
    }

    match std::fs::remove_dir_all(sequence_dir) {
        Ok(()) => {
            info!("Removed fully uploaded sequence {}", sequence_dir.display());
            Ok(true)
        }
        // a sibling sidecar got there first
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(true),
        Err(e) => Err(e.into()),
    }
}

/// Archive this member's snapshot from the latest sequence under `root` into
/// `bucket`, then mark it and clean up the sequence when all siblings are done.
///
/// Cancellation is checked before streaming and before the object is
/// finalized, not while bytes are being copied.
pub async fn select_and_upload(
    root: &Path,
    bucket: &Bucket,
    key_prefix: &str,
    member_index: usize,
    cancel: &CancellationToken,
) -> Result<String> {
    let selection = {
        let root = root.to_path_buf();
        tokio::task::spawn_blocking(move || select_snapshot(&root, member_index)).await??
    };
    let key = selection.remote_key(key_prefix)?;

    checkpoint(cancel)?;
    info!("Uploading {} to {}", selection.snapshot_dir().display(), key);

    let mut bridge = SyncIoBridge::new(bucket.writer(&key));
    let source = selection.snapshot_dir();
    let root_name = selection.member_uuid.clone();
    let (bridge, streamed) = tokio::task::spawn_blocking(move || {
        let streamed = create_archive(&mut bridge, &source, &root_name).map(|_| ());
        (bridge, streamed)
    })
    .await?;

    let mut writer = bridge.into_inner();
    let finalize = match streamed {
        Ok(()) => checkpoint(cancel),
        Err(e) => Err(e.into()),
    };
    if let Err(e) = finalize {
        if let Err(abort_err) = writer.abort().await {
            warn!("Failed to abort partial upload of {}: {}", key, abort_err);
        }
        return Err(e);
    }
    // a failed completion aborts the multipart upload inside object_store
    writer.shutdown().await?;

    mark_uploaded(&selection)?;
    remove_sequence_if_complete(&selection.sequence_dir)?;

    info!("Uploaded backup {}", key);
    Ok(key)
}
