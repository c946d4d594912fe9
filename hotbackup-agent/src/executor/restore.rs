//! Restore matching and extraction.
//!
//! Archives in the bucket are matched to members by position in the sorted key
//! list, with one exception: a volume holding exactly one hot-restart folder
//! first looks for an archive carrying that folder's own UUID, so a member
//! rejoining its own cluster gets its own data back.

use crate::archive::{extract_archive, ARCHIVE_EXTENSION};
use crate::executor::lock::RestoreLock;
use crate::fs::naming::{is_member_uuid, parse_member_index_from_hostname, timestamp_folder};
use crate::fs::walker::child_dir_names;
use crate::storage::secrets::SecretProvider;
use crate::storage::Bucket;
use crate::utils::errors::{AgentError, Result};
use std::path::{Path, PathBuf};
use tokio_util::io::SyncIoBridge;
use tracing::{info, warn};

/// Outcome of matching the archived members against the local volume.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoreMatch {
    /// Object key to extract
    pub key: String,
    /// Local hot-restart folder to delete before extracting
    pub stale_local: Option<String>,
}

/// Member UUID an archive key was written for (`.../<uuid>.tar.gz` → `<uuid>`).
pub fn archive_member(key: &str) -> &str {
    let name = key.rsplit('/').next().unwrap_or(key);
    name.strip_suffix(ARCHIVE_EXTENSION).unwrap_or(name)
}

fn relative_to<'a>(key: &'a str, list_prefix: &str) -> &'a str {
    let prefix = list_prefix.trim_matches('/');
    if prefix.is_empty() {
        return key;
    }
    key.strip_prefix(prefix)
        .and_then(|rest| rest.strip_prefix('/'))
        .unwrap_or(key)
}

/// Archive keys of the most recent backup under `list_prefix`, sorted.
///
/// When archives sit in `YYYY-MM-DD-HH-MM-SS/` folders, only the latest folder
/// is kept; otherwise every archive directly listed is.
pub fn latest_backup_keys(keys: Vec<String>, list_prefix: &str) -> Vec<String> {
    let mut archives: Vec<String> = keys
        .into_iter()
        .filter(|key| key.ends_with(ARCHIVE_EXTENSION))
        .collect();

    let latest = archives
        .iter()
        .filter_map(|key| timestamp_folder(relative_to(key, list_prefix)))
        .max()
        .map(str::to_string);

    if let Some(folder) = latest {
        archives.retain(|key| timestamp_folder(relative_to(key, list_prefix)) == Some(folder.as_str()));
    }

    archives.sort();
    archives
}

/// Decide which archive `member_index` restores and which local folder it replaces.
///
/// `keys` must be non-empty and sorted; `local_uuids` sorted.
pub fn match_archive(
    keys: &[String],
    local_uuids: &[String],
    member_index: usize,
) -> Result<RestoreMatch> {
    if member_index >= keys.len() {
        return Err(AgentError::MemberIndexOutOfRange {
            index: member_index,
            count: keys.len(),
        });
    }
    let positional = keys[member_index].clone();

    match local_uuids {
        [] => Ok(RestoreMatch {
            key: positional,
            stale_local: None,
        }),
        [existing] => {
            let own = keys.iter().find(|key| archive_member(key) == existing.as_str());
            let key = match own {
                Some(key) => key.clone(),
                None => {
                    info!(
                        "No archive for local member {}, restoring {} instead",
                        existing,
                        archive_member(&positional)
                    );
                    positional
                }
            };
            Ok(RestoreMatch {
                key,
                stale_local: Some(existing.clone()),
            })
        }
        many => {
            if many.len() != keys.len() {
                return Err(AgentError::TopologyMismatch {
                    local: many.len(),
                    archived: keys.len(),
                });
            }
            let local = many[member_index].clone();
            if archive_member(&positional) != local {
                warn!(
                    "Restoring archive of member {} over local member {}",
                    archive_member(&positional),
                    local
                );
            }
            Ok(RestoreMatch {
                key: positional,
                stale_local: Some(local),
            })
        }
    }
}

fn local_member_folders(dest_dir: &Path) -> Result<Vec<String>> {
    std::fs::create_dir_all(dest_dir)?;
    Ok(child_dir_names(dest_dir)?
        .into_iter()
        .filter(|name| is_member_uuid(name))
        .collect())
}

/// Find this member's archive under `list_prefix`, replace the matching
/// local hot-restart folder and extract the archive into `dest_dir`.
/// Returns the restored key.
pub async fn select_and_restore(
    bucket: &Bucket,
    list_prefix: &str,
    dest_dir: &Path,
    member_index: usize,
) -> Result<String> {
    let keys = latest_backup_keys(bucket.list(list_prefix).await?, list_prefix);
    if keys.is_empty() {
        return Err(AgentError::NoArchivedBackups(list_prefix.to_string()));
    }

    let local_uuids = local_member_folders(dest_dir)?;
    let matched = match_archive(&keys, &local_uuids, member_index)?;

    if let Some(stale) = &matched.stale_local {
        let folder = dest_dir.join(stale);
        info!("Removing local hot-restart folder {}", folder.display());
        tokio::fs::remove_dir_all(&folder).await?;
    }

    info!("Restoring {} into {}", matched.key, dest_dir.display());
    let reader = SyncIoBridge::new(bucket.reader(&matched.key).await?);
    let dest = dest_dir.to_path_buf();
    tokio::task::spawn_blocking(move || extract_archive(reader, &dest)).await??;

    Ok(matched.key)
}

/// Parameters of a one-shot restore at pod startup.
#[derive(Debug, Clone)]
pub struct RestoreRequest {
    pub bucket_url: String,
    pub secret_name: Option<String>,
    /// Folder inside the bucket to look for archives in
    pub list_prefix: String,
    /// Parent of the hot-restart folders
    pub dest_dir: PathBuf,
    /// Identifies one restore attempt across pod restarts
    pub restore_id: String,
    /// Pod hostname, which carries the member index
    pub hostname: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestoreOutcome {
    /// The lock for this attempt and member was already present
    AlreadyRestored,
    Restored { key: String },
}

/// Restore this member's hot-restart folder unless this attempt already did.
pub async fn run(request: &RestoreRequest, secrets: &dyn SecretProvider) -> Result<RestoreOutcome> {
    let member_index = parse_member_index_from_hostname(&request.hostname)?;
    let lock = RestoreLock::new(&request.dest_dir, &request.restore_id, member_index)?;

    if lock.is_held() {
        info!(
            "Restore {} already completed for member {}, skipping",
            request.restore_id, member_index
        );
        return Ok(RestoreOutcome::AlreadyRestored);
    }

    let bucket = Bucket::open_with_secret(
        &request.bucket_url,
        request.secret_name.as_deref(),
        secrets,
    )?;
    let key = select_and_restore(&bucket, &request.list_prefix, &request.dest_dir, member_index).await?;

    lock.acquire()?;
    let purged = lock.purge_stale()?;
    info!(
        "Restored member {} from {} ({} stale lock(s) removed)",
        member_index, key, purged
    );

    Ok(RestoreOutcome::Restored { key })
}
