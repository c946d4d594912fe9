//! Classification of on-disk backup names.
//!
//! The cluster member writes each backup event as a sequence directory named
//! `backup-<epoch-ms>` holding one UUID-named directory per member. Epoch
//! milliseconds are always 13 digits wide, so plain lexicographic ordering of
//! sequence names is chronological.

use crate::utils::errors::{AgentError, Result};
use chrono::DateTime;
use regex::Regex;
use std::sync::LazyLock;

/// Layout of a human readable backup timestamp, used as the remote folder name.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d-%H-%M-%S";

static SEQUENCE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^backup-(\d{13})$").expect("valid sequence regex"));

static UUID_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}$")
        .expect("valid uuid regex")
});

static TIMESTAMP_DIR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\d{4}-\d{2}-\d{2}-\d{2}-\d{2}-\d{2}/").expect("valid timestamp regex")
});

/// Parse a `backup-<epoch-ms>` directory name into its epoch milliseconds.
pub fn parse_sequence(name: &str) -> Result<i64> {
    SEQUENCE_RE
        .captures(name)
        .and_then(|caps| caps[1].parse().ok())
        .ok_or_else(|| AgentError::NotASequence(name.to_string()))
}

/// Format epoch milliseconds as a UTC `YYYY-MM-DD-HH-MM-SS` string.
pub fn human_timestamp(epoch_ms: i64) -> Result<String> {
    DateTime::from_timestamp_millis(epoch_ms)
        .map(|ts| ts.format(TIMESTAMP_FORMAT).to_string())
        .ok_or_else(|| AgentError::NotASequence(epoch_ms.to_string()))
}

/// Whether `name` has the lowercase 8-4-4-4-12 hex shape of a member UUID.
pub fn is_member_uuid(name: &str) -> bool {
    UUID_RE.is_match(name)
}

/// Extract the member index from a stateful pod hostname (`<set-name>-<ordinal>`).
pub fn parse_member_index_from_hostname(hostname: &str) -> Result<usize> {
    let bad = || AgentError::BadHostname(hostname.to_string());

    let (set_name, ordinal) = hostname.rsplit_once('-').ok_or_else(bad)?;
    if set_name.is_empty() || ordinal.is_empty() || !ordinal.bytes().all(|b| b.is_ascii_digit()) {
        return Err(bad());
    }

    ordinal.parse().map_err(|_| bad())
}

/// Returns the leading `YYYY-MM-DD-HH-MM-SS` folder of a relative object key, if any.
pub fn timestamp_folder(relative_key: &str) -> Option<&str> {
    TIMESTAMP_DIR_RE
        .find(relative_key)
        .map(|m| &relative_key[..m.end() - 1])
}
