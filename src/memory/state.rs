//! Sync state tracking
//!
//! Remembers which issues and which digest hash the last successful sync
//! produced, so unchanged snapshots can skip the rebuild. Stored as JSON and
//! always replaced atomically.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::atomic::atomic_write;

/// State of the last successful sync
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncState {
    pub tracked_ids: BTreeSet<u64>,
    pub digest_hash: String,
    pub last_synced_at: Option<DateTime<Utc>>,
}

impl SyncState {
    /// Whether this state already describes the given ids and hash
    pub fn matches(&self, ids: &BTreeSet<u64>, hash: &str) -> bool {
        self.tracked_ids == *ids && self.digest_hash == hash
    }
}

/// On-disk layout of the state file
#[derive(Debug, Serialize, Deserialize)]
struct StateFile {
    #[serde(default)]
    ids: Vec<u64>,
    #[serde(default)]
    hash: String,
    #[serde(default)]
    last_synced: Option<DateTime<Utc>>,
}

impl From<&SyncState> for StateFile {
    fn from(state: &SyncState) -> Self {
        Self {
            ids: state.tracked_ids.iter().copied().collect(),
            hash: state.digest_hash.clone(),
            last_synced: state.last_synced_at,
        }
    }
}

impl From<StateFile> for SyncState {
    fn from(file: StateFile) -> Self {
        Self {
            tracked_ids: file.ids.into_iter().collect(),
            digest_hash: file.hash,
            last_synced_at: file.last_synced,
        }
    }
}

/// Durable store for [`SyncState`]
pub struct SyncStateTracker {
    path: PathBuf,
}

impl SyncStateTracker {
    /// Track state in the given file
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Load the current state; a missing file means "never synced"
    pub fn get_state(&self) -> Result<SyncState> {
        if !self.path.exists() {
            return Ok(SyncState::default());
        }

        let content = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read {}", self.path.display()))?;
        let file: StateFile = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse sync state {}", self.path.display()))?;
        Ok(file.into())
    }

    /// Replace the stored state, stamping it with the current time
    pub fn update_state(&self, ids: BTreeSet<u64>, hash: impl Into<String>) -> Result<SyncState> {
        let state = SyncState {
            tracked_ids: ids,
            digest_hash: hash.into(),
            last_synced_at: Some(Utc::now()),
        };

        let json = serde_json::to_string_pretty(&StateFile::from(&state))
            .context("Failed to serialize sync state")?;
        atomic_write(&self.path, json.as_bytes())?;

        debug!(path = %self.path.display(), ids = state.tracked_ids.len(), "Sync state updated");
        Ok(state)
    }

    /// Path of the state file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = SyncStateTracker::new(dir.path().join("state.json"));
        let state = tracker.get_state().unwrap();
        assert!(state.tracked_ids.is_empty());
        assert_eq!(state.digest_hash, "");
        assert!(state.last_synced_at.is_none());
    }

    #[test]
    fn test_update_then_get() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = SyncStateTracker::new(dir.path().join("state.json"));

        let before = Utc::now();
        let written = tracker.update_state([3, 1, 2].into_iter().collect(), "abc123").unwrap();
        let read = tracker.get_state().unwrap();

        assert_eq!(read, written);
        assert_eq!(read.tracked_ids.iter().copied().collect::<Vec<_>>(), vec![1, 2, 3]);
        assert_eq!(read.digest_hash, "abc123");
        assert!(read.last_synced_at.unwrap() >= before - chrono::Duration::seconds(1));
    }

    #[test]
    fn test_file_format() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let tracker = SyncStateTracker::new(&path);
        tracker.update_state([10].into_iter().collect(), "h").unwrap();

        let raw: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["ids"], serde_json::json!([10]));
        assert_eq!(raw["hash"], "h");
        assert!(raw["last_synced"].is_string());
    }

    #[test]
    fn test_null_timestamp_parses() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, r#"{"ids": [], "hash": "", "last_synced": null}"#).unwrap();
        let state = SyncStateTracker::new(&path).get_state().unwrap();
        assert_eq!(state, SyncState::default());
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, "{\"ids\": [1, 2").unwrap();
        assert!(SyncStateTracker::new(&path).get_state().is_err());
    }

    #[test]
    fn test_matches() {
        let state = SyncState {
            tracked_ids: [1, 2].into_iter().collect(),
            digest_hash: "x".into(),
            last_synced_at: None,
        };
        assert!(state.matches(&[2, 1].into_iter().collect(), "x"));
        assert!(!state.matches(&[1].into_iter().collect(), "x"));
        assert!(!state.matches(&[1, 2].into_iter().collect(), "y"));
    }
}
