//! Memory sync worker
//!
//! One cycle turns the full current issue snapshot into the learnings digest:
//! extract, order newest-first, hash, skip if nothing changed, otherwise
//! compact to budget, persist atomically, record state, announce on the bus.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::agent::summarizer;
use crate::config::Config;
use crate::learning::compaction::{CompactionStrategy, Compactor};
use crate::learning::extractor::extract_all;
use crate::memory::{atomic_write, SyncStateTracker};
use crate::orchestrator::bus::{BusEvent, EventBus};
use crate::sync::source::IssueSource;
use crate::types::{parse_snapshot, IssueRecord, LearningItem};

/// Event type published after every cycle
pub const SYNC_EVENT_TYPE: &str = "memory_sync";

/// What a sync cycle did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncAction {
    Synced,
    Skipped,
}

impl std::fmt::Display for SyncAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncAction::Synced => write!(f, "synced"),
            SyncAction::Skipped => write!(f, "skipped"),
        }
    }
}

/// Outcome of one cycle, also the payload of the bus event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncStats {
    pub action: SyncAction,
    /// Learnings in the current snapshot
    pub item_count: usize,
    /// Whether the digest was reduced to fit the budget
    pub compacted: bool,
    /// Characters written (0 when skipped)
    pub digest_chars: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy: Option<CompactionStrategy>,
    /// Snapshot entries that contributed nothing (malformed or no learning)
    #[serde(default)]
    pub skipped_items: usize,
}

/// Hash of the ordered `(id, learning)` pairs
pub fn content_hash(items: &[LearningItem]) -> String {
    let mut hasher = Sha256::new();
    for item in items {
        hasher.update(item.id.to_string().as_bytes());
        hasher.update([0x1f]);
        hasher.update(item.extracted_learning.as_bytes());
        hasher.update([0x1e]);
    }
    hex::encode(hasher.finalize())
}

/// Fire-and-forget announcement of a finished cycle.
///
/// Delivery problems are logged and swallowed.
pub fn publish_sync_event(bus: &dyn EventBus, stats: &SyncStats) {
    let data = match serde_json::to_value(stats) {
        Ok(v) => v,
        Err(e) => {
            warn!(error = %e, "Failed to serialize sync stats for event");
            return;
        }
    };
    match bus.publish(BusEvent::new(SYNC_EVENT_TYPE, data)) {
        Ok(receivers) => debug!(receivers, "Published memory sync event"),
        Err(e) => debug!(error = %e, "Memory sync event not delivered"),
    }
}

/// Consolidates learning issues into the digest file
pub struct MemorySyncWorker {
    tracker: SyncStateTracker,
    compactor: Compactor,
    digest_path: PathBuf,
    max_chars: usize,
    bus: Option<Arc<dyn EventBus>>,
}

impl MemorySyncWorker {
    pub fn new(
        tracker: SyncStateTracker,
        compactor: Compactor,
        digest_path: impl Into<PathBuf>,
        max_chars: usize,
    ) -> Self {
        Self {
            tracker,
            compactor,
            digest_path: digest_path.into(),
            max_chars,
            bus: None,
        }
    }

    /// Build a worker from configuration
    pub fn from_config(config: &Config) -> Result<Self> {
        let summarizer = summarizer::from_config(&config.summarizer)?;
        Ok(Self::new(
            SyncStateTracker::new(config.state_path()?),
            Compactor::new(summarizer),
            config.digest_path()?,
            config.sync.max_digest_chars,
        ))
    }

    /// Publish a stats event after every cycle
    pub fn with_bus(mut self, bus: Arc<dyn EventBus>) -> Self {
        self.bus = Some(bus);
        self
    }

    pub fn digest_path(&self) -> &Path {
        &self.digest_path
    }

    pub fn tracker(&self) -> &SyncStateTracker {
        &self.tracker
    }

    /// Run one cycle over the full current snapshot
    pub async fn sync(&self, issues: &[IssueRecord]) -> Result<SyncStats> {
        let mut items = extract_all(issues);
        // Stable: equal timestamps keep snapshot order
        items.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let ids: BTreeSet<u64> = items.iter().map(|i| i.id).collect();
        let hash = content_hash(&items);
        let skipped_items = issues.len() - items.len();

        let previous = self.tracker.get_state()?;
        if previous.matches(&ids, &hash) && self.digest_path.exists() {
            debug!(items = items.len(), "Learnings unchanged since last sync, skipping");
            return Ok(SyncStats {
                action: SyncAction::Skipped,
                item_count: items.len(),
                compacted: false,
                digest_chars: 0,
                strategy: None,
                skipped_items,
            });
        }

        let result = self.compactor.compact(&items, self.max_chars).await;

        atomic_write(&self.digest_path, result.content.as_bytes())
            .with_context(|| format!("Failed to write digest {}", self.digest_path.display()))?;
        self.tracker
            .update_state(ids, hash)
            .context("Failed to persist sync state")?;

        info!(
            items = items.len(),
            strategy = %result.strategy_used,
            chars = result.final_char_count,
            path = %self.digest_path.display(),
            "Learnings digest synced"
        );

        Ok(SyncStats {
            action: SyncAction::Synced,
            item_count: items.len(),
            compacted: result.compacted(),
            digest_chars: result.final_char_count,
            strategy: Some(result.strategy_used),
            skipped_items,
        })
    }

    /// Fetch a snapshot from `source`, sync it and publish the outcome
    pub async fn sync_once(&self, source: &dyn IssueSource) -> Result<SyncStats> {
        let raw = source
            .fetch()
            .await
            .with_context(|| format!("Failed to fetch snapshot from {} source", source.name()))?;
        let (issues, malformed) = parse_snapshot(raw);

        let mut stats = self.sync(&issues).await?;
        stats.skipped_items += malformed;

        if let Some(bus) = &self.bus {
            publish_sync_event(bus.as_ref(), &stats);
        }
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::bus::BroadcastBus;
    use chrono::{TimeZone, Utc};

    fn issue(id: u64, learning: &str, day: u32) -> IssueRecord {
        IssueRecord::new(
            id,
            format!("run {}", id),
            format!("**Learning:** {}", learning),
            Utc.with_ymd_and_hms(2024, 6, day, 0, 0, 0).unwrap(),
        )
    }

    fn worker(dir: &Path, max_chars: usize) -> MemorySyncWorker {
        MemorySyncWorker::new(
            SyncStateTracker::new(dir.join("state.json")),
            Compactor::without_summarizer(),
            dir.join("digest.md"),
            max_chars,
        )
    }

    #[test]
    fn test_content_hash_depends_on_order_and_text() {
        let a = extract_all(&[issue(1, "x", 1), issue(2, "y", 2)]);
        let mut b = a.clone();
        b.reverse();
        assert_ne!(content_hash(&a), content_hash(&b));
        assert_eq!(content_hash(&a), content_hash(&a.clone()));

        let mut c = a.clone();
        c[0].extracted_learning.push('!');
        assert_ne!(content_hash(&a), content_hash(&c));
    }

    #[tokio::test]
    async fn test_sync_orders_newest_first() {
        let dir = tempfile::tempdir().unwrap();
        let w = worker(dir.path(), 10_000);
        w.sync(&[issue(1, "oldest lesson", 1), issue(3, "newest lesson", 20), issue(2, "middle lesson", 10)])
            .await
            .unwrap();

        let digest = std::fs::read_to_string(w.digest_path()).unwrap();
        let newest = digest.find("newest lesson").unwrap();
        let middle = digest.find("middle lesson").unwrap();
        let oldest = digest.find("oldest lesson").unwrap();
        assert!(newest < middle && middle < oldest);
    }

    #[tokio::test]
    async fn test_changed_snapshot_resyncs() {
        let dir = tempfile::tempdir().unwrap();
        let w = worker(dir.path(), 10_000);
        w.sync(&[issue(1, "first", 1)]).await.unwrap();

        let stats = w.sync(&[issue(1, "first", 1), issue(2, "second", 2)]).await.unwrap();
        assert_eq!(stats.action, SyncAction::Synced);
        assert_eq!(stats.item_count, 2);
        let state = w.tracker().get_state().unwrap();
        assert_eq!(state.tracked_ids.len(), 2);
    }

    #[tokio::test]
    async fn test_edited_learning_resyncs() {
        let dir = tempfile::tempdir().unwrap();
        let w = worker(dir.path(), 10_000);
        w.sync(&[issue(1, "first", 1)]).await.unwrap();
        let stats = w.sync(&[issue(1, "first, revised", 1)]).await.unwrap();
        assert_eq!(stats.action, SyncAction::Synced);
    }

    #[tokio::test]
    async fn test_empty_snapshot_is_steady_state() {
        let dir = tempfile::tempdir().unwrap();
        let w = worker(dir.path(), 10_000);

        let first = w.sync(&[]).await.unwrap();
        assert_eq!(first.action, SyncAction::Synced);
        assert_eq!(first.item_count, 0);
        assert!(std::fs::read_to_string(w.digest_path()).unwrap().contains("(0 entries)"));

        let second = w.sync(&[]).await.unwrap();
        assert_eq!(second.action, SyncAction::Skipped);
    }

    #[tokio::test]
    async fn test_missing_digest_is_rebuilt() {
        let dir = tempfile::tempdir().unwrap();
        let w = worker(dir.path(), 10_000);
        let snapshot = [issue(1, "pin the toolchain", 1)];
        w.sync(&snapshot).await.unwrap();

        std::fs::remove_file(w.digest_path()).unwrap();
        let stats = w.sync(&snapshot).await.unwrap();
        assert_eq!(stats.action, SyncAction::Synced);
        assert!(std::fs::read_to_string(w.digest_path()).unwrap().contains("pin the toolchain"));
    }

    #[tokio::test]
    async fn test_issues_without_learning_are_counted() {
        let dir = tempfile::tempdir().unwrap();
        let w = worker(dir.path(), 10_000);
        let mut blank = issue(5, "", 1);
        blank.body = "   ".into();
        let stats = w.sync(&[issue(1, "real", 2), blank]).await.unwrap();
        assert_eq!(stats.item_count, 1);
        assert_eq!(stats.skipped_items, 1);
    }

    #[tokio::test]
    async fn test_persistence_failure_leaves_state_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let digest_dir = dir.path().join("digest.md");
        // A non-empty directory where the digest should go makes the write fail
        std::fs::create_dir(&digest_dir).unwrap();
        std::fs::write(digest_dir.join("block"), "x").unwrap();

        let w = worker(dir.path(), 10_000);
        assert!(w.sync(&[issue(1, "lesson", 1)]).await.is_err());
        assert!(w.tracker().get_state().unwrap().tracked_ids.is_empty());
    }

    #[tokio::test]
    async fn test_publish_sync_event_payload() {
        let bus = BroadcastBus::new(4);
        let mut rx = bus.subscribe();
        let stats = SyncStats {
            action: SyncAction::Synced,
            item_count: 2,
            compacted: true,
            digest_chars: 321,
            strategy: Some(CompactionStrategy::Truncated),
            skipped_items: 0,
        };
        publish_sync_event(&bus, &stats);

        let event = rx.recv().await.unwrap();
        assert_eq!(event.event_type, SYNC_EVENT_TYPE);
        assert_eq!(event.data["action"], "synced");
        assert_eq!(event.data["strategy"], "truncated");
        let round: SyncStats = serde_json::from_value(event.data).unwrap();
        assert_eq!(round, stats);
    }

    #[test]
    fn test_publish_without_listeners_does_not_panic() {
        let bus = BroadcastBus::new(4);
        let stats = SyncStats {
            action: SyncAction::Skipped,
            item_count: 0,
            compacted: false,
            digest_chars: 0,
            strategy: None,
            skipped_items: 0,
        };
        publish_sync_event(&bus, &stats);
    }
}
