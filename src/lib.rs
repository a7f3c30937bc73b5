//! memsync - learnings consolidation for long-running agents
//!
//! Agent runs record what they learned as labelled issues. This library turns
//! the current set of those issues into one bounded markdown digest:
//! - Extraction of the learning text from each issue body
//! - Tiered compaction (as-is, deduped, model summary, truncation)
//! - Hash-based change detection with durable sync state
//! - A supervised periodic loop with crash backoff
//!
//! # Example
//!
//! ```ignore
//! use memsync::config::Config;
//! use memsync::sync::{source, MemorySyncWorker};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load()?;
//!     let worker = MemorySyncWorker::from_config(&config)?;
//!     let source = source::from_config(&config.source)?;
//!     let stats = worker.sync_once(source.as_ref()).await?;
//!     println!("{:?}", stats);
//!     Ok(())
//! }
//! ```

pub mod types;
pub mod memory;
pub mod agent;
pub mod config;
pub mod cli;

pub mod learning;
pub mod orchestrator;
pub mod gateway;
pub mod sync;

// Re-export commonly used types for convenience
pub use config::Config;
pub use gateway::supervisor::{LoopConfig, LoopState, LoopSupervisor};
pub use learning::compaction::{CompactionResult, CompactionStrategy, Compactor};
pub use memory::{SyncState, SyncStateTracker};
pub use sync::worker::{publish_sync_event, MemorySyncWorker, SyncStats};
pub use types::{IssueRecord, LearningItem};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Get the library info
pub fn info() -> String {
    format!("{} v{} - learnings digest sync", NAME, VERSION)
}

/// Truncate to at most `max` characters without splitting a code point
pub fn truncate_safe(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...[truncated]", &s[..idx]),
        None => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_safe_multibyte() {
        assert_eq!(truncate_safe("héllo", 10), "héllo");
        assert_eq!(truncate_safe("héllo", 2), "hé...[truncated]");
    }
}
