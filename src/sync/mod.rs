//! Memory sync: issue sources and the consolidation worker

pub mod source;
pub mod worker;

pub use source::{GhCliSource, IssueSource, SnapshotFileSource};
pub use worker::{publish_sync_event, MemorySyncWorker, SyncAction, SyncStats};
