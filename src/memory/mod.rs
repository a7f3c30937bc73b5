//! Durable files: atomic writes and the sync state record

pub mod atomic;
pub mod state;

pub use atomic::atomic_write;
pub use state::{SyncState, SyncStateTracker};
