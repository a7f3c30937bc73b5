//! Long-running service plumbing

pub mod supervisor;

pub use supervisor::{LoopConfig, LoopState, LoopStatus, LoopSupervisor};
