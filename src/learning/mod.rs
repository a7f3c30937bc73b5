//! Learning consolidation
//!
//! Pulls the learning text out of issue bodies, renders it as a markdown
//! digest and compacts that digest to fit a character budget.

pub mod extractor;
pub mod digest;
pub mod dedup;
pub mod compaction;

pub use extractor::{extract_all, extract_learning};
pub use digest::{build_digest, DigestDocument};
pub use dedup::dedup_learnings;
pub use compaction::{CompactionResult, CompactionStrategy, Compactor};
