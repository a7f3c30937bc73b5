//! Shared types used across modules
//!
//! This module contains types that are used by multiple modules
//! to avoid circular dependencies.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// A single issue as supplied by the tracker snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssueRecord {
    #[serde(alias = "number")]
    pub id: u64,
    #[serde(default)]
    pub title: String,
    pub body: String,
    #[serde(alias = "createdAt")]
    pub created_at: DateTime<Utc>,
}

impl IssueRecord {
    pub fn new(id: u64, title: impl Into<String>, body: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            title: title.into(),
            body: body.into(),
            created_at,
        }
    }
}

/// A learning extracted from one issue
///
/// Rebuilt from the full snapshot on every cycle, never patched in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearningItem {
    pub id: u64,
    pub raw_body: String,
    pub extracted_learning: String,
    pub created_at: DateTime<Utc>,
}

/// Parse a raw tracker snapshot, dropping items that are missing fields
///
/// Returns the parsed records plus the number of items that were skipped.
pub fn parse_snapshot(raw: Vec<serde_json::Value>) -> (Vec<IssueRecord>, usize) {
    let mut records = Vec::with_capacity(raw.len());
    let mut skipped = 0;

    for value in raw {
        match serde_json::from_value::<IssueRecord>(value) {
            Ok(record) => records.push(record),
            Err(e) => {
                skipped += 1;
                warn!(error = %e, "Skipping malformed snapshot item");
            }
        }
    }

    (records, skipped)
}

/// Count characters (not bytes) in a string
pub fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Take at most `max` characters from the start of a string
pub fn take_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
