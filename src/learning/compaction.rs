//! Digest compaction - fits the learnings digest into a hard character budget
//!
//! Strategies are tried in order and the first one that fits wins:
//! as-is, deduplicated, model-summarized, truncated. Truncation cannot fail,
//! so the output never exceeds `max_chars + TRUNCATION_MARKER` characters.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::agent::summarizer::Summarizer;
use crate::learning::dedup::dedup_learnings;
use crate::learning::digest::{build_digest, DIGEST_TITLE};
use crate::types::{char_len, take_chars, LearningItem};

/// Appended to a digest that was cut off to fit the budget
pub const TRUNCATION_MARKER: &str = "\n\n[... digest truncated to fit the character budget ...]";

/// Marks a model-written digest so prompt consumers can tell it from literal history
pub const LOSSY_SUMMARY_NOTICE: &str =
    "> NOTE: lossy model-generated summary of past learnings, not literal history.";

/// Which strategy produced the final digest
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompactionStrategy {
    /// Full digest already fit
    AsIs,
    /// Near-duplicates removed
    Deduped,
    /// Condensed by the external summarizer
    ModelSummarized,
    /// Hard cut plus truncation marker (last resort)
    Truncated,
}

impl std::fmt::Display for CompactionStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CompactionStrategy::AsIs => write!(f, "as_is"),
            CompactionStrategy::Deduped => write!(f, "deduped"),
            CompactionStrategy::ModelSummarized => write!(f, "model_summarized"),
            CompactionStrategy::Truncated => write!(f, "truncated"),
        }
    }
}

/// Outcome of one compaction
#[derive(Debug, Clone, PartialEq)]
pub struct CompactionResult {
    pub content: String,
    pub strategy_used: CompactionStrategy,
    pub final_char_count: usize,
}

impl CompactionResult {
    fn new(content: String, strategy_used: CompactionStrategy) -> Self {
        let final_char_count = char_len(&content);
        Self {
            content,
            strategy_used,
            final_char_count,
        }
    }

    /// Whether anything was removed or rewritten
    pub fn compacted(&self) -> bool {
        self.strategy_used != CompactionStrategy::AsIs
    }
}

/// Header placed above model-written bullets
fn summary_header(entry_count: usize) -> String {
    format!(
        "{} (lossy summary of {} entries)\n\n{}\n\n",
        DIGEST_TITLE, entry_count, LOSSY_SUMMARY_NOTICE
    )
}

/// Cut `doc` to `max_chars` characters and append the truncation marker
pub fn truncate_digest(doc: &str, max_chars: usize) -> String {
    let mut out = String::with_capacity(max_chars + TRUNCATION_MARKER.len());
    out.push_str(take_chars(doc, max_chars));
    out.push_str(TRUNCATION_MARKER);
    out
}

/// Budget-enforcing digest compactor
pub struct Compactor {
    summarizer: Option<Arc<dyn Summarizer>>,
}

impl Compactor {
    /// Create a compactor; `None` skips the model tier entirely
    pub fn new(summarizer: Option<Arc<dyn Summarizer>>) -> Self {
        Self { summarizer }
    }

    /// Compactor that only dedups and truncates
    pub fn without_summarizer() -> Self {
        Self { summarizer: None }
    }

    /// Produce a digest of `items` (newest-first) within `max_chars`.
    pub async fn compact(&self, items: &[LearningItem], max_chars: usize) -> CompactionResult {
        let full = build_digest(items).render();
        let full_chars = char_len(&full);
        if full_chars <= max_chars {
            return CompactionResult::new(full, CompactionStrategy::AsIs);
        }

        let survivors = dedup_learnings(items);
        let deduped = build_digest(&survivors).render();
        let deduped_chars = char_len(&deduped);
        debug!(
            before = items.len(),
            after = survivors.len(),
            full_chars,
            deduped_chars,
            max_chars,
            "Deduplicated learnings"
        );
        if deduped_chars <= max_chars {
            return CompactionResult::new(deduped, CompactionStrategy::Deduped);
        }

        if let Some(summary) = self.summarize(&deduped, survivors.len(), max_chars).await {
            return CompactionResult::new(summary, CompactionStrategy::ModelSummarized);
        }

        info!(deduped_chars, max_chars, "Truncating digest to budget");
        CompactionResult::new(truncate_digest(&deduped, max_chars), CompactionStrategy::Truncated)
    }

    /// Model tier. Any failure or an over-budget answer yields `None`.
    async fn summarize(&self, deduped: &str, entry_count: usize, max_chars: usize) -> Option<String> {
        let summarizer = self.summarizer.as_ref()?;

        let header = summary_header(entry_count);
        // +1 for the trailing newline after the bullets
        let overhead = char_len(&header) + 1;
        if overhead >= max_chars {
            debug!(max_chars, "Budget too small for a summary, skipping model tier");
            return None;
        }
        let budget = max_chars - overhead;

        match summarizer.summarize(deduped, budget).await {
            Ok(bullets) => {
                let bullets = bullets.trim();
                if bullets.is_empty() {
                    warn!(backend = summarizer.name(), "Summarizer returned blank output, falling back to truncation");
                    return None;
                }
                let wrapped = format!("{}{}\n", header, bullets);
                let chars = char_len(&wrapped);
                if chars > max_chars {
                    warn!(
                        backend = summarizer.name(),
                        chars,
                        max_chars,
                        "Summary exceeds budget, falling back to truncation"
                    );
                    return None;
                }
                info!(backend = summarizer.name(), chars, "Digest summarized by model");
                Some(wrapped)
            }
            Err(e) => {
                warn!(backend = summarizer.name(), error = %e, "Summarizer failed, falling back to truncation");
                None
            }
        }
    }
}
