//! Near-duplicate detection for learnings
//!
//! Agent runs tend to rediscover the same lesson with slightly different
//! wording. Two learnings are treated as duplicates when their normalized
//! texts are equal, one contains the other, or their word sets overlap by
//! at least [`SIMILARITY_THRESHOLD`] (Jaccard).

use std::collections::HashSet;

use crate::types::{char_len, LearningItem};

/// Minimum Jaccard overlap of word sets for two learnings to collapse
pub const SIMILARITY_THRESHOLD: f64 = 0.7;

/// Below this many characters only exact (normalized) matches count
const MIN_FUZZY_LEN: usize = 12;

/// Lowercase and collapse all whitespace runs to a single space
pub fn normalize(text: &str) -> String {
    text.split_whitespace()
        .map(|w| w.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ")
}

fn word_set(normalized: &str) -> HashSet<&str> {
    normalized
        .split(' ')
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()))
        .filter(|w| !w.is_empty())
        .collect()
}

/// Jaccard overlap of the two texts' word sets
pub fn token_overlap(a: &str, b: &str) -> f64 {
    let a_words = word_set(a);
    let b_words = word_set(b);
    let union = a_words.union(&b_words).count();
    if union == 0 {
        return 0.0;
    }
    a_words.intersection(&b_words).count() as f64 / union as f64
}

/// Whether two already-normalized learnings say the same thing
pub fn is_near_duplicate(a: &str, b: &str) -> bool {
    if a == b {
        return true;
    }
    if char_len(a) < MIN_FUZZY_LEN || char_len(b) < MIN_FUZZY_LEN {
        return false;
    }
    if a.contains(b) || b.contains(a) {
        return true;
    }
    token_overlap(a, b) >= SIMILARITY_THRESHOLD
}

/// Drop near-duplicates, keeping the most recent member of each cluster.
///
/// Input must be ordered newest-first; each item is compared against the
/// survivors so far, so the first (newest) member of a cluster wins. Output
/// preserves input order.
pub fn dedup_learnings(items: &[LearningItem]) -> Vec<LearningItem> {
    let mut kept: Vec<(String, &LearningItem)> = Vec::with_capacity(items.len());

    for item in items {
        let norm = normalize(&item.extracted_learning);
        let duplicate_of = kept.iter().find(|(k, _)| is_near_duplicate(k, &norm));
        match duplicate_of {
            Some((_, newer)) => {
                tracing::debug!(dropped = item.id, kept = newer.id, "Collapsed near-duplicate learning");
            }
            None => kept.push((norm, item)),
        }
    }

    kept.into_iter().map(|(_, item)| item.clone()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn item(id: u64, text: &str, day: u32) -> LearningItem {
        LearningItem {
            id,
            raw_body: text.to_string(),
            extracted_learning: text.to_string(),
            created_at: Utc.with_ymd_and_hms(2024, 5, day, 0, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("  Always   RUN\n\tcargo fmt "), "always run cargo fmt");
    }

    #[test]
    fn test_is_near_duplicate() {
        assert!(is_near_duplicate(
            &normalize("Always run cargo fmt before committing changes"),
            &normalize("always run cargo fmt before committing the changes")
        ));
        assert!(is_near_duplicate("tool execution failed for read_file", "tool execution failed"));
        assert!(!is_near_duplicate(
            &normalize("Pin the node version in CI"),
            &normalize("Database migrations must run before seeding")
        ));
        // Short texts only collapse on exact match
        assert!(!is_near_duplicate("use tabs", "use tab"));
        assert!(is_near_duplicate("use tabs", "use tabs"));
    }

    #[test]
    fn test_dedup_keeps_newest_of_cluster() {
        let items = vec![
            item(3, "Always run cargo fmt before committing the changes", 3),
            item(2, "Cache the dependency directory between CI jobs", 2),
            item(1, "always run cargo fmt before committing changes", 1),
        ];
        let survivors = dedup_learnings(&items);
        let ids: Vec<u64> = survivors.iter().map(|i| i.id).collect();
        assert_eq!(ids, vec![3, 2]);
    }

    #[test]
    fn test_dedup_whitespace_and_case_only_differences() {
        let items = vec![
            item(9, "Prefer   explicit Timeouts", 9),
            item(8, "prefer explicit timeouts", 8),
        ];
        assert_eq!(dedup_learnings(&items).len(), 1);
    }

    #[test]
    fn test_dedup_distinct_items_untouched() {
        let items = vec![item(1, "alpha beta gamma delta", 2), item(2, "epsilon zeta eta theta", 1)];
        assert_eq!(dedup_learnings(&items), items);
    }

    #[test]
    fn test_short_multibyte_texts_need_exact_match() {
        // 7 chars but 13 bytes
        let a = normalize("привет!");
        let b = normalize("привет");
        assert!(a.len() >= MIN_FUZZY_LEN);
        assert!(!is_near_duplicate(&a, &b));
    }
}
