//! Learning extraction from raw issue bodies
//!
//! Agent runs file issues whose body carries a bolded `**Learning:**` field
//! among others (`**Context:**`, `**Run:**`, ...). Only the learning text is
//! kept for the digest.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::types::{IssueRecord, LearningItem};

/// `**Learning:**`, `**Learnings:**`, `**Lesson:**`, `**Lessons learned**:` ...
static LEARNING_MARKER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\*\*\s*(?:learnings?|lessons?(?:\s+learned)?)\s*(?::\s*\*\*|\*\*\s*:)")
        .expect("learning marker regex is valid")
});

/// Any other bolded field starting a line, e.g. `**Context:**`
static NEXT_FIELD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^[ \t]*\*\*[^*\n]+?(?::\s*\*\*|\*\*\s*:)")
        .expect("field regex is valid")
});

static BLANK_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\n[ \t]*\r?\n").expect("blank line regex is valid")
});

/// Pull the learning text out of one issue body.
///
/// Returns the text following the learning marker up to the next blank line
/// or bolded field. Without a marker the whole trimmed body is the learning.
/// Whitespace-only input gives an empty string.
pub fn extract_learning(body: &str) -> String {
    let body = body.trim();
    if body.is_empty() {
        return String::new();
    }

    let Some(marker) = LEARNING_MARKER.find(body) else {
        return body.to_string();
    };

    let rest = body[marker.end()..].trim_start();

    let mut end = rest.len();
    if let Some(m) = BLANK_LINE.find(rest) {
        end = end.min(m.start());
    }
    if let Some(m) = NEXT_FIELD.find(rest) {
        end = end.min(m.start());
    }

    rest[..end].trim().to_string()
}

/// Extract learnings for a whole snapshot, dropping issues with nothing to say
pub fn extract_all(issues: &[IssueRecord]) -> Vec<LearningItem> {
    issues
        .iter()
        .filter_map(|issue| {
            let learning = extract_learning(&issue.body);
            if learning.is_empty() {
                tracing::debug!(issue = issue.id, "No learning text in issue, skipping");
                return None;
            }
            Some(LearningItem {
                id: issue.id,
                raw_body: issue.body.clone(),
                extracted_learning: learning,
                created_at: issue.created_at,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_extract_marker_until_next_field() {
        let body = "**Run:** 1234\n**Learning:** Always pin the toolchain version.\n**Context:** CI broke";
        assert_eq!(extract_learning(body), "Always pin the toolchain version.");
    }

    #[test]
    fn test_extract_marker_until_blank_line() {
        let body = "**Learning:** Retry flaky network calls\nwith jitter.\n\nUnrelated trailing notes";
        assert_eq!(extract_learning(body), "Retry flaky network calls\nwith jitter.");
    }

    #[test]
    fn test_extract_marker_on_its_own_line() {
        let body = "Summary of run\n\n**Learning:**\nRun migrations before seeding.\n\n**Outcome:** ok";
        assert_eq!(extract_learning(body), "Run migrations before seeding.");
    }

    #[test]
    fn test_extract_marker_variants() {
        assert_eq!(extract_learning("**learnings:** lower case works"), "lower case works");
        assert_eq!(extract_learning("**Lesson learned**: colon outside"), "colon outside");
    }

    #[test]
    fn test_extract_falls_back_to_body() {
        assert_eq!(extract_learning("  plain body text \n"), "plain body text");
    }

    #[test]
    fn test_extract_empty_input() {
        assert_eq!(extract_learning(""), "");
        assert_eq!(extract_learning("   \n\t  "), "");
    }

    #[test]
    fn test_extract_all_skips_empty() {
        let ts = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        let issues = vec![
            IssueRecord::new(1, "a", "**Learning:** keep", ts),
            IssueRecord::new(2, "b", "   ", ts),
            IssueRecord::new(3, "c", "**Learning:**\n\n**Context:** nothing learned", ts),
        ];
        let items = extract_all(&issues);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].id, 1);
        assert_eq!(items[0].extracted_learning, "keep");
    }
}
