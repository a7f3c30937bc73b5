//! Digest assembly
//!
//! Renders an ordered list of learnings into the markdown document that is
//! handed to future agent runs as prompt context.

use crate::types::{char_len, LearningItem};

/// Literal separator line between sections
pub const SECTION_SEPARATOR: &str = "---";

/// Title used in the digest header line
pub const DIGEST_TITLE: &str = "# Learnings Digest";

/// A rendered-on-demand digest.
///
/// Only the text form produced by [`DigestDocument::render`] is ever persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct DigestDocument {
    pub header: String,
    pub sections: Vec<String>,
    pub total_chars: usize,
}

impl DigestDocument {
    /// Render the document as text
    pub fn render(&self) -> String {
        let mut out = String::with_capacity(self.total_chars + 1);
        out.push_str(&self.header);
        out.push('\n');
        for (i, section) in self.sections.iter().enumerate() {
            if i > 0 {
                out.push('\n');
                out.push_str(SECTION_SEPARATOR);
                out.push('\n');
            }
            out.push('\n');
            out.push_str(section);
            out.push('\n');
        }
        out
    }

    pub fn entry_count(&self) -> usize {
        self.sections.len()
    }
}

/// Format one learning as a digest section
fn format_section(item: &LearningItem) -> String {
    format!(
        "## #{} ({})\n\n{}",
        item.id,
        item.created_at.format("%Y-%m-%d"),
        item.extracted_learning.trim()
    )
}

/// Build a digest from learnings already ordered newest-first by the caller.
///
/// The input order is kept as-is so identical input always renders the same
/// text.
pub fn build_digest(items: &[LearningItem]) -> DigestDocument {
    let header = format!("{} ({} entries)", DIGEST_TITLE, items.len());
    let sections: Vec<String> = items.iter().map(format_section).collect();

    let mut doc = DigestDocument {
        header,
        sections,
        total_chars: 0,
    };
    doc.total_chars = char_len(&doc.render());
    doc
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn item(id: u64, text: &str, day: u32) -> LearningItem {
        LearningItem {
            id,
            raw_body: format!("**Learning:** {}", text),
            extracted_learning: text.to_string(),
            created_at: Utc.with_ymd_and_hms(2024, 6, day, 12, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_header_states_count() {
        let doc = build_digest(&[item(1, "a", 2), item(2, "b", 1)]);
        assert_eq!(doc.header, "# Learnings Digest (2 entries)");
        assert!(doc.render().starts_with("# Learnings Digest (2 entries)\n"));
    }

    #[test]
    fn test_keeps_caller_order() {
        // Deliberately oldest-first: the builder must not re-sort
        let doc = build_digest(&[item(7, "older first", 1), item(8, "newer second", 20)]);
        let text = doc.render();
        let first = text.find("older first").unwrap();
        let second = text.find("newer second").unwrap();
        assert!(first < second);
    }

    #[test]
    fn test_sections_separated_by_rule() {
        let text = build_digest(&[item(1, "one", 3), item(2, "two", 2), item(3, "three", 1)]).render();
        let rules = text.lines().filter(|l| *l == SECTION_SEPARATOR).count();
        assert_eq!(rules, 2);
        assert!(text.contains("## #1 (2024-06-03)\n\none\n"));
    }

    #[test]
    fn test_deterministic_and_counts_chars() {
        let items = vec![item(1, "naïve café", 1)];
        let a = build_digest(&items);
        let b = build_digest(&items);
        assert_eq!(a, b);
        assert_eq!(a.total_chars, a.render().chars().count());
    }

    #[test]
    fn test_empty_digest() {
        let doc = build_digest(&[]);
        assert_eq!(doc.render(), "# Learnings Digest (0 entries)\n");
        assert_eq!(doc.entry_count(), 0);
    }
}
