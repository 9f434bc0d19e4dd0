//! System of record for newsdesk.
//!
//! Articles arrive from the scraping flow and uploads from the intake flow;
//! both land here with `vector_indexed = false`. The indexing orchestrator
//! reads candidates through [`RecordStore`](newsdesk_core::RecordStore) and
//! flips the flag after a confirmed vector write.
//!
//! | Store | Backing |
//! |-------|---------|
//! | [`SqliteRecords`] | SQLite database via `sqlx` |
//! | [`MemoryRecords`] | process memory, for tests and dry runs |

pub mod memory;
pub mod sqlite;

pub use memory::MemoryRecords;
pub use sqlite::SqliteRecords;

/// Number of whitespace-separated words.
pub(crate) fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// The text an article is embedded from: full content, else short content.
pub(crate) fn article_text<'a>(
    full_content: Option<&'a str>,
    content: Option<&'a str>,
) -> Option<&'a str> {
    full_content
        .filter(|t| !t.trim().is_empty())
        .or_else(|| content.filter(|t| !t.trim().is_empty()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_article_text_prefers_full_content() {
        assert_eq!(article_text(Some("full"), Some("short")), Some("full"));
        assert_eq!(article_text(Some("  "), Some("short")), Some("short"));
        assert_eq!(article_text(None, Some("short")), Some("short"));
        assert_eq!(article_text(None, Some("")), None);
        assert_eq!(article_text(None, None), None);
    }
}
