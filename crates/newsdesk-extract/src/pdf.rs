//! PDF content extractor.
//!
//! Uses lopdf to extract text page by page. Pages without text are dropped
//! from the normalized text but still count towards `page_count`, so a scanned
//! PDF comes back with `has_text = false`.

use newsdesk_core::ExtractError;
#[cfg(feature = "pdf")]
use newsdesk_core::StructuredSection;

use crate::FormatOutput;

/// Combined text length (in characters) above which a PDF counts as having text.
pub const HAS_TEXT_THRESHOLD: usize = 100;

/// Extract text from PDF bytes.
#[cfg(feature = "pdf")]
pub fn extract(bytes: &[u8]) -> Result<FormatOutput, ExtractError> {
    use lopdf::Document;
    use tracing::debug;

    let doc = Document::load_mem(bytes).map_err(|e| ExtractError::Parse(e.to_string()))?;

    let pages = doc.get_pages();
    let page_count = pages.len();

    let mut sections = Vec::new();
    for &number in pages.keys() {
        match doc.extract_text(&[number]) {
            Ok(text) if !text.trim().is_empty() => {
                sections.push(StructuredSection::Page { number, text });
            }
            Ok(_) => debug!("Page {} has no extractable text", number),
            Err(e) => debug!("Failed to extract text from page {}: {}", number, e),
        }
    }

    let text = sections
        .iter()
        .filter_map(|section| match section {
            StructuredSection::Page { text, .. } => Some(text.as_str()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("\n\n");

    let has_text = text.chars().count() > HAS_TEXT_THRESHOLD;
    debug!(
        "Extracted {} chars from {} pages ({} with text)",
        text.len(),
        page_count,
        sections.len()
    );

    Ok(FormatOutput::new(text, sections)
        .with_metadata("page_count", page_count)
        .with_metadata("has_text", has_text))
}

#[cfg(not(feature = "pdf"))]
pub fn extract(_bytes: &[u8]) -> Result<FormatOutput, ExtractError> {
    Err(ExtractError::DependencyUnavailable)
}
