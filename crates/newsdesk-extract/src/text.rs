//! Plain text extractor (`.txt`, `.md`).

use newsdesk_core::ExtractError;

use crate::FormatOutput;

/// Decode UTF-8 text as-is.
pub fn extract(bytes: &[u8]) -> Result<FormatOutput, ExtractError> {
    let text = std::str::from_utf8(bytes)
        .map_err(|e| ExtractError::Parse(format!("invalid UTF-8: {e}")))?
        .to_string();

    let char_count = text.chars().count();
    let line_count = text.split('\n').count();

    Ok(FormatOutput::new(text, Vec::new())
        .with_metadata("char_count", char_count)
        .with_metadata("line_count", line_count))
}
