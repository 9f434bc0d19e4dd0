//! HTML extractor.
//!
//! Approximates the visible text of a page: text inside `script` and `style`
//! is dropped, each line is trimmed, runs of two spaces split a line into
//! fragments, and non-empty fragments are joined one per line.

use newsdesk_core::ExtractError;
use scraper::{Html, Node};

use crate::FormatOutput;

const HIDDEN_ELEMENTS: [&str; 2] = ["script", "style"];

pub fn extract(bytes: &[u8]) -> Result<FormatOutput, ExtractError> {
    let source = std::str::from_utf8(bytes)
        .map_err(|e| ExtractError::Parse(format!("invalid UTF-8: {e}")))?;

    let document = Html::parse_document(source);
    let mut raw = String::new();
    for node in document.tree.root().descendants() {
        let Node::Text(text) = node.value() else {
            continue;
        };
        let hidden = node.ancestors().any(|ancestor| {
            matches!(ancestor.value(), Node::Element(el) if HIDDEN_ELEMENTS.contains(&el.name()))
        });
        if !hidden {
            raw.push_str(text);
        }
    }

    let text = collapse_whitespace(&raw);
    let char_count = text.chars().count();

    Ok(FormatOutput::new(text, Vec::new()).with_metadata("char_count", char_count))
}

fn collapse_whitespace(raw: &str) -> String {
    raw.lines()
        .map(str::trim)
        .flat_map(|line| line.split("  "))
        .map(str::trim)
        .filter(|fragment| !fragment.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}
