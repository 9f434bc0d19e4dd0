//! Query DSL parser.

use newsdesk_core::MetadataFilter;

/// Parsed query with text and filters.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedQuery {
    /// Main query text
    pub text: String,
    /// Exact-match metadata conditions
    pub filter: MetadataFilter,
    /// Result limit
    pub limit: usize,
}

/// Query parser for the DSL.
pub struct QueryParser {
    /// Default result limit
    default_limit: usize,
}

impl QueryParser {
    /// Create a new query parser.
    #[must_use]
    pub fn new(default_limit: usize) -> Self {
        Self { default_limit }
    }

    /// Parse a query string.
    ///
    /// Supports filters like:
    /// - `source:Reuters` or `source:"Financial Times"`
    /// - `type:article` or `doc_type:upload`
    /// - `title:...`, `url:...`, `date:...`
    /// - `limit:10`
    ///
    /// Filter values match exactly, case included.
    #[must_use]
    pub fn parse(&self, query: &str) -> ParsedQuery {
        let mut text_parts = Vec::new();
        let mut filter = MetadataFilter::new();
        let mut limit = self.default_limit;

        for part in split_terms(query) {
            let Some((key, value)) = part.split_once(':') else {
                text_parts.push(part);
                continue;
            };
            let value = value.trim_matches('"');
            match key.to_lowercase().as_str() {
                "type" | "doc_type" if !value.is_empty() => filter.insert("doc_type", value),
                "title" | "source" | "url" | "date" if !value.is_empty() => {
                    filter.insert(key.to_lowercase(), value);
                }
                "limit" => match value.parse() {
                    Ok(n) => limit = n,
                    Err(_) => text_parts.push(part),
                },
                // Unknown filter, treat as text
                _ => text_parts.push(part),
            }
        }

        ParsedQuery {
            text: text_parts.join(" "),
            filter,
            limit,
        }
    }
}

impl Default for QueryParser {
    fn default() -> Self {
        Self::new(10)
    }
}

/// Split on whitespace, keeping double-quoted runs together.
fn split_terms(query: &str) -> Vec<String> {
    let mut terms = Vec::new();
    let mut current = String::new();
    let mut quoted = false;

    for c in query.chars() {
        match c {
            '"' => {
                quoted = !quoted;
                current.push(c);
            }
            c if c.is_whitespace() && !quoted => {
                if !current.is_empty() {
                    terms.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }
    if !current.is_empty() {
        terms.push(current);
    }
    terms
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple() {
        let parser = QueryParser::default();
        let result = parser.parse("semiconductor export controls");

        assert_eq!(result.text, "semiconductor export controls");
        assert!(result.filter.is_empty());
        assert_eq!(result.limit, 10);
    }

    #[test]
    fn test_parse_with_filters() {
        let parser = QueryParser::default();
        let result = parser.parse("chip exports source:Reuters type:article limit:5");

        assert_eq!(result.text, "chip exports");
        assert_eq!(
            result.filter,
            MetadataFilter::new()
                .with("source", "Reuters")
                .with("doc_type", "article")
        );
        assert_eq!(result.limit, 5);
    }

    #[test]
    fn test_quoted_value() {
        let parser = QueryParser::new(20);
        let result = parser.parse(r#"rate decision source:"Financial Times""#);

        assert_eq!(result.text, "rate decision");
        assert_eq!(
            result.filter,
            MetadataFilter::new().with("source", "Financial Times")
        );
        assert_eq!(result.limit, 20);
    }

    #[test]
    fn test_unknown_key_and_bad_limit_stay_in_text() {
        let parser = QueryParser::default();
        let result = parser.parse("ratio 3:1 author:smith limit:many");

        assert_eq!(result.text, "ratio 3:1 author:smith limit:many");
        assert!(result.filter.is_empty());
        assert_eq!(result.limit, 10);
    }

    #[test]
    fn test_url_value_keeps_its_colon() {
        let parser = QueryParser::default();
        let result = parser.parse("url:https://example.com/a");
        assert_eq!(
            result.filter,
            MetadataFilter::new().with("url", "https://example.com/a")
        );
        assert!(result.text.is_empty());
    }
}
