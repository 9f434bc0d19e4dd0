//! # newsdesk-extract
//!
//! Multi-format document extraction for the newsdesk ingestion pipeline.
//!
//! [`DocumentExtractor`] detects the format from the filename extension
//! (case-insensitive) and produces an
//! [`ExtractedDocument`](newsdesk_core::ExtractedDocument) with normalized
//! text, structured sections and metadata.
//!
//! ## Supported Formats
//!
//! | Format | Extensions | Backend | Feature | Metadata |
//! |--------|------------|---------|---------|----------|
//! | PDF | `.pdf` | lopdf | `pdf` | `page_count`, `has_text` |
//! | Excel | `.xlsx`, `.xls`, `.xlsm` | calamine | `excel` | `sheet_names`, `total_sheets` |
//! | Word | `.docx` | zip + quick-xml | `word` | `paragraph_count`, `table_count` |
//! | Text | `.txt`, `.md` | - | - | `char_count`, `line_count` |
//! | HTML | `.html`, `.htm` | scraper | - | `char_count` |
//!
//! A format whose feature is disabled (or switched off through
//! [`Capabilities`]) yields `extractionFailed("dependency unavailable")`
//! without affecting the others.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use newsdesk_extract::{DocumentExtractor, DocumentSource};
//!
//! let extractor = DocumentExtractor::new();
//! let doc = extractor
//!     .extract(DocumentSource::Path("q3.xlsx".into()), "q3.xlsx")
//!     .await;
//! if doc.is_ok() {
//!     println!("{}", doc.normalized_text);
//! }
//! ```

use std::collections::BTreeMap;

use newsdesk_core::StructuredSection;
use serde_json::Value;

pub mod excel;
pub mod extractor;
pub mod html;
pub mod pdf;
pub mod text;
pub mod word;

pub use extractor::{Capabilities, DocumentExtractor, DocumentSource};

/// What a format handler produces on success.
#[derive(Debug, Clone, Default)]
pub struct FormatOutput {
    pub text: String,
    pub sections: Vec<StructuredSection>,
    pub metadata: BTreeMap<String, Value>,
}

impl FormatOutput {
    pub fn new(text: String, sections: Vec<StructuredSection>) -> Self {
        Self {
            text,
            sections,
            metadata: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_metadata(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }
}
