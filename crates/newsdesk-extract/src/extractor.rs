//! Format detection and dispatch.
//!
//! [`DocumentExtractor`] maps a filename to a [`SourceFormat`] and runs that
//! format's handler. It never returns an error: unsupported extensions and
//! handler failures come back as an [`ExtractedDocument`] whose `status`
//! says what happened, so a batch of heterogeneous files can keep going.

use std::path::PathBuf;

use newsdesk_core::{ExtractError, ExtractedDocument, SourceFormat};
use serde::Serialize;
use tracing::{debug, warn};

use crate::{excel, html, pdf, text, word, FormatOutput};

/// Raw input to the extractor.
#[derive(Debug, Clone)]
pub enum DocumentSource {
    Bytes(Vec<u8>),
    Path(PathBuf),
}

impl From<Vec<u8>> for DocumentSource {
    fn from(bytes: Vec<u8>) -> Self {
        DocumentSource::Bytes(bytes)
    }
}

impl From<PathBuf> for DocumentSource {
    fn from(path: PathBuf) -> Self {
        DocumentSource::Path(path)
    }
}

/// Which optional format backends this process can use.
///
/// Resolved once at startup. Text and HTML need no optional backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Capabilities {
    pub pdf: bool,
    pub excel: bool,
    pub word: bool,
}

impl Capabilities {
    /// Backends compiled into this build.
    pub const fn compiled() -> Self {
        Self {
            pdf: cfg!(feature = "pdf"),
            excel: cfg!(feature = "excel"),
            word: cfg!(feature = "word"),
        }
    }

    /// No optional backends.
    pub const fn none() -> Self {
        Self {
            pdf: false,
            excel: false,
            word: false,
        }
    }

    /// Whether `format` can be handled.
    pub fn supports(&self, format: SourceFormat) -> bool {
        match format {
            SourceFormat::Pdf => self.pdf,
            SourceFormat::Excel => self.excel,
            SourceFormat::Word => self.word,
            SourceFormat::Text | SourceFormat::Html => true,
            SourceFormat::Unknown => false,
        }
    }

    fn intersect(self, other: Self) -> Self {
        Self {
            pdf: self.pdf && other.pdf,
            excel: self.excel && other.excel,
            word: self.word && other.word,
        }
    }
}

impl Default for Capabilities {
    fn default() -> Self {
        Self::compiled()
    }
}

/// Extracts normalized text from documents of any supported format.
#[derive(Debug, Clone, Copy, Default)]
pub struct DocumentExtractor {
    capabilities: Capabilities,
}

impl DocumentExtractor {
    /// Create an extractor using every compiled backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an extractor limited to `capabilities`.
    ///
    /// Backends that are not compiled in stay disabled.
    #[must_use]
    pub fn with_capabilities(capabilities: Capabilities) -> Self {
        Self {
            capabilities: Capabilities::compiled().intersect(capabilities),
        }
    }

    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    /// Extract from in-memory bytes.
    pub fn extract_bytes(&self, bytes: &[u8], filename: &str) -> ExtractedDocument {
        let format = SourceFormat::from_filename(filename);
        if !format.is_supported() {
            debug!("Unsupported format for {}", filename);
            return ExtractedDocument::unsupported(filename);
        }

        match self.run(format, bytes) {
            Ok(output) => {
                debug!(
                    "Extracted {} chars from {} ({})",
                    output.text.len(),
                    filename,
                    format
                );
                ExtractedDocument::ok(
                    filename,
                    format,
                    output.text,
                    output.sections,
                    output.metadata,
                )
            }
            Err(e) => {
                warn!("Extraction failed for {}: {}", filename, e);
                ExtractedDocument::failed(filename, format, failure_reason(format, &e))
            }
        }
    }

    /// Extract from bytes or a path.
    ///
    /// Parsing runs on the blocking pool. A panicking parser is reported as
    /// an extraction failure.
    pub async fn extract(&self, source: DocumentSource, filename: &str) -> ExtractedDocument {
        let format = SourceFormat::from_filename(filename);
        if !format.is_supported() {
            debug!("Unsupported format for {}", filename);
            return ExtractedDocument::unsupported(filename);
        }

        let bytes = match source {
            DocumentSource::Bytes(bytes) => bytes,
            DocumentSource::Path(path) => match tokio::fs::read(&path).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!("Failed to read {:?}: {}", path, e);
                    return ExtractedDocument::failed(
                        filename,
                        format,
                        failure_reason(format, &ExtractError::Io(e)),
                    );
                }
            },
        };

        let extractor = *self;
        let name = filename.to_string();
        match tokio::task::spawn_blocking(move || extractor.extract_bytes(&bytes, &name)).await {
            Ok(document) => document,
            Err(e) => {
                warn!("Extraction task for {} aborted: {}", filename, e);
                ExtractedDocument::failed(
                    filename,
                    format,
                    failure_reason(format, &ExtractError::Failed(e.to_string())),
                )
            }
        }
    }

    fn run(&self, format: SourceFormat, bytes: &[u8]) -> Result<FormatOutput, ExtractError> {
        if !self.capabilities.supports(format) {
            return Err(ExtractError::DependencyUnavailable);
        }
        match format {
            SourceFormat::Pdf => pdf::extract(bytes),
            SourceFormat::Excel => excel::extract(bytes),
            SourceFormat::Word => word::extract(bytes),
            SourceFormat::Text => text::extract(bytes),
            SourceFormat::Html => html::extract(bytes),
            SourceFormat::Unknown => Err(ExtractError::UnsupportedType(format.to_string())),
        }
    }
}

fn failure_reason(format: SourceFormat, error: &ExtractError) -> String {
    if matches!(error, ExtractError::DependencyUnavailable) {
        return error.to_string();
    }
    let label = match format {
        SourceFormat::Pdf => "PDF",
        SourceFormat::Excel => "Excel",
        SourceFormat::Word => "Word",
        SourceFormat::Text => "Text",
        SourceFormat::Html => "HTML",
        SourceFormat::Unknown => "Document",
    };
    format!("{label} processing error: {error}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use newsdesk_core::ExtractionStatus;
    use tempfile::tempdir;

    #[test]
    fn test_unsupported_extension() {
        let doc = DocumentExtractor::new().extract_bytes(b"PK..", "slides.pptx");
        assert_eq!(doc.status, ExtractionStatus::UnsupportedFormat);
        assert_eq!(doc.source_format, SourceFormat::Unknown);
        assert!(doc.normalized_text.is_empty());
    }

    #[test]
    fn test_text_is_ok() {
        let doc = DocumentExtractor::new().extract_bytes(b"Markets rallied.", "NOTES.TXT");
        assert!(doc.is_ok());
        assert_eq!(doc.source_format, SourceFormat::Text);
        assert_eq!(doc.normalized_text, "Markets rallied.");
        assert_eq!(doc.filename, "NOTES.TXT");
    }

    #[test]
    fn test_html_is_ok() {
        let doc = DocumentExtractor::new()
            .extract_bytes(b"<html><body><p>Hello newsroom</p></body></html>", "page.html");
        assert!(doc.is_ok());
        assert_eq!(doc.normalized_text, "Hello newsroom");
    }

    #[test]
    fn test_disabled_capability_reports_dependency_unavailable() {
        let extractor = DocumentExtractor::with_capabilities(Capabilities::none());
        for filename in ["a.pdf", "b.xlsx", "c.docx"] {
            let doc = extractor.extract_bytes(b"irrelevant", filename);
            assert_eq!(
                doc.status,
                ExtractionStatus::ExtractionFailed("dependency unavailable".to_string()),
                "{filename}"
            );
        }
        // other formats unaffected
        assert!(extractor.extract_bytes(b"still fine", "d.md").is_ok());
    }

    #[test]
    fn test_with_capabilities_cannot_enable_missing_backends() {
        let extractor = DocumentExtractor::with_capabilities(Capabilities {
            pdf: true,
            excel: true,
            word: true,
        });
        assert_eq!(extractor.capabilities(), Capabilities::compiled());
    }

    #[test]
    fn test_parser_failure_becomes_status() {
        let doc = DocumentExtractor::new().extract_bytes(&[0xc3, 0x28], "broken.txt");
        let reason = doc.failure_reason().unwrap();
        assert!(reason.starts_with("Text processing error:"), "{reason}");
    }

    #[cfg(feature = "word")]
    #[test]
    fn test_corrupt_docx_becomes_status() {
        let doc = DocumentExtractor::new().extract_bytes(b"not a zip", "memo.docx");
        assert!(doc.failure_reason().unwrap().starts_with("Word processing error:"));
    }

    #[tokio::test]
    async fn test_extract_from_path() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("brief.md");
        std::fs::write(&path, "# Brief\n\nOil prices fell.").unwrap();

        let doc = DocumentExtractor::new()
            .extract(DocumentSource::Path(path), "brief.md")
            .await;

        assert!(doc.is_ok());
        assert_eq!(doc.metadata["line_count"], 3);
    }

    #[tokio::test]
    async fn test_missing_path_becomes_status() {
        let doc = DocumentExtractor::new()
            .extract(
                DocumentSource::Path(PathBuf::from("/nonexistent/brief.txt")),
                "brief.txt",
            )
            .await;
        assert!(doc
            .failure_reason()
            .unwrap()
            .starts_with("Text processing error: io error"));
    }

    #[tokio::test]
    async fn test_unsupported_path_is_not_read() {
        let doc = DocumentExtractor::new()
            .extract(DocumentSource::Path(PathBuf::from("/nonexistent/a.bin")), "a.bin")
            .await;
        assert_eq!(doc.status, ExtractionStatus::UnsupportedFormat);
    }

    #[cfg(feature = "pdf")]
    #[tokio::test]
    async fn test_scanned_pdf_is_ok_without_text() {
        let bytes = crate::pdf::tests::create_pdf(&[None]);
        let doc = DocumentExtractor::new()
            .extract(DocumentSource::Bytes(bytes), "scan.pdf")
            .await;
        assert!(doc.is_ok());
        assert!(!doc.has_text());
        assert_eq!(doc.metadata["has_text"], false);
    }
}
