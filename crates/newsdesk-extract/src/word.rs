//! Word (`.docx`) extractor.
//!
//! Reads `word/document.xml` straight out of the OOXML package. Body
//! paragraphs come first in the normalized text, followed by a `Tables:`
//! section with one block per top-level table.

use newsdesk_core::{ExtractError, StructuredSection, TableSection};

use crate::FormatOutput;

/// Body paragraphs and top-level tables of a document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WordBody {
    /// Non-empty body paragraphs, in order
    pub paragraphs: Vec<String>,
    pub tables: Vec<WordTable>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct WordTable {
    /// Number of `w:gridCol` entries declared by the table
    pub grid_columns: usize,
    /// Cell text, row-major; a cell's paragraphs are joined by newlines
    pub rows: Vec<Vec<String>>,
}

impl WordTable {
    pub fn columns(&self) -> usize {
        if self.grid_columns > 0 {
            self.grid_columns
        } else {
            self.rows.iter().map(Vec::len).max().unwrap_or(0)
        }
    }
}

#[cfg(feature = "word")]
pub fn extract(bytes: &[u8]) -> Result<FormatOutput, ExtractError> {
    use std::io::{Cursor, Read};

    let mut archive =
        zip::ZipArchive::new(Cursor::new(bytes)).map_err(|e| ExtractError::Parse(e.to_string()))?;
    let mut xml = String::new();
    archive
        .by_name("word/document.xml")
        .map_err(|e| ExtractError::Parse(format!("word/document.xml: {e}")))?
        .read_to_string(&mut xml)?;

    let body = parse_document_xml(&xml)?;
    Ok(render_document(body))
}

#[cfg(not(feature = "word"))]
pub fn extract(_bytes: &[u8]) -> Result<FormatOutput, ExtractError> {
    Err(ExtractError::DependencyUnavailable)
}

/// Where text runs are currently being collected.
#[cfg(feature = "word")]
enum Sink {
    None,
    Body(String),
    Cell(String),
}

#[cfg(feature = "word")]
impl Sink {
    fn push(&mut self, s: &str) {
        match self {
            Sink::Body(buf) | Sink::Cell(buf) => buf.push_str(s),
            Sink::None => {}
        }
    }
}

/// Parse the main document part.
///
/// Only paragraphs directly in the body and tables at the top level are
/// collected. Text of nested tables and text boxes (`w:txbxContent`) is
/// skipped; the paragraph anchoring a text box keeps its own runs.
#[cfg(feature = "word")]
pub fn parse_document_xml(xml: &str) -> Result<WordBody, ExtractError> {
    use quick_xml::events::Event;
    use quick_xml::Reader;

    let mut reader = Reader::from_str(xml);
    let mut body = WordBody::default();

    let mut table_depth = 0usize;
    let mut table = WordTable::default();
    let mut row: Vec<String> = Vec::new();
    let mut cell: Option<Vec<String>> = None;
    let mut sink = Sink::None;
    let mut in_run = false;
    let mut in_text = false;
    let mut text_box_depth = 0usize;

    loop {
        let event = reader
            .read_event()
            .map_err(|e| ExtractError::Parse(format!("document.xml: {e}")))?;

        match &event {
            Event::Start(e) if e.local_name().as_ref() == b"txbxContent" => {
                text_box_depth += 1;
                continue;
            }
            Event::End(e) if e.local_name().as_ref() == b"txbxContent" => {
                text_box_depth = text_box_depth.saturating_sub(1);
                continue;
            }
            Event::Eof => break,
            _ if text_box_depth > 0 => continue,
            _ => {}
        }

        match event {
            Event::Start(e) => match e.local_name().as_ref() {
                b"p" if table_depth == 0 => sink = Sink::Body(String::new()),
                b"p" if table_depth == 1 && cell.is_some() => sink = Sink::Cell(String::new()),
                b"r" => in_run = true,
                b"t" => in_text = true,
                b"tbl" => {
                    table_depth += 1;
                    if table_depth == 1 {
                        table = WordTable::default();
                    }
                }
                b"tr" if table_depth == 1 => row = Vec::new(),
                b"tc" if table_depth == 1 => cell = Some(Vec::new()),
                b"gridCol" if table_depth == 1 => table.grid_columns += 1,
                _ => {}
            },
            Event::Empty(e) => match e.local_name().as_ref() {
                b"tab" if in_run => sink.push("\t"),
                b"br" | b"cr" if in_run => sink.push("\n"),
                b"gridCol" if table_depth == 1 => table.grid_columns += 1,
                b"p" if table_depth == 1 => {
                    if let Some(paragraphs) = cell.as_mut() {
                        paragraphs.push(String::new());
                    }
                }
                _ => {}
            },
            Event::Text(e) if in_text => {
                let text = e
                    .unescape()
                    .map_err(|e| ExtractError::Parse(format!("document.xml: {e}")))?;
                sink.push(&text);
            }
            Event::End(e) => match e.local_name().as_ref() {
                b"r" => in_run = false,
                b"t" => in_text = false,
                b"p" => match std::mem::replace(&mut sink, Sink::None) {
                    Sink::Body(text) if !text.trim().is_empty() => body.paragraphs.push(text),
                    Sink::Cell(text) => {
                        if let Some(paragraphs) = cell.as_mut() {
                            paragraphs.push(text);
                        }
                    }
                    _ => {}
                },
                b"tc" if table_depth == 1 => {
                    if let Some(paragraphs) = cell.take() {
                        row.push(paragraphs.join("\n"));
                    }
                }
                b"tr" if table_depth == 1 => table.rows.push(std::mem::take(&mut row)),
                b"tbl" => {
                    if table_depth == 1 {
                        body.tables.push(std::mem::take(&mut table));
                    }
                    table_depth = table_depth.saturating_sub(1);
                }
                _ => {}
            },
            _ => {}
        }
    }

    Ok(body)
}

/// Assemble the normalized text, sections and metadata of a document.
pub fn render_document(body: WordBody) -> FormatOutput {
    let mut text = body.paragraphs.join("\n\n");

    let tables: Vec<TableSection> = body
        .tables
        .into_iter()
        .enumerate()
        .map(|(index, table)| {
            let columns = table.columns();
            let text = table
                .rows
                .iter()
                .map(|cells| cells.join(" | "))
                .collect::<Vec<_>>()
                .join("\n");
            TableSection {
                index,
                rows: table.rows.len(),
                columns,
                cells: table.rows,
                text,
            }
        })
        .collect();

    if !tables.is_empty() {
        text.push_str("\n\nTables:\n");
        for table in &tables {
            text.push_str(&format!("\nTable {}:\n{}\n", table.index, table.text));
        }
    }

    let paragraph_count = body.paragraphs.len();
    let table_count = tables.len();

    let mut sections = vec![StructuredSection::Paragraphs {
        items: body.paragraphs,
    }];
    sections.extend(tables.into_iter().map(StructuredSection::Table));

    FormatOutput::new(text, sections)
        .with_metadata("paragraph_count", paragraph_count)
        .with_metadata("table_count", table_count)
}
