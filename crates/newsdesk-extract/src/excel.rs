//! Excel workbook extractor.
//!
//! Every sheet becomes a [`SheetSection`] holding all of its rows. The
//! normalized text only previews the first [`PREVIEW_ROWS`] rows of each
//! sheet, rendered as `column: value` pairs.

use std::collections::HashMap;

use newsdesk_core::{ExtractError, SheetRow, SheetSection, StructuredSection};

use crate::FormatOutput;

/// Rows per sheet rendered into the normalized text.
pub const PREVIEW_ROWS: usize = 10;

/// Rendering of date and datetime cells.
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Extract all sheets from workbook bytes (`.xlsx`, `.xlsm`, `.xls`).
#[cfg(feature = "excel")]
pub fn extract(bytes: &[u8]) -> Result<FormatOutput, ExtractError> {
    use calamine::{open_workbook_auto_from_rs, Reader};
    use std::io::Cursor;
    use tracing::debug;

    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes.to_vec()))
        .map_err(|e| ExtractError::Parse(e.to_string()))?;

    let mut sheets = Vec::new();
    for name in workbook.sheet_names() {
        let range = workbook
            .worksheet_range(&name)
            .map_err(|e| ExtractError::Parse(format!("sheet '{name}': {e}")))?;
        let grid: Vec<Vec<String>> = range
            .rows()
            .map(|row| row.iter().map(cell_text).collect())
            .collect();
        debug!("Sheet '{}': {} raw rows", name, grid.len());
        sheets.push(sheet_from_grid(&name, grid));
    }

    Ok(render_workbook(sheets))
}

/// Render one cell. Date cells use `YYYY-MM-DD HH:MM:SS` instead of the
/// raw serial number.
#[cfg(feature = "excel")]
fn cell_text(cell: &calamine::Data) -> String {
    use calamine::{Data, DataType};

    match cell {
        Data::DateTime(_) | Data::DateTimeIso(_) => cell
            .as_datetime()
            .map(|dt| dt.format(DATETIME_FORMAT).to_string())
            .unwrap_or_else(|| cell.to_string()),
        _ => cell.to_string(),
    }
}

#[cfg(not(feature = "excel"))]
pub fn extract(_bytes: &[u8]) -> Result<FormatOutput, ExtractError> {
    Err(ExtractError::DependencyUnavailable)
}

/// Build a sheet from a raw cell grid whose first row is the header.
pub fn sheet_from_grid(name: &str, grid: Vec<Vec<String>>) -> SheetSection {
    let mut grid = grid.into_iter();
    let columns = header_columns(grid.next().unwrap_or_default());

    let rows: Vec<SheetRow> = grid
        .map(|cells| {
            columns
                .iter()
                .enumerate()
                .map(|(i, column)| (column.clone(), cells.get(i).cloned().unwrap_or_default()))
                .collect()
        })
        .collect();

    SheetSection {
        name: name.to_string(),
        columns,
        row_count: rows.len(),
        rows,
    }
}

/// Name blank header cells `Unnamed: <i>` and suffix duplicates with `.1`, `.2`, ...
fn header_columns(header: Vec<String>) -> Vec<String> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    header
        .into_iter()
        .enumerate()
        .map(|(i, cell)| {
            let base = if cell.trim().is_empty() {
                format!("Unnamed: {i}")
            } else {
                cell
            };
            let count = seen.entry(base.clone()).or_insert(0);
            let name = if *count == 0 {
                base
            } else {
                format!("{base}.{count}")
            };
            *count += 1;
            name
        })
        .collect()
}

/// Header block plus row preview for one sheet.
pub fn render_sheet(sheet: &SheetSection) -> String {
    let mut text = format!(
        "Sheet: {}\nColumns: {}\nRows: {}\n\n",
        sheet.name,
        sheet.columns.join(", "),
        sheet.row_count
    );

    for row in sheet.rows.iter().take(PREVIEW_ROWS) {
        let line = sheet
            .columns
            .iter()
            .map(|column| {
                let value = row.get(column).map_or("", String::as_str);
                format!("{column}: {value}")
            })
            .collect::<Vec<_>>()
            .join(" | ");
        text.push_str(&line);
        text.push('\n');
    }

    if sheet.row_count > PREVIEW_ROWS {
        text.push_str(&format!(
            "... and {} more rows\n",
            sheet.row_count - PREVIEW_ROWS
        ));
    }

    text
}

/// Assemble the normalized text, sections and metadata of a workbook.
pub fn render_workbook(sheets: Vec<SheetSection>) -> FormatOutput {
    let text = sheets
        .iter()
        .map(render_sheet)
        .collect::<Vec<_>>()
        .join("\n\n");
    let sheet_names: Vec<String> = sheets.iter().map(|s| s.name.clone()).collect();
    let total_sheets = sheets.len();

    FormatOutput::new(text, sheets.into_iter().map(StructuredSection::Sheet).collect())
        .with_metadata("sheet_names", sheet_names)
        .with_metadata("total_sheets", total_sheets)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid(rows: usize) -> Vec<Vec<String>> {
        let mut grid = vec![vec!["region".to_string(), "revenue".to_string()]];
        for i in 1..=rows {
            grid.push(vec![format!("R{i}"), format!("{}", i * 100)]);
        }
        grid
    }

    #[test]
    fn test_fifteen_rows_keep_all_records_but_preview_ten() {
        let sheet = sheet_from_grid("Sales", grid(15));
        assert_eq!(sheet.row_count, 15);
        assert_eq!(sheet.rows.len(), 15);
        assert_eq!(sheet.rows[14]["region"], "R15");

        let output = render_workbook(vec![sheet]);
        let text = &output.text;
        assert!(text.starts_with("Sheet: Sales\nColumns: region, revenue\nRows: 15\n\n"));
        assert!(text.contains("region: R10 | revenue: 1000\n"));
        assert!(!text.contains("R11"));
        assert!(text.ends_with("... and 5 more rows\n"));

        match &output.sections[0] {
            StructuredSection::Sheet(sheet) => assert_eq!(sheet.rows.len(), 15),
            other => panic!("expected sheet section, got {other:?}"),
        }
    }

    #[test]
    fn test_no_truncation_notice_at_ten_rows() {
        let text = render_sheet(&sheet_from_grid("S", grid(10)));
        assert!(!text.contains("more rows"));
        assert_eq!(text.lines().filter(|l| l.starts_with("region: ")).count(), 10);
    }

    #[test]
    fn test_multiple_sheets_joined_with_blank_line() {
        let output = render_workbook(vec![
            sheet_from_grid("A", grid(1)),
            sheet_from_grid("B", grid(2)),
        ]);
        assert!(output.text.contains("revenue: 100\n\n\nSheet: B\n"));
        assert_eq!(output.metadata["total_sheets"], 2);
        assert_eq!(output.metadata["sheet_names"], serde_json::json!(["A", "B"]));
    }

    #[test]
    fn test_header_naming() {
        let sheet = sheet_from_grid(
            "S",
            vec![
                vec!["id".to_string(), String::new(), "id".to_string()],
                vec!["1".to_string()],
            ],
        );
        assert_eq!(sheet.columns, vec!["id", "Unnamed: 1", "id.1"]);
        assert_eq!(sheet.rows[0]["id.1"], "");
    }

    #[test]
    fn test_empty_sheet() {
        let sheet = sheet_from_grid("Empty", Vec::new());
        assert_eq!(sheet.row_count, 0);
        assert_eq!(render_sheet(&sheet), "Sheet: Empty\nColumns: \nRows: 0\n\n");
    }

    #[cfg(feature = "excel")]
    mod workbook {
        use super::super::*;
        use std::io::Write;
        use zip::write::SimpleFileOptions;

        fn inline(cell: &str, text: &str) -> String {
            format!(r#"<c r="{cell}" t="inlineStr"><is><t>{text}</t></is></c>"#)
        }

        const STYLES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<styleSheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><cellXfs count="2"><xf numFmtId="0"/><xf numFmtId="14" applyNumberFormat="1"/></cellXfs></styleSheet>"#;

        fn create_xlsx() -> Vec<u8> {
            let sheet = format!(
                r#"<row r="1">{}{}</row><row r="2">{}<c r="B2"><v>12.5</v></c></row>"#,
                inline("A1", "ticker"),
                inline("B1", "price"),
                inline("A2", "ACME"),
            );
            package(&sheet)
        }

        /// Wrap `sheetData` rows in a minimal single-sheet workbook whose
        /// cell style 1 is the built-in short date format.
        fn package(rows: &str) -> Vec<u8> {
            let sheet = format!(
                r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData>{rows}</sheetData></worksheet>"#
            );
            let files = [
                (
                    "[Content_Types].xml",
                    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/><Override PartName="/xl/worksheets/sheet1.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/><Override PartName="/xl/styles.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.styles+xml"/></Types>"#
                        .to_string(),
                ),
                (
                    "_rels/.rels",
                    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/></Relationships>"#
                        .to_string(),
                ),
                (
                    "xl/workbook.xml",
                    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><sheets><sheet name="Prices" sheetId="1" r:id="rId1"/></sheets></workbook>"#
                        .to_string(),
                ),
                (
                    "xl/_rels/workbook.xml.rels",
                    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/><Relationship Id="rId2" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles" Target="styles.xml"/></Relationships>"#
                        .to_string(),
                ),
                ("xl/styles.xml", STYLES.to_string()),
                ("xl/worksheets/sheet1.xml", sheet),
            ];

            let mut zip = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
            for (name, body) in files {
                zip.start_file(name, SimpleFileOptions::default()).unwrap();
                zip.write_all(body.as_bytes()).unwrap();
            }
            zip.finish().unwrap().into_inner()
        }

        #[test]
        fn test_date_cells_render_as_datetime() {
            let rows = format!(
                r#"<row r="1">{}{}</row><row r="2">{}<c r="B2" s="1"><v>45292</v></c></row>"#,
                inline("A1", "headline"),
                inline("B1", "published"),
                inline("A2", "Rates held"),
            );
            let output = extract(&package(&rows)).unwrap();

            assert!(output
                .text
                .contains("headline: Rates held | published: 2024-01-01 00:00:00\n"));
            assert!(!output.text.contains("45292"));
            match &output.sections[0] {
                StructuredSection::Sheet(sheet) => {
                    assert_eq!(sheet.rows[0]["published"], "2024-01-01 00:00:00");
                }
                other => panic!("expected sheet section, got {other:?}"),
            }
        }

        #[test]
        fn test_extract_xlsx() {
            let output = extract(&create_xlsx()).unwrap();
            assert!(output.text.starts_with("Sheet: Prices\nColumns: ticker, price\nRows: 1\n\n"));
            assert!(output.text.contains("ticker: ACME | price: 12.5"));
            assert_eq!(output.metadata["total_sheets"], 1);
        }

        #[test]
        fn test_garbage_is_parse_error() {
            let result = extract(b"definitely not a spreadsheet");
            assert!(matches!(result, Err(ExtractError::Parse(_))));
        }
    }
}
