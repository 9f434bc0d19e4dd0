//! Arrow schema of the LanceDB `documents` table.

use std::sync::Arc;

use arrow_schema::{DataType, Field, Schema};

pub const DOCUMENTS_TABLE: &str = "documents";

/// Name of the fixed-size embedding column.
pub const VECTOR_COLUMN: &str = "vector";

/// Schema for the documents table.
///
/// Metadata is stored as flat string columns so filters translate to plain
/// SQL equality predicates.
#[must_use]
pub fn documents_schema(dimension: usize) -> Schema {
    Schema::new(vec![
        Field::new("id", DataType::Utf8, false),
        Field::new(
            VECTOR_COLUMN,
            DataType::FixedSizeList(
                Arc::new(Field::new("item", DataType::Float32, true)),
                dimension as i32,
            ),
            false,
        ),
        Field::new("preview", DataType::Utf8, false),
        Field::new("title", DataType::Utf8, false),
        Field::new("source", DataType::Utf8, false),
        Field::new("url", DataType::Utf8, false),
        Field::new("date", DataType::Utf8, false),
        Field::new("doc_type", DataType::Utf8, false),
        // RFC 3339
        Field::new("indexed_at", DataType::Utf8, true),
    ])
}
