//! Raw tabular input
//!
//! A [`Table`] is the untyped-header, typed-cell view of a member file before
//! cleaning. Headed input must be rectangular (short rows are padded, long
//! rows are an error); headerless fixed-schema input skips malformed lines.

use csv::{ReaderBuilder, StringRecord};
use tracing::warn;

use super::Value;
use crate::error::NormalizeError;
use crate::registry::FixedSchema;

/// Column names plus rows of typed cells, all rows as wide as `columns`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl Table {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Remove a column, returning its cells
    pub fn take_column(&mut self, index: usize) -> Vec<Value> {
        self.columns.remove(index);
        self.rows.iter_mut().map(|row| row.remove(index)).collect()
    }
}

fn is_blank(record: &StringRecord) -> bool {
    record.iter().all(|field| field.trim().is_empty())
}

fn typed_row(record: &StringRecord, width: usize) -> Vec<Value> {
    let mut row: Vec<Value> = record.iter().map(Value::parse).collect();
    row.resize(width, Value::Null);
    row
}

/// Read delimited text whose first row is the header
///
/// Column names are trimmed. Rows shorter than the header are padded with
/// nulls; longer rows fail with [`NormalizeError::RaggedRow`].
pub fn read_headed(raw: &[u8]) -> Result<Table, NormalizeError> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(raw);

    let columns: Vec<String> = reader
        .headers()?
        .iter()
        .map(|c| c.trim().to_string())
        .collect();
    if columns.iter().all(|c| c.is_empty()) {
        return Err(NormalizeError::EmptyHeader);
    }

    let mut table = Table::new(columns);
    let width = table.columns.len();

    for (index, result) in reader.records().enumerate() {
        let record = result?;
        if is_blank(&record) {
            continue;
        }
        if record.len() > width {
            return Err(NormalizeError::RaggedRow {
                row: index + 1,
                expected: width,
                found: record.len(),
            });
        }
        table.rows.push(typed_row(&record, width));
    }

    Ok(table)
}

/// Read headerless rows against a hard-coded schema
///
/// Lines that fail to decode or carry more fields than the schema are
/// logged and skipped.
pub fn read_fixed(raw: &[u8], schema: FixedSchema) -> Table {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(raw);

    let columns: Vec<String> = schema.columns().iter().map(|c| c.to_string()).collect();
    let mut table = Table::new(columns);
    let width = table.columns.len();
    let skip = usize::from(schema.skips_first_row());
    let mut skipped = 0usize;

    for (index, result) in reader.records().enumerate().skip(skip) {
        let record = match result {
            Ok(record) => record,
            Err(e) => {
                warn!(line = index + 1, error = %e, "Skipping unreadable line");
                skipped += 1;
                continue;
            },
        };
        if is_blank(&record) {
            continue;
        }
        if record.len() > width {
            warn!(
                line = index + 1,
                expected = width,
                found = record.len(),
                "Skipping malformed line"
            );
            skipped += 1;
            continue;
        }
        table.rows.push(typed_row(&record, width));
    }

    if skipped > 0 {
        warn!(skipped, schema = ?schema, "Skipped malformed lines");
    }

    table
}
