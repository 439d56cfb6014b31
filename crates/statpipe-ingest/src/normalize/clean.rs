//! Cleaning steps shared by every parser kind
//!
//! Order matters and matches what downstream dashboards expect:
//!
//! 1. sanitize sentinel values to `-1`
//! 2. derive the `datetime` column (directly, or from `date` + `time`)
//! 3. move `datetime` first
//! 4. project onto the canonical header (truncate, rename, or mismatch)
//! 5. inject provenance and widen numbers to floats

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use tracing::warn;

use super::table::Table;
use super::{NormalizedRecord, RecordContext, Value};
use crate::error::NormalizeError;

/// Values strictly above this are collector overflow sentinels
pub const SANITIZE_LIMIT: i128 = 9_023_372_036_854_775_800;

/// Columns that are never sanitized
const PROTECTED_COLUMNS: [&str; 3] = ["datetime", "customer", "server"];

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S%.f",
    "%m/%d/%Y %H:%M:%S%.f",
    "%Y%m%d %H:%M:%S",
    "%Y%m%d %H%M%S",
];

fn needs_sanitizing(value: &Value) -> bool {
    match value {
        Value::Int(i) => i128::from(*i) > SANITIZE_LIMIT,
        // `as` saturates, so infinities land above the limit and NaN at 0
        Value::Float(f) => (*f as i128) > SANITIZE_LIMIT,
        Value::Text(s) => s.trim().eq_ignore_ascii_case("nan"),
        Value::Null => false,
    }
}

/// Replace overflow sentinels and `nan` strings with `-1`
pub fn sanitize(table: &mut Table) {
    let protected: Vec<bool> = table
        .columns
        .iter()
        .map(|c| PROTECTED_COLUMNS.contains(&c.as_str()))
        .collect();

    for row in &mut table.rows {
        for (cell, &skip) in row.iter_mut().zip(&protected) {
            if !skip && needs_sanitizing(cell) {
                *cell = Value::Int(-1);
            }
        }
    }
}

/// Parse a timestamp in any of the layouts the collectors emit
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.naive_utc());
    }
    DATETIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

fn parse_cell(value: &Value) -> Option<NaiveDateTime> {
    value.as_text().and_then(|text| parse_timestamp(&text))
}

/// Split the datetime column out of `table`
///
/// Returns one parsed timestamp per row (None where unparseable) and the
/// table without the datetime source columns.
pub fn derive_datetime(
    mut table: Table,
) -> Result<(Vec<Option<NaiveDateTime>>, Table), NormalizeError> {
    if let Some(index) = table.column_index("datetime") {
        let cells = table.take_column(index);
        return Ok((cells.iter().map(parse_cell).collect(), table));
    }

    let (Some(date_index), Some(time_index)) =
        (table.column_index("date"), table.column_index("time"))
    else {
        return Err(NormalizeError::MissingDatetime);
    };

    // Remove the rightmost column first so the other index stays valid
    let (dates, times) = if date_index > time_index {
        let dates = table.take_column(date_index);
        (dates, table.take_column(time_index))
    } else {
        let times = table.take_column(time_index);
        (table.take_column(date_index), times)
    };

    let timestamps = dates
        .iter()
        .zip(&times)
        .map(|(date, time)| match (date.as_text(), time.as_text()) {
            (Some(date), Some(time)) => parse_timestamp(&format!("{} {}", date, time)),
            _ => None,
        })
        .collect();

    Ok((timestamps, table))
}

fn build_records(
    columns: &[String],
    rows: Vec<(NaiveDateTime, Vec<Value>)>,
    ctx: &RecordContext,
) -> Vec<NormalizedRecord> {
    rows.into_iter()
        .map(|(datetime, row)| NormalizedRecord {
            datetime,
            values: columns
                .iter()
                .cloned()
                .zip(row.into_iter().map(Value::into_float))
                .collect(),
            customer: ctx.customer.clone(),
            server: ctx.server.clone(),
            measurement: ctx.measurement.clone(),
            digits: ctx.digits,
        })
        .collect()
}

/// Run the shared cleaning steps and produce canonical records
///
/// `header` includes the datetime column as its first entry. When the data
/// has fewer columns than `header` the records are still built, under their
/// original names, and returned inside
/// [`NormalizeError::ColumnCountMismatch`].
pub fn finish(
    mut table: Table,
    header: &[String],
    ctx: &RecordContext,
) -> Result<Vec<NormalizedRecord>, NormalizeError> {
    sanitize(&mut table);

    let (timestamps, rest) = derive_datetime(table)?;
    let Table { mut columns, rows } = rest;

    let mut dropped = 0usize;
    let mut rows: Vec<(NaiveDateTime, Vec<Value>)> = timestamps
        .into_iter()
        .zip(rows)
        .filter_map(|(ts, row)| match ts {
            Some(ts) => Some((ts, row)),
            None => {
                dropped += 1;
                None
            },
        })
        .collect();
    if dropped > 0 {
        warn!(
            dropped,
            measurement = %ctx.measurement,
            "Dropped rows with unparseable datetime"
        );
    }

    let expected = header.len();
    if expected < 1 + columns.len() {
        let keep = expected.saturating_sub(1);
        columns.truncate(keep);
        for (_, row) in &mut rows {
            row.truncate(keep);
        }
    }

    let actual = 1 + columns.len();
    if expected == actual {
        let renamed = header[1..].to_vec();
        Ok(build_records(&renamed, rows, ctx))
    } else {
        Err(NormalizeError::ColumnCountMismatch {
            expected,
            actual,
            diagnostic: build_records(&columns, rows, ctx),
        })
    }
}
