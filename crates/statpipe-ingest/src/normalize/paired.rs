//! Expansion of wide "cores + percentage" tables into one row per pair

use super::table::Table;
use super::Value;
use crate::error::NormalizeError;

/// Measurement every paired-column member is written under
pub const CPU_BY_APP_MEASUREMENT: &str = "cpu_by_app";

const PAIR_COLUMNS: [&str; 4] = ["datetime", "metric", "cores", "percentage"];

fn round2(value: Value) -> Value {
    match value.as_f64() {
        Some(f) => Value::Float((f * 100.0).round() / 100.0),
        None => value,
    }
}

fn pair_name(column: &str) -> String {
    let column = column.trim();
    column.strip_suffix(" core").unwrap_or(column).trim().to_string()
}

/// Expand `[ts, <a> core, <a> percentage, <b> core, ...]` into rows of
/// `datetime, metric, cores, percentage`
///
/// The first column is taken as the timestamp whatever its name.
pub fn expand(table: Table) -> Result<Table, NormalizeError> {
    let Table { columns, rows } = table;

    if columns.len() % 2 == 0 {
        let column = columns.last().cloned().unwrap_or_default();
        return Err(NormalizeError::UnpairedColumn { column });
    }

    let names: Vec<String> = columns[1..].chunks(2).map(|pair| pair_name(&pair[0])).collect();

    let mut out = Table::new(PAIR_COLUMNS.iter().map(|c| c.to_string()).collect());
    for row in rows {
        let mut cells = row.into_iter();
        let Some(timestamp) = cells.next() else {
            continue;
        };
        for name in &names {
            let cores = cells.next().unwrap_or(Value::Null);
            let percentage = cells.next().unwrap_or(Value::Null);
            out.rows.push(vec![
                timestamp.clone(),
                Value::Text(name.clone()),
                round2(cores),
                round2(percentage),
            ]);
        }
    }

    Ok(out)
}
