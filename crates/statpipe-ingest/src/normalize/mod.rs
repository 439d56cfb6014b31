//! Record normalization
//!
//! Turns the raw tabular bytes of one member into [`NormalizedRecord`]s that
//! follow the registry's canonical header. The parser kind picks how rows
//! are read; every kind then goes through the same cleaning steps (see
//! [`clean`]): sanitization, datetime derivation, column projection and tag
//! injection.

pub mod clean;
pub mod paired;
pub mod table;

use chrono::NaiveDateTime;
use serde::Serialize;
use std::borrow::Cow;
use tracing::debug;

use crate::classify::{MetricKey, ParsedIdentity};
use crate::error::NormalizeError;
use crate::registry::{ParserKind, SubroutineSpec};

pub use clean::SANITIZE_LIMIT;
pub use paired::CPU_BY_APP_MEASUREMENT;

/// A single scalar cell
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Int(i64),
    Float(f64),
    Text(String),
    Null,
}

impl Value {
    /// Type a raw CSV cell: blank is null, integers and floats are numbers,
    /// everything else (including the literal `nan`) stays text
    pub fn parse(raw: &str) -> Value {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Value::Null;
        }
        if trimmed.eq_ignore_ascii_case("nan") {
            return Value::Text(trimmed.to_string());
        }
        if let Ok(i) = trimmed.parse::<i64>() {
            return Value::Int(i);
        }
        if let Ok(f) = trimmed.parse::<f64>() {
            return Value::Float(f);
        }
        Value::Text(raw.to_string())
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Text rendering used when building timestamps and CSV artifacts
    pub fn as_text(&self) -> Option<Cow<'_, str>> {
        match self {
            Value::Int(i) => Some(Cow::Owned(i.to_string())),
            Value::Float(f) => Some(Cow::Owned(f.to_string())),
            Value::Text(s) => Some(Cow::Borrowed(s.as_str())),
            Value::Null => None,
        }
    }

    /// Widen integers to floats; other variants pass through
    pub fn into_float(self) -> Value {
        match self {
            Value::Int(i) => Value::Float(i as f64),
            other => other,
        }
    }
}

/// One canonical row plus the provenance tags injected by the pipeline
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedRecord {
    /// Always the first column
    pub datetime: NaiveDateTime,
    /// Remaining columns in canonical order
    pub values: Vec<(String, Value)>,
    pub customer: String,
    pub server: String,
    pub measurement: String,
    pub digits: u64,
}

impl NormalizedRecord {
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.values
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    /// Number of canonical columns, datetime included
    pub fn column_count(&self) -> usize {
        1 + self.values.len()
    }
}

/// Provenance injected into every record of one member
#[derive(Debug, Clone)]
pub struct RecordContext {
    pub customer: String,
    pub server: String,
    pub measurement: String,
    pub digits: u64,
}

impl RecordContext {
    pub fn new(identity: &ParsedIdentity, metric: &MetricKey) -> Self {
        Self {
            customer: identity.customer.clone(),
            server: identity.server.clone(),
            measurement: metric.key.clone(),
            digits: metric.size_variant,
        }
    }
}

/// Normalize raw member bytes according to `spec.parser_kind`
pub fn normalize(
    spec: &SubroutineSpec,
    raw: &[u8],
    identity: &ParsedIdentity,
    metric: &MetricKey,
) -> Result<Vec<NormalizedRecord>, NormalizeError> {
    let ctx = RecordContext::new(identity, metric);
    debug!(
        parser = ?spec.parser_kind,
        measurement = %ctx.measurement,
        bytes = raw.len(),
        "Normalizing member"
    );

    match spec.parser_kind {
        ParserKind::GenericCsv => {
            let table = table::read_headed(raw)?;
            clean::finish(table, &spec.canonical_header, &ctx)
        },
        ParserKind::FixedColumns(schema) => {
            let table = table::read_fixed(raw, schema);
            clean::finish(table, &spec.canonical_header, &ctx)
        },
        ParserKind::PairedColumns => {
            let table = paired::expand(table::read_headed(raw)?)?;
            let ctx = RecordContext {
                measurement: CPU_BY_APP_MEASUREMENT.to_string(),
                ..ctx
            };
            clean::finish(table, &spec.canonical_header, &ctx)
        },
    }
}
