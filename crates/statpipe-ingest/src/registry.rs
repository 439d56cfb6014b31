//! Metric registry
//!
//! Maps a canonical metric key to the measurement it feeds, its ordered
//! canonical header, and the parser that understands its raw layout. Loaded
//! once from a JSON artifact shaped like:
//!
//! ```json
//! {
//!   "buffer_k": {
//!     "SUB": "import_data",
//!     "VALUES": { "IMPORT": [["buffer", "datetime,reads,writes"]] }
//!   }
//! }
//! ```
//!
//! Only the first `IMPORT` entry is used. Every entry is validated at load
//! time so a bad artifact fails before any bundle is touched.

use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info};

use statpipe_common::{Result, StatpipeError};

use crate::error::UnresolvableMetricError;

/// Fixed column layouts for exports that carry no usable header row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FixedSchema {
    /// Partition activity summary, 22 columns, no header row
    Partitions,
    /// Logical/physical log buffer usage (`onstat -l`), 11 columns, first
    /// row is a header that gets replaced
    LogicalLog,
}

impl FixedSchema {
    pub fn columns(self) -> &'static [&'static str] {
        match self {
            FixedSchema::Partitions => &[
                "date", "time", "partnum", "npages", "nused", "npdata", "nrows", "flgs", "seqsc",
                "lkrqs", "lkwts", "ucnt", "touts", "isrd", "iswrt", "isrwt", "isdel", "dlks",
                "bfrd", "bfwrt", "nextns", "area",
            ],
            FixedSchema::LogicalLog => &[
                "date", "time", "epoch", "pbuffer", "pbufused", "pbufsize", "ppct_io", "lbuffer",
                "lbufused", "lbufsize", "physused",
            ],
        }
    }

    /// Whether the first line is a header to discard
    pub fn skips_first_row(self) -> bool {
        matches!(self, FixedSchema::LogicalLog)
    }
}

/// Closed set of parsing strategies a registry entry can select
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParserKind {
    /// Delimited text with a header row
    GenericCsv,
    /// Headerless rows with a hard-coded column list
    FixedColumns(FixedSchema),
    /// Timestamp followed by `(<name> core, <name> percentage)` pairs
    PairedColumns,
}

impl FromStr for ParserKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "import_data" | "generic_csv" => Ok(ParserKind::GenericCsv),
            "import_partitions" => Ok(ParserKind::FixedColumns(FixedSchema::Partitions)),
            "import_data_onstat_l" => Ok(ParserKind::FixedColumns(FixedSchema::LogicalLog)),
            "cpu_by_app" | "paired_columns" => Ok(ParserKind::PairedColumns),
            other => Err(format!("unknown parser kind '{}'", other)),
        }
    }
}

/// Immutable description of one metric type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubroutineSpec {
    pub measurement_name: String,
    pub canonical_header: Vec<String>,
    pub parser_kind: ParserKind,
}

#[derive(Debug, Deserialize)]
struct RawEntry {
    #[serde(rename = "SUB")]
    sub: String,
    #[serde(rename = "VALUES")]
    values: RawValues,
}

#[derive(Debug, Deserialize)]
struct RawValues {
    #[serde(rename = "IMPORT")]
    import: Vec<Vec<String>>,
}

impl RawEntry {
    fn into_spec(self, key: &str) -> Result<SubroutineSpec> {
        let parser_kind = self
            .sub
            .parse::<ParserKind>()
            .map_err(|reason| StatpipeError::invalid_registry(key, reason))?;

        let first = self
            .values
            .import
            .into_iter()
            .next()
            .ok_or_else(|| StatpipeError::invalid_registry(key, "IMPORT is empty"))?;

        let mut fields = first.into_iter();
        let (Some(measurement_name), Some(header)) = (fields.next(), fields.next()) else {
            return Err(StatpipeError::invalid_registry(
                key,
                "IMPORT entry needs a measurement name and a header",
            ));
        };

        let canonical_header: Vec<String> =
            header.split(',').map(|c| c.trim().to_string()).collect();
        if canonical_header.iter().any(|c| c.is_empty()) {
            return Err(StatpipeError::invalid_registry(
                key,
                format!("header '{}' has an empty column name", header),
            ));
        }

        Ok(SubroutineSpec {
            measurement_name,
            canonical_header,
            parser_kind,
        })
    }
}

/// Read-only lookup table from metric key to [`SubroutineSpec`]
#[derive(Debug, Clone, Default)]
pub struct MetricRegistry {
    entries: HashMap<String, SubroutineSpec>,
}

impl MetricRegistry {
    /// Load and validate the registry artifact at `path`
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!(path = %path.display(), "Loading metric registry");
        let content = std::fs::read_to_string(path).map_err(|e| {
            StatpipeError::Config(format!(
                "cannot read metric registry {}: {}",
                path.display(),
                e
            ))
        })?;
        let registry = Self::from_json_str(&content)?;
        info!(
            path = %path.display(),
            entries = registry.len(),
            "Metric registry loaded"
        );
        Ok(registry)
    }

    pub fn from_json_str(content: &str) -> Result<Self> {
        let raw: HashMap<String, RawEntry> = serde_json::from_str(content)?;
        let entries = raw
            .into_iter()
            .map(|(key, entry)| {
                let spec = entry.into_spec(&key)?;
                Ok((key, spec))
            })
            .collect::<Result<HashMap<_, _>>>()?;
        Ok(Self { entries })
    }

    pub fn lookup(&self, key: &str) -> std::result::Result<&SubroutineSpec, UnresolvableMetricError> {
        self.entries.get(key).ok_or_else(|| UnresolvableMetricError {
            key: key.to_string(),
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
