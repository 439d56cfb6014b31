//! Error taxonomy for the ingestion pipeline
//!
//! Member-level errors ([`MemberError`]) are recovered per member file and
//! turned into a [`MemberOutcome`]; only [`PipelineError`] aborts a bundle.

use thiserror::Error;

use crate::normalize::NormalizedRecord;

/// No filename grammar matched the member path
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("No filename pattern matched '{path}'")]
pub struct ClassificationError {
    pub path: String,
}

/// The derived metric key has no registry entry
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("No registry entry for metric key '{key}'")]
pub struct UnresolvableMetricError {
    pub key: String,
}

/// Structural problems found while normalizing tabular content
#[derive(Error, Debug)]
pub enum NormalizeError {
    #[error("No 'datetime' column and no 'date' + 'time' pair to derive one from")]
    MissingDatetime,

    /// Fewer columns than the canonical header. `diagnostic` holds the rows
    /// with their original column names so the caller can log what arrived.
    #[error("Column count mismatch: header has {expected} columns, data has {actual}")]
    ColumnCountMismatch {
        expected: usize,
        actual: usize,
        diagnostic: Vec<NormalizedRecord>,
    },

    #[error("Row {row} has {found} fields, header has {expected}")]
    RaggedRow {
        row: usize,
        expected: usize,
        found: usize,
    },

    #[error("Column '{column}' has no matching percentage column")]
    UnpairedColumn { column: String },

    #[error("Input has no header row")]
    EmptyHeader,

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// Batch write to the time-series endpoint failed
#[derive(Error, Debug)]
pub enum SinkError {
    #[error("Sink request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Sink rejected write with status {status}: {body}")]
    Rejected { status: u16, body: String },
}

/// Object-storage operation failed
#[derive(Error, Debug)]
#[error("Storage {op} failed for s3://{bucket}/{key}: {message}")]
pub struct StorageError {
    pub op: &'static str,
    pub bucket: String,
    pub key: String,
    pub message: String,
}

impl StorageError {
    pub fn new(
        op: &'static str,
        bucket: impl Into<String>,
        key: impl Into<String>,
        message: impl ToString,
    ) -> Self {
        Self {
            op,
            bucket: bucket.into(),
            key: key.into(),
            message: message.to_string(),
        }
    }
}

/// The archive container could not be opened or read
#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("Failed to read archive '{name}': {source}")]
    Io {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read zip archive '{name}': {source}")]
    Zip {
        name: String,
        #[source]
        source: zip::result::ZipError,
    },
}

/// Bundle-fatal errors, propagated to the caller
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Archive(#[from] ArchiveError),

    #[error("Failed to fetch bundle: {0}")]
    Fetch(#[from] StorageError),

    #[error("Failed to read bundle file: {0}")]
    Io(#[from] std::io::Error),
}

/// A member-level failure, tagged by the stage that produced it
#[derive(Error, Debug)]
pub enum MemberError {
    #[error(transparent)]
    Classification(#[from] ClassificationError),

    #[error(transparent)]
    Unresolvable(#[from] UnresolvableMetricError),

    #[error(transparent)]
    Structural(#[from] NormalizeError),

    #[error(transparent)]
    Sink(#[from] SinkError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Terminal state of one member file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberOutcome {
    Succeeded,
    ClassificationFailed,
    UnresolvableMetric,
    StructuralFailed,
    SinkFailed,
    MoveFailed,
}

impl MemberError {
    pub fn outcome(&self) -> MemberOutcome {
        match self {
            MemberError::Classification(_) => MemberOutcome::ClassificationFailed,
            MemberError::Unresolvable(_) => MemberOutcome::UnresolvableMetric,
            MemberError::Structural(_) => MemberOutcome::StructuralFailed,
            MemberError::Sink(_) => MemberOutcome::SinkFailed,
            MemberError::Storage(_) => MemberOutcome::MoveFailed,
        }
    }

    /// Pipeline stage name used in log fields
    pub fn stage(&self) -> &'static str {
        match self {
            MemberError::Classification(_) => "classify",
            MemberError::Unresolvable(_) => "lookup",
            MemberError::Structural(_) => "normalize",
            MemberError::Sink(_) => "sink",
            MemberError::Storage(_) => "move",
        }
    }
}
