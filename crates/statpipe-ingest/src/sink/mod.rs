//! Time-series sink
//!
//! Each [`NormalizedRecord`] becomes one [`SinkPoint`]. Tags are the record's
//! provenance (`customer`, `server`, `pagesize` from the size variant) plus a
//! `metric` tag taken from the first of the `area`, `name` or `metric`
//! columns that holds text. Every other column is a field. Points are stamped
//! at second precision.
//!
//! Before a member's records, [`Sink::write`] emits one `customer_server`
//! summary point naming the staged file, so every ingested file can be traced
//! from the dashboards.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, instrument, warn};

use crate::error::SinkError;
use crate::normalize::{NormalizedRecord, Value};

pub mod influx;
pub mod line_protocol;

pub use influx::InfluxWriter;

/// Measurement of the per-file audit point
pub const SUMMARY_MEASUREMENT: &str = "customer_server";

/// Columns that may name the `metric` tag, highest priority first
const METRIC_TAG_COLUMNS: [&str; 3] = ["area", "name", "metric"];

pub const DEFAULT_BATCH_SIZE: usize = 1000;
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Float(f64),
    Int(i64),
    Text(String),
}

impl FieldValue {
    /// Convert a cell; nulls and non-finite floats have no field value
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Float(f) if f.is_finite() => Some(FieldValue::Float(*f)),
            Value::Float(_) | Value::Null => None,
            Value::Int(i) => Some(FieldValue::Int(*i)),
            Value::Text(s) => Some(FieldValue::Text(s.clone())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SinkPoint {
    pub measurement: String,
    pub tags: BTreeMap<String, String>,
    pub fields: BTreeMap<String, FieldValue>,
    /// Unix seconds
    pub timestamp: i64,
}

impl SinkPoint {
    pub fn from_record(record: &NormalizedRecord) -> Self {
        let mut tags = BTreeMap::new();
        tags.insert("customer".to_string(), record.customer.clone());
        tags.insert("server".to_string(), record.server.clone());
        tags.insert("pagesize".to_string(), record.digits.to_string());

        let metric_column = METRIC_TAG_COLUMNS.iter().copied().find_map(|column| {
            match record.get(column) {
                Some(Value::Text(text)) if !text.trim().is_empty() => {
                    Some((column, text.trim().to_string()))
                },
                _ => None,
            }
        });
        let tag_column = metric_column.as_ref().map(|(column, _)| *column);
        if let Some((_, metric)) = metric_column {
            tags.insert("metric".to_string(), metric);
        }

        let fields = record
            .values
            .iter()
            .filter(|(name, _)| tag_column != Some(name.as_str()))
            .filter_map(|(name, value)| {
                FieldValue::from_value(value).map(|field| (name.clone(), field))
            })
            .collect();

        Self {
            measurement: record.measurement.clone(),
            tags,
            fields,
            timestamp: record.datetime.and_utc().timestamp(),
        }
    }

    /// Audit point for one staged file, `None` if any identifier is blank
    pub fn summary(
        source_file_id: &str,
        customer: &str,
        server: &str,
        now: DateTime<Utc>,
    ) -> Option<Self> {
        if source_file_id.is_empty() || customer.is_empty() || server.is_empty() {
            return None;
        }

        let stamp = now.to_rfc3339_opts(SecondsFormat::Secs, true);
        let fields = BTreeMap::from([
            ("customer".to_string(), FieldValue::Text(customer.to_string())),
            ("server".to_string(), FieldValue::Text(server.to_string())),
            ("filename".to_string(), FieldValue::Text(source_file_id.to_string())),
            ("timestamp".to_string(), FieldValue::Text(stamp)),
        ]);

        Some(Self {
            measurement: SUMMARY_MEASUREMENT.to_string(),
            tags: BTreeMap::new(),
            fields,
            timestamp: now.timestamp(),
        })
    }
}

/// Destination for encoded batches
#[async_trait]
pub trait PointWriter: Send + Sync {
    async fn write_points(&self, points: &[SinkPoint]) -> Result<(), SinkError>;
}

/// Batching knobs; they change request sizes, never what gets written
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SinkOptions {
    pub batch_size: usize,
    pub flush_interval: Duration,
}

impl Default for SinkOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            flush_interval: DEFAULT_FLUSH_INTERVAL,
        }
    }
}

/// Accumulates points and hands back a batch once it is due
#[derive(Debug)]
pub struct PointBuffer {
    points: Vec<SinkPoint>,
    options: SinkOptions,
    first_buffered: Option<Instant>,
}

impl PointBuffer {
    pub fn new(options: SinkOptions) -> Self {
        Self {
            points: Vec::with_capacity(options.batch_size.min(DEFAULT_BATCH_SIZE)),
            options,
            first_buffered: None,
        }
    }

    /// Buffer `point`; returns a batch when `batch_size` points are held or
    /// the flush interval has passed since the oldest one arrived
    pub fn push(&mut self, point: SinkPoint) -> Option<Vec<SinkPoint>> {
        if self.points.is_empty() {
            self.first_buffered = Some(Instant::now());
        }
        self.points.push(point);

        let full = self.points.len() >= self.options.batch_size;
        let stale = self
            .first_buffered
            .is_some_and(|t| t.elapsed() >= self.options.flush_interval);
        (full || stale).then(|| self.take())
    }

    /// Drain everything buffered so far
    pub fn take(&mut self) -> Vec<SinkPoint> {
        self.first_buffered = None;
        std::mem::take(&mut self.points)
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Builds points from records and writes them through a [`PointWriter`]
#[derive(Clone)]
pub struct Sink {
    writer: Arc<dyn PointWriter>,
    options: SinkOptions,
}

impl Sink {
    pub fn new(writer: Arc<dyn PointWriter>, options: SinkOptions) -> Self {
        Self { writer, options }
    }

    async fn flush(&self, batch: Vec<SinkPoint>) -> Result<usize, SinkError> {
        debug!(points = batch.len(), "Flushing point batch");
        match self.writer.write_points(&batch).await {
            Ok(()) => Ok(batch.len()),
            Err(e) => {
                error!(error = %e, points = batch.len(), "Point batch write failed");
                Err(e)
            },
        }
    }

    /// Write the summary point for `source_file_id`, then one point per
    /// record; returns the number of points written
    ///
    /// Batches flushed before a failure stay written.
    #[instrument(skip(self, records), fields(records = records.len()))]
    pub async fn write(
        &self,
        records: &[NormalizedRecord],
        source_file_id: &str,
        customer: &str,
        server: &str,
    ) -> Result<usize, SinkError> {
        let mut buffer = PointBuffer::new(self.options);
        let mut written = 0;

        match SinkPoint::summary(source_file_id, customer, server, Utc::now()) {
            Some(summary) => {
                if let Some(batch) = buffer.push(summary) {
                    written += self.flush(batch).await?;
                }
            },
            None => warn!(customer, server, "Skipping summary point with blank identifiers"),
        }

        for record in records {
            let point = SinkPoint::from_record(record);
            if point.fields.is_empty() {
                warn!(
                    measurement = %point.measurement,
                    timestamp = point.timestamp,
                    "Dropping point with no fields"
                );
                continue;
            }
            if let Some(batch) = buffer.push(point) {
                written += self.flush(batch).await?;
            }
        }

        if !buffer.is_empty() {
            written += self.flush(buffer.take()).await?;
        }

        info!(written, source_file_id, "Points written");
        Ok(written)
    }
}
