//! Bundle processing
//!
//! One bundle is processed end to end, one member at a time, in archive
//! order. Each member runs through
//!
//! ```text
//! stage extracted/<path> -> classify -> lookup -> normalize
//!     -> stage to_ingest/<file>.csv -> sink -> move both objects to processed
//! ```
//!
//! and stops at the first failing stage. A member failure is logged and
//! counted in the [`BundleReport`]; only a bundle that cannot be fetched or
//! opened is an error for the caller. Objects are relocated to the processed
//! area only after every earlier stage succeeded.

use chrono::NaiveDateTime;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error, field, info, instrument, warn, Span};
use uuid::Uuid;

use crate::archive::{ArchiveBundle, MemberFile};
use crate::classify::FilenameClassifier;
use crate::config::{Config, StagingAreas};
use crate::error::{MemberError, MemberOutcome, NormalizeError, PipelineError, StorageError};
use crate::normalize::{self, NormalizedRecord};
use crate::registry::MetricRegistry;
use crate::sink::{InfluxWriter, Sink};
use crate::storage::{ObjectStore, S3ObjectStore, StorageMover};

/// Prefix for raw members staged in the raw area
pub const EXTRACTED_PREFIX: &str = "extracted";
/// Prefix for normalized CSVs awaiting ingestion
pub const TO_INGEST_PREFIX: &str = "to_ingest";

const CSV_CONTENT_TYPE: &str = "text/csv";
const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const PROVENANCE_COLUMNS: [&str; 4] = ["customer", "server", "measurement", "digits"];

/// Per-bundle outcome counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BundleReport {
    pub bundle: String,
    pub succeeded: usize,
    pub classification_failed: usize,
    pub unresolved: usize,
    pub structural_failed: usize,
    pub sink_failed: usize,
    pub move_failed: usize,
    /// Directory and hidden entries never processed
    pub skipped: usize,
    /// Points accepted by the sink, summary points included
    pub points_written: usize,
}

impl BundleReport {
    pub fn new(bundle: impl Into<String>) -> Self {
        Self {
            bundle: bundle.into(),
            ..Self::default()
        }
    }

    pub fn record(&mut self, outcome: MemberOutcome) {
        let counter = match outcome {
            MemberOutcome::Succeeded => &mut self.succeeded,
            MemberOutcome::ClassificationFailed => &mut self.classification_failed,
            MemberOutcome::UnresolvableMetric => &mut self.unresolved,
            MemberOutcome::StructuralFailed => &mut self.structural_failed,
            MemberOutcome::SinkFailed => &mut self.sink_failed,
            MemberOutcome::MoveFailed => &mut self.move_failed,
        };
        *counter += 1;
    }

    /// Members that reached a failure state
    pub fn failed(&self) -> usize {
        self.classification_failed
            + self.unresolved
            + self.structural_failed
            + self.sink_failed
            + self.move_failed
    }

    /// Members processed, successfully or not
    pub fn total(&self) -> usize {
        self.succeeded + self.failed()
    }
}

/// Staging key for a normalized CSV; also the file id handed to the sink
pub fn to_ingest_key(customer: &str, server: &str, metric_key: &str, digits: u64) -> String {
    format!(
        "{}/{}_{}_{}_{}_{}.csv",
        TO_INGEST_PREFIX,
        customer,
        server,
        metric_key,
        Uuid::new_v4(),
        digits
    )
}

fn format_datetime(datetime: &NaiveDateTime) -> String {
    datetime.format(DATETIME_FORMAT).to_string()
}

/// Render records as CSV: datetime, canonical columns, then provenance
pub fn render_csv(header: &[String], records: &[NormalizedRecord]) -> Result<Vec<u8>, csv::Error> {
    let mut writer = csv::Writer::from_writer(Vec::new());

    let columns = header
        .iter()
        .map(String::as_str)
        .chain(PROVENANCE_COLUMNS);
    writer.write_record(columns)?;

    for record in records {
        let mut row: Vec<String> = Vec::with_capacity(header.len() + PROVENANCE_COLUMNS.len());
        row.push(format_datetime(&record.datetime));
        row.extend(
            record
                .values
                .iter()
                .map(|(_, value)| value.as_text().map(|t| t.into_owned()).unwrap_or_default()),
        );
        row.push(record.customer.clone());
        row.push(record.server.clone());
        row.push(record.measurement.clone());
        row.push(record.digits.to_string());
        writer.write_record(&row)?;
    }

    writer
        .into_inner()
        .map_err(|e| csv::Error::from(e.into_error()))
}

/// Everything needed to process bundles, built once per process
pub struct Pipeline {
    store: Arc<dyn ObjectStore>,
    mover: StorageMover,
    sink: Sink,
    registry: Arc<MetricRegistry>,
    classifier: FilenameClassifier,
    staging: StagingAreas,
}

impl Pipeline {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        sink: Sink,
        registry: Arc<MetricRegistry>,
        classifier: FilenameClassifier,
        staging: StagingAreas,
    ) -> Self {
        Self {
            mover: StorageMover::new(Arc::clone(&store)),
            store,
            sink,
            registry,
            classifier,
            staging,
        }
    }

    /// Wire the production collaborators from configuration
    pub async fn from_config(config: &Config) -> anyhow::Result<Self> {
        let registry = MetricRegistry::load(&config.registry_path)?;
        let store: Arc<dyn ObjectStore> = Arc::new(S3ObjectStore::new(&config.storage).await);
        let writer = InfluxWriter::new(
            &config.sink.url,
            config.sink.credentials.clone(),
            config.sink.timeout(),
        )?;
        let sink = Sink::new(Arc::new(writer), config.sink.options());

        Ok(Self::new(
            store,
            sink,
            Arc::new(registry),
            FilenameClassifier::new()?,
            config.staging.clone(),
        ))
    }

    pub fn staging(&self) -> &StagingAreas {
        &self.staging
    }

    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    /// Process every member of `bundle`; member failures are counted, never
    /// returned
    #[instrument(skip(self, bundle), fields(bundle = %bundle.name(), members = bundle.members().len()))]
    pub async fn process(&self, bundle: &ArchiveBundle) -> BundleReport {
        let mut report = BundleReport::new(bundle.name());
        report.skipped = bundle.skipped();

        for member in bundle.members() {
            match self.process_member(member).await {
                Ok(points) => {
                    report.points_written += points;
                    report.record(MemberOutcome::Succeeded);
                },
                Err(e) => report.record(e.outcome()),
            }
        }

        info!(
            succeeded = report.succeeded,
            failed = report.failed(),
            skipped = report.skipped,
            points = report.points_written,
            "Bundle processed"
        );
        report
    }

    #[instrument(
        skip(self, member),
        fields(
            member = %member.path,
            customer = field::Empty,
            server = field::Empty,
            metric = field::Empty
        )
    )]
    async fn process_member(&self, member: &MemberFile) -> Result<usize, MemberError> {
        let result = self.run_stages(member).await;
        if let Err(e) = &result {
            match e.outcome() {
                MemberOutcome::ClassificationFailed | MemberOutcome::UnresolvableMetric => {
                    warn!(stage = e.stage(), error = %e, "Skipping member")
                },
                _ => error!(stage = e.stage(), error = %e, "Member failed"),
            }
        }
        result
    }

    async fn run_stages(&self, member: &MemberFile) -> Result<usize, MemberError> {
        let raw = self.staging.raw.as_str();
        let processed = self.staging.processed.as_str();

        let extracted_key = format!("{}/{}", EXTRACTED_PREFIX, member.path);
        self.store
            .put(raw, &extracted_key, member.bytes.clone(), None)
            .await?;

        let classified = self.classifier.classify_member(&member.path)?;
        let identity = &classified.identity;
        let metric = &classified.metric;
        let span = Span::current();
        span.record("customer", identity.customer.as_str());
        span.record("server", identity.server.as_str());
        span.record("metric", metric.key.as_str());

        let spec = self.registry.lookup(&metric.key)?;
        debug!(
            parser = ?spec.parser_kind,
            measurement = %spec.measurement_name,
            "Resolved metric"
        );

        let records = match normalize::normalize(spec, &member.bytes, identity, metric) {
            Ok(records) => records,
            Err(NormalizeError::ColumnCountMismatch {
                expected,
                actual,
                diagnostic,
            }) => {
                let columns: Vec<&str> = diagnostic
                    .first()
                    .map(|r| r.values.iter().map(|(name, _)| name.as_str()).collect())
                    .unwrap_or_default();
                warn!(
                    expected,
                    actual,
                    rows = diagnostic.len(),
                    columns = ?columns,
                    "Data has fewer columns than the canonical header"
                );
                return Err(NormalizeError::ColumnCountMismatch {
                    expected,
                    actual,
                    diagnostic,
                }
                .into());
            },
            Err(e) => return Err(e.into()),
        };

        let staged_key =
            to_ingest_key(&identity.customer, &identity.server, &metric.key, metric.size_variant);
        let csv = render_csv(&spec.canonical_header, &records)
            .map_err(|e| StorageError::new("put", raw, &staged_key, e))?;
        self.store
            .put(raw, &staged_key, csv, Some(CSV_CONTENT_TYPE))
            .await?;

        let points = self
            .sink
            .write(&records, &staged_key, &identity.customer, &identity.server)
            .await?;

        self.mover
            .move_object(raw, processed, &staged_key, None)
            .await?;
        self.mover
            .move_object(raw, processed, &extracted_key, None)
            .await?;

        info!(records = records.len(), points, "Member ingested");
        Ok(points)
    }

    /// Fetch a bundle from object storage and process it
    ///
    /// The source object is deleted afterwards unless `keep_source` is set.
    #[instrument(skip(self))]
    pub async fn process_object(
        &self,
        bucket: &str,
        key: &str,
        keep_source: bool,
    ) -> Result<BundleReport, PipelineError> {
        let bytes = self.store.get(bucket, key).await?;
        let bundle = ArchiveBundle::open(key, &bytes).map_err(|e| {
            error!(error = %e, "Failed to open bundle");
            e
        })?;

        let report = self.process(&bundle).await;

        if !keep_source {
            if let Err(e) = self.store.delete(bucket, key).await {
                warn!(error = %e, "Processed bundle but could not delete the source object");
            }
        }

        Ok(report)
    }

    /// Open a local bundle file and process it
    #[instrument(skip(self, path), fields(path = %path.display()))]
    pub async fn process_file(&self, path: &Path) -> Result<BundleReport, PipelineError> {
        let bytes = tokio::fs::read(path).await?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let bundle = ArchiveBundle::open(name, &bytes).map_err(|e| {
            error!(error = %e, "Failed to open bundle");
            e
        })?;

        Ok(self.process(&bundle).await)
    }
}
