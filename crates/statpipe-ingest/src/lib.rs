//! Statpipe Ingest Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Ingests archive bundles of database monitoring exports into a time-series
//! store.
//!
//! # Pipeline
//!
//! - **Archive**: open tar, tar.gz or zip bundles ([`archive`])
//! - **Classification**: member filename to customer, server and metric key
//!   ([`classify`])
//! - **Registry**: metric key to canonical header and parser ([`registry`])
//! - **Normalization**: raw rows to canonical records ([`normalize`])
//! - **Sink**: records to time-series points ([`sink`])
//! - **Storage**: staging and relocation in object storage ([`storage`])
//!
//! # Example
//!
//! ```no_run
//! use statpipe_ingest::{Config, Pipeline};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load()?;
//!     let pipeline = Pipeline::from_config(&config).await?;
//!     let report = pipeline.process_object("uploads", "bundle.tar", false).await?;
//!     println!("{} members ingested", report.succeeded);
//!     Ok(())
//! }
//! ```

pub mod archive;
pub mod classify;
pub mod config;
pub mod error;
pub mod inventory;
pub mod normalize;
pub mod pipeline;
pub mod registry;
pub mod sink;
pub mod storage;

pub use archive::{ArchiveBundle, MemberFile};
pub use classify::{FilenameClassifier, MetricKey, ParsedIdentity};
pub use config::{Config, StagingAreas};
pub use error::{MemberError, MemberOutcome, PipelineError};
pub use normalize::{NormalizedRecord, Value};
pub use pipeline::{BundleReport, Pipeline};
pub use registry::{MetricRegistry, ParserKind, SubroutineSpec};
pub use sink::{PointWriter, Sink, SinkOptions, SinkPoint};
pub use storage::{ObjectStore, StorageMover};
