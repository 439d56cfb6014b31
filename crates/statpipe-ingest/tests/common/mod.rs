//! Common test utilities for statpipe-ingest integration tests
//!
//! - [`MemoryObjectStore`]: in-memory [`ObjectStore`] with an operation log
//!   and per-operation failure injection
//! - [`RecordingWriter`] / [`FailingWriter`]: [`PointWriter`] doubles
//! - [`tar_bundle`] / [`zip_bundle`]: in-memory bundle builders
//! - [`test_pipeline`]: a pipeline wired to the doubles and the shipped
//!   registry
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashSet};
use std::io::{Cursor, Write};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use statpipe_ingest::error::{SinkError, StorageError};
use statpipe_ingest::storage::ObjectInfo;
use statpipe_ingest::{
    FilenameClassifier, MetricRegistry, ObjectStore, Pipeline, PointWriter, Sink, SinkOptions,
    SinkPoint, StagingAreas,
};

pub const RAW: &str = "raw";
pub const PROCESSED: &str = "processed";
pub const UPLOADS: &str = "uploads";

pub const REGISTRY_PATH: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/../../config/metrics.json");

#[derive(Debug, Clone)]
struct StoredObject {
    data: Vec<u8>,
    last_modified: DateTime<Utc>,
}

/// Object store kept in memory, keyed by (bucket, key)
#[derive(Default)]
pub struct MemoryObjectStore {
    objects: Mutex<BTreeMap<(String, String), StoredObject>>,
    ops: Mutex<Vec<String>>,
    failing: Mutex<HashSet<&'static str>>,
}

impl MemoryObjectStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make every future call of `op` ("get", "put", "copy", "delete") fail
    pub fn fail(&self, op: &'static str) {
        self.failing.lock().unwrap().insert(op);
    }

    pub fn insert(&self, bucket: &str, key: &str, data: &[u8], last_modified: DateTime<Utc>) {
        self.objects.lock().unwrap().insert(
            (bucket.to_string(), key.to_string()),
            StoredObject {
                data: data.to_vec(),
                last_modified,
            },
        );
    }

    pub fn object(&self, bucket: &str, key: &str) -> Option<Vec<u8>> {
        self.objects
            .lock()
            .unwrap()
            .get(&(bucket.to_string(), key.to_string()))
            .map(|o| o.data.clone())
    }

    /// Keys currently stored in `bucket`
    pub fn keys(&self, bucket: &str) -> Vec<String> {
        self.objects
            .lock()
            .unwrap()
            .keys()
            .filter(|(b, _)| b == bucket)
            .map(|(_, k)| k.clone())
            .collect()
    }

    /// Logged operations, e.g. `copy raw/extracted/a.log -> processed/extracted/a.log`
    pub fn ops(&self) -> Vec<String> {
        self.ops.lock().unwrap().clone()
    }

    pub fn count_ops(&self, op: &str) -> usize {
        self.ops()
            .iter()
            .filter(|entry| entry.split(' ').next() == Some(op))
            .count()
    }

    fn check(&self, op: &'static str, bucket: &str, key: &str) -> Result<(), StorageError> {
        if self.failing.lock().unwrap().contains(op) {
            return Err(StorageError::new(op, bucket, key, "injected failure"));
        }
        Ok(())
    }

    fn log(&self, entry: String) {
        self.ops.lock().unwrap().push(entry);
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StorageError> {
        self.check("get", bucket, key)?;
        self.log(format!("get {}/{}", bucket, key));
        self.object(bucket, key)
            .ok_or_else(|| StorageError::new("get", bucket, key, "NoSuchKey"))
    }

    async fn put(
        &self,
        bucket: &str,
        key: &str,
        data: Vec<u8>,
        _content_type: Option<&str>,
    ) -> Result<(), StorageError> {
        self.check("put", bucket, key)?;
        self.log(format!("put {}/{}", bucket, key));
        self.insert(bucket, key, &data, Utc::now());
        Ok(())
    }

    async fn copy(
        &self,
        source_bucket: &str,
        source_key: &str,
        dest_bucket: &str,
        dest_key: &str,
    ) -> Result<(), StorageError> {
        self.check("copy", source_bucket, source_key)?;
        let data = self
            .object(source_bucket, source_key)
            .ok_or_else(|| StorageError::new("copy", source_bucket, source_key, "NoSuchKey"))?;
        self.log(format!(
            "copy {}/{} -> {}/{}",
            source_bucket, source_key, dest_bucket, dest_key
        ));
        self.insert(dest_bucket, dest_key, &data, Utc::now());
        Ok(())
    }

    async fn delete(&self, bucket: &str, key: &str) -> Result<(), StorageError> {
        self.check("delete", bucket, key)?;
        self.log(format!("delete {}/{}", bucket, key));
        self.objects
            .lock()
            .unwrap()
            .remove(&(bucket.to_string(), key.to_string()));
        Ok(())
    }

    async fn list_all(&self, bucket: &str) -> Result<Vec<ObjectInfo>, StorageError> {
        Ok(self
            .objects
            .lock()
            .unwrap()
            .iter()
            .filter(|((b, _), _)| b == bucket)
            .map(|((_, key), object)| ObjectInfo {
                key: key.clone(),
                size: object.data.len() as i64,
                last_modified: Some(object.last_modified),
            })
            .collect())
    }

    async fn presign(
        &self,
        bucket: &str,
        key: &str,
        ttl: Duration,
    ) -> Result<String, StorageError> {
        Ok(format!(
            "https://storage.test/{}/{}?expires={}",
            bucket,
            key,
            ttl.as_secs()
        ))
    }
}

/// Keeps every batch it is handed
#[derive(Default)]
pub struct RecordingWriter {
    batches: Mutex<Vec<Vec<SinkPoint>>>,
}

impl RecordingWriter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn batches(&self) -> Vec<Vec<SinkPoint>> {
        self.batches.lock().unwrap().clone()
    }

    pub fn points(&self) -> Vec<SinkPoint> {
        self.batches().into_iter().flatten().collect()
    }

    pub fn points_for(&self, measurement: &str) -> Vec<SinkPoint> {
        self.points()
            .into_iter()
            .filter(|p| p.measurement == measurement)
            .collect()
    }
}

#[async_trait]
impl PointWriter for RecordingWriter {
    async fn write_points(&self, points: &[SinkPoint]) -> Result<(), SinkError> {
        self.batches.lock().unwrap().push(points.to_vec());
        Ok(())
    }
}

/// Rejects every batch
pub struct FailingWriter;

#[async_trait]
impl PointWriter for FailingWriter {
    async fn write_points(&self, _points: &[SinkPoint]) -> Result<(), SinkError> {
        Err(SinkError::Rejected {
            status: 503,
            body: "unavailable".to_string(),
        })
    }
}

pub fn staging() -> StagingAreas {
    StagingAreas {
        raw: RAW.to_string(),
        processed: PROCESSED.to_string(),
    }
}

pub fn shipped_registry() -> MetricRegistry {
    MetricRegistry::load(REGISTRY_PATH).unwrap()
}

/// Pipeline over the given store and writer with the shipped registry
pub fn test_pipeline(store: Arc<MemoryObjectStore>, writer: Arc<dyn PointWriter>) -> Pipeline {
    Pipeline::new(
        store,
        Sink::new(writer, SinkOptions::default()),
        Arc::new(shipped_registry()),
        FilenameClassifier::new().unwrap(),
        staging(),
    )
}

/// Plain tar with one regular entry per file
pub fn tar_bundle(files: &[(&str, &str)]) -> Vec<u8> {
    let mut builder = tar::Builder::new(Vec::new());
    for (path, content) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(content.len() as u64);
        header.set_mode(0o644);
        builder
            .append_data(&mut header, path, content.as_bytes())
            .unwrap();
    }
    builder.into_inner().unwrap()
}

pub fn zip_bundle(files: &[(&str, &str)]) -> Vec<u8> {
    let mut buf = Vec::new();
    {
        let mut writer = zip::ZipWriter::new(Cursor::new(&mut buf));
        let options = zip::write::SimpleFileOptions::default();
        for (path, content) in files {
            writer.start_file(*path, options).unwrap();
            writer.write_all(content.as_bytes()).unwrap();
        }
        writer.finish().unwrap();
    }
    buf
}

/// A `buffer_k` export, 16k page size
pub const BUFFER_NAME: &str = "Acme/host1_srv1_2024-01-01_buffer_16k_1_for_graph.log";
pub const BUFFER_CSV: &str = "datetime,bufs,dirty,reads,writes,ratio\n\
                              2024-01-01 00:00:00,1000,5,10,20,99.5\n\
                              2024-01-01 00:05:00,1000,6,11,nan,99.1\n";

/// A `vpcache` export with separate date and time columns
pub const VPCACHE_NAME: &str = "Acme/host1_srv1_2024-01-01_vpcache_2.log";
pub const VPCACHE_CSV: &str = "date,time,name,size,alloc,free,hit_ratio\n\
                               2024-01-01,00:00:00,pool1,64,32,32,97.0\n";

/// A `vpcache` export missing most canonical columns
pub const SHORT_VPCACHE_CSV: &str = "date,time,hits\n2024-01-01,00:00:00,5\n";

/// Paired cpu export
pub const CPU_NAME: &str = "host1_srv1_2024-01-01_cpu_by_app.log";
pub const CPU_CSV: &str = "datetime,core-A core,core-A percentage,core-B core,core-B percentage\n\
                           2024-01-01 00:00:00,2,55.5,1,10.0\n";

/// Classifies, but no registry entry exists for `not_a_metric`
pub const UNKNOWN_NAME: &str = "host1_srv1_2024-01-01_not_a_metric.log";
