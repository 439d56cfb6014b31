//! Staging-area inventory
//!
//! Lists what sits in the raw area plus what reached the processed area in
//! the last few minutes, each with a presigned download link. Entries from
//! both areas are merged by key and sorted newest first.

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, info, instrument};

use crate::error::StorageError;
use crate::storage::{ObjectInfo, ObjectStore};

/// Processed objects older than this are left out
pub const PROCESSED_WINDOW_MINUTES: i64 = 10;

/// Lifetime of presigned download links
pub const PRESIGN_TTL: Duration = Duration::from_secs(3600);

/// One object as seen in one area
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ObjectVersion {
    pub name: String,
    pub size: i64,
    pub timestamp: Option<DateTime<Utc>>,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InventoryEntry {
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw: Option<ObjectVersion>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processed: Option<ObjectVersion>,
}

impl InventoryEntry {
    fn new(key: &str) -> Self {
        Self {
            key: key.to_string(),
            raw: None,
            processed: None,
        }
    }

    /// Most recent modification across both areas
    pub fn newest(&self) -> Option<DateTime<Utc>> {
        let raw = self.raw.as_ref().and_then(|v| v.timestamp);
        let processed = self.processed.as_ref().and_then(|v| v.timestamp);
        raw.max(processed)
    }
}

async fn version(
    store: &dyn ObjectStore,
    bucket: &str,
    object: &ObjectInfo,
    ttl: Duration,
) -> Result<ObjectVersion, StorageError> {
    Ok(ObjectVersion {
        name: object.key.clone(),
        size: object.size,
        timestamp: object.last_modified,
        url: store.presign(bucket, &object.key, ttl).await?,
    })
}

/// Build the inventory of `raw` and recently `processed` objects
#[instrument(skip(store))]
pub async fn collect(
    store: &dyn ObjectStore,
    raw: &str,
    processed: &str,
    now: DateTime<Utc>,
    ttl: Duration,
) -> Result<Vec<InventoryEntry>, StorageError> {
    let mut entries: BTreeMap<String, InventoryEntry> = BTreeMap::new();

    let raw_objects = store.list_all(raw).await?;
    if raw_objects.is_empty() {
        info!(bucket = raw, "Raw area is empty");
    }
    for object in &raw_objects {
        let v = version(store, raw, object, ttl).await?;
        entries
            .entry(object.key.clone())
            .or_insert_with(|| InventoryEntry::new(&object.key))
            .raw = Some(v);
    }

    let cutoff = now - TimeDelta::minutes(PROCESSED_WINDOW_MINUTES);
    let mut recent = 0usize;
    for object in store.list_all(processed).await? {
        if !object.last_modified.is_some_and(|t| t >= cutoff) {
            continue;
        }
        recent += 1;
        let v = version(store, processed, &object, ttl).await?;
        entries
            .entry(object.key.clone())
            .or_insert_with(|| InventoryEntry::new(&object.key))
            .processed = Some(v);
    }
    debug!(raw = raw_objects.len(), recent, "Listed staging areas");

    let mut entries: Vec<InventoryEntry> = entries.into_values().collect();
    entries.sort_by(|a, b| b.newest().cmp(&a.newest()));
    Ok(entries)
}
