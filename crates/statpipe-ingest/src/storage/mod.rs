//! Object-storage access
//!
//! [`ObjectStore`] is the seam between the pipeline and the bucket backend.
//! [`S3ObjectStore`] talks to S3 or any S3-compatible service; tests plug in
//! an in-memory implementation. [`StorageMover`] relocates objects between
//! staging areas on top of the trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

use crate::error::StorageError;

pub mod config;
pub mod s3;

pub use config::StorageConfig;
pub use s3::S3ObjectStore;

/// Listing entry for one stored object
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ObjectInfo {
    pub key: String,
    pub size: i64,
    pub last_modified: Option<DateTime<Utc>>,
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StorageError>;

    async fn put(
        &self,
        bucket: &str,
        key: &str,
        data: Vec<u8>,
        content_type: Option<&str>,
    ) -> Result<(), StorageError>;

    async fn copy(
        &self,
        source_bucket: &str,
        source_key: &str,
        dest_bucket: &str,
        dest_key: &str,
    ) -> Result<(), StorageError>;

    async fn delete(&self, bucket: &str, key: &str) -> Result<(), StorageError>;

    /// Every object in `bucket`, following continuation tokens
    async fn list_all(&self, bucket: &str) -> Result<Vec<ObjectInfo>, StorageError>;

    /// Time-limited GET URL for one object
    async fn presign(&self, bucket: &str, key: &str, ttl: Duration)
        -> Result<String, StorageError>;
}

/// Moves objects between areas with copy then delete
///
/// There is no rollback: if the delete fails after a successful copy the
/// object is left in both areas and the error is returned.
#[derive(Clone)]
pub struct StorageMover {
    store: Arc<dyn ObjectStore>,
}

impl StorageMover {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    /// Move `key` from `source` to `destination`, optionally renaming it
    #[instrument(skip(self))]
    pub async fn move_object(
        &self,
        source: &str,
        destination: &str,
        key: &str,
        dest_key: Option<&str>,
    ) -> Result<(), StorageError> {
        let dest_key = dest_key.unwrap_or(key);

        self.store.copy(source, key, destination, dest_key).await?;
        if let Err(e) = self.store.delete(source, key).await {
            warn!(
                source,
                destination,
                key,
                error = %e,
                "Copied object but could not delete the source; it now exists in both areas"
            );
            return Err(e);
        }

        debug!(
            "Moved s3://{}/{} to s3://{}/{}",
            source, key, destination, dest_key
        );
        Ok(())
    }
}
