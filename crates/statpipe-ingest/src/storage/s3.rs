use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::{
    config::{Credentials, Region},
    error::DisplayErrorContext,
    presigning::PresigningConfig,
    primitives::ByteStream,
    Client,
};
use chrono::{DateTime, Utc};
use std::time::Duration;
use tracing::{debug, info, instrument};

use super::{config::StorageConfig, ObjectInfo, ObjectStore};
use crate::error::StorageError;

/// [`ObjectStore`] backed by S3 or an S3-compatible service
#[derive(Clone)]
pub struct S3ObjectStore {
    client: Client,
}

fn to_chrono(dt: &aws_sdk_s3::primitives::DateTime) -> Option<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp(dt.secs(), dt.subsec_nanos())
}

impl S3ObjectStore {
    pub async fn new(config: &StorageConfig) -> Self {
        debug!("Initializing storage with config: {:?}", config);

        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()));
        if let Some(endpoint) = &config.endpoint {
            loader = loader.endpoint_url(endpoint);
        }
        if let Some((access_key, secret_key)) = config.static_credentials() {
            loader = loader.credentials_provider(Credentials::new(
                access_key,
                secret_key,
                None,
                None,
                "statpipe-storage",
            ));
        }
        let sdk_config = loader.load().await;

        let s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(config.path_style)
            .build();

        info!(
            endpoint = config.endpoint.as_deref().unwrap_or("aws"),
            region = %config.region,
            "Storage client initialized"
        );

        Self {
            client: Client::from_conf(s3_config),
        }
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    #[instrument(skip(self))]
    async fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StorageError> {
        debug!("Downloading from s3://{}/{}", bucket, key);

        let response = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| StorageError::new("get", bucket, key, DisplayErrorContext(&e)))?;

        let data = response
            .body
            .collect()
            .await
            .map_err(|e| StorageError::new("get", bucket, key, e))?
            .into_bytes()
            .to_vec();

        debug!("Downloaded {} bytes from s3://{}/{}", data.len(), bucket, key);
        Ok(data)
    }

    #[instrument(skip(self, data))]
    async fn put(
        &self,
        bucket: &str,
        key: &str,
        data: Vec<u8>,
        content_type: Option<&str>,
    ) -> Result<(), StorageError> {
        debug!("Uploading {} bytes to s3://{}/{}", data.len(), bucket, key);

        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .set_content_type(content_type.map(str::to_string))
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(|e| StorageError::new("put", bucket, key, DisplayErrorContext(&e)))?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn copy(
        &self,
        source_bucket: &str,
        source_key: &str,
        dest_bucket: &str,
        dest_key: &str,
    ) -> Result<(), StorageError> {
        let copy_source = format!("{}/{}", source_bucket, source_key);

        self.client
            .copy_object()
            .bucket(dest_bucket)
            .copy_source(&copy_source)
            .key(dest_key)
            .send()
            .await
            .map_err(|e| {
                StorageError::new("copy", source_bucket, source_key, DisplayErrorContext(&e))
            })?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete(&self, bucket: &str, key: &str) -> Result<(), StorageError> {
        self.client
            .delete_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| StorageError::new("delete", bucket, key, DisplayErrorContext(&e)))?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn list_all(&self, bucket: &str) -> Result<Vec<ObjectInfo>, StorageError> {
        let mut objects = Vec::new();
        let mut continuation_token: Option<String> = None;

        loop {
            let response = self
                .client
                .list_objects_v2()
                .bucket(bucket)
                .set_continuation_token(continuation_token.take())
                .send()
                .await
                .map_err(|e| StorageError::new("list", bucket, "", DisplayErrorContext(&e)))?;

            objects.extend(response.contents().iter().filter_map(|obj| {
                obj.key().map(|key| ObjectInfo {
                    key: key.to_string(),
                    size: obj.size().unwrap_or(0),
                    last_modified: obj.last_modified().and_then(to_chrono),
                })
            }));

            match response.next_continuation_token() {
                Some(token) => continuation_token = Some(token.to_string()),
                None => break,
            }
        }

        debug!("Listed {} objects in s3://{}", objects.len(), bucket);
        Ok(objects)
    }

    #[instrument(skip(self))]
    async fn presign(
        &self,
        bucket: &str,
        key: &str,
        ttl: Duration,
    ) -> Result<String, StorageError> {
        let presigning_config = PresigningConfig::expires_in(ttl)
            .map_err(|e| StorageError::new("presign", bucket, key, e))?;

        let presigned_request = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .presigned(presigning_config)
            .await
            .map_err(|e| StorageError::new("presign", bucket, key, DisplayErrorContext(&e)))?;

        Ok(presigned_request.uri().to_string())
    }
}
