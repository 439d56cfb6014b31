//! InfluxDB v2 HTTP writer

use async_trait::async_trait;
use reqwest::{header::AUTHORIZATION, Client};
use serde::Deserialize;
use std::fmt;
use std::time::Duration;
use tracing::{debug, instrument};

use super::{line_protocol, PointWriter, SinkPoint};
use crate::error::SinkError;

/// Default request timeout in seconds.
/// Can be overridden via INFLUX_TIMEOUT_SECS.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Sink credentials as stored in the secret document
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct SinkCredentials {
    pub token: String,
    pub org: String,
    pub bucket: String,
}

impl fmt::Debug for SinkCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SinkCredentials")
            .field("token", &"***")
            .field("org", &self.org)
            .field("bucket", &self.bucket)
            .finish()
    }
}

/// Writes points as line protocol to `<url>/api/v2/write`
#[derive(Clone)]
pub struct InfluxWriter {
    client: Client,
    write_url: String,
    credentials: SinkCredentials,
}

impl InfluxWriter {
    pub fn new(
        url: &str,
        credentials: SinkCredentials,
        timeout: Duration,
    ) -> Result<Self, SinkError> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            write_url: format!("{}/api/v2/write", url.trim_end_matches('/')),
            credentials,
        })
    }
}

#[async_trait]
impl PointWriter for InfluxWriter {
    #[instrument(skip(self, points), fields(points = points.len()))]
    async fn write_points(&self, points: &[SinkPoint]) -> Result<(), SinkError> {
        let body = line_protocol::encode_batch(points);
        if body.is_empty() {
            return Ok(());
        }

        let response = self
            .client
            .post(&self.write_url)
            .query(&[
                ("org", self.credentials.org.as_str()),
                ("bucket", self.credentials.bucket.as_str()),
                ("precision", "s"),
            ])
            .header(AUTHORIZATION, format!("Token {}", self.credentials.token))
            .header("Content-Type", "text/plain; charset=utf-8")
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SinkError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        debug!(status = status.as_u16(), "Batch accepted");
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_credentials_debug_hides_token() {
        let credentials = SinkCredentials {
            token: "secret-token".to_string(),
            org: "ops".to_string(),
            bucket: "metrics".to_string(),
        };
        let rendered = format!("{:?}", credentials);
        assert!(!rendered.contains("secret-token"));
        assert!(rendered.contains("metrics"));
    }

    #[test]
    fn test_write_url_trims_slash() {
        let credentials = SinkCredentials {
            token: "t".to_string(),
            org: "o".to_string(),
            bucket: "b".to_string(),
        };
        let writer =
            InfluxWriter::new("http://influxdb:8086/", credentials, Duration::from_secs(1))
                .unwrap();
        assert_eq!(writer.write_url, "http://influxdb:8086/api/v2/write");
    }
}
