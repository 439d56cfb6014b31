//! Configuration management
//!
//! Everything comes from the environment (a `.env` file is loaded first if
//! present). Sink credentials come either from `INFLUX_TOKEN`, `INFLUX_ORG`
//! and `INFLUX_BUCKET`, or from the JSON secret document named by
//! `INFLUX_SECRET_FILE`.

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::sink::influx::{SinkCredentials, DEFAULT_TIMEOUT_SECS};
use crate::sink::{SinkOptions, DEFAULT_BATCH_SIZE};
use crate::storage::StorageConfig;

// ============================================================================
// Configuration Constants
// ============================================================================

/// Default location of the metric registry document.
pub const DEFAULT_REGISTRY_PATH: &str = "config/metrics.json";

/// Default time-series endpoint.
pub const DEFAULT_INFLUX_URL: &str = "http://influxdb:8086";

/// Default flush interval for buffered points in milliseconds.
pub const DEFAULT_FLUSH_INTERVAL_MS: u64 = 100;

/// Ingestion configuration
#[derive(Debug, Clone, Serialize)]
pub struct Config {
    pub storage: StorageConfig,
    pub staging: StagingAreas,
    pub registry_path: PathBuf,
    pub sink: SinkConfig,
}

/// The two buckets a member moves between
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagingAreas {
    /// Where members are extracted and normalized CSVs staged
    pub raw: String,
    /// Where consumed objects end up
    pub processed: String,
}

/// Time-series sink configuration
#[derive(Debug, Clone, Serialize)]
pub struct SinkConfig {
    pub url: String,
    #[serde(skip)]
    pub credentials: SinkCredentials,
    pub batch_size: usize,
    pub flush_interval_ms: u64,
    pub timeout_secs: u64,
}

impl SinkConfig {
    pub fn options(&self) -> SinkOptions {
        SinkOptions {
            batch_size: self.batch_size,
            flush_interval: Duration::from_millis(self.flush_interval_ms),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn parse_or<T: std::str::FromStr>(value: Option<String>, default: T) -> T {
    value.and_then(|s| s.parse().ok()).unwrap_or(default)
}

fn required(var: &impl Fn(&str) -> Option<String>, name: &str) -> anyhow::Result<String> {
    match var(name) {
        Some(value) if !value.trim().is_empty() => Ok(value),
        _ => bail!("{} must be set", name),
    }
}

/// Read `{"token", "org", "bucket"}` from a secret document
pub fn read_secret_file(path: &Path) -> anyhow::Result<SinkCredentials> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read sink secret file {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| {
        format!(
            "Sink secret file {} must contain 'token', 'org' and 'bucket'",
            path.display()
        )
    })
}

impl Config {
    /// Load configuration from environment and defaults
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_vars(|name| std::env::var(name).ok())
    }

    /// Build and validate configuration from a variable lookup
    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let credentials = match var("INFLUX_SECRET_FILE") {
            Some(path) => read_secret_file(Path::new(&path))?,
            None => SinkCredentials {
                token: required(&var, "INFLUX_TOKEN")?,
                org: required(&var, "INFLUX_ORG")?,
                bucket: required(&var, "INFLUX_BUCKET")?,
            },
        };

        let config = Config {
            storage: StorageConfig::from_vars(&var),
            staging: StagingAreas {
                raw: required(&var, "STATPIPE_RAW_BUCKET")?,
                processed: required(&var, "STATPIPE_PROCESSED_BUCKET")?,
            },
            registry_path: var("STATPIPE_REGISTRY_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_REGISTRY_PATH)),
            sink: SinkConfig {
                url: var("INFLUX_URL").unwrap_or_else(|| DEFAULT_INFLUX_URL.to_string()),
                credentials,
                batch_size: parse_or(var("INFLUX_BATCH_SIZE"), DEFAULT_BATCH_SIZE),
                flush_interval_ms: parse_or(
                    var("INFLUX_FLUSH_INTERVAL_MS"),
                    DEFAULT_FLUSH_INTERVAL_MS,
                ),
                timeout_secs: parse_or(var("INFLUX_TIMEOUT_SECS"), DEFAULT_TIMEOUT_SECS),
            },
        };

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.staging.raw.trim().is_empty() || self.staging.processed.trim().is_empty() {
            bail!("Raw and processed bucket names cannot be empty");
        }

        if self.staging.raw == self.staging.processed {
            bail!(
                "Raw and processed buckets must differ (both are '{}')",
                self.staging.raw
            );
        }

        if self.sink.batch_size == 0 {
            bail!("INFLUX_BATCH_SIZE must be greater than 0");
        }

        let credentials = &self.sink.credentials;
        if credentials.token.is_empty() || credentials.org.is_empty() || credentials.bucket.is_empty() {
            bail!("Sink token, org and bucket cannot be empty");
        }

        if self.sink.url.is_empty() {
            bail!("INFLUX_URL cannot be empty");
        }

        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name: &str| map.get(name).cloned()
    }

    const BASE: &[(&str, &str)] = &[
        ("STATPIPE_RAW_BUCKET", "raw"),
        ("STATPIPE_PROCESSED_BUCKET", "processed"),
        ("INFLUX_TOKEN", "token"),
        ("INFLUX_ORG", "ops"),
        ("INFLUX_BUCKET", "metrics"),
    ];

    #[test]
    fn test_defaults() {
        let config = Config::from_vars(vars(BASE)).unwrap();
        assert_eq!(config.registry_path, PathBuf::from(DEFAULT_REGISTRY_PATH));
        assert_eq!(config.sink.url, DEFAULT_INFLUX_URL);
        assert_eq!(config.sink.batch_size, 1000);
        assert_eq!(config.sink.options().flush_interval, Duration::from_millis(100));
        assert_eq!(config.sink.timeout(), Duration::from_secs(30));
        assert_eq!(config.staging.raw, "raw");
    }

    #[test]
    fn test_missing_bucket_fails() {
        let err = Config::from_vars(vars(&BASE[1..])).unwrap_err();
        assert!(err.to_string().contains("STATPIPE_RAW_BUCKET"));
    }

    #[test]
    fn test_same_buckets_rejected() {
        let mut pairs = BASE.to_vec();
        pairs[1] = ("STATPIPE_PROCESSED_BUCKET", "raw");
        assert!(Config::from_vars(vars(&pairs)).is_err());
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let mut pairs = BASE.to_vec();
        pairs.push(("INFLUX_BATCH_SIZE", "0"));
        assert!(Config::from_vars(vars(&pairs)).is_err());
    }

    #[test]
    fn test_secret_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"token": "t", "org": "o", "bucket": "b"}}"#).unwrap();
        let path = file.path().to_string_lossy().to_string();

        let config = Config::from_vars(vars(&[
            ("STATPIPE_RAW_BUCKET", "raw"),
            ("STATPIPE_PROCESSED_BUCKET", "processed"),
            ("INFLUX_SECRET_FILE", path.as_str()),
        ]))
        .unwrap();
        assert_eq!(config.sink.credentials.bucket, "b");
    }

    #[test]
    fn test_secret_file_missing_key() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"token": "t", "org": "o"}}"#).unwrap();
        let path = file.path().to_string_lossy().to_string();

        assert!(read_secret_file(Path::new(&path)).is_err());
    }
}
