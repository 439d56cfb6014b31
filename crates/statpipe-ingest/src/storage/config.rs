use serde::{Deserialize, Serialize};

/// Connection settings for the S3-compatible object store
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StorageConfig {
    pub endpoint: Option<String>,
    pub region: String,
    /// Static credentials; when absent the default AWS provider chain is used
    pub access_key: Option<String>,
    #[serde(skip_serializing)]
    pub secret_key: Option<String>,
    pub path_style: bool,
}

pub const DEFAULT_REGION: &str = "us-east-1";

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            region: DEFAULT_REGION.to_string(),
            access_key: None,
            secret_key: None,
            path_style: false,
        }
    }
}

impl StorageConfig {
    /// Build from a variable lookup, `S3_*` names first, then the AWS ones
    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            endpoint: var("S3_ENDPOINT").filter(|v| !v.is_empty()),
            region: var("S3_REGION").unwrap_or_else(|| DEFAULT_REGION.to_string()),
            access_key: var("S3_ACCESS_KEY").or_else(|| var("AWS_ACCESS_KEY_ID")),
            secret_key: var("S3_SECRET_KEY").or_else(|| var("AWS_SECRET_ACCESS_KEY")),
            path_style: var("S3_PATH_STYLE")
                .and_then(|v| v.parse().ok())
                .unwrap_or(false),
        }
    }

    /// Static credentials, if both halves are configured
    pub fn static_credentials(&self) -> Option<(&str, &str)> {
        match (&self.access_key, &self.secret_key) {
            (Some(access), Some(secret)) => Some((access.as_str(), secret.as_str())),
            _ => None,
        }
    }
}
