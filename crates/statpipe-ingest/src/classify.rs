//! Member filename classification
//!
//! Monitoring exports are named `{customerPath}_{server}_{dateToken}_{rest}`.
//! The date token comes in three shapes, tried in priority order:
//!
//! 1. a calendar date, `2024-01-01`
//! 2. a collection window ending in `-HH:MM-HH:MM`
//! 3. anything without an underscore
//!
//! `rest` carries the metric name plus optional decorations (`_for_graph`,
//! a trailing numeric id, a `_<N>k` page-size marker, a `.log` extension)
//! which [`FilenameClassifier::metric_key`] strips to get the registry key.

use regex::Regex;
use serde::Serialize;

use crate::error::ClassificationError;

/// Identity fields captured from a member filename
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParsedIdentity {
    /// Final path segment of the customer group
    pub customer: String,
    pub server: String,
    pub date_token: String,
    pub raw_suffix: String,
}

/// Canonical registry key plus the page-size tag pulled out of it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricKey {
    pub key: String,
    /// Digits of a `_<N>k` marker, 0 when absent
    pub size_variant: u64,
}

/// Result of classifying one member path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classified {
    pub identity: ParsedIdentity,
    pub metric: MetricKey,
}

/// Parses member paths into identities and metric keys
#[derive(Debug, Clone)]
pub struct FilenameClassifier {
    grammars: [Regex; 3],
    trailing_id: Regex,
    trailing_id_log: Regex,
    trailing_log: Regex,
    size_marker: Regex,
}

impl FilenameClassifier {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            grammars: [
                Regex::new(r"^(\S+?)_([^/\s]+?)_(\d{4}-\d{2}-\d{2})_(.*)$")?,
                Regex::new(r"^(\S+?)_([^/\s]+?)_(.*-\d{2}:\d{2}-\d{2}:\d{2})_(.*)$")?,
                Regex::new(r"^(\S+?)_([^/\s]+?)_([^_]+)_(.*)$")?,
            ],
            trailing_id: Regex::new(r"_\d+$")?,
            trailing_id_log: Regex::new(r"_\d+\.log$")?,
            trailing_log: Regex::new(r"\.log$")?,
            size_marker: Regex::new(r"_(\d+)k")?,
        })
    }

    /// Match `path` against the three grammars, first match wins
    pub fn classify(&self, path: &str) -> Result<ParsedIdentity, ClassificationError> {
        let caps = self
            .grammars
            .iter()
            .find_map(|grammar| grammar.captures(path))
            .ok_or_else(|| ClassificationError {
                path: path.to_string(),
            })?;

        let customer_raw = &caps[1];
        let customer = customer_raw.rsplit('/').next().unwrap_or(customer_raw);

        Ok(ParsedIdentity {
            customer: customer.to_string(),
            server: caps[2].to_string(),
            date_token: caps[3].to_string(),
            raw_suffix: caps[4].to_string(),
        })
    }

    /// Derive the registry key and size variant from a raw suffix
    ///
    /// The four strip rules run in order until the key stops changing, so
    /// deriving from an already-derived key is a no-op. The `_<N>k` marker is
    /// collapsed to `_k` afterwards.
    pub fn metric_key(&self, raw_suffix: &str) -> MetricKey {
        let mut key = raw_suffix.to_string();
        loop {
            let stripped = self.strip_once(&key);
            if stripped == key {
                break;
            }
            key = stripped;
        }

        let size_variant = self
            .size_marker
            .captures(&key)
            .and_then(|caps| caps[1].parse::<u64>().ok());

        match size_variant {
            Some(digits) => MetricKey {
                key: self.size_marker.replace_all(&key, "_k").into_owned(),
                size_variant: digits,
            },
            None => MetricKey {
                key,
                size_variant: 0,
            },
        }
    }

    fn strip_once(&self, key: &str) -> String {
        let key = key.replace("_for_graph", "");
        let key = self.trailing_id.replace(&key, "");
        let key = self.trailing_id_log.replace(&key, "");
        self.trailing_log.replace(&key, "").into_owned()
    }

    /// Classify a path and derive its metric key in one step
    pub fn classify_member(&self, path: &str) -> Result<Classified, ClassificationError> {
        let identity = self.classify(path)?;
        let metric = self.metric_key(&identity.raw_suffix);
        Ok(Classified { identity, metric })
    }
}
