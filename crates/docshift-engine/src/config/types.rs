use std::time::Duration;

use serde::{Deserialize, Serialize};

use docshift_cluster::ClusterSettings;
use docshift_types::Mappings;

use crate::retry::RetryPolicy;

/// Top-level migration configuration, usually parsed from YAML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationConfig {
    /// Index family (alias name) being migrated.
    pub family: String,
    /// Target mappings, including their schema version.
    pub mappings: Mappings,
    /// Cluster connection. Optional so tests can inject a client directly.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster: Option<ClusterSettings>,
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,
    /// Fraction of scanned documents that may be skipped before the run
    /// halts instead of shedding more data.
    #[serde(default = "default_max_skip_fraction")]
    pub max_skip_fraction: f64,
    /// Scanned-document count below which the skip ceiling is not
    /// checked, so one bad document early in a scan cannot halt it.
    #[serde(default = "default_min_skip_sample")]
    pub min_skip_sample: u64,
    #[serde(default)]
    pub retry: RetrySettings,
    #[serde(default = "default_health_timeout_secs")]
    pub health_timeout_secs: u64,
    /// Controller lease duration. A crashed controller's run becomes
    /// reclaimable after this long.
    #[serde(default = "default_lease_ttl_secs")]
    pub lease_ttl_secs: u64,
}

fn default_batch_size() -> u32 {
    1000
}
fn default_max_skip_fraction() -> f64 {
    0.10
}
fn default_min_skip_sample() -> u64 {
    10
}
fn default_health_timeout_secs() -> u64 {
    30
}
fn default_lease_ttl_secs() -> u64 {
    60
}

impl MigrationConfig {
    /// Minimal configuration with all defaults, for tests and embedding.
    #[must_use]
    pub fn new(family: impl Into<String>, mappings: Mappings) -> Self {
        Self {
            family: family.into(),
            mappings,
            cluster: None,
            batch_size: default_batch_size(),
            max_skip_fraction: default_max_skip_fraction(),
            min_skip_sample: default_min_skip_sample(),
            retry: RetrySettings::default(),
            health_timeout_secs: default_health_timeout_secs(),
            lease_ttl_secs: default_lease_ttl_secs(),
        }
    }

    #[must_use]
    pub fn health_timeout(&self) -> Duration {
        Duration::from_secs(self.health_timeout_secs)
    }

    #[must_use]
    pub fn lease_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(i64::try_from(self.lease_ttl_secs).unwrap_or(i64::MAX))
    }
}

/// Retry and backoff settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySettings {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

fn default_max_attempts() -> u32 {
    8
}
fn default_base_delay_ms() -> u64 {
    250
}
fn default_max_delay_ms() -> u64 {
    30_000
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl RetrySettings {
    #[must_use]
    pub fn to_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn defaults_apply_when_fields_are_omitted() {
        let yaml = r#"
family: documents
mappings:
  version: 3
  properties:
    title: { type: text }
"#;
        let config: MigrationConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.family, "documents");
        assert_eq!(config.mappings.version, 3);
        assert_eq!(config.batch_size, 1000);
        assert!((config.max_skip_fraction - 0.10).abs() < f64::EPSILON);
        assert_eq!(config.min_skip_sample, 10);
        assert_eq!(config.retry.max_attempts, 8);
        assert_eq!(config.lease_ttl_secs, 60);
        assert!(config.cluster.is_none());
    }

    #[test]
    fn retry_settings_convert_to_a_policy() {
        let settings = RetrySettings {
            max_attempts: 3,
            base_delay_ms: 100,
            max_delay_ms: 400,
        };
        let policy = settings.to_policy();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.base_delay, Duration::from_millis(100));
        assert_eq!(policy.max_delay, Duration::from_millis(400));
    }

    #[test]
    fn new_uses_the_same_defaults_as_serde() {
        let config = MigrationConfig::new("docs", Mappings::empty(2));
        assert_eq!(config.batch_size, 1000);
        assert_eq!(config.health_timeout(), Duration::from_secs(30));
        assert_eq!(config.lease_ttl(), chrono::Duration::seconds(60));
        assert_eq!(config.mappings.properties, json!({}));
    }
}
