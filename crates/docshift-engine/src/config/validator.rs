//! Semantic validation for parsed migration configuration values.

use anyhow::{bail, Result};

use crate::config::types::MigrationConfig;

/// Validate a parsed migration configuration.
/// Returns `Ok(())` if valid, Err with all validation errors if not.
///
/// # Errors
///
/// Returns an error listing all validation failures found in the config.
pub fn validate_migration(config: &MigrationConfig) -> Result<()> {
    let mut errors = Vec::new();

    if config.family.trim().is_empty() {
        errors.push("Index family must not be empty".to_string());
    }
    if config
        .family
        .chars()
        .any(|c| c.is_ascii_uppercase() || c.is_whitespace())
    {
        errors.push(format!(
            "Index family '{}' must be lowercase with no whitespace",
            config.family
        ));
    }

    if config.mappings.version == 0 {
        errors.push("Mapping version must be at least 1".to_string());
    }
    if !config.mappings.properties.is_object() {
        errors.push("Mapping properties must be a JSON object".to_string());
    }

    if config.batch_size == 0 {
        errors.push("batch_size must be at least 1".to_string());
    }

    if !(0.0..=1.0).contains(&config.max_skip_fraction) {
        errors.push(format!(
            "max_skip_fraction {} must be between 0.0 and 1.0",
            config.max_skip_fraction
        ));
    }

    if config.retry.max_attempts == 0 {
        errors.push("retry.max_attempts must be at least 1".to_string());
    }
    if config.retry.base_delay_ms > config.retry.max_delay_ms {
        errors.push(format!(
            "retry.base_delay_ms {} exceeds retry.max_delay_ms {}",
            config.retry.base_delay_ms, config.retry.max_delay_ms
        ));
    }

    if config.lease_ttl_secs == 0 {
        errors.push("lease_ttl_secs must be at least 1".to_string());
    }

    if let Some(cluster) = &config.cluster {
        if cluster.url.trim().is_empty() {
            errors.push("cluster.url must not be empty".to_string());
        }
        if cluster.control_index.trim().is_empty() {
            errors.push("cluster.control_index must not be empty".to_string());
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        bail!(
            "Migration validation failed:\n  - {}",
            errors.join("\n  - ")
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parser::parse_migration_str;

    fn valid_yaml() -> &'static str {
        r#"
family: documents
mappings:
  version: 2
  properties:
    title: { type: text }
cluster:
  url: http://localhost:9200
"#
    }

    #[test]
    fn test_valid_migration_passes() {
        let config = parse_migration_str(valid_yaml()).unwrap();
        assert!(validate_migration(&config).is_ok());
    }

    #[test]
    fn test_empty_family_fails() {
        let yaml = valid_yaml().replace("documents", "\"\"");
        let config = parse_migration_str(&yaml).unwrap();
        let err = validate_migration(&config).unwrap_err().to_string();
        assert!(err.contains("Index family must not be empty"));
    }

    #[test]
    fn test_uppercase_family_fails() {
        let yaml = valid_yaml().replace("documents", "Documents");
        let config = parse_migration_str(&yaml).unwrap();
        let err = validate_migration(&config).unwrap_err().to_string();
        assert!(err.contains("lowercase"));
    }

    #[test]
    fn test_version_zero_fails() {
        let yaml = valid_yaml().replace("version: 2", "version: 0");
        let config = parse_migration_str(&yaml).unwrap();
        let err = validate_migration(&config).unwrap_err().to_string();
        assert!(err.contains("Mapping version"));
    }

    #[test]
    fn test_batch_size_zero_fails() {
        let yaml = format!("{}batch_size: 0\n", valid_yaml());
        let config = parse_migration_str(&yaml).unwrap();
        let err = validate_migration(&config).unwrap_err().to_string();
        assert!(err.contains("batch_size"));
    }

    #[test]
    fn test_skip_fraction_out_of_range_fails() {
        let yaml = format!("{}max_skip_fraction: 1.5\n", valid_yaml());
        let config = parse_migration_str(&yaml).unwrap();
        let err = validate_migration(&config).unwrap_err().to_string();
        assert!(err.contains("max_skip_fraction"));
    }

    #[test]
    fn test_inverted_retry_delays_fail() {
        let yaml = format!(
            "{}retry:\n  base_delay_ms: 5000\n  max_delay_ms: 100\n",
            valid_yaml()
        );
        let config = parse_migration_str(&yaml).unwrap();
        let err = validate_migration(&config).unwrap_err().to_string();
        assert!(err.contains("base_delay_ms"));
    }

    #[test]
    fn test_all_errors_reported_together() {
        let yaml = r#"
family: ""
mappings:
  version: 0
  properties: {}
batch_size: 0
"#;
        let config = parse_migration_str(yaml).unwrap();
        let err = validate_migration(&config).unwrap_err().to_string();
        assert!(err.contains("Index family"));
        assert!(err.contains("Mapping version"));
        assert!(err.contains("batch_size"));
    }
}
