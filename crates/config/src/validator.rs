//! Semantic validation of a parsed config

use crate::{Config, DatabaseBackend};

/// Outcome of validating a config: hard errors plus advisory warnings
#[derive(Debug, Default)]
pub struct ValidationReport {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationReport {
    /// True when boot may proceed
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Check a config for problems the type system cannot catch
pub fn validate_config(config: &Config) -> ValidationReport {
    let mut report = ValidationReport::default();

    if config.exchange.name.trim().is_empty() {
        report.errors.push("exchange.name must not be empty".to_string());
    }

    match config.database.backend {
        DatabaseBackend::Postgres => {
            if config.database.url.trim().is_empty() {
                report
                    .errors
                    .push("database.url is required for the postgres backend".to_string());
            }
            if config.database.max_connections == 0 {
                report
                    .errors
                    .push("database.max_connections must be at least 1".to_string());
            }
        }
        DatabaseBackend::Memory => {
            report
                .warnings
                .push("memory backend selected: durable state is lost on restart".to_string());
        }
    }

    if config.server.port == 0 {
        report.errors.push("server.port must not be 0".to_string());
    }

    if config.matching.max_unit_retries == 0 {
        report
            .errors
            .push("matching.max_unit_retries must be at least 1".to_string());
    }
    if config.matching.snapshot_depth_limit == 0 {
        report
            .errors
            .push("matching.snapshot_depth_limit must be at least 1".to_string());
    }

    if !matches!(config.log.format.as_str(), "pretty" | "json" | "compact") {
        report.errors.push(format!(
            "log.format must be pretty, json or compact, got {}",
            config.log.format
        ));
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generate_default_config;

    #[test]
    fn test_default_postgres_config_needs_url() {
        let config = generate_default_config();
        let report = validate_config(&config);
        assert!(!report.is_valid());
        assert!(report.errors.iter().any(|e| e.contains("database.url")));
    }

    #[test]
    fn test_memory_backend_is_valid_but_warned() {
        let mut config = generate_default_config();
        config.database.backend = DatabaseBackend::Memory;
        let report = validate_config(&config);
        assert!(report.is_valid());
        assert_eq!(report.warnings.len(), 1);
    }

    #[test]
    fn test_bad_log_format_rejected() {
        let mut config = generate_default_config();
        config.database.backend = DatabaseBackend::Memory;
        config.log.format = "xml".to_string();
        let report = validate_config(&config);
        assert!(!report.is_valid());
    }
}
