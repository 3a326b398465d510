//! Service configuration, loaded from environment variables (and `.env` in development).
use serde::Deserialize;

use crate::error::{ModerationError, Result};

/// Upper bound for `QUEUE_RETENTION_DAYS` (a century).
pub const MAX_QUEUE_RETENTION_DAYS: i64 = 36_500;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Postgres connection URL. Without it the service keeps state in memory.
    #[serde(default)]
    pub database_url: Option<String>,

    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,

    /// Port for /health, /ready and /metrics
    #[serde(default = "default_health_port")]
    pub health_port: u16,

    #[serde(default = "default_service_name")]
    pub service_name: String,

    #[serde(default = "default_environment")]
    pub environment: String,

    /// Default cut-off for "high confidence" flag lookups
    #[serde(default = "default_flag_confidence_threshold")]
    pub flag_confidence_threshold: f64,

    /// Processed queue items older than this are purged by cleanup
    #[serde(default = "default_queue_retention_days")]
    pub queue_retention_days: i64,

    /// `pretty` or `json`
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

fn default_db_max_connections() -> u32 {
    10
}

fn default_health_port() -> u16 {
    8087
}

fn default_service_name() -> String {
    "moderation-service".to_string()
}

fn default_environment() -> String {
    "development".to_string()
}

fn default_flag_confidence_threshold() -> f64 {
    0.8
}

fn default_queue_retention_days() -> i64 {
    30
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: None,
            db_max_connections: default_db_max_connections(),
            health_port: default_health_port(),
            service_name: default_service_name(),
            environment: default_environment(),
            flag_confidence_threshold: default_flag_confidence_threshold(),
            queue_retention_days: default_queue_retention_days(),
            log_format: default_log_format(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_vars(std::env::vars())
    }

    /// Load configuration from an explicit set of `KEY=value` pairs.
    pub fn from_vars<I>(vars: I) -> Result<Self>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let config: Config = envy::from_iter(vars)
            .map_err(|e| ModerationError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.db_max_connections == 0 {
            return Err(ModerationError::Config(
                "DB_MAX_CONNECTIONS must be at least 1".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.flag_confidence_threshold) {
            return Err(ModerationError::Config(format!(
                "FLAG_CONFIDENCE_THRESHOLD must be within [0, 1], got {}",
                self.flag_confidence_threshold
            )));
        }
        if !(1..=MAX_QUEUE_RETENTION_DAYS).contains(&self.queue_retention_days) {
            return Err(ModerationError::Config(format!(
                "QUEUE_RETENTION_DAYS must be within [1, {}], got {}",
                MAX_QUEUE_RETENTION_DAYS, self.queue_retention_days
            )));
        }
        self.log_format()?;
        Ok(())
    }

    pub fn log_format(&self) -> Result<LogFormat> {
        match self.log_format.to_ascii_lowercase().as_str() {
            "pretty" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            other => Err(ModerationError::Config(format!(
                "LOG_FORMAT must be `pretty` or `json`, got `{}`",
                other
            ))),
        }
    }

    pub fn uses_database(&self) -> bool {
        self.database_url.as_deref().map_or(false, |url| !url.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_default_config() {
        let config = Config::from_vars(Vec::new()).unwrap();
        assert_eq!(config.health_port, 8087);
        assert_eq!(config.db_max_connections, 10);
        assert_eq!(config.flag_confidence_threshold, 0.8);
        assert_eq!(config.queue_retention_days, 30);
        assert_eq!(config.log_format().unwrap(), LogFormat::Pretty);
        assert!(!config.uses_database());
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_vars(vars(&[
            ("DATABASE_URL", "postgres://localhost/moderation"),
            ("HEALTH_PORT", "9000"),
            ("FLAG_CONFIDENCE_THRESHOLD", "0.65"),
            ("LOG_FORMAT", "JSON"),
        ]))
        .unwrap();
        assert!(config.uses_database());
        assert_eq!(config.health_port, 9000);
        assert_eq!(config.flag_confidence_threshold, 0.65);
        assert_eq!(config.log_format().unwrap(), LogFormat::Json);
    }

    #[test]
    fn test_unparseable_value_is_config_error() {
        let err = Config::from_vars(vars(&[("HEALTH_PORT", "not-a-port")])).unwrap_err();
        assert!(matches!(err, ModerationError::Config(_)));
    }

    #[test]
    fn test_out_of_range_values_rejected() {
        for pairs in [
            vars(&[("FLAG_CONFIDENCE_THRESHOLD", "1.5")]),
            vars(&[("QUEUE_RETENTION_DAYS", "0")]),
            vars(&[("QUEUE_RETENTION_DAYS", "1000000000000")]),
            vars(&[("DB_MAX_CONNECTIONS", "0")]),
            vars(&[("LOG_FORMAT", "xml")]),
        ] {
            let err = Config::from_vars(pairs).unwrap_err();
            assert!(matches!(err, ModerationError::Config(_)));
        }
    }

    #[test]
    #[serial]
    fn test_from_env_reads_process_environment() {
        std::env::set_var("QUEUE_RETENTION_DAYS", "7");
        let config = Config::from_env().unwrap();
        std::env::remove_var("QUEUE_RETENTION_DAYS");
        assert_eq!(config.queue_retention_days, 7);
    }
}
