use config::{Config as ConfigLoader, ConfigError, Environment, File};
use logbatch_core::{BatcherConfig, TimerPoolConfig};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub logging: LoggingConfig,

    #[serde(default)]
    pub pool: TimerPoolConfig,

    /// Batchers by name
    #[serde(default)]
    pub observers: BTreeMap<String, BatcherConfig>,

    #[serde(default)]
    pub demo: DemoConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

/// Shape of the synthetic event burst
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DemoConfig {
    pub rounds: usize,
    pub events_per_round: usize,
    /// Pause between rounds
    #[serde(with = "humantime_serde")]
    pub interval: Duration,
    /// Values used for the `tenant` diagnostic context
    pub tenants: Vec<String>,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            rounds: 3,
            events_per_round: 20,
            interval: Duration::from_millis(500),
            tenants: Vec::new(),
        }
    }
}

impl Config {
    /// Load configuration from TOML files and environment variables
    ///
    /// Hierarchy (weakest to strongest):
    /// 1. config/default.toml
    /// 2. config/{ENV}.toml (if ENV is set)
    /// 3. Environment variables, e.g. `LOGBATCH_POOL__WORKER_THREADS=4`
    pub fn load() -> Result<Self, ConfigError> {
        let env = std::env::var("ENV").unwrap_or_else(|_| "dev".to_string());

        let builder = ConfigLoader::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            .add_source(
                Environment::with_prefix("LOGBATCH")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );

        let cfg: Config = builder.build()?.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load config from a specific path (useful for testing)
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let builder = ConfigLoader::builder().add_source(File::from(path.as_ref()));

        let cfg: Config = builder.build()?.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, observer) in &self.observers {
            observer
                .validate()
                .map_err(|e| ConfigError::Message(format!("observers.{}: {}", name, e)))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_structure() {
        let toml = r#"
            [logging]
            level = "debug"
            format = "json"

            [observers.pager]
            idle_threshold = "10s"
            cooldown_time = "1m"

            [observers.digest]
            throttle = "1m 15m"
            mdc_key = "tenant"
        "#;

        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.logging.format, "json");
        assert_eq!(config.pool, TimerPoolConfig::default());
        assert_eq!(config.observers.len(), 2);

        let pager = &config.observers["pager"];
        assert_eq!(pager.timing.idle_threshold, Duration::from_secs(10));
        assert_eq!(pager.timing.cooldown_time, Duration::from_secs(60));
        assert!(pager.throttle.is_none());

        let digest = &config.observers["digest"];
        assert_eq!(digest.throttle.as_ref().unwrap().delay(2), Duration::from_secs(900));
        assert_eq!(digest.mdc_key.as_deref(), Some("tenant"));

        assert_eq!(config.demo.rounds, 3);
    }

    #[test]
    fn test_validate_names_observer() {
        let toml = r#"
            [logging]
            level = "info"
            format = "pretty"

            [observers.broken]
            mdc_key = ""
        "#;

        let config: Config = toml::from_str(toml).unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("observers.broken"));
    }
}
