use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use thiserror::Error;

use crate::domain::models::config::{Config, HandlerKind};

const WEIGHT_TOLERANCE: f64 = 1e-6;

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid iteration_limit: {0}. Must be at least 1")]
    InvalidIterationLimit(u32),

    #[error("Invalid pool_size: {0}. Must be at least 1")]
    InvalidPoolSize(usize),

    #[error("Invalid parallelism: {0}. Must be at least 1")]
    InvalidParallelism(usize),

    #[error("Invalid unit_timeout_ms: {0}. Must be positive")]
    InvalidUnitTimeout(u64),

    #[error("Invalid {0} weights: {1}")]
    InvalidWeights(&'static str, String),

    #[error("Invalid iteration_saturation: {0}. Must be positive")]
    InvalidIterationSaturation(f64),

    #[error(
        "Invalid planner thresholds: simple_max ({0}) < moderate_max ({1}) < complex_max ({2}) must hold"
    )]
    InvalidPlannerThresholds(u32, u32, u32),

    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),

    #[error("Invalid log rotation: {0}. Must be one of: daily, hourly, never")]
    InvalidRotation(String),

    #[error("Invalid requests_per_second: {0}. Must be at least 1")]
    InvalidRateLimit(u32),

    #[error("Invalid max_retries: {0}. Cannot be 0")]
    InvalidMaxRetries(u32),

    #[error(
        "Invalid backoff configuration: initial_backoff_ms ({0}) must be less than max_backoff_ms ({1})"
    )]
    InvalidBackoff(u64, u64),

    #[error("Handler endpoint cannot be empty")]
    EmptyEndpoint,
}

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults (Serialized)
    /// 2. .taskpilot/config.yaml (project config)
    /// 3. .taskpilot/local.yaml (project local overrides, optional)
    /// 4. Environment variables (TASKPILOT_* prefix, `__` separates nesting)
    pub fn load() -> Result<Config> {
        Self::load_layers(".taskpilot/config.yaml", ".taskpilot/local.yaml")
    }

    /// Same layering as [`ConfigLoader::load`] with explicit file locations.
    pub fn load_layers(
        config_path: impl AsRef<std::path::Path>,
        local_path: impl AsRef<std::path::Path>,
    ) -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(config_path.as_ref()))
            .merge(Yaml::file(local_path.as_ref()))
            .merge(Env::prefixed("TASKPILOT_").split("__"))
            .extract()
            .context("Failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file
    pub fn load_from_file(path: impl AsRef<std::path::Path>) -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path.as_ref()))
            .extract()
            .with_context(|| {
                format!(
                    "Failed to load config from {}",
                    path.as_ref().display()
                )
            })?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        if config.orchestrator.iteration_limit == 0 {
            return Err(ConfigError::InvalidIterationLimit(0));
        }

        let swarm = &config.swarm;
        if swarm.pool_size == 0 {
            return Err(ConfigError::InvalidPoolSize(0));
        }
        if swarm.parallelism == 0 {
            return Err(ConfigError::InvalidParallelism(0));
        }
        if swarm.unit_timeout_ms == 0 {
            return Err(ConfigError::InvalidUnitTimeout(0));
        }

        let scoring = &config.scoring;
        check_weights("session", &scoring.session.values(), scoring.session.total())?;
        check_weights("overall", &scoring.overall.values(), scoring.overall.total())?;
        if scoring.iteration_saturation <= 0.0 || !scoring.iteration_saturation.is_finite() {
            return Err(ConfigError::InvalidIterationSaturation(
                scoring.iteration_saturation,
            ));
        }

        let planner = &config.planner;
        if planner.simple_max >= planner.moderate_max || planner.moderate_max >= planner.complex_max
        {
            return Err(ConfigError::InvalidPlannerThresholds(
                planner.simple_max,
                planner.moderate_max,
                planner.complex_max,
            ));
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&config.logging.level.to_lowercase().as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&config.logging.format.to_lowercase().as_str()) {
            return Err(ConfigError::InvalidLogFormat(config.logging.format.clone()));
        }

        let valid_rotations = ["daily", "hourly", "never"];
        if !valid_rotations.contains(&config.logging.rotation.to_lowercase().as_str()) {
            return Err(ConfigError::InvalidRotation(config.logging.rotation.clone()));
        }

        let handler = &config.handler;
        if handler.requests_per_second == 0 {
            return Err(ConfigError::InvalidRateLimit(0));
        }
        if handler.max_retries == 0 {
            return Err(ConfigError::InvalidMaxRetries(0));
        }
        if handler.initial_backoff_ms >= handler.max_backoff_ms {
            return Err(ConfigError::InvalidBackoff(
                handler.initial_backoff_ms,
                handler.max_backoff_ms,
            ));
        }
        if handler.kind == HandlerKind::Http && handler.endpoint.trim().is_empty() {
            return Err(ConfigError::EmptyEndpoint);
        }

        Ok(())
    }
}

fn check_weights(group: &'static str, values: &[f64], total: f64) -> Result<(), ConfigError> {
    if let Some(bad) = values.iter().find(|w| !(0.0..=1.0).contains(*w)) {
        return Err(ConfigError::InvalidWeights(
            group,
            format!("{bad} is outside [0, 1]"),
        ));
    }
    if (total - 1.0).abs() > WEIGHT_TOLERANCE {
        return Err(ConfigError::InvalidWeights(
            group,
            format!("sum is {total}, expected 1"),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::{NamedTempFile, TempDir};

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.orchestrator.iteration_limit, 10);
        assert_eq!(config.swarm.pool_size, 200);
        assert_eq!(config.swarm.parallelism, 16);
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.handler.kind, HandlerKind::Mock);
        assert!(ConfigLoader::validate(&config).is_ok());
    }

    #[test]
    fn test_yaml_parsing() {
        let yaml = r"
orchestrator:
  iteration_limit: 4
  max_time_ms: 30000
swarm:
  pool_size: 12
  parallelism: 4
scoring:
  session:
    autonomy: 0.25
    iteration: 0.25
    success: 0.25
    self_correction: 0.25
logging:
  level: debug
  format: json
";
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.orchestrator.iteration_limit, 4);
        assert_eq!(config.orchestrator.max_time_ms, Some(30_000));
        assert_eq!(config.swarm.pool_size, 12);
        assert!((config.scoring.session.autonomy - 0.25).abs() < f64::EPSILON);
        // Untouched sections keep their defaults
        assert_eq!(config.planner, Config::default().planner);
        assert!(ConfigLoader::validate(&config).is_ok());
    }

    #[test]
    fn test_validate_zero_iteration_limit() {
        let mut config = Config::default();
        config.orchestrator.iteration_limit = 0;
        let result = ConfigLoader::validate(&config);
        assert!(matches!(
            result.unwrap_err(),
            ConfigError::InvalidIterationLimit(0)
        ));
    }

    #[test]
    fn test_validate_zero_pool_and_parallelism() {
        let mut config = Config::default();
        config.swarm.pool_size = 0;
        assert!(matches!(
            ConfigLoader::validate(&config).unwrap_err(),
            ConfigError::InvalidPoolSize(0)
        ));

        let mut config = Config::default();
        config.swarm.parallelism = 0;
        assert!(matches!(
            ConfigLoader::validate(&config).unwrap_err(),
            ConfigError::InvalidParallelism(0)
        ));

        let mut config = Config::default();
        config.swarm.unit_timeout_ms = 0;
        assert!(matches!(
            ConfigLoader::validate(&config).unwrap_err(),
            ConfigError::InvalidUnitTimeout(0)
        ));
    }

    #[test]
    fn test_validate_weights_must_sum_to_one() {
        let mut config = Config::default();
        config.scoring.session.autonomy += 0.1;
        assert!(matches!(
            ConfigLoader::validate(&config).unwrap_err(),
            ConfigError::InvalidWeights("session", _)
        ));

        let mut config = Config::default();
        config.scoring.overall.healing = -0.1;
        config.scoring.overall.session += 0.1;
        assert!(matches!(
            ConfigLoader::validate(&config).unwrap_err(),
            ConfigError::InvalidWeights("overall", _)
        ));
    }

    #[test]
    fn test_validate_planner_thresholds() {
        let mut config = Config::default();
        config.planner.moderate_max = config.planner.simple_max;
        assert!(matches!(
            ConfigLoader::validate(&config).unwrap_err(),
            ConfigError::InvalidPlannerThresholds(..)
        ));
    }

    #[test]
    fn test_validate_invalid_log_level() {
        let mut config = Config::default();
        config.logging.level = "verbose".to_string();
        assert!(matches!(
            ConfigLoader::validate(&config).unwrap_err(),
            ConfigError::InvalidLogLevel(_)
        ));

        let mut config = Config::default();
        config.logging.format = "xml".to_string();
        assert!(matches!(
            ConfigLoader::validate(&config).unwrap_err(),
            ConfigError::InvalidLogFormat(_)
        ));

        let mut config = Config::default();
        config.logging.rotation = "weekly".to_string();
        assert!(matches!(
            ConfigLoader::validate(&config).unwrap_err(),
            ConfigError::InvalidRotation(_)
        ));
    }

    #[test]
    fn test_validate_handler_settings() {
        let mut config = Config::default();
        config.handler.max_retries = 0;
        assert!(matches!(
            ConfigLoader::validate(&config).unwrap_err(),
            ConfigError::InvalidMaxRetries(0)
        ));

        let mut config = Config::default();
        config.handler.initial_backoff_ms = 10_000;
        config.handler.max_backoff_ms = 5_000;
        assert!(matches!(
            ConfigLoader::validate(&config).unwrap_err(),
            ConfigError::InvalidBackoff(10_000, 5_000)
        ));

        let mut config = Config::default();
        config.handler.requests_per_second = 0;
        assert!(matches!(
            ConfigLoader::validate(&config).unwrap_err(),
            ConfigError::InvalidRateLimit(0)
        ));

        // An empty endpoint only matters when the http handler is selected
        let mut config = Config::default();
        config.handler.endpoint = String::new();
        assert!(ConfigLoader::validate(&config).is_ok());
        config.handler.kind = HandlerKind::Http;
        assert!(matches!(
            ConfigLoader::validate(&config).unwrap_err(),
            ConfigError::EmptyEndpoint
        ));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "swarm:\n  pool_size: 8\n  parallelism: 2").unwrap();
        file.flush().unwrap();

        let config = ConfigLoader::load_from_file(file.path()).unwrap();
        assert_eq!(config.swarm.pool_size, 8);
        assert_eq!(config.swarm.parallelism, 2);
        assert_eq!(config.orchestrator.iteration_limit, 10);
    }

    #[test]
    fn test_load_from_file_rejects_invalid() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "orchestrator:\n  iteration_limit: 0").unwrap();
        file.flush().unwrap();

        let err = ConfigLoader::load_from_file(file.path()).unwrap_err();
        assert!(err.to_string().contains("iteration_limit"));
    }

    #[test]
    fn test_env_override() {
        let dir = TempDir::new().unwrap();
        let base = dir.path().join("config.yaml");
        std::fs::write(&base, "swarm:\n  pool_size: 20\nlogging:\n  level: info\n").unwrap();

        temp_env::with_vars(
            [
                ("TASKPILOT_SWARM__POOL_SIZE", Some("40")),
                ("TASKPILOT_LOGGING__LEVEL", Some("debug")),
            ],
            || {
                let config =
                    ConfigLoader::load_layers(&base, dir.path().join("missing.yaml")).unwrap();
                assert_eq!(config.swarm.pool_size, 40, "Environment should win");
                assert_eq!(config.logging.level, "debug");
            },
        );
    }

    #[test]
    fn test_hierarchical_merging() {
        let mut base_file = NamedTempFile::new().unwrap();
        writeln!(
            base_file,
            "swarm:\n  pool_size: 5\nlogging:\n  level: info\n  format: json"
        )
        .unwrap();
        base_file.flush().unwrap();

        let mut override_file = NamedTempFile::new().unwrap();
        writeln!(override_file, "swarm:\n  pool_size: 15\nlogging:\n  level: debug").unwrap();
        override_file.flush().unwrap();

        let config = temp_env::with_vars_unset(["TASKPILOT_SWARM__POOL_SIZE"], || {
            ConfigLoader::load_layers(base_file.path(), override_file.path()).unwrap()
        });

        assert_eq!(config.swarm.pool_size, 15, "Override should win");
        assert_eq!(
            config.logging.level, "debug",
            "Override should win for nested fields"
        );
        assert_eq!(
            config.logging.format, "json",
            "Base value should persist when not overridden"
        );
    }
}
