//! Configuration Loader
//!
//! Environment-aware configuration loading built on the `config` crate.
//! Sources are layered from least to most specific:
//!
//! 1. `LookupConfig::default()`
//! 2. `{dir}/lookup.toml` (optional)
//! 3. `{dir}/lookup.{environment}.toml` (optional)
//! 4. `RISK_LOOKUP__SECTION__FIELD` environment variables

use super::error::{ConfigResult, ConfigurationError};
use super::LookupConfig;
use crate::constants::ENV_PREFIX;
use config::{Config, Environment, File};
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Loaded, validated configuration plus where it came from
#[derive(Debug)]
pub struct ConfigManager {
    config: LookupConfig,
    environment: String,
    config_directory: PathBuf,
}

impl ConfigManager {
    /// Load configuration with environment auto-detection
    pub fn load() -> ConfigResult<Arc<ConfigManager>> {
        Self::load_from_directory(None)
    }

    /// Load configuration from a specific directory
    pub fn load_from_directory(config_dir: Option<PathBuf>) -> ConfigResult<Arc<ConfigManager>> {
        let environment = detect_environment();
        Self::load_from_directory_with_env(config_dir, &environment)
    }

    /// Load configuration from a specific directory with explicit environment.
    /// Useful for tests that must not depend on process-wide variables.
    pub fn load_from_directory_with_env(
        config_dir: Option<PathBuf>,
        environment: &str,
    ) -> ConfigResult<Arc<ConfigManager>> {
        let config_directory = config_dir.unwrap_or_else(|| PathBuf::from("config"));

        debug!(
            environment = environment,
            directory = %config_directory.display(),
            "Loading lookup configuration"
        );

        let config = Self::build_layers(&config_directory, environment)?;
        config.validate()?;

        info!(
            environment = environment,
            cache_max_size = config.cache.max_size,
            cache_ttl_ms = config.cache.default_ttl_ms,
            failure_threshold = config.circuit_breaker.default_config.failure_threshold,
            "Configuration loaded successfully"
        );

        Ok(Arc::new(ConfigManager {
            config,
            environment: environment.to_string(),
            config_directory,
        }))
    }

    /// Wrap an already-built configuration, validating it first
    pub fn from_config(config: LookupConfig, environment: &str) -> ConfigResult<Arc<ConfigManager>> {
        config.validate()?;
        Ok(Arc::new(ConfigManager {
            config,
            environment: environment.to_string(),
            config_directory: PathBuf::from("config"),
        }))
    }

    fn build_layers(config_directory: &Path, environment: &str) -> ConfigResult<LookupConfig> {
        let defaults = Config::try_from(&LookupConfig::default())
            .map_err(|e| ConfigurationError::load_error(environment, e))?;

        let base_file = config_directory.join("lookup.toml");
        let env_file = config_directory.join(format!("lookup.{environment}.toml"));

        let merged = Config::builder()
            .add_source(defaults)
            .add_source(File::from(base_file).required(false))
            .add_source(File::from(env_file).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| ConfigurationError::load_error(environment, e))?;

        Ok(merged.try_deserialize::<LookupConfig>()?)
    }

    /// Get the loaded configuration
    pub fn config(&self) -> &LookupConfig {
        &self.config
    }

    /// Get the current environment
    pub fn environment(&self) -> &str {
        &self.environment
    }

    /// Get the configuration directory
    pub fn config_directory(&self) -> &Path {
        &self.config_directory
    }
}

/// Detect current environment from environment variables:
/// `RISK_LOOKUP_ENV || APP_ENV || "development"`
pub fn detect_environment() -> String {
    env::var("RISK_LOOKUP_ENV")
        .or_else(|_| env::var("APP_ENV"))
        .unwrap_or_else(|_| "development".to_string())
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_missing_directory_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let manager =
            ConfigManager::load_from_directory_with_env(Some(dir.path().join("absent")), "test")
                .unwrap();
        assert_eq!(manager.config().cache, LookupConfig::default().cache);
        assert_eq!(manager.environment(), "test");
    }

    #[test]
    fn test_environment_overlay_wins_over_base_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("lookup.toml"),
            "[cache]\nmax_size = 200\ndefault_ttl_ms = 10000\n",
        )
        .unwrap();
        fs::write(
            dir.path().join("lookup.staging.toml"),
            "[cache]\nmax_size = 50\n",
        )
        .unwrap();

        let manager =
            ConfigManager::load_from_directory_with_env(Some(dir.path().to_path_buf()), "staging")
                .unwrap();
        assert_eq!(manager.config().cache.max_size, 50);
        assert_eq!(manager.config().cache.default_ttl_ms, 10_000);
        assert_eq!(manager.config().cache.refresh_threshold, 0.2);
    }

    #[test]
    fn test_invalid_file_values_fail_validation() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("lookup.toml"),
            "[circuit_breaker.default_config]\nsuccess_threshold = 4\nhalf_open_max_calls = 2\n",
        )
        .unwrap();

        let result =
            ConfigManager::load_from_directory_with_env(Some(dir.path().to_path_buf()), "test");
        assert!(matches!(
            result,
            Err(ConfigurationError::ValidationError { .. })
        ));
    }

    #[test]
    fn test_from_config_rejects_invalid() {
        let mut config = LookupConfig::default();
        config.cache.max_size = 0;
        assert!(ConfigManager::from_config(config, "test").is_err());
    }
}
