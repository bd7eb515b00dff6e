//! Configuration Loader
//!
//! Loads and validates configuration from TOML files. Every section is
//! optional; omitted fields take the production defaults.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::application::MODE_SWITCH_SOURCE;
use crate::domain::bounds::{ParameterBound, ParameterBoundsCatalog};
use crate::strategy::params::{LearningConfig, ModeConfig, ParamsError, ValidationConfig};

/// Overrides `[adjuster].learning_state_path`
pub const STATE_PATH_ENV: &str = "SENTINEL_STATE_PATH";

/// Overrides `[storage].data_dir`
pub const DATA_DIR_ENV: &str = "SENTINEL_DATA_DIR";

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_model_source() -> String {
    MODE_SWITCH_SOURCE.to_string()
}

fn default_log_level() -> String {
    "warn".to_string()
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub adjuster: LearningConfig,
    #[serde(default)]
    pub validation: ValidationConfig,
    #[serde(default)]
    pub mode: ModeConfig,
    #[serde(default)]
    pub storage: StorageSection,
    #[serde(default)]
    pub logging: LoggingSection,
    /// Parameter catalog; replaces the builtin one when non-empty
    #[serde(default)]
    pub bounds: BTreeMap<String, ParameterBound>,
}

/// Storage configuration section
#[derive(Debug, Clone, Deserialize)]
pub struct StorageSection {
    /// Directory holding markets, trades and stored parameters
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Tag written on stored mode baseline records; its capitals prefix the record ids
    #[serde(default = "default_model_source")]
    pub model_source: String,
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            model_source: default_model_source(),
        }
    }
}

impl StorageSection {
    /// Data directory with environment variable override
    pub fn get_data_dir(&self) -> PathBuf {
        std::env::var(DATA_DIR_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| self.data_dir.clone())
    }
}

/// Logging configuration section
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingSection {
    /// Log level when neither --verbose nor --debug is given
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("Invalid parameters: {0}")]
    ParamsError(#[from] ParamsError),
    #[error("Validation failed: {0}")]
    ValidationError(String),
}

/// Load configuration from a TOML file
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let config: Config = toml::from_str(&content)?;
    config.validate()?;
    Ok(config)
}

impl Config {
    /// Validate all configuration parameters
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.adjuster.validate()?;
        self.validation.validate()?;
        self.mode.validate()?;

        for (name, bound) in &self.bounds {
            if let Some(step) = bound.step {
                if !(step > 0.0 && step.is_finite()) {
                    return Err(ConfigError::ValidationError(format!(
                        "bounds.{}.step must be > 0, got {}",
                        name, step
                    )));
                }
            }
            if let (Some(min), Some(max)) = (bound.min, bound.max) {
                if min > max {
                    return Err(ConfigError::ValidationError(format!(
                        "bounds.{}: min {} exceeds max {}",
                        name, min, max
                    )));
                }
            }
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "logging.level must be one of {:?}, got {}",
                valid_levels, self.logging.level
            )));
        }

        Ok(())
    }

    /// Learning config with the state path environment override applied
    pub fn learning_config(&self) -> LearningConfig {
        match std::env::var(STATE_PATH_ENV) {
            Ok(path) => self.adjuster.clone().with_state_path(path),
            Err(_) => self.adjuster.clone(),
        }
    }

    /// The configured bounds as a catalog, or the builtin one when none are given.
    ///
    /// A non-empty `[bounds]` table replaces the builtin catalog entirely.
    pub fn catalog(&self) -> ParameterBoundsCatalog {
        if self.bounds.is_empty() {
            return ParameterBoundsCatalog::builtin();
        }

        let catalog = ParameterBoundsCatalog::from_bounds(self.bounds.clone());
        for name in catalog.inconsistencies() {
            tracing::warn!("Default for {} lies outside its configured range", name);
        }
        catalog
    }
}
