//! Configuration Module
//!
//! Loads and validates configuration from TOML files.

pub mod loader;

pub use loader::{
    Config, ConfigError, LoggingSection, StorageSection, load_config, DATA_DIR_ENV, STATE_PATH_ENV,
};
