//! State Persistence
//!
//! Learning state and full model snapshots as pretty-printed JSON documents.
//! Saving the same state twice produces byte-identical files.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use super::bounds::ParameterBoundsCatalog;
use super::correlation::CorrelationModel;
use super::history::ParameterHistory;

/// Default learning state file name
pub const DEFAULT_LEARNING_STATE_FILE: &str = "ai_learning_state.json";

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PersistError {
    #[error("Failed to serialize state: {0}")]
    SerializationError(String),

    #[error("Failed to deserialize state: {0}")]
    DeserializationError(String),

    #[error("Failed to write state file: {0}")]
    WriteError(String),

    #[error("Failed to read state file: {0}")]
    ReadError(String),

    #[error("Failed to create directory: {0}")]
    DirectoryError(String),
}

/// What the adjuster remembers between runs
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LearningState {
    pub learning_model_state: CorrelationModel,
    pub parameter_history: ParameterHistory,
}

/// Result of reading the learning state on startup
#[derive(Debug, Clone)]
pub enum RecoveryStatus {
    /// No state file yet
    Fresh,
    /// State loaded successfully
    Recovered(LearningState),
    /// State file unreadable, starting fresh
    Corrupted(String),
}

impl LearningState {
    pub fn save(&self, path: &Path) -> Result<(), PersistError> {
        write_json(path, self)?;
        tracing::info!(
            "Learning state saved: {} parameters, {} history entries -> {}",
            self.learning_model_state.len(),
            self.parameter_history.len(),
            path.display()
        );
        Ok(())
    }

    /// Load state; a missing or empty file is `Ok(None)`
    pub fn load(path: &Path) -> Result<Option<Self>, PersistError> {
        let state: Option<Self> = read_json(path)?;
        if let Some(state) = &state {
            tracing::info!(
                "Learning state loaded: {} parameters, {} history entries",
                state.learning_model_state.len(),
                state.parameter_history.len()
            );
        }
        Ok(state)
    }

    pub fn try_recover(path: &Path) -> RecoveryStatus {
        match Self::load(path) {
            Ok(Some(state)) => RecoveryStatus::Recovered(state),
            Ok(None) => RecoveryStatus::Fresh,
            Err(e) => RecoveryStatus::Corrupted(e.to_string()),
        }
    }

    pub fn default_path(data_dir: &Path) -> PathBuf {
        data_dir.join(DEFAULT_LEARNING_STATE_FILE)
    }
}

/// Everything needed to rebuild an adjuster, written by `save_model`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSnapshot {
    pub parameter_bounds: ParameterBoundsCatalog,
    pub learning_model_state: CorrelationModel,
    pub parameter_history: ParameterHistory,
    pub is_trained: bool,
    pub saved_at: DateTime<Utc>,
}

impl ModelSnapshot {
    pub fn save(&self, path: &Path) -> Result<(), PersistError> {
        write_json(path, self)?;
        tracing::info!("Model snapshot saved to {}", path.display());
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Option<Self>, PersistError> {
        read_json(path)
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), PersistError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| PersistError::DirectoryError(e.to_string()))?;
    }

    let content = serde_json::to_string_pretty(value)
        .map_err(|e| PersistError::SerializationError(e.to_string()))?;

    fs::write(path, content).map_err(|e| PersistError::WriteError(e.to_string()))
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<Option<T>, PersistError> {
    if !path.exists() {
        return Ok(None);
    }

    let content = fs::read_to_string(path).map_err(|e| PersistError::ReadError(e.to_string()))?;
    if content.trim().is_empty() {
        return Ok(None);
    }

    serde_json::from_str(&content)
        .map(Some)
        .map_err(|e| PersistError::DeserializationError(e.to_string()))
}
