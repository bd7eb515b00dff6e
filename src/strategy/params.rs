//! Adjuster Parameters
//!
//! Configuration structs for learning, validation and mode switching.
//! Defaults reproduce the production tuning; every field can be overridden
//! from the TOML config.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::mode_policy::ModeFactorTable;
use super::validation::Stage;
use crate::domain::mode::TradingMode;
use crate::domain::state_persistence::DEFAULT_LEARNING_STATE_FILE;

fn default_true() -> bool {
    true
}

fn default_learning_state_path() -> PathBuf {
    PathBuf::from(DEFAULT_LEARNING_STATE_FILE)
}

fn default_min_trades_for_learning() -> usize {
    10
}

fn default_performance_window_size() -> usize {
    50
}

fn default_learning_rate() -> f64 {
    0.1
}

fn default_min_data_points() -> usize {
    5
}

fn default_confidence_cap_threshold() -> f64 {
    0.95
}

fn default_max_parameter_change_rate() -> f64 {
    0.5
}

fn default_fallback_confidence_threshold() -> f64 {
    0.3
}

fn default_mode_switch_threshold() -> f64 {
    0.15
}

fn default_performance_lookback_days() -> i64 {
    30
}

/// Learning and feedback settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearningConfig {
    /// Where the learning state is persisted
    #[serde(default = "default_learning_state_path")]
    pub learning_state_path: PathBuf,
    /// Minimum closed trades before feedback is applied
    #[serde(default = "default_min_trades_for_learning")]
    pub min_trades_for_learning: usize,
    /// Most recent trades considered per feedback cycle
    #[serde(default = "default_performance_window_size")]
    pub performance_window_size: usize,
    /// Relative adaptation step per feedback cycle (0.1 = ±10%)
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f64,
    /// Apply trading results to the model at all
    #[serde(default = "default_true")]
    pub enable_adaptive_learning: bool,
    /// Non-missing samples a parameter needs before it is scored
    #[serde(default = "default_min_data_points")]
    pub min_data_points_for_recommendation: usize,
}

impl Default for LearningConfig {
    fn default() -> Self {
        Self {
            learning_state_path: default_learning_state_path(),
            min_trades_for_learning: default_min_trades_for_learning(),
            performance_window_size: default_performance_window_size(),
            learning_rate: default_learning_rate(),
            enable_adaptive_learning: true,
            min_data_points_for_recommendation: default_min_data_points(),
        }
    }
}

impl LearningConfig {
    pub fn with_state_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.learning_state_path = path.into();
        self
    }

    pub fn validate(&self) -> Result<(), ParamsError> {
        if !(self.learning_rate > 0.0 && self.learning_rate < 1.0) {
            return Err(ParamsError::InvalidLearningRate(self.learning_rate));
        }
        if self.performance_window_size == 0 {
            return Err(ParamsError::InvalidWindow(self.performance_window_size));
        }
        Ok(())
    }
}

/// Stage toggles and thresholds for the validation pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationConfig {
    #[serde(default = "default_true")]
    pub enable_bounds_validation: bool,
    #[serde(default = "default_true")]
    pub enable_confidence_capping: bool,
    /// Highest confidence a recommendation may carry
    #[serde(default = "default_confidence_cap_threshold")]
    pub confidence_cap_threshold: f64,
    #[serde(default = "default_true")]
    pub enable_parameter_correlation_checks: bool,
    #[serde(default = "default_true")]
    pub enable_rate_limiting: bool,
    /// Largest relative change from the previous value (0.5 = 50%)
    #[serde(default = "default_max_parameter_change_rate")]
    pub max_parameter_change_rate: f64,
    #[serde(default = "default_true")]
    pub enable_fallback_to_defaults: bool,
    /// Recommendations below this confidence fall back to defaults
    #[serde(default = "default_fallback_confidence_threshold")]
    pub fallback_confidence_threshold: f64,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            enable_bounds_validation: true,
            enable_confidence_capping: true,
            confidence_cap_threshold: default_confidence_cap_threshold(),
            enable_parameter_correlation_checks: true,
            enable_rate_limiting: true,
            max_parameter_change_rate: default_max_parameter_change_rate(),
            enable_fallback_to_defaults: true,
            fallback_confidence_threshold: default_fallback_confidence_threshold(),
        }
    }
}

impl ValidationConfig {
    /// Whether a pipeline stage runs
    pub fn is_enabled(&self, stage: Stage) -> bool {
        match stage {
            Stage::Bounds => self.enable_bounds_validation,
            Stage::ConfidenceCap => self.enable_confidence_capping,
            Stage::CorrelationAdjustment => self.enable_parameter_correlation_checks,
            Stage::RateLimit => self.enable_rate_limiting,
            Stage::Fallback => self.enable_fallback_to_defaults,
        }
    }

    /// Switch a single stage on or off
    pub fn with_stage(mut self, stage: Stage, enabled: bool) -> Self {
        match stage {
            Stage::Bounds => self.enable_bounds_validation = enabled,
            Stage::ConfidenceCap => self.enable_confidence_capping = enabled,
            Stage::CorrelationAdjustment => self.enable_parameter_correlation_checks = enabled,
            Stage::RateLimit => self.enable_rate_limiting = enabled,
            Stage::Fallback => self.enable_fallback_to_defaults = enabled,
        }
        self
    }

    /// Run only the given stage
    pub fn only(stage: Stage) -> Self {
        Stage::ORDER
            .iter()
            .fold(Self::default(), |config, s| config.with_stage(*s, *s == stage))
    }

    pub fn with_confidence_cap(mut self, cap: f64) -> Self {
        self.confidence_cap_threshold = cap;
        self
    }

    pub fn with_max_change_rate(mut self, rate: f64) -> Self {
        self.max_parameter_change_rate = rate;
        self
    }

    pub fn with_fallback_threshold(mut self, threshold: f64) -> Self {
        self.fallback_confidence_threshold = threshold;
        self
    }

    pub fn validate(&self) -> Result<(), ParamsError> {
        if !(self.confidence_cap_threshold > 0.0 && self.confidence_cap_threshold <= 1.0) {
            return Err(ParamsError::InvalidConfidenceCap(self.confidence_cap_threshold));
        }
        if !(self.max_parameter_change_rate > 0.0 && self.max_parameter_change_rate.is_finite()) {
            return Err(ParamsError::InvalidChangeRate(self.max_parameter_change_rate));
        }
        if !(0.0..=1.0).contains(&self.fallback_confidence_threshold) {
            return Err(ParamsError::InvalidFallbackThreshold(self.fallback_confidence_threshold));
        }
        Ok(())
    }
}

/// Trading mode settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModeConfig {
    /// Which risk/position factor table to apply
    #[serde(default)]
    pub factor_table: ModeFactorTable,
    /// Mode score below minus this forces CONSERVATIVE
    #[serde(default = "default_mode_switch_threshold")]
    pub mode_switch_threshold: f64,
    /// Days of closed trades used to score current performance
    #[serde(default = "default_performance_lookback_days")]
    pub performance_lookback_days: i64,
    /// Mode on startup
    #[serde(default)]
    pub initial_mode: TradingMode,
}

impl Default for ModeConfig {
    fn default() -> Self {
        Self {
            factor_table: ModeFactorTable::default(),
            mode_switch_threshold: default_mode_switch_threshold(),
            performance_lookback_days: default_performance_lookback_days(),
            initial_mode: TradingMode::default(),
        }
    }
}

impl ModeConfig {
    pub fn validate(&self) -> Result<(), ParamsError> {
        if !(self.mode_switch_threshold > 0.0 && self.mode_switch_threshold <= 1.0) {
            return Err(ParamsError::InvalidSwitchThreshold(self.mode_switch_threshold));
        }
        if self.performance_lookback_days <= 0 {
            return Err(ParamsError::InvalidLookbackDays(self.performance_lookback_days));
        }
        Ok(())
    }
}

/// Parameter validation errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParamsError {
    #[error("Invalid learning rate: {0} (must be 0 < rate < 1)")]
    InvalidLearningRate(f64),
    #[error("Invalid performance window: {0} (must be > 0)")]
    InvalidWindow(usize),
    #[error("Invalid confidence cap: {0} (must be 0 < cap <= 1)")]
    InvalidConfidenceCap(f64),
    #[error("Invalid max change rate: {0} (must be > 0)")]
    InvalidChangeRate(f64),
    #[error("Invalid fallback threshold: {0} (must be 0-1)")]
    InvalidFallbackThreshold(f64),
    #[error("Invalid mode switch threshold: {0} (must be 0 < t <= 1)")]
    InvalidSwitchThreshold(f64),
    #[error("Invalid performance lookback: {0} days (must be > 0)")]
    InvalidLookbackDays(i64),
}
