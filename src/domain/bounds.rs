//! Parameter Bounds Catalog
//!
//! Safe operating ranges for every tunable trading parameter. The catalog is
//! owned by the adjuster and only changes through training-time range
//! expansion or the feedback loop's proportional drift.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::correlation::OptimalRange;
use super::recommendation::ValidationStatus;

pub const RISK_PER_TRADE: &str = "risk_per_trade";
pub const POSITION_SIZE: &str = "position_size";
pub const STOP_LOSS_PERCENTAGE: &str = "stop_loss_percentage";
pub const TAKE_PROFIT_PERCENTAGE: &str = "take_profit_percentage";
pub const SMA_SHORT_PERIOD: &str = "sma_short_period";
pub const SMA_LONG_PERIOD: &str = "sma_long_period";
pub const RSI_PERIOD: &str = "rsi_period";

/// Step alignment tolerance, relative to the step size
pub const STEP_TOLERANCE: f64 = 1e-6;

/// How dangerous a bad value for this parameter is
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SafetyLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl SafetyLevel {
    pub fn description(&self) -> &'static str {
        match self {
            SafetyLevel::Low => "Low impact - indicator tuning",
            SafetyLevel::Medium => "Medium impact - sizing",
            SafetyLevel::High => "High impact - capital at risk",
            SafetyLevel::Critical => "Critical - loss protection",
        }
    }
}

/// Range, default and step for one parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterBound {
    #[serde(default)]
    pub min: Option<f64>,
    #[serde(default)]
    pub max: Option<f64>,
    pub default: f64,
    #[serde(default)]
    pub step: Option<f64>,
    pub safety_level: SafetyLevel,
}

impl ParameterBound {
    /// Create a fully specified bound
    pub fn new(min: f64, max: f64, default: f64, step: f64, safety_level: SafetyLevel) -> Self {
        Self {
            min: Some(min),
            max: Some(max),
            default,
            step: Some(step),
            safety_level,
        }
    }

    /// Returns true if min <= default <= max for whichever ends are present
    pub fn is_consistent(&self) -> bool {
        self.min.map_or(true, |min| min <= self.default)
            && self.max.map_or(true, |max| self.default <= max)
            && match (self.min, self.max) {
                (Some(min), Some(max)) => min <= max,
                _ => true,
            }
    }

    /// Clamp a value into whichever ends are present
    pub fn clamp(&self, value: f64) -> f64 {
        let value = self.min.map_or(value, |min| value.max(min));
        self.max.map_or(value, |max| value.min(max))
    }
}

/// Outcome of checking a single value against the catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundsCheck {
    pub parameter_name: String,
    pub value: f64,
    pub is_valid: bool,
    pub status: ValidationStatus,
    pub message: String,
    pub corrected_value: Option<f64>,
}

impl BoundsCheck {
    fn valid(name: &str, value: f64, status: ValidationStatus, message: String) -> Self {
        Self {
            parameter_name: name.to_string(),
            value,
            is_valid: true,
            status,
            message,
            corrected_value: None,
        }
    }

    fn invalid(
        name: &str,
        value: f64,
        status: ValidationStatus,
        message: String,
        corrected_value: Option<f64>,
    ) -> Self {
        Self {
            parameter_name: name.to_string(),
            value,
            is_valid: false,
            status,
            message,
            corrected_value,
        }
    }
}

/// Named parameter bounds, keyed by parameter name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParameterBoundsCatalog {
    bounds: BTreeMap<String, ParameterBound>,
}

impl Default for ParameterBoundsCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

impl ParameterBoundsCatalog {
    /// The seven built-in trading parameters
    pub fn builtin() -> Self {
        use SafetyLevel::*;

        let bounds = [
            (RISK_PER_TRADE, ParameterBound::new(0.001, 0.1, 0.02, 0.001, High)),
            (POSITION_SIZE, ParameterBound::new(0.1, 2.0, 1.0, 0.1, Medium)),
            (STOP_LOSS_PERCENTAGE, ParameterBound::new(0.01, 0.2, 0.05, 0.01, Critical)),
            (TAKE_PROFIT_PERCENTAGE, ParameterBound::new(0.02, 0.5, 0.1, 0.02, High)),
            (SMA_SHORT_PERIOD, ParameterBound::new(5.0, 50.0, 20.0, 1.0, Low)),
            (SMA_LONG_PERIOD, ParameterBound::new(10.0, 200.0, 50.0, 1.0, Low)),
            (RSI_PERIOD, ParameterBound::new(5.0, 30.0, 14.0, 1.0, Low)),
        ];

        Self {
            bounds: bounds
                .into_iter()
                .map(|(name, bound)| (name.to_string(), bound))
                .collect(),
        }
    }

    /// Replace the catalog wholesale with configured bounds
    pub fn from_bounds(bounds: BTreeMap<String, ParameterBound>) -> Self {
        Self { bounds }
    }

    pub fn get(&self, name: &str) -> Option<&ParameterBound> {
        self.bounds.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.bounds.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ParameterBound)> {
        self.bounds.iter()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.bounds.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.bounds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bounds.is_empty()
    }

    /// Default value of every parameter
    pub fn defaults(&self) -> BTreeMap<String, f64> {
        self.bounds
            .iter()
            .map(|(name, bound)| (name.clone(), bound.default))
            .collect()
    }

    /// Parameters whose default lies outside their own range
    pub fn inconsistencies(&self) -> Vec<String> {
        self.bounds
            .iter()
            .filter(|(_, bound)| !bound.is_consistent())
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Check one value against its bound.
    ///
    /// Range is checked first; the step is only checked for in-range values
    /// and is measured from the default.
    pub fn check(&self, name: &str, value: f64, enabled: bool) -> BoundsCheck {
        if !enabled {
            return BoundsCheck::valid(
                name,
                value,
                ValidationStatus::ValidationDisabled,
                "Bounds validation disabled".to_string(),
            );
        }

        let Some(bound) = self.get(name) else {
            return BoundsCheck::invalid(
                name,
                value,
                ValidationStatus::UnknownParameter,
                format!("Unknown parameter: {}", name),
                None,
            );
        };

        if let Some(min) = bound.min {
            if value < min {
                return BoundsCheck::invalid(
                    name,
                    value,
                    ValidationStatus::BoundsViolation,
                    format!("Value {} below minimum {}", value, min),
                    Some(min),
                );
            }
        }

        if let Some(max) = bound.max {
            if value > max {
                return BoundsCheck::invalid(
                    name,
                    value,
                    ValidationStatus::BoundsViolation,
                    format!("Value {} above maximum {}", value, max),
                    Some(max),
                );
            }
        }

        if let Some(step) = bound.step.filter(|s| *s > 0.0) {
            if !is_step_aligned(value, bound.default, step) {
                // Snapping can cross an end that is not itself a step multiple
                let corrected = bound.clamp((value / step).round() * step);
                return BoundsCheck::invalid(
                    name,
                    value,
                    ValidationStatus::StepViolation,
                    format!("Value {} not aligned to step {}", value, step),
                    Some(corrected),
                );
            }
        }

        BoundsCheck::valid(
            name,
            value,
            ValidationStatus::Valid,
            "Value within bounds".to_string(),
        )
    }

    /// Widen a parameter's range so it covers `range`. Never shrinks.
    /// Returns true if either end moved.
    pub fn expand_to_include(&mut self, name: &str, range: &OptimalRange) -> bool {
        let Some(bound) = self.bounds.get_mut(name) else {
            return false;
        };

        let mut changed = false;
        if let Some(min) = bound.min {
            if range.lower < min {
                bound.min = Some(range.lower);
                changed = true;
            }
        }
        if let Some(max) = bound.max {
            if range.upper > max {
                bound.max = Some(range.upper);
                changed = true;
            }
        }

        if changed {
            tracing::info!(
                "Expanded bounds for {} to [{:?}, {:?}]",
                name,
                bound.min,
                bound.max
            );
        }
        changed
    }

    /// Scale every min and max by `factor`; defaults are left alone
    pub fn scale_all(&mut self, factor: f64) {
        for (name, bound) in self.bounds.iter_mut() {
            bound.min = bound.min.map(|min| min * factor);
            bound.max = bound.max.map(|max| max * factor);

            if !bound.is_consistent() {
                tracing::warn!(
                    "Default {} for {} drifted outside [{:?}, {:?}]",
                    bound.default,
                    name,
                    bound.min,
                    bound.max
                );
            }
        }
    }
}

/// True if `value - default` is a whole number of steps
pub fn is_step_aligned(value: f64, default: f64, step: f64) -> bool {
    let remainder = (value - default).rem_euclid(step);
    let tolerance = step * STEP_TOLERANCE;
    remainder <= tolerance || step - remainder <= tolerance
}
