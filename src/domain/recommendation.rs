//! Parameter Recommendations
//!
//! A recommendation is created fresh for every cycle and collects annotations
//! as it moves through the validation stages. Once the cycle completes it is
//! only ever appended to history, never edited.

use serde::{Deserialize, Serialize};

/// Confidence assigned to every fallback recommendation
pub const FALLBACK_CONFIDENCE: f64 = 0.5;

/// Where a recommendation came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationSource {
    /// Derived from correlation statistics
    Model,
    /// Catalog default substituted for an unusable recommendation
    Fallback,
    /// Regenerated by the performance feedback loop
    AdaptiveLearning,
}

impl RecommendationSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecommendationSource::Model => "model",
            RecommendationSource::Fallback => "fallback",
            RecommendationSource::AdaptiveLearning => "adaptive_learning",
        }
    }
}

/// Validation state of a recommendation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationStatus {
    /// Not yet validated
    Pending,
    /// Within bounds and on a step boundary
    Valid,
    /// Below the minimum or above the maximum
    BoundsViolation,
    /// Not aligned to the configured step
    StepViolation,
    /// Name not present in the bounds catalog
    UnknownParameter,
    /// Bounds checking switched off
    ValidationDisabled,
}

impl ValidationStatus {
    /// Returns true if the value can be used as-is
    pub fn is_valid(&self) -> bool {
        matches!(self, ValidationStatus::Valid)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationStatus::Pending => "pending",
            ValidationStatus::Valid => "valid",
            ValidationStatus::BoundsViolation => "bounds_violation",
            ValidationStatus::StepViolation => "step_violation",
            ValidationStatus::UnknownParameter => "unknown_parameter",
            ValidationStatus::ValidationDisabled => "validation_disabled",
        }
    }
}

/// A candidate value for one named parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub parameter_name: String,
    pub recommended_value: f64,
    /// Confidence in [0, 1]
    pub confidence: f64,
    pub source: RecommendationSource,
    pub validation_status: ValidationStatus,
    pub reasoning: String,

    /// Raw value before a bounds or step correction replaced it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_value: Option<f64>,
    #[serde(default)]
    pub correction_applied: bool,

    #[serde(default)]
    pub confidence_capped: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_confidence: Option<f64>,

    #[serde(default)]
    pub correlation_adjusted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_adjustment_factor: Option<f64>,

    #[serde(default)]
    pub rate_limited: bool,
    /// Value proposed before the rate limiter clamped it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unclamped_value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_value: Option<f64>,

    #[serde(default)]
    pub is_fallback: bool,
    /// The recommendation a fallback replaced, kept for audit
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_recommendation: Option<Box<Recommendation>>,
}

impl Recommendation {
    /// Create a pending recommendation with no annotations
    pub fn new(
        parameter_name: impl Into<String>,
        recommended_value: f64,
        confidence: f64,
        source: RecommendationSource,
        reasoning: impl Into<String>,
    ) -> Self {
        Self {
            parameter_name: parameter_name.into(),
            recommended_value,
            confidence,
            source,
            validation_status: ValidationStatus::Pending,
            reasoning: reasoning.into(),
            original_value: None,
            correction_applied: false,
            confidence_capped: false,
            original_confidence: None,
            correlation_adjusted: false,
            correlation_adjustment_factor: None,
            rate_limited: false,
            unclamped_value: None,
            previous_value: None,
            is_fallback: false,
            original_recommendation: None,
        }
    }

    /// Build the default-valued replacement for `original`
    pub fn fallback_for(original: Recommendation, default_value: f64) -> Self {
        let reasoning = format!(
            "Fallback to default value {} ({})",
            default_value,
            original.validation_status.as_str()
        );
        let mut fallback = Self::default_fallback(original.parameter_name.clone(), default_value);
        fallback.reasoning = reasoning;
        fallback.original_recommendation = Some(Box::new(original));
        fallback
    }

    /// Catalog default with no originating recommendation
    pub fn default_fallback(parameter_name: impl Into<String>, default_value: f64) -> Self {
        let mut rec = Self::new(
            parameter_name,
            default_value,
            FALLBACK_CONFIDENCE,
            RecommendationSource::Fallback,
            "Using default parameter value",
        );
        rec.validation_status = ValidationStatus::Valid;
        rec.is_fallback = true;
        rec
    }

    /// Whether the fallback stage has to replace this recommendation
    pub fn needs_fallback(&self, confidence_threshold: f64) -> bool {
        !self.validation_status.is_valid()
            || self.source == RecommendationSource::Fallback
            || self.confidence < confidence_threshold
    }
}
