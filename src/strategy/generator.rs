//! Recommendation Generator
//!
//! Turns correlation state into raw, unvalidated recommendations.

use crate::domain::bounds::ParameterBoundsCatalog;
use crate::domain::correlation::CorrelationModel;
use crate::domain::recommendation::{Recommendation, RecommendationSource};

/// Scale applied to the performance impact when nudging a default
pub const IMPACT_SCALE: f64 = 0.1;

/// Confidence bonus for adaptively regenerated recommendations
pub const ADAPTIVE_CONFIDENCE_BONUS: f64 = 0.1;

pub struct RecommendationGenerator<'a> {
    catalog: &'a ParameterBoundsCatalog,
    model: &'a CorrelationModel,
}

impl<'a> RecommendationGenerator<'a> {
    pub fn new(catalog: &'a ParameterBoundsCatalog, model: &'a CorrelationModel) -> Self {
        Self { catalog, model }
    }

    /// One pending recommendation per parameter with correlation state.
    ///
    /// Positive correlation nudges the default up by `impact * 0.1`, negative
    /// correlation nudges it down by the same amount.
    pub fn from_correlations(&self) -> Vec<Recommendation> {
        self.model
            .iter()
            .filter_map(|(name, state)| {
                let Some(bound) = self.catalog.get(name) else {
                    tracing::warn!("No bounds for {}, not recommending", name);
                    return None;
                };

                let adjustment = if state.correlation > 0.0 {
                    1.0 + state.performance_impact * IMPACT_SCALE
                } else {
                    1.0 - state.performance_impact * IMPACT_SCALE
                };

                Some(Recommendation::new(
                    name.clone(),
                    bound.default * adjustment,
                    state.correlation.abs().min(1.0),
                    RecommendationSource::Model,
                    format!(
                        "Based on correlation {:.3} and performance impact {:.3}",
                        state.correlation, state.performance_impact
                    ),
                ))
            })
            .collect()
    }

    /// Recommendations after a feedback cycle: defaults scaled up by the
    /// adaptation factor when performance improved, down otherwise.
    pub fn from_adaptation(&self, improving: bool, score: f64) -> Vec<Recommendation> {
        self.model
            .iter()
            .filter_map(|(name, state)| {
                let bound = self.catalog.get(name)?;
                let value = if improving {
                    bound.default * state.adaptation_factor
                } else {
                    bound.default / state.adaptation_factor
                };

                Some(Recommendation::new(
                    name.clone(),
                    value,
                    (state.correlation.abs() + ADAPTIVE_CONFIDENCE_BONUS).min(1.0),
                    RecommendationSource::AdaptiveLearning,
                    format!(
                        "Adaptive adjustment: factor {:.3}, performance score {:.3}",
                        state.adaptation_factor, score
                    ),
                ))
            })
            .collect()
    }
}
