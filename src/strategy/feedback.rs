//! Performance Feedback Loop
//!
//! Converts a batch of closed trades into one adaptation step. The step is
//! planned first and committed in one go, so a rejected batch leaves the
//! model, catalog and history untouched.

use chrono::{DateTime, Utc};
use thiserror::Error;

use super::generator::RecommendationGenerator;
use super::params::LearningConfig;
use crate::domain::bounds::ParameterBoundsCatalog;
use crate::domain::correlation::CorrelationModel;
use crate::domain::history::{HistoryEntry, ParameterHistory};
use crate::domain::recommendation::Recommendation;
use crate::domain::trade::{ClosedTrade, PerformanceInsights, PerformanceMetrics};

/// Bounds multiplier after a positive cycle
pub const BOUNDS_EXPANSION: f64 = 1.05;

/// Bounds multiplier after a non-positive cycle
pub const BOUNDS_CONTRACTION: f64 = 0.95;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FeedbackError {
    #[error("Model is not trained")]
    NotTrained,

    #[error("Adaptive learning is disabled")]
    LearningDisabled,

    #[error("Insufficient data for learning (need {needed}, got {got})")]
    InsufficientTrades { needed: usize, got: usize },
}

/// A feedback step, computed but not yet applied
#[derive(Debug, Clone, PartialEq)]
pub struct FeedbackPlan {
    pub insights: PerformanceInsights,
    pub performance_score: f64,
    /// Every trade handed in; the insights cover only the most recent window
    pub trades_analyzed: usize,
    /// Multiplier for every adaptation factor
    pub adaptation_multiplier: f64,
    /// Multiplier for every catalog min and max
    pub bounds_factor: f64,
    pub timestamp: DateTime<Utc>,
}

impl FeedbackPlan {
    pub fn improving(&self) -> bool {
        self.performance_score > 0.0
    }
}

pub struct PerformanceFeedbackLoop<'a> {
    config: &'a LearningConfig,
}

impl<'a> PerformanceFeedbackLoop<'a> {
    pub fn new(config: &'a LearningConfig) -> Self {
        Self { config }
    }

    /// Score the most recent trades. Nothing is mutated here.
    pub fn plan(
        &self,
        trades: &[ClosedTrade],
        metrics: PerformanceMetrics,
        now: DateTime<Utc>,
    ) -> Result<FeedbackPlan, FeedbackError> {
        if !self.config.enable_adaptive_learning {
            return Err(FeedbackError::LearningDisabled);
        }
        if trades.len() < self.config.min_trades_for_learning {
            return Err(FeedbackError::InsufficientTrades {
                needed: self.config.min_trades_for_learning,
                got: trades.len(),
            });
        }

        let window_start = trades.len().saturating_sub(self.config.performance_window_size);
        let window = &trades[window_start..];

        let insights = PerformanceInsights::from_trades(window, metrics, now);
        let performance_score = insights.performance_score();
        let improving = performance_score > 0.0;

        Ok(FeedbackPlan {
            insights,
            performance_score,
            trades_analyzed: trades.len(),
            adaptation_multiplier: if improving {
                1.0 + self.config.learning_rate
            } else {
                1.0 - self.config.learning_rate
            },
            bounds_factor: if improving { BOUNDS_EXPANSION } else { BOUNDS_CONTRACTION },
            timestamp: now,
        })
    }

    /// Apply a plan: adapt, drift bounds, regenerate, record
    pub fn commit(
        plan: &FeedbackPlan,
        model: &mut CorrelationModel,
        catalog: &mut ParameterBoundsCatalog,
        history: &mut ParameterHistory,
    ) -> Vec<Recommendation> {
        model.adapt_all(plan.adaptation_multiplier, plan.timestamp);
        catalog.scale_all(plan.bounds_factor);

        let recommendations =
            RecommendationGenerator::new(catalog, model).from_adaptation(plan.improving(), plan.performance_score);

        history.push(HistoryEntry {
            timestamp: plan.timestamp,
            recommendations: recommendations.clone(),
            performance_insights: plan.insights.clone(),
            performance_score: plan.performance_score,
        });

        tracing::info!(
            "Feedback applied: score {:.3}, {} recommendations, history {}",
            plan.performance_score,
            recommendations.len(),
            history.len()
        );

        recommendations
    }
}
