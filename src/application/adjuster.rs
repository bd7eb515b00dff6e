//! Adaptive Parameter Adjuster
//!
//! Owns the bounds catalog, correlation model and parameter history, and runs
//! every adjustment cycle against them: training, prediction, feedback from
//! closed trades, and persistence.
//!
//! Cycle operations never propagate failures. They return a report whose
//! status is `success`, `warning` (not enough data, untrained model) or
//! `error` (malformed input), and leave the adjuster unchanged unless the
//! status is `success`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::config::Config;
use crate::domain::bounds::{BoundsCheck, ParameterBoundsCatalog};
use crate::domain::correlation::CorrelationModel;
use crate::domain::history::ParameterHistory;
use crate::domain::observations::{ObservationError, ObservationTable};
use crate::domain::recommendation::{Recommendation, ValidationStatus};
use crate::domain::state_persistence::{LearningState, ModelSnapshot, PersistError, RecoveryStatus};
use crate::domain::trade::{ClosedTrade, PerformanceInsights, PerformanceMetrics};
use crate::strategy::feedback::{FeedbackError, PerformanceFeedbackLoop};
use crate::strategy::generator::RecommendationGenerator;
use crate::strategy::params::{LearningConfig, ValidationConfig};
use crate::strategy::validation::{PipelineRun, ValidationPipeline, ValidationSummary};

#[derive(Error, Debug)]
pub enum AdjusterError {
    #[error("Model is not trained")]
    NotTrained,

    #[error("Invalid observations: {0}")]
    Observation(#[from] ObservationError),

    #[error("Persistence failed: {0}")]
    Persist(#[from] PersistError),

    #[error("No model snapshot at {0}")]
    SnapshotMissing(PathBuf),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportStatus {
    Success,
    Warning,
    Error,
}

impl ReportStatus {
    pub fn is_success(&self) -> bool {
        *self == ReportStatus::Success
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub is_trained: bool,
    pub parameters_tracked: usize,
    pub parameter_names: Vec<String>,
    pub history_entries: usize,
    pub last_training: Option<DateTime<Utc>>,
    pub adaptive_learning_enabled: bool,
    pub learning_state_path: PathBuf,
}

/// Result of `predict`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AdjustmentReport {
    pub status: ReportStatus,
    pub message: String,
    pub recommendations: Vec<Recommendation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation_results: Option<ValidationSummary>,
    pub model_info: ModelInfo,
    pub timestamp: DateTime<Utc>,
}

/// Result of `train`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrainingReport {
    pub status: ReportStatus,
    pub message: String,
    pub trained_parameters: Vec<String>,
    /// Parameter name to the reason it was left out
    pub skipped_parameters: BTreeMap<String, String>,
    pub data_points: usize,
    pub timestamp: DateTime<Utc>,
}

impl TrainingReport {
    fn rejected(status: ReportStatus, message: String, data_points: usize, now: DateTime<Utc>) -> Self {
        Self {
            status,
            message,
            trained_parameters: Vec::new(),
            skipped_parameters: BTreeMap::new(),
            data_points,
            timestamp: now,
        }
    }
}

/// Result of `update_parameters_from_trading_results`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeedbackReport {
    pub status: ReportStatus,
    pub message: String,
    pub updated_recommendations: Vec<Recommendation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub performance_insights: Option<PerformanceInsights>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub performance_score: Option<f64>,
    /// Trades handed to the cycle, including those outside the scoring window
    pub trades_analyzed: usize,
    pub timestamp: DateTime<Utc>,
}

impl FeedbackReport {
    fn warning(message: String, now: DateTime<Utc>) -> Self {
        Self {
            status: ReportStatus::Warning,
            message,
            updated_recommendations: Vec::new(),
            performance_insights: None,
            performance_score: None,
            trades_analyzed: 0,
            timestamp: now,
        }
    }
}

/// How well the current model's recommendations survive validation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationMetrics {
    pub total_recommendations: usize,
    pub valid_recommendations: usize,
    pub validation_success_rate: f64,
    pub average_confidence: f64,
    pub bounds_violations: usize,
    pub fallback_count: usize,
}

impl EvaluationMetrics {
    fn from_recommendations(recs: &[Recommendation]) -> Self {
        let total = recs.len();
        let valid = recs.iter().filter(|r| r.validation_status.is_valid()).count();
        let bounds_violations = recs
            .iter()
            .filter(|r| {
                let replaced = r.original_recommendation.as_deref().unwrap_or(r);
                replaced.validation_status == ValidationStatus::BoundsViolation
            })
            .count();

        Self {
            total_recommendations: total,
            valid_recommendations: valid,
            validation_success_rate: if total > 0 { valid as f64 / total as f64 } else { 0.0 },
            average_confidence: if total > 0 {
                recs.iter().map(|r| r.confidence).sum::<f64>() / total as f64
            } else {
                0.0
            },
            bounds_violations,
            fallback_count: recs.iter().filter(|r| r.is_fallback).count(),
        }
    }
}

pub struct AdaptiveParameterAdjuster {
    learning: LearningConfig,
    validation: ValidationConfig,
    catalog: ParameterBoundsCatalog,
    model: CorrelationModel,
    history: ParameterHistory,
    is_trained: bool,
    last_training: Option<DateTime<Utc>>,
}

impl AdaptiveParameterAdjuster {
    /// Create an adjuster, restoring learning state from disk when present
    pub fn new(learning: LearningConfig, validation: ValidationConfig, catalog: ParameterBoundsCatalog) -> Self {
        let mut adjuster = Self {
            learning,
            validation,
            catalog,
            model: CorrelationModel::new(),
            history: ParameterHistory::new(),
            is_trained: false,
            last_training: None,
        };

        match LearningState::try_recover(&adjuster.learning.learning_state_path) {
            RecoveryStatus::Fresh => {
                tracing::info!(
                    "No learning state at {}, starting fresh",
                    adjuster.learning.learning_state_path.display()
                );
            }
            RecoveryStatus::Recovered(state) => {
                adjuster.is_trained = !state.learning_model_state.is_empty();
                adjuster.model = state.learning_model_state;
                adjuster.history = state.parameter_history;
            }
            RecoveryStatus::Corrupted(e) => {
                tracing::error!("Learning state unreadable, starting fresh: {}", e);
            }
        }

        adjuster
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.learning_config(), config.validation.clone(), config.catalog())
    }

    pub fn catalog(&self) -> &ParameterBoundsCatalog {
        &self.catalog
    }

    pub fn model(&self) -> &CorrelationModel {
        &self.model
    }

    pub fn history(&self) -> &ParameterHistory {
        &self.history
    }

    pub fn is_trained(&self) -> bool {
        self.is_trained
    }

    pub fn learning_config(&self) -> &LearningConfig {
        &self.learning
    }

    pub fn validation_config(&self) -> &ValidationConfig {
        &self.validation
    }

    /// Score every catalog parameter present in `table` against `target`.
    ///
    /// Optimal ranges that fall outside a parameter's bounds widen them.
    pub fn train(&mut self, table: &ObservationTable, target: &str, now: DateTime<Utc>) -> TrainingReport {
        tracing::info!("Training on {} observations against '{}'", table.len(), target);

        let (model, summary) = match CorrelationModel::train(
            table,
            target,
            &self.catalog,
            self.learning.min_data_points_for_recommendation,
            now,
        ) {
            Ok(trained) => trained,
            Err(e) => {
                tracing::error!("Training rejected: {}", e);
                return TrainingReport::rejected(ReportStatus::Error, e.to_string(), table.len(), now);
            }
        };

        if summary.trained.is_empty() {
            tracing::warn!("No parameter could be trained");
            let mut report = TrainingReport::rejected(
                ReportStatus::Warning,
                "No parameters had enough usable data".to_string(),
                table.len(),
                now,
            );
            report.skipped_parameters = summary.skipped;
            return report;
        }

        for (name, state) in model.iter() {
            if let Some(range) = &state.optimal_range {
                self.catalog.expand_to_include(name, range);
            }
        }

        self.model = model;
        self.is_trained = true;
        self.last_training = Some(now);
        self.save_learning_state();

        TrainingReport {
            status: ReportStatus::Success,
            message: format!(
                "Trained {} parameters, skipped {}",
                summary.trained.len(),
                summary.skipped.len()
            ),
            trained_parameters: summary.trained,
            skipped_parameters: summary.skipped,
            data_points: table.len(),
            timestamp: now,
        }
    }

    /// Current recommendations, validated
    pub fn predict(&self, now: DateTime<Utc>) -> AdjustmentReport {
        if !self.is_trained {
            tracing::warn!("Model is not trained, returning defaults");
            return AdjustmentReport {
                status: ReportStatus::Warning,
                message: "Model is not trained, using default parameters".to_string(),
                recommendations: self
                    .catalog
                    .iter()
                    .map(|(name, bound)| Recommendation::default_fallback(name.clone(), bound.default))
                    .collect(),
                validation_results: None,
                model_info: self.model_info(),
                timestamp: now,
            };
        }

        let raw = RecommendationGenerator::new(&self.catalog, &self.model).from_correlations();
        let run = self.validate_batch(raw);

        AdjustmentReport {
            status: ReportStatus::Success,
            message: format!("Generated {} recommendations", run.recommendations.len()),
            validation_results: Some(run.summary()),
            recommendations: run.recommendations,
            model_info: self.model_info(),
            timestamp: now,
        }
    }

    /// Run a batch through the validation pipeline against current state
    pub fn validate_batch(&self, recommendations: Vec<Recommendation>) -> PipelineRun {
        ValidationPipeline::new(&self.validation, &self.catalog, &self.history).run(recommendations)
    }

    /// Adapt the model from closed trades.
    ///
    /// Warns without touching state when the model is untrained, learning is
    /// disabled, or there are too few trades.
    pub fn update_parameters_from_trading_results(
        &mut self,
        trades: &[ClosedTrade],
        metrics: PerformanceMetrics,
        now: DateTime<Utc>,
    ) -> FeedbackReport {
        if !self.is_trained {
            return FeedbackReport::warning(FeedbackError::NotTrained.to_string(), now);
        }

        let plan = match PerformanceFeedbackLoop::new(&self.learning).plan(trades, metrics, now) {
            Ok(plan) => plan,
            Err(e) => {
                tracing::warn!("Feedback skipped: {}", e);
                return FeedbackReport::warning(e.to_string(), now);
            }
        };

        let recommendations =
            PerformanceFeedbackLoop::commit(&plan, &mut self.model, &mut self.catalog, &mut self.history);
        self.save_learning_state();

        FeedbackReport {
            status: ReportStatus::Success,
            message: format!(
                "Updated {} parameters from {} trades",
                recommendations.len(),
                plan.trades_analyzed
            ),
            updated_recommendations: recommendations,
            performance_insights: Some(plan.insights),
            performance_score: Some(plan.performance_score),
            trades_analyzed: plan.trades_analyzed,
            timestamp: now,
        }
    }

    /// Check a single value against the catalog
    pub fn validate_parameter_bounds(&self, name: &str, value: f64) -> BoundsCheck {
        self.catalog.check(name, value, self.validation.enable_bounds_validation)
    }

    pub fn default_parameters(&self) -> BTreeMap<String, f64> {
        self.catalog.defaults()
    }

    pub fn feature_importance(&self) -> BTreeMap<String, f64> {
        self.model.feature_importance()
    }

    pub fn model_info(&self) -> ModelInfo {
        ModelInfo {
            is_trained: self.is_trained,
            parameters_tracked: self.model.len(),
            parameter_names: self.model.iter().map(|(name, _)| name.clone()).collect(),
            history_entries: self.history.len(),
            last_training: self.last_training,
            adaptive_learning_enabled: self.learning.enable_adaptive_learning,
            learning_state_path: self.learning.learning_state_path.clone(),
        }
    }

    pub fn evaluate(&self) -> Result<EvaluationMetrics, AdjusterError> {
        if !self.is_trained {
            return Err(AdjusterError::NotTrained);
        }

        let raw = RecommendationGenerator::new(&self.catalog, &self.model).from_correlations();
        let run = self.validate_batch(raw);
        Ok(EvaluationMetrics::from_recommendations(&run.recommendations))
    }

    /// Write bounds, model, history and training flag to one file
    pub fn save_model(&self, path: &Path, now: DateTime<Utc>) -> Result<(), AdjusterError> {
        ModelSnapshot {
            parameter_bounds: self.catalog.clone(),
            learning_model_state: self.model.clone(),
            parameter_history: self.history.clone(),
            is_trained: self.is_trained,
            saved_at: now,
        }
        .save(path)?;
        Ok(())
    }

    /// Replace all state with a snapshot written by `save_model`
    pub fn load_model(&mut self, path: &Path) -> Result<(), AdjusterError> {
        let snapshot = ModelSnapshot::load(path)?.ok_or_else(|| AdjusterError::SnapshotMissing(path.to_path_buf()))?;

        self.catalog = snapshot.parameter_bounds;
        self.model = snapshot.learning_model_state;
        self.history = snapshot.parameter_history;
        self.is_trained = snapshot.is_trained;
        self.last_training = Some(snapshot.saved_at);

        tracing::info!("Model loaded from {} ({} parameters)", path.display(), self.model.len());
        Ok(())
    }

    /// Persist the learning state; failures are logged and swallowed
    pub fn save_learning_state(&self) {
        let state = LearningState {
            learning_model_state: self.model.clone(),
            parameter_history: self.history.clone(),
        };

        if let Err(e) = state.save(&self.learning.learning_state_path) {
            tracing::error!("Failed to save learning state: {}", e);
        }
    }
}
