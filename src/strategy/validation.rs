//! Validation Pipeline
//!
//! Five stages applied in a fixed order, each seeing the output of the one
//! before it:
//!
//! 1. Bounds - clamp out-of-range values, snap off-step values
//! 2. Confidence cap - clamp overconfident recommendations
//! 3. Correlation adjustment - damp or boost known interacting pairs
//! 4. Rate limit - bound the change from the previously accepted value
//! 5. Fallback - replace anything unusable with the catalog default
//!
//! Every stage reports a [`StageOutcome`]. A stage that cannot run (bad
//! thresholds, bad rules) is recorded as failed and the batch passes through
//! it untouched. A recommendation that a stage cannot process is left as-is
//! for that stage and listed in the outcome's item errors.

use serde::Serialize;
use std::collections::BTreeSet;
use thiserror::Error;

use super::params::ValidationConfig;
use crate::domain::bounds::{
    ParameterBoundsCatalog, POSITION_SIZE, RISK_PER_TRADE, STOP_LOSS_PERCENTAGE, TAKE_PROFIT_PERCENTAGE,
};
use crate::domain::history::ParameterHistory;
use crate::domain::recommendation::Recommendation;

/// Products closer to 1.0 than this count as "no adjustment"
const FACTOR_EPSILON: f64 = 1e-12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Bounds,
    ConfidenceCap,
    CorrelationAdjustment,
    RateLimit,
    Fallback,
}

impl Stage {
    /// Execution order
    pub const ORDER: [Stage; 5] = [
        Stage::Bounds,
        Stage::ConfidenceCap,
        Stage::CorrelationAdjustment,
        Stage::RateLimit,
        Stage::Fallback,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Stage::Bounds => "bounds",
            Stage::ConfidenceCap => "confidence_cap",
            Stage::CorrelationAdjustment => "correlation_adjustment",
            Stage::RateLimit => "rate_limit",
            Stage::Fallback => "fallback",
        }
    }
}

/// Reasons a whole stage cannot run
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StageError {
    #[error("{name} must be {expected}, got {value}")]
    InvalidThreshold {
        name: &'static str,
        value: f64,
        expected: &'static str,
    },

    #[error("Correlation rule {parameter} -> {partner} has invalid factor {factor}")]
    InvalidRule {
        parameter: &'static str,
        partner: &'static str,
        factor: f64,
    },
}

/// Reasons a single recommendation is skipped by a stage
#[derive(Error, Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ItemError {
    #[error("{parameter}: value {value} is not finite")]
    NonFiniteValue { parameter: String, value: f64 },

    #[error("{parameter}: previous value {previous} cannot anchor a rate limit")]
    UnusablePrevious { parameter: String, previous: f64 },

    #[error("{parameter}: no catalog default to fall back to")]
    MissingDefault { parameter: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StageStatus {
    /// Ran; `modified` recommendations changed value or were replaced
    Applied { modified: usize },
    /// Disabled by configuration
    Skipped,
    /// Could not run; recommendations passed through unchanged
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageOutcome {
    pub stage: Stage,
    #[serde(flatten)]
    pub status: StageStatus,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub item_errors: Vec<ItemError>,
}

impl StageOutcome {
    pub fn applied(&self) -> bool {
        matches!(self.status, StageStatus::Applied { .. })
    }
}

/// Per-stage summary reported alongside predictions
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationSummary {
    pub bounds_validated: bool,
    pub confidence_capped: bool,
    pub correlations_checked: bool,
    pub rate_limited: bool,
    pub fallback_applied: bool,
    pub stages: Vec<StageOutcome>,
}

/// Result of one pipeline pass
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineRun {
    pub recommendations: Vec<Recommendation>,
    pub stages: Vec<StageOutcome>,
}

impl PipelineRun {
    pub fn outcome(&self, stage: Stage) -> Option<&StageOutcome> {
        self.stages.iter().find(|o| o.stage == stage)
    }

    pub fn summary(&self) -> ValidationSummary {
        let applied = |stage| self.outcome(stage).map_or(false, StageOutcome::applied);
        ValidationSummary {
            bounds_validated: applied(Stage::Bounds),
            confidence_capped: applied(Stage::ConfidenceCap),
            correlations_checked: applied(Stage::CorrelationAdjustment),
            rate_limited: applied(Stage::RateLimit),
            fallback_applied: applied(Stage::Fallback),
            stages: self.stages.clone(),
        }
    }
}

/// Adjustment applied to `parameter` when `partner` is in the same batch
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CorrelationRule {
    pub parameter: &'static str,
    pub partner: &'static str,
    pub factor: f64,
}

/// Known interacting parameters.
///
/// Risk and size move inversely, so each damps the other. A wider take-profit
/// justifies a wider stop, so stop-loss is nudged up when both are present.
pub const CORRELATION_RULES: &[CorrelationRule] = &[
    CorrelationRule { parameter: RISK_PER_TRADE, partner: POSITION_SIZE, factor: 0.95 },
    CorrelationRule { parameter: RISK_PER_TRADE, partner: STOP_LOSS_PERCENTAGE, factor: 1.0 },
    CorrelationRule { parameter: POSITION_SIZE, partner: RISK_PER_TRADE, factor: 0.95 },
    CorrelationRule { parameter: POSITION_SIZE, partner: TAKE_PROFIT_PERCENTAGE, factor: 1.0 },
    CorrelationRule { parameter: STOP_LOSS_PERCENTAGE, partner: RISK_PER_TRADE, factor: 1.0 },
    CorrelationRule { parameter: STOP_LOSS_PERCENTAGE, partner: TAKE_PROFIT_PERCENTAGE, factor: 1.05 },
];

/// What a stage produced for the batch
#[derive(Debug)]
struct StageResult {
    recommendations: Vec<Recommendation>,
    modified: usize,
    item_errors: Vec<ItemError>,
}

impl StageResult {
    fn with_capacity(n: usize) -> Self {
        Self {
            recommendations: Vec::with_capacity(n),
            modified: 0,
            item_errors: Vec::new(),
        }
    }

    fn keep(&mut self, rec: Recommendation) {
        self.recommendations.push(rec);
    }

    fn changed(&mut self, rec: Recommendation) {
        self.modified += 1;
        self.recommendations.push(rec);
    }

    fn skip(&mut self, rec: Recommendation, error: ItemError) {
        tracing::error!("Skipping recommendation: {}", error);
        self.item_errors.push(error);
        self.recommendations.push(rec);
    }
}

pub struct ValidationPipeline<'a> {
    config: &'a ValidationConfig,
    catalog: &'a ParameterBoundsCatalog,
    history: &'a ParameterHistory,
    rules: &'a [CorrelationRule],
}

impl<'a> ValidationPipeline<'a> {
    pub fn new(
        config: &'a ValidationConfig,
        catalog: &'a ParameterBoundsCatalog,
        history: &'a ParameterHistory,
    ) -> Self {
        Self {
            config,
            catalog,
            history,
            rules: CORRELATION_RULES,
        }
    }

    /// Use a different correlation table
    pub fn with_rules(mut self, rules: &'a [CorrelationRule]) -> Self {
        self.rules = rules;
        self
    }

    /// Run every enabled stage in order
    pub fn run(&self, recommendations: Vec<Recommendation>) -> PipelineRun {
        let mut current = recommendations;
        let mut stages = Vec::with_capacity(Stage::ORDER.len());

        for stage in Stage::ORDER {
            if !self.config.is_enabled(stage) {
                stages.push(StageOutcome {
                    stage,
                    status: StageStatus::Skipped,
                    item_errors: Vec::new(),
                });
                continue;
            }

            match self.apply(stage, &current) {
                Ok(result) => {
                    tracing::debug!(
                        "Stage {}: {} of {} modified",
                        stage.name(),
                        result.modified,
                        result.recommendations.len()
                    );
                    current = result.recommendations;
                    stages.push(StageOutcome {
                        stage,
                        status: StageStatus::Applied {
                            modified: result.modified,
                        },
                        item_errors: result.item_errors,
                    });
                }
                Err(e) => {
                    tracing::error!("Stage {} failed, passing batch through: {}", stage.name(), e);
                    stages.push(StageOutcome {
                        stage,
                        status: StageStatus::Failed {
                            reason: e.to_string(),
                        },
                        item_errors: Vec::new(),
                    });
                }
            }
        }

        PipelineRun {
            recommendations: current,
            stages,
        }
    }

    fn apply(&self, stage: Stage, recs: &[Recommendation]) -> Result<StageResult, StageError> {
        match stage {
            Stage::Bounds => Ok(self.validate_bounds(recs)),
            Stage::ConfidenceCap => self.cap_confidence(recs),
            Stage::CorrelationAdjustment => self.adjust_correlations(recs),
            Stage::RateLimit => self.limit_rate(recs),
            Stage::Fallback => self.substitute_fallbacks(recs),
        }
    }

    fn validate_bounds(&self, recs: &[Recommendation]) -> StageResult {
        let mut result = StageResult::with_capacity(recs.len());

        for rec in recs {
            let mut rec = rec.clone();
            let value = rec.recommended_value;
            if !value.is_finite() {
                let parameter = rec.parameter_name.clone();
                result.skip(rec, ItemError::NonFiniteValue { parameter, value });
                continue;
            }

            let check = self.catalog.check(&rec.parameter_name, value, true);
            rec.validation_status = check.status;

            match check.corrected_value.filter(|_| !check.is_valid) {
                Some(corrected) => {
                    tracing::debug!("{}: {}", rec.parameter_name, check.message);
                    rec.original_value = Some(value);
                    rec.recommended_value = corrected;
                    rec.correction_applied = true;
                    result.changed(rec);
                }
                None => result.keep(rec),
            }
        }

        result
    }

    fn cap_confidence(&self, recs: &[Recommendation]) -> Result<StageResult, StageError> {
        let cap = self.config.confidence_cap_threshold;
        if !(cap > 0.0 && cap <= 1.0) {
            return Err(StageError::InvalidThreshold {
                name: "confidence_cap_threshold",
                value: cap,
                expected: "in (0, 1]",
            });
        }

        let mut result = StageResult::with_capacity(recs.len());
        for rec in recs {
            if rec.confidence > cap {
                let mut rec = rec.clone();
                rec.original_confidence = Some(rec.confidence);
                rec.confidence = cap;
                rec.confidence_capped = true;
                result.changed(rec);
            } else {
                result.keep(rec.clone());
            }
        }
        Ok(result)
    }

    fn adjust_correlations(&self, recs: &[Recommendation]) -> Result<StageResult, StageError> {
        if let Some(rule) = self.rules.iter().find(|r| !(r.factor.is_finite() && r.factor > 0.0)) {
            return Err(StageError::InvalidRule {
                parameter: rule.parameter,
                partner: rule.partner,
                factor: rule.factor,
            });
        }

        let present: BTreeSet<&str> = recs.iter().map(|r| r.parameter_name.as_str()).collect();
        let mut result = StageResult::with_capacity(recs.len());

        for rec in recs {
            let factor: f64 = self
                .rules
                .iter()
                .filter(|r| r.parameter == rec.parameter_name && present.contains(r.partner))
                .map(|r| r.factor)
                .product();

            if (factor - 1.0).abs() <= FACTOR_EPSILON {
                result.keep(rec.clone());
                continue;
            }

            let mut rec = rec.clone();
            let value = rec.recommended_value;
            if !value.is_finite() {
                let parameter = rec.parameter_name.clone();
                result.skip(rec, ItemError::NonFiniteValue { parameter, value });
                continue;
            }

            rec.recommended_value = value * factor;
            rec.correlation_adjusted = true;
            rec.correlation_adjustment_factor = Some(factor);
            result.changed(rec);
        }

        Ok(result)
    }

    fn limit_rate(&self, recs: &[Recommendation]) -> Result<StageResult, StageError> {
        let max_rate = self.config.max_parameter_change_rate;
        if !(max_rate > 0.0 && max_rate.is_finite()) {
            return Err(StageError::InvalidThreshold {
                name: "max_parameter_change_rate",
                value: max_rate,
                expected: "a positive number",
            });
        }

        let mut result = StageResult::with_capacity(recs.len());
        for rec in recs {
            let Some(previous) = self.history.previous_value(&rec.parameter_name) else {
                result.keep(rec.clone());
                continue;
            };

            let rec = rec.clone();
            let parameter = rec.parameter_name.clone();
            if !(previous > 0.0 && previous.is_finite()) {
                result.skip(rec, ItemError::UnusablePrevious { parameter, previous });
                continue;
            }
            let value = rec.recommended_value;
            if !value.is_finite() {
                result.skip(rec, ItemError::NonFiniteValue { parameter, value });
                continue;
            }

            let change_rate = (value - previous).abs() / previous;
            if change_rate <= max_rate {
                result.keep(rec);
                continue;
            }

            let limit = previous * max_rate;
            let clamped = if value > previous { previous + limit } else { previous - limit };
            tracing::debug!(
                "{}: change {:.1}% exceeds {:.1}%, clamped {} -> {}",
                parameter,
                change_rate * 100.0,
                max_rate * 100.0,
                value,
                clamped
            );

            let mut rec = rec;
            rec.unclamped_value = Some(value);
            rec.previous_value = Some(previous);
            rec.recommended_value = clamped;
            rec.rate_limited = true;
            result.changed(rec);
        }

        Ok(result)
    }

    fn substitute_fallbacks(&self, recs: &[Recommendation]) -> Result<StageResult, StageError> {
        let threshold = self.config.fallback_confidence_threshold;
        if !(0.0..=1.0).contains(&threshold) {
            return Err(StageError::InvalidThreshold {
                name: "fallback_confidence_threshold",
                value: threshold,
                expected: "in [0, 1]",
            });
        }

        let mut result = StageResult::with_capacity(recs.len());
        for rec in recs {
            if !rec.needs_fallback(threshold) {
                result.keep(rec.clone());
                continue;
            }

            match self.catalog.get(&rec.parameter_name) {
                Some(bound) => {
                    tracing::warn!(
                        "Falling back to default for {} (status {}, confidence {:.2})",
                        rec.parameter_name,
                        rec.validation_status.as_str(),
                        rec.confidence
                    );
                    result.changed(Recommendation::fallback_for(rec.clone(), bound.default));
                }
                None => {
                    let parameter = rec.parameter_name.clone();
                    result.skip(rec.clone(), ItemError::MissingDefault { parameter });
                }
            }
        }

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::bounds::RSI_PERIOD;
    use crate::domain::history::HistoryEntry;
    use crate::domain::recommendation::{RecommendationSource, ValidationStatus};
    use crate::domain::trade::{PerformanceInsights, PerformanceMetrics};
    use approx::assert_relative_eq;
    use chrono::Utc;

    fn create_test_rec(name: &str, value: f64, confidence: f64) -> Recommendation {
        Recommendation::new(name, value, confidence, RecommendationSource::Model, "test")
    }

    fn create_history(values: &[(&str, f64)]) -> ParameterHistory {
        let mut history = ParameterHistory::new();
        history.push(HistoryEntry {
            timestamp: Utc::now(),
            recommendations: values
                .iter()
                .map(|(name, value)| create_test_rec(name, *value, 0.6))
                .collect(),
            performance_insights: PerformanceInsights {
                total_trades: 10,
                metrics: PerformanceMetrics::default(),
                trade_duration: None,
                volume: None,
            },
            performance_score: 0.4,
        });
        history
    }

    fn run_with(config: &ValidationConfig, history: &ParameterHistory, recs: Vec<Recommendation>) -> PipelineRun {
        let catalog = ParameterBoundsCatalog::builtin();
        ValidationPipeline::new(config, &catalog, history).run(recs)
    }

    #[test]
    fn test_bounds_violation_corrected() {
        let config = ValidationConfig::only(Stage::Bounds);
        let run = run_with(&config, &ParameterHistory::new(), vec![create_test_rec(RISK_PER_TRADE, 0.15, 0.8)]);

        let rec = &run.recommendations[0];
        assert_eq!(rec.validation_status, ValidationStatus::BoundsViolation);
        assert_eq!(rec.recommended_value, 0.1);
        assert_eq!(rec.original_value, Some(0.15));
        assert!(rec.correction_applied);
        assert_eq!(
            run.outcome(Stage::Bounds).unwrap().status,
            StageStatus::Applied { modified: 1 }
        );
    }

    #[test]
    fn test_valid_value_untouched() {
        let config = ValidationConfig::only(Stage::Bounds);
        let run = run_with(&config, &ParameterHistory::new(), vec![create_test_rec(RISK_PER_TRADE, 0.03, 0.8)]);

        let rec = &run.recommendations[0];
        assert_eq!(rec.validation_status, ValidationStatus::Valid);
        assert_eq!(rec.recommended_value, 0.03);
        assert!(!rec.correction_applied);
    }

    #[test]
    fn test_confidence_cap() {
        let config = ValidationConfig::only(Stage::ConfidenceCap);
        let run = run_with(
            &config,
            &ParameterHistory::new(),
            vec![create_test_rec(RISK_PER_TRADE, 0.02, 0.99), create_test_rec(POSITION_SIZE, 1.0, 0.5)],
        );

        assert_eq!(run.recommendations[0].confidence, 0.95);
        assert!(run.recommendations[0].confidence_capped);
        assert_eq!(run.recommendations[0].original_confidence, Some(0.99));
        assert_eq!(run.recommendations[1].confidence, 0.5);
        assert!(!run.recommendations[1].confidence_capped);
    }

    #[test]
    fn test_correlation_adjustment() {
        let config = ValidationConfig::only(Stage::CorrelationAdjustment);
        let run = run_with(
            &config,
            &ParameterHistory::new(),
            vec![
                create_test_rec(RISK_PER_TRADE, 0.02, 0.8),
                create_test_rec(POSITION_SIZE, 1.0, 0.8),
                create_test_rec(STOP_LOSS_PERCENTAGE, 0.05, 0.8),
                create_test_rec(TAKE_PROFIT_PERCENTAGE, 0.1, 0.8),
            ],
        );

        let by_name = |name: &str| run.recommendations.iter().find(|r| r.parameter_name == name).unwrap();

        assert_relative_eq!(by_name(RISK_PER_TRADE).recommended_value, 0.019, epsilon = 1e-12);
        assert_eq!(by_name(RISK_PER_TRADE).correlation_adjustment_factor, Some(0.95));
        assert_relative_eq!(by_name(POSITION_SIZE).recommended_value, 0.95, epsilon = 1e-12);
        assert_relative_eq!(by_name(STOP_LOSS_PERCENTAGE).recommended_value, 0.0525, epsilon = 1e-12);
        assert!(by_name(STOP_LOSS_PERCENTAGE).correlation_adjusted);
        assert!(!by_name(TAKE_PROFIT_PERCENTAGE).correlation_adjusted);
    }

    #[test]
    fn test_correlation_needs_partner() {
        let config = ValidationConfig::only(Stage::CorrelationAdjustment);
        let run = run_with(&config, &ParameterHistory::new(), vec![create_test_rec(RISK_PER_TRADE, 0.02, 0.8)]);

        assert_eq!(run.recommendations[0].recommended_value, 0.02);
        assert!(!run.recommendations[0].correlation_adjusted);
    }

    #[test]
    fn test_rate_limit_up_and_down() {
        let config = ValidationConfig::only(Stage::RateLimit);
        let history = create_history(&[(RISK_PER_TRADE, 0.02), (POSITION_SIZE, 1.0)]);
        let run = run_with(
            &config,
            &history,
            vec![create_test_rec(RISK_PER_TRADE, 0.05, 0.8), create_test_rec(POSITION_SIZE, 0.2, 0.8)],
        );

        let risk = &run.recommendations[0];
        assert_relative_eq!(risk.recommended_value, 0.03, epsilon = 1e-12);
        assert!(risk.rate_limited);
        assert_eq!(risk.unclamped_value, Some(0.05));
        assert_eq!(risk.previous_value, Some(0.02));

        let size = &run.recommendations[1];
        assert_relative_eq!(size.recommended_value, 0.5);
        assert!(size.rate_limited);
    }

    #[test]
    fn test_rate_limit_within_limit_and_unknown_history() {
        let config = ValidationConfig::only(Stage::RateLimit);
        let history = create_history(&[(RISK_PER_TRADE, 0.02)]);
        let run = run_with(
            &config,
            &history,
            vec![create_test_rec(RISK_PER_TRADE, 0.025, 0.8), create_test_rec(POSITION_SIZE, 1.9, 0.8)],
        );

        assert_eq!(run.recommendations[0].recommended_value, 0.025);
        assert!(!run.recommendations[0].rate_limited);
        assert_eq!(run.recommendations[1].recommended_value, 1.9);
    }

    #[test]
    fn test_rate_limit_zero_previous_is_item_error() {
        let config = ValidationConfig::only(Stage::RateLimit);
        let history = create_history(&[(RISK_PER_TRADE, 0.0)]);
        let run = run_with(&config, &history, vec![create_test_rec(RISK_PER_TRADE, 0.05, 0.8)]);

        assert_eq!(run.recommendations[0].recommended_value, 0.05);
        let outcome = run.outcome(Stage::RateLimit).unwrap();
        assert_eq!(outcome.status, StageStatus::Applied { modified: 0 });
        assert!(matches!(outcome.item_errors[0], ItemError::UnusablePrevious { .. }));
    }

    #[test]
    fn test_fallback_replaces_unusable() {
        let config = ValidationConfig::only(Stage::Fallback);
        let mut low = create_test_rec(RISK_PER_TRADE, 0.03, 0.1);
        low.validation_status = ValidationStatus::Valid;
        let mut good = create_test_rec(POSITION_SIZE, 1.2, 0.8);
        good.validation_status = ValidationStatus::Valid;
        let pending = create_test_rec(RSI_PERIOD, 15.0, 0.9);

        let run = run_with(&config, &ParameterHistory::new(), vec![low.clone(), good.clone(), pending]);

        let fallback = &run.recommendations[0];
        assert!(fallback.is_fallback);
        assert_eq!(fallback.recommended_value, 0.02);
        assert_eq!(fallback.confidence, 0.5);
        assert_eq!(fallback.validation_status, ValidationStatus::Valid);
        assert_eq!(fallback.original_recommendation.as_deref(), Some(&low));

        assert_eq!(run.recommendations[1], good);
        assert_eq!(run.recommendations[2].recommended_value, 14.0);
    }

    #[test]
    fn test_fallback_unknown_parameter_is_item_error() {
        let config = ValidationConfig::default();
        let run = run_with(&config, &ParameterHistory::new(), vec![create_test_rec("leverage", 3.0, 0.9)]);

        let rec = &run.recommendations[0];
        assert_eq!(rec.validation_status, ValidationStatus::UnknownParameter);
        assert!(!rec.is_fallback);
        assert_eq!(run.outcome(Stage::Fallback).unwrap().item_errors.len(), 1);
    }

    #[test]
    fn test_disabled_stages_skipped() {
        let config = ValidationConfig::default()
            .with_stage(Stage::Bounds, false)
            .with_stage(Stage::Fallback, false);
        let run = run_with(&config, &ParameterHistory::new(), vec![create_test_rec(RISK_PER_TRADE, 5.0, 0.8)]);

        assert_eq!(run.recommendations[0].recommended_value, 5.0);
        assert_eq!(run.recommendations[0].validation_status, ValidationStatus::Pending);
        assert_eq!(run.outcome(Stage::Bounds).unwrap().status, StageStatus::Skipped);

        let summary = run.summary();
        assert!(!summary.bounds_validated);
        assert!(summary.confidence_capped);
        assert!(!summary.fallback_applied);
    }

    #[test]
    fn test_failed_stage_is_no_op() {
        let config = ValidationConfig::only(Stage::ConfidenceCap).with_confidence_cap(1.5);
        let run = run_with(&config, &ParameterHistory::new(), vec![create_test_rec(RISK_PER_TRADE, 0.02, 0.99)]);

        assert_eq!(run.recommendations[0].confidence, 0.99);
        assert!(matches!(
            run.outcome(Stage::ConfidenceCap).unwrap().status,
            StageStatus::Failed { .. }
        ));
    }

    #[test]
    fn test_invalid_rule_fails_stage() {
        let rules = [CorrelationRule { parameter: RISK_PER_TRADE, partner: POSITION_SIZE, factor: f64::NAN }];
        let config = ValidationConfig::only(Stage::CorrelationAdjustment);
        let catalog = ParameterBoundsCatalog::builtin();
        let history = ParameterHistory::new();

        let run = ValidationPipeline::new(&config, &catalog, &history)
            .with_rules(&rules)
            .run(vec![create_test_rec(RISK_PER_TRADE, 0.02, 0.8), create_test_rec(POSITION_SIZE, 1.0, 0.8)]);

        assert_eq!(run.recommendations[0].recommended_value, 0.02);
        assert!(matches!(
            run.outcome(Stage::CorrelationAdjustment).unwrap().status,
            StageStatus::Failed { .. }
        ));
    }

    #[test]
    fn test_non_finite_value_skipped_by_bounds() {
        let config = ValidationConfig::default();
        let run = run_with(&config, &ParameterHistory::new(), vec![create_test_rec(RISK_PER_TRADE, f64::NAN, 0.8)]);

        let bounds = run.outcome(Stage::Bounds).unwrap();
        assert!(matches!(bounds.item_errors[0], ItemError::NonFiniteValue { .. }));
        // Still pending, so the fallback stage replaces it
        assert!(run.recommendations[0].is_fallback);
        assert_eq!(run.recommendations[0].recommended_value, 0.02);
    }

    #[test]
    fn test_full_pipeline_order() {
        let config = ValidationConfig::default();
        let history = create_history(&[(RISK_PER_TRADE, 0.02)]);
        let run = run_with(
            &config,
            &history,
            vec![
                create_test_rec(RISK_PER_TRADE, 0.03, 0.99),
                create_test_rec(POSITION_SIZE, 1.2, 0.8),
            ],
        );

        // 0.03 passes bounds, 0.95 cap, x0.95 -> 0.0285, within 50% of 0.02
        let risk = &run.recommendations[0];
        assert_eq!(risk.validation_status, ValidationStatus::Valid);
        assert_eq!(risk.confidence, 0.95);
        assert_relative_eq!(risk.recommended_value, 0.0285, epsilon = 1e-12);
        assert!(!risk.is_fallback);

        let size = &run.recommendations[1];
        assert_relative_eq!(size.recommended_value, 1.14, epsilon = 1e-12);
        assert_eq!(run.stages.len(), 5);
    }
}
