//! Correlation Model
//!
//! Descriptive statistics per parameter: how strongly a parameter's column
//! moves with the outcome column, where the best outcomes cluster, and how
//! trustworthy the underlying data is. There is no fitting here; "training"
//! means recomputing these numbers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use std::collections::BTreeMap;
use thiserror::Error;

use super::bounds::ParameterBoundsCatalog;
use super::observations::{ObservationError, ObservationTable};

/// Correlations weaker than this produce no optimal range
pub const ACTIONABLE_CORRELATION: f64 = 0.1;

/// Lower clamp for the adaptation factor
pub const MIN_ADAPTATION_FACTOR: f64 = 0.5;

/// Upper clamp for the adaptation factor
pub const MAX_ADAPTATION_FACTOR: f64 = 2.0;

/// Weight of completeness in the quality score
const COMPLETENESS_WEIGHT: f64 = 0.7;

/// Variance at which the variance score saturates
const VARIANCE_SATURATION: f64 = 10.0;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CorrelationError {
    #[error("Column for {0} has zero variance")]
    ZeroVariance(String),

    #[error("{parameter} has {points} data points, need {required}")]
    InsufficientData {
        parameter: String,
        points: usize,
        required: usize,
    },

    #[error("Correlation for {0} is not finite")]
    NotFinite(String),
}

/// Interquartile band of a parameter within its best-outcome rows
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OptimalRange {
    pub lower: f64,
    pub upper: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DataQuality {
    pub quality_score: f64,
    pub missing_data_ratio: f64,
    pub variance_score: f64,
    pub data_points: usize,
}

impl DataQuality {
    /// Score a raw column (NaN = missing) and its filled counterpart
    pub fn assess(raw: &[f64], filled: &[f64]) -> Self {
        let data_points = raw.len();
        let missing = raw.iter().filter(|v| v.is_nan()).count();
        let missing_data_ratio = if data_points == 0 {
            1.0
        } else {
            missing as f64 / data_points as f64
        };

        let variance = filled.iter().variance();
        let variance_score = if variance.is_finite() {
            (variance / VARIANCE_SATURATION).min(1.0)
        } else {
            0.0
        };

        Self {
            quality_score: (1.0 - missing_data_ratio) * COMPLETENESS_WEIGHT
                + variance_score * (1.0 - COMPLETENESS_WEIGHT),
            missing_data_ratio,
            variance_score,
            data_points,
        }
    }
}

/// Learned statistics for one parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelationState {
    pub correlation: f64,
    /// Absolute correlation
    pub performance_impact: f64,
    pub optimal_range: Option<OptimalRange>,
    pub data_quality: DataQuality,
    /// Multiplicative feedback factor, kept in [0.5, 2.0]
    pub adaptation_factor: f64,
    pub last_updated: DateTime<Utc>,
}

impl CorrelationState {
    /// Multiply the adaptation factor and clamp it
    pub fn adapt(&mut self, multiplier: f64, now: DateTime<Utc>) {
        self.adaptation_factor =
            (self.adaptation_factor * multiplier).clamp(MIN_ADAPTATION_FACTOR, MAX_ADAPTATION_FACTOR);
        self.last_updated = now;
    }
}

/// Parameters that trained and those that were skipped, with reasons
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TrainingSummary {
    pub trained: Vec<String>,
    pub skipped: BTreeMap<String, String>,
}

/// Per-parameter correlation state, keyed by parameter name
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationModel {
    states: BTreeMap<String, CorrelationState>,
}

impl CorrelationModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&CorrelationState> {
        self.states.get(name)
    }

    pub fn insert(&mut self, name: impl Into<String>, state: CorrelationState) {
        self.states.insert(name.into(), state);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &CorrelationState)> {
        self.states.iter()
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Compute fresh state for every catalog parameter present in `table`.
    ///
    /// Fails only on input-shape problems. Individual parameters that cannot
    /// be scored are logged and listed in the summary.
    pub fn train(
        table: &ObservationTable,
        target: &str,
        catalog: &ParameterBoundsCatalog,
        min_data_points: usize,
        now: DateTime<Utc>,
    ) -> Result<(Self, TrainingSummary), ObservationError> {
        if table.is_empty() {
            return Err(ObservationError::EmptyData);
        }
        let filled = table.fill_missing();
        let target_values = filled
            .column(target)
            .ok_or_else(|| ObservationError::MissingColumn(target.to_string()))?;

        let mut model = Self::new();
        let mut summary = TrainingSummary::default();

        for name in catalog.names() {
            let (Some(raw), Some(values)) = (table.column(name), filled.column(name)) else {
                continue;
            };

            match score_parameter(name, raw, values, target_values, min_data_points, now) {
                Ok(state) => {
                    tracing::debug!(
                        "{}: correlation {:.4}, range {:?}",
                        name,
                        state.correlation,
                        state.optimal_range
                    );
                    model.insert(name, state);
                    summary.trained.push(name.to_string());
                }
                Err(e) => {
                    tracing::error!("Skipping {} during training: {}", name, e);
                    summary.skipped.insert(name.to_string(), e.to_string());
                }
            }
        }

        Ok((model, summary))
    }

    /// Performance impacts normalised to sum to 1
    pub fn feature_importance(&self) -> BTreeMap<String, f64> {
        let total: f64 = self.states.values().map(|s| s.performance_impact).sum();
        if total <= 0.0 {
            return BTreeMap::new();
        }

        self.states
            .iter()
            .map(|(name, state)| (name.clone(), state.performance_impact / total))
            .collect()
    }

    /// Apply one feedback multiplier to every adaptation factor
    pub fn adapt_all(&mut self, multiplier: f64, now: DateTime<Utc>) {
        for state in self.states.values_mut() {
            state.adapt(multiplier, now);
        }
    }
}

fn score_parameter(
    name: &str,
    raw: &[f64],
    values: &[f64],
    target: &[f64],
    min_data_points: usize,
    now: DateTime<Utc>,
) -> Result<CorrelationState, CorrelationError> {
    let points = raw.iter().filter(|v| !v.is_nan()).count();
    if points < min_data_points.max(2) {
        return Err(CorrelationError::InsufficientData {
            parameter: name.to_string(),
            points,
            required: min_data_points.max(2),
        });
    }

    let correlation = pearson(values, target).ok_or_else(|| CorrelationError::ZeroVariance(name.to_string()))?;
    if !correlation.is_finite() {
        return Err(CorrelationError::NotFinite(name.to_string()));
    }

    let performance_impact = correlation.abs();
    let optimal_range = if performance_impact >= ACTIONABLE_CORRELATION {
        optimal_range(values, target, correlation)
    } else {
        None
    };

    Ok(CorrelationState {
        correlation,
        performance_impact,
        optimal_range,
        data_quality: DataQuality::assess(raw, values),
        adaptation_factor: 1.0,
        last_updated: now,
    })
}

/// Sample Pearson correlation. `None` when either side has no spread.
pub fn pearson(x: &[f64], y: &[f64]) -> Option<f64> {
    if x.len() != y.len() || x.len() < 2 {
        return None;
    }

    let sx = x.iter().std_dev();
    let sy = y.iter().std_dev();
    if !(sx > 0.0 && sy > 0.0) {
        return None;
    }

    Some(x.iter().covariance(y.iter()) / (sx * sy))
}

/// Quantile of `values` at `tau` in [0, 1], linear interpolation between
/// the closest ranks (`h = (n - 1) * tau`). NaN for an empty slice.
pub fn quantile(values: &[f64], tau: f64) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let h = (sorted.len() - 1) as f64 * tau.clamp(0.0, 1.0);
    let lo = h.floor() as usize;
    let hi = h.ceil() as usize;
    sorted[lo] + (h - lo as f64) * (sorted[hi] - sorted[lo])
}

/// Interquartile band of `param` within the best quartile of `target`.
///
/// Positive correlation looks at the top quartile, negative at the bottom.
pub fn optimal_range(param: &[f64], target: &[f64], correlation: f64) -> Option<OptimalRange> {
    let subset: Vec<f64> = if correlation > 0.0 {
        let cutoff = quantile(target, 0.75);
        param
            .iter()
            .zip(target)
            .filter(|(_, t)| **t > cutoff)
            .map(|(p, _)| *p)
            .collect()
    } else {
        let cutoff = quantile(target, 0.25);
        param
            .iter()
            .zip(target)
            .filter(|(_, t)| **t < cutoff)
            .map(|(p, _)| *p)
            .collect()
    };

    if subset.is_empty() {
        return None;
    }

    Some(OptimalRange {
        lower: quantile(&subset, 0.25),
        upper: quantile(&subset, 0.75),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::bounds::{POSITION_SIZE, RISK_PER_TRADE};
    use approx::assert_relative_eq;

    fn create_test_table() -> ObservationTable {
        let mut columns = BTreeMap::new();
        // Positively related to the target
        columns.insert(
            RISK_PER_TRADE.to_string(),
            (1..=20).map(|i| i as f64 * 0.005).collect(),
        );
        // Flat, no variance
        columns.insert(POSITION_SIZE.to_string(), vec![1.0; 20]);
        columns.insert("target".to_string(), (1..=20).map(|i| i as f64).collect());
        ObservationTable::from_columns(columns).unwrap()
    }

    #[test]
    fn test_pearson_perfect() {
        let x = [1.0, 2.0, 3.0, 4.0];
        let y = [2.0, 4.0, 6.0, 8.0];
        assert_relative_eq!(pearson(&x, &y).unwrap(), 1.0, epsilon = 1e-12);

        let inverse = [8.0, 6.0, 4.0, 2.0];
        assert_relative_eq!(pearson(&x, &inverse).unwrap(), -1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_quantile_interpolates_between_ranks() {
        let four = [4.0, 1.0, 3.0, 2.0];
        assert_relative_eq!(quantile(&four, 0.25), 1.75, epsilon = 1e-12);
        assert_relative_eq!(quantile(&four, 0.75), 3.25, epsilon = 1e-12);
        assert_relative_eq!(quantile(&four, 0.5), 2.5, epsilon = 1e-12);

        let five = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert_relative_eq!(quantile(&five, 0.75), 4.0, epsilon = 1e-12);
        assert_relative_eq!(quantile(&five, 0.0), 1.0);
        assert_relative_eq!(quantile(&five, 1.0), 5.0);

        assert_eq!(quantile(&[7.0], 0.3), 7.0);
        assert!(quantile(&[], 0.5).is_nan());
    }

    #[test]
    fn test_optimal_range_top_quartile() {
        let param: Vec<f64> = (1..=20).map(|i| i as f64 * 0.005).collect();
        let target: Vec<f64> = (1..=20).map(|i| i as f64).collect();

        // Cutoff 15.25 keeps rows 16..=20, whose risk spans 0.08..=0.1
        let range = optimal_range(&param, &target, 1.0).unwrap();
        assert_relative_eq!(range.lower, 0.085, epsilon = 1e-12);
        assert_relative_eq!(range.upper, 0.095, epsilon = 1e-12);

        // Cutoff 5.75 keeps rows 1..=5
        let range = optimal_range(&param, &target, -1.0).unwrap();
        assert_relative_eq!(range.lower, 0.01, epsilon = 1e-12);
        assert_relative_eq!(range.upper, 0.02, epsilon = 1e-12);
    }

    #[test]
    fn test_pearson_degenerate() {
        assert!(pearson(&[1.0, 1.0, 1.0], &[1.0, 2.0, 3.0]).is_none());
        assert!(pearson(&[1.0], &[1.0]).is_none());
        assert!(pearson(&[1.0, 2.0], &[1.0]).is_none());
    }

    #[test]
    fn test_train_skips_flat_parameter() {
        let table = create_test_table();
        let catalog = ParameterBoundsCatalog::builtin();

        let (model, summary) = CorrelationModel::train(&table, "target", &catalog, 5, Utc::now()).unwrap();

        assert_eq!(model.len(), 1);
        assert!(summary.skipped.contains_key(POSITION_SIZE));

        let state = model.get(RISK_PER_TRADE).unwrap();
        assert_relative_eq!(state.correlation, 1.0, epsilon = 1e-9);
        assert_relative_eq!(state.performance_impact, 1.0, epsilon = 1e-9);
        assert_eq!(state.adaptation_factor, 1.0);

        let range = state.optimal_range.unwrap();
        assert!(range.lower <= range.upper);
        // Top quartile of the target lies in the top quartile of the parameter
        assert!(range.lower > 0.07);
    }

    #[test]
    fn test_train_input_errors() {
        let catalog = ParameterBoundsCatalog::builtin();

        let empty = ObservationTable::default();
        let err = CorrelationModel::train(&empty, "target", &catalog, 5, Utc::now()).unwrap_err();
        assert_eq!(err, ObservationError::EmptyData);

        let err = CorrelationModel::train(&create_test_table(), "pnl", &catalog, 5, Utc::now()).unwrap_err();
        assert_eq!(err, ObservationError::MissingColumn("pnl".to_string()));
    }

    #[test]
    fn test_train_requires_min_points() {
        let mut columns = BTreeMap::new();
        columns.insert(RISK_PER_TRADE.to_string(), vec![0.01, 0.02, 0.03]);
        columns.insert("target".to_string(), vec![1.0, 2.0, 3.0]);
        let table = ObservationTable::from_columns(columns).unwrap();

        let (model, summary) =
            CorrelationModel::train(&table, "target", &ParameterBoundsCatalog::builtin(), 5, Utc::now()).unwrap();
        assert!(model.is_empty());
        assert!(summary.skipped[RISK_PER_TRADE].contains("need 5"));
    }

    #[test]
    fn test_weak_correlation_has_no_range() {
        let param = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0];
        let target = [1.0, -1.0, -1.0, 1.0, 1.0, -1.0, -1.0, 1.0];
        let correlation = pearson(&param, &target).unwrap();
        assert!(correlation.abs() < ACTIONABLE_CORRELATION);

        let mut columns = BTreeMap::new();
        columns.insert(RISK_PER_TRADE.to_string(), param.to_vec());
        columns.insert("target".to_string(), target.to_vec());
        let table = ObservationTable::from_columns(columns).unwrap();

        let (model, _) =
            CorrelationModel::train(&table, "target", &ParameterBoundsCatalog::builtin(), 5, Utc::now()).unwrap();
        assert!(model.get(RISK_PER_TRADE).unwrap().optimal_range.is_none());
    }

    #[test]
    fn test_data_quality() {
        let nan = f64::NAN;
        let raw = [1.0, nan, 3.0, 4.0];
        let filled = [1.0, 1.0, 3.0, 4.0];
        let quality = DataQuality::assess(&raw, &filled);

        assert_relative_eq!(quality.missing_data_ratio, 0.25);
        assert_eq!(quality.data_points, 4);
        assert!(quality.variance_score > 0.0 && quality.variance_score <= 1.0);
        assert_relative_eq!(
            quality.quality_score,
            0.75 * 0.7 + quality.variance_score * 0.3,
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_feature_importance_sums_to_one() {
        let now = Utc::now();
        let mut model = CorrelationModel::new();
        for (name, impact) in [("a", 0.2), ("b", 0.6)] {
            model.insert(
                name,
                CorrelationState {
                    correlation: impact,
                    performance_impact: impact,
                    optimal_range: None,
                    data_quality: DataQuality::assess(&[1.0, 2.0], &[1.0, 2.0]),
                    adaptation_factor: 1.0,
                    last_updated: now,
                },
            );
        }

        let importance = model.feature_importance();
        assert_relative_eq!(importance["a"], 0.25);
        assert_relative_eq!(importance["b"], 0.75);
        assert!(CorrelationModel::new().feature_importance().is_empty());
    }

    #[test]
    fn test_adaptation_factor_clamped() {
        let now = Utc::now();
        let mut state = CorrelationState {
            correlation: 0.5,
            performance_impact: 0.5,
            optimal_range: None,
            data_quality: DataQuality::assess(&[1.0, 2.0], &[1.0, 2.0]),
            adaptation_factor: 1.9,
            last_updated: now,
        };

        state.adapt(1.1, now);
        assert_eq!(state.adaptation_factor, MAX_ADAPTATION_FACTOR);

        for _ in 0..20 {
            state.adapt(0.9, now);
        }
        assert_eq!(state.adaptation_factor, MIN_ADAPTATION_FACTOR);
    }
}
