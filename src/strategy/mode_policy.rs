//! Mode Policy
//!
//! Scales baseline parameters by the trading mode and, optionally, by the
//! current volatility level. Produces pending recommendations that still have
//! to pass the validation pipeline.

use serde::{Deserialize, Serialize};

use crate::domain::bounds::{
    ParameterBound, ParameterBoundsCatalog, POSITION_SIZE, RISK_PER_TRADE, STOP_LOSS_PERCENTAGE,
    TAKE_PROFIT_PERCENTAGE,
};
use crate::domain::mode::{TradingMode, VolatilityLevel};
use crate::domain::recommendation::{Recommendation, RecommendationSource};

/// Which multiplier table a deployment uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModeFactorTable {
    #[default]
    Primary,
    Alternate,
}

/// Risk and position multipliers for one mode
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModeFactors {
    pub risk_factor: f64,
    pub position_factor: f64,
}

impl ModeFactors {
    const fn new(risk_factor: f64, position_factor: f64) -> Self {
        Self {
            risk_factor,
            position_factor,
        }
    }

    fn scaled(self, by: ModeFactors) -> Self {
        Self::new(self.risk_factor * by.risk_factor, self.position_factor * by.position_factor)
    }
}

impl ModeFactorTable {
    pub fn base_factors(&self, mode: TradingMode) -> ModeFactors {
        match (self, mode) {
            (ModeFactorTable::Primary, TradingMode::Conservative) => ModeFactors::new(0.5, 0.7),
            (ModeFactorTable::Primary, TradingMode::Balanced) => ModeFactors::new(1.0, 1.0),
            (ModeFactorTable::Primary, TradingMode::Aggressive) => ModeFactors::new(1.5, 1.3),
            (ModeFactorTable::Alternate, TradingMode::Conservative) => ModeFactors::new(0.7, 0.8),
            (ModeFactorTable::Alternate, TradingMode::Balanced) => ModeFactors::new(1.0, 1.0),
            (ModeFactorTable::Alternate, TradingMode::Aggressive) => ModeFactors::new(1.3, 1.2),
        }
    }

    pub fn volatility_multipliers(&self, level: VolatilityLevel) -> ModeFactors {
        match (self, level) {
            (_, VolatilityLevel::Medium) => ModeFactors::new(1.0, 1.0),
            (ModeFactorTable::Primary, VolatilityLevel::High) => ModeFactors::new(0.7, 0.8),
            (ModeFactorTable::Primary, VolatilityLevel::Low) => ModeFactors::new(1.2, 1.1),
            (ModeFactorTable::Alternate, VolatilityLevel::High) => ModeFactors::new(0.8, 0.9),
            (ModeFactorTable::Alternate, VolatilityLevel::Low) => ModeFactors::new(1.1, 1.05),
        }
    }

    /// Mode factors, further scaled by volatility when it is known
    pub fn factors(&self, mode: TradingMode, volatility: Option<VolatilityLevel>) -> ModeFactors {
        let base = self.base_factors(mode);
        match volatility {
            Some(level) => base.scaled(self.volatility_multipliers(level)),
            None => base,
        }
    }
}

/// (parameter, uses position factor, confidence, decimals)
const MODE_PARAMETERS: [(&str, bool, f64, i32); 4] = [
    (RISK_PER_TRADE, false, 0.8, 4),
    (POSITION_SIZE, true, 0.7, 2),
    (STOP_LOSS_PERCENTAGE, false, 0.8, 4),
    (TAKE_PROFIT_PERCENTAGE, false, 0.7, 4),
];

pub struct ModePolicy {
    table: ModeFactorTable,
}

impl ModePolicy {
    pub fn new(table: ModeFactorTable) -> Self {
        Self { table }
    }

    pub fn table(&self) -> ModeFactorTable {
        self.table
    }

    /// Baseline recommendations for a mode.
    ///
    /// Catalog defaults are multiplied by the mode factors, snapped onto the
    /// parameter's step grid and rounded. Parameters missing from the catalog
    /// are left out.
    pub fn recommendations(
        &self,
        catalog: &ParameterBoundsCatalog,
        mode: TradingMode,
        volatility: Option<VolatilityLevel>,
    ) -> Vec<Recommendation> {
        let factors = self.table.factors(mode, volatility);

        MODE_PARAMETERS
            .iter()
            .filter_map(|&(name, uses_position, confidence, decimals)| {
                let bound = catalog.get(name)?;
                let factor = if uses_position {
                    factors.position_factor
                } else {
                    factors.risk_factor
                };
                let value = round_to(snap_to_grid(bound, bound.default * factor), decimals);

                Some(Recommendation::new(
                    name,
                    value,
                    confidence,
                    RecommendationSource::Model,
                    format!(
                        "{} mode baseline (factor {:.3}{})",
                        mode,
                        factor,
                        volatility.map_or(String::new(), |v| format!(", {:?} volatility", v))
                    ),
                ))
            })
            .collect()
    }
}

/// Nearest whole number of steps from the default, kept inside the bounds
fn snap_to_grid(bound: &ParameterBound, value: f64) -> f64 {
    match bound.step.filter(|step| *step > 0.0) {
        Some(step) => bound.clamp(bound.default + ((value - bound.default) / step).round() * step),
        None => bound.clamp(value),
    }
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let scale = 10f64.powi(decimals);
    (value * scale).round() / scale
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::bounds::is_step_aligned;
    use crate::domain::history::ParameterHistory;
    use crate::domain::recommendation::ValidationStatus;
    use crate::strategy::params::ValidationConfig;
    use crate::strategy::validation::ValidationPipeline;
    use approx::assert_relative_eq;

    #[test]
    fn test_factor_tables() {
        let primary = ModeFactorTable::Primary;
        assert_eq!(primary.base_factors(TradingMode::Conservative), ModeFactors::new(0.5, 0.7));
        assert_eq!(primary.base_factors(TradingMode::Aggressive), ModeFactors::new(1.5, 1.3));

        let alternate = ModeFactorTable::Alternate;
        assert_eq!(alternate.base_factors(TradingMode::Conservative), ModeFactors::new(0.7, 0.8));
        assert_eq!(alternate.base_factors(TradingMode::Balanced), ModeFactors::new(1.0, 1.0));
    }

    #[test]
    fn test_volatility_scaling() {
        let factors = ModeFactorTable::Primary.factors(TradingMode::Aggressive, Some(VolatilityLevel::High));
        assert_relative_eq!(factors.risk_factor, 1.05, epsilon = 1e-12);
        assert_relative_eq!(factors.position_factor, 1.04, epsilon = 1e-12);

        let factors = ModeFactorTable::Alternate.factors(TradingMode::Balanced, Some(VolatilityLevel::Low));
        assert_relative_eq!(factors.risk_factor, 1.1, epsilon = 1e-12);
        assert_relative_eq!(factors.position_factor, 1.05, epsilon = 1e-12);

        assert_eq!(
            ModeFactorTable::Primary.factors(TradingMode::Balanced, Some(VolatilityLevel::Medium)),
            ModeFactorTable::Primary.factors(TradingMode::Balanced, None)
        );
    }

    #[test]
    fn test_balanced_matches_defaults() {
        let catalog = ParameterBoundsCatalog::builtin();
        let recs = ModePolicy::new(ModeFactorTable::Primary).recommendations(&catalog, TradingMode::Balanced, None);

        assert_eq!(recs.len(), 4);
        for rec in &recs {
            assert_eq!(rec.recommended_value, catalog.get(&rec.parameter_name).unwrap().default);
        }
    }

    #[test]
    fn test_conservative_values() {
        let catalog = ParameterBoundsCatalog::builtin();
        let recs = ModePolicy::new(ModeFactorTable::Primary).recommendations(&catalog, TradingMode::Conservative, None);

        let risk = recs.iter().find(|r| r.parameter_name == RISK_PER_TRADE).unwrap();
        assert_eq!(risk.recommended_value, 0.01);
        assert_eq!(risk.confidence, 0.8);

        let size = recs.iter().find(|r| r.parameter_name == POSITION_SIZE).unwrap();
        assert_eq!(size.recommended_value, 0.7);
        assert_eq!(size.confidence, 0.7);
    }

    #[test]
    fn test_every_mode_survives_validation() {
        let catalog = ParameterBoundsCatalog::builtin();
        let history = ParameterHistory::new();
        let config = ValidationConfig::default();

        for table in [ModeFactorTable::Primary, ModeFactorTable::Alternate] {
            for mode in [TradingMode::Conservative, TradingMode::Balanced, TradingMode::Aggressive] {
                for volatility in [None, Some(VolatilityLevel::Low), Some(VolatilityLevel::High)] {
                    let recs = ModePolicy::new(table).recommendations(&catalog, mode, volatility);
                    for rec in &recs {
                        let bound = catalog.get(&rec.parameter_name).unwrap();
                        assert!(is_step_aligned(rec.recommended_value, bound.default, bound.step.unwrap()));
                    }

                    let run = ValidationPipeline::new(&config, &catalog, &history).run(recs);
                    for rec in &run.recommendations {
                        assert_eq!(rec.validation_status, ValidationStatus::Valid, "{:?} {:?}", table, mode);
                        assert!(!rec.is_fallback);
                    }
                }
            }
        }
    }

    #[test]
    fn test_missing_parameters_skipped() {
        let catalog = ParameterBoundsCatalog::from_bounds(Default::default());
        let recs = ModePolicy::new(ModeFactorTable::Primary).recommendations(&catalog, TradingMode::Aggressive, None);
        assert!(recs.is_empty());
    }

    #[test]
    fn test_table_serde() {
        let table: ModeFactorTable = serde_json::from_str("\"alternate\"").unwrap();
        assert_eq!(table, ModeFactorTable::Alternate);
        assert_eq!(ModeFactorTable::default(), ModeFactorTable::Primary);
    }
}
