//! Application Layer - Adjustment cycles and mode switching
//!
//! Orchestrates the domain and strategy layers over the ports.

pub mod adjuster;
pub mod mode_switcher;

pub use adjuster::{
    AdaptiveParameterAdjuster, AdjusterError, AdjustmentReport, EvaluationMetrics, FeedbackReport, ModelInfo,
    ReportStatus, TrainingReport,
};
pub use mode_switcher::{CurrentPerformance, MarketUpdate, ModeSwitchReport, ModeSwitcher, MODE_SWITCH_SOURCE};
