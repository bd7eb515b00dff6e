//! Strategy Layer - Recommendation generation, validation and adaptation
//!
//! - `params`: Learning, validation and mode configuration
//! - `generator`: Raw recommendations from correlation state
//! - `validation`: Five-stage validation pipeline with per-stage outcomes
//! - `feedback`: Trade-driven adaptation of the model and bounds
//! - `mode_policy`: Mode and volatility scaling of baseline parameters

pub mod params;
pub mod generator;
pub mod validation;
pub mod feedback;
pub mod mode_policy;

pub use params::{LearningConfig, ModeConfig, ParamsError, ValidationConfig};
pub use generator::RecommendationGenerator;
pub use validation::{
    CorrelationRule, ItemError, PipelineRun, Stage, StageError, StageOutcome, StageStatus,
    ValidationPipeline, ValidationSummary, CORRELATION_RULES,
};
pub use feedback::{FeedbackError, FeedbackPlan, PerformanceFeedbackLoop};
pub use mode_policy::{ModeFactorTable, ModeFactors, ModePolicy};
