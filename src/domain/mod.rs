//! Domain Layer - Core types and math for parameter adjustment
//!
//! Pure types and statistics with no I/O beyond the learning-state file.
//! External interactions happen through the ports layer.
//!
//! - `bounds`: Parameter bounds catalog and single-value checks
//! - `recommendation`: Recommendations and their validation annotations
//! - `observations`: Historical observation tables
//! - `correlation`: Per-parameter correlation state
//! - `history`: Bounded history of feedback cycles
//! - `trade`: Closed trades, metrics and performance scores
//! - `mode`: Trading modes and volatility levels
//! - `state_persistence`: Learning state and model snapshots on disk

pub mod bounds;
pub mod recommendation;
pub mod observations;
pub mod correlation;
pub mod history;
pub mod trade;
pub mod mode;
pub mod state_persistence;

pub use bounds::{BoundsCheck, ParameterBound, ParameterBoundsCatalog, SafetyLevel};
pub use recommendation::{Recommendation, RecommendationSource, ValidationStatus, FALLBACK_CONFIDENCE};
pub use observations::{ObservationError, ObservationTable};
pub use correlation::{CorrelationModel, CorrelationState, DataQuality, OptimalRange, TrainingSummary};
pub use history::{HistoryEntry, ParameterHistory, MAX_HISTORY_ENTRIES};
pub use trade::{ClosedTrade, PerformanceInsights, PerformanceMetrics, TradeStatistics};
pub use mode::{TradingMode, VolatilityLevel};
pub use state_persistence::{LearningState, ModelSnapshot, PersistError, RecoveryStatus};
