//! Parameter Store Port
//!
//! Where validated recommendations are persisted per market, and where the
//! enabled markets come from.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::bounds::{
    POSITION_SIZE, RISK_PER_TRADE, RSI_PERIOD, SMA_LONG_PERIOD, SMA_SHORT_PERIOD, STOP_LOSS_PERCENTAGE,
    TAKE_PROFIT_PERCENTAGE,
};
use crate::domain::recommendation::Recommendation;

/// Version tag written on every record
pub const MODEL_VERSION: &str = "1.0";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Unknown market: {pair}/{coin}")]
    UnknownMarket { pair: String, coin: String },
}

/// A tradable pair, e.g. "BTCUSDT"
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Pair {
    pub symbol: String,
}

impl Pair {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self { symbol: symbol.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Coin {
    pub symbol: String,
}

impl Coin {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self { symbol: symbol.into() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ParameterType {
    TradingStrategy,
    RiskManagement,
    TechnicalIndicator,
    PortfolioOptimization,
    MarketSentiment,
    VolatilityModel,
    LiquidityAnalysis,
    Custom,
}

impl ParameterType {
    /// Category of a known parameter name; anything else is CUSTOM
    pub fn for_parameter(name: &str) -> Self {
        match name {
            RISK_PER_TRADE | STOP_LOSS_PERCENTAGE | TAKE_PROFIT_PERCENTAGE => ParameterType::RiskManagement,
            POSITION_SIZE => ParameterType::TradingStrategy,
            SMA_SHORT_PERIOD | SMA_LONG_PERIOD | RSI_PERIOD => ParameterType::TechnicalIndicator,
            _ => ParameterType::Custom,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ParameterStatus {
    Active,
    Inactive,
    Testing,
    Deprecated,
}

impl ParameterStatus {
    /// Active and testing records are in effect
    pub fn is_current(&self) -> bool {
        matches!(self, ParameterStatus::Active | ParameterStatus::Testing)
    }
}

/// A recommendation as stored for one market
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterRecord {
    pub pair: String,
    pub coin: String,
    pub parameter_type: ParameterType,
    pub parameter_name: String,
    pub parameter_value: f64,
    pub confidence_score: f64,
    #[serde(default)]
    pub accuracy_score: Option<f64>,
    pub status: ParameterStatus,
    pub description: String,
    /// The full recommendation, serialized
    pub metadata_json: String,
    pub model_version: String,
    pub model_source: String,
    pub recommendation_id: String,
    pub created_at: DateTime<Utc>,
}

impl ParameterRecord {
    /// Wrap a validated recommendation. New records start in TESTING.
    pub fn from_recommendation(
        pair: &Pair,
        coin: &Coin,
        rec: &Recommendation,
        model_source: &str,
        now: DateTime<Utc>,
    ) -> Result<Self, StoreError> {
        Ok(Self {
            pair: pair.symbol.clone(),
            coin: coin.symbol.clone(),
            parameter_type: ParameterType::for_parameter(&rec.parameter_name),
            parameter_name: rec.parameter_name.clone(),
            parameter_value: rec.recommended_value,
            confidence_score: rec.confidence,
            accuracy_score: None,
            status: ParameterStatus::Testing,
            description: rec.reasoning.clone(),
            metadata_json: serde_json::to_string(rec)?,
            model_version: MODEL_VERSION.to_string(),
            model_source: model_source.to_string(),
            recommendation_id: recommendation_id(model_source, now),
            created_at: now,
        })
    }

    pub fn is_for(&self, pair: &Pair, coin: &Coin) -> bool {
        self.pair == pair.symbol && self.coin == coin.symbol
    }
}

/// Source-prefixed id, unique to the second
pub fn recommendation_id(model_source: &str, now: DateTime<Utc>) -> String {
    let prefix: String = model_source.chars().filter(|c| c.is_ascii_uppercase()).collect();
    let prefix = if prefix.is_empty() { "REC".to_string() } else { prefix };
    format!("{}_{}", prefix, now.format("%Y%m%d_%H%M%S"))
}

/// Parameter store port
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ParameterStore: Send + Sync {
    /// Pairs currently enabled for trading
    async fn enabled_pairs(&self) -> Result<Vec<Pair>, StoreError>;

    /// Coins currently enabled for trading
    async fn enabled_coins(&self) -> Result<Vec<Coin>, StoreError>;

    /// Persist records for one market, returning how many were written
    async fn save_recommendations(
        &self,
        pair: &Pair,
        coin: &Coin,
        records: Vec<ParameterRecord>,
    ) -> Result<usize, StoreError>;

    /// Newest current record per parameter for one market
    async fn active_parameters(&self, pair: &Pair, coin: &Coin) -> Result<Vec<ParameterRecord>, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::recommendation::RecommendationSource;
    use chrono::TimeZone;

    #[test]
    fn test_parameter_types() {
        assert_eq!(ParameterType::for_parameter(RISK_PER_TRADE), ParameterType::RiskManagement);
        assert_eq!(ParameterType::for_parameter(POSITION_SIZE), ParameterType::TradingStrategy);
        assert_eq!(ParameterType::for_parameter(RSI_PERIOD), ParameterType::TechnicalIndicator);
        assert_eq!(ParameterType::for_parameter("leverage"), ParameterType::Custom);
    }

    #[test]
    fn test_record_from_recommendation() {
        let now = Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();
        let rec = Recommendation::new(RISK_PER_TRADE, 0.015, 0.8, RecommendationSource::Model, "mode baseline");
        let record =
            ParameterRecord::from_recommendation(&Pair::new("BTCUSDT"), &Coin::new("BTC"), &rec, "ModeSwitcher", now)
                .unwrap();

        assert_eq!(record.status, ParameterStatus::Testing);
        assert_eq!(record.parameter_type, ParameterType::RiskManagement);
        assert_eq!(record.parameter_value, 0.015);
        assert_eq!(record.model_version, "1.0");
        assert_eq!(record.recommendation_id, "MS_20240309_140507");
        assert!(record.is_for(&Pair::new("BTCUSDT"), &Coin::new("BTC")));

        let restored: Recommendation = serde_json::from_str(&record.metadata_json).unwrap();
        assert_eq!(restored, rec);
    }

    #[test]
    fn test_status_serde() {
        assert_eq!(serde_json::to_string(&ParameterStatus::Testing).unwrap(), "\"TESTING\"");
        assert!(ParameterStatus::Active.is_current());
        assert!(!ParameterStatus::Deprecated.is_current());
    }
}
