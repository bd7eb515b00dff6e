//! Trading Modes
//!
//! The three risk postures and the volatility classification that modulates
//! them.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Volatility below this is LOW
pub const LOW_VOLATILITY_THRESHOLD: f64 = 0.02;

/// Volatility below this (and not LOW) is MEDIUM
pub const HIGH_VOLATILITY_THRESHOLD: f64 = 0.05;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TradingMode {
    Conservative,
    Balanced,
    Aggressive,
}

impl Default for TradingMode {
    fn default() -> Self {
        TradingMode::Balanced
    }
}

impl TradingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradingMode::Conservative => "CONSERVATIVE",
            TradingMode::Balanced => "BALANCED",
            TradingMode::Aggressive => "AGGRESSIVE",
        }
    }

    /// Mode best suited to a mode score
    pub fn for_score(score: f64) -> Self {
        if score < -0.1 {
            TradingMode::Conservative
        } else if score > 0.2 {
            TradingMode::Aggressive
        } else {
            TradingMode::Balanced
        }
    }
}

impl fmt::Display for TradingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TradingMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "conservative" => Ok(TradingMode::Conservative),
            "balanced" => Ok(TradingMode::Balanced),
            "aggressive" => Ok(TradingMode::Aggressive),
            other => Err(format!("Unknown trading mode: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VolatilityLevel {
    Low,
    Medium,
    High,
}

impl VolatilityLevel {
    /// Classify a standard deviation of returns
    pub fn from_volatility(volatility: f64) -> Self {
        if volatility < LOW_VOLATILITY_THRESHOLD {
            VolatilityLevel::Low
        } else if volatility < HIGH_VOLATILITY_THRESHOLD {
            VolatilityLevel::Medium
        } else {
            VolatilityLevel::High
        }
    }
}
