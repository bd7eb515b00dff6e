//! Trade History Port
//!
//! Read-only access to completed trades.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::parameter_store::StoreError;
use crate::domain::trade::ClosedTrade;

/// Which trades to return; empty fields match everything
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TradeFilter {
    pub pair: Option<String>,
    pub coin: Option<String>,
    /// Only trades at or after this time
    pub since: Option<DateTime<Utc>>,
}

impl TradeFilter {
    pub fn since(since: DateTime<Utc>) -> Self {
        Self {
            since: Some(since),
            ..Self::default()
        }
    }

    pub fn with_market(mut self, pair: impl Into<String>, coin: impl Into<String>) -> Self {
        self.pair = Some(pair.into());
        self.coin = Some(coin.into());
        self
    }

    /// Whether a trade on `pair`/`coin` passes the filter
    pub fn matches(&self, pair: &str, coin: &str, trade: &ClosedTrade) -> bool {
        self.pair.as_deref().map_or(true, |p| p == pair)
            && self.coin.as_deref().map_or(true, |c| c == coin)
            && self.since.map_or(true, |since| trade.datetime >= since)
    }
}

/// A closed trade tagged with the market it happened on
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketTrade {
    pub pair: String,
    pub coin: String,
    #[serde(flatten)]
    pub trade: ClosedTrade,
}

impl MarketTrade {
    pub fn matches(&self, filter: &TradeFilter) -> bool {
        filter.matches(&self.pair, &self.coin, &self.trade)
    }
}

/// Trade history port
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TradeHistory: Send + Sync {
    /// Closed trades matching the filter, oldest first
    async fn closed_trades(&self, filter: TradeFilter) -> Result<Vec<ClosedTrade>, StoreError>;
}
