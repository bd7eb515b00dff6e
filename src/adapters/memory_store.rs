//! In-Memory Store
//!
//! Parameter store and trade history held in process memory. Used for dry
//! runs and tests.

use async_trait::async_trait;
use std::collections::BTreeMap;
use tokio::sync::RwLock;

use crate::domain::trade::ClosedTrade;
use crate::ports::parameter_store::{Coin, Pair, ParameterRecord, ParameterStore, StoreError};
use crate::ports::trade_history::{MarketTrade, TradeFilter, TradeHistory};

#[derive(Debug, Default)]
pub struct InMemoryStore {
    pairs: RwLock<Vec<Pair>>,
    coins: RwLock<Vec<Coin>>,
    records: RwLock<Vec<ParameterRecord>>,
    trades: RwLock<Vec<MarketTrade>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_markets(pairs: Vec<Pair>, coins: Vec<Coin>) -> Self {
        Self {
            pairs: RwLock::new(pairs),
            coins: RwLock::new(coins),
            ..Self::default()
        }
    }

    pub async fn add_trade(&self, pair: &Pair, coin: &Coin, trade: ClosedTrade) {
        self.trades.write().await.push(MarketTrade {
            pair: pair.symbol.clone(),
            coin: coin.symbol.clone(),
            trade,
        });
    }

    /// Every record saved so far, in save order
    pub async fn records(&self) -> Vec<ParameterRecord> {
        self.records.read().await.clone()
    }
}

/// Newest current record per parameter name, from records in save order
pub(crate) fn latest_current(records: &[ParameterRecord], pair: &Pair, coin: &Coin) -> Vec<ParameterRecord> {
    let mut latest: BTreeMap<&str, &ParameterRecord> = BTreeMap::new();
    for record in records
        .iter()
        .filter(|r| r.is_for(pair, coin) && r.status.is_current())
    {
        latest.insert(record.parameter_name.as_str(), record);
    }
    latest.into_values().cloned().collect()
}

/// Matching trades, oldest first
pub(crate) fn filter_trades(trades: &[MarketTrade], filter: &TradeFilter) -> Vec<ClosedTrade> {
    let mut matched: Vec<ClosedTrade> = trades
        .iter()
        .filter(|t| t.matches(filter))
        .map(|t| t.trade.clone())
        .collect();
    matched.sort_by_key(|t| t.datetime);
    matched
}

#[async_trait]
impl ParameterStore for InMemoryStore {
    async fn enabled_pairs(&self) -> Result<Vec<Pair>, StoreError> {
        Ok(self.pairs.read().await.clone())
    }

    async fn enabled_coins(&self) -> Result<Vec<Coin>, StoreError> {
        Ok(self.coins.read().await.clone())
    }

    async fn save_recommendations(
        &self,
        pair: &Pair,
        coin: &Coin,
        records: Vec<ParameterRecord>,
    ) -> Result<usize, StoreError> {
        let count = records.len();
        self.records.write().await.extend(records);
        tracing::debug!("Stored {} parameter records for {}/{}", count, pair.symbol, coin.symbol);
        Ok(count)
    }

    async fn active_parameters(&self, pair: &Pair, coin: &Coin) -> Result<Vec<ParameterRecord>, StoreError> {
        Ok(latest_current(&self.records.read().await, pair, coin))
    }
}

#[async_trait]
impl TradeHistory for InMemoryStore {
    async fn closed_trades(&self, filter: TradeFilter) -> Result<Vec<ClosedTrade>, StoreError> {
        Ok(filter_trades(&self.trades.read().await, &filter))
    }
}
