//! JSON File Store
//!
//! Parameter store and trade history backed by JSON documents in a data
//! directory:
//!
//! - `markets.json`: enabled pairs and coins
//! - `trades.json`: closed trades tagged with their market
//! - `parameters.json`: every stored parameter record, in save order
//! - `mode.json`: trading mode selected by the last switch
//!
//! Missing files read as empty. Writes rewrite the whole document.

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

use super::memory_store::{filter_trades, latest_current};
use crate::domain::mode::TradingMode;
use crate::domain::trade::ClosedTrade;
use crate::ports::parameter_store::{Coin, Pair, ParameterRecord, ParameterStore, StoreError};
use crate::ports::trade_history::{MarketTrade, TradeFilter, TradeHistory};

pub const MARKETS_FILE: &str = "markets.json";
pub const TRADES_FILE: &str = "trades.json";
pub const PARAMETERS_FILE: &str = "parameters.json";
pub const MODE_FILE: &str = "mode.json";

/// Enabled markets document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Markets {
    #[serde(default)]
    pub pairs: Vec<Pair>,
    #[serde(default)]
    pub coins: Vec<Coin>,
}

pub struct JsonFileStore {
    data_dir: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub async fn markets(&self) -> Result<Markets, StoreError> {
        Ok(read_document(&self.data_dir.join(MARKETS_FILE)).await?.unwrap_or_default())
    }

    pub async fn set_markets(&self, markets: &Markets) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        write_document(&self.data_dir.join(MARKETS_FILE), markets).await
    }

    /// Mode saved by the last switch, if any
    pub async fn saved_mode(&self) -> Result<Option<TradingMode>, StoreError> {
        read_document(&self.data_dir.join(MODE_FILE)).await
    }

    pub async fn save_mode(&self, mode: TradingMode) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        write_document(&self.data_dir.join(MODE_FILE), &mode).await
    }

    async fn all_records(&self) -> Result<Vec<ParameterRecord>, StoreError> {
        Ok(read_document(&self.data_dir.join(PARAMETERS_FILE)).await?.unwrap_or_default())
    }
}

async fn read_document<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StoreError> {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    if content.trim().is_empty() {
        return Ok(None);
    }
    Ok(Some(serde_json::from_str(&content)?))
}

async fn write_document<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    let content = serde_json::to_string_pretty(value)?;
    tokio::fs::write(path, content).await?;
    Ok(())
}

#[async_trait]
impl ParameterStore for JsonFileStore {
    async fn enabled_pairs(&self) -> Result<Vec<Pair>, StoreError> {
        Ok(self.markets().await?.pairs)
    }

    async fn enabled_coins(&self) -> Result<Vec<Coin>, StoreError> {
        Ok(self.markets().await?.coins)
    }

    async fn save_recommendations(
        &self,
        pair: &Pair,
        coin: &Coin,
        records: Vec<ParameterRecord>,
    ) -> Result<usize, StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut all = self.all_records().await?;
        let count = records.len();
        all.extend(records);
        write_document(&self.data_dir.join(PARAMETERS_FILE), &all).await?;

        tracing::info!("Saved {} parameter records for {}/{}", count, pair.symbol, coin.symbol);
        Ok(count)
    }

    async fn active_parameters(&self, pair: &Pair, coin: &Coin) -> Result<Vec<ParameterRecord>, StoreError> {
        Ok(latest_current(&self.all_records().await?, pair, coin))
    }
}

#[async_trait]
impl TradeHistory for JsonFileStore {
    async fn closed_trades(&self, filter: TradeFilter) -> Result<Vec<ClosedTrade>, StoreError> {
        let trades: Vec<MarketTrade> = read_document(&self.data_dir.join(TRADES_FILE))
            .await?
            .unwrap_or_default();
        Ok(filter_trades(&trades, &filter))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::bounds::POSITION_SIZE;
    use crate::domain::recommendation::{Recommendation, RecommendationSource};
    use chrono::{Duration, Utc};
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_empty_directory_reads_empty() {
        let dir = tempdir().unwrap();
        let store = JsonFileStore::new(dir.path());

        assert!(store.enabled_pairs().await.unwrap().is_empty());
        assert!(store.closed_trades(TradeFilter::default()).await.unwrap().is_empty());
        assert!(store
            .active_parameters(&Pair::new("BTCUSDT"), &Coin::new("BTC"))
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_records_persist_across_instances() {
        let dir = tempdir().unwrap();
        let (pair, coin) = (Pair::new("BTCUSDT"), Coin::new("BTC"));
        let store = JsonFileStore::new(dir.path().join("data"));
        store
            .set_markets(&Markets {
                pairs: vec![pair.clone()],
                coins: vec![coin.clone()],
            })
            .await
            .unwrap();

        let rec = Recommendation::new(POSITION_SIZE, 0.8, 0.7, RecommendationSource::Model, "baseline");
        let record = ParameterRecord::from_recommendation(&pair, &coin, &rec, "Test", Utc::now()).unwrap();
        assert_eq!(store.save_recommendations(&pair, &coin, vec![record.clone()]).await.unwrap(), 1);

        let reopened = JsonFileStore::new(dir.path().join("data"));
        assert_eq!(reopened.enabled_coins().await.unwrap(), vec![coin.clone()]);
        assert_eq!(reopened.active_parameters(&pair, &coin).await.unwrap(), vec![record]);
    }

    #[tokio::test]
    async fn test_trades_round_trip() {
        let dir = tempdir().unwrap();
        let store = JsonFileStore::new(dir.path());
        let trade = ClosedTrade {
            id: 7,
            datetime: Utc::now() - Duration::days(2),
            selling: false,
            alt_starting_balance: Some(1000.0),
            alt_trade_amount: Some(100.0),
            crypto_starting_balance: None,
            crypto_trade_amount: Some(102.5),
        };

        let tagged = vec![MarketTrade {
            pair: "BTCUSDT".to_string(),
            coin: "BTC".to_string(),
            trade: trade.clone(),
        }];
        write_document(&dir.path().join(TRADES_FILE), &tagged).await.unwrap();

        let trades = store
            .closed_trades(TradeFilter::since(Utc::now() - Duration::days(7)))
            .await
            .unwrap();
        assert_eq!(trades, vec![trade]);
    }

    #[tokio::test]
    async fn test_mode_persists() {
        let dir = tempdir().unwrap();
        let store = JsonFileStore::new(dir.path());
        assert_eq!(store.saved_mode().await.unwrap(), None);

        store.save_mode(TradingMode::Aggressive).await.unwrap();
        assert_eq!(
            JsonFileStore::new(dir.path()).saved_mode().await.unwrap(),
            Some(TradingMode::Aggressive)
        );
    }

    #[tokio::test]
    async fn test_corrupt_document_is_an_error() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join(MARKETS_FILE), "[").unwrap();
        let store = JsonFileStore::new(dir.path());

        assert!(matches!(store.enabled_pairs().await, Err(StoreError::Serialization(_))));
    }
}
