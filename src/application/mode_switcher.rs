//! Mode Switcher
//!
//! Moves the system between CONSERVATIVE, BALANCED and AGGRESSIVE. A switch
//! regenerates the mode baseline, validates it and stores it for every
//! enabled market. Without `force`, the only switch allowed is the forced
//! retreat to CONSERVATIVE when recent performance is poor.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::sync::Arc;

use super::adjuster::{AdaptiveParameterAdjuster, ReportStatus};
use crate::domain::mode::{TradingMode, VolatilityLevel};
use crate::domain::recommendation::Recommendation;
use crate::domain::trade::{price_volatility, ClosedTrade, TradeStatistics};
use crate::ports::parameter_store::{Coin, Pair, ParameterRecord, ParameterStore, StoreError};
use crate::ports::trade_history::{TradeFilter, TradeHistory};
use crate::strategy::mode_policy::ModePolicy;
use crate::strategy::params::ModeConfig;

/// Default model source recorded on mode baseline records
pub const MODE_SWITCH_SOURCE: &str = "ModeSwitcher";

/// Outcome of storing the new baseline for one market
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarketUpdate {
    pub pair: String,
    pub coin: String,
    pub saved: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModeSwitchReport {
    pub status: ReportStatus,
    pub message: String,
    pub previous_mode: TradingMode,
    pub current_mode: TradingMode,
    pub switched: bool,
    pub forced: bool,
    pub performance_score: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volatility: Option<VolatilityLevel>,
    pub markets: Vec<MarketUpdate>,
    pub timestamp: DateTime<Utc>,
}

/// Performance over the lookback window
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CurrentPerformance {
    pub statistics: TradeStatistics,
    pub score: f64,
    pub volatility: Option<VolatilityLevel>,
}

pub struct ModeSwitcher<S: ParameterStore, T: TradeHistory> {
    store: Arc<S>,
    trades: Arc<T>,
    config: ModeConfig,
    policy: ModePolicy,
    current_mode: TradingMode,
    model_source: String,
}

impl<S: ParameterStore, T: TradeHistory> ModeSwitcher<S, T> {
    pub fn new(store: Arc<S>, trades: Arc<T>, config: ModeConfig) -> Self {
        Self {
            store,
            trades,
            policy: ModePolicy::new(config.factor_table),
            current_mode: config.initial_mode,
            config,
            model_source: MODE_SWITCH_SOURCE.to_string(),
        }
    }

    /// Tag stored baseline records with `source` instead of the default
    pub fn with_model_source(mut self, source: impl Into<String>) -> Self {
        self.model_source = source.into();
        self
    }

    pub fn current_mode(&self) -> TradingMode {
        self.current_mode
    }

    /// Score closed trades from the lookback window.
    ///
    /// An unreachable trade history scores as neutral.
    pub async fn current_performance(&self, now: DateTime<Utc>) -> CurrentPerformance {
        let since = now - Duration::days(self.config.performance_lookback_days);
        let trades: Vec<ClosedTrade> = match self.trades.closed_trades(TradeFilter::since(since)).await {
            Ok(trades) => trades,
            Err(e) => {
                tracing::warn!("Trade history unavailable, assuming neutral performance: {}", e);
                Vec::new()
            }
        };

        let statistics = TradeStatistics::from_trades(&trades);
        CurrentPerformance {
            score: statistics.mode_score(),
            statistics,
            volatility: price_volatility(&trades).map(VolatilityLevel::from_volatility),
        }
    }

    /// Mode best suited to current performance
    pub async fn optimal_mode(&self, now: DateTime<Utc>) -> TradingMode {
        TradingMode::for_score(self.current_performance(now).await.score)
    }

    pub async fn switch_mode(
        &mut self,
        adjuster: &AdaptiveParameterAdjuster,
        requested: TradingMode,
        force: bool,
        now: DateTime<Utc>,
    ) -> ModeSwitchReport {
        let previous = self.current_mode;
        let performance = self.current_performance(now).await;

        let target = if force {
            requested
        } else if performance.score < -self.config.mode_switch_threshold {
            tracing::warn!(
                "Performance score {:.3} below -{:.2}, forcing {}",
                performance.score,
                self.config.mode_switch_threshold,
                TradingMode::Conservative
            );
            TradingMode::Conservative
        } else {
            return self.unchanged(
                format!(
                    "No mode switch needed (score {:.3}); use force to switch to {}",
                    performance.score, requested
                ),
                ReportStatus::Success,
                force,
                &performance,
                now,
            );
        };

        if !force && target == previous {
            return self.unchanged(
                format!("Already in {} mode", previous),
                ReportStatus::Success,
                force,
                &performance,
                now,
            );
        }

        let markets = match self.enabled_markets().await {
            Ok(markets) => markets,
            Err(e) => {
                tracing::error!("Cannot list enabled markets: {}", e);
                return self.unchanged(
                    format!("Mode switch aborted: {}", e),
                    ReportStatus::Error,
                    force,
                    &performance,
                    now,
                );
            }
        };

        self.current_mode = target;
        tracing::info!("Trading mode switched from {} to {}", previous, target);

        let baseline = self
            .policy
            .recommendations(adjuster.catalog(), target, performance.volatility);
        let validated = adjuster.validate_batch(baseline).recommendations;

        let mut updates = Vec::with_capacity(markets.len());
        for (pair, coin) in &markets {
            updates.push(self.store_baseline(pair, coin, &validated, now).await);
        }

        let failed = updates.iter().filter(|u| u.error.is_some()).count();
        let status = if failed == 0 {
            ReportStatus::Success
        } else {
            ReportStatus::Warning
        };

        ModeSwitchReport {
            status,
            message: format!(
                "Trading mode switched from {} to {} ({} markets, {} failed)",
                previous,
                target,
                updates.len(),
                failed
            ),
            previous_mode: previous,
            current_mode: target,
            switched: true,
            forced: force,
            performance_score: performance.score,
            volatility: performance.volatility,
            markets: updates,
            timestamp: now,
        }
    }

    async fn enabled_markets(&self) -> Result<Vec<(Pair, Coin)>, StoreError> {
        let pairs = self.store.enabled_pairs().await?;
        let coins = self.store.enabled_coins().await?;

        Ok(pairs
            .iter()
            .flat_map(|pair| coins.iter().map(move |coin| (pair.clone(), coin.clone())))
            .collect())
    }

    async fn store_baseline(
        &self,
        pair: &Pair,
        coin: &Coin,
        recommendations: &[Recommendation],
        now: DateTime<Utc>,
    ) -> MarketUpdate {
        let mut update = MarketUpdate {
            pair: pair.symbol.clone(),
            coin: coin.symbol.clone(),
            saved: 0,
            error: None,
        };

        let records: Result<Vec<ParameterRecord>, StoreError> = recommendations
            .iter()
            .map(|rec| ParameterRecord::from_recommendation(pair, coin, rec, &self.model_source, now))
            .collect();

        let result = match records {
            Ok(records) => self.store.save_recommendations(pair, coin, records).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(saved) => update.saved = saved,
            Err(e) => {
                tracing::error!("Failed to store parameters for {}/{}: {}", pair.symbol, coin.symbol, e);
                update.error = Some(e.to_string());
            }
        }
        update
    }

    fn unchanged(
        &self,
        message: String,
        status: ReportStatus,
        forced: bool,
        performance: &CurrentPerformance,
        now: DateTime<Utc>,
    ) -> ModeSwitchReport {
        ModeSwitchReport {
            status,
            message,
            previous_mode: self.current_mode,
            current_mode: self.current_mode,
            switched: false,
            forced,
            performance_score: performance.score,
            volatility: performance.volatility,
            markets: Vec::new(),
            timestamp: now,
        }
    }
}
