//! Closed Trades and Performance
//!
//! Trade records consumed from the trade history, the aggregate metrics that
//! accompany them, and the two scores derived from them: the feedback score
//! that drives adaptation and the mode score that drives mode switching.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use statrs::statistics::{Data, Median, Statistics};

/// A completed trade as recorded by the trade history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClosedTrade {
    pub id: u64,
    pub datetime: DateTime<Utc>,
    /// True when the trade sold the coin for the bridge asset
    pub selling: bool,
    #[serde(default)]
    pub alt_starting_balance: Option<f64>,
    #[serde(default)]
    pub alt_trade_amount: Option<f64>,
    #[serde(default)]
    pub crypto_starting_balance: Option<f64>,
    #[serde(default)]
    pub crypto_trade_amount: Option<f64>,
}

impl ClosedTrade {
    /// Traded volume: alt amount for sells, crypto amount for buys
    pub fn volume(&self) -> Option<f64> {
        if self.selling {
            self.alt_trade_amount
        } else {
            self.crypto_trade_amount
        }
    }

    /// (profit, amount invested), when both legs are known
    pub fn profit_and_investment(&self) -> Option<(f64, f64)> {
        let alt = self.alt_trade_amount?;
        let crypto = self.crypto_trade_amount?;
        if self.selling {
            Some((alt - crypto, crypto))
        } else {
            Some((crypto - alt, alt))
        }
    }

    /// Fractional return on the invested amount
    pub fn return_ratio(&self) -> Option<f64> {
        let (profit, investment) = self.profit_and_investment()?;
        (investment > 0.0).then(|| profit / investment)
    }

    /// Crypto received per unit of alt
    pub fn price(&self) -> Option<f64> {
        let alt = self.alt_trade_amount?;
        let crypto = self.crypto_trade_amount?;
        (alt > 0.0).then(|| crypto / alt)
    }

    /// Hours between the trade and `now`
    pub fn age_hours(&self, now: DateTime<Utc>) -> f64 {
        (now - self.datetime).num_seconds() as f64 / 3600.0
    }
}

fn default_profit_factor() -> f64 {
    1.0
}

/// Aggregate metrics reported alongside a batch of trades
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    #[serde(default)]
    pub win_rate: f64,
    #[serde(default = "default_profit_factor")]
    pub profit_factor: f64,
    #[serde(default)]
    pub sharpe_ratio: f64,
    #[serde(default)]
    pub max_drawdown: f64,
    #[serde(default)]
    pub total_return: f64,
}

impl Default for PerformanceMetrics {
    fn default() -> Self {
        Self {
            win_rate: 0.0,
            profit_factor: default_profit_factor(),
            sharpe_ratio: 0.0,
            max_drawdown: 0.0,
            total_return: 0.0,
        }
    }
}

/// Profit factor reported when no trade lost money
pub const PROFIT_FACTOR_CAP: f64 = 10.0;

impl PerformanceMetrics {
    /// Derive metrics from trades in time order.
    ///
    /// Drawdown is measured on the equity curve obtained by compounding each
    /// trade's return. No usable trades gives the defaults.
    pub fn from_trades(trades: &[ClosedTrade]) -> Self {
        let stats = TradeStatistics::from_trades(trades);
        if stats.trade_count == 0 {
            return Self::default();
        }

        let profits: Vec<f64> = trades
            .iter()
            .filter_map(ClosedTrade::profit_and_investment)
            .map(|(profit, _)| profit)
            .collect();
        let gross_profit: f64 = profits.iter().filter(|p| **p > 0.0).sum();
        let gross_loss: f64 = -profits.iter().filter(|p| **p < 0.0).sum::<f64>();
        let profit_factor = if gross_loss > 0.0 {
            (gross_profit / gross_loss).min(PROFIT_FACTOR_CAP)
        } else if gross_profit > 0.0 {
            PROFIT_FACTOR_CAP
        } else {
            1.0
        };

        let mut equity = 1.0_f64;
        let mut peak = 1.0_f64;
        let mut max_drawdown = 0.0_f64;
        for r in trades.iter().filter_map(ClosedTrade::return_ratio) {
            equity *= 1.0 + r;
            peak = peak.max(equity);
            if peak > 0.0 {
                max_drawdown = max_drawdown.max((peak - equity) / peak);
            }
        }

        Self {
            win_rate: stats.win_rate,
            profit_factor,
            sharpe_ratio: stats.sharpe_ratio,
            max_drawdown,
            total_return: stats.total_return,
        }
    }

    /// Feedback score in [0, 1].
    ///
    /// Weighted 0.3 win rate, 0.3 profit factor, 0.2 sharpe, 0.2 return; each
    /// sub-score is clamped to [0, 1] before weighting.
    pub fn performance_score(&self) -> f64 {
        let win_score = ((self.win_rate - 0.5) * 2.0).clamp(0.0, 1.0);
        let profit_score = (self.profit_factor - 1.0).clamp(0.0, 1.0);
        let sharpe_score = (self.sharpe_ratio / 2.0).clamp(0.0, 1.0);
        let return_score = ((self.total_return + 1.0) / 2.0).clamp(0.0, 1.0);

        0.3 * win_score + 0.3 * profit_score + 0.2 * sharpe_score + 0.2 * return_score
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DurationStats {
    pub avg_hours: f64,
    pub min_hours: f64,
    pub max_hours: f64,
    pub median_hours: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VolumeStats {
    pub avg: f64,
    pub min: f64,
    pub max: f64,
    pub total: f64,
}

/// Everything the feedback loop learned about one batch of trades
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceInsights {
    pub total_trades: usize,
    #[serde(flatten)]
    pub metrics: PerformanceMetrics,
    #[serde(default)]
    pub trade_duration: Option<DurationStats>,
    #[serde(default)]
    pub volume: Option<VolumeStats>,
}

impl PerformanceInsights {
    pub fn from_trades(trades: &[ClosedTrade], metrics: PerformanceMetrics, now: DateTime<Utc>) -> Self {
        let ages: Vec<f64> = trades.iter().map(|t| t.age_hours(now)).collect();
        let volumes: Vec<f64> = trades.iter().filter_map(ClosedTrade::volume).collect();

        Self {
            total_trades: trades.len(),
            metrics,
            trade_duration: duration_stats(&ages),
            volume: volume_stats(&volumes),
        }
    }

    pub fn performance_score(&self) -> f64 {
        self.metrics.performance_score()
    }
}

fn duration_stats(hours: &[f64]) -> Option<DurationStats> {
    if hours.is_empty() {
        return None;
    }

    Some(DurationStats {
        avg_hours: hours.iter().mean(),
        min_hours: hours.iter().copied().fold(f64::INFINITY, f64::min),
        max_hours: hours.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        median_hours: Data::new(hours.to_vec()).median(),
    })
}

fn volume_stats(volumes: &[f64]) -> Option<VolumeStats> {
    if volumes.is_empty() {
        return None;
    }

    Some(VolumeStats {
        avg: volumes.iter().mean(),
        min: volumes.iter().copied().fold(f64::INFINITY, f64::min),
        max: volumes.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        total: volumes.iter().sum(),
    })
}

/// Realised performance over a lookback window, used for mode decisions
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TradeStatistics {
    pub trade_count: usize,
    pub total_return: f64,
    pub win_rate: f64,
    pub sharpe_ratio: f64,
}

impl TradeStatistics {
    /// Statistics that score exactly zero
    pub fn neutral() -> Self {
        Self {
            trade_count: 0,
            total_return: 0.0,
            win_rate: 0.5,
            sharpe_ratio: 0.0,
        }
    }

    /// Aggregate trades with both legs known. No usable trades gives `neutral()`.
    pub fn from_trades(trades: &[ClosedTrade]) -> Self {
        let legs: Vec<(f64, f64)> = trades
            .iter()
            .filter_map(ClosedTrade::profit_and_investment)
            .collect();
        if legs.is_empty() {
            return Self::neutral();
        }

        let total_profit: f64 = legs.iter().map(|(p, _)| p).sum();
        let total_investment: f64 = legs.iter().map(|(_, i)| i).sum();
        let total_return = if total_investment > 0.0 {
            total_profit / total_investment
        } else {
            0.0
        };

        let winners = legs.iter().filter(|(p, _)| *p > 0.0).count();
        let returns: Vec<f64> = trades.iter().filter_map(ClosedTrade::return_ratio).collect();

        Self {
            trade_count: legs.len(),
            total_return,
            win_rate: winners as f64 / legs.len() as f64,
            sharpe_ratio: sharpe(&returns),
        }
    }

    /// Mode score in [-1, 1]: 0.4 return, 0.4 win rate, 0.2 sharpe
    pub fn mode_score(&self) -> f64 {
        let return_score = self.total_return.clamp(-1.0, 1.0);
        let win_score = (self.win_rate - 0.5) * 2.0;
        let sharpe_score = (self.sharpe_ratio / 2.0).clamp(-1.0, 1.0);

        return_score * 0.4 + win_score * 0.4 + sharpe_score * 0.2
    }
}

/// Mean over population standard deviation; 0 when undefined
fn sharpe(returns: &[f64]) -> f64 {
    if returns.len() < 2 {
        return 0.0;
    }
    let std = returns.iter().population_std_dev();
    if std > 0.0 {
        returns.iter().mean() / std
    } else {
        0.0
    }
}

/// Sample standard deviation of period-over-period price changes
pub fn price_volatility(trades: &[ClosedTrade]) -> Option<f64> {
    let prices: Vec<f64> = trades.iter().filter_map(ClosedTrade::price).collect();
    let changes: Vec<f64> = prices
        .windows(2)
        .filter(|w| w[0] != 0.0)
        .map(|w| w[1] / w[0] - 1.0)
        .collect();

    if changes.len() < 2 {
        return None;
    }
    let volatility = changes.iter().std_dev();
    volatility.is_finite().then_some(volatility)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::Duration;

    fn create_test_trade(id: u64, selling: bool, alt: f64, crypto: f64, hours_ago: i64) -> ClosedTrade {
        ClosedTrade {
            id,
            datetime: Utc::now() - Duration::hours(hours_ago),
            selling,
            alt_starting_balance: None,
            alt_trade_amount: Some(alt),
            crypto_starting_balance: None,
            crypto_trade_amount: Some(crypto),
        }
    }

    #[test]
    fn test_profit_and_volume() {
        let sell = create_test_trade(1, true, 110.0, 100.0, 1);
        assert_eq!(sell.profit_and_investment(), Some((10.0, 100.0)));
        assert_eq!(sell.volume(), Some(110.0));

        let buy = create_test_trade(2, false, 100.0, 95.0, 1);
        assert_eq!(buy.profit_and_investment(), Some((-5.0, 100.0)));
        assert_eq!(buy.volume(), Some(95.0));
    }

    #[test]
    fn test_performance_score_weights() {
        let perfect = PerformanceMetrics {
            win_rate: 1.0,
            profit_factor: 2.0,
            sharpe_ratio: 2.0,
            max_drawdown: 0.0,
            total_return: 1.0,
        };
        assert_relative_eq!(perfect.performance_score(), 1.0);

        // Only the return sub-score contributes: (0 + 1) / 2 * 0.2
        let flat = PerformanceMetrics::default();
        assert_relative_eq!(flat.performance_score(), 0.1);

        let ruined = PerformanceMetrics {
            total_return: -1.0,
            ..PerformanceMetrics::default()
        };
        assert_relative_eq!(ruined.performance_score(), 0.0);
    }

    #[test]
    fn test_metrics_from_trades() {
        let trades = vec![
            create_test_trade(1, true, 110.0, 100.0, 3),
            create_test_trade(2, true, 90.0, 100.0, 2),
            create_test_trade(3, true, 120.0, 100.0, 1),
        ];

        let metrics = PerformanceMetrics::from_trades(&trades);
        assert_relative_eq!(metrics.win_rate, 2.0 / 3.0);
        assert_relative_eq!(metrics.profit_factor, 3.0);
        // 1.1 then 0.99: a 10% drop from the peak
        assert_relative_eq!(metrics.max_drawdown, 0.1, epsilon = 1e-12);
        assert_relative_eq!(metrics.total_return, 0.2 / 3.0 * 1.0, epsilon = 1e-12);

        let winners = vec![create_test_trade(1, true, 110.0, 100.0, 1)];
        assert_eq!(PerformanceMetrics::from_trades(&winners).profit_factor, PROFIT_FACTOR_CAP);
        assert_eq!(PerformanceMetrics::from_trades(&[]), PerformanceMetrics::default());
    }

    #[test]
    fn test_insights_from_trades() {
        let now = Utc::now();
        let trades = vec![
            ClosedTrade { datetime: now - Duration::hours(2), ..create_test_trade(1, true, 10.0, 9.0, 0) },
            ClosedTrade { datetime: now - Duration::hours(4), ..create_test_trade(2, false, 10.0, 12.0, 0) },
            ClosedTrade { datetime: now - Duration::hours(9), ..create_test_trade(3, true, 20.0, 18.0, 0) },
        ];

        let insights = PerformanceInsights::from_trades(&trades, PerformanceMetrics::default(), now);
        assert_eq!(insights.total_trades, 3);

        let duration = insights.trade_duration.unwrap();
        assert_relative_eq!(duration.min_hours, 2.0);
        assert_relative_eq!(duration.max_hours, 9.0);
        assert_relative_eq!(duration.median_hours, 4.0);
        assert_relative_eq!(duration.avg_hours, 5.0);

        let volume = insights.volume.unwrap();
        assert_relative_eq!(volume.total, 42.0);
        assert_relative_eq!(volume.min, 10.0);
        assert_relative_eq!(volume.max, 20.0);
    }

    #[test]
    fn test_trade_statistics() {
        let trades = vec![
            create_test_trade(1, true, 110.0, 100.0, 1),
            create_test_trade(2, true, 90.0, 100.0, 1),
            create_test_trade(3, false, 100.0, 120.0, 1),
        ];

        let stats = TradeStatistics::from_trades(&trades);
        assert_eq!(stats.trade_count, 3);
        assert_relative_eq!(stats.win_rate, 2.0 / 3.0);
        // (10 - 10 + 20) / (100 + 100 + 100)
        assert_relative_eq!(stats.total_return, 20.0 / 300.0);
    }

    #[test]
    fn test_neutral_statistics_score_zero() {
        assert_relative_eq!(TradeStatistics::neutral().mode_score(), 0.0);
        assert_eq!(TradeStatistics::from_trades(&[]), TradeStatistics::neutral());
    }

    #[test]
    fn test_losing_streak_scores_negative() {
        let trades: Vec<ClosedTrade> = (0..5)
            .map(|i| create_test_trade(i, true, 80.0 + i as f64, 100.0, 1))
            .collect();

        let stats = TradeStatistics::from_trades(&trades);
        assert_eq!(stats.win_rate, 0.0);
        assert!(stats.mode_score() < -0.15);
    }

    #[test]
    fn test_price_volatility() {
        let steady: Vec<ClosedTrade> = (0..4).map(|i| create_test_trade(i, true, 100.0, 100.0, 1)).collect();
        assert_relative_eq!(price_volatility(&steady).unwrap(), 0.0);

        let choppy = vec![
            create_test_trade(1, true, 100.0, 100.0, 1),
            create_test_trade(2, true, 100.0, 120.0, 1),
            create_test_trade(3, true, 100.0, 90.0, 1),
            create_test_trade(4, true, 100.0, 110.0, 1),
        ];
        assert!(price_volatility(&choppy).unwrap() > 0.05);

        assert!(price_volatility(&steady[..2]).is_none());
    }
}
