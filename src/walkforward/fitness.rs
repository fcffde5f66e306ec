//! Fitness functions: scalar objectives over backtest metrics.
//!
//! Sign convention: higher is always better. Metrics where smaller raw
//! values are preferable (drawdown, time in market, average losing trade)
//! are negated.

use serde::{Deserialize, Serialize};

use crate::backtesting::BacktestMetrics;

use super::{Result, WalkForwardError};

/// Named fitness function. Unknown names fail fast at configuration time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum Fitness {
    /// Net profit in dollars
    NetProfit,
    /// Sharpe ratio
    SharpeRatio,
    /// Sortino ratio
    SortinoRatio,
    /// Maximum drawdown, negated
    MaxDd,
    /// Net profit over average drawdown
    NpAvgDd,
    /// Net profit over maximum drawdown
    NpMaxDd,
    /// Gross profit over gross loss
    ProfitFactor,
    /// Win rate percentage
    PercentTradesProfitable,
    /// R² of the equity curve fit
    RSquared,
    /// Net profit × R²
    NpXR2,
    /// Net profit × profit factor
    NpXPf,
    /// RINA index
    RinaIndex,
    /// TradeStation index
    TradestationIndex,
    /// Percent time in market, negated
    PercentTimeInMarket,
    /// OOS over IS return ratio
    WalkforwardEfficiency,
    /// Longest winning streak
    MaxConsecutiveWins,
    /// Net profit per trade
    AvgTrade,
    /// Mean winning trade P&L
    AvgProfitableTrade,
    /// Mean losing trade size, negated
    AvgUnprofitableTrade,
    /// Percentage of profitable days
    PercentDaysProfitable,
    /// Peak equity excess over initial capital
    MaxRunUp,
    /// Net profit scaled to a year
    AnnualizedNetProfit,
    /// Annualized return over average drawdown
    AnnualizedReturnAvgDd,
}

impl Fitness {
    /// All supported fitness functions.
    pub const ALL: [Fitness; 23] = [
        Fitness::NetProfit,
        Fitness::SharpeRatio,
        Fitness::SortinoRatio,
        Fitness::MaxDd,
        Fitness::NpAvgDd,
        Fitness::NpMaxDd,
        Fitness::ProfitFactor,
        Fitness::PercentTradesProfitable,
        Fitness::RSquared,
        Fitness::NpXR2,
        Fitness::NpXPf,
        Fitness::RinaIndex,
        Fitness::TradestationIndex,
        Fitness::PercentTimeInMarket,
        Fitness::WalkforwardEfficiency,
        Fitness::MaxConsecutiveWins,
        Fitness::AvgTrade,
        Fitness::AvgProfitableTrade,
        Fitness::AvgUnprofitableTrade,
        Fitness::PercentDaysProfitable,
        Fitness::MaxRunUp,
        Fitness::AnnualizedNetProfit,
        Fitness::AnnualizedReturnAvgDd,
    ];

    /// Resolve a configured name; unknown names are a hard failure.
    pub fn from_name(name: &str) -> Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|f| f.name() == name)
            .ok_or_else(|| WalkForwardError::UnknownFitness(name.to_string()))
    }

    /// The configuration name of this fitness function.
    pub fn name(&self) -> &'static str {
        match self {
            Fitness::NetProfit => "net_profit",
            Fitness::SharpeRatio => "sharpe_ratio",
            Fitness::SortinoRatio => "sortino_ratio",
            Fitness::MaxDd => "max_dd",
            Fitness::NpAvgDd => "np_avg_dd",
            Fitness::NpMaxDd => "np_max_dd",
            Fitness::ProfitFactor => "profit_factor",
            Fitness::PercentTradesProfitable => "percent_trades_profitable",
            Fitness::RSquared => "r_squared",
            Fitness::NpXR2 => "np_x_r2",
            Fitness::NpXPf => "np_x_pf",
            Fitness::RinaIndex => "rina_index",
            Fitness::TradestationIndex => "tradestation_index",
            Fitness::PercentTimeInMarket => "percent_time_in_market",
            Fitness::WalkforwardEfficiency => "walkforward_efficiency",
            Fitness::MaxConsecutiveWins => "max_consecutive_wins",
            Fitness::AvgTrade => "avg_trade",
            Fitness::AvgProfitableTrade => "avg_profitable_trade",
            Fitness::AvgUnprofitableTrade => "avg_unprofitable_trade",
            Fitness::PercentDaysProfitable => "percent_days_profitable",
            Fitness::MaxRunUp => "max_run_up",
            Fitness::AnnualizedNetProfit => "annualized_net_profit",
            Fitness::AnnualizedReturnAvgDd => "annualized_return_avg_dd",
        }
    }

    /// Score a metric record. Higher is better for every variant.
    pub fn score(&self, metrics: &BacktestMetrics) -> f64 {
        match self {
            Fitness::NetProfit => metrics.net_profit,
            Fitness::SharpeRatio => metrics.sharpe_ratio,
            Fitness::SortinoRatio => metrics.sortino_ratio,
            Fitness::MaxDd => -metrics.max_drawdown,
            Fitness::NpAvgDd => metrics.np_avg_dd,
            Fitness::NpMaxDd => metrics.np_max_dd,
            Fitness::ProfitFactor => metrics.profit_factor,
            Fitness::PercentTradesProfitable => metrics.win_rate_pct,
            Fitness::RSquared => metrics.r_squared,
            Fitness::NpXR2 => metrics.np_x_r2,
            Fitness::NpXPf => metrics.np_x_pf,
            Fitness::RinaIndex => metrics.rina_index,
            Fitness::TradestationIndex => metrics.tradestation_index,
            Fitness::PercentTimeInMarket => -metrics.percent_time_in_market,
            Fitness::WalkforwardEfficiency => metrics.walkforward_efficiency,
            Fitness::MaxConsecutiveWins => metrics.max_consecutive_wins as f64,
            Fitness::AvgTrade => metrics.avg_trade,
            Fitness::AvgProfitableTrade => metrics.avg_profitable_trade,
            Fitness::AvgUnprofitableTrade => -metrics.avg_unprofitable_trade,
            Fitness::PercentDaysProfitable => metrics.percent_days_profitable,
            Fitness::MaxRunUp => metrics.max_run_up,
            Fitness::AnnualizedNetProfit => metrics.annualized_net_profit,
            Fitness::AnnualizedReturnAvgDd => metrics.annualized_return_avg_dd,
        }
    }
}
