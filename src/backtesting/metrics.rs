//! Performance metrics derived from the equity curve and trade ledger.
//!
//! Every metric resolves degenerate input (empty ledgers, zero denominators)
//! to an explicit 0 or `f64::INFINITY` — no field is ever NaN, for any input
//! with at least one equity point.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::monte_carlo::monte_carlo_score;
use super::position::{EquityPoint, Trade};

/// Fixed-shape record of per-backtest performance metrics.
///
/// `walkforward_efficiency` is left at 0 by [`BacktestMetrics::calculate`];
/// the walk-forward runner fills it in after the out-of-sample pass.
#[non_exhaustive]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestMetrics {
    /// Final equity − initial capital, in dollars
    pub net_profit: f64,
    /// Net profit as a percentage of initial capital
    pub total_return_pct: f64,
    /// Mean over standard deviation of per-bar returns
    pub sharpe_ratio: f64,
    /// Largest peak-to-trough equity drop, in dollars
    pub max_drawdown: f64,
    /// Gross profit over gross loss
    pub profit_factor: f64,
    /// Net profit over average drawdown
    pub np_avg_dd: f64,
    /// Sum of winning trade P&L
    pub gross_profit: f64,
    /// Absolute sum of losing trade P&L
    pub gross_loss: f64,
    /// Completed round trips
    pub num_trades: usize,
    /// Trades with positive P&L
    pub num_winning_trades: usize,
    /// Trades with negative P&L
    pub num_losing_trades: usize,
    /// Mean of the per-bar drawdown series, in dollars
    pub avg_drawdown: f64,

    /// Winning trades as a percentage of all trades
    pub win_rate_pct: f64,
    /// Same value as `win_rate_pct`
    pub percent_trades_profitable: f64,
    /// Losing trades as a percentage of all trades
    pub percent_trades_unprofitable: f64,
    /// Net profit per trade, in dollars
    pub avg_trade: f64,
    /// Mean P&L of winning trades
    pub avg_profitable_trade: f64,
    /// Mean absolute P&L of losing trades
    pub avg_unprofitable_trade: f64,
    /// Largest single-trade profit
    pub largest_winning_trade: f64,
    /// Largest single-trade loss (most negative)
    pub largest_losing_trade: f64,
    /// Longest run of consecutive winning trades
    pub max_consecutive_wins: usize,
    /// Longest run of consecutive losing trades
    pub max_consecutive_losses: usize,

    /// Calendar days covered by the equity curve, inclusive of both ends
    pub total_calendar_days: i64,
    /// Distinct calendar days with at least one bar
    pub total_trading_days: i64,
    /// Days whose closing equity exceeds the prior day's close
    pub days_profitable: i64,
    /// Days whose closing equity sits below the prior day's close
    pub days_unprofitable: i64,
    /// Profitable days over days with any equity change
    pub percent_days_profitable: f64,
    /// Unprofitable days over days with any equity change
    pub percent_days_unprofitable: f64,

    /// Largest drawdown relative to its running peak, as a percentage
    pub max_drawdown_pct: f64,
    /// Highest equity excess over initial capital
    pub max_run_up: f64,
    /// Net profit over maximum drawdown
    pub recovery_factor: f64,
    /// Same value as `recovery_factor`
    pub np_max_dd: f64,

    /// Coefficient of determination of equity vs. a linear fit over time
    pub r_squared: f64,
    /// Mean over downside deviation of per-bar returns
    pub sortino_ratio: f64,
    /// Percentile rank of the final equity among 2,500 bootstrap resamples
    pub monte_carlo_score: f64,
    /// Net profit over (average drawdown × fraction of time in market)
    pub rina_index: f64,
    /// Net profit × profitable days over maximum intraday drawdown
    pub tradestation_index: f64,
    /// Net profit × R²
    pub np_x_r2: f64,
    /// Net profit × profit factor
    pub np_x_pf: f64,
    /// Net profit scaled to a 365-day year (0 when span ≤ 30 days)
    pub annualized_net_profit: f64,
    /// Annualized return over average drawdown percent (0 when span ≤ 30 days)
    pub annualized_return_avg_dd: f64,
    /// Sum of trade durations over total trading days, as a percentage
    pub percent_time_in_market: f64,
    /// OOS return over IS return; populated by the walk-forward runner
    pub walkforward_efficiency: f64,
}

impl BacktestMetrics {
    /// Compute the full record from a broker run.
    pub fn calculate(trades: &[Trade], equity_curve: &[EquityPoint], initial_capital: f64) -> Self {
        let final_equity = equity_curve.last().map_or(initial_capital, |p| p.value);
        let net_profit = final_equity - initial_capital;
        let total_return_pct =
            if initial_capital > 0.0 { net_profit / initial_capital * 100.0 } else { 0.0 };

        let trade_stats = analyze_trades(trades);
        let (max_consecutive_wins, max_consecutive_losses) = consecutive_streaks(trades);

        let num_trades = trades.len();
        let (win_rate_pct, percent_trades_unprofitable, avg_trade) = if num_trades > 0 {
            (
                trade_stats.winners as f64 / num_trades as f64 * 100.0,
                trade_stats.losers as f64 / num_trades as f64 * 100.0,
                net_profit / num_trades as f64,
            )
        } else {
            (0.0, 0.0, 0.0)
        };

        let profit_factor = if trade_stats.gross_loss > 0.0 {
            trade_stats.gross_profit / trade_stats.gross_loss
        } else if trade_stats.gross_profit > 0.0 {
            f64::INFINITY
        } else {
            0.0
        };

        let dd = drawdown_stats(equity_curve);
        let max_run_up = equity_curve
            .iter()
            .map(|p| p.value - initial_capital)
            .fold(0.0, f64::max);

        let recovery_factor = ratio_or_infinity(net_profit, dd.max_drawdown);
        let np_avg_dd = ratio_or_infinity(net_profit, dd.avg_drawdown);

        let days = day_statistics(equity_curve);
        let percent_time_in_market = if num_trades > 0 && days.total_trading_days > 0 {
            let in_market: i64 = trades.iter().map(|t| t.duration_secs() / 86_400).sum();
            in_market as f64 / days.total_trading_days as f64 * 100.0
        } else {
            0.0
        };

        let returns = periodic_returns(equity_curve);
        let sharpe_ratio = sharpe(&returns);
        let sortino_ratio = sortino(&returns);
        let r_squared = regression_r_squared(equity_curve);
        let monte_carlo = monte_carlo_score(&returns, initial_capital, final_equity);
        let max_intraday_dd = max_intraday_drawdown(equity_curve);

        let tradestation_index = if max_intraday_dd > 0.0 {
            net_profit * days.days_profitable as f64 / max_intraday_dd
        } else if net_profit > 0.0 && days.days_profitable > 0 {
            f64::INFINITY
        } else {
            0.0
        };

        let rina_index = if dd.avg_drawdown > 0.0 && percent_time_in_market > 0.0 {
            net_profit / (dd.avg_drawdown * percent_time_in_market / 100.0)
        } else {
            0.0
        };

        let np_x_r2 = net_profit * r_squared;
        let np_x_pf = if profit_factor.is_infinite() {
            if net_profit > 0.0 { f64::INFINITY } else { 0.0 }
        } else {
            net_profit * profit_factor
        };

        let (annualized_net_profit, annualized_return_avg_dd) = if days.total_calendar_days > 30 {
            let scale = 365.0 / days.total_calendar_days as f64;
            let annualized_return = total_return_pct * scale;
            let ann_avg_dd = if dd.avg_drawdown > 0.0 && initial_capital > 0.0 {
                annualized_return / (dd.avg_drawdown / initial_capital * 100.0)
            } else if annualized_return > 0.0 {
                f64::INFINITY
            } else {
                0.0
            };
            (net_profit * scale, ann_avg_dd)
        } else {
            (0.0, 0.0)
        };

        Self {
            net_profit,
            total_return_pct,
            sharpe_ratio,
            max_drawdown: dd.max_drawdown,
            profit_factor,
            np_avg_dd,
            gross_profit: trade_stats.gross_profit,
            gross_loss: trade_stats.gross_loss,
            num_trades,
            num_winning_trades: trade_stats.winners,
            num_losing_trades: trade_stats.losers,
            avg_drawdown: dd.avg_drawdown,
            win_rate_pct,
            percent_trades_profitable: win_rate_pct,
            percent_trades_unprofitable,
            avg_trade,
            avg_profitable_trade: trade_stats.avg_win,
            avg_unprofitable_trade: trade_stats.avg_loss,
            largest_winning_trade: trade_stats.largest_win,
            largest_losing_trade: trade_stats.largest_loss,
            max_consecutive_wins,
            max_consecutive_losses,
            total_calendar_days: days.total_calendar_days,
            total_trading_days: days.total_trading_days,
            days_profitable: days.days_profitable,
            days_unprofitable: days.days_unprofitable,
            percent_days_profitable: days.percent_days_profitable,
            percent_days_unprofitable: days.percent_days_unprofitable,
            max_drawdown_pct: dd.max_drawdown_pct,
            max_run_up,
            recovery_factor,
            np_max_dd: recovery_factor,
            r_squared,
            sortino_ratio,
            monte_carlo_score: monte_carlo,
            rina_index,
            tradestation_index,
            np_x_r2,
            np_x_pf,
            annualized_net_profit,
            annualized_return_avg_dd,
            percent_time_in_market,
            walkforward_efficiency: 0.0,
        }
    }

    /// Copy of this record with `walkforward_efficiency` replaced.
    pub fn with_efficiency(mut self, efficiency: f64) -> Self {
        self.walkforward_efficiency = efficiency;
        self
    }
}

fn ratio_or_infinity(numerator: f64, denominator: f64) -> f64 {
    if denominator > 0.0 {
        numerator / denominator
    } else if numerator > 0.0 {
        f64::INFINITY
    } else {
        0.0
    }
}

/// Aggregated trade statistics collected in a single pass over the ledger.
struct TradeStats {
    winners: usize,
    losers: usize,
    gross_profit: f64,
    gross_loss: f64,
    largest_win: f64,
    largest_loss: f64,
    avg_win: f64,
    avg_loss: f64,
}

fn analyze_trades(trades: &[Trade]) -> TradeStats {
    let mut stats = TradeStats {
        winners: 0,
        losers: 0,
        gross_profit: 0.0,
        gross_loss: 0.0,
        largest_win: 0.0,
        largest_loss: 0.0,
        avg_win: 0.0,
        avg_loss: 0.0,
    };

    for trade in trades {
        if trade.is_win() {
            stats.winners += 1;
            stats.gross_profit += trade.pnl;
            stats.largest_win = stats.largest_win.max(trade.pnl);
        } else if trade.is_loss() {
            stats.losers += 1;
            stats.gross_loss += trade.pnl.abs();
            stats.largest_loss = stats.largest_loss.min(trade.pnl);
        }
    }

    if stats.winners > 0 {
        stats.avg_win = stats.gross_profit / stats.winners as f64;
    }
    if stats.losers > 0 {
        stats.avg_loss = stats.gross_loss / stats.losers as f64;
    }
    stats
}

/// Longest win and loss streaks in ledger order. Break-even trades reset
/// both counters.
fn consecutive_streaks(trades: &[Trade]) -> (usize, usize) {
    let mut max_wins = 0;
    let mut max_losses = 0;
    let mut wins = 0;
    let mut losses = 0;

    for trade in trades {
        if trade.is_win() {
            wins += 1;
            losses = 0;
            max_wins = max_wins.max(wins);
        } else if trade.is_loss() {
            losses += 1;
            wins = 0;
            max_losses = max_losses.max(losses);
        } else {
            wins = 0;
            losses = 0;
        }
    }

    (max_wins, max_losses)
}

struct DrawdownStats {
    max_drawdown: f64,
    avg_drawdown: f64,
    max_drawdown_pct: f64,
}

/// Walk the equity curve once: running peak, dollar drawdowns, and the
/// largest drawdown relative to its own peak.
fn drawdown_stats(equity_curve: &[EquityPoint]) -> DrawdownStats {
    if equity_curve.is_empty() {
        return DrawdownStats { max_drawdown: 0.0, avg_drawdown: 0.0, max_drawdown_pct: 0.0 };
    }

    let mut peak = equity_curve[0].value;
    let mut max_dd = 0.0f64;
    let mut max_dd_pct = 0.0f64;
    let mut dd_sum = 0.0f64;

    for point in equity_curve {
        if point.value > peak {
            peak = point.value;
        }
        let dd = peak - point.value;
        dd_sum += dd;
        max_dd = max_dd.max(dd);
        if peak > 0.0 {
            max_dd_pct = max_dd_pct.max(dd / peak * 100.0);
        }
    }

    DrawdownStats {
        max_drawdown: max_dd,
        avg_drawdown: dd_sum / equity_curve.len() as f64,
        max_drawdown_pct: max_dd_pct,
    }
}

fn utc_date(timestamp: i64) -> NaiveDate {
    DateTime::<Utc>::from_timestamp(timestamp, 0).unwrap_or_default().date_naive()
}

struct DayStats {
    total_calendar_days: i64,
    total_trading_days: i64,
    days_profitable: i64,
    days_unprofitable: i64,
    percent_days_profitable: f64,
    percent_days_unprofitable: f64,
}

/// Partition equity points by UTC calendar date, keeping each day's last
/// (end-of-day) value, and compare consecutive closes.
fn day_statistics(equity_curve: &[EquityPoint]) -> DayStats {
    let mut daily: Vec<(NaiveDate, f64)> = Vec::new();
    for point in equity_curve {
        let date = utc_date(point.timestamp);
        match daily.last_mut() {
            Some((last_date, value)) if *last_date == date => *value = point.value,
            _ => daily.push((date, point.value)),
        }
    }

    if daily.is_empty() {
        return DayStats {
            total_calendar_days: 0,
            total_trading_days: 0,
            days_profitable: 0,
            days_unprofitable: 0,
            percent_days_profitable: 0.0,
            percent_days_unprofitable: 0.0,
        };
    }

    let first = daily[0].0;
    let last = daily[daily.len() - 1].0;
    let total_calendar_days = (last - first).num_days() + 1;

    let mut days_profitable = 0i64;
    let mut days_unprofitable = 0i64;
    for pair in daily.windows(2) {
        if pair[1].1 > pair[0].1 {
            days_profitable += 1;
        } else if pair[1].1 < pair[0].1 {
            days_unprofitable += 1;
        }
    }

    let changed = days_profitable + days_unprofitable;
    let (pct_profitable, pct_unprofitable) = if changed > 0 {
        (
            days_profitable as f64 / changed as f64 * 100.0,
            days_unprofitable as f64 / changed as f64 * 100.0,
        )
    } else {
        (0.0, 0.0)
    };

    DayStats {
        total_calendar_days,
        total_trading_days: daily.len() as i64,
        days_profitable,
        days_unprofitable,
        percent_days_profitable: pct_profitable,
        percent_days_unprofitable: pct_unprofitable,
    }
}

/// Per-bar simple returns, skipping bars with a non-positive predecessor.
fn periodic_returns(equity_curve: &[EquityPoint]) -> Vec<f64> {
    equity_curve
        .windows(2)
        .filter(|w| w[0].value > 0.0)
        .map(|w| (w[1].value - w[0].value) / w[0].value)
        .collect()
}

/// Raw (non-annualized) Sharpe ratio over per-bar returns.
fn sharpe(returns: &[f64]) -> f64 {
    if returns.len() < 2 {
        return 0.0;
    }
    let n = returns.len() as f64;
    let mean = returns.iter().sum::<f64>() / n;
    let variance = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n;
    let std_dev = variance.sqrt();
    if std_dev > 0.0 { mean / std_dev } else { 0.0 }
}

/// Raw Sortino ratio: downside deviation uses only negative returns.
fn sortino(returns: &[f64]) -> f64 {
    if returns.len() < 2 {
        return 0.0;
    }
    let n = returns.len() as f64;
    let mean = returns.iter().sum::<f64>() / n;

    let downside: Vec<f64> = returns.iter().copied().filter(|r| *r < 0.0).collect();
    if downside.is_empty() {
        return if mean > 0.0 { f64::INFINITY } else { 0.0 };
    }

    let dn = downside.len() as f64;
    let d_mean = downside.iter().sum::<f64>() / dn;
    let d_var = downside.iter().map(|r| (r - d_mean).powi(2)).sum::<f64>() / dn;
    let d_dev = d_var.sqrt();
    if d_dev > 0.0 {
        mean / d_dev
    } else if mean > 0.0 {
        f64::INFINITY
    } else {
        0.0
    }
}

/// R² of equity against a linear fit over days since the first point.
fn regression_r_squared(equity_curve: &[EquityPoint]) -> f64 {
    if equity_curve.len() < 2 {
        return 0.0;
    }

    let t0 = equity_curve[0].timestamp;
    let xs: Vec<f64> =
        equity_curve.iter().map(|p| (p.timestamp - t0) as f64 / 86_400.0).collect();
    let ys: Vec<f64> = equity_curve.iter().map(|p| p.value).collect();

    let n = xs.len() as f64;
    let mean_x = xs.iter().sum::<f64>() / n;
    let mean_y = ys.iter().sum::<f64>() / n;

    let mut cov = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for (x, y) in xs.iter().zip(&ys) {
        cov += (x - mean_x) * (y - mean_y);
        var_x += (x - mean_x).powi(2);
        var_y += (y - mean_y).powi(2);
    }

    if var_x <= 0.0 || var_y <= 0.0 {
        return 0.0;
    }
    let r = cov / (var_x.sqrt() * var_y.sqrt());
    let r2 = r * r;
    if r2.is_nan() { 0.0 } else { r2 }
}

/// Largest peak-to-trough drop inside any single calendar day.
fn max_intraday_drawdown(equity_curve: &[EquityPoint]) -> f64 {
    let mut max_drop = 0.0f64;
    let mut day: Option<NaiveDate> = None;
    let mut peak = 0.0f64;

    for point in equity_curve {
        let date = utc_date(point.timestamp);
        if day != Some(date) {
            day = Some(date);
            peak = point.value;
        }
        if point.value > peak {
            peak = point.value;
        }
        max_drop = max_drop.max(peak - point.value);
    }

    max_drop
}
