//! Bar-level broker simulation.
//!
//! The engine drives a strategy across an enriched bar table and records
//! fills, the trade ledger, and a dense mark-to-market equity curve. Orders
//! submitted during bar `t` fill at bar `t+1`'s open adjusted for slippage —
//! a fill can never see the bar that produced it.

use tracing::debug;

use super::config::BrokerConfig;
use super::error::{BacktestError, Result};
use super::position::{EquityPoint, Position, Trade};
use super::series::EnrichedSeries;
use super::signal::Signal;
use super::strategy::{BarContext, Strategy};

/// Output of one simulation: ledger, equity curve, and final state.
#[non_exhaustive]
#[derive(Debug, Clone)]
pub struct BacktestRun {
    /// Completed round trips, in exit order
    pub trades: Vec<Trade>,
    /// One equity point per processed bar
    pub equity_curve: Vec<EquityPoint>,
    /// Cash after the last bar
    pub final_cash: f64,
    /// Mark-to-market portfolio value after the last bar
    pub final_equity: f64,
    /// Position still open at the end, if any
    pub open_position: Option<Position>,
}

/// Bar-level broker engine.
pub struct BacktestEngine {
    config: BrokerConfig,
}

impl BacktestEngine {
    /// Create an engine with the given broker configuration.
    pub fn new(config: BrokerConfig) -> Self {
        Self { config }
    }

    /// Simulate `strategy` over `series`.
    ///
    /// The series must already be enriched with every column the strategy
    /// declares; unknown columns surface as errors on the first strategy
    /// read. A series shorter than the strategy's warm-up is rejected
    /// outright. Strategy errors terminate the run and propagate to the
    /// caller (the grid search records them per parameter cell).
    pub fn run(&self, series: &EnrichedSeries, strategy: &mut dyn Strategy) -> Result<BacktestRun> {
        let warmup = strategy.warmup_bars();
        if series.len() < warmup {
            return Err(BacktestError::insufficient_data(warmup, series.len()));
        }

        let mut cash = self.config.initial_capital;
        let mut position: Option<Position> = None;
        let mut pending: Option<Signal> = None;
        let mut trades: Vec<Trade> = Vec::new();
        let mut equity_curve: Vec<EquityPoint> = Vec::with_capacity(series.len());

        for i in 0..series.len() {
            let candle = series.candle(i);

            // Fill the order carried over from the previous bar at this
            // bar's open. The fill price is slippage-adjusted and clamped
            // into this bar's traded range.
            match pending.take() {
                Some(Signal::Buy) if position.is_none() => {
                    let price = self.config.buy_fill_price(candle.open, candle.high, candle.low);
                    let size = self.config.position_size(cash, price);
                    if size > 0.0 {
                        let notional = size * price;
                        let fee = notional * self.config.commission_rate();
                        cash -= notional + fee;
                        position = Some(Position::new(candle.timestamp, price, size, fee));
                    } else {
                        debug!(bar = i, price, cash, "buy skipped: sizing produced zero units");
                    }
                }
                Some(Signal::Sell) => {
                    if let Some(open_position) = position.take() {
                        let price =
                            self.config.sell_fill_price(candle.open, candle.high, candle.low);
                        let notional = open_position.size * price;
                        let fee = notional * self.config.commission_rate();
                        cash += notional - fee;
                        trades.push(open_position.close(candle.timestamp, price, fee));
                    }
                }
                _ => {}
            }

            // Warm-up: while any required indicator column is still NaN the
            // strategy is simply not invoked on this bar.
            if !series.in_warmup(i) {
                let ctx = BarContext::new(series, i, position.as_ref(), cash);
                match strategy.on_bar(&ctx)? {
                    Signal::Buy => {
                        if position.is_none() {
                            pending = Some(Signal::Buy);
                        }
                    }
                    Signal::Sell => {
                        if position.is_some() {
                            pending = Some(Signal::Sell);
                        } else {
                            debug!(bar = i, "sell rejected: no open position");
                        }
                    }
                    Signal::Hold => {}
                }
            }

            // Mark-to-market at this bar's close, after all fills.
            let equity = cash + position.as_ref().map_or(0.0, |p| p.market_value(candle.close));
            equity_curve.push(EquityPoint { timestamp: candle.timestamp, value: equity });
        }

        let final_equity = equity_curve.last().map_or(cash, |p| p.value);
        Ok(BacktestRun {
            trades,
            equity_curve,
            final_cash: cash,
            final_equity,
            open_position: position,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backtesting::error::BacktestError;
    use crate::indicators::IndicatorSpec;
    use crate::models::Candle;

    fn make_series(prices: &[f64]) -> EnrichedSeries {
        let candles: Vec<Candle> = prices
            .iter()
            .enumerate()
            .map(|(i, &p)| Candle {
                timestamp: i as i64 * 86_400,
                open: p,
                high: p * 1.02,
                low: p * 0.98,
                close: p,
                volume: 1000.0,
            })
            .collect();
        EnrichedSeries::new(candles)
    }

    /// Buys on a fixed bar, sells on another. No indicator columns.
    struct ScriptedStrategy {
        buy_bar: usize,
        sell_bar: usize,
    }

    impl Strategy for ScriptedStrategy {
        fn name(&self) -> &str {
            "scripted"
        }
        fn indicator_specs(&self) -> Vec<IndicatorSpec> {
            Vec::new()
        }
        fn on_bar(&mut self, ctx: &BarContext) -> Result<Signal> {
            if ctx.index == self.buy_bar {
                Ok(Signal::Buy)
            } else if ctx.index == self.sell_bar {
                Ok(Signal::Sell)
            } else {
                Ok(Signal::Hold)
            }
        }
    }

    #[test]
    fn test_fill_happens_next_bar_open() {
        let series = make_series(&[100.0, 110.0, 120.0, 130.0, 140.0]);
        let engine = BacktestEngine::new(BrokerConfig::zero_cost());
        let mut strategy = ScriptedStrategy { buy_bar: 1, sell_bar: 3 };

        let run = engine.run(&series, &mut strategy).unwrap();
        assert_eq!(run.trades.len(), 1);
        let trade = &run.trades[0];
        // Signal at bar 1 → entry at bar 2's open; signal at bar 3 → exit at bar 4's open
        assert_eq!(trade.entry_timestamp, 2 * 86_400);
        assert_eq!(trade.entry_price, 120.0);
        assert_eq!(trade.exit_timestamp, 4 * 86_400);
        assert_eq!(trade.exit_price, 140.0);
    }

    #[test]
    fn test_equity_conservation_every_bar() {
        let series = make_series(&[100.0, 105.0, 102.0, 108.0, 112.0, 109.0]);
        let engine = BacktestEngine::new(BrokerConfig::default());
        let mut strategy = ScriptedStrategy { buy_bar: 0, sell_bar: 4 };

        let run = engine.run(&series, &mut strategy).unwrap();
        assert_eq!(run.equity_curve.len(), series.len());
        // After the trade closes, equity equals cash; while open,
        // equity - cash must equal size × close.
        let trade = &run.trades[0];
        let expected_cash_delta =
            trade.size * (trade.exit_price - trade.entry_price) - trade.entry_fee - trade.exit_fee;
        assert!(
            (run.final_cash - (BrokerConfig::default().initial_capital + expected_cash_delta)).abs()
                < 1e-9
        );
    }

    #[test]
    fn test_sell_without_position_rejected() {
        let series = make_series(&[100.0, 101.0, 102.0]);
        let engine = BacktestEngine::new(BrokerConfig::zero_cost());
        let mut strategy = ScriptedStrategy { buy_bar: usize::MAX, sell_bar: 0 };

        let run = engine.run(&series, &mut strategy).unwrap();
        assert!(run.trades.is_empty());
        assert_eq!(run.final_equity, BrokerConfig::default().initial_capital);
    }

    #[test]
    fn test_order_on_last_bar_never_fills() {
        let series = make_series(&[100.0, 101.0, 102.0]);
        let engine = BacktestEngine::new(BrokerConfig::zero_cost());
        let mut strategy = ScriptedStrategy { buy_bar: 2, sell_bar: usize::MAX };

        let run = engine.run(&series, &mut strategy).unwrap();
        assert!(run.trades.is_empty());
        assert!(run.open_position.is_none());
    }

    #[test]
    fn test_warmup_bars_skip_strategy() {
        struct CountingStrategy {
            calls: usize,
        }
        impl Strategy for CountingStrategy {
            fn name(&self) -> &str {
                "counting"
            }
            fn indicator_specs(&self) -> Vec<IndicatorSpec> {
                Vec::new()
            }
            fn on_bar(&mut self, _ctx: &BarContext) -> Result<Signal> {
                self.calls += 1;
                Ok(Signal::Hold)
            }
        }

        let mut series = make_series(&[100.0, 101.0, 102.0, 103.0]);
        series
            .add_indicator_column("sma", vec![f64::NAN, f64::NAN, 1.0, 1.0])
            .unwrap();
        let engine = BacktestEngine::new(BrokerConfig::zero_cost());
        let mut strategy = CountingStrategy { calls: 0 };
        engine.run(&series, &mut strategy).unwrap();
        assert_eq!(strategy.calls, 2);
    }

    #[test]
    fn test_insufficient_data_rejected() {
        struct NeedsHistory;
        impl Strategy for NeedsHistory {
            fn name(&self) -> &str {
                "needs_history"
            }
            fn indicator_specs(&self) -> Vec<IndicatorSpec> {
                Vec::new()
            }
            fn warmup_bars(&self) -> usize {
                10
            }
            fn on_bar(&mut self, _ctx: &BarContext) -> Result<Signal> {
                Ok(Signal::Hold)
            }
        }

        let series = make_series(&[100.0, 101.0, 102.0]);
        let engine = BacktestEngine::new(BrokerConfig::zero_cost());
        let result = engine.run(&series, &mut NeedsHistory);
        assert!(matches!(result, Err(BacktestError::InsufficientData { need: 10, got: 3 })));
    }

    #[test]
    fn test_strategy_error_terminates_run() {
        struct FailingStrategy;
        impl Strategy for FailingStrategy {
            fn name(&self) -> &str {
                "failing"
            }
            fn indicator_specs(&self) -> Vec<IndicatorSpec> {
                Vec::new()
            }
            fn on_bar(&mut self, ctx: &BarContext) -> Result<Signal> {
                Err(BacktestError::strategy(ctx.index, ctx.candle().timestamp, "boom"))
            }
        }

        let series = make_series(&[100.0, 101.0]);
        let engine = BacktestEngine::new(BrokerConfig::zero_cost());
        assert!(engine.run(&series, &mut FailingStrategy).is_err());
    }

    #[test]
    fn test_commission_charged_both_sides() {
        let series = make_series(&[100.0, 100.0, 100.0, 100.0]);
        let config = BrokerConfig::builder()
            .commission_maker(0.01)
            .slippage_pct(0.0)
            .build()
            .unwrap();
        let engine = BacktestEngine::new(config);
        let mut strategy = ScriptedStrategy { buy_bar: 0, sell_bar: 1 };

        let run = engine.run(&series, &mut strategy).unwrap();
        let trade = &run.trades[0];
        assert!(trade.entry_fee > 0.0);
        assert!(trade.exit_fee > 0.0);
        // Flat prices: pnl is exactly the two fees
        assert!((trade.pnl + trade.entry_fee + trade.exit_fee).abs() < 1e-9);
    }
}
