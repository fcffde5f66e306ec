//! In-sample grid search over one walk-forward window.
//!
//! Every parameter assignment is an independent backtest, so cells evaluate
//! in parallel; the per-fitness reduction then walks the results in
//! enumeration order, which keeps tie-breaking ("first seen") identical no
//! matter how many workers ran the cells.

use std::collections::BTreeMap;
use std::time::Instant;

use rayon::prelude::*;
use tracing::warn;

use crate::backtesting::{
    BacktestEngine, BacktestMetrics, BrokerConfig, Params, StrategyFactory, prepare,
};
use crate::indicators::IndicatorLibrary;
use crate::models::{Candle, bar_duration_secs, slice_candles};

use super::fitness::Fitness;
use super::param_grid::{ParamGrid, parameter_combinations};
use super::windows::WalkForwardWindow;
use super::{Result, WalkForwardError};

/// Warm-up margin over the longest indicator lookback.
const WARMUP_FACTOR: f64 = 1.2;

/// Start timestamp of a slice that gives indicators room to stabilize
/// before `nominal_start_ts`: the largest numeric parameter value times the
/// bar duration, padded by 20%, clamped to the series start.
pub fn warmup_start_ts(
    params: &Params,
    bar_secs: i64,
    nominal_start_ts: i64,
    series_start_ts: i64,
) -> i64 {
    let max_param = params.values().copied().fold(0.0f64, f64::max);
    let warmup_secs = (max_param * bar_secs as f64 * WARMUP_FACTOR) as i64;
    (nominal_start_ts - warmup_secs).max(series_start_ts)
}

/// One backtest: construct the strategy, enrich, simulate, measure.
pub(crate) fn evaluate_cell(
    candles: &[Candle],
    factory: &StrategyFactory,
    params: &Params,
    broker: &BrokerConfig,
    symbol: &str,
    library: &mut IndicatorLibrary,
) -> crate::backtesting::Result<BacktestMetrics> {
    let mut strategy = factory(params);
    let series = prepare(candles, strategy.as_ref(), symbol, library)?;
    let run = BacktestEngine::new(broker.clone()).run(&series, strategy.as_mut())?;
    Ok(BacktestMetrics::calculate(&run.trades, &run.equity_curve, broker.initial_capital))
}

/// The winning parameter cell for one fitness function.
#[derive(Debug, Clone)]
pub struct OptimizedCell {
    /// Best parameter assignment
    pub params: Params,
    /// In-sample metrics produced by that assignment
    pub metrics: BacktestMetrics,
    /// Wall-clock seconds the whole grid search took
    pub optimization_seconds: f64,
}

/// Grid-search optimizer for a single in-sample window.
pub struct WindowOptimizer<'a> {
    /// Bar series covering at least the window plus warm-up room
    pub candles: &'a [Candle],
    /// Broker configuration shared by every cell
    pub broker: &'a BrokerConfig,
    /// Factory building the strategy from each parameter assignment
    pub factory: &'a StrategyFactory,
    /// Symbol, for data providers and logging
    pub symbol: &'a str,
    /// Parameter space to exhaust
    pub grid: &'a ParamGrid,
    /// Fitness functions to score by
    pub fitness: &'a [Fitness],
}

impl WindowOptimizer<'_> {
    /// Exhaust the grid on the window's in-sample slice and return, per
    /// fitness function, the assignment with the highest score.
    ///
    /// Failing cells (strategy errors, empty slices) are logged and skipped;
    /// the search only errors when the grid is empty or no cell succeeds.
    pub fn optimize(&self, window: &WalkForwardWindow) -> Result<BTreeMap<String, OptimizedCell>> {
        let combinations = parameter_combinations(self.grid);
        if combinations.is_empty() {
            return Err(WalkForwardError::EmptyGrid);
        }

        let bar_secs = bar_duration_secs(self.candles).unwrap_or(86_400);
        let series_start = self.candles.first().map_or(0, |c| c.timestamp);
        let is_start_ts = window.in_sample_start.timestamp();
        let is_end_ts = window.in_sample_end.timestamp();

        let started = Instant::now();

        // Evaluate every cell in parallel. Each rayon worker keeps its own
        // indicator cache; collect preserves enumeration order.
        let evaluations: Vec<Option<(Params, BacktestMetrics)>> = combinations
            .into_par_iter()
            .map_init(IndicatorLibrary::new, |library, params| {
                let warm_start = warmup_start_ts(&params, bar_secs, is_start_ts, series_start);
                // In-sample interval is half-open: bars strictly before its end.
                let slice = slice_candles(self.candles, warm_start, is_end_ts - 1);
                if slice.is_empty() {
                    warn!(params = ?params, "in-sample slice is empty, cell skipped");
                    return None;
                }
                match evaluate_cell(slice, self.factory, &params, self.broker, self.symbol, library)
                {
                    Ok(metrics) => Some((params, metrics)),
                    Err(e) => {
                        warn!(params = ?params, error = %e, "parameter cell failed");
                        None
                    }
                }
            })
            .collect();

        let optimization_seconds = started.elapsed().as_secs_f64();

        let successes: Vec<&(Params, BacktestMetrics)> =
            evaluations.iter().flatten().collect();
        if successes.is_empty() {
            return Err(WalkForwardError::NoUsableCells {
                window_index: window.window_index,
            });
        }

        // Sequential reduction in enumeration order: strict comparison keeps
        // the first-seen assignment on ties.
        let mut best: BTreeMap<String, OptimizedCell> = BTreeMap::new();
        for fitness in self.fitness {
            let mut winner: Option<(&Params, &BacktestMetrics, f64)> = None;
            for (params, metrics) in &successes {
                let score = fitness.score(metrics);
                if score.is_nan() {
                    continue;
                }
                if winner.is_none_or(|(_, _, best_score)| score > best_score) {
                    winner = Some((params, metrics, score));
                }
            }
            if let Some((params, metrics, _)) = winner {
                best.insert(
                    fitness.name().to_string(),
                    OptimizedCell {
                        params: params.clone(),
                        metrics: metrics.clone(),
                        optimization_seconds,
                    },
                );
            }
        }

        Ok(best)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backtesting::register_builtin_strategies;
    use crate::backtesting::strategy_factory;
    use crate::walkforward::param_grid::ParamRange;
    use chrono::{TimeZone, Utc};

    fn trending_candles(n: usize) -> Vec<Candle> {
        let t0 = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap().timestamp();
        (0..n)
            .map(|i| {
                let base = 100.0 + i as f64 * 0.5 + ((i % 7) as f64 - 3.0);
                Candle {
                    timestamp: t0 + i as i64 * 86_400,
                    open: base,
                    high: base * 1.02,
                    low: base * 0.98,
                    close: base,
                    volume: 1_000.0,
                }
            })
            .collect()
    }

    fn make_window(candles: &[Candle], is_bars: usize) -> WalkForwardWindow {
        WalkForwardWindow {
            window_index: 0,
            in_sample_start: Utc.timestamp_opt(candles[0].timestamp, 0).unwrap(),
            in_sample_end: Utc.timestamp_opt(candles[is_bars].timestamp, 0).unwrap(),
            out_sample_start: Utc.timestamp_opt(candles[is_bars].timestamp, 0).unwrap(),
            out_sample_end: Utc
                .timestamp_opt(candles[candles.len() - 1].timestamp, 0)
                .unwrap(),
        }
    }

    #[test]
    #[serial_test::serial]
    fn test_optimizer_returns_cell_per_fitness() {
        register_builtin_strategies();
        let candles = trending_candles(300);
        let window = make_window(&candles, 200);
        let broker = BrokerConfig::zero_cost();
        let factory = strategy_factory("sma_cross").unwrap();
        let grid = ParamGrid::from([
            ("fast_period".to_string(), ParamRange::new(5.0, 15.0, 5.0).unwrap()),
            ("slow_period".to_string(), ParamRange::new(20.0, 40.0, 10.0).unwrap()),
        ]);
        let fitness = [Fitness::NetProfit, Fitness::SharpeRatio];

        let optimizer = WindowOptimizer {
            candles: &candles,
            broker: &broker,
            factory: &factory,
            symbol: "TEST/USD",
            grid: &grid,
            fitness: &fitness,
        };

        let best = optimizer.optimize(&window).unwrap();
        assert_eq!(best.len(), 2);
        let cell = &best["net_profit"];
        assert!(cell.params.contains_key("fast_period"));
        assert!(cell.optimization_seconds >= 0.0);
    }

    #[test]
    #[serial_test::serial]
    fn test_empty_grid_is_error() {
        register_builtin_strategies();
        let candles = trending_candles(150);
        let window = make_window(&candles, 120);
        let broker = BrokerConfig::zero_cost();
        let factory = strategy_factory("sma_cross").unwrap();
        let grid = ParamGrid::new();
        let fitness = [Fitness::NetProfit];

        let optimizer = WindowOptimizer {
            candles: &candles,
            broker: &broker,
            factory: &factory,
            symbol: "TEST/USD",
            grid: &grid,
            fitness: &fitness,
        };
        assert!(matches!(optimizer.optimize(&window), Err(WalkForwardError::EmptyGrid)));
    }

    #[test]
    fn test_warmup_start_clamped_to_series() {
        let params = Params::from([("slow_period".to_string(), 50.0)]);
        // 50 bars × 1h × 1.2 = 216000s of warm-up
        let ts = warmup_start_ts(&params, 3_600, 1_000_000, 900_000);
        assert_eq!(ts, 1_000_000 - 216_000);
        let clamped = warmup_start_ts(&params, 3_600, 1_000_000, 999_000);
        assert_eq!(clamped, 999_000);
    }
}
