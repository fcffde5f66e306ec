//! Top-level walk-forward orchestration.
//!
//! For one `(symbol, timeframe)` the runner slices the bar series to the
//! configured date range, pre-computes every requested regime classification
//! once, then iterates filter configurations × periods × windows × fitness
//! functions. Each window optimizes on its in-sample slice and validates the
//! winning parameters on the out-of-sample slice that follows it.

use std::time::Instant;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::backtesting::{
    BacktestMetrics, Params, StrategyFactory, strategy_factory,
};
use crate::config::AppConfig;
use crate::filters::{
    RegimeColumns, apply_filter_config, generate_filter_configurations,
};
use crate::indicators::IndicatorLibrary;
use crate::models::{Candle, bar_duration_secs, slice_candles};

use super::fitness::Fitness;
use super::optimizer::{WindowOptimizer, evaluate_cell, warmup_start_ts};
use super::period::parse_period;
use super::results::{WalkForwardResults, WalkForwardWindowResult};
use super::windows::{WalkForwardWindow, generate_windows};
use super::{Result, WalkForwardError};

/// Orchestrates walk-forward analysis for one symbol/timeframe.
pub struct WalkForwardRunner<'a> {
    config: &'a AppConfig,
}

impl<'a> WalkForwardRunner<'a> {
    /// Create a runner over a validated configuration.
    pub fn new(config: &'a AppConfig) -> Self {
        Self { config }
    }

    /// Run the full analysis and return one result bucket per
    /// (period, fitness, filter configuration).
    pub fn run(
        &self,
        symbol: &str,
        timeframe: &str,
        candles: &[Candle],
    ) -> Result<Vec<WalkForwardResults>> {
        if candles.is_empty() {
            return Err(WalkForwardError::NoData(format!("{symbol} {timeframe}")));
        }

        let wf = &self.config.walkforward;
        let start: DateTime<Utc> =
            wf.start_date.and_hms_opt(0, 0, 0).expect("midnight exists").and_utc();
        let end: DateTime<Utc> =
            wf.end_date.and_hms_opt(0, 0, 0).expect("midnight exists").and_utc();

        let candles = slice_candles(candles, start.timestamp(), end.timestamp());
        if candles.is_empty() {
            return Err(WalkForwardError::NoData(format!(
                "{symbol} {timeframe} in {} .. {}",
                wf.start_date, wf.end_date
            )));
        }

        // Regime classifications are computed once, before any loop.
        let regimes = RegimeColumns::compute(candles, &wf.filters)?;
        let filter_configurations = generate_filter_configurations(&wf.filters)?;

        let fitness: Vec<Fitness> = wf
            .fitness_functions
            .iter()
            .map(|name| Fitness::from_name(name))
            .collect::<Result<_>>()?;
        let factory = strategy_factory(&self.config.strategy.name)?;
        let broker = self.config.broker_config();

        let mut all_results = Vec::new();

        for filter_config in &filter_configurations {
            for period in &wf.periods {
                let (is_days, oos_days) = parse_period(period)?;
                let windows = generate_windows(start, end, is_days, oos_days, candles);
                if windows.is_empty() {
                    info!(symbol, timeframe, %period, "no valid windows for period");
                    continue;
                }

                let mut buckets: Vec<WalkForwardResults> = fitness
                    .iter()
                    .map(|f| {
                        WalkForwardResults::new(
                            symbol,
                            timeframe,
                            period,
                            f.name(),
                            filter_config.clone(),
                        )
                    })
                    .collect();

                let period_started = Instant::now();

                for window in &windows {
                    if wf.verbose {
                        info!(
                            symbol,
                            timeframe,
                            window = window.window_index,
                            total = windows.len(),
                            %period,
                            "optimizing window"
                        );
                    }

                    let optimizer = WindowOptimizer {
                        candles,
                        broker: &broker,
                        factory: &factory,
                        symbol,
                        grid: &wf.parameter_ranges,
                        fitness: &fitness,
                    };
                    let best_by_fitness = match optimizer.optimize(window) {
                        Ok(best) => best,
                        Err(e) => {
                            warn!(
                                symbol,
                                timeframe,
                                window = window.window_index,
                                error = %e,
                                "window optimization failed"
                            );
                            // The window still counts: record it as failed in
                            // every bucket so aggregates reflect the windows
                            // actually generated, not just the ones that ran.
                            for bucket in &mut buckets {
                                bucket.window_results.push(failed_window_result(
                                    window,
                                    self.config.walkforward.initial_capital,
                                ));
                            }
                            continue;
                        }
                    };

                    for (bucket, f) in buckets.iter_mut().zip(&fitness) {
                        let Some(cell) = best_by_fitness.get(f.name()) else {
                            continue;
                        };
                        let window_result = self.evaluate_out_of_sample(
                            candles,
                            window,
                            &factory,
                            &cell.params,
                            &cell.metrics,
                            cell.optimization_seconds,
                            &regimes,
                            filter_config,
                            symbol,
                        );
                        bucket.window_results.push(window_result);
                    }
                }

                let elapsed = period_started.elapsed().as_secs_f64();
                for mut bucket in buckets {
                    bucket.total_execution_seconds = elapsed;
                    bucket.calculate_aggregates();
                    all_results.push(bucket);
                }
            }
        }

        Ok(all_results)
    }

    /// Validate one window's best parameters on its out-of-sample slice.
    #[allow(clippy::too_many_arguments)]
    fn evaluate_out_of_sample(
        &self,
        candles: &[Candle],
        window: &WalkForwardWindow,
        factory: &StrategyFactory,
        best_params: &Params,
        is_metrics: &BacktestMetrics,
        optimization_seconds: f64,
        regimes: &RegimeColumns,
        filter_config: &crate::filters::FilterConfig,
        symbol: &str,
    ) -> WalkForwardWindowResult {
        let mut result = WalkForwardWindowResult {
            window_index: window.window_index,
            in_sample_start: window.in_sample_start,
            in_sample_end: window.in_sample_end,
            out_sample_start: window.out_sample_start,
            out_sample_end: window.out_sample_end,
            best_parameters: best_params.clone(),
            in_sample_metrics: is_metrics.clone(),
            out_sample_metrics: None,
            optimization_seconds,
            oos_backtest_seconds: 0.0,
        };

        // OOS slice starts early enough for the winning parameters'
        // indicators to stabilize by the nominal OOS start.
        let bar_secs = bar_duration_secs(candles).unwrap_or(86_400);
        let series_start = candles[0].timestamp;
        let warm_start = warmup_start_ts(
            best_params,
            bar_secs,
            window.out_sample_start.timestamp(),
            series_start,
        );
        let slice = slice_candles(candles, warm_start, window.out_sample_end.timestamp() - 1);
        if slice.is_empty() {
            warn!(window = window.window_index, "no OOS data with warm-up");
            return result;
        }

        let broker = self.config.broker_config();
        let mut library = IndicatorLibrary::new();
        let oos_started = Instant::now();
        let outcome = evaluate_oos_run(
            slice,
            factory,
            best_params,
            &broker,
            symbol,
            &mut library,
            regimes,
            filter_config,
        );
        result.oos_backtest_seconds = oos_started.elapsed().as_secs_f64();

        match outcome {
            Ok(oos_metrics) => {
                // Efficiency compares OOS to IS return; a non-positive IS
                // return makes the ratio meaningless and reads 0.
                let efficiency = if is_metrics.total_return_pct > 0.0 {
                    oos_metrics.total_return_pct / is_metrics.total_return_pct
                } else {
                    0.0
                };
                result.out_sample_metrics = Some(oos_metrics.with_efficiency(efficiency));
            }
            Err(e) => {
                warn!(window = window.window_index, error = %e, "OOS backtest failed");
            }
        }

        result
    }
}

/// Window result recording a whole-window failure: no parameters were
/// selected and no OOS pass ran. The in-sample slot carries the zeroed
/// metric record so the bucket counts the window as failed without skewing
/// any aggregate sums.
fn failed_window_result(
    window: &WalkForwardWindow,
    initial_capital: f64,
) -> WalkForwardWindowResult {
    WalkForwardWindowResult {
        window_index: window.window_index,
        in_sample_start: window.in_sample_start,
        in_sample_end: window.in_sample_end,
        out_sample_start: window.out_sample_start,
        out_sample_end: window.out_sample_end,
        best_parameters: Params::new(),
        in_sample_metrics: BacktestMetrics::calculate(&[], &[], initial_capital),
        out_sample_metrics: None,
        optimization_seconds: 0.0,
        oos_backtest_seconds: 0.0,
    }
}

/// Run the OOS backtest and, under a non-empty filter configuration, rescore
/// the metrics from the filtered trade ledger (same equity curve).
#[allow(clippy::too_many_arguments)]
fn evaluate_oos_run(
    slice: &[Candle],
    factory: &StrategyFactory,
    params: &Params,
    broker: &crate::backtesting::BrokerConfig,
    symbol: &str,
    library: &mut IndicatorLibrary,
    regimes: &RegimeColumns,
    filter_config: &crate::filters::FilterConfig,
) -> crate::backtesting::Result<BacktestMetrics> {
    if filter_config.is_empty() {
        return evaluate_cell(slice, factory, params, broker, symbol, library);
    }

    // Filtered variant needs the raw ledger, so run the engine directly.
    let mut strategy = factory(params);
    let series = crate::backtesting::prepare(slice, strategy.as_ref(), symbol, library)?;
    let run = crate::backtesting::BacktestEngine::new(broker.clone())
        .run(&series, strategy.as_mut())?;
    let filtered = apply_filter_config(&run.trades, regimes, filter_config);
    Ok(BacktestMetrics::calculate(&filtered, &run.equity_curve, broker.initial_capital))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backtesting::register_builtin_strategies;
    use crate::config::{AppConfig, StrategyConfig, WalkForwardSettings};
    use crate::filters::register_builtin_filters;
    use crate::walkforward::param_grid::{ParamGrid, ParamRange};
    use chrono::NaiveDate;

    fn wave_candles(n: usize) -> Vec<Candle> {
        let t0 = NaiveDate::from_ymd_opt(2020, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
            .and_utc()
            .timestamp();
        (0..n)
            .map(|i| {
                let base =
                    100.0 + i as f64 * 0.05 + 10.0 * (i as f64 / 20.0).sin();
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

    fn test_config() -> AppConfig {
        AppConfig {
            strategy: StrategyConfig {
                name: "sma_cross".to_string(),
                parameters: Params::new(),
            },
            walkforward: WalkForwardSettings {
                start_date: NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(),
                end_date: NaiveDate::from_ymd_opt(2021, 12, 31).unwrap(),
                periods: vec!["6M/3M".to_string()],
                fitness_functions: vec!["net_profit".to_string()],
                parameter_ranges: ParamGrid::from([
                    ("fast_period".to_string(), ParamRange::new(5.0, 10.0, 5.0).unwrap()),
                    ("slow_period".to_string(), ParamRange::new(20.0, 30.0, 10.0).unwrap()),
                ]),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Window count the generator yields for the test config's range/period.
    fn expected_window_count(config: &AppConfig, candles: &[Candle]) -> usize {
        let start = config.walkforward.start_date.and_hms_opt(0, 0, 0).unwrap().and_utc();
        let end = config.walkforward.end_date.and_hms_opt(0, 0, 0).unwrap().and_utc();
        let (is_days, oos_days) = parse_period(&config.walkforward.periods[0]).unwrap();
        generate_windows(start, end, is_days, oos_days, candles).len()
    }

    #[test]
    #[serial_test::serial]
    fn test_runner_produces_window_results() {
        register_builtin_strategies();
        let config = test_config();
        config.validate().unwrap();
        let candles = wave_candles(730);

        let runner = WalkForwardRunner::new(&config);
        let results = runner.run("BTC/USD", "1d", &candles).unwrap();

        // One bucket: single period × single fitness × baseline filter
        assert_eq!(results.len(), 1);
        let bucket = &results[0];
        assert_eq!(bucket.fitness_function, "net_profit");
        assert!(bucket.filter_config.is_empty());
        // Every generated window must be accounted for, succeeded or failed
        assert_eq!(bucket.total_windows, expected_window_count(&config, &candles));
        assert_eq!(bucket.total_windows, bucket.window_results.len());

        for window in &bucket.window_results {
            assert!(window.in_sample_start < window.in_sample_end);
            if let Some(oos) = &window.out_sample_metrics {
                // Efficiency rule: IS ≤ 0 → 0
                if window.in_sample_metrics.total_return_pct <= 0.0 {
                    assert_eq!(oos.walkforward_efficiency, 0.0);
                }
            }
        }
    }

    #[test]
    #[serial_test::serial]
    fn test_runner_with_filters_produces_baseline_and_filtered_buckets() {
        register_builtin_strategies();
        register_builtin_filters();
        let mut config = test_config();
        config.walkforward.filters = vec!["volatility_regime_atr".to_string()];
        let candles = wave_candles(730);

        let runner = WalkForwardRunner::new(&config);
        let results = runner.run("BTC/USD", "1d", &candles).unwrap();

        // baseline + 3 labels, one bucket each
        assert_eq!(results.len(), 4);
        assert!(results.iter().any(|r| r.filter_config.is_empty()));
        let filtered: Vec<_> = results.iter().filter(|r| !r.filter_config.is_empty()).collect();
        assert_eq!(filtered.len(), 3);

        // Filtered buckets can only lose trades relative to the baseline
        let baseline = results.iter().find(|r| r.filter_config.is_empty()).unwrap();
        for bucket in filtered {
            for (fw, bw) in bucket.window_results.iter().zip(&baseline.window_results) {
                if let (Some(f), Some(b)) = (&fw.out_sample_metrics, &bw.out_sample_metrics) {
                    assert!(f.num_trades <= b.num_trades);
                }
            }
        }
    }

    #[test]
    #[serial_test::serial]
    fn test_failed_optimization_recorded_as_failed_window() {
        register_builtin_strategies();
        let mut config = test_config();
        // An empty grid makes every window's grid search fail outright
        config.walkforward.parameter_ranges = ParamGrid::new();
        let candles = wave_candles(730);
        let expected = expected_window_count(&config, &candles);
        assert!(expected > 0);

        let runner = WalkForwardRunner::new(&config);
        let results = runner.run("BTC/USD", "1d", &candles).unwrap();
        assert_eq!(results.len(), 1);
        let bucket = &results[0];

        assert_eq!(bucket.total_windows, expected);
        assert_eq!(bucket.failed_windows, expected);
        assert_eq!(bucket.successful_windows, 0);
        assert_eq!(bucket.total_oos_net_profit, 0.0);
        for window in &bucket.window_results {
            assert!(window.out_sample_metrics.is_none());
            assert!(window.best_parameters.is_empty());
        }
    }

    #[test]
    #[serial_test::serial]
    fn test_runner_rejects_empty_series() {
        register_builtin_strategies();
        let config = test_config();
        let runner = WalkForwardRunner::new(&config);
        assert!(matches!(
            runner.run("BTC/USD", "1d", &[]),
            Err(WalkForwardError::NoData(_))
        ));
    }
}
