//! Parallel execution of independent backtests.
//!
//! Each `(symbol, timeframe)` work item runs in isolation: the worker
//! rebuilds its configuration from a serialized snapshot, loads bars from
//! the cache, runs one backtest, and returns a serializable outcome. A
//! failure in one worker never touches its siblings — every leaf returns
//! `Success`, `Skipped`, or `Error`, and the aggregation over outcomes is
//! exhaustive.

use std::time::Instant;

use chrono::{SecondsFormat, Utc};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::backtesting::{
    BacktestEngine, BacktestMetrics, prepare, register_builtin_strategies, strategy_factory,
};
use crate::config::AppConfig;
use crate::data::read_cache;
use crate::filters::register_builtin_filters;
use crate::indicators::IndicatorLibrary;
use crate::models::slice_candles;

/// Result payload of one successful backtest.
#[non_exhaustive]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestRecord {
    /// Symbol that was backtested
    pub symbol: String,
    /// Timeframe that was backtested
    pub timeframe: String,
    /// When the worker finished (ISO-8601)
    pub timestamp: String,
    /// Full metric record
    pub metrics: BacktestMetrics,
    /// Wall-clock seconds inside the worker
    pub execution_seconds: f64,
}

/// Outcome of one work item.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
#[non_exhaustive]
pub enum RunOutcome {
    /// Backtest completed and produced metrics
    Success(BacktestRecord),
    /// Work item could not run (e.g. no cached data); not a failure
    Skipped {
        /// Symbol of the skipped item
        symbol: String,
        /// Timeframe of the skipped item
        timeframe: String,
        /// Why it was skipped
        reason: String,
    },
    /// Worker hit an error; siblings are unaffected
    Error {
        /// Symbol of the failed item
        symbol: String,
        /// Timeframe of the failed item
        timeframe: String,
        /// Error description
        message: String,
    },
}

/// Aggregated outcomes of a parallel run.
#[non_exhaustive]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunResults {
    /// Every outcome, in completion order
    pub outcomes: Vec<RunOutcome>,
    /// Work items submitted
    pub total_combinations: usize,
    /// Workers used
    pub worker_count: usize,
    /// Items that produced metrics
    pub successful_runs: usize,
    /// Items skipped (no data)
    pub skipped_runs: usize,
    /// Items that errored
    pub failed_runs: usize,
    /// Wall-clock seconds for the whole run
    pub total_execution_seconds: f64,
}

impl RunResults {
    /// Driver exit code: 0 when every item succeeded, 1 otherwise.
    pub fn exit_code(&self) -> i32 {
        if self.failed_runs == 0 && self.skipped_runs == 0 { 0 } else { 1 }
    }
}

/// Dispatches independent backtests across a fixed-width worker pool.
pub struct ParallelExecutor {
    worker_count: usize,
    snapshot: String,
}

impl ParallelExecutor {
    /// Create an executor over `worker_count` workers; the configuration is
    /// captured as a snapshot so each worker rebuilds its own copy.
    pub fn new(config: &AppConfig, worker_count: usize) -> Self {
        Self { worker_count: worker_count.max(1), snapshot: config.snapshot() }
    }

    /// Run one backtest per `(symbol, timeframe)` combination.
    pub fn execute(&self, combinations: &[(String, String)]) -> RunResults {
        let started = Instant::now();
        info!(workers = self.worker_count, items = combinations.len(), "dispatching backtests");

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.worker_count)
            .build()
            .expect("worker pool construction failed");

        let outcomes: Vec<RunOutcome> = pool.install(|| {
            combinations
                .par_iter()
                .map(|(symbol, timeframe)| run_backtest_worker(&self.snapshot, symbol, timeframe))
                .collect()
        });

        let mut results = RunResults {
            total_combinations: combinations.len(),
            worker_count: self.worker_count,
            total_execution_seconds: started.elapsed().as_secs_f64(),
            ..Default::default()
        };
        for outcome in &outcomes {
            match outcome {
                RunOutcome::Success(_) => results.successful_runs += 1,
                RunOutcome::Skipped { .. } => results.skipped_runs += 1,
                RunOutcome::Error { .. } => results.failed_runs += 1,
            }
        }
        results.outcomes = outcomes;
        results
    }
}

/// Execute one work item in an isolated worker.
///
/// The worker owns everything it touches: configuration is rebuilt from the
/// snapshot, registries are (idempotently) populated, bars come from the
/// shared read-only cache, and the result is a plain serializable record.
fn run_backtest_worker(snapshot: &str, symbol: &str, timeframe: &str) -> RunOutcome {
    let error = |message: String| RunOutcome::Error {
        symbol: symbol.to_string(),
        timeframe: timeframe.to_string(),
        message,
    };

    let config = match AppConfig::from_snapshot(snapshot) {
        Ok(config) => config,
        Err(e) => return error(e.to_string()),
    };
    register_builtin_strategies();
    register_builtin_filters();

    let started = Instant::now();
    let candles = match read_cache(&config.data.cache_directory, symbol, timeframe) {
        Ok(candles) => candles,
        Err(e) => return error(e.to_string()),
    };
    if candles.is_empty() {
        return RunOutcome::Skipped {
            symbol: symbol.to_string(),
            timeframe: timeframe.to_string(),
            reason: "no cached data".to_string(),
        };
    }

    let wf = &config.walkforward;
    let start_ts = wf.start_date.and_hms_opt(0, 0, 0).expect("midnight exists").and_utc();
    let end_ts = wf.end_date.and_hms_opt(0, 0, 0).expect("midnight exists").and_utc();
    let slice = slice_candles(&candles, start_ts.timestamp(), end_ts.timestamp());
    if slice.is_empty() {
        return RunOutcome::Skipped {
            symbol: symbol.to_string(),
            timeframe: timeframe.to_string(),
            reason: format!("no data in {} .. {}", wf.start_date, wf.end_date),
        };
    }

    let factory = match strategy_factory(&config.strategy.name) {
        Ok(factory) => factory,
        Err(e) => return error(e.to_string()),
    };
    let mut strategy = factory(&config.strategy.parameters);
    let mut library = IndicatorLibrary::new();
    let broker = config.broker_config();

    let run = prepare(slice, strategy.as_ref(), symbol, &mut library)
        .and_then(|series| BacktestEngine::new(broker.clone()).run(&series, strategy.as_mut()));
    match run {
        Ok(run) => RunOutcome::Success(BacktestRecord {
            symbol: symbol.to_string(),
            timeframe: timeframe.to_string(),
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            metrics: BacktestMetrics::calculate(
                &run.trades,
                &run.equity_curve,
                broker.initial_capital,
            ),
            execution_seconds: started.elapsed().as_secs_f64(),
        }),
        Err(e) => error(e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backtesting::Params;
    use crate::config::{StrategyConfig, WalkForwardSettings};
    use crate::data::write_cache;
    use crate::models::Candle;
    use crate::walkforward::{ParamGrid, ParamRange};
    use chrono::NaiveDate;

    fn seeded_config(cache_dir: &std::path::Path) -> AppConfig {
        AppConfig {
            data: crate::config::DataConfig {
                exchange: "coinbase".to_string(),
                cache_directory: cache_dir.to_path_buf(),
            },
            strategy: StrategyConfig {
                name: "sma_cross".to_string(),
                parameters: Params::from([
                    ("fast_period".to_string(), 5.0),
                    ("slow_period".to_string(), 20.0),
                ]),
            },
            walkforward: WalkForwardSettings {
                start_date: NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(),
                end_date: NaiveDate::from_ymd_opt(2020, 12, 31).unwrap(),
                parameter_ranges: ParamGrid::from([(
                    "fast_period".to_string(),
                    ParamRange::new(5.0, 10.0, 5.0).unwrap(),
                )]),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn seed_cache(dir: &std::path::Path, symbol: &str) {
        let t0 = NaiveDate::from_ymd_opt(2020, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
            .and_utc()
            .timestamp();
        let candles: Vec<Candle> = (0..200)
            .map(|i| {
                let base = 100.0 + (i as f64 / 10.0).sin() * 5.0 + i as f64 * 0.1;
                Candle {
                    timestamp: t0 + i as i64 * 86_400,
                    open: base,
                    high: base * 1.01,
                    low: base * 0.99,
                    close: base,
                    volume: 500.0,
                }
            })
            .collect();
        write_cache(dir, symbol, "1d", &candles, None).unwrap();
    }

    #[test]
    #[serial_test::serial]
    fn test_execute_mixed_outcomes() {
        let dir = tempfile::tempdir().unwrap();
        seed_cache(dir.path(), "BTC/USD");
        let config = seeded_config(dir.path());

        let combinations = vec![
            ("BTC/USD".to_string(), "1d".to_string()),
            ("ETH/USD".to_string(), "1d".to_string()), // not cached
        ];
        let executor = ParallelExecutor::new(&config, 2);
        let results = executor.execute(&combinations);

        assert_eq!(results.total_combinations, 2);
        assert_eq!(results.successful_runs, 1);
        assert_eq!(results.skipped_runs, 1);
        assert_eq!(results.failed_runs, 0);
        assert_eq!(results.exit_code(), 1);

        let success = results
            .outcomes
            .iter()
            .find_map(|o| match o {
                RunOutcome::Success(record) => Some(record),
                _ => None,
            })
            .unwrap();
        assert_eq!(success.symbol, "BTC/USD");
        assert!(success.metrics.total_calendar_days > 0);
    }

    #[test]
    #[serial_test::serial]
    fn test_unknown_strategy_is_error_outcome() {
        let dir = tempfile::tempdir().unwrap();
        seed_cache(dir.path(), "BTC/USD");
        let mut config = seeded_config(dir.path());
        config.strategy.name = "definitely_not_registered".to_string();

        let executor = ParallelExecutor::new(&config, 1);
        let results = executor.execute(&[("BTC/USD".to_string(), "1d".to_string())]);
        assert_eq!(results.failed_runs, 1);
        assert_eq!(results.exit_code(), 1);
    }

    #[test]
    #[serial_test::serial]
    fn test_worker_parity_serial_vs_parallel() {
        let dir = tempfile::tempdir().unwrap();
        for symbol in ["BTC/USD", "ETH/USD", "SOL/USD", "ADA/USD"] {
            seed_cache(dir.path(), symbol);
        }
        let config = seeded_config(dir.path());
        let combinations: Vec<(String, String)> = ["BTC/USD", "ETH/USD", "SOL/USD", "ADA/USD"]
            .iter()
            .map(|s| (s.to_string(), "1d".to_string()))
            .collect();

        let serial = ParallelExecutor::new(&config, 1).execute(&combinations);
        let parallel = ParallelExecutor::new(&config, 4).execute(&combinations);

        assert_eq!(serial.successful_runs, parallel.successful_runs);
        let net = |results: &RunResults| -> Vec<(String, f64)> {
            let mut rows: Vec<(String, f64)> = results
                .outcomes
                .iter()
                .filter_map(|o| match o {
                    RunOutcome::Success(r) => Some((r.symbol.clone(), r.metrics.net_profit)),
                    _ => None,
                })
                .collect();
            rows.sort_by(|a, b| a.0.cmp(&b.0));
            rows
        };
        assert_eq!(net(&serial), net(&parallel));
    }

    #[test]
    fn test_exit_code_zero_when_clean() {
        let results = RunResults { successful_runs: 3, ..Default::default() };
        assert_eq!(results.exit_code(), 0);
    }
}
