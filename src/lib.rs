//! # walkforward
//!
//! A walk-forward optimization engine for OHLCV trading strategies.
//!
//! Given a cached bar series, a registered strategy, and a parameter search
//! space, the engine discovers parameter values that performed well on past
//! data and measures how those values hold up on the unseen data that
//! follows each fit window.
//!
//! ## Features
//!
//! - CSV bar cache with a JSON manifest (stable external format)
//! - Indicator pre-computation with memoization across parameter trials
//! - Event-driven broker simulation (next-bar-open fills, maker/taker fees)
//! - 40+ performance metrics, Monte-Carlo scored, never NaN
//! - Rolling (in-sample, out-of-sample) window generation from `"1Y/6M"` specs
//! - Parallel grid search scored by configurable fitness functions
//! - Regime filters that rescore results per market condition
//! - Hardware-aware worker sizing and a parallel multi-market executor
//!
//! ## Quick Start
//!
//! ```no_run
//! use walkforward::backtesting::register_builtin_strategies;
//! use walkforward::config::AppConfig;
//! use walkforward::data::read_cache;
//! use walkforward::walkforward::WalkForwardRunner;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     register_builtin_strategies();
//!
//!     let config = AppConfig::default();
//!     config.validate()?;
//!
//!     let candles = read_cache(&config.data.cache_directory, "BTC/USD", "1d")?;
//!     let results = WalkForwardRunner::new(&config).run("BTC/USD", "1d", &candles)?;
//!
//!     for bucket in &results {
//!         println!(
//!             "{} {} [{}] {}: {:.2}% over {} windows",
//!             bucket.symbol,
//!             bucket.timeframe,
//!             bucket.period,
//!             bucket.fitness_function,
//!             bucket.total_oos_return_pct,
//!             bucket.successful_windows,
//!         );
//!     }
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

/// Event-driven broker simulation, strategies, and performance metrics
pub mod backtesting;
/// Engine configuration surface and worker snapshots
pub mod config;
/// OHLCV bar cache (CSV + manifest)
pub mod data;
/// Hardware profiling and the parallel executor
pub mod execution;
/// Regime filters and trade-ledger subsetting
pub mod filters;
/// Technical indicators and the pre-computation library
pub mod indicators;
/// Core bar types
pub mod models;
/// Results output (CSV, JSON lines)
pub mod report;
/// Walk-forward windows, grid search, and the runner
pub mod walkforward;

pub use backtesting::{BacktestEngine, BacktestMetrics, BrokerConfig, Signal, Strategy, Trade};
pub use config::AppConfig;
pub use models::Candle;
pub use walkforward::{WalkForwardResults, WalkForwardRunner, WalkForwardWindow};
