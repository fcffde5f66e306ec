//! Event-driven broker simulation and performance measurement.
//!
//! The pipeline is `prepare` (indicators + external series) → [`BacktestEngine`]
//! (bar-by-bar fills, ledger, equity curve) → [`BacktestMetrics`] (the full
//! per-run metric record). The walk-forward optimizer calls this pipeline
//! once per parameter cell, so everything here is allocation-conscious and
//! free of I/O.

mod config;
mod engine;
pub mod enrich;
mod error;
mod metrics;
mod monte_carlo;
mod position;
mod series;
mod signal;
pub mod strategy;

pub use config::{BrokerConfig, BrokerConfigBuilder, FeeType};
pub use engine::{BacktestEngine, BacktestRun};
pub use enrich::{DataProvider, ExternalColumn, prepare};
pub use error::{BacktestError, Result};
pub use metrics::BacktestMetrics;
pub use monte_carlo::{MONTE_CARLO_ITERATIONS, MONTE_CARLO_SEED, monte_carlo_score};
pub use position::{EquityPoint, Position, Trade};
pub use series::EnrichedSeries;
pub use signal::Signal;
pub use strategy::{
    BarContext, Params, Strategy, StrategyFactory, register_builtin_strategies,
    register_strategy, strategy_factory,
};
