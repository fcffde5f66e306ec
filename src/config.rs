//! Engine configuration surface.
//!
//! One immutable [`AppConfig`] describes a whole run. Structurally invalid
//! configuration fails fast in [`AppConfig::validate`] with a readable
//! reason; recoverable problems downstream (missing cache files, failing
//! cells) are demoted to skipped or errored work items instead.
//!
//! Worker processes and threads never share the live config object — they
//! receive a JSON snapshot by value and rebuild it with
//! [`AppConfig::from_snapshot`].

use std::path::PathBuf;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::backtesting::{BrokerConfig, FeeType, Params};
use crate::walkforward::{Fitness, ParamGrid};

/// Configuration errors raised at startup.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// A field failed validation
    #[error("Invalid configuration '{field}': {reason}")]
    Invalid {
        /// Dotted field path
        field: String,
        /// Why it was rejected
        reason: String,
    },

    /// Snapshot could not be parsed
    #[error("Malformed configuration snapshot: {0}")]
    MalformedSnapshot(String),
}

/// Result type for configuration operations
pub type Result<T> = std::result::Result<T, ConfigError>;

fn invalid(field: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid { field: field.to_string(), reason: reason.into() }
}

/// Data source and cache location options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    /// Exchange identifier, recorded in the cache manifest
    pub exchange: String,
    /// Directory holding the OHLCV cache CSVs
    pub cache_directory: PathBuf,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self { exchange: "coinbase".to_string(), cache_directory: PathBuf::from("data/cache") }
    }
}

/// Trading cost options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradingConfig {
    /// Taker commission rate
    pub commission: f64,
    /// Maker commission rate
    pub commission_maker: f64,
    /// Slippage per fill
    pub slippage: f64,
    /// Which commission rate the broker applies
    pub fee_type: FeeType,
    /// Whether live exchange fee schedules override the configured rates
    pub use_exchange_fees: bool,
}

impl Default for TradingConfig {
    fn default() -> Self {
        Self {
            commission: 0.001,
            commission_maker: 0.001,
            slippage: 0.0005,
            fee_type: FeeType::Maker,
            use_exchange_fees: false,
        }
    }
}

/// Strategy selection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StrategyConfig {
    /// Registry name of the strategy
    pub name: String,
    /// Base parameters (overridden per cell during optimization)
    pub parameters: Params,
}

/// Walk-forward run options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalkForwardSettings {
    /// First day of the evaluated range (UTC)
    pub start_date: NaiveDate,
    /// Last day of the evaluated range (UTC)
    pub end_date: NaiveDate,
    /// Broker starting cash per backtest
    pub initial_capital: f64,
    /// Verbose progress logging
    pub verbose: bool,
    /// Symbols to run, `None` = every cached symbol
    pub symbols: Option<Vec<String>>,
    /// Timeframes to run, `None` = every cached timeframe
    pub timeframes: Option<Vec<String>>,
    /// Period specs (`"1Y/6M"`, …)
    pub periods: Vec<String>,
    /// Fitness function names
    pub fitness_functions: Vec<String>,
    /// Regime filter names
    pub filters: Vec<String>,
    /// Parameter search space
    pub parameter_ranges: ParamGrid,
}

impl Default for WalkForwardSettings {
    fn default() -> Self {
        Self {
            start_date: NaiveDate::from_ymd_opt(2020, 1, 1).expect("valid date"),
            end_date: NaiveDate::from_ymd_opt(2021, 12, 31).expect("valid date"),
            initial_capital: 10_000.0,
            verbose: false,
            symbols: None,
            timeframes: None,
            periods: vec!["1Y/6M".to_string()],
            fitness_functions: vec!["net_profit".to_string()],
            filters: Vec::new(),
            parameter_ranges: ParamGrid::new(),
        }
    }
}

/// Worker sizing mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParallelMode {
    /// Size the pool from the hardware profile
    Auto,
    /// Use `max_workers` verbatim
    Manual,
}

/// Parallel execution options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParallelConfig {
    /// How the worker count is chosen
    pub mode: ParallelMode,
    /// Worker count in manual mode
    pub max_workers: Option<usize>,
    /// Fraction of total RAM the pool may budget
    pub memory_safety_factor: f64,
    /// Physical cores held back from the pool
    pub cpu_reserve_cores: usize,
}

impl Default for ParallelConfig {
    fn default() -> Self {
        Self {
            mode: ParallelMode::Auto,
            max_workers: None,
            memory_safety_factor: 0.75,
            cpu_reserve_cores: 1,
        }
    }
}

/// Complete engine configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Data source and cache options
    pub data: DataConfig,
    /// Trading cost options
    pub trading: TradingConfig,
    /// Strategy selection
    pub strategy: StrategyConfig,
    /// Walk-forward options
    pub walkforward: WalkForwardSettings,
    /// Parallelism options
    pub parallel: ParallelConfig,
}

impl AppConfig {
    /// Validate the whole configuration, failing on the first problem.
    pub fn validate(&self) -> Result<()> {
        if self.strategy.name.is_empty() {
            return Err(invalid("strategy.name", "must not be empty"));
        }

        for (field, rate) in [
            ("trading.commission", self.trading.commission),
            ("trading.commission_maker", self.trading.commission_maker),
            ("trading.slippage", self.trading.slippage),
        ] {
            if !(0.0..=1.0).contains(&rate) {
                return Err(invalid(field, "must be between 0.0 and 1.0"));
            }
        }

        let wf = &self.walkforward;
        if wf.initial_capital <= 0.0 {
            return Err(invalid("walkforward.initial_capital", "must be positive"));
        }
        if wf.start_date >= wf.end_date {
            return Err(invalid("walkforward.start_date", "must be before end_date"));
        }
        if wf.periods.is_empty() {
            return Err(invalid("walkforward.periods", "at least one period is required"));
        }
        for period in &wf.periods {
            crate::walkforward::parse_period(period)
                .map_err(|e| invalid("walkforward.periods", e.to_string()))?;
        }
        if wf.fitness_functions.is_empty() {
            return Err(invalid(
                "walkforward.fitness_functions",
                "at least one fitness function is required",
            ));
        }
        for name in &wf.fitness_functions {
            Fitness::from_name(name)
                .map_err(|e| invalid("walkforward.fitness_functions", e.to_string()))?;
        }
        if wf.parameter_ranges.is_empty() {
            return Err(invalid(
                "walkforward.parameter_ranges",
                "at least one parameter range is required",
            ));
        }
        for (name, range) in &wf.parameter_ranges {
            range.validate(name).map_err(|e| invalid("walkforward.parameter_ranges", e.to_string()))?;
        }

        let parallel = &self.parallel;
        if !(0.0..=1.0).contains(&parallel.memory_safety_factor) {
            return Err(invalid("parallel.memory_safety_factor", "must be between 0.0 and 1.0"));
        }
        if parallel.mode == ParallelMode::Manual && parallel.max_workers.is_none() {
            return Err(invalid("parallel.max_workers", "required in manual mode"));
        }

        Ok(())
    }

    /// Broker configuration derived from the trading and capital options.
    pub fn broker_config(&self) -> BrokerConfig {
        BrokerConfig {
            initial_capital: self.walkforward.initial_capital,
            commission_taker: self.trading.commission,
            commission_maker: self.trading.commission_maker,
            fee_type: self.trading.fee_type,
            slippage_pct: self.trading.slippage,
            ..BrokerConfig::default()
        }
    }

    /// Serialize to the JSON snapshot handed to workers.
    pub fn snapshot(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Rebuild a config from a worker snapshot.
    pub fn from_snapshot(snapshot: &str) -> Result<Self> {
        serde_json::from_str(snapshot).map_err(|e| ConfigError::MalformedSnapshot(e.to_string()))
    }
}
