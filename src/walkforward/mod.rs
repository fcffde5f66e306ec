//! Walk-forward optimization: windows, parameter grids, fitness scoring,
//! and the orchestrating runner.
//!
//! Walk-forward evaluation discovers parameters that performed well on an
//! in-sample window, then measures those parameters on the unseen
//! out-of-sample window that follows it:
//!
//! ```text
//! |--- in-sample (IS) ---|--- out-of-sample (OOS) ---|
//!            |-- step --|--- IS ---|--- OOS ---|
//!                                  |-- step --|--- IS ---|--- OOS ---|
//! ```
//!
//! Aggregated OOS metrics across windows estimate how the strategy would
//! have behaved on data it was never fit to.

mod fitness;
mod optimizer;
mod param_grid;
mod period;
mod results;
mod runner;
mod windows;

use thiserror::Error;

pub use fitness::Fitness;
pub use optimizer::{OptimizedCell, WindowOptimizer, warmup_start_ts};
pub use param_grid::{ParamGrid, ParamRange, combination_count, parameter_combinations};
pub use period::parse_period;
pub use results::{WalkForwardResults, WalkForwardWindowResult};
pub use runner::WalkForwardRunner;
pub use windows::{MIN_IN_SAMPLE_BARS, WalkForwardWindow, generate_windows};

/// Walk-forward specific errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum WalkForwardError {
    /// Period spec does not match the `"X/Y"` grammar
    #[error("Invalid period spec '{0}': expected \"<int><unit>/<int><unit>\" with unit Y, M, W, or D")]
    InvalidPeriod(String),

    /// Fitness function name is not recognized
    #[error("Unknown fitness function: {0}")]
    UnknownFitness(String),

    /// Parameter range failed validation
    #[error("Invalid parameter range '{param}': {reason}")]
    InvalidRange {
        /// Parameter name
        param: String,
        /// Why it was rejected
        reason: String,
    },

    /// Grid search was asked to run with no parameter ranges
    #[error("Grid search requires at least one parameter range")]
    EmptyGrid,

    /// Every parameter cell in a window failed
    #[error("No parameter cell produced a usable backtest in window {window_index}")]
    NoUsableCells {
        /// Index of the failing window
        window_index: usize,
    },

    /// No bars available for the requested range
    #[error("No data available for {0}")]
    NoData(String),

    /// Backtest failure that could not be contained to a single cell
    #[error(transparent)]
    Backtest(#[from] crate::backtesting::BacktestError),

    /// Filter registry failure
    #[error(transparent)]
    Filter(#[from] crate::filters::FilterError),
}

/// Result type for walk-forward operations
pub type Result<T> = std::result::Result<T, WalkForwardError>;
