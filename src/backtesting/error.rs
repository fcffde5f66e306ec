//! Error types for backtesting operations.

use thiserror::Error;

/// Backtest-specific errors
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum BacktestError {
    /// Invalid configuration parameter
    #[error("Invalid parameter '{param}': {reason}")]
    InvalidParameter {
        /// Parameter name
        param: String,
        /// Reason for invalidity
        reason: String,
    },

    /// Insufficient data for backtest
    #[error("Insufficient data: need at least {need} candles, got {got}")]
    InsufficientData {
        /// Minimum required candles
        need: usize,
        /// Actual candles provided
        got: usize,
    },

    /// Strategy error during execution, with the bar it failed on
    #[error("Strategy error at bar {bar_index} (ts {timestamp}): {message}")]
    Strategy {
        /// Index of the bar being processed
        bar_index: usize,
        /// Timestamp of the bar being processed
        timestamp: i64,
        /// What the strategy reported
        message: String,
    },

    /// A column the strategy requires is absent from the enriched series
    #[error("Required column '{0}' is missing from the enriched series")]
    MissingColumn(String),

    /// Column length does not match the bar series
    #[error("Column '{name}' has {len} values for {bars} bars")]
    ColumnLengthMismatch {
        /// Column name
        name: String,
        /// Column length
        len: usize,
        /// Bar count
        bars: usize,
    },

    /// Column name already present in the enriched series
    #[error("Column '{0}' is already present in the enriched series")]
    DuplicateColumn(String),

    /// Strategy name not found in the registry
    #[error("Unknown strategy: {0}")]
    UnknownStrategy(String),

    /// Indicator calculation failed
    #[error("Indicator calculation failed: {0}")]
    Indicator(#[from] crate::indicators::IndicatorError),

    /// External data provider failed
    #[error("Data provider '{provider}' failed: {message}")]
    DataProvider {
        /// Provider identifier
        provider: String,
        /// What went wrong
        message: String,
    },
}

/// Result type for backtest operations
pub type Result<T> = std::result::Result<T, BacktestError>;

impl BacktestError {
    /// Create an invalid parameter error
    pub fn invalid_param(param: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidParameter { param: param.into(), reason: reason.into() }
    }

    /// Create an insufficient data error
    pub fn insufficient_data(need: usize, got: usize) -> Self {
        Self::InsufficientData { need, got }
    }

    /// Create a strategy error with bar context
    pub fn strategy(bar_index: usize, timestamp: i64, message: impl Into<String>) -> Self {
        Self::Strategy { bar_index, timestamp, message: message.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_param_error() {
        let err = BacktestError::invalid_param("capital", "must be positive");
        assert!(err.to_string().contains("capital"));
        assert!(err.to_string().contains("must be positive"));
    }

    #[test]
    fn test_strategy_error_carries_bar_context() {
        let err = BacktestError::strategy(42, 1_600_000_000, "column read failed");
        let text = err.to_string();
        assert!(text.contains("42"));
        assert!(text.contains("1600000000"));
    }
}
