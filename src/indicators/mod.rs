//! Technical indicators and the pre-computation library.
//!
//! Kernels operate on plain slices and return one value per input bar, with
//! `f64::NAN` marking the warm-up prefix where the indicator is not yet
//! defined. The broker skips strategy invocation on bars whose required
//! columns are still NaN, so no strategy ever reads an uncomputed value.
//!
//! [`IndicatorLibrary`] wraps the kernels with a memoization cache keyed by
//! `(indicator type, parameters, data fingerprint)` so walk-forward trials
//! that share a data slice reuse columns instead of recomputing them.

mod atr;
mod bollinger;
mod ema;
mod library;
mod macd;
mod rsi;
mod sma;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub use atr::atr;
pub use bollinger::{BollingerOutput, bollinger};
pub use ema::ema;
pub use library::{
    CacheStats, CustomIndicatorFn, IndicatorLibrary, IndicatorOutput, custom_indicator,
    register_custom_indicator,
};
pub use macd::{MacdOutput, macd};
pub use rsi::rsi;
pub use sma::sma;

/// Error type for indicator calculations
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum IndicatorError {
    /// Not enough data points to calculate the indicator
    #[error("Insufficient data: need at least {need} data points, got {got}")]
    InsufficientData {
        /// Minimum number of data points required
        need: usize,
        /// Actual number of data points provided
        got: usize,
    },

    /// Invalid period parameter provided
    #[error("Invalid period: {0}")]
    InvalidPeriod(String),

    /// Indicator type is not a built-in and not registered as custom
    #[error("Unknown indicator type: {0}")]
    UnknownIndicator(String),

    /// A required parameter is absent from the spec
    #[error("Indicator parameter '{0}' is missing")]
    MissingParam(String),

    /// Custom indicator name collides with an existing registration
    #[error("Indicator '{0}' is already registered")]
    DuplicateName(String),
}

/// Result type for indicator calculations
pub type Result<T> = std::result::Result<T, IndicatorError>;

/// Specification of one indicator computation: which indicator, with which
/// parameters, materialized under which column name.
///
/// Immutable once built; its canonical JSON form keys the memoization cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorSpec {
    /// Indicator type name (`"SMA"`, `"RSI"`, … or a custom registration)
    pub indicator_type: String,
    /// Numeric parameters, by name
    pub params: BTreeMap<String, f64>,
    /// Output column name (multi-output indicators append `_{sub_name}`)
    pub column_name: String,
}

impl IndicatorSpec {
    /// Build a spec from an indicator type, parameter pairs, and column name.
    pub fn new(
        indicator_type: impl Into<String>,
        params: impl IntoIterator<Item = (String, f64)>,
        column_name: impl Into<String>,
    ) -> Self {
        Self {
            indicator_type: indicator_type.into(),
            params: params.into_iter().collect(),
            column_name: column_name.into(),
        }
    }

    /// Canonical JSON of the parameter map (sorted keys, stable across runs).
    pub fn canonical_params(&self) -> String {
        serde_json::to_string(&self.params).unwrap_or_default()
    }

    /// Fetch a required parameter as `usize`, truncating the stored float.
    pub fn usize_param(&self, name: &str) -> Result<usize> {
        self.float_param(name).map(|v| v as usize)
    }

    /// Fetch a required parameter as `f64`.
    pub fn float_param(&self, name: &str) -> Result<f64> {
        self.params
            .get(name)
            .copied()
            .ok_or_else(|| IndicatorError::MissingParam(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_params_sorted() {
        let spec = IndicatorSpec::new(
            "MACD",
            [
                ("slow".to_string(), 26.0),
                ("fast".to_string(), 12.0),
                ("signal".to_string(), 9.0),
            ],
            "MACD",
        );
        // BTreeMap keys serialize sorted, so equal specs share a cache key
        assert_eq!(spec.canonical_params(), r#"{"fast":12.0,"signal":9.0,"slow":26.0}"#);
    }

    #[test]
    fn test_missing_param_errors() {
        let spec = IndicatorSpec::new("SMA", [], "SMA_20");
        assert!(matches!(spec.usize_param("period"), Err(IndicatorError::MissingParam(_))));
    }
}
