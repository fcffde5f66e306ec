//! Moving Average Convergence Divergence (MACD).

use serde::{Deserialize, Serialize};

use super::ema::ema;
use super::{IndicatorError, Result};

/// MACD output: the MACD line, its signal line, and their difference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MacdOutput {
    /// MACD line (fast EMA − slow EMA)
    pub macd: Vec<f64>,
    /// Signal line (EMA of the MACD line)
    pub signal: Vec<f64>,
    /// Histogram (MACD − signal)
    pub histogram: Vec<f64>,
}

/// Calculate MACD with the given fast/slow/signal periods.
///
/// Standard parameters are (12, 26, 9). The signal line is an EMA over the
/// defined (non-NaN) part of the MACD line; warm-up elements of each series
/// are `f64::NAN`.
pub fn macd(
    data: &[f64],
    fast_period: usize,
    slow_period: usize,
    signal_period: usize,
) -> Result<MacdOutput> {
    if fast_period == 0 || slow_period == 0 || signal_period == 0 {
        return Err(IndicatorError::InvalidPeriod(
            "all periods must be greater than 0".to_string(),
        ));
    }
    if fast_period >= slow_period {
        return Err(IndicatorError::InvalidPeriod(
            "fast period must be less than slow period".to_string(),
        ));
    }

    let fast = ema(data, fast_period);
    let slow = ema(data, slow_period);

    let macd_line: Vec<f64> = fast.iter().zip(&slow).map(|(f, s)| f - s).collect();

    // Signal EMA runs over the defined suffix of the MACD line, then is
    // shifted back into position against the full-length series.
    let defined_from = macd_line.iter().position(|v| !v.is_nan()).unwrap_or(data.len());
    let signal_suffix = ema(&macd_line[defined_from..], signal_period);

    let mut signal = vec![f64::NAN; data.len()];
    signal[defined_from..].copy_from_slice(&signal_suffix);

    let histogram: Vec<f64> = macd_line.iter().zip(&signal).map(|(m, s)| m - s).collect();

    Ok(MacdOutput { macd: macd_line, signal, histogram })
}
