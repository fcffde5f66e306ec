//! Volatility regime filters.

use crate::indicators::{atr, sma};
use crate::models::Candle;

use super::RegimeFilter;

/// Tercile boundaries of the finite values in `series`.
fn tercile_bounds(series: &[f64]) -> Option<(f64, f64)> {
    let mut finite: Vec<f64> = series.iter().copied().filter(|v| v.is_finite()).collect();
    if finite.is_empty() {
        return None;
    }
    finite.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let n = finite.len();
    Some((finite[n / 3], finite[(2 * n / 3).min(n - 1)]))
}

/// Bin each value into `low` / `normal` / `high` against tercile bounds.
/// Warm-up (NaN) values read `normal`.
///
/// When the two bounds are distinct the comparison is inclusive, so a flat
/// cluster of values sitting exactly on a bound still lands in its tercile.
/// Collapsed bounds (heavily tied distributions) fall back to strict
/// comparisons, which labels a constant series entirely `normal`.
fn classify_terciles(series: &[f64]) -> Vec<String> {
    let Some((low_bound, high_bound)) = tercile_bounds(series) else {
        return vec!["normal".to_string(); series.len()];
    };
    let inclusive = low_bound < high_bound;
    series
        .iter()
        .map(|&v| {
            if !v.is_finite() {
                "normal"
            } else if v < low_bound || (inclusive && v == low_bound) {
                "low"
            } else if v > high_bound || (inclusive && v == high_bound) {
                "high"
            } else {
                "normal"
            }
        })
        .map(str::to_string)
        .collect()
}

/// Labels each bar by where its ATR sits in the series' ATR distribution.
///
/// The production label set is exactly `{high, normal, low}`; bars inside
/// the ATR warm-up are labeled `normal`.
pub struct VolatilityRegimeAtr {
    period: usize,
}

impl VolatilityRegimeAtr {
    /// ATR regime filter with the standard 14-bar period.
    pub fn new() -> Self {
        Self { period: 14 }
    }
}

impl Default for VolatilityRegimeAtr {
    fn default() -> Self {
        Self::new()
    }
}

impl RegimeFilter for VolatilityRegimeAtr {
    fn name(&self) -> &'static str {
        "volatility_regime_atr"
    }

    fn labels(&self) -> Vec<String> {
        vec!["high".to_string(), "normal".to_string(), "low".to_string()]
    }

    fn compute_classification(&self, candles: &[Candle]) -> Vec<String> {
        classify_terciles(&atr(candles, self.period))
    }
}

/// Labels each bar by the rolling standard deviation of close-to-close
/// returns, binned the same way as the ATR filter.
pub struct VolatilityRegimeStdDev {
    window: usize,
}

impl VolatilityRegimeStdDev {
    /// Std-dev regime filter with a 20-bar window.
    pub fn new() -> Self {
        Self { window: 20 }
    }
}

impl Default for VolatilityRegimeStdDev {
    fn default() -> Self {
        Self::new()
    }
}

impl RegimeFilter for VolatilityRegimeStdDev {
    fn name(&self) -> &'static str {
        "volatility_regime_stddev"
    }

    fn labels(&self) -> Vec<String> {
        vec!["high".to_string(), "normal".to_string(), "low".to_string()]
    }

    fn compute_classification(&self, candles: &[Candle]) -> Vec<String> {
        let mut returns = vec![f64::NAN; candles.len()];
        for i in 1..candles.len() {
            let prev = candles[i - 1].close;
            if prev > 0.0 {
                returns[i] = (candles[i].close - prev) / prev;
            }
        }

        // Rolling stddev via the difference of rolling means:
        // var = E[x²] − E[x]², computed over the same window.
        let defined: Vec<f64> = returns.iter().map(|v| if v.is_nan() { 0.0 } else { *v }).collect();
        let squares: Vec<f64> = defined.iter().map(|v| v * v).collect();
        let mean = sma(&defined, self.window);
        let mean_sq = sma(&squares, self.window);

        let stddev: Vec<f64> = mean
            .iter()
            .zip(&mean_sq)
            .map(|(m, m2)| (m2 - m * m).max(0.0).sqrt())
            .collect();

        classify_terciles(&stddev)
    }
}
