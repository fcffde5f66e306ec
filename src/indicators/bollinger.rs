//! Bollinger Bands.

use serde::{Deserialize, Serialize};

use super::sma::sma;
use super::{IndicatorError, Result};

/// Bollinger Bands output: upper, middle, and lower band series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BollingerOutput {
    /// Middle band + `std_dev × multiplier`
    pub upper: Vec<f64>,
    /// Middle band (SMA of `period`)
    pub middle: Vec<f64>,
    /// Middle band − `std_dev × multiplier`
    pub lower: Vec<f64>,
}

/// Calculate Bollinger Bands with the given period and deviation multiplier.
///
/// Standard parameters are (20, 2.0). The standard deviation is the
/// population deviation of each rolling window. Warm-up elements are
/// `f64::NAN`.
pub fn bollinger(data: &[f64], period: usize, multiplier: f64) -> Result<BollingerOutput> {
    if period == 0 {
        return Err(IndicatorError::InvalidPeriod(
            "period must be greater than 0".to_string(),
        ));
    }

    let middle = sma(data, period);
    let mut upper = vec![f64::NAN; data.len()];
    let mut lower = vec![f64::NAN; data.len()];

    for i in 0..data.len() {
        if middle[i].is_nan() {
            continue;
        }
        let window = &data[i + 1 - period..=i];
        let mean = middle[i];
        let variance = window.iter().map(|&x| (x - mean).powi(2)).sum::<f64>() / period as f64;
        let std_dev = variance.sqrt();
        upper[i] = mean + multiplier * std_dev;
        lower[i] = mean - multiplier * std_dev;
    }

    Ok(BollingerOutput { upper, middle, lower })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bollinger_band_ordering() {
        let data: Vec<f64> = (1..=30).map(|x| x as f64 + (x % 3) as f64).collect();
        let out = bollinger(&data, 20, 2.0).unwrap();

        for i in 0..19 {
            assert!(out.upper[i].is_nan());
        }
        for i in 19..30 {
            assert!(out.upper[i] > out.middle[i]);
            assert!(out.middle[i] > out.lower[i]);
        }
    }

    #[test]
    fn test_bollinger_flat_series_collapses() {
        let data = vec![100.0; 25];
        let out = bollinger(&data, 20, 2.0).unwrap();
        // Zero deviation: all three bands coincide
        assert_eq!(out.upper[24], 100.0);
        assert_eq!(out.middle[24], 100.0);
        assert_eq!(out.lower[24], 100.0);
    }

    #[test]
    fn test_bollinger_zero_period_rejected() {
        assert!(bollinger(&[1.0, 2.0], 0, 2.0).is_err());
    }
}
