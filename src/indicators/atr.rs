//! Average True Range (ATR).

use crate::models::Candle;

/// Calculate the Average True Range over a candle series.
///
/// True range per bar is the greatest of `high − low`,
/// `|high − prev_close|`, and `|low − prev_close|`. The first ATR value (at
/// index `period - 1`) is the SMA of the initial true ranges; later values
/// use Wilder's smoothing. Warm-up elements are `f64::NAN`.
pub fn atr(candles: &[Candle], period: usize) -> Vec<f64> {
    if period == 0 || candles.len() < period {
        return vec![f64::NAN; candles.len()];
    }

    let mut true_ranges = Vec::with_capacity(candles.len());
    true_ranges.push(candles[0].high - candles[0].low);
    for i in 1..candles.len() {
        let h_l = candles[i].high - candles[i].low;
        let h_pc = (candles[i].high - candles[i - 1].close).abs();
        let l_pc = (candles[i].low - candles[i - 1].close).abs();
        true_ranges.push(h_l.max(h_pc).max(l_pc));
    }

    let mut result = vec![f64::NAN; candles.len()];
    let first: f64 = true_ranges[..period].iter().sum::<f64>() / period as f64;
    result[period - 1] = first;

    let mut prev = first;
    for i in period..true_ranges.len() {
        prev = (prev * (period - 1) as f64 + true_ranges[i]) / period as f64;
        result[i] = prev;
    }

    result
}
