//! Relative Strength Index (RSI).

use super::ema::ema;

/// Calculate the Relative Strength Index over `data`.
///
/// Price changes are split into gains and losses, both smoothed with an EMA
/// of `period`; `RSI = 100 - 100 / (1 + avg_gain / avg_loss)`. A window with
/// no losses reads 100. Values range 0–100; warm-up elements are `f64::NAN`.
pub fn rsi(data: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || data.len() <= period {
        return vec![f64::NAN; data.len()];
    }

    let mut gains = Vec::with_capacity(data.len() - 1);
    let mut losses = Vec::with_capacity(data.len() - 1);
    for pair in data.windows(2) {
        let change = pair[1] - pair[0];
        gains.push(change.max(0.0));
        losses.push((-change).max(0.0));
    }

    let avg_gains = ema(&gains, period);
    let avg_losses = ema(&losses, period);

    // Change series is one element shorter than the input, hence the +1 shift.
    let mut result = vec![f64::NAN; data.len()];
    for i in 0..avg_gains.len() {
        let (gain, loss) = (avg_gains[i], avg_losses[i]);
        if gain.is_nan() || loss.is_nan() {
            continue;
        }
        result[i + 1] = if loss == 0.0 {
            100.0
        } else {
            100.0 - 100.0 / (1.0 + gain / loss)
        };
    }

    result
}
