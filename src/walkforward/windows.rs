//! Rolling walk-forward window generation.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::models::Candle;

/// Minimum bars the in-sample interval must contain; generation stops at the
/// first window below this.
pub const MIN_IN_SAMPLE_BARS: usize = 100;

/// One (in-sample, out-of-sample) window pair.
///
/// Intervals are half-open: `[in_sample_start, in_sample_end)` and
/// `[out_sample_start, out_sample_end)`, with
/// `in_sample_start < in_sample_end ≤ out_sample_start < out_sample_end`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalkForwardWindow {
    /// Zero-based window index
    pub window_index: usize,
    /// In-sample interval start (UTC)
    pub in_sample_start: DateTime<Utc>,
    /// In-sample interval end, exclusive
    pub in_sample_end: DateTime<Utc>,
    /// Out-of-sample interval start (equals `in_sample_end`)
    pub out_sample_start: DateTime<Utc>,
    /// Out-of-sample interval end, exclusive (clamped at the range end)
    pub out_sample_end: DateTime<Utc>,
}

/// Count bars whose timestamps fall in the half-open `[start, end)`.
fn bars_in_interval(candles: &[Candle], start: DateTime<Utc>, end: DateTime<Utc>) -> usize {
    let (start_ts, end_ts) = (start.timestamp(), end.timestamp());
    let lo = candles.partition_point(|c| c.timestamp < start_ts);
    let hi = candles.partition_point(|c| c.timestamp < end_ts);
    hi - lo
}

/// Generate the ordered rolling windows for `[start, end]`.
///
/// Window 0's in-sample begins at `start`; each subsequent window shifts
/// both intervals forward by `oos_days`. Generation stops when the in-sample
/// interval no longer fits before `end` or holds fewer than
/// [`MIN_IN_SAMPLE_BARS`] bars; the final window's out-of-sample interval is
/// clamped at `end`.
pub fn generate_windows(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    is_days: i64,
    oos_days: i64,
    candles: &[Candle],
) -> Vec<WalkForwardWindow> {
    let mut windows = Vec::new();
    if is_days <= 0 || oos_days <= 0 {
        return windows;
    }
    // Nothing fits unless the range holds at least one full window pair.
    if end - start < Duration::days(is_days + oos_days) {
        return windows;
    }

    let mut window_index = 0usize;
    loop {
        let in_sample_start = start + Duration::days(window_index as i64 * oos_days);
        let in_sample_end = in_sample_start + Duration::days(is_days);
        if in_sample_end > end {
            break;
        }

        if bars_in_interval(candles, in_sample_start, in_sample_end) < MIN_IN_SAMPLE_BARS {
            break;
        }

        let out_sample_end = (in_sample_end + Duration::days(oos_days)).min(end);
        windows.push(WalkForwardWindow {
            window_index,
            in_sample_start,
            in_sample_end,
            out_sample_start: in_sample_end,
            out_sample_end,
        });
        window_index += 1;
    }

    windows
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn utc(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
    }

    fn daily_candles(start: DateTime<Utc>, n: usize) -> Vec<Candle> {
        (0..n)
            .map(|i| Candle {
                timestamp: start.timestamp() + i as i64 * 86_400,
                open: 100.0,
                high: 101.0,
                low: 99.0,
                close: 100.0,
                volume: 1.0,
            })
            .collect()
    }

    #[test]
    fn test_six_month_three_month_schedule() {
        // Range 2020-01-01..2021-12-31, period 6M/3M (180/90 days)
        let start = utc(2020, 1, 1);
        let end = utc(2021, 12, 31);
        let candles = daily_candles(start, 730);

        let windows = generate_windows(start, end, 180, 90, &candles);
        assert!(!windows.is_empty());

        let first = &windows[0];
        assert_eq!(first.in_sample_start, start);
        assert_eq!(first.in_sample_end, utc(2020, 6, 29));
        assert_eq!(first.out_sample_start, utc(2020, 6, 29));
        assert_eq!(first.out_sample_end, utc(2020, 9, 27));

        // Each window shifts by the out-of-sample length
        for pair in windows.windows(2) {
            assert_eq!(
                pair[1].in_sample_start - pair[0].in_sample_start,
                Duration::days(90)
            );
        }

        // Last out-of-sample interval never passes the range end
        assert!(windows.last().unwrap().out_sample_end <= end);
    }

    #[test]
    fn test_window_count_formula() {
        // L days total, P in-sample, Q out-of-sample → ⌊(L−P)/Q⌋ + 1 windows
        let start = utc(2020, 1, 1);
        let days_total = 730i64;
        let end = start + Duration::days(days_total);
        let candles = daily_candles(start, days_total as usize + 1);

        let (p, q) = (180i64, 90i64);
        let windows = generate_windows(start, end, p, q, &candles);
        assert_eq!(windows.len() as i64, (days_total - p) / q + 1);
    }

    #[test]
    fn test_range_shorter_than_one_pair_yields_nothing() {
        let start = utc(2020, 1, 1);
        let end = start + Duration::days(180 + 90 - 1);
        let candles = daily_candles(start, 270);
        assert!(generate_windows(start, end, 180, 90, &candles).is_empty());
    }

    #[test]
    fn test_sparse_in_sample_terminates_generation() {
        let start = utc(2020, 1, 1);
        let end = utc(2021, 12, 31);
        // Only 120 daily bars at the front: window 0 has enough, window 1 will not
        let candles = daily_candles(start, 120);

        let windows = generate_windows(start, end, 180, 90, &candles);
        assert_eq!(windows.len(), 1);
    }

    #[test]
    fn test_window_ordering_invariant() {
        let start = utc(2020, 1, 1);
        let end = utc(2022, 1, 1);
        let candles = daily_candles(start, 732);
        for window in generate_windows(start, end, 365, 90, &candles) {
            assert!(window.in_sample_start < window.in_sample_end);
            assert!(window.in_sample_end <= window.out_sample_start);
            assert!(window.out_sample_start < window.out_sample_end);
        }
    }
}
