//! OHLCV candle type shared across the engine.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// A single OHLCV bar.
///
/// Timestamps are Unix seconds in UTC. Bar series are always ordered by a
/// strictly increasing, duplicate-free timestamp; [`sort_candles`] enforces
/// that invariant after cache reads.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    /// Timestamp (Unix seconds, UTC)
    pub timestamp: i64,
    /// Open price
    pub open: f64,
    /// High price
    pub high: f64,
    /// Low price
    pub low: f64,
    /// Close price
    pub close: f64,
    /// Volume in base units
    pub volume: f64,
}

impl Candle {
    /// Timestamp as a UTC datetime.
    pub fn datetime(&self) -> DateTime<Utc> {
        Utc.timestamp_opt(self.timestamp, 0).single().unwrap_or_default()
    }
}

/// Sort a candle series by timestamp and drop duplicate timestamps,
/// keeping the first occurrence.
pub fn sort_candles(mut candles: Vec<Candle>) -> Vec<Candle> {
    candles.sort_by_key(|c| c.timestamp);
    candles.dedup_by_key(|c| c.timestamp);
    candles
}

/// Slice a sorted candle series to `[start, end]` (inclusive timestamps).
pub fn slice_candles(candles: &[Candle], start: i64, end: i64) -> &[Candle] {
    let lo = candles.partition_point(|c| c.timestamp < start);
    let hi = candles.partition_point(|c| c.timestamp <= end);
    &candles[lo..hi]
}

/// Spacing between the first two bars in seconds.
///
/// Returns `None` for series shorter than two bars. Used to translate a
/// parameter lookback into a warm-up duration for window slicing.
pub fn bar_duration_secs(candles: &[Candle]) -> Option<i64> {
    if candles.len() < 2 {
        return None;
    }
    Some(candles[1].timestamp - candles[0].timestamp)
}
