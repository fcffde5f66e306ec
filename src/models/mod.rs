//! Core data types shared across the engine.

mod candle;

pub use candle::{Candle, bar_duration_secs, slice_candles, sort_candles};
