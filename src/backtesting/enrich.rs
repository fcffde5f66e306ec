//! Data enrichment: indicators plus aligned external series.
//!
//! `prepare` turns raw candles into the enriched bar table the broker
//! simulates over. Indicator columns come from the strategy's declared specs
//! via the indicator library; external series are fetched per provider for
//! the bar range and aligned to bar timestamps by forward-fill, with leading
//! gaps back-filled and anything still missing zero-filled.

use std::sync::Arc;

use crate::indicators::IndicatorLibrary;
use crate::models::Candle;

use super::error::Result;
use super::series::EnrichedSeries;
use super::strategy::Strategy;

/// A sparsely-observed external series: one named column of
/// `(timestamp, value)` observations at the provider's own cadence.
#[derive(Debug, Clone)]
pub struct ExternalColumn {
    /// Column name (without the provider prefix)
    pub name: String,
    /// Observations sorted by timestamp
    pub points: Vec<(i64, f64)>,
}

/// Provider of external (non-OHLCV) series, e.g. on-chain activity.
///
/// Implementations fetch whatever cadence they have; alignment to bar
/// timestamps happens in [`prepare`].
pub trait DataProvider: Send + Sync {
    /// Identifier used to prefix this provider's columns.
    fn provider_name(&self) -> &str;

    /// Fetch all columns for `[start_ts, end_ts]` (Unix seconds, UTC).
    fn fetch(&self, symbol: &str, start_ts: i64, end_ts: i64) -> Result<Vec<ExternalColumn>>;
}

/// Build the enriched bar table for one strategy instance.
///
/// Strategies that declare no indicators or no data sources simply pass the
/// candles through unchanged by that step. Provider failures are logged and
/// the provider's columns omitted; per-indicator failures are handled inside
/// the library the same way.
pub fn prepare(
    candles: &[Candle],
    strategy: &dyn Strategy,
    symbol: &str,
    library: &mut IndicatorLibrary,
) -> Result<EnrichedSeries> {
    let mut series = EnrichedSeries::new(candles.to_vec());
    if candles.is_empty() {
        return Ok(series);
    }

    // Step 1: indicator columns.
    let specs = strategy.indicator_specs();
    for (name, values) in library.compute_columns(candles, &specs) {
        series.add_indicator_column(name, values)?;
    }

    // Step 2: external series, aligned to bar timestamps.
    let start_ts = candles[0].timestamp;
    let end_ts = candles[candles.len() - 1].timestamp;
    for provider in strategy.data_sources() {
        attach_provider(&mut series, candles, provider, symbol, start_ts, end_ts)?;
    }

    Ok(series)
}

fn attach_provider(
    series: &mut EnrichedSeries,
    candles: &[Candle],
    provider: Arc<dyn DataProvider>,
    symbol: &str,
    start_ts: i64,
    end_ts: i64,
) -> Result<()> {
    let prefix = provider.provider_name().to_string();
    let columns = match provider.fetch(symbol, start_ts, end_ts) {
        Ok(columns) => columns,
        Err(e) => {
            tracing::warn!(provider = %prefix, error = %e, "data provider failed, columns omitted");
            return Ok(());
        }
    };

    for column in columns {
        let aligned = align_forward_fill(candles, &column.points);
        series.add_column(format!("{prefix}_{}", column.name), aligned)?;
    }
    Ok(())
}

/// Align sparse observations to bar timestamps.
///
/// Each observation's value carries forward until the next observation;
/// leading bars before the first observation take its value (back-fill); a
/// column with no observations at all is zero-filled.
fn align_forward_fill(candles: &[Candle], points: &[(i64, f64)]) -> Vec<f64> {
    if points.is_empty() {
        return vec![0.0; candles.len()];
    }

    let mut aligned = Vec::with_capacity(candles.len());
    let mut cursor = 0usize;
    let mut current = points[0].1; // leading back-fill
    for candle in candles {
        while cursor < points.len() && points[cursor].0 <= candle.timestamp {
            current = points[cursor].1;
            cursor += 1;
        }
        aligned.push(current);
    }
    aligned
}
