//! Indicator computation library with memoization and custom registration.
//!
//! The library turns [`IndicatorSpec`]s into materialized columns. During a
//! walk-forward run the same `(spec, data slice)` pair is requested thousands
//! of times across parameter trials; the per-instance memoization cache keyed
//! by spec plus a data fingerprint makes repeat requests a clone instead of a
//! recomputation. The cache is per-worker by design — workers never share it.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};
use std::time::Instant;

use once_cell::sync::Lazy;

use crate::models::Candle;

use super::{IndicatorError, IndicatorSpec, Result, atr, bollinger, ema, macd, rsi, sma};

/// Result of one indicator computation: a single column, or a named bundle
/// for multi-output indicators (MACD, Bollinger).
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum IndicatorOutput {
    /// One column of per-bar values (NaN during warm-up)
    Single(Vec<f64>),
    /// Named sub-columns, emitted as `{column_name}_{sub_name}`
    Multi(Vec<(String, Vec<f64>)>),
}

/// Signature for custom indicator functions: candles and parameters in,
/// one or more columns out.
pub type CustomIndicatorFn =
    Arc<dyn Fn(&[Candle], &BTreeMap<String, f64>) -> Result<IndicatorOutput> + Send + Sync>;

/// Process-wide registry of custom indicators, populated at startup.
static CUSTOM_INDICATORS: Lazy<RwLock<HashMap<String, CustomIndicatorFn>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

/// Register a custom indicator under a unique name.
///
/// Fails when the name collides with an existing registration (built-in
/// names are also reserved).
pub fn register_custom_indicator<F>(name: &str, compute: F) -> Result<()>
where
    F: Fn(&[Candle], &BTreeMap<String, f64>) -> Result<IndicatorOutput> + Send + Sync + 'static,
{
    if BUILTIN_NAMES.contains(&name) {
        return Err(IndicatorError::DuplicateName(name.to_string()));
    }
    let mut registry = CUSTOM_INDICATORS.write().expect("indicator registry poisoned");
    if registry.contains_key(name) {
        return Err(IndicatorError::DuplicateName(name.to_string()));
    }
    registry.insert(name.to_string(), Arc::new(compute));
    Ok(())
}

/// Look up a registered custom indicator.
pub fn custom_indicator(name: &str) -> Option<CustomIndicatorFn> {
    CUSTOM_INDICATORS.read().expect("indicator registry poisoned").get(name).cloned()
}

const BUILTIN_NAMES: [&str; 6] = ["SMA", "EMA", "RSI", "MACD", "BBANDS", "ATR"];

/// Cache effectiveness counters, tracked when the library is created with
/// [`IndicatorLibrary::with_tracking`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CacheStats {
    /// Requests served from the cache
    pub hits: usize,
    /// Requests that had to compute
    pub misses: usize,
    /// Estimated seconds saved: sum of original compute durations for every
    /// entry that was later served from the cache
    pub time_saved_seconds: f64,
}

impl CacheStats {
    /// Hit rate over all tracked requests (0.0 when nothing was requested).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 { 0.0 } else { self.hits as f64 / total as f64 }
    }
}

/// Cached entry: the output plus the seconds its original computation took.
struct CachedComputation {
    output: IndicatorOutput,
    compute_seconds: f64,
}

/// Indicator library with per-instance memoization.
pub struct IndicatorLibrary {
    cache: HashMap<String, CachedComputation>,
    stats: CacheStats,
    tracking: bool,
}

impl Default for IndicatorLibrary {
    fn default() -> Self {
        Self::new()
    }
}

impl IndicatorLibrary {
    /// Create a library without cache-statistics tracking.
    pub fn new() -> Self {
        Self { cache: HashMap::new(), stats: CacheStats::default(), tracking: false }
    }

    /// Create a library that records hits, misses, and time saved.
    pub fn with_tracking() -> Self {
        Self { tracking: true, ..Self::new() }
    }

    /// Cache statistics collected so far.
    pub fn cache_stats(&self) -> &CacheStats {
        &self.stats
    }

    /// Compute a single indicator, consulting the memoization cache first.
    ///
    /// Cache hits return a clone of the stored output and credit the original
    /// compute duration to `time_saved_seconds`.
    pub fn compute_one(&mut self, candles: &[Candle], spec: &IndicatorSpec) -> Result<IndicatorOutput> {
        if candles.is_empty() {
            return Err(IndicatorError::InsufficientData { need: 1, got: 0 });
        }

        let key = cache_key(spec, candles);
        if let Some(entry) = self.cache.get(&key) {
            if self.tracking {
                self.stats.hits += 1;
                self.stats.time_saved_seconds += entry.compute_seconds;
            }
            return Ok(entry.output.clone());
        }

        if self.tracking {
            self.stats.misses += 1;
        }
        let started = Instant::now();
        let output = compute_uncached(candles, spec)?;
        let compute_seconds = started.elapsed().as_secs_f64();

        self.cache.insert(key, CachedComputation { output: output.clone(), compute_seconds });
        Ok(output)
    }

    /// Compute every spec and return the materialized columns.
    ///
    /// Column naming: single-output specs use the spec's `column_name`;
    /// multi-output specs emit `{column_name}_{sub_name}`. A failing spec is
    /// logged as a warning and skipped; remaining specs still compute.
    pub fn compute_columns(
        &mut self,
        candles: &[Candle],
        specs: &[IndicatorSpec],
    ) -> Vec<(String, Vec<f64>)> {
        let mut columns = Vec::new();
        for spec in specs {
            match self.compute_one(candles, spec) {
                Ok(IndicatorOutput::Single(values)) => {
                    columns.push((spec.column_name.clone(), values));
                }
                Ok(IndicatorOutput::Multi(outputs)) => {
                    for (sub_name, values) in outputs {
                        columns.push((format!("{}_{}", spec.column_name, sub_name), values));
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        indicator = %spec.indicator_type,
                        column = %spec.column_name,
                        error = %e,
                        "indicator computation failed, column omitted"
                    );
                }
            }
        }
        columns
    }
}

/// Cache key: spec identity plus a cheap data fingerprint
/// `(len, first_timestamp, last_timestamp)`.
fn cache_key(spec: &IndicatorSpec, candles: &[Candle]) -> String {
    format!(
        "{}:{}:{}:{}_{}_{}",
        spec.indicator_type,
        spec.column_name,
        spec.canonical_params(),
        candles.len(),
        candles[0].timestamp,
        candles[candles.len() - 1].timestamp,
    )
}

fn compute_uncached(candles: &[Candle], spec: &IndicatorSpec) -> Result<IndicatorOutput> {
    if let Some(custom) = custom_indicator(&spec.indicator_type) {
        return custom(candles, &spec.params);
    }

    let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();

    match spec.indicator_type.as_str() {
        "SMA" => Ok(IndicatorOutput::Single(sma(&closes, spec.usize_param("period")?))),
        "EMA" => Ok(IndicatorOutput::Single(ema(&closes, spec.usize_param("period")?))),
        "RSI" => Ok(IndicatorOutput::Single(rsi(&closes, spec.usize_param("period")?))),
        "MACD" => {
            let out = macd(
                &closes,
                spec.usize_param("fast")?,
                spec.usize_param("slow")?,
                spec.usize_param("signal")?,
            )?;
            Ok(IndicatorOutput::Multi(vec![
                ("macd".to_string(), out.macd),
                ("signal".to_string(), out.signal),
                ("histogram".to_string(), out.histogram),
            ]))
        }
        "BBANDS" => {
            let out = bollinger(
                &closes,
                spec.usize_param("period")?,
                spec.float_param("std_dev")?,
            )?;
            Ok(IndicatorOutput::Multi(vec![
                ("upper".to_string(), out.upper),
                ("middle".to_string(), out.middle),
                ("lower".to_string(), out.lower),
            ]))
        }
        "ATR" => Ok(IndicatorOutput::Single(atr(candles, spec.usize_param("period")?))),
        other => Err(IndicatorError::UnknownIndicator(other.to_string())),
    }
}
