//! Regime filters: per-bar market classifications and trade-ledger subsetting.
//!
//! A filter labels every bar with a discrete regime (e.g. volatility bucket).
//! Classifications are computed once per bar series; a *filter configuration*
//! maps filter names to required labels, and applying one to a trade ledger
//! keeps only the trades whose entry bar carries every required label. The
//! equity curve itself is never refiltered — only trade-derived statistics
//! change.

mod volatility;

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

use once_cell::sync::Lazy;
use thiserror::Error;

use crate::backtesting::Trade;
use crate::models::Candle;

pub use volatility::{VolatilityRegimeAtr, VolatilityRegimeStdDev};

/// Filter configuration: required label per filter name. Empty = baseline.
pub type FilterConfig = BTreeMap<String, String>;

/// Errors from filter lookup and application.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum FilterError {
    /// Name not present in the registry
    #[error("Unknown filter: {0}")]
    UnknownFilter(String),

    /// Name already present in the registry
    #[error("Filter '{0}' is already registered")]
    DuplicateFilter(String),
}

/// Result type for filter operations
pub type Result<T> = std::result::Result<T, FilterError>;

/// A regime classifier over a bar series.
pub trait RegimeFilter: Send + Sync {
    /// Registry name of this filter.
    fn name(&self) -> &'static str;

    /// The label set this filter can emit.
    fn labels(&self) -> Vec<String>;

    /// One label per bar.
    fn compute_classification(&self, candles: &[Candle]) -> Vec<String>;
}

static FILTERS: Lazy<RwLock<HashMap<String, Arc<dyn RegimeFilter>>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

/// Register a filter under its own name; duplicate names are rejected.
pub fn register_filter(filter: Arc<dyn RegimeFilter>) -> Result<()> {
    let mut registry = FILTERS.write().expect("filter registry poisoned");
    let name = filter.name().to_string();
    if registry.contains_key(&name) {
        return Err(FilterError::DuplicateFilter(name));
    }
    registry.insert(name, filter);
    Ok(())
}

/// Look up a registered filter.
pub fn get_filter(name: &str) -> Option<Arc<dyn RegimeFilter>> {
    FILTERS.read().expect("filter registry poisoned").get(name).cloned()
}

/// Names of all registered filters, sorted.
pub fn list_filters() -> Vec<String> {
    let mut names: Vec<String> =
        FILTERS.read().expect("filter registry poisoned").keys().cloned().collect();
    names.sort();
    names
}

/// Register the built-in volatility filters. Idempotent.
pub fn register_builtin_filters() {
    let mut registry = FILTERS.write().expect("filter registry poisoned");
    registry
        .entry("volatility_regime_atr".to_string())
        .or_insert_with(|| Arc::new(VolatilityRegimeAtr::new()));
    registry
        .entry("volatility_regime_stddev".to_string())
        .or_insert_with(|| Arc::new(VolatilityRegimeStdDev::new()));
}

/// Enumerate filter configurations: the baseline (empty) first, then the
/// cartesian product of each named filter's label set.
pub fn generate_filter_configurations(filter_names: &[String]) -> Result<Vec<FilterConfig>> {
    let mut configurations = vec![FilterConfig::new()];
    if filter_names.is_empty() {
        return Ok(configurations);
    }

    let mut product: Vec<FilterConfig> = vec![FilterConfig::new()];
    for name in filter_names {
        let filter = get_filter(name).ok_or_else(|| FilterError::UnknownFilter(name.clone()))?;
        let mut next = Vec::with_capacity(product.len() * filter.labels().len());
        for existing in &product {
            for label in filter.labels() {
                let mut config = existing.clone();
                config.insert(name.clone(), label);
                next.push(config);
            }
        }
        product = next;
    }

    configurations.extend(product);
    Ok(configurations)
}

/// Pre-computed regime labels for one bar series: one column per filter.
#[derive(Debug, Clone)]
pub struct RegimeColumns {
    timestamps: Vec<i64>,
    columns: BTreeMap<String, Vec<String>>,
}

impl RegimeColumns {
    /// Compute the classification column of every named filter.
    pub fn compute(candles: &[Candle], filter_names: &[String]) -> Result<Self> {
        let timestamps: Vec<i64> = candles.iter().map(|c| c.timestamp).collect();
        let mut columns = BTreeMap::new();
        for name in filter_names {
            let filter = get_filter(name).ok_or_else(|| FilterError::UnknownFilter(name.clone()))?;
            columns.insert(name.clone(), filter.compute_classification(candles));
        }
        Ok(Self { timestamps, columns })
    }

    /// Label of `filter` at the bar holding `timestamp` (the last bar at or
    /// before it). `None` when the filter column is absent or the timestamp
    /// precedes the series.
    pub fn label_at(&self, filter: &str, timestamp: i64) -> Option<&str> {
        let column = self.columns.get(filter)?;
        let pos = self.timestamps.partition_point(|&t| t <= timestamp);
        pos.checked_sub(1).map(|i| column[i].as_str())
    }
}

/// Apply a filter configuration to a trade ledger.
///
/// A trade survives when its entry bar's label equals the required label for
/// every filter in the configuration. The baseline (empty) configuration
/// keeps every trade.
pub fn apply_filter_config(
    trades: &[Trade],
    regimes: &RegimeColumns,
    config: &FilterConfig,
) -> Vec<Trade> {
    if config.is_empty() {
        return trades.to_vec();
    }
    trades
        .iter()
        .filter(|trade| {
            config.iter().all(|(filter, required)| {
                regimes.label_at(filter, trade.entry_timestamp) == Some(required.as_str())
            })
        })
        .cloned()
        .collect()
}
