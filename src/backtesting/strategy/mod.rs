//! Strategy trait, bar context, and the strategy registry.
//!
//! Strategies are constructed from a parameter map by a registered factory,
//! declare their indicator needs up front (a pure function of those
//! parameters), and are then driven bar-by-bar by the broker. They never hold
//! a reference back into the broker: each [`Strategy::on_bar`] call receives
//! a read-only [`BarContext`] and answers with a [`Signal`].

pub mod prebuilt;

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

use once_cell::sync::Lazy;

use crate::indicators::IndicatorSpec;
use crate::models::Candle;

use super::enrich::DataProvider;
use super::error::{BacktestError, Result};
use super::position::Position;
use super::series::EnrichedSeries;
use super::signal::Signal;

/// Strategy parameter map, by name. `BTreeMap` keeps enumeration and
/// serialization order stable across runs and workers.
pub type Params = BTreeMap<String, f64>;

/// Read-only view of the simulation state handed to a strategy each bar.
#[non_exhaustive]
pub struct BarContext<'a> {
    series: &'a EnrichedSeries,
    /// Current bar index
    pub index: usize,
    /// Currently open position, if any
    pub position: Option<&'a Position>,
    /// Cash available right now
    pub cash: f64,
}

impl<'a> BarContext<'a> {
    pub(crate) fn new(
        series: &'a EnrichedSeries,
        index: usize,
        position: Option<&'a Position>,
        cash: f64,
    ) -> Self {
        Self { series, index, position, cash }
    }

    /// The bar being processed.
    pub fn candle(&self) -> &Candle {
        self.series.candle(self.index)
    }

    /// The bar before the current one, if any.
    pub fn previous_candle(&self) -> Option<&Candle> {
        self.index.checked_sub(1).map(|i| self.series.candle(i))
    }

    /// Column value at the current bar (`None` while not yet computed).
    pub fn column(&self, name: &str) -> Result<Option<f64>> {
        self.column_at(name, self.index)
    }

    /// Column value at an earlier bar. Reading past the current bar is a
    /// strategy bug and returns an error rather than leaking future data.
    pub fn column_at(&self, name: &str, index: usize) -> Result<Option<f64>> {
        if index > self.index {
            return Err(BacktestError::strategy(
                self.index,
                self.candle().timestamp,
                format!("attempted lookahead read of '{name}' at bar {index}"),
            ));
        }
        let idx = self.series.column_index(name)?;
        Ok(self.series.value(idx, index))
    }

    /// Whether a position is currently open.
    pub fn has_position(&self) -> bool {
        self.position.is_some()
    }

    /// Close price of the current bar.
    pub fn close(&self) -> f64 {
        self.candle().close
    }

    /// Whether `fast` crossed above `slow` on this bar (strict on both sides).
    pub fn crossed_above(&self, fast: &str, slow: &str) -> Result<bool> {
        if self.index == 0 {
            return Ok(false);
        }
        let now = (self.column(fast)?, self.column(slow)?);
        let prev = (self.column_at(fast, self.index - 1)?, self.column_at(slow, self.index - 1)?);
        Ok(match (now, prev) {
            ((Some(f), Some(s)), (Some(fp), Some(sp))) => fp < sp && f > s,
            _ => false,
        })
    }

    /// Whether `fast` crossed below `slow` on this bar (strict on both sides).
    pub fn crossed_below(&self, fast: &str, slow: &str) -> Result<bool> {
        if self.index == 0 {
            return Ok(false);
        }
        let now = (self.column(fast)?, self.column(slow)?);
        let prev = (self.column_at(fast, self.index - 1)?, self.column_at(slow, self.index - 1)?);
        Ok(match (now, prev) {
            ((Some(f), Some(s)), (Some(fp), Some(sp))) => fp > sp && f < s,
            _ => false,
        })
    }
}

/// Core strategy trait.
///
/// Parameters are bound at construction time (via the registry factory), so
/// [`indicator_specs`](Strategy::indicator_specs) is a pure function of the
/// instance.
pub trait Strategy: Send {
    /// Strategy name (for reporting)
    fn name(&self) -> &str;

    /// Indicator columns this strategy needs, computed once before the run.
    fn indicator_specs(&self) -> Vec<IndicatorSpec>;

    /// External data providers to fetch and align before the run.
    fn data_sources(&self) -> Vec<Arc<dyn DataProvider>> {
        Vec::new()
    }

    /// Minimum bars required before this strategy can generate signals.
    ///
    /// The engine rejects series shorter than this outright; within a long
    /// enough series, bars whose indicator columns are still NaN are skipped
    /// bar-by-bar regardless. Default is 1 (strategy can run from the first
    /// bar).
    fn warmup_bars(&self) -> usize {
        1
    }

    /// Called on each bar (after warm-up) to produce a signal.
    ///
    /// Errors terminate the backtest; the enclosing grid search records the
    /// failure for that parameter cell and continues with the rest.
    fn on_bar(&mut self, ctx: &BarContext) -> Result<Signal>;
}

/// Factory building a strategy instance from a parameter map.
pub type StrategyFactory = Arc<dyn Fn(&Params) -> Box<dyn Strategy> + Send + Sync>;

static STRATEGIES: Lazy<RwLock<HashMap<String, StrategyFactory>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

/// Register a strategy factory under a unique name.
pub fn register_strategy<F>(name: &str, factory: F) -> Result<()>
where
    F: Fn(&Params) -> Box<dyn Strategy> + Send + Sync + 'static,
{
    let mut registry = STRATEGIES.write().expect("strategy registry poisoned");
    if registry.contains_key(name) {
        return Err(BacktestError::invalid_param(
            "strategy",
            format!("'{name}' is already registered"),
        ));
    }
    registry.insert(name.to_string(), Arc::new(factory));
    Ok(())
}

/// Look up a strategy factory by name.
pub fn strategy_factory(name: &str) -> Result<StrategyFactory> {
    STRATEGIES
        .read()
        .expect("strategy registry poisoned")
        .get(name)
        .cloned()
        .ok_or_else(|| BacktestError::UnknownStrategy(name.to_string()))
}

/// Register the built-in strategies. Idempotent — safe to call from every
/// worker at startup.
pub fn register_builtin_strategies() {
    let mut registry = STRATEGIES.write().expect("strategy registry poisoned");
    registry.entry("sma_cross".to_string()).or_insert_with(|| {
        Arc::new(|params: &Params| Box::new(prebuilt::SmaCross::new(params)) as Box<dyn Strategy>)
    });
    registry.entry("rsi_sma".to_string()).or_insert_with(|| {
        Arc::new(|params: &Params| Box::new(prebuilt::RsiSma::new(params)) as Box<dyn Strategy>)
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[serial_test::serial]
    fn test_builtin_registration_is_idempotent() {
        register_builtin_strategies();
        register_builtin_strategies();
        assert!(strategy_factory("sma_cross").is_ok());
        assert!(strategy_factory("rsi_sma").is_ok());
        assert!(strategy_factory("missing").is_err());
    }

    #[test]
    fn test_context_lookahead_read_rejected() {
        let candles: Vec<Candle> = (0..3)
            .map(|i| Candle {
                timestamp: i,
                open: 1.0,
                high: 1.0,
                low: 1.0,
                close: 1.0,
                volume: 1.0,
            })
            .collect();
        let mut series = EnrichedSeries::new(candles);
        series.add_column("x", vec![1.0, 2.0, 3.0]).unwrap();

        let ctx = BarContext::new(&series, 1, None, 0.0);
        assert!(ctx.column_at("x", 2).is_err());
        assert_eq!(ctx.column_at("x", 0).unwrap(), Some(1.0));
    }

    #[test]
    fn test_crossover_detection() {
        let candles: Vec<Candle> = (0..2)
            .map(|i| Candle {
                timestamp: i,
                open: 1.0,
                high: 1.0,
                low: 1.0,
                close: 1.0,
                volume: 1.0,
            })
            .collect();
        let mut series = EnrichedSeries::new(candles);
        series.add_column("fast", vec![9.0, 11.0]).unwrap();
        series.add_column("slow", vec![10.0, 10.0]).unwrap();

        let ctx = BarContext::new(&series, 1, None, 0.0);
        assert!(ctx.crossed_above("fast", "slow").unwrap());
        assert!(!ctx.crossed_below("fast", "slow").unwrap());
    }
}
