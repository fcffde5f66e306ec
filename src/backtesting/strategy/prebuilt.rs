//! Pre-built strategies.

use crate::indicators::IndicatorSpec;

use super::super::error::Result;
use super::super::signal::Signal;
use super::{BarContext, Params, Strategy};

fn param(params: &Params, name: &str, default: f64) -> f64 {
    params.get(name).copied().unwrap_or(default)
}

/// Dual SMA crossover: long when the fast average crosses above the slow
/// average, flat when it crosses back below.
pub struct SmaCross {
    fast_period: usize,
    slow_period: usize,
    fast_column: String,
    slow_column: String,
}

impl SmaCross {
    /// Build from parameters `fast_period` (default 20) and `slow_period`
    /// (default 50).
    pub fn new(params: &Params) -> Self {
        let fast_period = param(params, "fast_period", 20.0) as usize;
        let slow_period = param(params, "slow_period", 50.0) as usize;
        Self {
            fast_period,
            slow_period,
            fast_column: format!("SMA_{fast_period}"),
            slow_column: format!("SMA_{slow_period}"),
        }
    }
}

impl Strategy for SmaCross {
    fn name(&self) -> &str {
        "sma_cross"
    }

    fn indicator_specs(&self) -> Vec<IndicatorSpec> {
        vec![
            IndicatorSpec::new(
                "SMA",
                [("period".to_string(), self.fast_period as f64)],
                &self.fast_column,
            ),
            IndicatorSpec::new(
                "SMA",
                [("period".to_string(), self.slow_period as f64)],
                &self.slow_column,
            ),
        ]
    }

    fn warmup_bars(&self) -> usize {
        // A crossover needs the slow average defined on this bar and the one
        // before it.
        self.slow_period + 1
    }

    fn on_bar(&mut self, ctx: &BarContext) -> Result<Signal> {
        if !ctx.has_position() {
            if ctx.crossed_above(&self.fast_column, &self.slow_column)? {
                return Ok(Signal::Buy);
            }
        } else if ctx.crossed_below(&self.fast_column, &self.slow_column)? {
            return Ok(Signal::Sell);
        }
        Ok(Signal::Hold)
    }
}

/// RSI mean reversion gated by an SMA trend filter: buy when RSI dips below
/// the oversold threshold while price holds above the trend average, exit
/// when RSI runs past the overbought threshold.
pub struct RsiSma {
    rsi_column: String,
    sma_column: String,
    rsi_period: usize,
    sma_period: usize,
    oversold: f64,
    overbought: f64,
}

impl RsiSma {
    /// Build from parameters `rsi_period` (14), `sma_period` (50),
    /// `rsi_oversold` (30), `rsi_overbought` (70).
    pub fn new(params: &Params) -> Self {
        let rsi_period = param(params, "rsi_period", 14.0) as usize;
        let sma_period = param(params, "sma_period", 50.0) as usize;
        Self {
            rsi_column: format!("RSI_{rsi_period}"),
            sma_column: format!("SMA_{sma_period}"),
            rsi_period,
            sma_period,
            oversold: param(params, "rsi_oversold", 30.0),
            overbought: param(params, "rsi_overbought", 70.0),
        }
    }
}

impl Strategy for RsiSma {
    fn name(&self) -> &str {
        "rsi_sma"
    }

    fn indicator_specs(&self) -> Vec<IndicatorSpec> {
        vec![
            IndicatorSpec::new(
                "RSI",
                [("period".to_string(), self.rsi_period as f64)],
                &self.rsi_column,
            ),
            IndicatorSpec::new(
                "SMA",
                [("period".to_string(), self.sma_period as f64)],
                &self.sma_column,
            ),
        ]
    }

    fn warmup_bars(&self) -> usize {
        // RSI consumes one bar for the change series before its smoothing
        // window starts.
        (self.rsi_period + 1).max(self.sma_period)
    }

    fn on_bar(&mut self, ctx: &BarContext) -> Result<Signal> {
        let (Some(rsi), Some(sma)) = (ctx.column(&self.rsi_column)?, ctx.column(&self.sma_column)?)
        else {
            return Ok(Signal::Hold);
        };

        if !ctx.has_position() {
            if rsi < self.oversold && ctx.close() > sma {
                return Ok(Signal::Buy);
            }
        } else if rsi > self.overbought {
            return Ok(Signal::Sell);
        }
        Ok(Signal::Hold)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sma_cross_declares_both_averages() {
        let params = Params::from([
            ("fast_period".to_string(), 10.0),
            ("slow_period".to_string(), 30.0),
        ]);
        let strategy = SmaCross::new(&params);
        let specs = strategy.indicator_specs();
        assert_eq!(specs.len(), 2);
        assert_eq!(specs[0].column_name, "SMA_10");
        assert_eq!(specs[1].column_name, "SMA_30");
        assert_eq!(strategy.warmup_bars(), 31);
    }

    #[test]
    fn test_rsi_sma_defaults() {
        let strategy = RsiSma::new(&Params::new());
        let specs = strategy.indicator_specs();
        assert_eq!(specs[0].column_name, "RSI_14");
        assert_eq!(specs[1].column_name, "SMA_50");
        assert_eq!(strategy.warmup_bars(), 50);
    }
}
