//! Walk-forward result buckets and aggregate statistics.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::backtesting::{BacktestMetrics, Params};
use crate::filters::FilterConfig;

/// Outcome of one walk-forward window for one fitness function.
#[non_exhaustive]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalkForwardWindowResult {
    /// Zero-based window index
    pub window_index: usize,
    /// In-sample interval start
    pub in_sample_start: DateTime<Utc>,
    /// In-sample interval end (exclusive)
    pub in_sample_end: DateTime<Utc>,
    /// Out-of-sample interval start
    pub out_sample_start: DateTime<Utc>,
    /// Out-of-sample interval end (exclusive)
    pub out_sample_end: DateTime<Utc>,
    /// Parameters selected on the in-sample slice
    pub best_parameters: Params,
    /// In-sample metrics of the selected parameters
    pub in_sample_metrics: BacktestMetrics,
    /// Out-of-sample metrics; `None` when the OOS pass failed
    pub out_sample_metrics: Option<BacktestMetrics>,
    /// Wall-clock seconds of the in-sample grid search
    pub optimization_seconds: f64,
    /// Wall-clock seconds of the out-of-sample backtest
    pub oos_backtest_seconds: f64,
}

/// All window results for one
/// `(symbol, timeframe, period, fitness, filter configuration)` bucket,
/// plus aggregates over the successful windows.
#[non_exhaustive]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalkForwardResults {
    /// Symbol under test
    pub symbol: String,
    /// Timeframe under test
    pub timeframe: String,
    /// Period spec string (e.g. `"1Y/6M"`)
    pub period: String,
    /// Fitness function name
    pub fitness_function: String,
    /// Regime filter configuration (empty = baseline)
    pub filter_config: FilterConfig,
    /// Per-window results, ordered by window index
    pub window_results: Vec<WalkForwardWindowResult>,

    /// Sum of OOS net profit over successful windows, in dollars
    pub total_oos_net_profit: f64,
    /// Compounded OOS return percent over successful windows
    pub total_oos_return_pct: f64,
    /// Mean OOS return percent over successful windows
    pub avg_oos_return_pct: f64,
    /// Windows attempted
    pub total_windows: usize,
    /// Windows with OOS metrics
    pub successful_windows: usize,
    /// Windows without OOS metrics
    pub failed_windows: usize,
    /// Wall-clock seconds for the whole period run
    pub total_execution_seconds: f64,
}

impl WalkForwardResults {
    /// Empty bucket for one period/fitness/filter combination.
    pub fn new(
        symbol: impl Into<String>,
        timeframe: impl Into<String>,
        period: impl Into<String>,
        fitness_function: impl Into<String>,
        filter_config: FilterConfig,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            timeframe: timeframe.into(),
            period: period.into(),
            fitness_function: fitness_function.into(),
            filter_config,
            window_results: Vec::new(),
            total_oos_net_profit: 0.0,
            total_oos_return_pct: 0.0,
            avg_oos_return_pct: 0.0,
            total_windows: 0,
            successful_windows: 0,
            failed_windows: 0,
            total_execution_seconds: 0.0,
        }
    }

    /// Recompute the aggregate fields from the window results.
    ///
    /// Net profit sums in dollars; returns compound:
    /// `(∏(1 + rᵢ/100) − 1) × 100`. Failed windows (no OOS metrics) are
    /// excluded from both and counted in `failed_windows`.
    pub fn calculate_aggregates(&mut self) {
        self.total_windows = self.window_results.len();

        let successful: Vec<&BacktestMetrics> = self
            .window_results
            .iter()
            .filter_map(|w| w.out_sample_metrics.as_ref())
            .collect();
        self.successful_windows = successful.len();
        self.failed_windows = self.total_windows - self.successful_windows;

        if successful.is_empty() {
            self.total_oos_net_profit = 0.0;
            self.total_oos_return_pct = 0.0;
            self.avg_oos_return_pct = 0.0;
            return;
        }

        self.total_oos_net_profit = successful.iter().map(|m| m.net_profit).sum();

        let compounded: f64 =
            successful.iter().map(|m| 1.0 + m.total_return_pct / 100.0).product();
        self.total_oos_return_pct = (compounded - 1.0) * 100.0;

        self.avg_oos_return_pct = successful.iter().map(|m| m.total_return_pct).sum::<f64>()
            / successful.len() as f64;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backtesting::EquityPoint;
    use chrono::TimeZone;

    fn metrics_with_return(initial: f64, return_pct: f64) -> BacktestMetrics {
        let final_value = initial * (1.0 + return_pct / 100.0);
        let curve = vec![
            EquityPoint { timestamp: 0, value: initial },
            EquityPoint { timestamp: 86_400, value: final_value },
        ];
        BacktestMetrics::calculate(&[], &curve, initial)
    }

    fn window_result(index: usize, oos: Option<BacktestMetrics>) -> WalkForwardWindowResult {
        let t = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        WalkForwardWindowResult {
            window_index: index,
            in_sample_start: t,
            in_sample_end: t,
            out_sample_start: t,
            out_sample_end: t,
            best_parameters: Params::new(),
            in_sample_metrics: metrics_with_return(10_000.0, 0.0),
            out_sample_metrics: oos,
            optimization_seconds: 0.0,
            oos_backtest_seconds: 0.0,
        }
    }

    #[test]
    fn test_compounding_three_windows() {
        let mut results =
            WalkForwardResults::new("BTC/USD", "1d", "1Y/6M", "net_profit", FilterConfig::new());
        for (i, pct) in [10.0, 5.0, -2.0].into_iter().enumerate() {
            results
                .window_results
                .push(window_result(i, Some(metrics_with_return(10_000.0, pct))));
        }
        results.calculate_aggregates();

        let expected = (1.10 * 1.05 * 0.98 - 1.0) * 100.0;
        assert!((results.total_oos_return_pct - expected).abs() < 1e-9);
        assert!((results.avg_oos_return_pct - 13.0 / 3.0).abs() < 1e-9);
        assert_eq!(results.total_windows, 3);
        assert_eq!(results.successful_windows, 3);

        // Net profit sums in dollars: 1000 + 500 − 200
        assert!((results.total_oos_net_profit - 1_300.0).abs() < 1e-9);
    }

    #[test]
    fn test_failed_windows_excluded_from_compounding() {
        let mut results =
            WalkForwardResults::new("BTC/USD", "1h", "1Y/6M", "net_profit", FilterConfig::new());
        results
            .window_results
            .push(window_result(0, Some(metrics_with_return(10_000.0, 10.0))));
        results.window_results.push(window_result(1, None));
        results
            .window_results
            .push(window_result(2, Some(metrics_with_return(10_000.0, 5.0))));
        results.calculate_aggregates();

        let expected = (1.10 * 1.05 - 1.0) * 100.0;
        assert!((results.total_oos_return_pct - expected).abs() < 1e-9);
        assert!((results.avg_oos_return_pct - 7.5).abs() < 1e-9);
        assert_eq!(results.successful_windows, 2);
        assert_eq!(results.failed_windows, 1);
    }

    #[test]
    fn test_empty_bucket_aggregates_to_zero() {
        let mut results =
            WalkForwardResults::new("BTC/USD", "1h", "1Y/6M", "net_profit", FilterConfig::new());
        results.calculate_aggregates();
        assert_eq!(results.total_oos_return_pct, 0.0);
        assert_eq!(results.avg_oos_return_pct, 0.0);
        assert_eq!(results.total_oos_net_profit, 0.0);
        assert_eq!(results.total_windows, 0);
    }

    #[test]
    fn test_single_window_matches_its_return() {
        let mut results =
            WalkForwardResults::new("BTC/USD", "1h", "1Y/6M", "net_profit", FilterConfig::new());
        results
            .window_results
            .push(window_result(0, Some(metrics_with_return(10_000.0, 10.0))));
        results.calculate_aggregates();
        assert!((results.total_oos_return_pct - 10.0).abs() < 1e-9);
        assert!((results.avg_oos_return_pct - 10.0).abs() < 1e-9);
    }
}
