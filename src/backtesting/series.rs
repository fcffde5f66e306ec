//! Enriched bar table: candles plus named real-valued columns.

use std::collections::HashMap;

use crate::models::Candle;

use super::error::{BacktestError, Result};

/// Bar series augmented with indicator and external-data columns.
///
/// Every column has exactly one value per bar; `f64::NAN` marks values that
/// are not yet computed (indicator warm-up) or absent. Column names resolve
/// through a name→index table built at enrichment time, so an unknown name
/// is caught when the engine starts, not at some bar mid-simulation.
#[derive(Debug, Clone)]
pub struct EnrichedSeries {
    candles: Vec<Candle>,
    columns: Vec<Vec<f64>>,
    names: Vec<String>,
    index: HashMap<String, usize>,
    /// Columns produced by the indicator step; these drive the warm-up check.
    indicator_columns: Vec<usize>,
}

impl EnrichedSeries {
    /// Wrap a bar series with no extra columns yet.
    pub fn new(candles: Vec<Candle>) -> Self {
        Self {
            candles,
            columns: Vec::new(),
            names: Vec::new(),
            index: HashMap::new(),
            indicator_columns: Vec::new(),
        }
    }

    /// Number of bars.
    pub fn len(&self) -> usize {
        self.candles.len()
    }

    /// Whether the series holds no bars.
    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    /// The underlying candles.
    pub fn candles(&self) -> &[Candle] {
        &self.candles
    }

    /// Candle at a bar index.
    pub fn candle(&self, i: usize) -> &Candle {
        &self.candles[i]
    }

    /// All column names in insertion order.
    pub fn column_names(&self) -> &[String] {
        &self.names
    }

    /// Add a named column; length must equal the bar count and the name must
    /// be new.
    pub fn add_column(&mut self, name: impl Into<String>, values: Vec<f64>) -> Result<()> {
        let name = name.into();
        if values.len() != self.candles.len() {
            return Err(BacktestError::ColumnLengthMismatch {
                name,
                len: values.len(),
                bars: self.candles.len(),
            });
        }
        if self.index.contains_key(&name) {
            return Err(BacktestError::DuplicateColumn(name));
        }
        let idx = self.columns.len();
        self.index.insert(name.clone(), idx);
        self.names.push(name);
        self.columns.push(values);
        Ok(())
    }

    /// Add a column and mark it as indicator-derived (participates in the
    /// warm-up check).
    pub fn add_indicator_column(&mut self, name: impl Into<String>, values: Vec<f64>) -> Result<()> {
        self.add_column(name, values)?;
        self.indicator_columns.push(self.columns.len() - 1);
        Ok(())
    }

    /// Resolve a column name to its index; unknown names are an error.
    pub fn column_index(&self, name: &str) -> Result<usize> {
        self.index
            .get(name)
            .copied()
            .ok_or_else(|| BacktestError::MissingColumn(name.to_string()))
    }

    /// Column values by name.
    pub fn column(&self, name: &str) -> Result<&[f64]> {
        Ok(&self.columns[self.column_index(name)?])
    }

    /// Value at `(column, bar)`; `None` when the stored value is the NaN
    /// sentinel.
    pub fn value(&self, column_idx: usize, bar: usize) -> Option<f64> {
        let v = self.columns[column_idx][bar];
        if v.is_nan() { None } else { Some(v) }
    }

    /// Whether any indicator column is still NaN at `bar` — the strategy is
    /// not invoked on such bars.
    pub fn in_warmup(&self, bar: usize) -> bool {
        self.indicator_columns.iter().any(|&idx| self.columns[idx][bar].is_nan())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_candles(n: usize) -> Vec<Candle> {
        (0..n)
            .map(|i| Candle {
                timestamp: i as i64 * 60,
                open: 1.0,
                high: 1.0,
                low: 1.0,
                close: 1.0,
                volume: 1.0,
            })
            .collect()
    }

    #[test]
    fn test_add_and_read_column() {
        let mut series = EnrichedSeries::new(make_candles(3));
        series.add_column("sma", vec![f64::NAN, 2.0, 3.0]).unwrap();
        let idx = series.column_index("sma").unwrap();
        assert_eq!(series.value(idx, 0), None);
        assert_eq!(series.value(idx, 1), Some(2.0));
    }

    #[test]
    fn test_unknown_column_is_error() {
        let series = EnrichedSeries::new(make_candles(2));
        assert!(matches!(series.column_index("nope"), Err(BacktestError::MissingColumn(_))));
    }

    #[test]
    fn test_length_mismatch_rejected() {
        let mut series = EnrichedSeries::new(make_candles(3));
        let err = series.add_column("bad", vec![1.0]);
        assert!(matches!(err, Err(BacktestError::ColumnLengthMismatch { .. })));
    }

    #[test]
    fn test_duplicate_column_rejected() {
        let mut series = EnrichedSeries::new(make_candles(2));
        series.add_column("x", vec![1.0, 2.0]).unwrap();
        assert!(matches!(
            series.add_column("x", vec![3.0, 4.0]),
            Err(BacktestError::DuplicateColumn(_))
        ));
    }

    #[test]
    fn test_warmup_tracks_indicator_columns_only() {
        let mut series = EnrichedSeries::new(make_candles(3));
        series.add_indicator_column("sma", vec![f64::NAN, 2.0, 3.0]).unwrap();
        series.add_column("external", vec![f64::NAN, f64::NAN, f64::NAN]).unwrap();
        assert!(series.in_warmup(0));
        assert!(!series.in_warmup(1)); // external NaN does not gate the strategy
    }
}
