//! Parameter ranges and grid enumeration.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::backtesting::Params;

use super::{Result, WalkForwardError};

/// Inclusive numeric range swept during optimization.
///
/// Enumerates `start, start + step, … ≤ end`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParamRange {
    /// First value
    pub start: f64,
    /// Upper bound (inclusive when hit exactly by a step)
    pub end: f64,
    /// Increment between values
    pub step: f64,
}

impl ParamRange {
    /// Build a range, validating `start < end` and `step > 0`.
    pub fn new(start: f64, end: f64, step: f64) -> Result<Self> {
        let range = Self { start, end, step };
        range.validate("range")?;
        Ok(range)
    }

    /// Validate the range, naming the parameter in error messages.
    pub fn validate(&self, param: &str) -> Result<()> {
        if !(self.start < self.end) {
            return Err(WalkForwardError::InvalidRange {
                param: param.to_string(),
                reason: format!("start {} must be below end {}", self.start, self.end),
            });
        }
        if !(self.step > 0.0) {
            return Err(WalkForwardError::InvalidRange {
                param: param.to_string(),
                reason: format!("step {} must be positive", self.step),
            });
        }
        Ok(())
    }

    /// Number of values this range enumerates: `⌊(end − start)/step⌋ + 1`.
    pub fn count(&self) -> usize {
        ((self.end - self.start) / self.step + 1e-9) as usize + 1
    }

    /// Materialize the values. Multiplication (not repeated addition) keeps
    /// accumulated float error out of the later steps.
    pub fn enumerate(&self) -> Vec<f64> {
        (0..self.count()).map(|i| self.start + i as f64 * self.step).collect()
    }
}

/// A named set of parameter ranges. `BTreeMap` fixes the enumeration order
/// to lexicographic parameter names.
pub type ParamGrid = BTreeMap<String, ParamRange>;

/// Number of concrete assignments in the grid's cartesian product, without
/// materializing them.
pub fn combination_count(grid: &ParamGrid) -> usize {
    if grid.is_empty() {
        return 0;
    }
    grid.values().map(ParamRange::count).product()
}

/// Materialize the cartesian product of the grid.
///
/// Parameter names iterate in lexicographic order with the last name
/// cycling fastest, so the sequence is stable across runs and worker counts.
pub fn parameter_combinations(grid: &ParamGrid) -> Vec<Params> {
    if grid.is_empty() {
        return Vec::new();
    }

    let mut combinations: Vec<Params> = vec![Params::new()];
    for (name, range) in grid {
        let values = range.enumerate();
        let mut next = Vec::with_capacity(combinations.len() * values.len());
        for existing in &combinations {
            for &value in &values {
                let mut combo = existing.clone();
                combo.insert(name.clone(), value);
                next.push(combo);
            }
        }
        combinations = next;
    }
    combinations
}
