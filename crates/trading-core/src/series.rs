use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// One row of a computed indicator series, keyed by column name.
///
/// Cells are `Option<f64>` so absence is explicit at the boundary:
/// consumers must branch on presence before doing arithmetic. No NaN
/// sentinels cross this type.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndicatorSnapshot {
    values: BTreeMap<String, Option<f64>>,
}

impl IndicatorSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, column: &str, value: Option<f64>) {
        // A NaN slipping in from upstream math is the same as "no value".
        let value = value.filter(|v| v.is_finite());
        self.values.insert(column.to_string(), value);
    }

    pub fn with(mut self, column: &str, value: Option<f64>) -> Self {
        self.set(column, value);
        self
    }

    /// Value for `column`, flattening "column missing" and "cell null"
    /// into one absent case.
    pub fn get(&self, column: &str) -> Option<f64> {
        self.values.get(column).copied().flatten()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Columns from `required` that have no usable value here.
    pub fn missing<'a>(&self, required: &[&'a str]) -> Vec<&'a str> {
        required
            .iter()
            .filter(|c| self.get(c).is_none())
            .copied()
            .collect()
    }
}

/// Ordered indicator history, oldest first. Strategies only ever need
/// the latest row plus a short lookback window.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndicatorSeries {
    rows: Vec<IndicatorSnapshot>,
}

impl IndicatorSeries {
    pub fn new(rows: Vec<IndicatorSnapshot>) -> Self {
        Self { rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn latest(&self) -> Option<&IndicatorSnapshot> {
        self.rows.last()
    }

    /// Up to `n` most recent rows, oldest first.
    pub fn lookback(&self, n: usize) -> &[IndicatorSnapshot] {
        let start = self.rows.len().saturating_sub(n);
        &self.rows[start..]
    }

    /// Lowest value of `column` over the last `n` rows, ignoring
    /// absent cells.
    pub fn lookback_min(&self, column: &str, n: usize) -> Option<f64> {
        self.lookback(n)
            .iter()
            .filter_map(|row| row.get(column))
            .fold(None, |acc, v| Some(acc.map_or(v, |a: f64| a.min(v))))
    }

    /// Highest value of `column` over the last `n` rows, ignoring
    /// absent cells.
    pub fn lookback_max(&self, column: &str, n: usize) -> Option<f64> {
        self.lookback(n)
            .iter()
            .filter_map(|row| row.get(column))
            .fold(None, |acc, v| Some(acc.map_or(v, |a: f64| a.max(v))))
    }
}
