//! Column statistics and normalisation.
//!
//! All routines treat `NaN` as missing: statistics skip it and transforms
//! leave it in place.

use ndarray::{Array2, ArrayView1, Axis};
use serde::{Deserialize, Serialize};

/// Normalisation applied to a whole table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Scaling {
    /// `(x - mean) / std` with the sample standard deviation.
    #[default]
    ZScore,
    /// `(x - min) / (max - min)`.
    MinMax,
}

/// Mean and sample standard deviation of one column.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ColumnStats {
    /// Mean of the non-missing values.
    pub mean: f64,
    /// Standard deviation with `ddof = 1`. `NaN` for fewer than two values.
    pub std: f64,
}

impl Default for ColumnStats {
    fn default() -> Self {
        Self { mean: 0.0, std: 1.0 }
    }
}

impl ColumnStats {
    /// Compute from an iterator, skipping non-finite values.
    ///
    /// Returns `None` when no finite value is present.
    pub fn from_values<I: IntoIterator<Item = f64>>(values: I) -> Option<Self> {
        let finite: Vec<f64> = values.into_iter().filter(|v| v.is_finite()).collect();
        if finite.is_empty() {
            return None;
        }
        let n = finite.len() as f64;
        let mean = finite.iter().sum::<f64>() / n;
        let std = if finite.len() < 2 {
            f64::NAN
        } else {
            (finite.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0)).sqrt()
        };
        Some(Self { mean, std })
    }

    /// Divisor to use when standardising.
    ///
    /// Falls back to 1.0 for a degenerate or undefined deviation so constant
    /// columns map to zero instead of blowing up.
    pub fn safe_std(&self) -> f64 {
        if !self.std.is_finite() || self.std.abs() < 1e-12 {
            1.0
        } else {
            self.std
        }
    }

    /// Standardise one value.
    pub fn apply(&self, v: f64) -> f64 {
        (v - self.mean) / self.safe_std()
    }
}

/// Per-column [`ColumnStats`].
pub fn column_stats(values: &Array2<f64>) -> Vec<Option<ColumnStats>> {
    values
        .axis_iter(Axis(1))
        .map(|col| ColumnStats::from_values(col.iter().copied()))
        .collect()
}

/// Apply `scaling` to every column in place.
pub fn scale_columns(values: &mut Array2<f64>, scaling: Scaling) {
    match scaling {
        Scaling::ZScore => zscore_columns(values),
        Scaling::MinMax => minmax_columns(values),
    }
}

/// Z-score every column over its own non-missing values.
pub fn zscore_columns(values: &mut Array2<f64>) {
    for mut col in values.axis_iter_mut(Axis(1)) {
        if let Some(stats) = ColumnStats::from_values(col.iter().copied()) {
            col.mapv_inplace(|v| stats.apply(v));
        }
    }
}

/// Min-max scale every column into `[0, 1]`. Constant columns become 0.
pub fn minmax_columns(values: &mut Array2<f64>) {
    for mut col in values.axis_iter_mut(Axis(1)) {
        let (lo, hi) = finite_range(col.view());
        if !lo.is_finite() {
            continue;
        }
        let span = hi - lo;
        col.mapv_inplace(|v| if span.abs() < 1e-12 { v - lo } else { (v - lo) / span });
    }
}

fn finite_range(col: ArrayView1<'_, f64>) -> (f64, f64) {
    col.iter()
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)))
}

/// Quantile of already-sorted finite data using linear interpolation
/// between closest ranks.
pub fn quantile_sorted(sorted: &[f64], q: f64) -> f64 {
    match sorted.len() {
        0 => f64::NAN,
        1 => sorted[0],
        n => {
            let pos = q.clamp(0.0, 1.0) * (n - 1) as f64;
            let lo = pos.floor() as usize;
            let hi = pos.ceil() as usize;
            let frac = pos - lo as f64;
            sorted[lo] + (sorted[hi] - sorted[lo]) * frac
        }
    }
}

/// Quantile of a column, ignoring missing values.
pub fn quantile(col: ArrayView1<'_, f64>, q: f64) -> f64 {
    let mut finite: Vec<f64> = col.iter().copied().filter(|v| v.is_finite()).collect();
    finite.sort_by(|a, b| a.total_cmp(b));
    quantile_sorted(&finite, q)
}

/// Carry the last observed value forward over missing cells, per column.
///
/// Leading missing cells stay missing.
pub fn forward_fill(values: &mut Array2<f64>) {
    for mut col in values.axis_iter_mut(Axis(1)) {
        let mut last = f64::NAN;
        for v in col.iter_mut() {
            if v.is_nan() {
                *v = last;
            } else {
                last = *v;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    #[test]
    fn stats_use_sample_std_and_skip_missing() {
        let s = ColumnStats::from_values([1.0, 2.0, f64::NAN, 3.0]).unwrap();
        assert_relative_eq!(s.mean, 2.0);
        assert_relative_eq!(s.std, 1.0);
        assert!(ColumnStats::from_values([f64::NAN]).is_none());
    }

    #[test]
    fn zscore_keeps_missing_and_handles_constant() {
        let mut m = array![[1.0, 5.0], [f64::NAN, 5.0], [3.0, 5.0]];
        zscore_columns(&mut m);
        assert_relative_eq!(m[[0, 0]], -std::f64::consts::FRAC_1_SQRT_2, epsilon = 1e-12);
        assert!(m[[1, 0]].is_nan());
        assert_relative_eq!(m[[2, 1]], 0.0);
    }

    #[test]
    fn minmax_maps_to_unit_interval() {
        let mut m = array![[2.0], [4.0], [3.0]];
        minmax_columns(&mut m);
        assert_relative_eq!(m[[0, 0]], 0.0);
        assert_relative_eq!(m[[1, 0]], 1.0);
        assert_relative_eq!(m[[2, 0]], 0.5);
    }

    #[test]
    fn quantile_interpolates() {
        let data = [0.0, 10.0, 20.0, 30.0, 40.0];
        assert_relative_eq!(quantile_sorted(&data, 0.05), 2.0);
        assert_relative_eq!(quantile_sorted(&data, 0.95), 38.0);
        assert_relative_eq!(quantile_sorted(&data, 0.5), 20.0);
    }

    #[test]
    fn forward_fill_leaves_leading_gap() {
        let mut m = array![[f64::NAN], [1.0], [f64::NAN], [2.0]];
        forward_fill(&mut m);
        assert!(m[[0, 0]].is_nan());
        assert_eq!(m[[2, 0]], 1.0);
    }
}
