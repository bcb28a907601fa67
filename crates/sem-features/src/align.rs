//! Temporal alignment and resampling.
//!
//! Feature streams arrive at different frame rates and with gaps. The aligner
//! densifies each stream, converts it to wall-clock seconds, keeps only the
//! time range where every stream has data, and resamples onto a fixed grid of
//! `rate_ms` buckets.
//!
//! ```text
//! table ─► interpolate_frames ─► seconds ─┐
//! table ─► interpolate_frames ─► seconds ─┼─► union ─► drop incomplete ─► bucket mean
//! table ─► interpolate_frames ─► seconds ─┘
//! ```

use ndarray::{s, Array2, Axis};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{AlignError, FeatureError};
use crate::table::FeatureTable;

/// Slack applied before flooring a time into its bucket.
const BUCKET_EPS: f64 = 1e-9;

// ---------------------------------------------------------------------------
// Options and output types
// ---------------------------------------------------------------------------

/// Parameters of [`combine_tables`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlignOptions {
    /// Bucket width in milliseconds.
    pub rate_ms: f64,
    /// Frame rate used to derive a frame number for each bucket.
    pub reference_fps: f64,
    /// Binary columns that are rounded up after averaging.
    pub indicator_columns: Vec<String>,
}

impl AlignOptions {
    /// Options with the default `appear` / `disappear` indicators.
    pub fn new(rate_ms: f64, reference_fps: f64) -> Self {
        Self {
            rate_ms,
            reference_fps,
            indicator_columns: vec!["appear".into(), "disappear".into()],
        }
    }
}

/// Contiguous column span contributed by one input table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnBlock {
    /// Name of the source table.
    pub name: String,
    /// First column.
    pub start: usize,
    /// Number of columns.
    pub len: usize,
}

impl ColumnBlock {
    /// One past the last column.
    pub fn end(&self) -> usize {
        self.start + self.len
    }
}

/// Feature tables aligned on a fixed wall-clock grid. Never holds a missing value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CombinedFeatureMatrix {
    times: Vec<f64>,
    frames: Vec<i64>,
    columns: Vec<String>,
    values: Array2<f64>,
    blocks: Vec<ColumnBlock>,
}

impl CombinedFeatureMatrix {
    /// Number of rows.
    pub fn n_rows(&self) -> usize {
        self.values.nrows()
    }

    /// Number of columns.
    pub fn n_cols(&self) -> usize {
        self.values.ncols()
    }

    /// `true` when no row survived alignment.
    pub fn is_empty(&self) -> bool {
        self.values.nrows() == 0
    }

    /// Row bucket times in seconds.
    pub fn times(&self) -> &[f64] {
        &self.times
    }

    /// Derived frame per row. Non-decreasing.
    pub fn frames(&self) -> &[i64] {
        &self.frames
    }

    /// Column names.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Values, `[n_rows, n_cols]`.
    pub fn values(&self) -> &Array2<f64> {
        &self.values
    }

    /// Column spans of the source tables, in input order.
    pub fn blocks(&self) -> &[ColumnBlock] {
        &self.blocks
    }

    /// Find a block by table name.
    pub fn block(&self, name: &str) -> Option<&ColumnBlock> {
        self.blocks.iter().find(|b| b.name == name)
    }

    /// Slice one block back out as a frame-indexed table.
    ///
    /// Rows that round onto an already used frame are dropped.
    pub fn block_table(&self, index: usize, fps: f64) -> Option<FeatureTable> {
        let block = self.blocks.get(index)?;
        let mut keep = Vec::with_capacity(self.frames.len());
        let mut frames = Vec::with_capacity(self.frames.len());
        for (i, &f) in self.frames.iter().enumerate() {
            if frames.last().map_or(true, |&last| f > last) {
                keep.push(i);
                frames.push(f);
            }
        }
        let values = self
            .values
            .slice(s![.., block.start..block.end()])
            .select(Axis(0), &keep);
        let columns = self.columns[block.start..block.end()].to_vec();
        FeatureTable::new(block.name.clone(), fps, frames, columns, values).ok()
    }

    /// Concatenate tables that already share one frame index.
    ///
    /// Used when reloading cached post-alignment tables, which skips the
    /// resampling step.
    pub fn from_aligned_tables(tables: &[FeatureTable], reference_fps: f64) -> Result<Self, AlignError> {
        let first = tables.first().ok_or(AlignError::NoTables)?;
        if reference_fps <= 0.0 {
            return Err(AlignError::InvalidFps { table: "reference".into(), fps: reference_fps });
        }
        for t in &tables[1..] {
            if t.frames() != first.frames() {
                return Err(AlignError::IndexMismatch { table: t.name.clone(), reference: first.name.clone() });
            }
        }
        let n_rows = first.n_rows();
        let n_cols: usize = tables.iter().map(FeatureTable::n_cols).sum();
        let mut values = Array2::<f64>::zeros((n_rows, n_cols));
        let mut columns = Vec::with_capacity(n_cols);
        let mut blocks = Vec::with_capacity(tables.len());
        let mut start = 0;
        for t in tables {
            values.slice_mut(s![.., start..start + t.n_cols()]).assign(t.values());
            columns.extend(t.columns().iter().cloned());
            blocks.push(ColumnBlock { name: t.name.clone(), start, len: t.n_cols() });
            start += t.n_cols();
        }
        let missing = values.iter().filter(|v| v.is_nan()).count();
        if missing > 0 {
            return Err(AlignError::MissingValues { count: missing });
        }
        let frames = first.frames().to_vec();
        let times = frames.iter().map(|&f| f as f64 / reference_fps).collect();
        Ok(Self { times, frames, columns, values, blocks })
    }
}

/// Result of [`combine_tables`].
#[derive(Debug, Clone)]
pub struct Alignment {
    /// The aligned matrix.
    pub matrix: CombinedFeatureMatrix,
    /// First frame where every table has data, at the reference fps.
    /// `None` when the ranges are disjoint.
    pub first_frame: Option<i64>,
    /// Per-table slices of the matrix, indexed by derived frame.
    pub tables: Vec<FeatureTable>,
}

// ---------------------------------------------------------------------------
// Densify
// ---------------------------------------------------------------------------

/// Densify a table onto every integer frame between its first and last row.
///
/// Gaps are filled by linear interpolation per column, only between two
/// observed values. Nothing outside an observed span is filled.
pub fn interpolate_frames(table: &FeatureTable) -> FeatureTable {
    let (Some(first), Some(last)) = (table.first_frame(), table.last_frame()) else {
        return table.clone();
    };
    let n = (last - first + 1) as usize;
    let frames: Vec<i64> = (first..=last).collect();
    let mut values = Array2::<f64>::from_elem((n, table.n_cols()), f64::NAN);
    for (r, &f) in table.frames().iter().enumerate() {
        values.row_mut((f - first) as usize).assign(&table.values().row(r));
    }
    for mut col in values.axis_iter_mut(Axis(1)) {
        let mut prev: Option<usize> = None;
        for i in 0..n {
            if col[i].is_nan() {
                continue;
            }
            if let Some(p) = prev {
                if i > p + 1 {
                    let (a, b) = (col[p], col[i]);
                    let span = (i - p) as f64;
                    for k in p + 1..i {
                        col[k] = a + (b - a) * (k - p) as f64 / span;
                    }
                }
            }
            prev = Some(i);
        }
    }
    FeatureTable::new(table.name.clone(), table.fps, frames, table.columns().to_vec(), values)
        .unwrap_or_else(|_| table.clone())
}

/// Linear interpolation of `(xs, ys)` at `x`; `NaN` outside `[xs[0], xs[n-1]]`.
///
/// `xs` must be sorted ascending.
pub fn interp_inside(xs: &[f64], ys: &[f64], x: f64) -> f64 {
    let n = xs.len();
    if n == 0 || x < xs[0] || x > xs[n - 1] {
        return f64::NAN;
    }
    let hi = xs.partition_point(|&v| v < x);
    if hi < n && xs[hi] == x {
        return ys[hi];
    }
    let lo = hi - 1;
    let t = (x - xs[lo]) / (xs[hi] - xs[lo]);
    ys[lo] + (ys[hi] - ys[lo]) * t
}

// ---------------------------------------------------------------------------
// Combine + resample
// ---------------------------------------------------------------------------

/// Align `tables` onto one `rate_ms` grid.
///
/// The output covers only the span where every table has data; disjoint
/// spans give an empty matrix with `first_frame == None`.
pub fn combine_tables(tables: &[FeatureTable], options: &AlignOptions) -> Result<Alignment, FeatureError> {
    Ok(combine_inner(tables, options)?)
}

fn combine_inner(tables: &[FeatureTable], options: &AlignOptions) -> Result<Alignment, AlignError> {
    if tables.is_empty() {
        return Err(AlignError::NoTables);
    }
    if !(options.rate_ms > 0.0) {
        return Err(AlignError::InvalidRate(options.rate_ms));
    }
    if !(options.reference_fps > 0.0) {
        return Err(AlignError::InvalidFps { table: "reference".into(), fps: options.reference_fps });
    }
    if let Some(t) = tables.iter().find(|t| !(t.fps > 0.0)) {
        return Err(AlignError::InvalidFps { table: t.name.clone(), fps: t.fps });
    }

    let dense: Vec<FeatureTable> = tables.iter().map(interpolate_frames).collect();

    // union of all timestamps
    let mut union: Vec<f64> = dense.iter().flat_map(FeatureTable::times).collect();
    union.sort_by(|a, b| a.total_cmp(b));
    union.dedup_by(|a, b| (*a - *b).abs() < 1e-12);

    // each table sampled on the union, column by column
    let mut columns = Vec::new();
    let mut blocks = Vec::with_capacity(dense.len());
    let mut sampled: Vec<Vec<f64>> = Vec::new();
    for t in &dense {
        blocks.push(ColumnBlock { name: t.name.clone(), start: columns.len(), len: t.n_cols() });
        columns.extend(t.columns().iter().cloned());
        let times = t.times();
        for col in t.values().axis_iter(Axis(1)) {
            let (xs, ys): (Vec<f64>, Vec<f64>) = times
                .iter()
                .zip(col.iter())
                .filter(|(_, v)| !v.is_nan())
                .map(|(&x, &y)| (x, y))
                .unzip();
            sampled.push(union.iter().map(|&x| interp_inside(&xs, &ys, x)).collect());
        }
    }

    // keep rows where every column has a value
    let complete: Vec<usize> = (0..union.len())
        .filter(|&r| sampled.iter().all(|c| !c[r].is_nan()))
        .collect();
    let row_times: Vec<f64> = complete.iter().map(|&r| union[r]).collect();
    let n_cols = columns.len();

    if row_times.is_empty() {
        warn!(tables = tables.len(), "feature tables share no common time range");
        let matrix = CombinedFeatureMatrix {
            times: Vec::new(),
            frames: Vec::new(),
            columns,
            values: Array2::zeros((0, n_cols)),
            blocks,
        };
        let post = (0..matrix.blocks.len())
            .filter_map(|i| matrix.block_table(i, options.reference_fps))
            .collect();
        return Ok(Alignment { matrix, first_frame: None, tables: post });
    }
    let row_cols: Vec<Vec<f64>> = sampled
        .iter()
        .map(|c| complete.iter().map(|&r| c[r]).collect())
        .collect();

    // grid points t0 + j·Δ, then bucket means
    let delta = options.rate_ms / 1000.0;
    let t0 = row_times[0];
    let t_end = row_times[row_times.len() - 1];
    let mut points: Vec<(f64, Vec<f64>)> = row_times
        .iter()
        .enumerate()
        .map(|(r, &t)| (t, row_cols.iter().map(|c| c[r]).collect()))
        .collect();
    let mut j = 0usize;
    loop {
        let t = t0 + j as f64 * delta;
        if t > t_end + 1e-12 {
            break;
        }
        let exists = row_times
            .binary_search_by(|v| v.total_cmp(&t))
            .is_ok();
        if !exists {
            points.push((t, row_cols.iter().map(|c| interp_inside(&row_times, c, t)).collect()));
        }
        j += 1;
    }
    points.sort_by(|a, b| a.0.total_cmp(&b.0));

    let bucket_of = |t: f64| (t / delta + BUCKET_EPS).floor() as i64;
    let mut times = Vec::new();
    let mut rows: Vec<Vec<f64>> = Vec::new();
    let mut current: Option<(i64, f64, Vec<f64>, usize)> = None;
    for (t, vals) in points {
        let b = bucket_of(t);
        match current.as_mut() {
            Some((cb, tsum, sums, count)) if *cb == b => {
                *tsum += t;
                for (s, v) in sums.iter_mut().zip(&vals) {
                    *s += v;
                }
                *count += 1;
            }
            _ => {
                if let Some((_, tsum, sums, count)) = current.take() {
                    times.push(tsum / count as f64);
                    rows.push(sums.into_iter().map(|s| s / count as f64).collect());
                }
                current = Some((b, t, vals, 1));
            }
        }
    }
    if let Some((_, tsum, sums, count)) = current {
        times.push(tsum / count as f64);
        rows.push(sums.into_iter().map(|s| s / count as f64).collect());
    }

    let mut values = Array2::<f64>::zeros((rows.len(), n_cols));
    for (r, row) in rows.iter().enumerate() {
        for (c, v) in row.iter().enumerate() {
            values[[r, c]] = *v;
        }
    }
    for name in &options.indicator_columns {
        if let Some(c) = columns.iter().position(|x| x == name) {
            values.column_mut(c).mapv_inplace(f64::ceil);
        }
    }

    let missing = values.iter().filter(|v| !v.is_finite()).count();
    if missing > 0 {
        return Err(AlignError::MissingValues { count: missing });
    }

    let frames = times
        .iter()
        .map(|t| (t * options.reference_fps).round() as i64)
        .collect();
    let first_frame = Some((t0 * options.reference_fps).round() as i64);
    let matrix = CombinedFeatureMatrix { times, frames, columns, values, blocks };
    let post = (0..matrix.blocks.len())
        .filter_map(|i| matrix.block_table(i, options.reference_fps))
        .collect();

    debug!(
        rows = matrix.n_rows(),
        cols = matrix.n_cols(),
        start = t0,
        end = t_end,
        "aligned feature tables"
    );
    Ok(Alignment { matrix, first_frame, tables: post })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    fn table(name: &str, fps: f64, frames: Vec<i64>, vals: Vec<f64>) -> FeatureTable {
        let n = vals.len();
        FeatureTable::new(name, fps, frames, vec![name.to_string()], Array2::from_shape_vec((n, 1), vals).unwrap())
            .unwrap()
    }

    #[test]
    fn densify_fills_interior_only() {
        let t = FeatureTable::new(
            "t",
            30.0,
            vec![2, 4, 7],
            vec!["a".into(), "b".into()],
            array![[0.0, f64::NAN], [2.0, 1.0], [5.0, 4.0]],
        )
        .unwrap();
        let d = interpolate_frames(&t);
        assert_eq!(d.frames(), &[2, 3, 4, 5, 6, 7]);
        assert_relative_eq!(d.values()[[1, 0]], 1.0);
        assert_relative_eq!(d.values()[[3, 0]], 3.0);
        assert!(d.values()[[0, 1]].is_nan());
        assert!(d.values()[[1, 1]].is_nan());
        assert_relative_eq!(d.values()[[4, 1]], 3.0);
    }

    #[test]
    fn interp_inside_never_extrapolates() {
        let xs = [0.0, 1.0, 2.0];
        let ys = [0.0, 10.0, 20.0];
        assert_relative_eq!(interp_inside(&xs, &ys, 1.5), 15.0);
        assert_relative_eq!(interp_inside(&xs, &ys, 2.0), 20.0);
        assert!(interp_inside(&xs, &ys, 2.1).is_nan());
        assert!(interp_inside(&xs, &ys, -0.1).is_nan());
    }

    #[test]
    fn bucket_mean_and_indicator_ceil() {
        let a = table("appear", 25.0, vec![0, 1, 2], vec![0.0, 1.0, 0.0]);
        let b = table("x", 25.0, vec![0, 1, 2], vec![0.0, 4.0, 8.0]);
        let out = combine_tables(&[a, b], &AlignOptions::new(80.0, 25.0)).unwrap();
        // frames at 0, 40, 80 ms; buckets [0,80) and [80,160)
        assert_eq!(out.matrix.n_rows(), 2);
        assert_relative_eq!(out.matrix.values()[[0, 0]], 1.0);
        assert_relative_eq!(out.matrix.values()[[0, 1]], 2.0);
        assert_relative_eq!(out.matrix.values()[[1, 1]], 8.0);
        assert_eq!(out.matrix.frames()[1], 2);
        assert_eq!(out.first_frame, Some(0));
    }
}
