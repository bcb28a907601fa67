//! Frame-indexed feature tables.
//!
//! A [`FeatureTable`] is the unit every preprocessor produces: one row per
//! observed frame, one named `f64` column per feature. Frames are unique and
//! strictly increasing but need not be contiguous. Missing cells are `NaN`.

use std::path::Path;

use ndarray::{Array1, Array2, ArrayView1, Axis};
use serde::{Deserialize, Serialize};

use crate::error::FeatureError;

/// Name of the index column every per-run CSV must carry.
pub const FRAME_COLUMN: &str = "frame";

/// A per-video, per-modality table keyed by integer frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureTable {
    /// Modality name, e.g. `"appear"` or `"skel"`.
    pub name: String,
    /// Frame rate of the source stream.
    pub fps: f64,
    frames: Vec<i64>,
    columns: Vec<String>,
    values: Array2<f64>,
}

impl FeatureTable {
    /// Build a table, checking shapes and frame ordering.
    ///
    /// Infinite values are replaced by `NaN`.
    pub fn new(
        name: impl Into<String>,
        fps: f64,
        frames: Vec<i64>,
        columns: Vec<String>,
        mut values: Array2<f64>,
    ) -> Result<Self, FeatureError> {
        let name = name.into();
        if values.nrows() != frames.len() {
            return Err(FeatureError::invalid_table(
                &name,
                format!("{} frames but {} rows", frames.len(), values.nrows()),
            ));
        }
        if values.ncols() != columns.len() {
            return Err(FeatureError::invalid_table(
                &name,
                format!("{} column names but {} value columns", columns.len(), values.ncols()),
            ));
        }
        if let Some(w) = frames.windows(2).find(|w| w[1] <= w[0]) {
            return Err(FeatureError::invalid_table(
                &name,
                format!("frames must be strictly increasing ({} then {})", w[0], w[1]),
            ));
        }
        values.mapv_inplace(|v| if v.is_infinite() { f64::NAN } else { v });
        Ok(Self { name, fps, frames, columns, values })
    }

    /// An empty table with the given columns.
    pub fn empty(name: impl Into<String>, fps: f64, columns: Vec<String>) -> Self {
        let ncols = columns.len();
        Self {
            name: name.into(),
            fps,
            frames: Vec::new(),
            columns,
            values: Array2::zeros((0, ncols)),
        }
    }

    /// Load a table from a CSV file with a `frame` column.
    ///
    /// Columns named in `skip_columns` are ignored, as is a leading unnamed
    /// index column. Empty fields parse as missing. Rows are sorted by frame;
    /// a repeated frame is an error.
    pub fn from_csv(
        path: &Path,
        name: &str,
        fps: f64,
        skip_columns: &[&str],
    ) -> Result<Self, FeatureError> {
        let (headers, rows) = read_records(path)?;
        let frame_idx = headers
            .iter()
            .position(|h| h == FRAME_COLUMN)
            .ok_or_else(|| FeatureError::invalid_format(path, "no `frame` column"))?;

        let keep: Vec<usize> = headers
            .iter()
            .enumerate()
            .filter(|(i, h)| {
                *i != frame_idx
                    && !h.is_empty()
                    && !h.starts_with("Unnamed:")
                    && !skip_columns.contains(&h.as_str())
            })
            .map(|(i, _)| i)
            .collect();
        let columns: Vec<String> = keep.iter().map(|&i| headers[i].clone()).collect();

        let mut parsed: Vec<(i64, Vec<f64>)> = Vec::with_capacity(rows.len());
        for (line, record) in rows.iter().enumerate() {
            let frame_field = record.get(frame_idx).unwrap_or("");
            let frame = parse_cell(frame_field)
                .filter(|f| f.is_finite())
                .ok_or_else(|| {
                    FeatureError::invalid_format(
                        path,
                        format!("row {}: bad frame value `{frame_field}`", line + 2),
                    )
                })?
                .round() as i64;
            let mut row = Vec::with_capacity(keep.len());
            for &c in &keep {
                let field = record.get(c).unwrap_or("");
                let v = parse_cell(field).ok_or_else(|| {
                    FeatureError::invalid_format(
                        path,
                        format!("row {}, column `{}`: not a number `{field}`", line + 2, headers[c]),
                    )
                })?;
                row.push(v);
            }
            parsed.push((frame, row));
        }

        parsed.sort_by_key(|(f, _)| *f);
        if let Some(w) = parsed.windows(2).find(|w| w[0].0 == w[1].0) {
            return Err(FeatureError::invalid_format(
                path,
                format!("duplicate frame {}", w[0].0),
            ));
        }

        let n = parsed.len();
        let mut values = Array2::<f64>::from_elem((n, columns.len()), f64::NAN);
        let mut frames = Vec::with_capacity(n);
        for (r, (frame, row)) in parsed.into_iter().enumerate() {
            frames.push(frame);
            for (c, v) in row.into_iter().enumerate() {
                values[[r, c]] = v;
            }
        }
        Self::new(name, fps, frames, columns, values)
    }

    /// Number of rows.
    pub fn n_rows(&self) -> usize {
        self.frames.len()
    }

    /// Number of feature columns.
    pub fn n_cols(&self) -> usize {
        self.columns.len()
    }

    /// `true` when the table has no rows.
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Frame index.
    pub fn frames(&self) -> &[i64] {
        &self.frames
    }

    /// Column names.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Value matrix, `[n_rows, n_cols]`.
    pub fn values(&self) -> &Array2<f64> {
        &self.values
    }

    /// Mutable value matrix.
    pub fn values_mut(&mut self) -> &mut Array2<f64> {
        &mut self.values
    }

    /// First observed frame.
    pub fn first_frame(&self) -> Option<i64> {
        self.frames.first().copied()
    }

    /// Last observed frame.
    pub fn last_frame(&self) -> Option<i64> {
        self.frames.last().copied()
    }

    /// Row timestamps in seconds, `frame / fps`.
    pub fn times(&self) -> Vec<f64> {
        self.frames.iter().map(|&f| f as f64 / self.fps).collect()
    }

    /// Position of a column by name.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// View of one column by name.
    pub fn column(&self, name: &str) -> Option<ArrayView1<'_, f64>> {
        self.column_index(name).map(|i| self.values.column(i))
    }

    /// A new table holding only the columns at `indices`, in that order.
    pub fn select_columns(&self, indices: &[usize]) -> Self {
        let columns = indices.iter().map(|&i| self.columns[i].clone()).collect();
        Self {
            name: self.name.clone(),
            fps: self.fps,
            frames: self.frames.clone(),
            columns,
            values: self.values.select(Axis(1), indices),
        }
    }

    /// A new table holding only the rows whose frame satisfies `keep`.
    pub fn filter_rows<F: Fn(i64) -> bool>(&self, keep: F) -> Self {
        let idx: Vec<usize> = (0..self.frames.len()).filter(|&i| keep(self.frames[i])).collect();
        Self {
            name: self.name.clone(),
            fps: self.fps,
            frames: idx.iter().map(|&i| self.frames[i]).collect(),
            columns: self.columns.clone(),
            values: self.values.select(Axis(0), &idx),
        }
    }

    /// Count of missing cells.
    pub fn missing_count(&self) -> usize {
        self.values.iter().filter(|v| v.is_nan()).count()
    }

    /// Per-row flag: `true` when any cell of the row is missing.
    pub fn rows_with_missing(&self) -> Array1<bool> {
        self.values
            .axis_iter(Axis(0))
            .map(|row| row.iter().any(|v| v.is_nan()))
            .collect()
    }

    /// Rename the table.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

/// Read a numeric CSV that has no frame index.
///
/// Used for the global skeleton reference sample. Every header becomes a
/// column; empty fields are missing.
pub fn read_numeric_csv(path: &Path) -> Result<(Vec<String>, Array2<f64>), FeatureError> {
    let (headers, rows) = read_records(path)?;
    let mut values = Array2::<f64>::from_elem((rows.len(), headers.len()), f64::NAN);
    for (r, record) in rows.iter().enumerate() {
        for c in 0..headers.len() {
            let field = record.get(c).unwrap_or("");
            values[[r, c]] = parse_cell(field).map_or(f64::NAN, |v| if v.is_finite() { v } else { f64::NAN });
        }
    }
    Ok((headers, values))
}

fn read_records(path: &Path) -> Result<(Vec<String>, Vec<csv::StringRecord>), FeatureError> {
    let csv_err = |source| FeatureError::Csv { path: path.to_path_buf(), source };
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(csv_err)?;
    let headers: Vec<String> = reader.headers().map_err(csv_err)?.iter().map(str::to_owned).collect();
    let rows = reader
        .records()
        .collect::<Result<Vec<_>, _>>()
        .map_err(csv_err)?;
    Ok((headers, rows))
}

/// Parse one CSV cell. Empty cells and `NaN` spellings are missing.
fn parse_cell(field: &str) -> Option<f64> {
    if field.is_empty() {
        return Some(f64::NAN);
    }
    match field {
        "nan" | "NaN" | "NA" | "null" => Some(f64::NAN),
        _ => field.parse::<f64>().ok(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use std::io::Write;

    #[test]
    fn new_rejects_unsorted_frames() {
        let err = FeatureTable::new("t", 30.0, vec![2, 1], vec!["a".into()], array![[1.0], [2.0]]);
        assert!(err.is_err());
    }

    #[test]
    fn new_maps_infinity_to_missing() {
        let t = FeatureTable::new("t", 30.0, vec![0, 1], vec!["a".into()], array![[f64::INFINITY], [2.0]])
            .unwrap();
        assert!(t.values()[[0, 0]].is_nan());
        assert_eq!(t.missing_count(), 1);
    }

    #[test]
    fn from_csv_sorts_and_parses_missing() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "frame,a,b").unwrap();
        writeln!(f, "3,1.5,").unwrap();
        writeln!(f, "1,0.5,2").unwrap();
        let t = FeatureTable::from_csv(f.path(), "x", 30.0, &[]).unwrap();
        assert_eq!(t.frames(), &[1, 3]);
        assert_eq!(t.columns(), &["a".to_string(), "b".to_string()]);
        assert!(t.values()[[1, 1]].is_nan());
    }

    #[test]
    fn from_csv_rejects_duplicate_frames() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "frame,a").unwrap();
        writeln!(f, "1,1").unwrap();
        writeln!(f, "1,2").unwrap();
        assert!(FeatureTable::from_csv(f.path(), "x", 30.0, &[]).is_err());
    }

    #[test]
    fn select_and_filter() {
        let t = FeatureTable::new(
            "t",
            25.0,
            vec![0, 5, 10],
            vec!["a".into(), "b".into()],
            array![[1.0, 2.0], [3.0, 4.0], [5.0, 6.0]],
        )
        .unwrap();
        let s = t.select_columns(&[1]);
        assert_eq!(s.columns(), &["b".to_string()]);
        let r = t.filter_rows(|f| f >= 5);
        assert_eq!(r.frames(), &[5, 10]);
        assert_eq!(r.values()[[0, 0]], 3.0);
        assert!((t.times()[1] - 0.2).abs() < 1e-12);
    }
}
