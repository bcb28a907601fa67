//! Per-modality preprocessors.
//!
//! Each function reads one per-run CSV keyed by `frame` and returns a
//! [`FeatureTable`] with a deterministic column set. The object-hand and
//! scene embeddings live in [`crate::embedding`].

use std::collections::HashMap;
use std::path::Path;

use ndarray::Axis;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::FeatureError;
use crate::normalize::{forward_fill, quantile, scale_columns, ColumnStats};
use crate::table::{read_numeric_csv, FeatureTable};

pub use crate::normalize::Scaling;

/// Skeleton columns that never carry motion features.
pub const SKELETON_ADMIN_COLUMNS: &[&str] = &[
    "sync_time",
    "raw_time",
    "body",
    "J1_dist_from_J1",
    "J1_3D_rel_X",
    "J1_3D_rel_Y",
    "J1_3D_rel_Z",
];

/// Substrings that mark a skeleton column as a motion feature.
pub const SKELETON_KEYWORDS: &[&str] = &["accel", "speed", "dist", "interhand", "rel"];

/// Extra keyword admitted when positions are requested.
pub const SKELETON_POSITION_KEYWORD: &str = "2D";

// ---------------------------------------------------------------------------
// Appearance / optical flow
// ---------------------------------------------------------------------------

/// Load the appearance indicators unchanged.
pub fn preprocess_appear(path: &Path, fps: f64) -> Result<FeatureTable, FeatureError> {
    let table = FeatureTable::from_csv(path, "appear", fps, &[])?;
    debug!(rows = table.n_rows(), cols = table.n_cols(), "loaded appearance");
    Ok(table)
}

/// Load optical-flow features and scale every column.
pub fn preprocess_optical(path: &Path, fps: f64, scaling: Scaling) -> Result<FeatureTable, FeatureError> {
    let mut table = FeatureTable::from_csv(path, "optical", fps, &[])?;
    scale_columns(table.values_mut(), scaling);
    debug!(rows = table.n_rows(), cols = table.n_cols(), ?scaling, "loaded optical flow");
    Ok(table)
}

// ---------------------------------------------------------------------------
// Skeleton
// ---------------------------------------------------------------------------

/// Outlier band and in-band statistics of one reference column.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReferenceColumn {
    /// Lower quantile; values must be strictly above it.
    pub low: f64,
    /// Upper quantile; values must be strictly below it.
    pub high: f64,
    /// Mean and sample std of reference values inside the band.
    pub stats: ColumnStats,
}

impl ReferenceColumn {
    /// `true` when `v` lies inside the open band.
    pub fn contains(&self, v: f64) -> bool {
        v > self.low && v < self.high
    }
}

/// Global skeleton statistics sampled across many runs.
///
/// Loaded once per process and shared read-only.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SkeletonReference {
    columns: HashMap<String, ReferenceColumn>,
}

impl SkeletonReference {
    /// Build from a reference sample CSV with the same columns as the runs.
    pub fn from_csv(path: &Path, lower_q: f64, upper_q: f64) -> Result<Self, FeatureError> {
        let (headers, values) = read_numeric_csv(path)?;
        let mut columns = HashMap::with_capacity(headers.len());
        for (name, col) in headers.into_iter().zip(values.axis_iter(Axis(1))) {
            let low = quantile(col, lower_q);
            let high = quantile(col, upper_q);
            let inside = col.iter().copied().filter(|&v| v > low && v < high);
            let stats = ColumnStats::from_values(inside).unwrap_or_default();
            columns.insert(name, ReferenceColumn { low, high, stats });
        }
        Ok(Self { columns })
    }

    /// Build from explicit per-column entries.
    pub fn from_columns(columns: HashMap<String, ReferenceColumn>) -> Self {
        Self { columns }
    }

    /// Entry for one column.
    pub fn column(&self, name: &str) -> Option<&ReferenceColumn> {
        self.columns.get(name)
    }

    /// Number of reference columns.
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// `true` when no column is known.
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// Knobs for [`preprocess_skel`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SkeletonOptions {
    /// Also keep 2-D position columns.
    pub use_position: bool,
    /// A column qualifies when more than this fraction of rows survive masking.
    pub min_column_survival: f64,
    /// The run aborts when at least this fraction of columns fail to qualify.
    pub max_failed_column_fraction: f64,
}

impl Default for SkeletonOptions {
    fn default() -> Self {
        Self { use_position: false, min_column_survival: 0.8, max_failed_column_fraction: 0.1 }
    }
}

/// `true` when a skeleton column is a motion feature under `use_position`.
pub fn is_skeleton_feature(column: &str, use_position: bool) -> bool {
    if SKELETON_ADMIN_COLUMNS.contains(&column) {
        return false;
    }
    SKELETON_KEYWORDS.iter().any(|k| column.contains(k))
        || (use_position && column.contains(SKELETON_POSITION_KEYWORD))
}

/// Load skeleton features.
///
/// Without a reference the selected columns are returned raw. With one, each
/// value outside the reference band is masked, the survival guard is checked,
/// gaps are forward-filled and the columns are standardised with the
/// reference statistics.
pub fn preprocess_skel(
    path: &Path,
    fps: f64,
    reference: Option<&SkeletonReference>,
    options: &SkeletonOptions,
) -> Result<FeatureTable, FeatureError> {
    let raw = FeatureTable::from_csv(path, "skel", fps, SKELETON_ADMIN_COLUMNS)?;
    let keep: Vec<usize> = raw
        .columns()
        .iter()
        .enumerate()
        .filter(|(_, c)| is_skeleton_feature(c, options.use_position))
        .map(|(i, _)| i)
        .collect();
    let mut table = raw.select_columns(&keep);

    let Some(reference) = reference else {
        return Ok(table);
    };

    let bands: Vec<ReferenceColumn> = table
        .columns()
        .iter()
        .map(|c| {
            reference
                .column(c)
                .copied()
                .ok_or_else(|| FeatureError::MissingReferenceColumn { column: c.clone() })
        })
        .collect::<Result<_, _>>()?;

    let n_rows = table.n_rows();
    let threshold = (n_rows as f64 * options.min_column_survival) as usize;
    let mut failed = 0usize;
    for (mut col, band) in table.values_mut().axis_iter_mut(Axis(1)).zip(&bands) {
        let mut survivors = 0usize;
        for v in col.iter_mut() {
            if band.contains(*v) {
                survivors += 1;
            } else {
                *v = f64::NAN;
            }
        }
        if survivors <= threshold {
            failed += 1;
        }
    }

    let total = bands.len();
    if total > 0 {
        let qualified = (total - failed) as f64 / total as f64;
        if qualified <= 1.0 - options.max_failed_column_fraction {
            return Err(FeatureError::SkeletonQuality {
                source_name: path.display().to_string(),
                failed,
                total,
                min_survival: options.min_column_survival,
            });
        }
        if failed > 0 {
            warn!(failed, total, "skeleton columns below survival threshold");
        }
    }

    forward_fill(table.values_mut());
    for (mut col, band) in table.values_mut().axis_iter_mut(Axis(1)).zip(&bands) {
        col.mapv_inplace(|v| band.stats.apply(v));
    }
    debug!(rows = n_rows, cols = total, "loaded skeleton");
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keyword_selection() {
        assert!(is_skeleton_feature("J5_speed", false));
        assert!(is_skeleton_feature("interhand_dist", false));
        assert!(!is_skeleton_feature("J1_3D_rel_X", false));
        assert!(!is_skeleton_feature("J2_2D_X", false));
        assert!(is_skeleton_feature("J2_2D_X", true));
        assert!(!is_skeleton_feature("sync_time", true));
    }

    #[test]
    fn reference_band_is_open() {
        let c = ReferenceColumn { low: 0.0, high: 1.0, stats: ColumnStats::default() };
        assert!(c.contains(0.5));
        assert!(!c.contains(0.0));
        assert!(!c.contains(1.0));
        assert!(!c.contains(f64::NAN));
    }
}
