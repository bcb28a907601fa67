//! Integration tests for [`sem_features::align`].
//!
//! Tables are built in memory from fixed ramps; no files or randomness.

use approx::assert_relative_eq;
use ndarray::Array2;
use sem_features::align::{combine_tables, interpolate_frames, AlignOptions, CombinedFeatureMatrix};
use sem_features::table::FeatureTable;

fn ramp(name: &str, fps: f64, first: i64, last: i64, step: i64) -> FeatureTable {
    let frames: Vec<i64> = (first..=last).step_by(step as usize).collect();
    let n = frames.len();
    let values = Array2::from_shape_fn((n, 2), |(r, c)| frames[r] as f64 * (c + 1) as f64);
    FeatureTable::new(
        name,
        fps,
        frames,
        vec![format!("{name}_a"), format!("{name}_b")],
        values,
    )
    .unwrap()
}

// ---------------------------------------------------------------------------
// Densify
// ---------------------------------------------------------------------------

#[test]
fn densify_stays_inside_observed_frames() {
    let t = ramp("optical", 30.0, 10, 40, 5);
    let d = interpolate_frames(&t);
    assert_eq!(d.first_frame(), Some(10));
    assert_eq!(d.last_frame(), Some(40));
    assert_eq!(d.n_rows(), 31);
    assert_eq!(d.missing_count(), 0);
    // linear ramp is reproduced exactly between samples
    assert_relative_eq!(d.values()[[3, 0]], 13.0, epsilon = 1e-12);
}

// ---------------------------------------------------------------------------
// Combine
// ---------------------------------------------------------------------------

#[test]
fn mixed_fps_span_the_intersection() {
    let a = ramp("a", 30.0, 0, 100, 1);
    let b = ramp("b", 25.0, 0, 120, 1);
    let out = combine_tables(&[a, b], &AlignOptions::new(40.0, 30.0)).unwrap();
    let m = &out.matrix;

    let duration = 100.0 / 30.0;
    let expected = duration / 0.040;
    assert!(
        (m.n_rows() as f64 - expected).abs() <= 1.0 + 1e-9,
        "{} rows for {expected:.2} buckets",
        m.n_rows()
    );
    assert!(m.times()[0] >= 0.0);
    assert!(*m.times().last().unwrap() <= duration + 1e-9);
    assert_eq!(m.values().iter().filter(|v| !v.is_finite()).count(), 0);
    assert_eq!(out.first_frame, Some(0));
    assert_eq!(m.blocks().len(), 2);
    assert_eq!(m.blocks()[1].start, 2);
    assert_eq!(out.tables.len(), 2);
}

#[test]
fn output_has_no_missing_values_with_gaps() {
    let mut a = ramp("a", 25.0, 0, 50, 1);
    a.values_mut()[[10, 0]] = f64::NAN;
    a.values_mut()[[11, 1]] = f64::NAN;
    let b = ramp("b", 25.0, 5, 45, 4);
    let out = combine_tables(&[a, b], &AlignOptions::new(40.0, 25.0)).unwrap();
    assert!(out.matrix.n_rows() > 0);
    assert_eq!(out.matrix.values().iter().filter(|v| v.is_nan()).count(), 0);
    assert_eq!(out.first_frame, Some(5));
}

#[test]
fn disjoint_ranges_give_empty_matrix() {
    let a = ramp("a", 30.0, 0, 30, 1);
    let b = ramp("b", 30.0, 60, 90, 1);
    let out = combine_tables(&[a, b], &AlignOptions::new(40.0, 30.0)).unwrap();
    assert!(out.matrix.is_empty());
    assert_eq!(out.matrix.n_cols(), 4);
    assert_eq!(out.first_frame, None);
}

#[test]
fn rejects_bad_options() {
    let a = ramp("a", 30.0, 0, 30, 1);
    assert!(combine_tables(&[], &AlignOptions::new(40.0, 30.0)).is_err());
    assert!(combine_tables(&[a.clone()], &AlignOptions::new(0.0, 30.0)).is_err());
    assert!(combine_tables(&[a], &AlignOptions::new(40.0, -1.0)).is_err());
}

// ---------------------------------------------------------------------------
// Cached tables
// ---------------------------------------------------------------------------

#[test]
fn post_tables_reassemble_into_same_matrix() {
    let a = ramp("a", 25.0, 0, 50, 1);
    let b = ramp("b", 25.0, 0, 50, 2);
    let out = combine_tables(&[a, b], &AlignOptions::new(40.0, 25.0)).unwrap();
    let again = CombinedFeatureMatrix::from_aligned_tables(&out.tables, 25.0).unwrap();
    assert_eq!(again.n_rows(), out.matrix.n_rows());
    assert_eq!(again.columns(), out.matrix.columns());
    for (x, y) in again.values().iter().zip(out.matrix.values().iter()) {
        assert_relative_eq!(*x, *y);
    }
}

#[test]
fn misaligned_cached_tables_are_rejected() {
    let a = ramp("a", 25.0, 0, 10, 1);
    let b = ramp("b", 25.0, 1, 11, 1);
    assert!(CombinedFeatureMatrix::from_aligned_tables(&[a, b], 25.0).is_err());
}
