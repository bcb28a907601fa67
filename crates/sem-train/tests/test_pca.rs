//! Integration tests for the block-PCA reducer.

use ndarray::Array2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use sem_features::align::CombinedFeatureMatrix;
use sem_features::table::FeatureTable;
use sem_train::error::PcaError;
use sem_train::pca::{pca_path, ComponentSelection, Reducer, PCA_BLOCKS};

fn max_diff(a: &Array2<f64>, b: &Array2<f64>) -> f64 {
    assert_eq!(a.dim(), b.dim());
    a.iter().zip(b.iter()).map(|(x, y)| (x - y).abs()).fold(0.0, f64::max)
}

/// Aligned matrix with blocks appear(2), optical(3), skel(4), objhand(2), scene(2).
fn matrix(rows: usize, seed: u64, skel_width: usize) -> CombinedFeatureMatrix {
    let mut rng = StdRng::seed_from_u64(seed);
    let frames: Vec<i64> = (0..rows as i64).collect();
    let tables: Vec<FeatureTable> = [("appear", 2), ("optical", 3), ("skel", skel_width), ("objhand", 2), ("scene", 2)]
        .iter()
        .map(|&(name, width)| {
            let values = Array2::from_shape_fn((rows, width), |_| rng.gen_range(-1.0..1.0));
            let columns = (0..width).map(|i| format!("{name}_{i}")).collect();
            FeatureTable::new(name, 30.0, frames.clone(), columns, values).unwrap()
        })
        .collect();
    CombinedFeatureMatrix::from_aligned_tables(&tables, 30.0).unwrap()
}

#[test]
fn per_block_round_trip_with_full_rank() {
    let m = matrix(40, 1, 4);
    let reducer = Reducer::fit(std::slice::from_ref(&m), ComponentSelection::Count(100), false, true).unwrap();
    assert_eq!(reducer.n_components(), 13);

    let reduced = reducer.transform(&m).unwrap();
    assert_eq!(reduced.boundaries, vec![2, 5, 9, 13]);
    let back = reducer.inverse_transform(reduced.values.view()).unwrap();
    assert!(max_diff(&back, m.values()) < 1e-9);
}

#[test]
fn global_round_trip_with_whitening() {
    let m = matrix(40, 2, 4);
    let reducer = Reducer::fit(std::slice::from_ref(&m), ComponentSelection::Count(13), true, false).unwrap();
    let reduced = reducer.transform(&m).unwrap();
    assert_eq!(reduced.boundaries, vec![13]);
    let back = reducer.inverse_transform(reduced.values.view()).unwrap();
    assert!(max_diff(&back, m.values()) < 1e-9);
}

#[test]
fn variance_selection_reduces_width() {
    let m = matrix(60, 3, 4);
    let reducer =
        Reducer::fit(std::slice::from_ref(&m), ComponentSelection::ExplainedVariance(0.5), false, true).unwrap();
    let reduced = reducer.transform(&m).unwrap();
    assert!(reduced.values.ncols() < m.n_cols());
    assert_eq!(reduced.values.nrows(), m.n_rows());
}

#[test]
fn width_mismatch_aborts() {
    let fitted = matrix(40, 4, 4);
    let reducer = Reducer::fit(std::slice::from_ref(&fitted), ComponentSelection::Count(100), false, true).unwrap();
    let wider = matrix(40, 5, 6);
    assert!(matches!(reducer.transform(&wider), Err(PcaError::WidthMismatch { .. })));

    let global = Reducer::fit(std::slice::from_ref(&fitted), ComponentSelection::Count(5), false, false).unwrap();
    assert!(matches!(global.transform(&wider), Err(PcaError::WidthMismatch { .. })));
}

#[test]
fn persisted_state_reloads() {
    let dir = tempfile::tempdir().unwrap();
    let m = matrix(40, 6, 4);
    let reducer = Reducer::fit(std::slice::from_ref(&m), ComponentSelection::Count(100), false, true).unwrap();
    reducer.save(dir.path(), "dec_6").unwrap();
    for block in PCA_BLOCKS {
        assert!(pca_path(dir.path(), "dec_6", Some(block)).exists());
    }

    let loaded = Reducer::load(dir.path(), "dec_6", true).unwrap();
    let a = reducer.transform(&m).unwrap().values;
    let b = loaded.transform(&m).unwrap().values;
    assert!(max_diff(&a, &b) < 1e-12);

    assert!(matches!(Reducer::load(dir.path(), "dec_6", false), Err(PcaError::FileAccess { .. })));
}
