//! Integration tests for the scoring metrics.

use approx::assert_relative_eq;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use sem_train::metrics::{
    binned_prediction, clustering_scores, event_intervals, gaussian_filter1d, nanmedian, pad_prediction,
    pearson_r, percentile_of_score, point_biserial, Interval,
};
use sem_train::model::BoundaryKind;

fn interval(label: &str, start: f64, end: f64) -> Interval {
    Interval { label: label.into(), start, end }
}

// ---------------------------------------------------------------------------
// Boundary prediction
// ---------------------------------------------------------------------------

#[test]
fn padding_prepends_elapsed_seconds() {
    let pred = vec![1.0, 0.0, 1.0];
    let padded = pad_prediction(pred, 90, 30.0, 1.0);
    assert_eq!(padded, vec![0.0, 0.0, 0.0, 0.0, 0.0, 1.0]);
    assert_eq!(padded[0], 0.0);

    let unpadded = pad_prediction(vec![1.0, 1.0], 0, 25.0, 1.0);
    assert_eq!(unpadded, vec![0.0, 1.0]);
}

#[test]
fn binning_at_one_second() {
    let mut codes = vec![BoundaryKind::None; 60];
    codes[30] = BoundaryKind::New;
    codes[55] = BoundaryKind::Old;
    assert_eq!(binned_prediction(&codes, 25), vec![0.0, 1.0, 1.0]);
}

// ---------------------------------------------------------------------------
// Correlations
// ---------------------------------------------------------------------------

#[test]
fn median_of_distribution_sits_at_fiftieth_percentile() {
    let mut rng = StdRng::seed_from_u64(42);
    let samples: Vec<f64> = (0..1001).map(|_| rng.gen_range(-1.0..1.0)).collect();
    let median = nanmedian(&samples);
    let p = percentile_of_score(&samples, median);
    assert!((p - 50.0).abs() < 1.0, "percentile of median = {p}");
}

#[test]
fn non_finite_subjects_are_ignored() {
    let subjects = [f64::NAN, 0.1, 0.2, f64::NAN, 0.3];
    assert_relative_eq!(percentile_of_score(&subjects, 0.25), 200.0 / 3.0, epsilon = 1e-9);
    assert_relative_eq!(nanmedian(&subjects), 0.2);
    assert!(percentile_of_score(&[f64::NAN], 0.5).is_nan());
}

#[test]
fn biserial_tracks_agreement() {
    let curve = gaussian_filter1d(&[0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0], 1.0);
    let good = [0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0];
    let bad = [1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0];
    let r_good = point_biserial(&good, &curve);
    let r_bad = point_biserial(&bad, &curve);
    assert_relative_eq!(r_good, 1.0, epsilon = 1e-9);
    assert!(r_bad < r_good);
}

#[test]
fn pearson_is_nan_for_constant_input() {
    assert!(pearson_r(&[1.0, 1.0, 1.0], &[0.0, 1.0, 2.0]).is_nan());
    assert_relative_eq!(pearson_r(&[1.0, 2.0, 3.0], &[2.0, 4.0, 6.0]), 1.0, epsilon = 1e-12);
}

#[test]
fn gaussian_reflects_at_edges() {
    let x = [1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0];
    let y = gaussian_filter1d(&x, 1.0);
    // the reflected copy of x[0] lands on x[0] itself
    assert!(y[0] > y[1]);
    assert_relative_eq!(y.iter().sum::<f64>(), 1.0, epsilon = 1e-9);
}

// ---------------------------------------------------------------------------
// Coverage and purity
// ---------------------------------------------------------------------------

#[test]
fn scores_stay_in_unit_interval() {
    let e_hat = [0, 0, 0, 0, 1, 1, 1, 1, 1, 1, 2, 2];
    let inferred = event_intervals(&e_hat, 3.0, 2.0);
    let annotated = vec![interval("pour", 2.0, 5.0), interval("stir", 5.0, 9.0), interval("empty", 9.0, 9.0)];
    let s = clustering_scores(&inferred, &annotated);

    assert_eq!(s.coverage_rows.len(), 2);
    assert_eq!(s.purity_rows.len(), 3);
    for r in &s.coverage_rows {
        assert!((0.0..=1.0).contains(&r.max_coverage));
    }
    for r in &s.purity_rows {
        assert!((0.0..=1.0).contains(&r.max_purity));
    }
    assert!((0.0..=1.0).contains(&s.coverage));
    assert!((0.0..=1.0).contains(&s.purity));

    // inferred: [3,5) [5,8) [8,9); every inferred event lies inside one annotation
    assert_relative_eq!(s.purity, 1.0);
    // pour covered 2 of 3 seconds, stir 3 of 4
    assert_relative_eq!(s.coverage, 5.0 / 7.0, epsilon = 1e-12);
}

#[test]
fn undefined_without_annotations() {
    let inferred = event_intervals(&[0, 0, 1], 0.0, 1.0);
    let s = clustering_scores(&inferred, &[]);
    assert!(s.coverage.is_nan());
    assert_relative_eq!(s.purity, 0.0);
}
