//! Scoring metrics for a segmented run.
//!
//! Two families of scores are computed per run and grain:
//!
//! - **Boundary agreement**: the binned boundary prediction is compared with
//!   the human boundary-frequency curve via a scaled point-biserial
//!   correlation, its percentile among the individual annotators, and a
//!   Pearson correlation of the smoothed prediction.
//! - **Clustering**: inferred events (contiguous runs of one event id) are
//!   compared with annotated action intervals via coverage and purity.

use serde::{Deserialize, Serialize};

use crate::model::BoundaryKind;

/// Gaussian kernel half-width in standard deviations.
const GAUSSIAN_TRUNCATE: f64 = 4.0;

// ---------------------------------------------------------------------------
// Boundary prediction
// ---------------------------------------------------------------------------

/// Bin boundary codes into buckets of `bin_rows` rows; a bucket is `1.0` if
/// any row in it has a boundary.
pub fn binned_prediction(boundaries: &[BoundaryKind], bin_rows: usize) -> Vec<f64> {
    let bin_rows = bin_rows.max(1);
    boundaries
        .chunks(bin_rows)
        .map(|chunk| if chunk.iter().any(|b| b.is_boundary()) { 1.0 } else { 0.0 })
        .collect()
}

/// Zero the first bucket and prepend the buckets that elapsed before the
/// run's first aligned frame.
pub fn pad_prediction(mut pred: Vec<f64>, first_frame: i64, fps: f64, second_interval: f64) -> Vec<f64> {
    if let Some(first) = pred.first_mut() {
        *first = 0.0;
    }
    let lead = (first_frame as f64 / fps / second_interval).round().max(0.0) as usize;
    let mut out = vec![0.0; lead];
    out.extend(pred);
    out
}

// ---------------------------------------------------------------------------
// Correlations
// ---------------------------------------------------------------------------

/// Pearson correlation over the common prefix; `NaN` when either side is
/// constant or shorter than two samples.
pub fn pearson_r(x: &[f64], y: &[f64]) -> f64 {
    let n = x.len().min(y.len());
    if n < 2 {
        return f64::NAN;
    }
    let n_f = n as f64;
    let mean_x = x[..n].iter().sum::<f64>() / n_f;
    let mean_y = y[..n].iter().sum::<f64>() / n_f;

    let mut cov = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for i in 0..n {
        let dx = x[i] - mean_x;
        let dy = y[i] - mean_y;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }

    let denom = (var_x * var_y).sqrt();
    if !(denom > 1e-12) {
        f64::NAN
    } else {
        cov / denom
    }
}

/// Point-biserial correlation between a binary prediction and a continuous
/// curve, divided by the largest correlation attainable with the same number
/// of ones.
pub fn point_biserial(pred: &[f64], curve: &[f64]) -> f64 {
    let n = pred.len().min(curve.len());
    let (pred, curve) = (&pred[..n], &curve[..n]);
    let ones = pred.iter().filter(|&&v| v != 0.0).count();
    if n < 2 || ones == 0 || ones == n {
        return f64::NAN;
    }
    let binary: Vec<f64> = pred.iter().map(|&v| if v != 0.0 { 1.0 } else { 0.0 }).collect();
    let r = pearson_r(&binary, curve);

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| curve[b].total_cmp(&curve[a]));
    let mut ideal = vec![0.0; n];
    for &i in order.iter().take(ones) {
        ideal[i] = 1.0;
    }
    let r_max = pearson_r(&ideal, curve);
    if !(r_max > 0.0) {
        return f64::NAN;
    }
    r / r_max
}

/// Percentile rank of `score` among the finite `values`, averaging the
/// strict and weak ranks. `NaN` when no value is finite.
pub fn percentile_of_score(values: &[f64], score: f64) -> f64 {
    let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if finite.is_empty() || score.is_nan() {
        return f64::NAN;
    }
    let n = finite.len() as f64;
    let left = finite.iter().filter(|&&v| v < score).count();
    let right = finite.iter().filter(|&&v| v <= score).count();
    let plus1 = usize::from(left < right);
    (left + right + plus1) as f64 * (50.0 / n)
}

/// Median of the non-`NaN` values.
pub fn nanmedian(values: &[f64]) -> f64 {
    let mut v: Vec<f64> = values.iter().copied().filter(|x| !x.is_nan()).collect();
    if v.is_empty() {
        return f64::NAN;
    }
    v.sort_by(f64::total_cmp);
    let mid = v.len() / 2;
    if v.len() % 2 == 0 {
        0.5 * (v[mid - 1] + v[mid])
    } else {
        v[mid]
    }
}

/// One-dimensional Gaussian smoothing with reflected edges
/// (`d c b a | a b c d | d c b a`). `sigma <= 0` returns the input.
pub fn gaussian_filter1d(x: &[f64], sigma: f64) -> Vec<f64> {
    if !(sigma > 0.0) || x.is_empty() {
        return x.to_vec();
    }
    let radius = (GAUSSIAN_TRUNCATE * sigma + 0.5) as isize;
    let mut kernel: Vec<f64> = (-radius..=radius)
        .map(|k| (-0.5 * (k as f64 / sigma).powi(2)).exp())
        .collect();
    let total: f64 = kernel.iter().sum();
    kernel.iter_mut().for_each(|w| *w /= total);

    let n = x.len() as isize;
    let reflect = |i: isize| -> usize {
        let m = i.rem_euclid(2 * n);
        (if m >= n { 2 * n - 1 - m } else { m }) as usize
    };
    (0..n)
        .map(|i| {
            kernel
                .iter()
                .zip(-radius..=radius)
                .map(|(w, k)| w * x[reflect(i + k)])
                .sum()
        })
        .collect()
}

/// Boundary-agreement scores for one grain.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CorrelationScore {
    /// Scaled point-biserial correlation.
    pub bicorr: f64,
    /// Percentile of `bicorr` among the annotators.
    pub percentile: f64,
    /// Pearson r of the smoothed prediction.
    pub pearson_r: f64,
}

// ---------------------------------------------------------------------------
// Coverage and purity
// ---------------------------------------------------------------------------

/// A labelled interval in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interval {
    /// Event label.
    pub label: String,
    /// Start, seconds.
    pub start: f64,
    /// End, seconds.
    pub end: f64,
}

impl Interval {
    /// `end - start`.
    pub fn length(&self) -> f64 {
        self.end - self.start
    }

    /// Length of the intersection with `other`, never negative.
    pub fn overlap(&self, other: &Interval) -> f64 {
        (self.end.min(other.end) - self.start.max(other.start)).max(0.0)
    }
}

/// Contiguous runs of one event id, in seconds from `start_second`.
pub fn event_intervals(e_hat: &[usize], start_second: f64, samples_per_second: f64) -> Vec<Interval> {
    let mut out = Vec::new();
    let mut begin = 0;
    for i in 1..=e_hat.len() {
        if i == e_hat.len() || e_hat[i] != e_hat[begin] {
            out.push(Interval {
                label: e_hat[begin].to_string(),
                start: start_second + begin as f64 / samples_per_second,
                end: start_second + i as f64 / samples_per_second,
            });
            begin = i;
        }
    }
    out
}

/// Coverage of one annotated interval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoverageRow {
    /// Annotated event name.
    pub annotated_event: String,
    /// Its length, seconds.
    pub annotated_length: f64,
    /// Largest overlap with an inferred event, seconds.
    pub sem_max_overlap: f64,
    /// `sem_max_overlap / annotated_length`.
    pub max_coverage: f64,
}

/// Purity of one inferred interval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PurityRow {
    /// Inferred event id.
    pub sem_event: String,
    /// Its length, seconds.
    pub sem_length: f64,
    /// Largest overlap with an annotated event, seconds.
    pub annotated_max_overlap: f64,
    /// `annotated_max_overlap / sem_length`.
    pub max_purity: f64,
}

/// Clustering scores of one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusteringScore {
    /// Length-weighted purity.
    pub purity: f64,
    /// Length-weighted coverage.
    pub coverage: f64,
    /// Per inferred interval.
    pub purity_rows: Vec<PurityRow>,
    /// Per annotated interval.
    pub coverage_rows: Vec<CoverageRow>,
}

fn max_overlap(target: &Interval, others: &[Interval]) -> f64 {
    others.iter().map(|o| target.overlap(o)).fold(0.0, f64::max)
}

/// Intervals grouped by label, in order of first appearance.
fn group_by_label(intervals: &[Interval]) -> Vec<(&str, Vec<&Interval>)> {
    let mut groups: Vec<(&str, Vec<&Interval>)> = Vec::new();
    for iv in intervals {
        match groups.iter_mut().find(|(label, _)| *label == iv.label) {
            Some((_, pieces)) => pieces.push(iv),
            None => groups.push((iv.label.as_str(), vec![iv])),
        }
    }
    groups
}

/// Coverage and purity between inferred and annotated intervals.
///
/// Coverage compares each annotated interval with the contiguous inferred
/// intervals. Purity is computed per inferred event id: a recurring event is
/// one row whose length and overlaps are summed over its intervals.
/// Zero-length intervals are skipped. Aggregates are `NaN` when one side has
/// no usable interval.
pub fn clustering_scores(inferred: &[Interval], annotated: &[Interval]) -> ClusteringScore {
    let coverage_rows: Vec<CoverageRow> = annotated
        .iter()
        .filter(|a| a.length() > 0.0)
        .map(|a| {
            let ov = max_overlap(a, inferred);
            CoverageRow {
                annotated_event: a.label.clone(),
                annotated_length: a.length(),
                sem_max_overlap: ov,
                max_coverage: ov / a.length(),
            }
        })
        .collect();
    let purity_rows: Vec<PurityRow> = group_by_label(inferred)
        .into_iter()
        .filter_map(|(label, pieces)| {
            let sem_length: f64 = pieces.iter().map(|p| p.length()).sum();
            if !(sem_length > 0.0) {
                return None;
            }
            let ov = annotated
                .iter()
                .map(|a| pieces.iter().map(|p| p.overlap(a)).sum::<f64>())
                .fold(0.0, f64::max);
            Some(PurityRow {
                sem_event: label.to_owned(),
                sem_length,
                annotated_max_overlap: ov,
                max_purity: ov / sem_length,
            })
        })
        .collect();

    let weighted = |pairs: &mut dyn Iterator<Item = (f64, f64)>| {
        let (ov, len) = pairs.fold((0.0, 0.0), |(a, b), (o, l)| (a + o, b + l));
        if len > 0.0 {
            (ov / len).clamp(0.0, 1.0)
        } else {
            f64::NAN
        }
    };
    let coverage = weighted(&mut coverage_rows.iter().map(|r| (r.sem_max_overlap, r.annotated_length)));
    let purity = weighted(&mut purity_rows.iter().map(|r| (r.annotated_max_overlap, r.sem_length)));

    ClusteringScore { purity, coverage, purity_rows, coverage_rows }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn binning_marks_any_boundary() {
        use BoundaryKind::*;
        let b = [None, None, Old, None, None, None, Restart];
        assert_eq!(binned_prediction(&b, 3), vec![1.0, 0.0, 1.0]);
    }

    #[test]
    fn gaussian_preserves_constants_and_mass() {
        let flat = gaussian_filter1d(&[2.0; 7], 2.0);
        for v in flat {
            assert_relative_eq!(v, 2.0, epsilon = 1e-12);
        }
        let mut impulse = vec![0.0; 41];
        impulse[20] = 1.0;
        let smooth = gaussian_filter1d(&impulse, 2.0);
        assert_relative_eq!(smooth.iter().sum::<f64>(), 1.0, epsilon = 1e-9);
        assert!(smooth[20] > smooth[21] && smooth[21] > smooth[22]);
        assert_relative_eq!(smooth[19], smooth[21], epsilon = 1e-12);
    }

    #[test]
    fn perfect_prediction_scales_to_one() {
        let curve = [0.0, 0.1, 0.9, 0.2, 0.0, 0.8, 0.1];
        let pred = [0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 0.0];
        assert_relative_eq!(point_biserial(&pred, &curve), 1.0, epsilon = 1e-12);
        assert!(point_biserial(&[0.0; 7], &curve).is_nan());
    }

    #[test]
    fn percentile_rank_kind() {
        let v = [1.0, 2.0, 3.0, 4.0];
        assert_relative_eq!(percentile_of_score(&v, 3.0), 75.0);
        assert_relative_eq!(percentile_of_score(&v, 0.0), 0.0);
        assert_relative_eq!(percentile_of_score(&[f64::NAN, 1.0], 1.0), 100.0);
    }

    #[test]
    fn intervals_follow_runs() {
        let iv = event_intervals(&[0, 0, 1, 1, 1, 0], 2.0, 2.0);
        assert_eq!(iv.len(), 3);
        assert_relative_eq!(iv[1].start, 3.0);
        assert_relative_eq!(iv[1].end, 4.5);
        assert_eq!(iv[2].label, "0");
    }

    #[test]
    fn recurring_event_is_one_purity_row() {
        let inferred = event_intervals(&[0, 0, 1, 1, 0, 0], 0.0, 2.0);
        let annotated = vec![
            Interval { label: "a".into(), start: 0.0, end: 1.0 },
            Interval { label: "b".into(), start: 1.0, end: 3.0 },
        ];
        let s = clustering_scores(&inferred, &annotated);
        assert_eq!(s.purity_rows.len(), 2);
        assert_eq!(s.purity_rows[0].sem_event, "0");
        assert_relative_eq!(s.purity_rows[0].sem_length, 2.0);
        assert_relative_eq!(s.purity_rows[0].max_purity, 0.5);
        assert_relative_eq!(s.purity_rows[1].max_purity, 1.0);
        assert_relative_eq!(s.purity, 2.0 / 3.0, epsilon = 1e-12);
        // coverage still uses the contiguous pieces
        assert_eq!(s.coverage_rows.len(), 2);
        assert_relative_eq!(s.coverage, 2.0 / 3.0, epsilon = 1e-12);
    }
}
