//! Training-run selection.
//!
//! [`RunSampler`] decides which run is trained on in each epoch:
//!
//! - [`RoundRobinSampler`] walks the static training list.
//! - [`QualityWeightedSampler`] draws runs in proportion to their mean
//!   boundary-agreement percentile in a [`QualityHistory`], restricted to runs
//!   whose boundary counts look sane.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::ScoringError;
use crate::lists::RunList;

// ---------------------------------------------------------------------------
// QualityHistory
// ---------------------------------------------------------------------------

/// One scored run.
#[derive(Debug, Clone, PartialEq)]
pub struct QualityRecord {
    /// Run name.
    pub run: String,
    /// Boundary-agreement percentile.
    pub percentile: f64,
    /// Boundaries emitted in the run.
    pub number_boundaries: f64,
}

#[derive(Debug, Deserialize)]
struct CorpusRow {
    run: String,
    tag: String,
    is_train: String,
    percentile: Option<f64>,
    number_boundaries: Option<f64>,
}

fn truthy(s: &str) -> bool {
    matches!(s.trim().to_ascii_lowercase().as_str(), "true" | "1")
}

/// Scores of past training runs.
#[derive(Debug, Clone, Default)]
pub struct QualityHistory {
    records: Vec<QualityRecord>,
}

impl QualityHistory {
    /// Seed from a prior results table: training rows with `tag`, excluding
    /// runs in `exclude`.
    pub fn from_results_csv(path: &Path, tag: &str, exclude: &[String]) -> Result<Self, ScoringError> {
        let exclude: HashSet<&str> = exclude.iter().map(String::as_str).collect();
        let mut rdr = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_path(path)
            .map_err(|source| ScoringError::Csv { path: path.to_path_buf(), source })?;
        let mut records = Vec::new();
        for row in rdr.deserialize::<CorpusRow>() {
            let row = row.map_err(|source| ScoringError::Csv { path: path.to_path_buf(), source })?;
            if row.tag != tag || !truthy(&row.is_train) || exclude.contains(row.run.as_str()) {
                continue;
            }
            if let (Some(percentile), Some(number_boundaries)) = (row.percentile, row.number_boundaries) {
                records.push(QualityRecord { run: row.run, percentile, number_boundaries });
            }
        }
        debug!(path = %path.display(), records = records.len(), "loaded quality history");
        Ok(Self { records })
    }

    /// Fold in a new outcome.
    pub fn push(&mut self, record: QualityRecord) {
        self.records.push(record);
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// `true` without records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Mean finite percentile per run over records whose boundary count lies
    /// in `[min_boundary, max_boundary]`, sorted by run.
    pub fn run_weights(&self, min_boundary: usize, max_boundary: usize) -> Vec<(String, f64)> {
        let mut acc: BTreeMap<&str, (f64, usize)> = BTreeMap::new();
        for r in &self.records {
            let in_range = r.number_boundaries >= min_boundary as f64 && r.number_boundaries <= max_boundary as f64;
            if !in_range || !r.percentile.is_finite() {
                continue;
            }
            let e = acc.entry(r.run.as_str()).or_insert((0.0, 0));
            e.0 += r.percentile;
            e.1 += 1;
        }
        acc.into_iter()
            .map(|(run, (sum, n))| (run.to_owned(), sum / n as f64))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// RunSampler
// ---------------------------------------------------------------------------

/// Chooses the training run of an epoch.
pub trait RunSampler: Send {
    /// Sampler name for logs.
    fn name(&self) -> &str;

    /// Run to train on in `epoch` (1-based), or `None` when nothing is
    /// eligible.
    fn select(&mut self, epoch: usize, history: &QualityHistory) -> Option<String>;
}

/// Picks entry `(epoch - 1) % len` of the training list. For a stratified
/// list the bucket is `(epoch - 1) % n_buckets` and the run inside it
/// `((epoch - 1) / n_buckets) % bucket_len`, so every run is visited.
#[derive(Debug, Clone)]
pub struct RoundRobinSampler {
    list: RunList,
}

impl RoundRobinSampler {
    /// Walk `list`.
    pub fn new(list: RunList) -> Self {
        Self { list }
    }
}

fn pick(runs: &[String], step: usize) -> Option<String> {
    if runs.is_empty() {
        return None;
    }
    runs.get(step % runs.len()).cloned()
}

impl RunSampler for RoundRobinSampler {
    fn name(&self) -> &str {
        "round_robin"
    }

    fn select(&mut self, epoch: usize, _history: &QualityHistory) -> Option<String> {
        match &self.list {
            RunList::Flat(runs) => pick(runs, epoch.saturating_sub(1)),
            RunList::Stratified(buckets) => {
                if buckets.is_empty() {
                    return None;
                }
                let step = epoch.saturating_sub(1);
                // advance inside a bucket once per full pass over the buckets
                pick(&buckets[step % buckets.len()], step / buckets.len())
            }
        }
    }
}

/// Draws runs with probability proportional to their mean percentile.
#[derive(Debug, Clone)]
pub struct QualityWeightedSampler {
    rng: StdRng,
    min_boundary: usize,
    max_boundary: usize,
}

impl QualityWeightedSampler {
    /// Seeded sampler over runs with boundary counts in
    /// `[min_boundary, max_boundary]`.
    pub fn new(seed: u64, min_boundary: usize, max_boundary: usize) -> Self {
        Self { rng: StdRng::seed_from_u64(seed), min_boundary, max_boundary }
    }
}

impl RunSampler for QualityWeightedSampler {
    fn name(&self) -> &str {
        "quality_weighted"
    }

    fn select(&mut self, _epoch: usize, history: &QualityHistory) -> Option<String> {
        let weights = history.run_weights(self.min_boundary, self.max_boundary);
        let dist = match WeightedIndex::new(weights.iter().map(|(_, w)| *w)) {
            Ok(d) => d,
            Err(e) => {
                warn!(candidates = weights.len(), error = %e, "no run eligible for sampling");
                return None;
            }
        };
        let i = dist.sample(&mut self.rng);
        weights.into_iter().nth(i).map(|(run, _)| run)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(run: &str, percentile: f64, number_boundaries: f64) -> QualityRecord {
        QualityRecord { run: run.into(), percentile, number_boundaries }
    }

    #[test]
    fn round_robin_wraps() {
        let mut s = RoundRobinSampler::new(RunList::Flat(vec!["a".into(), "b".into(), "c".into()]));
        let h = QualityHistory::default();
        let picks: Vec<_> = (1..=4).filter_map(|e| s.select(e, &h)).collect();
        assert_eq!(picks, vec!["a", "b", "c", "a"]);
    }

    #[test]
    fn stratified_rotates_buckets() {
        let mut s = RoundRobinSampler::new(RunList::Stratified(vec![
            vec!["a0".into(), "a1".into()],
            vec!["b0".into(), "b1".into()],
        ]));
        let h = QualityHistory::default();
        let picks: Vec<_> = (1..=8).filter_map(|e| s.select(e, &h)).collect();
        assert_eq!(picks, vec!["a0", "b0", "a1", "b1", "a0", "b0", "a1", "b1"]);
    }

    #[test]
    fn stratified_visits_every_run() {
        let buckets: Vec<Vec<String>> =
            (0..8).map(|b| (0..8).map(|i| format!("{b}.{i}")).collect()).collect();
        let mut s = RoundRobinSampler::new(RunList::Stratified(buckets.clone()));
        let h = QualityHistory::default();
        let picked: HashSet<String> = (1..=64).filter_map(|e| s.select(e, &h)).collect();
        assert_eq!(picked.len(), 64);
        for run in buckets.iter().flatten() {
            assert!(picked.contains(run), "{run} never selected");
        }

        let mut uneven = RoundRobinSampler::new(RunList::Stratified(vec![
            vec!["a0".into(), "a1".into(), "a2".into()],
            vec!["b0".into()],
        ]));
        let picks: HashSet<String> = (1..=6).filter_map(|e| uneven.select(e, &h)).collect();
        assert_eq!(picks.len(), 4);
    }

    #[test]
    fn weights_respect_boundary_range() {
        let mut h = QualityHistory::default();
        h.push(rec("a", 80.0, 10.0));
        h.push(rec("a", 60.0, 10.0));
        h.push(rec("b", 90.0, 2.0));
        h.push(rec("c", f64::NAN, 10.0));
        assert_eq!(h.run_weights(5, 50), vec![("a".to_string(), 70.0)]);
    }

    #[test]
    fn weighted_sampler_only_draws_eligible_runs() {
        let mut h = QualityHistory::default();
        h.push(rec("a", 50.0, 10.0));
        h.push(rec("b", 50.0, 100.0));
        let mut s = QualityWeightedSampler::new(7, 5, 50);
        for epoch in 1..20 {
            assert_eq!(s.select(epoch, &h).as_deref(), Some("a"));
        }
        assert_eq!(QualityWeightedSampler::new(7, 5, 50).select(1, &QualityHistory::default()), None);
    }

    #[test]
    fn corpus_filters_tag_and_validation_runs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("corpus.csv");
        std::fs::write(
            &path,
            "run,grain,percentile,number_boundaries,tag,is_train\n\
             a,coarse,70,10,old,True\n\
             b,coarse,60,10,old,True\n\
             a,coarse,40,10,other,True\n\
             a,coarse,30,10,old,False\n\
             c,coarse,,10,old,True\n",
        )
        .unwrap();
        let h = QualityHistory::from_results_csv(&path, "old", &["b".to_string()]).unwrap();
        assert_eq!(h.len(), 1);
        assert_eq!(h.run_weights(0, 100), vec![("a".to_string(), 70.0)]);
    }
}
