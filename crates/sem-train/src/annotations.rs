//! Human annotation tables.
//!
//! - [`HumanSegmentation`]: boundary clicks, one row per click
//!   (`movie, grain, annotator, second`), turned into a boundary-frequency
//!   curve per movie and grain.
//! - [`EventAnnotations`]: annotated action intervals
//!   (`run, evname, startsec, endsec`) used for coverage and purity.

use std::collections::BTreeSet;
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ScoringError;
use crate::metrics::{gaussian_filter1d, point_biserial, Interval};

/// Annotation granularity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Grain {
    /// Coarse boundaries.
    Coarse,
    /// Fine boundaries.
    Fine,
}

impl Grain {
    /// Both grains, coarse first.
    pub const ALL: [Grain; 2] = [Grain::Coarse, Grain::Fine];

    /// Name used in tables and file names.
    pub fn as_str(self) -> &'static str {
        match self {
            Grain::Coarse => "coarse",
            Grain::Fine => "fine",
        }
    }
}

impl fmt::Display for Grain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn read_rows<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<Vec<T>, ScoringError> {
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|source| ScoringError::Csv { path: path.to_path_buf(), source })?;
    rdr.deserialize()
        .collect::<Result<Vec<T>, _>>()
        .map_err(|source| ScoringError::Csv { path: path.to_path_buf(), source })
}

// ---------------------------------------------------------------------------
// HumanSegmentation
// ---------------------------------------------------------------------------

/// One boundary click.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Click {
    /// Movie file name, e.g. `1.1.1_kinect_trim.mp4`.
    pub movie: String,
    /// `coarse` or `fine`.
    pub grain: Grain,
    /// Annotator id.
    pub annotator: String,
    /// Click time, seconds from movie start.
    pub second: f64,
}

/// All boundary clicks of a study.
#[derive(Debug, Clone, Default)]
pub struct HumanSegmentation {
    clicks: Vec<Click>,
}

/// Boundary-frequency curve of one movie and grain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotationCurve {
    /// Smoothed fraction of annotators with a click per bin.
    pub gt_freqs: Vec<f64>,
    /// Per-annotator binary click vectors, same length as `gt_freqs`.
    pub annotators: Vec<Vec<f64>>,
}

impl AnnotationCurve {
    /// Scaled point-biserial of each annotator against the frequency curve
    /// over the first `last` bins.
    pub fn biserial_subjects(&self, last: usize) -> Vec<f64> {
        let last = last.min(self.gt_freqs.len());
        self.annotators
            .iter()
            .map(|a| point_biserial(&a[..last], &self.gt_freqs[..last]))
            .collect()
    }
}

impl HumanSegmentation {
    /// Read a click table.
    pub fn from_csv(path: &Path) -> Result<Self, ScoringError> {
        Ok(Self { clicks: read_rows(path)? })
    }

    /// Build from in-memory clicks.
    pub fn from_clicks(clicks: Vec<Click>) -> Self {
        Self { clicks }
    }

    /// Number of clicks.
    pub fn len(&self) -> usize {
        self.clicks.len()
    }

    /// `true` without clicks.
    pub fn is_empty(&self) -> bool {
        self.clicks.is_empty()
    }

    /// Boundary-frequency curve for `movie` and `grain`.
    ///
    /// Uses the first `n_annotators` annotator ids in sorted order. The curve
    /// has at least `min_bins` bins and is smoothed with `sigma` bins
    /// (`0` disables smoothing).
    pub fn curve(
        &self,
        movie: &str,
        grain: Grain,
        n_annotators: usize,
        second_interval: f64,
        sigma: f64,
        min_bins: usize,
    ) -> Result<AnnotationCurve, ScoringError> {
        let clicks: Vec<&Click> = self.clicks.iter().filter(|c| c.movie == movie && c.grain == grain).collect();
        if clicks.is_empty() {
            return Err(ScoringError::MissingMovie { movie: movie.to_owned(), grain: grain.to_string() });
        }
        if !(second_interval > 0.0) {
            return Err(ScoringError::InvalidInput(format!("second_interval {second_interval}")));
        }

        let ids: Vec<&str> = clicks
            .iter()
            .map(|c| c.annotator.as_str())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .take(n_annotators)
            .collect();
        let bin = |s: f64| (s.max(0.0) / second_interval).floor() as usize;
        let max_bin = clicks.iter().map(|c| bin(c.second)).max().unwrap_or(0);
        let n_bins = (max_bin + 1).max(min_bins);

        let annotators: Vec<Vec<f64>> = ids
            .iter()
            .map(|id| {
                let mut v = vec![0.0; n_bins];
                for c in clicks.iter().filter(|c| c.annotator == *id) {
                    v[bin(c.second)] = 1.0;
                }
                v
            })
            .collect();

        let n = annotators.len() as f64;
        let raw: Vec<f64> = (0..n_bins)
            .map(|b| annotators.iter().map(|a| a[b]).sum::<f64>() / n)
            .collect();
        Ok(AnnotationCurve { gt_freqs: gaussian_filter1d(&raw, sigma), annotators })
    }
}

// ---------------------------------------------------------------------------
// EventAnnotations
// ---------------------------------------------------------------------------

/// One annotated action interval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotatedEvent {
    /// Run prefix, e.g. `1.1.1`.
    pub run: String,
    /// Action name.
    pub evname: String,
    /// Start, seconds.
    pub startsec: f64,
    /// End, seconds.
    pub endsec: f64,
}

/// All annotated action intervals of a study.
#[derive(Debug, Clone, Default)]
pub struct EventAnnotations {
    events: Vec<AnnotatedEvent>,
}

impl EventAnnotations {
    /// Read an event timing table.
    pub fn from_csv(path: &Path) -> Result<Self, ScoringError> {
        Ok(Self { events: read_rows(path)? })
    }

    /// Build from in-memory rows.
    pub fn from_events(events: Vec<AnnotatedEvent>) -> Self {
        Self { events }
    }

    /// Intervals of `run`, matched on the part of the run name before the
    /// first `_`.
    pub fn for_run(&self, run: &str) -> Vec<Interval> {
        let prefix = run.split('_').next().unwrap_or(run);
        self.events
            .iter()
            .filter(|e| e.run == prefix)
            .map(|e| Interval { label: e.evname.clone(), start: e.startsec, end: e.endsec })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn click(annotator: &str, second: f64) -> Click {
        Click { movie: "m.mp4".into(), grain: Grain::Coarse, annotator: annotator.into(), second }
    }

    #[test]
    fn curve_counts_annotators_per_bin() {
        let seg = HumanSegmentation::from_clicks(vec![
            click("a", 1.2),
            click("a", 1.7),
            click("b", 1.5),
            click("b", 4.0),
            click("c", 9.0),
        ]);
        let curve = seg.curve("m.mp4", Grain::Coarse, 2, 1.0, 0.0, 8).unwrap();
        assert_eq!(curve.annotators.len(), 2);
        assert_eq!(curve.gt_freqs.len(), 10);
        assert_eq!(curve.gt_freqs[1], 1.0);
        assert_eq!(curve.gt_freqs[4], 0.5);
        assert_eq!(curve.gt_freqs[9], 0.0);
        assert!(seg.curve("m.mp4", Grain::Fine, 2, 1.0, 0.0, 0).is_err());
    }

    #[test]
    fn events_match_run_prefix() {
        let ann = EventAnnotations::from_events(vec![
            AnnotatedEvent { run: "1.1.1".into(), evname: "pour".into(), startsec: 0.0, endsec: 4.0 },
            AnnotatedEvent { run: "2.1.1".into(), evname: "cut".into(), startsec: 1.0, endsec: 2.0 },
        ]);
        let iv = ann.for_run("1.1.1_kinect");
        assert_eq!(iv.len(), 1);
        assert_eq!(iv[0].label, "pour");
    }
}
