//! Event-segmentation model interface and a reference backend.
//!
//! The scheduler talks to any segmentation backend through [`EventModel`]. A
//! run feeds the whole reduced feature matrix once and gets back a
//! [`SegmentationResult`]: one event label, boundary code and prediction
//! error per row.
//!
//! [`PrototypeEventModel`] is a small sticky nearest-prototype backend: each
//! event is summarised by its running mean, and each row is assigned to the
//! best-scoring option among continuing, switching, restarting or opening a
//! new event.

use std::f64::consts::PI;

use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};

use crate::config::SemConfig;
use crate::error::ModelError;

/// Concentration prior used during evaluation; effectively forbids new events.
pub const EVAL_ALFA: f64 = 1e-30;

/// Ratio between the new-event and the per-event variance.
const BROAD_VARIANCE_FACTOR: f64 = 10.0;

// ---------------------------------------------------------------------------
// Boundary codes
// ---------------------------------------------------------------------------

/// What happened at a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum BoundaryKind {
    /// Same event as the previous row.
    None,
    /// Switched to an existing event.
    Old,
    /// Opened a new event.
    New,
    /// Restarted the previous event.
    Restart,
}

impl BoundaryKind {
    /// Integer code: 0 none, 1 old, 2 new, 3 restart.
    pub fn code(self) -> u8 {
        match self {
            BoundaryKind::None => 0,
            BoundaryKind::Old => 1,
            BoundaryKind::New => 2,
            BoundaryKind::Restart => 3,
        }
    }

    /// `true` for every kind but [`BoundaryKind::None`].
    pub fn is_boundary(self) -> bool {
        self != BoundaryKind::None
    }
}

impl From<BoundaryKind> for u8 {
    fn from(k: BoundaryKind) -> u8 {
        k.code()
    }
}

impl TryFrom<u8> for BoundaryKind {
    type Error = String;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(BoundaryKind::None),
            1 => Ok(BoundaryKind::Old),
            2 => Ok(BoundaryKind::New),
            3 => Ok(BoundaryKind::Restart),
            other => Err(format!("unknown boundary code {other}")),
        }
    }
}

// ---------------------------------------------------------------------------
// SegmentationResult
// ---------------------------------------------------------------------------

/// Output of one [`EventModel::run`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentationResult {
    /// Event id per row.
    pub e_hat: Vec<usize>,
    /// Boundary code per row.
    pub boundaries: Vec<BoundaryKind>,
    /// Prediction error per row.
    pub pe: Vec<f64>,
    /// Predicted vector per row, `[n_rows, n_features]`.
    pub x_hat: Array2<f64>,
    /// Rows assigned to each event id in this run.
    pub c: Vec<f64>,
}

impl SegmentationResult {
    /// Number of rows.
    pub fn len(&self) -> usize {
        self.e_hat.len()
    }

    /// `true` for an empty run.
    pub fn is_empty(&self) -> bool {
        self.e_hat.is_empty()
    }

    /// Rows with the given boundary kind.
    pub fn count(&self, kind: BoundaryKind) -> usize {
        self.boundaries.iter().filter(|&&b| b == kind).count()
    }

    /// Rows with any boundary.
    pub fn n_boundaries(&self) -> usize {
        self.boundaries.iter().filter(|b| b.is_boundary()).count()
    }

    /// Mean prediction error.
    pub fn mean_pe(&self) -> f64 {
        if self.pe.is_empty() {
            return f64::NAN;
        }
        self.pe.iter().sum::<f64>() / self.pe.len() as f64
    }

    /// Population standard deviation of the prediction error.
    pub fn std_pe(&self) -> f64 {
        let mean = self.mean_pe();
        if mean.is_nan() {
            return f64::NAN;
        }
        (self.pe.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / self.pe.len() as f64).sqrt()
    }

    /// Entropy of the event usage, normalised by the log of the number of
    /// used events. `NaN` when fewer than two events are used.
    pub fn normalized_entropy(&self) -> f64 {
        let used: Vec<f64> = self.c.iter().copied().filter(|&v| v > 0.0).collect();
        if used.len() < 2 {
            return f64::NAN;
        }
        let total: f64 = used.iter().sum();
        let h: f64 = used.iter().map(|v| v / total).map(|p| -p * p.ln()).sum();
        h / (used.len() as f64).ln()
    }
}

// ---------------------------------------------------------------------------
// EventModel
// ---------------------------------------------------------------------------

/// Priors set before each run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SegmentationPriors {
    /// Concentration: weight of opening a new event.
    pub alfa: f64,
    /// Weight of restarting the previous event.
    pub kappa: f64,
}

impl SegmentationPriors {
    /// Priors used while training.
    pub fn training(cfg: &SemConfig) -> Self {
        Self { alfa: cfg.alfa, kappa: cfg.kappa }
    }

    /// Priors used while evaluating: no restarts, practically no new events.
    pub fn evaluation() -> Self {
        Self { alfa: EVAL_ALFA, kappa: 0.0 }
    }
}

/// An online event-segmentation backend.
pub trait EventModel: Send {
    /// Backend name for logs.
    fn name(&self) -> &str;

    /// Replace the run priors.
    fn set_priors(&mut self, priors: SegmentationPriors);

    /// Segment `x` row by row. Learned state is updated only when `train`.
    fn run(&mut self, x: ArrayView2<'_, f64>, train: bool) -> Result<SegmentationResult, ModelError>;

    /// Forget the previous event and input vector so the next run starts fresh.
    fn reset_carry_over(&mut self);

    /// Number of event models instantiated so far.
    fn n_event_models(&self) -> usize;

    /// Cumulative rows assigned to each event model across all runs.
    fn event_counts(&self) -> Vec<f64>;
}

// ---------------------------------------------------------------------------
// PrototypeEventModel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct Prototype {
    mean: Array1<f64>,
    origin: Array1<f64>,
    count: f64,
}

/// Sticky nearest-prototype event model.
///
/// Each option is scored as log prior plus isotropic Gaussian log likelihood:
///
/// | option            | prior                     | likelihood centre | variance          |
/// |-------------------|---------------------------|-------------------|-------------------|
/// | continue previous | `ln(count + lmda)`        | running mean      | `var_scale`       |
/// | switch to `k`     | `ln(count_k)`             | running mean      | `var_scale`       |
/// | restart previous  | `ln(kappa)`               | first row         | `var_scale`       |
/// | new event         | `ln(alfa)`                | origin            | `10 · var_scale`  |
///
/// In evaluation mode learned events are frozen: a row may still open a new
/// event, but it is dropped when the run ends.
#[derive(Debug, Clone)]
pub struct PrototypeEventModel {
    lmda: f64,
    var_scale: f64,
    priors: SegmentationPriors,
    events: Vec<Prototype>,
    k_prev: Option<usize>,
    x_prev: Option<Array1<f64>>,
}

impl PrototypeEventModel {
    /// Build from the model section of the config.
    pub fn new(cfg: &SemConfig) -> Self {
        Self {
            lmda: cfg.lmda,
            var_scale: cfg.var_scale,
            priors: SegmentationPriors::training(cfg),
            events: Vec::new(),
            k_prev: None,
            x_prev: None,
        }
    }

    fn log_lik(x: ArrayView1<'_, f64>, centre: ArrayView1<'_, f64>, var: f64) -> f64 {
        let d = x.len() as f64;
        let sq: f64 = x.iter().zip(centre.iter()).map(|(a, b)| (a - b).powi(2)).sum();
        -0.5 * sq / var - 0.5 * d * (2.0 * PI * var).ln()
    }

    fn ln_prior(w: f64) -> f64 {
        if w > 0.0 {
            w.ln()
        } else {
            f64::NEG_INFINITY
        }
    }

    /// Pick the best option for one row.
    fn choose(&self, x: ArrayView1<'_, f64>) -> (usize, BoundaryKind) {
        let n_events = self.events.len();
        if n_events == 0 {
            return (0, BoundaryKind::New);
        }
        let zero = Array1::<f64>::zeros(x.len());
        let mut best = (f64::NEG_INFINITY, n_events, BoundaryKind::New);
        let mut consider = |score: f64, k: usize, kind: BoundaryKind| {
            if score > best.0 {
                best = (score, k, kind);
            }
        };

        for (k, ev) in self.events.iter().enumerate() {
            let is_prev = self.k_prev == Some(k);
            let prior = if is_prev { ev.count + self.lmda } else { ev.count };
            let kind = if is_prev || self.k_prev.is_none() { BoundaryKind::None } else { BoundaryKind::Old };
            consider(Self::ln_prior(prior) + Self::log_lik(x, ev.mean.view(), self.var_scale), k, kind);
        }
        if let Some(p) = self.k_prev {
            let origin = self.events[p].origin.view();
            consider(
                Self::ln_prior(self.priors.kappa) + Self::log_lik(x, origin, self.var_scale),
                p,
                BoundaryKind::Restart,
            );
        }
        consider(
            Self::ln_prior(self.priors.alfa)
                + Self::log_lik(x, zero.view(), self.var_scale * BROAD_VARIANCE_FACTOR),
            n_events,
            BoundaryKind::New,
        );
        (best.1, best.2)
    }
}

impl EventModel for PrototypeEventModel {
    fn name(&self) -> &str {
        "prototype"
    }

    fn set_priors(&mut self, priors: SegmentationPriors) {
        self.priors = priors;
    }

    fn run(&mut self, x: ArrayView2<'_, f64>, train: bool) -> Result<SegmentationResult, ModelError> {
        let (n, d) = x.dim();
        if n == 0 || d == 0 {
            return Err(ModelError::InvalidInput(format!("cannot segment a {n}x{d} matrix")));
        }
        if let Some(ev) = self.events.first() {
            if ev.mean.len() != d {
                return Err(ModelError::DimensionMismatch { expected: ev.mean.len(), actual: d });
            }
        }
        if !(self.priors.alfa > 0.0) {
            return Err(ModelError::InvalidPrior { name: "alfa", value: self.priors.alfa });
        }

        let mut e_hat = Vec::with_capacity(n);
        let mut boundaries = Vec::with_capacity(n);
        let mut pe = Vec::with_capacity(n);
        let mut x_hat = Array2::<f64>::zeros((n, d));
        let mut c: Vec<f64> = Vec::new();
        // events opened while evaluating only live for this run
        let n_learned = self.events.len();

        for (i, row) in x.outer_iter().enumerate() {
            let prediction = match (self.k_prev, &self.x_prev) {
                (Some(k), _) => self.events[k].mean.clone(),
                (None, Some(prev)) => prev.clone(),
                (None, None) => Array1::zeros(d),
            };
            pe.push((&row - &prediction).mapv(|v| v * v).sum().sqrt());
            x_hat.row_mut(i).assign(&prediction);

            let (k, kind) = self.choose(row);
            if k == self.events.len() {
                self.events.push(Prototype { mean: row.to_owned(), origin: row.to_owned(), count: 1.0 });
            } else if train {
                let ev = &mut self.events[k];
                ev.count += 1.0;
                let step = (&row - &ev.mean) / ev.count;
                ev.mean += &step;
            }

            if c.len() <= k {
                c.resize(k + 1, 0.0);
            }
            c[k] += 1.0;
            e_hat.push(k);
            boundaries.push(kind);
            self.k_prev = Some(k);
            self.x_prev = Some(row.to_owned());
        }
        c.resize(self.events.len(), 0.0);
        if !train {
            self.events.truncate(n_learned);
            if self.k_prev.map_or(false, |k| k >= n_learned) {
                self.k_prev = None;
            }
        }

        Ok(SegmentationResult { e_hat, boundaries, pe, x_hat, c })
    }

    fn reset_carry_over(&mut self) {
        self.k_prev = None;
        self.x_prev = None;
    }

    fn n_event_models(&self) -> usize {
        self.events.len()
    }

    fn event_counts(&self) -> Vec<f64> {
        self.events.iter().map(|e| e.count).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    fn two_clusters() -> Array2<f64> {
        Array2::from_shape_fn((40, 2), |(r, _)| if r < 20 { 0.0 } else { 1.0 })
    }

    #[test]
    fn splits_separated_clusters_when_training() {
        let cfg = SemConfig::default();
        let mut m = PrototypeEventModel::new(&cfg);
        let x = two_clusters();
        let res = m.run(x.view(), true).unwrap();
        assert_eq!(res.len(), 40);
        assert_eq!(res.e_hat[0], res.e_hat[19]);
        assert_ne!(res.e_hat[19], res.e_hat[20]);
        assert_eq!(res.e_hat[20], res.e_hat[39]);
        assert!(res.boundaries[20].is_boundary());
        assert_eq!(m.n_event_models(), 2);
        assert_eq!(res.c, vec![20.0, 20.0]);
    }

    #[test]
    fn evaluation_reuses_known_events() {
        let cfg = SemConfig::default();
        let mut m = PrototypeEventModel::new(&cfg);
        let x = two_clusters();
        m.run(x.view(), true).unwrap();
        m.reset_carry_over();
        let counts = m.event_counts();

        m.set_priors(SegmentationPriors::evaluation());
        let res = m.run(x.view(), false).unwrap();
        assert_eq!(m.n_event_models(), 2);
        assert_eq!(m.event_counts(), counts);
        assert_eq!(res.count(BoundaryKind::New), 0);
        assert_eq!(res.count(BoundaryKind::Restart), 0);
        assert_eq!(res.count(BoundaryKind::Old), 1);
    }

    #[test]
    fn evaluation_never_grows_the_model() {
        let cfg = SemConfig::default();
        let mut m = PrototypeEventModel::new(&cfg);
        m.run(Array2::<f64>::zeros((20, 2)).view(), true).unwrap();
        m.reset_carry_over();
        let counts = m.event_counts();
        assert_eq!(m.n_event_models(), 1);

        m.set_priors(SegmentationPriors::evaluation());
        let far = Array2::<f64>::from_elem((20, 2), 5.0);
        let res = m.run(far.view(), false).unwrap();
        assert_eq!(res.len(), 20);
        assert_eq!(m.n_event_models(), 1);
        assert_eq!(m.event_counts(), counts);

        // a later training run sees only the learned event
        m.reset_carry_over();
        m.set_priors(SegmentationPriors::training(&cfg));
        let res = m.run(Array2::<f64>::zeros((5, 2)).view(), true).unwrap();
        assert!(res.e_hat.iter().all(|&k| k == 0));
        assert_eq!(m.n_event_models(), 1);
    }

    #[test]
    fn rejects_width_change() {
        let cfg = SemConfig::default();
        let mut m = PrototypeEventModel::new(&cfg);
        m.run(Array2::<f64>::zeros((3, 2)).view(), true).unwrap();
        assert!(m.run(Array2::<f64>::zeros((3, 4)).view(), true).is_err());
    }

    #[test]
    fn entropy_normalisation() {
        let res = SegmentationResult {
            e_hat: vec![0, 1],
            boundaries: vec![BoundaryKind::New, BoundaryKind::New],
            pe: vec![1.0, 3.0],
            x_hat: Array2::zeros((2, 1)),
            c: vec![5.0, 5.0, 0.0],
        };
        assert!((res.normalized_entropy() - 1.0).abs() < 1e-12);
        assert!((res.mean_pe() - 2.0).abs() < 1e-12);
        assert!((res.std_pe() - 1.0).abs() < 1e-12);
        let single = SegmentationResult { c: vec![4.0], ..res };
        assert!(single.normalized_entropy().is_nan());
    }

    #[test]
    fn boundary_codes_serialize_as_integers() {
        let json = serde_json::to_string(&vec![BoundaryKind::None, BoundaryKind::Restart]).unwrap();
        assert_eq!(json, "[0,3]");
    }
}
