//! Block-PCA dimensionality reduction.
//!
//! A [`Pca`] is fitted from the eigendecomposition of the sample covariance
//! and applied with optional whitening:
//!
//! ```text
//! y = (x - μ) · Wᵀ / √λ
//! x̂ = (y · √λ) · W + μ
//! ```
//!
//! A [`Reducer`] applies either one global transform to the whole row or one
//! transform per feature block (`appear`, `optical`, `skel`, `emb`), where
//! `emb` spans the object-hand and scene embeddings.

use std::fs;
use std::path::{Path, PathBuf};

use nalgebra::{DMatrix, SymmetricEigen};
use ndarray::{concatenate, s, Array1, Array2, ArrayView2, Axis};
use sem_features::align::{ColumnBlock, CombinedFeatureMatrix};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::PcaError;

/// Eigenvalues below this are treated as zero variance when whitening.
const MIN_VARIANCE: f64 = 1e-12;

/// Names of the per-feature blocks, in column order.
pub const PCA_BLOCKS: [&str; 4] = ["appear", "optical", "skel", "emb"];

// ---------------------------------------------------------------------------
// Pca
// ---------------------------------------------------------------------------

/// How many components to keep when fitting.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ComponentSelection {
    /// A fixed count.
    Count(usize),
    /// The fewest components whose cumulative explained-variance ratio
    /// exceeds the fraction.
    ExplainedVariance(f64),
}

impl ComponentSelection {
    /// Interpret a number the way the CLI accepts it: a fraction below 1
    /// selects by explained variance, anything else is a count.
    pub fn from_value(v: f64) -> Self {
        if v > 0.0 && v < 1.0 {
            ComponentSelection::ExplainedVariance(v)
        } else {
            ComponentSelection::Count(v.max(0.0).round() as usize)
        }
    }
}

/// A fitted linear projection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pca {
    mean: Array1<f64>,
    /// `[n_components, n_features]`, rows are unit eigenvectors.
    components: Array2<f64>,
    explained_variance: Array1<f64>,
    whiten: bool,
}

impl Pca {
    /// Fit on the rows of `x`.
    pub fn fit(x: ArrayView2<'_, f64>, selection: ComponentSelection, whiten: bool) -> Result<Self, PcaError> {
        let (n, d) = x.dim();
        if n < 2 {
            return Err(PcaError::NotEnoughRows { rows: n });
        }
        let mean = x.mean_axis(Axis(0)).ok_or(PcaError::NotEnoughRows { rows: n })?;
        let centered = &x - &mean;
        let cov = centered.t().dot(&centered) / (n as f64 - 1.0);

        let eig = SymmetricEigen::new(DMatrix::from_fn(d, d, |i, j| cov[[i, j]]));
        let mut order: Vec<usize> = (0..d).collect();
        order.sort_by(|&a, &b| eig.eigenvalues[b].total_cmp(&eig.eigenvalues[a]));
        let variances: Vec<f64> = order.iter().map(|&i| eig.eigenvalues[i].max(0.0)).collect();

        let k = match selection {
            ComponentSelection::Count(k) => {
                if k == 0 || k > d {
                    return Err(PcaError::InvalidComponents(format!("{k} components for {d} features")));
                }
                k
            }
            ComponentSelection::ExplainedVariance(ratio) => {
                if !(ratio > 0.0 && ratio < 1.0) {
                    return Err(PcaError::InvalidComponents(format!("variance ratio {ratio}")));
                }
                let total: f64 = variances.iter().sum();
                let mut cum = 0.0;
                let mut k = d;
                for (i, v) in variances.iter().enumerate() {
                    cum += v;
                    if total > 0.0 && cum / total > ratio {
                        k = i + 1;
                        break;
                    }
                }
                k
            }
        };

        let mut components = Array2::<f64>::zeros((k, d));
        for (row, &src) in order.iter().take(k).enumerate() {
            let v = eig.eigenvectors.column(src);
            // deterministic sign: largest-magnitude loading is positive
            let pivot = v.iter().copied().fold(0.0_f64, |acc, x| if x.abs() > acc.abs() { x } else { acc });
            let sign = if pivot < 0.0 { -1.0 } else { 1.0 };
            for j in 0..d {
                components[[row, j]] = sign * v[j];
            }
        }
        let explained_variance = Array1::from(variances[..k].to_vec());
        debug!(features = d, components = k, rows = n, "fitted PCA");
        Ok(Self { mean, components, explained_variance, whiten })
    }

    /// Input width.
    pub fn n_features(&self) -> usize {
        self.components.ncols()
    }

    /// Output width.
    pub fn n_components(&self) -> usize {
        self.components.nrows()
    }

    /// Variance captured by each component.
    pub fn explained_variance(&self) -> &Array1<f64> {
        &self.explained_variance
    }

    fn scales(&self) -> Array1<f64> {
        self.explained_variance
            .mapv(|v| if self.whiten && v > MIN_VARIANCE { v.sqrt() } else { 1.0 })
    }

    /// Project rows onto the components.
    pub fn transform(&self, x: ArrayView2<'_, f64>) -> Result<Array2<f64>, PcaError> {
        if x.ncols() != self.n_features() {
            return Err(PcaError::width_mismatch("transform", self.n_features(), x.ncols()));
        }
        let y = (&x - &self.mean).dot(&self.components.t());
        Ok(y / &self.scales())
    }

    /// Map projected rows back to feature space.
    pub fn inverse_transform(&self, y: ArrayView2<'_, f64>) -> Result<Array2<f64>, PcaError> {
        if y.ncols() != self.n_components() {
            return Err(PcaError::width_mismatch("inverse transform", self.n_components(), y.ncols()));
        }
        let scaled = &y * &self.scales();
        Ok(scaled.dot(&self.components) + &self.mean)
    }

    /// Load a persisted transform.
    pub fn load(path: &Path) -> Result<Self, PcaError> {
        let text = fs::read_to_string(path)
            .map_err(|source| PcaError::FileAccess { path: path.to_path_buf(), source })?;
        serde_json::from_str(&text).map_err(|source| PcaError::Parse { path: path.to_path_buf(), source })
    }

    /// Persist as JSON.
    pub fn save(&self, path: &Path) -> Result<(), PcaError> {
        let json = serde_json::to_string(self)
            .map_err(|source| PcaError::Parse { path: path.to_path_buf(), source })?;
        fs::write(path, json).map_err(|source| PcaError::FileAccess { path: path.to_path_buf(), source })
    }
}

// ---------------------------------------------------------------------------
// Block layout
// ---------------------------------------------------------------------------

/// Column span of one PCA block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockSpan {
    /// One of [`PCA_BLOCKS`].
    pub name: &'static str,
    /// First column.
    pub start: usize,
    /// Number of columns.
    pub len: usize,
}

fn pca_block_of(table: &str) -> Option<&'static str> {
    match table {
        "appear" => Some("appear"),
        "optical" => Some("optical"),
        "skel" => Some("skel"),
        "objhand" | "scene" => Some("emb"),
        _ => None,
    }
}

/// Group the matrix's table blocks into the four PCA blocks.
///
/// The result must partition `0..n_cols` in [`PCA_BLOCKS`] order.
pub fn block_layout(blocks: &[ColumnBlock], n_cols: usize) -> Result<Vec<BlockSpan>, PcaError> {
    let mut spans: Vec<BlockSpan> = Vec::with_capacity(PCA_BLOCKS.len());
    let mut cursor = 0;
    for b in blocks {
        let name = pca_block_of(&b.name)
            .ok_or_else(|| PcaError::BlockLayout(format!("table `{}` has no PCA block", b.name)))?;
        if b.start != cursor {
            return Err(PcaError::BlockLayout(format!("gap or overlap before `{}` at column {}", b.name, b.start)));
        }
        match spans.last_mut() {
            Some(last) if last.name == name => last.len += b.len,
            _ => spans.push(BlockSpan { name, start: b.start, len: b.len }),
        }
        cursor = b.end();
    }
    if cursor != n_cols {
        return Err(PcaError::BlockLayout(format!("blocks cover {cursor} of {n_cols} columns")));
    }
    let names: Vec<&str> = spans.iter().map(|s| s.name).collect();
    if names != PCA_BLOCKS {
        return Err(PcaError::BlockLayout(format!("expected blocks {PCA_BLOCKS:?}, found {names:?}")));
    }
    Ok(spans)
}

// ---------------------------------------------------------------------------
// Reducer
// ---------------------------------------------------------------------------

/// Path of a persisted transform.
pub fn pca_path(dir: &Path, pca_tag: &str, block: Option<&str>) -> PathBuf {
    match block {
        Some(b) => dir.join(format!("{pca_tag}_{b}_pca.json")),
        None => dir.join(format!("{pca_tag}_pca.json")),
    }
}

/// Dimensionality reduction applied before segmentation.
#[derive(Debug, Clone)]
pub enum Reducer {
    /// One transform over the full row.
    Global(Pca),
    /// One transform per entry of [`PCA_BLOCKS`], in that order.
    PerBlock(Vec<Pca>),
}

/// Output of [`Reducer::transform`].
#[derive(Debug, Clone)]
pub struct Reduced {
    /// Projected rows.
    pub values: Array2<f64>,
    /// Cumulative component counts, one entry per block.
    pub boundaries: Vec<usize>,
}

impl Reducer {
    /// Load persisted transforms from `dir`.
    pub fn load(dir: &Path, pca_tag: &str, per_block: bool) -> Result<Self, PcaError> {
        if per_block {
            let pcas = PCA_BLOCKS
                .iter()
                .map(|b| Pca::load(&pca_path(dir, pca_tag, Some(*b))))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Reducer::PerBlock(pcas))
        } else {
            Ok(Reducer::Global(Pca::load(&pca_path(dir, pca_tag, None))?))
        }
    }

    /// Persist every transform to `dir`.
    pub fn save(&self, dir: &Path, pca_tag: &str) -> Result<(), PcaError> {
        match self {
            Reducer::Global(p) => p.save(&pca_path(dir, pca_tag, None)),
            Reducer::PerBlock(pcas) => {
                for (p, b) in pcas.iter().zip(PCA_BLOCKS) {
                    p.save(&pca_path(dir, pca_tag, Some(b)))?;
                }
                Ok(())
            }
        }
    }

    /// Fit from aligned matrices, stacking their rows.
    pub fn fit(
        matrices: &[CombinedFeatureMatrix],
        selection: ComponentSelection,
        whiten: bool,
        per_block: bool,
    ) -> Result<Self, PcaError> {
        let views: Vec<ArrayView2<'_, f64>> = matrices.iter().map(|m| m.values().view()).collect();
        let stacked = concatenate(Axis(0), &views)
            .map_err(|e| PcaError::BlockLayout(format!("matrices differ in width: {e}")))?;
        if !per_block {
            return Ok(Reducer::Global(Pca::fit(stacked.view(), selection, whiten)?));
        }
        let first = matrices.first().ok_or(PcaError::NotEnoughRows { rows: 0 })?;
        let spans = block_layout(first.blocks(), first.n_cols())?;
        let pcas = spans
            .iter()
            .map(|span| {
                let block = stacked.slice(s![.., span.start..span.start + span.len]);
                let sel = match selection {
                    ComponentSelection::Count(k) => ComponentSelection::Count(k.min(span.len)),
                    other => other,
                };
                Pca::fit(block, sel, whiten)
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Reducer::PerBlock(pcas))
    }

    /// Total output width.
    pub fn n_components(&self) -> usize {
        match self {
            Reducer::Global(p) => p.n_components(),
            Reducer::PerBlock(pcas) => pcas.iter().map(Pca::n_components).sum(),
        }
    }

    /// Project an aligned matrix.
    ///
    /// # Errors
    ///
    /// [`PcaError::WidthMismatch`] when a transform was fitted on a different
    /// width than the matrix (or block) it is applied to.
    pub fn transform(&self, matrix: &CombinedFeatureMatrix) -> Result<Reduced, PcaError> {
        let x = matrix.values().view();
        match self {
            Reducer::Global(p) => {
                if x.ncols() != p.n_features() {
                    return Err(PcaError::width_mismatch("global PCA", p.n_features(), x.ncols()));
                }
                Ok(Reduced { values: p.transform(x)?, boundaries: vec![p.n_components()] })
            }
            Reducer::PerBlock(pcas) => {
                let spans = block_layout(matrix.blocks(), matrix.n_cols())?;
                let mut parts = Vec::with_capacity(pcas.len());
                let mut boundaries = Vec::with_capacity(pcas.len());
                let mut acc = 0;
                for (p, span) in pcas.iter().zip(&spans) {
                    if span.len != p.n_features() {
                        return Err(PcaError::width_mismatch(
                            format!("{} PCA", span.name),
                            p.n_features(),
                            span.len,
                        ));
                    }
                    parts.push(p.transform(x.slice(s![.., span.start..span.start + span.len]))?);
                    acc += p.n_components();
                    boundaries.push(acc);
                }
                let views: Vec<ArrayView2<'_, f64>> = parts.iter().map(|a| a.view()).collect();
                let values = concatenate(Axis(1), &views)
                    .map_err(|e| PcaError::BlockLayout(e.to_string()))?;
                Ok(Reduced { values, boundaries })
            }
        }
    }

    /// Map projected rows back to feature space, block by block.
    pub fn inverse_transform(&self, y: ArrayView2<'_, f64>) -> Result<Array2<f64>, PcaError> {
        match self {
            Reducer::Global(p) => p.inverse_transform(y),
            Reducer::PerBlock(pcas) => {
                if y.ncols() != self.n_components() {
                    return Err(PcaError::width_mismatch("block inverse", self.n_components(), y.ncols()));
                }
                let mut parts = Vec::with_capacity(pcas.len());
                let mut start = 0;
                for p in pcas {
                    let end = start + p.n_components();
                    parts.push(p.inverse_transform(y.slice(s![.., start..end]))?);
                    start = end;
                }
                let views: Vec<ArrayView2<'_, f64>> = parts.iter().map(|a| a.view()).collect();
                concatenate(Axis(1), &views).map_err(|e| PcaError::BlockLayout(e.to_string()))
            }
        }
    }
}
