//! Run and epoch scheduler.
//!
//! [`Trainer`] owns the event model, the run sampler and the shared read-only
//! resources (word embeddings, skeleton reference, annotation tables). For
//! every scheduled run it:
//!
//! 1. preprocesses and aligns the four modalities, or reloads cached
//!    post-alignment tables,
//! 2. reduces the aligned matrix and scales rows by `1 / sqrt(n_cols)`,
//! 3. runs the event model with training or evaluation priors,
//! 4. scores coverage/purity and boundary agreement for both grains,
//! 5. appends result rows and writes the per-run artefacts.
//!
//! A failed run becomes a [`RunError`], is written to the error log and the
//! schedule continues.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use ndarray::Array2;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tracing::{debug, error, info, warn};

use sem_features::align::{combine_tables, AlignOptions, CombinedFeatureMatrix};
use sem_features::embedding::{preprocess_objhand, CategoryTable, WordEmbeddings};
use sem_features::error::FeatureError;
use sem_features::preprocess::{preprocess_appear, preprocess_optical, preprocess_skel, SkeletonReference};
use sem_features::table::FeatureTable;

use crate::annotations::{EventAnnotations, Grain, HumanSegmentation};
use crate::cache::{bundle_path, ReadoutBundle};
use crate::config::SemConfig;
use crate::error::{RunError, TrainError, TrainResult};
use crate::lists::parse_input;
use crate::metrics::{
    binned_prediction, clustering_scores, event_intervals, gaussian_filter1d, nanmedian, pad_prediction,
    pearson_r, percentile_of_score, point_biserial, ClusteringScore, CorrelationScore,
};
use crate::model::{BoundaryKind, EventModel, PrototypeEventModel, SegmentationPriors, SegmentationResult};
use crate::pca::{ComponentSelection, Reducer};
use crate::results::{ResultRow, ResultsWriter, RowContext};
use crate::sampler::{QualityHistory, QualityRecord, QualityWeightedSampler, RoundRobinSampler, RunSampler};

// ---------------------------------------------------------------------------
// Run bookkeeping
// ---------------------------------------------------------------------------

/// Names and rates derived from a run id.
#[derive(Debug, Clone, PartialEq)]
pub struct RunContext {
    /// Run name, e.g. `1.1.1_kinect`.
    pub run: String,
    /// Movie file name, `{run}_trim.mp4`.
    pub movie: String,
    /// Artefact stem, `{tag}/{run}_trim{tag}`.
    pub title: String,
    /// Frame rate: 25 for kinect recordings, 30 otherwise.
    pub fps: f64,
    /// 1-based epoch.
    pub epoch: usize,
    /// Training or evaluation pass.
    pub is_train: bool,
    tag: String,
}

impl RunContext {
    /// Context of `run` in `epoch`.
    pub fn new(run: &str, tag: &str, epoch: usize, is_train: bool) -> Self {
        Self {
            run: run.to_owned(),
            movie: format!("{run}_trim.mp4"),
            title: run_title(run, tag),
            fps: if run.contains("kinect") { 25.0 } else { 30.0 },
            epoch,
            is_train,
            tag: tag.to_owned(),
        }
    }

    /// Id written to the completion and error logs, `{run}_{tag}`.
    pub fn run_id(&self) -> String {
        format!("{}_{}", self.run, self.tag)
    }
}

fn run_title(run: &str, tag: &str) -> String {
    format!("{tag}/{run}_trim{tag}")
}

/// Scores of a finished run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunOutcome {
    /// `{run}_{tag}`.
    pub run_id: String,
    /// Rows fed to the model.
    pub n_rows: usize,
    /// Rows with a boundary.
    pub n_boundaries: usize,
    /// Coarse-grain boundary agreement.
    pub coarse: CorrelationScore,
    /// Fine-grain boundary agreement.
    pub fine: CorrelationScore,
    /// Coverage and purity.
    pub clustering: ClusteringScore,
}

/// Counts over one [`Trainer::iterate`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScheduleSummary {
    /// Training runs that completed.
    pub trained: usize,
    /// Evaluation runs that completed.
    pub evaluated: usize,
    /// Runs that failed.
    pub failed: usize,
}

/// Aligned inputs of one run.
#[derive(Debug, Clone)]
pub struct PreparedFeatures {
    /// Post-alignment tables: appear, optical, skel, objhand, scene.
    pub tables: Vec<FeatureTable>,
    /// Their concatenation.
    pub matrix: CombinedFeatureMatrix,
    /// First aligned frame.
    pub first_frame: i64,
    /// Last aligned skeleton frame.
    pub last_frame: i64,
    /// Object embedding before alignment; absent for cached runs.
    pub objhand_pre: Option<FeatureTable>,
    /// Nearest categories per frame.
    pub categories: Option<CategoryTable>,
}

// ---------------------------------------------------------------------------
// Trainer
// ---------------------------------------------------------------------------

/// Drives training and evaluation over the run lists.
pub struct Trainer {
    config: SemConfig,
    model: Box<dyn EventModel>,
    sampler: Box<dyn RunSampler>,
    valid: Vec<String>,
    history: QualityHistory,
    rng: StdRng,
    reducer: Option<Reducer>,
    writer: ResultsWriter,
    embeddings: OnceLock<Arc<WordEmbeddings>>,
    skel_reference: OnceLock<Option<Arc<SkeletonReference>>>,
    segmentation: OnceLock<Arc<HumanSegmentation>>,
    events: OnceLock<Arc<EventAnnotations>>,
}

impl Trainer {
    /// Build a trainer from a validated config.
    ///
    /// Reads the run lists, the quality corpus when a sampler is configured,
    /// and the persisted PCA state when `pca` is set.
    pub fn new(config: SemConfig) -> TrainResult<Self> {
        config.validate()?;
        let valid = parse_input(&config.valid, false)?.flatten();
        let mut history = QualityHistory::default();
        let sampler: Box<dyn RunSampler> = if config.use_sampler {
            history = QualityHistory::from_results_csv(&config.results_corpus_path, &config.cache_tag, &valid)?;
            info!(records = history.len(), "seeded quality history");
            Box::new(QualityWeightedSampler::new(config.seed, config.min_boundary, config.max_boundary))
        } else {
            Box::new(RoundRobinSampler::new(parse_input(&config.train, config.train_stratified)?))
        };
        let reducer = if config.pca {
            Some(Reducer::load(&config.pca_dir, &config.pca_tag, config.use_ind_feature_pca)?)
        } else {
            None
        };
        let writer = ResultsWriter::new(config.output_dir.clone())?;

        Ok(Self {
            model: Box::new(PrototypeEventModel::new(&config)),
            sampler,
            valid,
            history,
            rng: StdRng::seed_from_u64(config.seed),
            reducer,
            writer,
            embeddings: OnceLock::new(),
            skel_reference: OnceLock::new(),
            segmentation: OnceLock::new(),
            events: OnceLock::new(),
            config,
        })
    }

    /// Replace the event model.
    pub fn with_model(mut self, model: Box<dyn EventModel>) -> Self {
        self.model = model;
        self
    }

    /// Replace the run sampler.
    pub fn with_sampler(mut self, sampler: Box<dyn RunSampler>) -> Self {
        self.sampler = sampler;
        self
    }

    /// Inject a preloaded embedding table.
    pub fn with_embeddings(self, embeddings: Arc<WordEmbeddings>) -> Self {
        let _ = self.embeddings.set(embeddings);
        self
    }

    /// Active configuration.
    pub fn config(&self) -> &SemConfig {
        &self.config
    }

    /// Scores folded in so far.
    pub fn history(&self) -> &QualityHistory {
        &self.history
    }

    /// The event model.
    pub fn model(&self) -> &dyn EventModel {
        self.model.as_ref()
    }

    // -----------------------------------------------------------------------
    // Shared resources
    // -----------------------------------------------------------------------

    fn embeddings(&self) -> TrainResult<Arc<WordEmbeddings>> {
        if let Some(e) = self.embeddings.get() {
            return Ok(Arc::clone(e));
        }
        let loaded = WordEmbeddings::from_glove_text(&self.config.embeddings_path).map_err(FeatureError::from)?;
        info!(words = loaded.len(), dim = loaded.dim(), "loaded word embeddings");
        Ok(Arc::clone(self.embeddings.get_or_init(|| Arc::new(loaded))))
    }

    fn skel_reference(&self) -> TrainResult<Option<Arc<SkeletonReference>>> {
        if let Some(r) = self.skel_reference.get() {
            return Ok(r.clone());
        }
        let loaded = match &self.config.skel_reference_path {
            Some(path) => Some(Arc::new(SkeletonReference::from_csv(
                path,
                self.config.skel_lower_quantile,
                self.config.skel_upper_quantile,
            )?)),
            None => {
                warn!("no skeleton reference configured; skeleton features are used unscaled");
                None
            }
        };
        Ok(self.skel_reference.get_or_init(|| loaded).clone())
    }

    fn segmentation(&self) -> TrainResult<Arc<HumanSegmentation>> {
        if let Some(s) = self.segmentation.get() {
            return Ok(Arc::clone(s));
        }
        let loaded = HumanSegmentation::from_csv(&self.config.seg_path)?;
        Ok(Arc::clone(self.segmentation.get_or_init(|| Arc::new(loaded))))
    }

    fn event_annotations(&self) -> TrainResult<Arc<EventAnnotations>> {
        if let Some(e) = self.events.get() {
            return Ok(Arc::clone(e));
        }
        let loaded = EventAnnotations::from_csv(&self.config.event_annotation_path)?;
        Ok(Arc::clone(self.events.get_or_init(|| Arc::new(loaded))))
    }

    // -----------------------------------------------------------------------
    // Schedule
    // -----------------------------------------------------------------------

    /// Run every epoch: one training run, then the validation pass on
    /// evaluation epochs.
    ///
    /// # Errors
    ///
    /// Only failures to write the completion or error logs propagate; run
    /// failures are recorded and counted.
    pub fn iterate(&mut self) -> TrainResult<ScheduleSummary> {
        let mut summary = ScheduleSummary::default();
        for epoch in 1..=self.config.epochs {
            info!(epoch, sampler = self.sampler.name(), "training");
            match self.sampler.select(epoch, &self.history) {
                Some(run) => {
                    if self.run_and_record(&run, epoch, true)? {
                        summary.trained += 1;
                    } else {
                        summary.failed += 1;
                    }
                }
                None => warn!(epoch, "no training run selected"),
            }

            if self.config.is_eval_epoch(epoch) {
                info!(epoch, runs = self.valid.len(), "evaluating");
                let mut order = self.valid.clone();
                order.shuffle(&mut self.rng);
                for run in &order {
                    if self.run_and_record(run, epoch, false)? {
                        summary.evaluated += 1;
                    } else {
                        summary.failed += 1;
                    }
                }
            }
        }
        info!(
            trained = summary.trained,
            evaluated = summary.evaluated,
            failed = summary.failed,
            "schedule finished"
        );
        Ok(summary)
    }

    /// Process one run and write it to the completion or error log.
    /// Returns whether the run succeeded.
    pub fn run_and_record(&mut self, run: &str, epoch: usize, is_train: bool) -> TrainResult<bool> {
        let ctx = RunContext::new(run, &self.config.tag, epoch, is_train);
        info!(run, epoch, is_train, "processing run");
        match self.process_run(&ctx) {
            Ok(outcome) => {
                self.writer.mark_complete(&outcome.run_id)?;
                if is_train {
                    self.history.push(QualityRecord {
                        run: ctx.run.clone(),
                        percentile: outcome.coarse.percentile,
                        number_boundaries: outcome.n_boundaries as f64,
                    });
                }
                Ok(true)
            }
            Err(e) => {
                error!(run = %e.run, error = %e.source, "run failed");
                self.writer.mark_error(&e.run, &e.chain())?;
                Ok(false)
            }
        }
    }

    /// Process one run. The model's carry-over state is cleared before the
    /// run starts.
    pub fn process_run(&mut self, ctx: &RunContext) -> Result<RunOutcome, RunError> {
        self.model.reset_carry_over();
        self.infer_on_run(ctx).map_err(|e| RunError::new(ctx.run_id(), e))
    }

    fn infer_on_run(&mut self, ctx: &RunContext) -> TrainResult<RunOutcome> {
        let features = self.process_features(ctx)?;
        if features.matrix.is_empty() {
            return Err(TrainError::NoOverlap { run: ctx.run.clone() });
        }

        // Reduce, then give every row roughly unit length.
        let reduced = match &self.reducer {
            Some(r) => Some(r.transform(&features.matrix)?),
            None => None,
        };
        let model_input = reduced.as_ref().map_or_else(|| features.matrix.values(), |r| &r.values);
        let scale = (model_input.ncols() as f64).sqrt();
        let x = model_input / scale;

        let priors =
            if ctx.is_train { SegmentationPriors::training(&self.config) } else { SegmentationPriors::evaluation() };
        self.model.set_priors(priors);
        let result = self.model.run(x.view(), ctx.is_train)?;

        let clustering = self.compute_clustering_metrics(ctx, &features, &result)?;

        let switch_old = result.count(BoundaryKind::Old);
        let switch_new = result.count(BoundaryKind::New);
        let switch_current = result.count(BoundaryKind::Restart);
        info!(switch_old, switch_new, switch_current, "boundary counts");
        let counts = self.model.event_counts();
        let active_event_models =
            counts.iter().filter(|&&c| c > self.config.active_event_threshold as f64).count();

        let sps = self.config.samples_per_second();
        let bin_rows = (self.config.second_interval * sps).round() as usize;
        let pred = pad_prediction(
            binned_prediction(&result.boundaries, bin_rows),
            features.first_frame,
            ctx.fps,
            self.config.second_interval,
        );

        let mut scores = Vec::with_capacity(Grain::ALL.len());
        for grain in Grain::ALL {
            let score = self.calculate_correlation(ctx, &pred, grain, features.last_frame)?;
            self.writer.append_result(&ResultRow {
                run: ctx.run.clone(),
                grain: grain.to_string(),
                bicorr: score.bicorr,
                percentile: score.percentile,
                n_event_models: self.model.n_event_models(),
                active_event_models,
                epoch: ctx.epoch,
                number_boundaries: result.n_boundaries(),
                sem_params: self.config.sem_params(),
                tag: self.config.tag.clone(),
                mean_pe: result.mean_pe(),
                std_pe: result.std_pe(),
                pearson_r: score.pearson_r,
                is_train: ctx.is_train,
                switch_old,
                switch_new,
                switch_current,
                entropy: result.normalized_entropy(),
                purity: clustering.purity,
                coverage: clustering.coverage,
            })?;
            scores.push(score);
        }

        self.writer.write_json(&format!("{}_diagnostic_{}.json", ctx.title, ctx.epoch), &result)?;
        if self.config.store_frames {
            self.store_bundle(ctx, features, &x, reduced.as_ref().map(|r| &r.values), &result)?;
        }

        Ok(RunOutcome {
            run_id: ctx.run_id(),
            n_rows: result.len(),
            n_boundaries: result.n_boundaries(),
            coarse: scores[0],
            fine: scores[1],
            clustering,
        })
    }

    // -----------------------------------------------------------------------
    // Features
    // -----------------------------------------------------------------------

    /// Aligned features of a run, from the raw CSVs or the epoch-1 bundle of
    /// `cache_tag`.
    pub fn process_features(&self, ctx: &RunContext) -> TrainResult<PreparedFeatures> {
        if self.config.use_cache {
            return self.cached_features(ctx);
        }
        let cfg = &self.config;
        let run = &ctx.run;
        let input = |dir: &Path, suffix: &str| -> PathBuf { dir.join(format!("{run}{suffix}")) };

        let appear = preprocess_appear(&input(&cfg.appear_dir, "_appear.csv"), ctx.fps)?;
        let optical = preprocess_optical(&input(&cfg.optical_dir, "_video_features.csv"), ctx.fps, cfg.optical_scaling)?;
        let reference = self.skel_reference()?;
        let skel = preprocess_skel(
            &input(&cfg.skel_dir, "_skel_features.csv"),
            ctx.fps,
            reference.as_deref(),
            &cfg.skeleton_options(),
        )?;
        let embeddings = self.embeddings()?;
        let objhand_path = input(&cfg.objhand_dir, "_objhand.csv");
        let (objhand, categories) = preprocess_objhand(&objhand_path, ctx.fps, &embeddings, &cfg.objhand_options())?;
        let (scene, _) = preprocess_objhand(&objhand_path, ctx.fps, &embeddings, &cfg.scene_options())?;

        let options = AlignOptions {
            rate_ms: cfg.rate_ms,
            reference_fps: ctx.fps,
            indicator_columns: cfg.indicator_columns.clone(),
        };
        let alignment = combine_tables(&[appear, optical, skel, objhand.clone(), scene], &options)?;
        let first_frame = alignment.first_frame.ok_or_else(|| TrainError::NoOverlap { run: run.clone() })?;
        let last_frame = alignment
            .tables
            .get(2)
            .and_then(FeatureTable::last_frame)
            .ok_or_else(|| TrainError::NoOverlap { run: run.clone() })?;
        debug!(
            rows = alignment.matrix.n_rows(),
            cols = alignment.matrix.n_cols(),
            first_frame,
            last_frame,
            "aligned features"
        );

        Ok(PreparedFeatures {
            tables: alignment.tables,
            matrix: alignment.matrix,
            first_frame,
            last_frame,
            objhand_pre: Some(objhand),
            categories: Some(categories),
        })
    }

    fn cached_features(&self, ctx: &RunContext) -> TrainResult<PreparedFeatures> {
        let cache_tag = &self.config.cache_tag;
        let path = bundle_path(&self.config.output_dir, &run_title(&ctx.run, cache_tag), 1);
        let bundle = ReadoutBundle::load(&path)?;
        let tables = bundle.post_tables(&path)?;
        let matrix = CombinedFeatureMatrix::from_aligned_tables(&tables, ctx.fps).map_err(FeatureError::from)?;
        let no_rows = || TrainError::NoOverlap { run: ctx.run.clone() };
        let first_frame = tables[0].first_frame().ok_or_else(no_rows)?;
        let last_frame = tables[2].last_frame().ok_or_else(no_rows)?;
        debug!(path = %path.display(), rows = matrix.n_rows(), "reloaded cached features");
        Ok(PreparedFeatures {
            tables,
            matrix,
            first_frame,
            last_frame,
            objhand_pre: bundle.objhand_pre,
            categories: bundle.categories,
        })
    }

    /// Fit a reducer on the aligned features of `runs` and persist it under
    /// `pca_dir` with `pca_tag`.
    pub fn fit_reducer(&self, runs: &[String], selection: ComponentSelection) -> TrainResult<Reducer> {
        let mut matrices = Vec::with_capacity(runs.len());
        for run in runs {
            let ctx = RunContext::new(run, &self.config.tag, 1, true);
            match self.process_features(&ctx) {
                Ok(f) if !f.matrix.is_empty() => matrices.push(f.matrix),
                Ok(_) => warn!(run = %run, "no aligned rows; skipped"),
                Err(e) => warn!(run = %run, error = %e, "cannot prepare features; skipped"),
            }
        }
        let reducer = Reducer::fit(&matrices, selection, self.config.pca_whiten, self.config.use_ind_feature_pca)?;
        reducer.save(&self.config.pca_dir, &self.config.pca_tag)?;
        info!(runs = matrices.len(), components = reducer.n_components(), "fitted PCA");
        Ok(reducer)
    }

    // -----------------------------------------------------------------------
    // Scoring
    // -----------------------------------------------------------------------

    fn compute_clustering_metrics(
        &self,
        ctx: &RunContext,
        features: &PreparedFeatures,
        result: &SegmentationResult,
    ) -> TrainResult<ClusteringScore> {
        let start_second = features.first_frame as f64 / ctx.fps;
        let inferred = event_intervals(&result.e_hat, start_second, self.config.samples_per_second());
        let annotated = self.event_annotations()?.for_run(&ctx.run);
        if annotated.is_empty() {
            warn!(run = %ctx.run, "no annotated events; coverage and purity are undefined");
        }
        let score = clustering_scores(&inferred, &annotated);
        let row_ctx = RowContext {
            epoch: ctx.epoch,
            run: ctx.run.clone(),
            tag: self.config.tag.clone(),
            is_train: ctx.is_train,
        };
        self.writer.append_purity(&score.purity_rows, &row_ctx)?;
        self.writer.append_coverage(&score.coverage_rows, &row_ctx)?;
        info!(purity = score.purity, coverage = score.coverage, "clustering metrics");
        Ok(score)
    }

    fn calculate_correlation(
        &self,
        ctx: &RunContext,
        pred: &[f64],
        grain: Grain,
        last_frame: i64,
    ) -> TrainResult<CorrelationScore> {
        let cfg = &self.config;
        let curve = self.segmentation()?.curve(
            &ctx.movie,
            grain,
            cfg.n_annotators,
            cfg.second_interval,
            cfg.annotation_sigma,
            pred.len(),
        )?;
        let end_bin = (last_frame as f64 / ctx.fps / cfg.second_interval).ceil().max(0.0) as usize;
        let last = pred.len().min(end_bin).min(curve.gt_freqs.len());
        let gt = &curve.gt_freqs[..last];

        let bicorr = point_biserial(&pred[..last], gt);
        let smoothed = gaussian_filter1d(pred, cfg.pearson_sigma);
        let r = pearson_r(&smoothed[..last], gt);
        let subjects = curve.biserial_subjects(last);
        let percentile = percentile_of_score(&subjects, bicorr);
        info!(
            grain = %grain,
            bicorr,
            percentile,
            pearson_r = r,
            subjects_median = nanmedian(&subjects),
            "boundary agreement"
        );

        self.writer.write_json(&format!("{}_gtfreqs_{grain}.json", ctx.title), &curve.gt_freqs)?;
        Ok(CorrelationScore { bicorr, percentile, pearson_r: r })
    }

    // -----------------------------------------------------------------------
    // Artefacts
    // -----------------------------------------------------------------------

    fn store_bundle(
        &self,
        ctx: &RunContext,
        features: PreparedFeatures,
        x: &Array2<f64>,
        x_pca: Option<&Array2<f64>>,
        result: &SegmentationResult,
    ) -> TrainResult<()> {
        let scale = (x.ncols() as f64).sqrt();
        let x_inferred = &result.x_hat * scale;

        let mut bundle = ReadoutBundle {
            objhand_pre: features.objhand_pre.map(|t| drop_missing_rows(&t)),
            categories: features.categories,
            x_train: Some(features.matrix.values().clone()),
            ..Default::default()
        };
        let mut tables = features.tables.into_iter();
        bundle.appear_post = tables.next();
        bundle.optical_post = tables.next();
        bundle.skel_post = tables.next();
        bundle.objhand_post = tables.next();
        bundle.scene_post = tables.next();

        match (&self.reducer, x_pca) {
            (Some(reducer), Some(x_pca)) => {
                bundle.x_train_inverted = Some(reducer.inverse_transform(x_pca.view())?);
                bundle.x_inferred_inverted = Some(reducer.inverse_transform(x_inferred.view())?);
                bundle.x_train_pca = Some(x_pca.clone());
                bundle.x_inferred_pca = Some(x_inferred);
            }
            _ => bundle.x_inferred = Some(x_inferred),
        }

        let path = bundle_path(self.writer.dir(), &ctx.title, ctx.epoch);
        bundle.save(&path)?;
        debug!(path = %path.display(), "stored readout bundle");
        Ok(())
    }
}

/// Rows with any missing value cannot round-trip through JSON.
fn drop_missing_rows(table: &FeatureTable) -> FeatureTable {
    let missing: HashSet<i64> = table
        .frames()
        .iter()
        .zip(table.rows_with_missing().iter())
        .filter(|&(_, &m)| m)
        .map(|(&f, _)| f)
        .collect();
    table.filter_rows(|f| !missing.contains(&f))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_derives_names_and_fps() {
        let ctx = RunContext::new("1.2.3_kinect", "tag", 2, true);
        assert_eq!(ctx.movie, "1.2.3_kinect_trim.mp4");
        assert_eq!(ctx.title, "tag/1.2.3_kinect_trimtag");
        assert_eq!(ctx.fps, 25.0);
        assert_eq!(ctx.run_id(), "1.2.3_kinect_tag");
        assert_eq!(RunContext::new("1.2.3_C1", "tag", 1, false).fps, 30.0);
    }

    #[test]
    fn missing_rows_are_dropped() {
        let t = FeatureTable::new(
            "objhand",
            30.0,
            vec![0, 1, 2],
            vec!["a".into()],
            ndarray::array![[1.0], [f64::NAN], [3.0]],
        )
        .unwrap();
        assert_eq!(drop_missing_rows(&t).frames(), &[0, 2]);
    }
}
