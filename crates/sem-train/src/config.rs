//! Run configuration for the SEM training loop.
//!
//! [`SemConfig`] holds every path, schedule knob, feature option and model
//! hyper-parameter used by the scheduler. It is serializable via [`serde`] and
//! loaded from JSON; every field has a default so partial files are accepted.
//!
//! # Example
//!
//! ```rust
//! use sem_train::config::SemConfig;
//!
//! let cfg = SemConfig::default();
//! cfg.validate().expect("default config is valid");
//!
//! assert_eq!(cfg.rate_ms, 40.0);
//! assert_eq!(cfg.samples_per_second(), 25.0);
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use sem_features::embedding::{DistanceMode, ObjectEmbeddingOptions};
use sem_features::preprocess::SkeletonOptions;
use sem_features::Scaling;

use crate::error::ConfigError;

// ---------------------------------------------------------------------------
// SemConfig
// ---------------------------------------------------------------------------

/// Complete configuration of one `sem-run` invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SemConfig {
    // -----------------------------------------------------------------------
    // Inputs
    // -----------------------------------------------------------------------
    /// Directory of `{run}_appear.csv` files.
    pub appear_dir: PathBuf,
    /// Directory of `{run}_video_features.csv` files.
    pub optical_dir: PathBuf,
    /// Directory of `{run}_skel_features.csv` files.
    pub skel_dir: PathBuf,
    /// Directory of `{run}_objhand.csv` files.
    pub objhand_dir: PathBuf,
    /// Human segmentation table (`movie, grain, annotator, second`).
    pub seg_path: PathBuf,
    /// Event annotation timing table (`run, evname, startsec, endsec`).
    pub event_annotation_path: PathBuf,
    /// Global skeleton reference sample. `None` disables skeleton standardisation.
    pub skel_reference_path: Option<PathBuf>,
    /// GloVe-format word vectors.
    pub embeddings_path: PathBuf,
    /// Directory holding persisted PCA transforms.
    pub pca_dir: PathBuf,
    /// Prior results table used to seed the quality-weighted sampler.
    pub results_corpus_path: PathBuf,

    // -----------------------------------------------------------------------
    // Outputs
    // -----------------------------------------------------------------------
    /// Root of all outputs. Default: **`output/run_sem`**.
    pub output_dir: PathBuf,
    /// Tag appended to run ids and output names.
    pub tag: String,
    /// Persist the per-run readout bundle. Default: **true**.
    pub store_frames: bool,

    // -----------------------------------------------------------------------
    // Run lists
    // -----------------------------------------------------------------------
    /// Training list token: a run name or a `.txt` list.
    pub train: String,
    /// Validation list token.
    pub valid: String,
    /// Treat `train` as a list of per-bucket `.txt` lists.
    pub train_stratified: bool,

    // -----------------------------------------------------------------------
    // Schedule
    // -----------------------------------------------------------------------
    /// Number of epochs, counted from 1. Default: **1**.
    pub epochs: usize,
    /// Evaluate every `eval_every` epochs. Default: **5**.
    pub eval_every: usize,
    /// Evaluate when `epoch % eval_every == eval_offset`. Default: **1**.
    pub eval_offset: usize,
    /// Run the validation pass at all.
    pub evaluate: bool,
    /// Seed of the scheduler RNG. Default: **1111**.
    pub seed: u64,

    // -----------------------------------------------------------------------
    // Features
    // -----------------------------------------------------------------------
    /// Resampling bucket width in milliseconds. Default: **40**.
    pub rate_ms: f64,
    /// Keep 2-D skeleton positions.
    pub use_position: bool,
    /// Use depth distances (`_dist_z`) for object embeddings. Default: **true**.
    pub use_depth: bool,
    /// Optical-flow column scaling, `z_score` or `min_max`. Default: **z_score**.
    pub optical_scaling: Scaling,
    /// Nearest categories per frame for the object-hand embedding. Default: **3**.
    pub num_objects: usize,
    /// Nearest categories per frame for the scene embedding. Default: **30**.
    pub scene_num_objects: usize,
    /// Indicator columns rounded up after resampling.
    pub indicator_columns: Vec<String>,
    /// Skeleton reference band, lower quantile. Default: **0.05**.
    pub skel_lower_quantile: f64,
    /// Skeleton reference band, upper quantile. Default: **0.95**.
    pub skel_upper_quantile: f64,
    /// Skeleton column survival threshold. Default: **0.8**.
    pub min_column_survival: f64,
    /// Failing-column fraction that aborts a run. Default: **0.1**.
    pub max_failed_column_fraction: f64,

    // -----------------------------------------------------------------------
    // Cache / PCA
    // -----------------------------------------------------------------------
    /// Reload post-alignment tables instead of preprocessing.
    pub use_cache: bool,
    /// Tag of the bundles to reload.
    pub cache_tag: String,
    /// Reduce features with PCA before segmentation.
    pub pca: bool,
    /// Use one transform per feature block instead of a global one.
    pub use_ind_feature_pca: bool,
    /// Whiten components when fitting PCA. Default: **true**.
    pub pca_whiten: bool,
    /// Prefix of persisted PCA files.
    pub pca_tag: String,

    // -----------------------------------------------------------------------
    // Scoring
    // -----------------------------------------------------------------------
    /// Width of a prediction / annotation bin in seconds. Default: **1**.
    pub second_interval: f64,
    /// Maximum annotators per movie. Default: **100**.
    pub n_annotators: usize,
    /// Gaussian sigma (bins) applied to the human boundary curve. Default: **1.0**.
    pub annotation_sigma: f64,
    /// Gaussian sigma (bins) applied to predictions for Pearson r. Default: **2.0**.
    pub pearson_sigma: f64,
    /// Rows after which an event model counts as active. Default: **600**.
    pub active_event_threshold: usize,

    // -----------------------------------------------------------------------
    // Model
    // -----------------------------------------------------------------------
    /// Stickiness prior. Default: **10**.
    pub lmda: f64,
    /// Concentration prior. Default: **10**.
    pub alfa: f64,
    /// Restart prior. Default: **1**.
    pub kappa: f64,
    /// Hidden units of a recurrent backend. Default: **16**.
    pub n_hidden: usize,
    /// Learning rate of a trainable backend. Default: **1e-3**.
    pub learning_rate: f64,
    /// Prior variance scale. Default: **0.06**.
    pub var_scale: f64,

    // -----------------------------------------------------------------------
    // Sampler
    // -----------------------------------------------------------------------
    /// Pick training runs by past quality instead of the static list.
    pub use_sampler: bool,
    /// Minimum boundary count of a run eligible for sampling. Default: **5**.
    pub min_boundary: usize,
    /// Maximum boundary count of a run eligible for sampling. Default: **50**.
    pub max_boundary: usize,
}

impl Default for SemConfig {
    fn default() -> Self {
        SemConfig {
            // Inputs
            appear_dir: PathBuf::from("output/appear"),
            optical_dir: PathBuf::from("output/vid"),
            skel_dir: PathBuf::from("output/skel"),
            objhand_dir: PathBuf::from("output/objhand"),
            seg_path: PathBuf::from("seg_data_analysis_clean.csv"),
            event_annotation_path: PathBuf::from("event_annotation_timing.csv"),
            skel_reference_path: Some(PathBuf::from("sampled_skel_features_dec_6.csv")),
            embeddings_path: PathBuf::from("glove.txt"),
            pca_dir: PathBuf::from("."),
            results_corpus_path: PathBuf::from("output/run_sem/results_corpus.csv"),
            // Outputs
            output_dir: PathBuf::from("output/run_sem"),
            tag: String::from("sem"),
            store_frames: true,
            // Lists
            train: String::from("train.txt"),
            valid: String::from("valid.txt"),
            train_stratified: false,
            // Schedule
            epochs: 1,
            eval_every: 5,
            eval_offset: 1,
            evaluate: true,
            seed: 1111,
            // Features
            rate_ms: 40.0,
            use_position: false,
            use_depth: true,
            optical_scaling: Scaling::ZScore,
            num_objects: 3,
            scene_num_objects: 30,
            indicator_columns: vec!["appear".into(), "disappear".into()],
            skel_lower_quantile: 0.05,
            skel_upper_quantile: 0.95,
            min_column_survival: 0.8,
            max_failed_column_fraction: 0.1,
            // Cache / PCA
            use_cache: false,
            cache_tag: String::new(),
            pca: false,
            use_ind_feature_pca: false,
            pca_whiten: true,
            pca_tag: String::new(),
            // Scoring
            second_interval: 1.0,
            n_annotators: 100,
            annotation_sigma: 1.0,
            pearson_sigma: 2.0,
            active_event_threshold: 600,
            // Model
            lmda: 10.0,
            alfa: 10.0,
            kappa: 1.0,
            n_hidden: 16,
            learning_rate: 1e-3,
            var_scale: 0.06,
            // Sampler
            use_sampler: false,
            min_boundary: 5,
            max_boundary: 50,
        }
    }
}

impl SemConfig {
    /// Load a [`SemConfig`] from a JSON file at `path` and validate it.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::FileRead`] if the file cannot be opened,
    /// [`ConfigError::ParseError`] if the JSON is malformed and
    /// [`ConfigError::InvalidValue`] if validation fails.
    pub fn from_json(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::FileRead {
            path: path.to_path_buf(),
            source,
        })?;
        let cfg: SemConfig = serde_json::from_str(&contents).map_err(|source| ConfigError::ParseError {
            path: path.to_path_buf(),
            source,
        })?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Serialize this configuration to pretty-printed JSON at `path`,
    /// creating parent directories if necessary.
    pub fn to_json(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| ConfigError::FileRead {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::invalid_value("(serialization)", e.to_string()))?;
        std::fs::write(path, json).map_err(|source| ConfigError::FileRead {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(())
    }

    /// Resampled rows per second, `1000 / rate_ms`.
    pub fn samples_per_second(&self) -> f64 {
        1000.0 / self.rate_ms
    }

    /// Distance family for object embeddings.
    pub fn distance_mode(&self) -> DistanceMode {
        if self.use_depth {
            DistanceMode::Depth
        } else {
            DistanceMode::Planar
        }
    }

    /// Options of the object-hand embedding.
    pub fn objhand_options(&self) -> ObjectEmbeddingOptions {
        ObjectEmbeddingOptions {
            num_objects: self.num_objects,
            mode: self.distance_mode(),
            ..ObjectEmbeddingOptions::objhand()
        }
    }

    /// Options of the scene embedding.
    pub fn scene_options(&self) -> ObjectEmbeddingOptions {
        ObjectEmbeddingOptions {
            num_objects: self.scene_num_objects,
            mode: self.distance_mode(),
            ..ObjectEmbeddingOptions::scene()
        }
    }

    /// Options of the skeleton preprocessor.
    pub fn skeleton_options(&self) -> SkeletonOptions {
        SkeletonOptions {
            use_position: self.use_position,
            min_column_survival: self.min_column_survival,
            max_failed_column_fraction: self.max_failed_column_fraction,
        }
    }

    /// `true` when the validation pass runs after training in `epoch`.
    pub fn is_eval_epoch(&self, epoch: usize) -> bool {
        self.evaluate && epoch % self.eval_every == self.eval_offset
    }

    /// Hyper-parameters as recorded in the `sem_params` result column.
    pub fn sem_params(&self) -> String {
        format!(
            "{{'lmda': {}, 'alfa': {}, 'kappa': {}, 'n_hidden': {}, 'lr': {}, 'var_scale': {}}}",
            self.lmda, self.alfa, self.kappa, self.n_hidden, self.learning_rate, self.var_scale
        )
    }

    /// Validate all fields and return the first problem found.
    ///
    /// # Validated invariants
    ///
    /// - `rate_ms`, `second_interval` and the priors `lmda`, `alfa` must be > 0.
    /// - `kappa` must be ≥ 0.
    /// - `epochs`, `eval_every`, `num_objects` and `scene_num_objects` must be ≥ 1.
    /// - `eval_offset` must be < `eval_every`.
    /// - The skeleton quantile band must satisfy `0 ≤ lower < upper ≤ 1`.
    /// - Survival fractions must lie in `[0, 1]`.
    /// - `min_boundary` must not exceed `max_boundary`.
    /// - `use_cache` needs a `cache_tag`; `pca` needs a `pca_tag`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        // Features
        if !(self.rate_ms > 0.0) {
            return Err(ConfigError::invalid_value("rate_ms", "must be > 0"));
        }
        if self.num_objects == 0 {
            return Err(ConfigError::invalid_value("num_objects", "must be > 0"));
        }
        if self.scene_num_objects == 0 {
            return Err(ConfigError::invalid_value("scene_num_objects", "must be > 0"));
        }
        if !(0.0..1.0).contains(&self.skel_lower_quantile)
            || !(self.skel_upper_quantile > self.skel_lower_quantile && self.skel_upper_quantile <= 1.0)
        {
            return Err(ConfigError::invalid_value(
                "skel_lower_quantile / skel_upper_quantile",
                "must satisfy 0 <= lower < upper <= 1",
            ));
        }
        if !(0.0..=1.0).contains(&self.min_column_survival) {
            return Err(ConfigError::invalid_value("min_column_survival", "must be in [0, 1]"));
        }
        if !(0.0..=1.0).contains(&self.max_failed_column_fraction) {
            return Err(ConfigError::invalid_value("max_failed_column_fraction", "must be in [0, 1]"));
        }

        // Schedule
        if self.epochs == 0 {
            return Err(ConfigError::invalid_value("epochs", "must be > 0"));
        }
        if self.eval_every == 0 {
            return Err(ConfigError::invalid_value("eval_every", "must be > 0"));
        }
        if self.eval_offset >= self.eval_every {
            return Err(ConfigError::invalid_value("eval_offset", "must be < eval_every"));
        }

        // Scoring
        if !(self.second_interval > 0.0) {
            return Err(ConfigError::invalid_value("second_interval", "must be > 0"));
        }
        if self.n_annotators == 0 {
            return Err(ConfigError::invalid_value("n_annotators", "must be > 0"));
        }
        if self.annotation_sigma < 0.0 || self.pearson_sigma < 0.0 {
            return Err(ConfigError::invalid_value(
                "annotation_sigma / pearson_sigma",
                "must be >= 0",
            ));
        }

        // Model
        if !(self.lmda >= 0.0) {
            return Err(ConfigError::invalid_value("lmda", "must be >= 0"));
        }
        if !(self.alfa > 0.0) {
            return Err(ConfigError::invalid_value("alfa", "must be > 0"));
        }
        if !(self.kappa >= 0.0) {
            return Err(ConfigError::invalid_value("kappa", "must be >= 0"));
        }
        if !(self.var_scale > 0.0) {
            return Err(ConfigError::invalid_value("var_scale", "must be > 0"));
        }

        // Cache / PCA / sampler
        if self.use_cache && self.cache_tag.is_empty() {
            return Err(ConfigError::invalid_value("cache_tag", "required when use_cache is set"));
        }
        if self.pca && self.pca_tag.is_empty() {
            return Err(ConfigError::invalid_value("pca_tag", "required when pca is set"));
        }
        if self.min_boundary > self.max_boundary {
            return Err(ConfigError::invalid_value("min_boundary", "must be <= max_boundary"));
        }
        if self.tag.is_empty() {
            return Err(ConfigError::invalid_value("tag", "must not be empty"));
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn default_config_is_valid() {
        let cfg = SemConfig::default();
        cfg.validate().expect("default config should be valid");
    }

    #[test]
    fn json_round_trip() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("config.json");

        let mut original = SemConfig::default();
        original.tag = "round_trip".into();
        original.eval_offset = 0;
        original.to_json(&path).expect("serialization should succeed");

        let loaded = SemConfig::from_json(&path).expect("deserialization should succeed");
        assert_eq!(loaded.tag, "round_trip");
        assert_eq!(loaded.eval_offset, 0);
        assert_eq!(loaded.rate_ms, original.rate_ms);
    }

    #[test]
    fn partial_json_uses_defaults() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("partial.json");
        std::fs::write(&path, r#"{"tag": "x", "epochs": 7}"#).unwrap();
        let cfg = SemConfig::from_json(&path).unwrap();
        assert_eq!(cfg.epochs, 7);
        assert_eq!(cfg.num_objects, 3);
    }

    #[test]
    fn zero_rate_is_invalid() {
        let cfg = SemConfig { rate_ms: 0.0, ..SemConfig::default() };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn offset_must_be_below_period() {
        let cfg = SemConfig { eval_every: 5, eval_offset: 5, ..SemConfig::default() };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn cache_needs_tag() {
        let cfg = SemConfig { use_cache: true, ..SemConfig::default() };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn eval_epochs_follow_offset() {
        let cfg = SemConfig::default();
        let evals: Vec<usize> = (1..=12).filter(|&e| cfg.is_eval_epoch(e)).collect();
        assert_eq!(evals, vec![1, 6, 11]);
        let alt = SemConfig { eval_offset: 0, ..SemConfig::default() };
        let evals: Vec<usize> = (1..=12).filter(|&e| alt.is_eval_epoch(e)).collect();
        assert_eq!(evals, vec![5, 10]);
    }
}
