//! Error types for the SEM training loop.
//!
//! Every module of this crate imports its error type from here.
//!
//! ## Hierarchy
//!
//! ```text
//! RunError (one failed run, carries the run id)
//! └── TrainError (top-level)
//!     ├── ConfigError   (config validation / file loading)
//!     ├── FeatureError  (preprocessing / alignment, from sem-features)
//!     ├── PcaError      (dimensionality reduction)
//!     ├── ModelError    (event model input / priors)
//!     ├── ScoringError  (annotation tables, metrics)
//!     └── CacheError    (readout bundles)
//! ```

use std::error::Error as _;
use std::path::PathBuf;

use sem_features::error::FeatureError;
use thiserror::Error;

// ---------------------------------------------------------------------------
// TrainResult
// ---------------------------------------------------------------------------

/// Convenient `Result` alias used by orchestration-level functions.
pub type TrainResult<T> = Result<T, TrainError>;

// ---------------------------------------------------------------------------
// TrainError
// ---------------------------------------------------------------------------

/// Top-level error type for the training loop.
#[derive(Debug, Error)]
pub enum TrainError {
    /// A configuration validation or loading error.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A preprocessing or alignment error.
    #[error("Feature error: {0}")]
    Feature(#[from] FeatureError),

    /// A dimensionality-reduction error.
    #[error("PCA error: {0}")]
    Pca(#[from] PcaError),

    /// An event-model error.
    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    /// A scoring error.
    #[error("Scoring error: {0}")]
    Scoring(#[from] ScoringError),

    /// A readout-bundle error.
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    /// I/O error on a result or list file.
    #[error("I/O error on `{path}`: {source}")]
    Io {
        /// Path being accessed.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// CSV error on a result table.
    #[error("CSV error on `{path}`: {source}")]
    Csv {
        /// Path being accessed.
        path: PathBuf,
        /// Underlying CSV error.
        #[source]
        source: csv::Error,
    },

    /// JSON (de)serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// No rows survived alignment.
    #[error("Run `{run}` has no time range shared by all modalities")]
    NoOverlap {
        /// The run id.
        run: String,
    },

    /// A run list or argument is unusable.
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl TrainError {
    /// Construct a [`TrainError::Io`].
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        TrainError::Io { path: path.into(), source }
    }

    /// Construct a [`TrainError::Csv`].
    pub fn csv(path: impl Into<PathBuf>, source: csv::Error) -> Self {
        TrainError::Csv { path: path.into(), source }
    }

    /// Construct a [`TrainError::InvalidInput`].
    pub fn invalid_input<S: Into<String>>(msg: S) -> Self {
        TrainError::InvalidInput(msg.into())
    }
}

// ---------------------------------------------------------------------------
// RunError
// ---------------------------------------------------------------------------

/// A failure inside one scheduled run.
///
/// The scheduler records it and moves on to the next run.
#[derive(Debug, Error)]
#[error("Run `{run}` failed: {source}")]
pub struct RunError {
    /// Run id, `"{run}_{tag}"`.
    pub run: String,
    /// What went wrong.
    #[source]
    pub source: TrainError,
}

impl RunError {
    /// Wrap an error with the run id.
    pub fn new(run: impl Into<String>, source: impl Into<TrainError>) -> Self {
        Self { run: run.into(), source: source.into() }
    }

    /// The full cause chain, outermost first, one cause per line.
    pub fn chain(&self) -> String {
        let mut out = self.to_string();
        let mut cause = self.source();
        while let Some(e) = cause {
            out.push_str("\n  caused by: ");
            out.push_str(&e.to_string());
            cause = e.source();
        }
        out
    }
}

// ---------------------------------------------------------------------------
// ConfigError
// ---------------------------------------------------------------------------

/// Errors produced when loading or validating a [`SemConfig`].
///
/// [`SemConfig`]: crate::config::SemConfig
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A field has an invalid value.
    #[error("Invalid value for `{field}`: {reason}")]
    InvalidValue {
        /// Name of the field.
        field: &'static str,
        /// Human-readable reason.
        reason: String,
    },

    /// A configuration file could not be read from disk.
    #[error("Cannot read config file `{path}`: {source}")]
    FileRead {
        /// Path that was being read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A configuration file contains malformed JSON.
    #[error("Cannot parse config file `{path}`: {source}")]
    ParseError {
        /// Path that was being parsed.
        path: PathBuf,
        /// Underlying JSON parse error.
        #[source]
        source: serde_json::Error,
    },
}

impl ConfigError {
    /// Construct a [`ConfigError::InvalidValue`].
    pub fn invalid_value<S: Into<String>>(field: &'static str, reason: S) -> Self {
        ConfigError::InvalidValue { field, reason: reason.into() }
    }
}

// ---------------------------------------------------------------------------
// PcaError
// ---------------------------------------------------------------------------

/// Errors produced by the block-PCA reducer.
#[derive(Debug, Error)]
pub enum PcaError {
    /// A transform was applied to data of the wrong width.
    #[error("{context}: transform expects {expected} features, got {actual}")]
    WidthMismatch {
        /// Which transform.
        context: String,
        /// Fitted feature count.
        expected: usize,
        /// Width of the input.
        actual: usize,
    },

    /// A persisted transform could not be read or written.
    #[error("Cannot access PCA state `{path}`: {source}")]
    FileAccess {
        /// Path being accessed.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A persisted transform is malformed.
    #[error("Cannot parse PCA state `{path}`: {source}")]
    Parse {
        /// Path being parsed.
        path: PathBuf,
        /// Underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// Fitting needs at least two rows.
    #[error("Cannot fit PCA on {rows} rows")]
    NotEnoughRows {
        /// Rows supplied.
        rows: usize,
    },

    /// The requested component count is unusable.
    #[error("Invalid component selection: {0}")]
    InvalidComponents(String),

    /// The per-block layout does not partition the columns.
    #[error("Invalid block layout: {0}")]
    BlockLayout(String),
}

impl PcaError {
    /// Construct a [`PcaError::WidthMismatch`].
    pub fn width_mismatch(context: impl Into<String>, expected: usize, actual: usize) -> Self {
        PcaError::WidthMismatch { context: context.into(), expected, actual }
    }
}

// ---------------------------------------------------------------------------
// ModelError
// ---------------------------------------------------------------------------

/// Errors produced by an event model.
#[derive(Debug, Error)]
pub enum ModelError {
    /// Input rows have a different width than the model was built for.
    #[error("Model expects {expected} features, got {actual}")]
    DimensionMismatch {
        /// Expected width.
        expected: usize,
        /// Width received.
        actual: usize,
    },

    /// A prior is outside its domain.
    #[error("Invalid prior `{name}` = {value}")]
    InvalidPrior {
        /// Prior name.
        name: &'static str,
        /// Offending value.
        value: f64,
    },

    /// The input matrix cannot be segmented.
    #[error("Invalid model input: {0}")]
    InvalidInput(String),
}

// ---------------------------------------------------------------------------
// ScoringError
// ---------------------------------------------------------------------------

/// Errors produced while loading annotations or scoring a run.
#[derive(Debug, Error)]
pub enum ScoringError {
    /// An annotation table could not be read.
    #[error("Cannot read annotations `{path}`: {source}")]
    Csv {
        /// Path being read.
        path: PathBuf,
        /// Underlying CSV error.
        #[source]
        source: csv::Error,
    },

    /// No human segmentation exists for this movie and grain.
    #[error("No `{grain}` annotations for movie `{movie}`")]
    MissingMovie {
        /// Movie file name.
        movie: String,
        /// Grain name.
        grain: String,
    },

    /// Inputs to a metric are unusable.
    #[error("Invalid scoring input: {0}")]
    InvalidInput(String),
}

// ---------------------------------------------------------------------------
// CacheError
// ---------------------------------------------------------------------------

/// Errors produced while reading or writing readout bundles.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The bundle file could not be accessed.
    #[error("Cannot access bundle `{path}`: {source}")]
    Io {
        /// Path being accessed.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The bundle file is malformed.
    #[error("Cannot decode bundle `{path}`: {source}")]
    Decode {
        /// Path being decoded.
        path: PathBuf,
        /// Underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// A required table is absent from the bundle.
    #[error("Bundle `{path}` has no `{table}` table")]
    MissingTable {
        /// Bundle path.
        path: PathBuf,
        /// Table name.
        table: &'static str,
    },
}
