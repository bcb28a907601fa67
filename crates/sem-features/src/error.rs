//! Error types for the feature pipeline.
//!
//! ## Hierarchy
//!
//! ```text
//! FeatureError (loading, preprocessing)
//! ├── EmbeddingError  (word-vector store and lookups)
//! └── AlignError      (densify / combine / resample)
//! ```

use std::path::PathBuf;
use thiserror::Error;

// ---------------------------------------------------------------------------
// FeatureError
// ---------------------------------------------------------------------------

/// Errors produced while loading or preprocessing one modality.
#[derive(Debug, Error)]
pub enum FeatureError {
    /// A CSV source could not be opened or decoded.
    #[error("Cannot read `{path}`: {source}")]
    Csv {
        /// Path being read.
        path: PathBuf,
        /// Underlying CSV error.
        #[source]
        source: csv::Error,
    },

    /// The file was read but its content does not have the expected layout.
    #[error("Invalid data format in `{path}`: {message}")]
    InvalidFormat {
        /// Path of the malformed file.
        path: PathBuf,
        /// Description of the problem.
        message: String,
    },

    /// A table was constructed from inconsistent parts.
    #[error("Invalid table `{table}`: {message}")]
    InvalidTable {
        /// Table name.
        table: String,
        /// Description of the problem.
        message: String,
    },

    /// The global skeleton reference lacks a column present in the run.
    #[error("Skeleton reference has no column `{column}`")]
    MissingReferenceColumn {
        /// The column name.
        column: String,
    },

    /// Too many skeleton columns lost their rows to outlier masking.
    #[error(
        "Skeleton source `{source_name}` has {failed} of {total} columns with at most \
         {min_survival} of rows inside the reference band"
    )]
    SkeletonQuality {
        /// Name of the offending source.
        source_name: String,
        /// Number of failing columns.
        failed: usize,
        /// Number of columns checked.
        total: usize,
        /// Required surviving fraction per column.
        min_survival: f64,
    },

    /// An embedding lookup failed.
    #[error(transparent)]
    Embedding(#[from] EmbeddingError),

    /// Alignment failed.
    #[error(transparent)]
    Align(#[from] AlignError),
}

impl FeatureError {
    /// Construct a [`FeatureError::InvalidFormat`].
    pub fn invalid_format<S: Into<String>>(path: impl Into<PathBuf>, msg: S) -> Self {
        FeatureError::InvalidFormat { path: path.into(), message: msg.into() }
    }

    /// Construct a [`FeatureError::InvalidTable`].
    pub fn invalid_table<S: Into<String>>(table: impl Into<String>, msg: S) -> Self {
        FeatureError::InvalidTable { table: table.into(), message: msg.into() }
    }
}

// ---------------------------------------------------------------------------
// EmbeddingError
// ---------------------------------------------------------------------------

/// Errors produced by the word-embedding store.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    /// The embedding file could not be read.
    #[error("Cannot read embeddings `{path}`: {source}")]
    FileRead {
        /// Path being read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A line of the embedding file is malformed.
    #[error("Malformed embedding at `{path}` line {line}: {message}")]
    Parse {
        /// Path being parsed.
        path: PathBuf,
        /// 1-based line number.
        line: usize,
        /// Description of the problem.
        message: String,
    },

    /// The store holds no vectors.
    #[error("Embedding store is empty")]
    Empty,

    /// A vector has a different dimension than the rest of the store.
    #[error("Vector for `{word}` has dimension {actual}, expected {expected}")]
    DimensionMismatch {
        /// Offending word.
        word: String,
        /// Store dimension.
        expected: usize,
        /// Dimension found.
        actual: usize,
    },

    /// Neither the phrase nor one of its words is in the vocabulary.
    #[error("No embedding for word `{word}` (category `{category}`)")]
    UnknownWord {
        /// The word that failed.
        word: String,
        /// The category it came from.
        category: String,
    },
}

// ---------------------------------------------------------------------------
// AlignError
// ---------------------------------------------------------------------------

/// Errors produced by the temporal aligner.
#[derive(Debug, Error)]
pub enum AlignError {
    /// Nothing to align.
    #[error("No feature tables to align")]
    NoTables,

    /// The resampling interval is not usable.
    #[error("Resampling interval must be > 0 ms, got {0}")]
    InvalidRate(f64),

    /// A table (or the reference) has a non-positive frame rate.
    #[error("Table `{table}` has invalid fps {fps}")]
    InvalidFps {
        /// Table name.
        table: String,
        /// The fps value.
        fps: f64,
    },

    /// Missing values survived alignment.
    #[error("{count} missing values remain after alignment")]
    MissingValues {
        /// Number of missing cells.
        count: usize,
    },

    /// Pre-aligned tables disagree on their frame index.
    #[error("Table `{table}` is not aligned with `{reference}`")]
    IndexMismatch {
        /// Offending table.
        table: String,
        /// Table it was compared with.
        reference: String,
    },
}
