//! # SEM feature pipeline
//!
//! Loads the per-modality feature streams of one recorded run (appearance,
//! optical flow, skeleton motion, object-hand and scene embeddings), normalises
//! each of them, and aligns them into a single [`CombinedFeatureMatrix`]
//! sampled on a fixed wall-clock grid.
//!
//! ## Architecture
//!
//! ```text
//! *_appear.csv ──────► preprocess_appear ─────┐
//! *_video_features.csv ► preprocess_optical ──┤
//! *_skel_features.csv ─► preprocess_skel ─────┤  FeatureTable (per modality, own fps)
//!                          ▲ SkeletonReference│
//! *_objhand.csv ───────► preprocess_objhand ──┤
//!                          ▲ WordEmbeddings   │
//!                                             ▼
//!                                   align::combine_tables
//!                                             │
//!                                             ▼
//!                                  CombinedFeatureMatrix
//! ```
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::path::Path;
//! use sem_features::align::{combine_tables, AlignOptions};
//! use sem_features::preprocess::{preprocess_appear, preprocess_optical, Scaling};
//!
//! let appear = preprocess_appear(Path::new("1.1.1_kinect_appear.csv"), 25.0).unwrap();
//! let optical = preprocess_optical(Path::new("1.1.1_kinect_video_features.csv"), 25.0, Scaling::ZScore).unwrap();
//! let aligned = combine_tables(&[appear, optical], &AlignOptions::new(40.0, 25.0)).unwrap();
//! println!("{} aligned rows", aligned.matrix.n_rows());
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod align;
pub mod embedding;
pub mod error;
pub mod normalize;
pub mod preprocess;
pub mod table;

pub use align::{combine_tables, interpolate_frames, AlignOptions, Alignment, ColumnBlock, CombinedFeatureMatrix};
pub use embedding::{
    preprocess_objhand, CategoryTable, DistanceMode, ObjectEmbeddingOptions, WordEmbeddings,
};
pub use error::{AlignError, EmbeddingError, FeatureError};
pub use preprocess::{
    preprocess_appear, preprocess_optical, preprocess_skel, Scaling, SkeletonOptions, SkeletonReference,
};
pub use table::FeatureTable;

/// Crate version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
