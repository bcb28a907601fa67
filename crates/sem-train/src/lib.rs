//! # SEM Training Loop
//!
//! Online event segmentation over aligned multi-modal features. The crate
//! schedules runs, reduces each run's aligned matrix, feeds it to an event
//! model and scores the inferred boundaries and events against human
//! annotations.
//!
//! ## Architecture
//!
//! ```text
//! SemConfig ──► Trainer ──► RunSampler (RoundRobin | QualityWeighted)
//!                  │
//!                  ├─► sem_features (preprocess + combine_tables) ◄─┐
//!                  │                                                │
//!                  ├─► ReadoutBundle cache (use_cache) ─────────────┘
//!                  │
//!                  ├─► Reducer (global | per-block PCA)
//!                  │
//!                  ├─► EventModel (PrototypeEventModel)
//!                  │
//!                  └─► metrics + annotations ──► ResultsWriter
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use sem_train::config::SemConfig;
//! use sem_train::trainer::Trainer;
//!
//! let mut config = SemConfig::default();
//! config.train = "train.txt".into();
//! config.valid = "valid.txt".into();
//!
//! let mut trainer = Trainer::new(config).expect("trainer setup");
//! let summary = trainer.iterate().expect("result files are writable");
//! println!("{} runs failed", summary.failed);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod annotations;
pub mod cache;
pub mod config;
pub mod error;
pub mod lists;
pub mod metrics;
pub mod model;
pub mod pca;
pub mod results;
pub mod sampler;
pub mod trainer;

// Convenient re-exports at the crate root.
pub use cache::ReadoutBundle;
pub use config::SemConfig;
pub use error::{ConfigError, RunError, TrainError, TrainResult};
pub use model::{BoundaryKind, EventModel, PrototypeEventModel, SegmentationPriors, SegmentationResult};
pub use pca::{ComponentSelection, Reducer};
pub use sampler::{QualityHistory, QualityWeightedSampler, RoundRobinSampler, RunSampler};
pub use trainer::{RunContext, RunOutcome, Trainer};

/// Crate version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
