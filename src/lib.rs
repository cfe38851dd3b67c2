//! Behavior Tagger - Frame-level social behavior classification for pairs of tracked animals
//!
//! The tagger turns pose-derived samples into per-frame behavior labels and
//! bout statistics through a deterministic pipeline: model resolution →
//! per-behavior inference (one pass per actor role) → per-video merge →
//! statistics and distribution charts.
//!
//! ## Modules
//!
//! - **Models**: registry, graph attention classifier, tabular baselines
//! - **Pipeline**: inference engine, multi-video orchestrator
//! - **Reporting**: bout statistics, decile distributions, charts

pub mod checkpoint;
pub mod config;
pub mod dataset;
pub mod error;
pub mod gnn;
pub mod inference;
pub mod loader;
pub mod orchestrator;
pub mod plot;
pub mod registry;
pub mod statistics;
pub mod table;
pub mod tabular;
pub mod types;

pub use config::{AlignmentPolicy, ComputeDevice, DevicePreference, TaggerConfig};
pub use dataset::{DatasetSource, JsonLinesDataset};
pub use error::TaggerError;
pub use inference::{BehaviorInput, InferenceEngine};
pub use loader::{ModelLoader, Predictor};
pub use orchestrator::{DatasetAlignmentWarning, Orchestrator, RunReport, VideoOutcome};
pub use registry::{BehaviorDescriptor, ModelKind, ModelRegistry, Readout};
pub use statistics::{BoutStatistics, DecileDistribution, StatisticsEngine};
pub use table::PredictionTable;
pub use types::{CoordinateSample, GraphSample};

/// Tagger version recorded in run reports
pub const TAGGER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name for run reports
pub const PRODUCER_NAME: &str = "behavior-tagger";
