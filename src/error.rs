//! Error types for Behavior Tagger

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while resolving models, running inference or
/// reducing outputs to statistics
#[derive(Debug, Error)]
pub enum TaggerError {
    #[error("Unknown behavior: {0}")]
    UnknownBehavior(String),

    #[error("Failed to load checkpoint {path}: {reason}")]
    CheckpointLoad { path: PathBuf, reason: String },

    #[error("Model artifact not found: {0}")]
    ArtifactNotFound(PathBuf),

    #[error("Failed to load model artifact {path}: {reason}")]
    ArtifactLoad { path: PathBuf, reason: String },

    #[error("Inference failed for {behavior}: {reason}")]
    InferenceCompute { behavior: String, reason: String },

    #[error("Dataset views disagree on videos: {0}")]
    DatasetMisaligned(String),

    #[error("Dataset error: {0}")]
    Dataset(String),

    #[error("Invalid prediction table: {0}")]
    InvalidTable(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Plot rendering failed: {0}")]
    Plot(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl TaggerError {
    pub(crate) fn inference(behavior: &str, reason: impl Into<String>) -> Self {
        TaggerError::InferenceCompute {
            behavior: behavior.to_string(),
            reason: reason.into(),
        }
    }
}

/// Convenience alias used throughout the crate
pub type Result<T> = std::result::Result<T, TaggerError>;
