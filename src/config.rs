//! Runtime configuration
//!
//! `TaggerConfig` is built once at process start and passed explicitly to the
//! loader, the inference engine, the orchestrator and the statistics engine.
//! It can be persisted and restored as JSON.

use crate::error::{Result, TaggerError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Frame rate of the recorded videos (frames per second)
pub const DEFAULT_FRAME_RATE: f64 = 15.0;

/// Graph samples per forward batch
pub const DEFAULT_BATCH_SIZE: usize = 1;

/// Behaviors evaluated with a single pass and a single output column
pub const DEFAULT_SYMMETRIC_BEHAVIORS: &[&str] = &["General_Contacts"];

/// Device on which graph classifiers execute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum ComputeDevice {
    Cpu,
    Accelerator { ordinal: usize },
}

/// Requested device, resolved once by [`ComputeDevice::select`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DevicePreference {
    /// Accelerator when one is available, CPU otherwise
    Auto,
    Cpu,
}

impl ComputeDevice {
    /// Choose the process-wide compute device.
    ///
    /// The bundled backend runs the graph network on the CPU; an accelerator
    /// is only reported when one is compiled in.
    pub fn select(preference: DevicePreference) -> Self {
        match preference {
            DevicePreference::Cpu => ComputeDevice::Cpu,
            DevicePreference::Auto => {
                if accelerator_available() {
                    ComputeDevice::Accelerator { ordinal: 0 }
                } else {
                    debug!("no accelerator backend available, using cpu");
                    ComputeDevice::Cpu
                }
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ComputeDevice::Cpu => "cpu",
            ComputeDevice::Accelerator { .. } => "accelerator",
        }
    }

    /// Device the forward pass will actually run on
    pub fn effective(self) -> Self {
        match self {
            ComputeDevice::Cpu => ComputeDevice::Cpu,
            ComputeDevice::Accelerator { ordinal } => {
                if accelerator_available() {
                    self
                } else {
                    warn!(ordinal, "accelerator requested but unavailable, falling back to cpu");
                    ComputeDevice::Cpu
                }
            }
        }
    }
}

fn accelerator_available() -> bool {
    false
}

/// Policy applied when the graph view and the coordinate view of a dataset
/// do not list the same videos
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlignmentPolicy {
    /// Process only videos present in both views
    #[default]
    Intersect,
    /// Abort the run before any video is processed
    FailFast,
    /// Process every video of the graph view
    GraphPrimary,
}

/// Pipeline configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaggerConfig {
    /// Directory that relative model artifact paths are resolved against
    pub model_root: PathBuf,
    /// Compute device for graph classifiers
    pub device: ComputeDevice,
    /// Graph samples per forward batch (order is always preserved)
    pub batch_size: usize,
    /// Frame rate used to convert frame counts to seconds
    pub frame_rate: f64,
    /// Behaviors that run a single pass with one output column
    pub symmetric_behaviors: Vec<String>,
    /// What to do when dataset views disagree on the video set
    pub alignment: AlignmentPolicy,
    /// Render one PNG chart per behavior when computing statistics
    pub render_plots: bool,
}

impl Default for TaggerConfig {
    fn default() -> Self {
        Self {
            model_root: PathBuf::from("."),
            device: ComputeDevice::select(DevicePreference::Auto),
            batch_size: DEFAULT_BATCH_SIZE,
            frame_rate: DEFAULT_FRAME_RATE,
            symmetric_behaviors: DEFAULT_SYMMETRIC_BEHAVIORS
                .iter()
                .map(|b| b.to_string())
                .collect(),
            alignment: AlignmentPolicy::default(),
            render_plots: true,
        }
    }
}

impl TaggerConfig {
    /// Load configuration from a JSON file; missing fields take defaults
    pub fn from_file(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let config: TaggerConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(TaggerError::Config("batch_size must be at least 1".to_string()));
        }
        if !(self.frame_rate > 0.0) {
            return Err(TaggerError::Config(format!(
                "frame_rate must be positive, got {}",
                self.frame_rate
            )));
        }
        Ok(())
    }

    /// Whether a behavior runs a single pass
    pub fn is_symmetric(&self, behavior: &str) -> bool {
        self.symmetric_behaviors.iter().any(|b| b == behavior)
    }

    /// Resolve an artifact path against the model root
    pub fn resolve_artifact(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.model_root.join(path)
        }
    }
}
