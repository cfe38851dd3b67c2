//! Behavior model registry
//!
//! Static mapping from behavior name to the model that classifies it. The
//! registry is immutable once built; insertion order defines the column
//! order of merged per-video outputs.

use crate::error::{Result, TaggerError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Pooling strategy that reduces the central frame's node embeddings to one
/// embedding per sample
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Readout {
    #[default]
    Mean,
    Max,
    Concatenate,
}

impl Readout {
    pub fn as_str(&self) -> &'static str {
        match self {
            Readout::Mean => "mean",
            Readout::Max => "max",
            Readout::Concatenate => "concatenate",
        }
    }
}

/// Hyperparameters of the graph attention encoder
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EncoderParams {
    /// Node feature width (identity included)
    pub n_in: usize,
    /// Hidden width per attention head
    pub n_hidden: usize,
    /// Attention heads
    pub heads: usize,
    /// Output embedding width
    pub n_out: usize,
    /// Training-time dropout, inactive at inference
    pub dropout: f32,
}

impl Default for EncoderParams {
    fn default() -> Self {
        Self {
            n_in: 4,
            n_hidden: 32,
            heads: 2,
            n_out: 64,
            dropout: 0.2,
        }
    }
}

/// Hyperparameters of the classification head
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HeadParams {
    pub n_latent: usize,
    pub n_hidden: usize,
    pub n_out: usize,
}

impl Default for HeadParams {
    fn default() -> Self {
        Self {
            n_latent: 64,
            n_hidden: 32,
            n_out: 2,
        }
    }
}

/// How a behavior is classified
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum ModelKind {
    /// Graph attention classifier restored from a checkpoint
    Graph {
        checkpoint: PathBuf,
        #[serde(default)]
        readout: Readout,
        #[serde(default)]
        encoder: EncoderParams,
        #[serde(default)]
        head: HeadParams,
    },
    /// Pre-fit classifier over raw coordinate vectors
    Tabular { artifact: PathBuf },
    /// Not evaluated; reported as all zeros
    Disabled,
}

/// One registry entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BehaviorDescriptor {
    pub name: String,
    #[serde(flatten)]
    pub kind: ModelKind,
}

impl BehaviorDescriptor {
    pub fn graph(name: &str, checkpoint: impl Into<PathBuf>, readout: Readout) -> Self {
        Self {
            name: name.to_string(),
            kind: ModelKind::Graph {
                checkpoint: checkpoint.into(),
                readout,
                encoder: EncoderParams::default(),
                head: HeadParams::default(),
            },
        }
    }

    pub fn tabular(name: &str, artifact: impl Into<PathBuf>) -> Self {
        Self {
            name: name.to_string(),
            kind: ModelKind::Tabular {
                artifact: artifact.into(),
            },
        }
    }

    pub fn disabled(name: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: ModelKind::Disabled,
        }
    }

    pub fn enabled(&self) -> bool {
        !matches!(self.kind, ModelKind::Disabled)
    }

    /// Whether the behavior consumes graph samples (otherwise coordinates)
    pub fn uses_graphs(&self) -> bool {
        matches!(self.kind, ModelKind::Graph { .. })
    }
}

/// Immutable behavior registry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelRegistry {
    behaviors: Vec<BehaviorDescriptor>,
}

impl Default for ModelRegistry {
    /// The production table: contacts from the graph model, everything else
    /// from the baseline tabular models
    fn default() -> Self {
        const BASELINES: &str = "models/baseline_models/new_dataset";
        let tabular = |name: &str, file: &str| {
            BehaviorDescriptor::tabular(name, Path::new(BASELINES).join(file))
        };

        Self {
            behaviors: vec![
                BehaviorDescriptor::graph(
                    "General_Contacts",
                    "models/GATmodels/GeneralContact_checkpoint_epoch_610",
                    Readout::Mean,
                ),
                tabular("Sniffing", "model_sniffR.json"),
                tabular("Sniffing_head", "model_Shead.json"),
                tabular("Sniffing_body", "model_Sbody.json"),
                tabular("Following", "model_poursuitR.json"),
                tabular("Dominance", "model_domR.json"),
                tabular("Grooming", "model_groomR.json"),
            ],
        }
    }
}

impl ModelRegistry {
    /// Build a registry; behavior names must be unique
    pub fn new(behaviors: Vec<BehaviorDescriptor>) -> Result<Self> {
        for (i, behavior) in behaviors.iter().enumerate() {
            if behaviors[..i].iter().any(|b| b.name == behavior.name) {
                return Err(TaggerError::Config(format!(
                    "duplicate behavior in registry: {}",
                    behavior.name
                )));
            }
        }
        Ok(Self { behaviors })
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let parsed: ModelRegistry = serde_json::from_str(json)?;
        Self::new(parsed.behaviors)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Look up a behavior descriptor
    pub fn get(&self, name: &str) -> Result<&BehaviorDescriptor> {
        self.behaviors
            .iter()
            .find(|b| b.name == name)
            .ok_or_else(|| TaggerError::UnknownBehavior(name.to_string()))
    }

    pub fn iter(&self) -> impl Iterator<Item = &BehaviorDescriptor> {
        self.behaviors.iter()
    }

    pub fn names(&self) -> Vec<&str> {
        self.behaviors.iter().map(|b| b.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.behaviors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.behaviors.is_empty()
    }
}
