//! Checkpoint restoration for graph classifiers
//!
//! A checkpoint is a JSON document holding a `model_state_dict` that maps
//! parameter names to dense tensors:
//!
//! ```json
//! {
//!   "epoch": 610,
//!   "model_state_dict": {
//!     "encoder.gatenc1.lin_l.weight": { "shape": [64, 4], "data": [0.1, ...] }
//!   }
//! }
//! ```
//!
//! Loading is strict: every parameter of the constructed architecture must
//! be present with the same shape, and no extra tensors are accepted.

use crate::error::{Result, TaggerError};
use crate::gnn::GraphClassifier;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;
use tracing::debug;

/// Dense row-major tensor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TensorData {
    pub shape: Vec<usize>,
    pub data: Vec<f32>,
}

impl TensorData {
    pub fn new(shape: Vec<usize>, data: Vec<f32>) -> Self {
        Self { shape, data }
    }

    pub fn zeros(shape: &[usize]) -> Self {
        Self {
            shape: shape.to_vec(),
            data: vec![0.0; shape.iter().product()],
        }
    }

    fn element_count(&self) -> usize {
        self.shape.iter().product()
    }
}

/// Parameter name to tensor
pub type StateDict = BTreeMap<String, TensorData>;

/// Serialized training checkpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    #[serde(default)]
    pub epoch: Option<u64>,
    pub model_state_dict: StateDict,
}

impl Checkpoint {
    pub fn from_file(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path).map_err(|e| TaggerError::CheckpointLoad {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        serde_json::from_str(&json).map_err(|e| TaggerError::CheckpointLoad {
            path: path.to_path_buf(),
            reason: format!("malformed checkpoint: {e}"),
        })
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Snapshot the parameters of a model
    pub fn from_model(model: &mut GraphClassifier, epoch: Option<u64>) -> Self {
        let model_state_dict = model
            .params_mut()
            .into_iter()
            .map(|(name, view)| {
                let tensor = TensorData::new(view.shape().to_vec(), view.iter().copied().collect());
                (name, tensor)
            })
            .collect();
        Self {
            epoch,
            model_state_dict,
        }
    }
}

/// Copy a state dict into a constructed model.
///
/// Returns a description of the first mismatch on failure.
pub fn load_state_dict(model: &mut GraphClassifier, state: &StateDict) -> std::result::Result<(), String> {
    let mut expected = BTreeSet::new();

    for (name, mut view) in model.params_mut() {
        let tensor = state
            .get(&name)
            .ok_or_else(|| format!("missing key in state dict: {name}"))?;
        if tensor.shape.as_slice() != view.shape() {
            return Err(format!(
                "size mismatch for {name}: checkpoint has {:?}, model expects {:?}",
                tensor.shape,
                view.shape()
            ));
        }
        if tensor.data.len() != tensor.element_count() {
            return Err(format!(
                "tensor {name} declares shape {:?} but holds {} values",
                tensor.shape,
                tensor.data.len()
            ));
        }
        // both sides are row-major
        for (dst, src) in view.iter_mut().zip(tensor.data.iter()) {
            *dst = *src;
        }
        expected.insert(name);
    }

    if let Some(extra) = state.keys().find(|k| !expected.contains(*k)) {
        return Err(format!("unexpected key in state dict: {extra}"));
    }
    Ok(())
}

/// Restore a model's weights from a checkpoint file
pub fn restore(model: &mut GraphClassifier, path: &Path) -> Result<()> {
    let checkpoint = Checkpoint::from_file(path)?;
    load_state_dict(model, &checkpoint.model_state_dict).map_err(|reason| {
        TaggerError::CheckpointLoad {
            path: path.to_path_buf(),
            reason,
        }
    })?;
    debug!(
        path = %path.display(),
        epoch = ?checkpoint.epoch,
        tensors = checkpoint.model_state_dict.len(),
        "restored graph classifier"
    );
    Ok(())
}
