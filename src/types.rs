//! Core sample types
//!
//! Samples are produced by the dataset collaborator and consumed read-only by
//! inference. The identity-swap transforms are pure: they return new samples
//! and never touch the input collection.

use serde::{Deserialize, Serialize};

/// Interaction graph for one frame window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphSample {
    /// Node feature rows; the last column holds the animal identity (0 or 1)
    pub x: Vec<Vec<f32>>,
    /// Directed edges as `[source, target]` node indices
    pub edge_index: Vec<[usize; 2]>,
    /// Frame index of every node row
    pub frame_mask: Vec<i64>,
    /// Source video identifier
    pub video: String,
}

impl GraphSample {
    pub fn num_nodes(&self) -> usize {
        self.x.len()
    }

    pub fn feature_width(&self) -> usize {
        self.x.first().map(|row| row.len()).unwrap_or(0)
    }

    /// Frame being classified: the lower median of the frame mask.
    ///
    /// Returns `None` for a sample without nodes.
    pub fn frame_index(&self) -> Option<i64> {
        median_frame(&self.frame_mask)
    }

    /// Rows belonging to the central frame
    pub fn central_nodes(&self) -> Vec<usize> {
        match self.frame_index() {
            Some(frame) => self
                .frame_mask
                .iter()
                .enumerate()
                .filter(|(_, f)| **f == frame)
                .map(|(i, _)| i)
                .collect(),
            None => Vec::new(),
        }
    }

    /// Exchange actor and target: every node's identity flips between the
    /// two animals. Applying it twice yields the original sample.
    pub fn swap_identities(&self) -> GraphSample {
        let x = self
            .x
            .iter()
            .map(|row| {
                let mut row = row.clone();
                if let Some(identity) = row.last_mut() {
                    *identity = 1.0 - *identity;
                }
                row
            })
            .collect();

        GraphSample {
            x,
            edge_index: self.edge_index.clone(),
            frame_mask: self.frame_mask.clone(),
            video: self.video.clone(),
        }
    }
}

/// Per-frame coordinate vector: two equal-width per-animal blocks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoordinateSample {
    pub features: Vec<f32>,
    /// Annotated label, when the dataset carries one
    #[serde(default)]
    pub label: Option<i64>,
    pub video: String,
}

impl CoordinateSample {
    /// Exchange the two animal blocks. Applying it twice yields the original.
    ///
    /// For an odd width the middle value stays in place.
    pub fn swap_identities(&self) -> CoordinateSample {
        CoordinateSample {
            features: swap_halves(&self.features),
            label: self.label,
            video: self.video.clone(),
        }
    }
}

/// Swap identities on every graph sample
pub fn swap_graph_identities(samples: &[GraphSample]) -> Vec<GraphSample> {
    samples.iter().map(GraphSample::swap_identities).collect()
}

/// Swap identities on every coordinate sample
pub fn swap_coordinate_identities(samples: &[CoordinateSample]) -> Vec<CoordinateSample> {
    samples.iter().map(CoordinateSample::swap_identities).collect()
}

fn swap_halves(values: &[f32]) -> Vec<f32> {
    let half = values.len() / 2;
    if values.len() % 2 == 0 {
        let mut swapped = Vec::with_capacity(values.len());
        swapped.extend_from_slice(&values[half..]);
        swapped.extend_from_slice(&values[..half]);
        swapped
    } else {
        // [a m b] -> [b m a]
        let mut swapped = Vec::with_capacity(values.len());
        swapped.extend_from_slice(&values[half + 1..]);
        swapped.push(values[half]);
        swapped.extend_from_slice(&values[..half]);
        swapped
    }
}

/// Lower median of a set of frame indices
pub fn median_frame(frames: &[i64]) -> Option<i64> {
    if frames.is_empty() {
        return None;
    }
    let mut sorted = frames.to_vec();
    sorted.sort_unstable();
    Some(sorted[(sorted.len() - 1) / 2])
}
