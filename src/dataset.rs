//! Dataset access
//!
//! The orchestrator consumes datasets through [`DatasetSource`]. Each source
//! exposes two views of the same recordings: interaction graphs for graph
//! classifiers and flat coordinate vectors for tabular classifiers.
//!
//! [`JsonLinesDataset`] reads a directory holding `graphs.jsonl` and
//! `coordinates.jsonl`, one serialized sample per line.

use crate::error::{Result, TaggerError};
use crate::types::{CoordinateSample, GraphSample};
use serde::de::DeserializeOwned;
use std::collections::{BTreeSet, HashMap};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::debug;

/// File holding the graph view
pub const GRAPHS_FILE: &str = "graphs.jsonl";
/// File holding the coordinate view
pub const COORDINATES_FILE: &str = "coordinates.jsonl";

/// Both views of a dataset
pub trait DatasetSource {
    /// Every graph sample in dataset order
    fn graph_view(&self, path: &Path) -> Result<Vec<GraphSample>>;

    /// Every coordinate sample in dataset order
    fn coordinate_view(&self, path: &Path) -> Result<Vec<CoordinateSample>>;
}

/// Directory of newline-delimited JSON samples
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonLinesDataset;

impl JsonLinesDataset {
    pub fn new() -> Self {
        Self
    }
}

impl DatasetSource for JsonLinesDataset {
    fn graph_view(&self, path: &Path) -> Result<Vec<GraphSample>> {
        read_json_lines(&path.join(GRAPHS_FILE))
    }

    fn coordinate_view(&self, path: &Path) -> Result<Vec<CoordinateSample>> {
        read_json_lines(&path.join(COORDINATES_FILE))
    }
}

fn read_json_lines<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let file = File::open(path).map_err(|e| {
        TaggerError::Dataset(format!("cannot open {}: {e}", path.display()))
    })?;

    let mut samples = Vec::new();
    for (line_num, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let sample = serde_json::from_str(&line).map_err(|e| {
            TaggerError::Dataset(format!("{}:{}: {e}", path.display(), line_num + 1))
        })?;
        samples.push(sample);
    }
    debug!(path = %path.display(), samples = samples.len(), "dataset view loaded");
    Ok(samples)
}

/// Anything tagged with its source video
pub trait VideoScoped {
    fn video(&self) -> &str;
}

impl VideoScoped for GraphSample {
    fn video(&self) -> &str {
        &self.video
    }
}

impl VideoScoped for CoordinateSample {
    fn video(&self) -> &str {
        &self.video
    }
}

/// Distinct video ids in ascending order
pub fn video_ids<T: VideoScoped>(samples: &[T]) -> BTreeSet<String> {
    samples.iter().map(|s| s.video().to_string()).collect()
}

/// Group samples by video; order within a video is the dataset order
pub fn partition_by_video<T: VideoScoped + Clone>(samples: &[T]) -> HashMap<String, Vec<T>> {
    let mut partitions: HashMap<String, Vec<T>> = HashMap::new();
    for sample in samples {
        partitions
            .entry(sample.video().to_string())
            .or_default()
            .push(sample.clone());
    }
    partitions
}
