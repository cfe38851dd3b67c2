//! Multi-video orchestration
//!
//! Pipeline stages per run:
//! 1. Load both dataset views
//! 2. Check that the views agree on the video set
//! 3. Partition samples by video
//! 4. Infer every registered behavior on the matching view
//! 5. Merge the behavior tables on frame and write `<video>_output.csv`

use crate::config::{AlignmentPolicy, TaggerConfig};
use crate::dataset::{partition_by_video, video_ids, DatasetSource};
use crate::error::{Result, TaggerError};
use crate::inference::{BehaviorInput, InferenceEngine};
use crate::registry::ModelRegistry;
use crate::table::PredictionTable;
use crate::types::{CoordinateSample, GraphSample};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};
use uuid::Uuid;

/// Suffix of per-video merged prediction files
pub const OUTPUT_SUFFIX: &str = "_output.csv";

/// Raised when the graph and coordinate views list different videos
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DatasetAlignmentWarning {
    /// Videos only present in the graph view
    pub graph_only: Vec<String>,
    /// Videos only present in the coordinate view
    pub coordinate_only: Vec<String>,
    pub policy: AlignmentPolicy,
}

impl fmt::Display for DatasetAlignmentWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "graph-only videos {:?}, coordinate-only videos {:?}",
            self.graph_only, self.coordinate_only
        )
    }
}

/// Compare the video sets of both views and choose the videos to process
pub fn align_videos(
    graph_videos: &BTreeSet<String>,
    coordinate_videos: &BTreeSet<String>,
    policy: AlignmentPolicy,
) -> Result<(Vec<String>, Option<DatasetAlignmentWarning>)> {
    if graph_videos == coordinate_videos {
        return Ok((graph_videos.iter().cloned().collect(), None));
    }

    let warning = DatasetAlignmentWarning {
        graph_only: graph_videos.difference(coordinate_videos).cloned().collect(),
        coordinate_only: coordinate_videos.difference(graph_videos).cloned().collect(),
        policy,
    };
    let videos = match policy {
        AlignmentPolicy::FailFast => return Err(TaggerError::DatasetMisaligned(warning.to_string())),
        AlignmentPolicy::Intersect => graph_videos.intersection(coordinate_videos).cloned().collect(),
        AlignmentPolicy::GraphPrimary => graph_videos.iter().cloned().collect(),
    };
    Ok((videos, Some(warning)))
}

/// Result of processing one video
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VideoOutcome {
    pub video: String,
    /// Rows written to the merged output
    pub frames: usize,
    pub output: Option<PathBuf>,
    pub error: Option<String>,
}

impl VideoOutcome {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Summary of one orchestration run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub warnings: Vec<DatasetAlignmentWarning>,
    pub videos: Vec<VideoOutcome>,
}

impl RunReport {
    pub fn failed(&self) -> impl Iterator<Item = &VideoOutcome> {
        self.videos.iter().filter(|v| !v.succeeded())
    }

    pub fn has_failures(&self) -> bool {
        self.failed().next().is_some()
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Runs every registered behavior over every video of a dataset
pub struct Orchestrator<'a, D: DatasetSource> {
    engine: InferenceEngine<'a>,
    config: &'a TaggerConfig,
    dataset: D,
}

impl<'a, D: DatasetSource> Orchestrator<'a, D> {
    pub fn new(registry: &'a ModelRegistry, config: &'a TaggerConfig, dataset: D) -> Self {
        Self {
            engine: InferenceEngine::new(registry, config),
            config,
            dataset,
        }
    }

    /// Process the whole dataset, writing one merged CSV per video.
    ///
    /// A video whose inference fails is recorded in the report and the run
    /// moves on; only dataset-level failures abort.
    pub fn run_all(&self, dataset_path: &Path, output_path: &Path) -> Result<RunReport> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        info!(%run_id, dataset = %dataset_path.display(), "starting run");

        // Stage 1: both views
        let graphs = self.dataset.graph_view(dataset_path)?;
        let coordinates = self.dataset.coordinate_view(dataset_path)?;

        // Stage 2: alignment
        let (videos, warning) = align_videos(
            &video_ids(&graphs),
            &video_ids(&coordinates),
            self.config.alignment,
        )?;
        let warnings: Vec<DatasetAlignmentWarning> = warning.into_iter().collect();
        for warning in &warnings {
            warn!(policy = ?warning.policy, "dataset views disagree: {warning}");
        }

        // Stage 3: partition
        let graph_parts = partition_by_video(&graphs);
        let coordinate_parts = partition_by_video(&coordinates);

        fs::create_dir_all(output_path)?;

        // Stages 4 and 5, one video at a time
        let mut outcomes = Vec::with_capacity(videos.len());
        for video in videos {
            let video_graphs = graph_parts.get(&video).map(Vec::as_slice).unwrap_or(&[]);
            let video_coordinates = coordinate_parts
                .get(&video)
                .map(Vec::as_slice)
                .unwrap_or(&[]);

            let outcome = match self.process_video(&video, video_graphs, video_coordinates, output_path) {
                Ok((frames, output)) => {
                    info!(video = %video, frames, output = %output.display(), "video done");
                    VideoOutcome {
                        video,
                        frames,
                        output: Some(output),
                        error: None,
                    }
                }
                Err(e) => {
                    error!(video = %video, error = %e, "video failed");
                    VideoOutcome {
                        video,
                        frames: 0,
                        output: None,
                        error: Some(e.to_string()),
                    }
                }
            };
            outcomes.push(outcome);
        }

        Ok(RunReport {
            run_id,
            started_at,
            finished_at: Utc::now(),
            warnings,
            videos: outcomes,
        })
    }

    fn process_video(
        &self,
        video: &str,
        graphs: &[GraphSample],
        coordinates: &[CoordinateSample],
        output_path: &Path,
    ) -> Result<(usize, PathBuf)> {
        let registry = self.engine.registry();
        let mut tables = Vec::with_capacity(registry.len());
        for descriptor in registry.iter() {
            let input = if descriptor.uses_graphs() {
                BehaviorInput::Graphs(graphs)
            } else {
                BehaviorInput::Coordinates(coordinates)
            };
            tables.push(self.engine.infer(&descriptor.name, input)?);
        }

        let mut merged = PredictionTable::outer_join(&tables)?;
        merged.sort_by_frame();

        let output = output_path.join(format!("{video}{OUTPUT_SUFFIX}"));
        merged.save(&output)?;
        Ok((merged.len(), output))
    }
}
