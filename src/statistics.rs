//! Bout statistics
//!
//! Reduces merged per-video prediction files to per-behavior summaries:
//! latency, duration, number of bouts and the distribution of positive
//! frames over ten equal chunks of the recording.
//!
//! Every reducer assumes binary 0/1 labels.

use crate::config::TaggerConfig;
use crate::error::{Result, TaggerError};
use crate::gnn::argmax;
use crate::orchestrator::OUTPUT_SUFFIX;
use crate::plot;
use crate::table::PredictionTable;
use serde::Serialize;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Number of chunks in a distribution
pub const DECILES: usize = 10;

/// Field delimiter of statistics outputs
pub const STATISTICS_DELIMITER: u8 = b';';

/// Summary of one behavior column in one video
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BoutStatistics {
    pub video: String,
    pub behavior: String,
    pub latency: usize,
    #[serde(rename = "duration (s)")]
    pub duration_seconds: f64,
    #[serde(rename = "duration (frames)")]
    pub duration_frames: i64,
    #[serde(rename = "number_of_occurrences")]
    pub occurrences: usize,
}

/// Positive frames per tenth of a recording
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DecileDistribution {
    pub behavior: String,
    pub deciles: [i64; DECILES],
}

/// Row of the first maximum.
///
/// A column without any positive frame has its maximum at row 0, so its
/// latency is 0 as well; check `duration_frames` to tell the cases apart.
pub fn latency(values: &[i64]) -> usize {
    argmax(values)
}

pub fn duration_frames(values: &[i64]) -> i64 {
    values.iter().sum()
}

pub fn duration_seconds(frames: i64, frame_rate: f64) -> f64 {
    frames as f64 / frame_rate
}

/// Number of 0 -> 1 transitions
pub fn number_of_occurrences(values: &[i64]) -> usize {
    values
        .windows(2)
        .filter(|w| w[0] == 0 && w[1] == 1)
        .count()
}

/// Sum of each of ten contiguous chunks of `len / 10` rows.
///
/// Trailing rows beyond `10 * (len / 10)` are not counted.
pub fn decile_distribution(values: &[i64]) -> [i64; DECILES] {
    let chunk = values.len() / DECILES;
    let mut deciles = [0; DECILES];
    if chunk == 0 {
        return deciles;
    }
    for (decile, rows) in deciles.iter_mut().zip(values.chunks_exact(chunk)) {
        *decile = rows.iter().sum();
    }
    deciles
}

/// Statistics of every behavior column of one merged table
pub fn summarize(video: &str, table: &PredictionTable, frame_rate: f64) -> Vec<(BoutStatistics, DecileDistribution)> {
    table
        .columns()
        .iter()
        .map(|column| {
            let frames = duration_frames(&column.values);
            let stats = BoutStatistics {
                video: video.to_string(),
                behavior: column.name.clone(),
                latency: latency(&column.values),
                duration_seconds: duration_seconds(frames, frame_rate),
                duration_frames: frames,
                occurrences: number_of_occurrences(&column.values),
            };
            let distribution = DecileDistribution {
                behavior: column.name.clone(),
                deciles: decile_distribution(&column.values),
            };
            (stats, distribution)
        })
        .collect()
}

/// Merged outputs in a directory as `(video, path)`, sorted by file name
pub fn discover_outputs(dir: &Path) -> Result<Vec<(String, PathBuf)>> {
    let mut outputs = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        let video = path
            .file_name()
            .and_then(|name| name.to_str())
            .and_then(|name| name.strip_suffix(OUTPUT_SUFFIX));
        if let Some(video) = video.filter(|v| !v.is_empty()) {
            outputs.push((video.to_string(), path.clone()));
        }
    }
    outputs.sort_by(|a, b| a.1.cmp(&b.1));
    Ok(outputs)
}

fn write_statistics(path: &Path, rows: &[BoutStatistics]) -> Result<()> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(STATISTICS_DELIMITER)
        .has_headers(false)
        .from_writer(File::create(path)?);
    writer.write_record([
        "video",
        "behavior",
        "latency",
        "duration (s)",
        "duration (frames)",
        "number_of_occurrences",
    ])?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

fn write_distribution(path: &Path, rows: &[DecileDistribution]) -> Result<()> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(STATISTICS_DELIMITER)
        .from_writer(File::create(path)?);

    let mut header = vec!["Behavior".to_string()];
    header.extend((0..DECILES).map(|i| format!("decil {i}")));
    writer.write_record(&header)?;

    for row in rows {
        let mut record = vec![row.behavior.clone()];
        record.extend(row.deciles.iter().map(|d| d.to_string()));
        writer.write_record(&record)?;
    }
    writer.flush()?;
    Ok(())
}

/// Computes and writes statistics for a directory of merged outputs
pub struct StatisticsEngine<'a> {
    config: &'a TaggerConfig,
}

impl<'a> StatisticsEngine<'a> {
    pub fn new(config: &'a TaggerConfig) -> Self {
        Self { config }
    }

    /// Process every `<video>_output.csv` in `dir`.
    ///
    /// Writes, per video, `<dir>/<video>/statistics.csv`,
    /// `<dir>/<video>/distribution.csv` and one
    /// `<dir>/<video>/<behavior>_distribution.png` per column, then the
    /// aggregate `<dir>/statistics.csv`. Returns the aggregate rows.
    pub fn compute_statistics(&self, dir: &Path) -> Result<Vec<BoutStatistics>> {
        let outputs = discover_outputs(dir)?;
        if outputs.is_empty() {
            return Err(TaggerError::InvalidTable(format!(
                "no *{OUTPUT_SUFFIX} files in {}",
                dir.display()
            )));
        }

        let mut all = Vec::new();
        for (video, path) in outputs {
            let table = PredictionTable::load(&path)?;
            let video_dir = dir.join(&video);
            fs::create_dir_all(&video_dir)?;

            let (stats, distributions): (Vec<_>, Vec<_>) =
                summarize(&video, &table, self.config.frame_rate).into_iter().unzip();

            if self.config.render_plots {
                for distribution in &distributions {
                    let png = video_dir.join(format!("{}_distribution.png", distribution.behavior));
                    plot::render_distribution(&png, distribution)?;
                }
            }
            write_distribution(&video_dir.join("distribution.csv"), &distributions)?;
            write_statistics(&video_dir.join("statistics.csv"), &stats)?;
            debug!(video = %video, behaviors = stats.len(), frames = table.len(), "statistics written");

            all.extend(stats);
        }

        write_statistics(&dir.join("statistics.csv"), &all)?;
        info!(dir = %dir.display(), rows = all.len(), "aggregate statistics written");
        Ok(all)
    }
}
