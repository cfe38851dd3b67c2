//! Tagger CLI - Command-line interface for Behavior Tagger
//!
//! Commands:
//! - infer: Label every video of a dataset and write merged per-video outputs
//! - stats: Reduce merged outputs to bout statistics and distributions
//! - registry: List the configured behaviors and their models
//! - doctor: Diagnose configuration and model artifacts

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use behavior_tagger::registry::ModelKind;
use behavior_tagger::{
    JsonLinesDataset, ModelRegistry, Orchestrator, StatisticsEngine, TaggerConfig, TaggerError,
    PRODUCER_NAME, TAGGER_VERSION,
};

/// Tagger - Frame-level social behavior classification
#[derive(Parser)]
#[command(name = "tagger")]
#[command(version = TAGGER_VERSION)]
#[command(about = "Classify social behaviors frame by frame and summarize bouts", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every registered behavior over a dataset
    Infer {
        /// Dataset directory (graphs.jsonl and coordinates.jsonl)
        #[arg(short, long)]
        dataset: PathBuf,

        /// Directory receiving <video>_output.csv files
        #[arg(short, long)]
        output: PathBuf,

        /// Configuration file (JSON)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Behavior registry file (JSON); defaults to the built-in table
        #[arg(long)]
        registry: Option<PathBuf>,
    },

    /// Compute bout statistics from merged outputs
    Stats {
        /// Directory holding <video>_output.csv files
        #[arg(short, long)]
        output: PathBuf,

        /// Configuration file (JSON)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Skip PNG distribution charts
        #[arg(long)]
        no_plots: bool,
    },

    /// List registered behaviors
    Registry {
        /// Behavior registry file (JSON)
        #[arg(long)]
        registry: Option<PathBuf>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Diagnose configuration and model artifacts
    Doctor {
        /// Configuration file (JSON)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Behavior registry file (JSON)
        #[arg(long)]
        registry: Option<PathBuf>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", serde_json::to_string(&CliError::from(e)).unwrap_or_else(|_| "Unknown error".to_string()));
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), TaggerCliError> {
    match cli.command {
        Commands::Infer {
            dataset,
            output,
            config,
            registry,
        } => cmd_infer(&dataset, &output, config.as_deref(), registry.as_deref()),
        Commands::Stats {
            output,
            config,
            no_plots,
        } => cmd_stats(&output, config.as_deref(), no_plots),
        Commands::Registry { registry, json } => cmd_registry(registry.as_deref(), json),
        Commands::Doctor {
            config,
            registry,
            json,
        } => cmd_doctor(config.as_deref(), registry.as_deref(), json),
    }
}

fn load_config(path: Option<&Path>) -> Result<TaggerConfig, TaggerCliError> {
    match path {
        Some(path) => Ok(TaggerConfig::from_file(path)?),
        None => Ok(TaggerConfig::default()),
    }
}

fn load_registry(path: Option<&Path>) -> Result<ModelRegistry, TaggerCliError> {
    match path {
        Some(path) => Ok(ModelRegistry::from_file(path)?),
        None => Ok(ModelRegistry::default()),
    }
}

fn cmd_infer(
    dataset: &Path,
    output: &Path,
    config: Option<&Path>,
    registry: Option<&Path>,
) -> Result<(), TaggerCliError> {
    let config = load_config(config)?;
    let registry = load_registry(registry)?;

    let orchestrator = Orchestrator::new(&registry, &config, JsonLinesDataset::new());
    let report = orchestrator.run_all(dataset, output)?;
    println!("{}", report.to_json()?);

    let failed = report.failed().count();
    if failed > 0 {
        Err(TaggerCliError::VideosFailed(failed))
    } else {
        Ok(())
    }
}

fn cmd_stats(output: &Path, config: Option<&Path>, no_plots: bool) -> Result<(), TaggerCliError> {
    let mut config = load_config(config)?;
    if no_plots {
        config.render_plots = false;
    }

    let stats = StatisticsEngine::new(&config).compute_statistics(output)?;
    println!("{:<24} {:<24} {:>8} {:>10} {:>8}", "video", "behavior", "latency", "duration", "bouts");
    for row in &stats {
        println!(
            "{:<24} {:<24} {:>8} {:>9.2}s {:>8}",
            row.video, row.behavior, row.latency, row.duration_seconds, row.occurrences
        );
    }
    Ok(())
}

fn cmd_registry(registry: Option<&Path>, json: bool) -> Result<(), TaggerCliError> {
    let registry = load_registry(registry)?;

    if json {
        println!("{}", registry.to_json()?);
        return Ok(());
    }

    println!("Registered behaviors ({})", registry.len());
    for behavior in registry.iter() {
        let model = match &behavior.kind {
            ModelKind::Graph {
                checkpoint,
                readout,
                ..
            } => format!("graph ({} readout) {}", readout.as_str(), checkpoint.display()),
            ModelKind::Tabular { artifact } => format!("tabular {}", artifact.display()),
            ModelKind::Disabled => "disabled".to_string(),
        };
        println!("  {:<20} {}", behavior.name, model);
    }
    Ok(())
}

fn cmd_doctor(config: Option<&Path>, registry: Option<&Path>, json: bool) -> Result<(), TaggerCliError> {
    let mut checks: Vec<DoctorCheck> = Vec::new();

    checks.push(DoctorCheck {
        name: "tagger_version".to_string(),
        status: CheckStatus::Ok,
        message: format!("Tagger version {}", TAGGER_VERSION),
    });

    // Configuration
    let config = match load_config(config) {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config".to_string(),
                status: CheckStatus::Ok,
                message: format!(
                    "frame rate {} fps, batch size {}, model root {}",
                    config.frame_rate,
                    config.batch_size,
                    config.model_root.display()
                ),
            });
            Some(config)
        }
        Err(e) => {
            checks.push(DoctorCheck {
                name: "config".to_string(),
                status: CheckStatus::Error,
                message: CliError::from(e).message,
            });
            None
        }
    };

    if let Some(config) = &config {
        let effective = config.device.effective();
        let status = if effective == config.device {
            CheckStatus::Ok
        } else {
            CheckStatus::Warning
        };
        checks.push(DoctorCheck {
            name: "device".to_string(),
            status,
            message: format!(
                "requested {}, running on {}",
                config.device.as_str(),
                effective.as_str()
            ),
        });
    }

    // Registry and artifacts
    match load_registry(registry) {
        Ok(registry) => {
            checks.push(DoctorCheck {
                name: "registry".to_string(),
                status: CheckStatus::Ok,
                message: format!("{} behaviors registered", registry.len()),
            });
            if let Some(config) = &config {
                for behavior in registry.iter() {
                    let artifact = match &behavior.kind {
                        ModelKind::Graph { checkpoint, .. } => checkpoint,
                        ModelKind::Tabular { artifact } => artifact,
                        ModelKind::Disabled => continue,
                    };
                    let path = config.resolve_artifact(artifact);
                    let (status, message) = if path.exists() {
                        (CheckStatus::Ok, format!("found {}", path.display()))
                    } else {
                        (CheckStatus::Error, format!("missing {}", path.display()))
                    };
                    checks.push(DoctorCheck {
                        name: format!("model:{}", behavior.name),
                        status,
                        message,
                    });
                }
            }
        }
        Err(e) => {
            checks.push(DoctorCheck {
                name: "registry".to_string(),
                status: CheckStatus::Error,
                message: CliError::from(e).message,
            });
        }
    }

    let report = DoctorReport {
        producer: PRODUCER_NAME.to_string(),
        version: TAGGER_VERSION.to_string(),
        checks,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Tagger Doctor Report");
        println!("====================");
        println!("Producer: {}", report.producer);
        println!("Version:  {}", report.version);
        println!("\nChecks:");

        for check in &report.checks {
            let status_icon = match check.status {
                CheckStatus::Ok => "[OK]",
                CheckStatus::Warning => "[WARN]",
                CheckStatus::Error => "[ERR]",
            };
            println!("  {} {}: {}", status_icon, check.name, check.message);
        }
    }

    let has_errors = report.checks.iter().any(|c| matches!(c.status, CheckStatus::Error));
    if has_errors {
        Err(TaggerCliError::DoctorFailed)
    } else {
        Ok(())
    }
}

// Error handling

#[derive(Debug)]
enum TaggerCliError {
    Tagger(TaggerError),
    Json(serde_json::Error),
    VideosFailed(usize),
    DoctorFailed,
}

impl From<TaggerError> for TaggerCliError {
    fn from(e: TaggerError) -> Self {
        TaggerCliError::Tagger(e)
    }
}

impl From<serde_json::Error> for TaggerCliError {
    fn from(e: serde_json::Error) -> Self {
        TaggerCliError::Json(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<TaggerCliError> for CliError {
    fn from(e: TaggerCliError) -> Self {
        match e {
            TaggerCliError::Tagger(e) => {
                let (code, hint) = match &e {
                    TaggerError::UnknownBehavior(_) => {
                        ("UNKNOWN_BEHAVIOR", Some("Run 'tagger registry' to list behaviors"))
                    }
                    TaggerError::CheckpointLoad { .. } => (
                        "CHECKPOINT_ERROR",
                        Some("Check that the checkpoint matches the registered architecture"),
                    ),
                    TaggerError::ArtifactNotFound(_) | TaggerError::ArtifactLoad { .. } => {
                        ("ARTIFACT_ERROR", Some("Run 'tagger doctor' to check model artifacts"))
                    }
                    TaggerError::InferenceCompute { .. } => ("INFERENCE_ERROR", None),
                    TaggerError::DatasetMisaligned(_) => (
                        "DATASET_MISALIGNED",
                        Some("Set \"alignment\" to \"intersect\" or \"graph_primary\" to continue"),
                    ),
                    TaggerError::Dataset(_) => {
                        ("DATASET_ERROR", Some("Expected graphs.jsonl and coordinates.jsonl"))
                    }
                    TaggerError::InvalidTable(_) | TaggerError::Csv(_) => ("TABLE_ERROR", None),
                    TaggerError::Config(_) => ("CONFIG_ERROR", Some("Check the configuration file")),
                    TaggerError::Plot(_) => ("PLOT_ERROR", Some("Retry with --no-plots")),
                    TaggerError::Io(_) => ("IO_ERROR", Some("Check file paths and permissions")),
                    TaggerError::Json(_) => ("JSON_ERROR", Some("Check JSON syntax")),
                };
                CliError {
                    code: code.to_string(),
                    message: e.to_string(),
                    hint: hint.map(str::to_string),
                }
            }
            TaggerCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: None,
            },
            TaggerCliError::VideosFailed(count) => CliError {
                code: "VIDEOS_FAILED".to_string(),
                message: format!("{} videos failed", count),
                hint: Some("See the run report for per-video errors".to_string()),
            },
            TaggerCliError::DoctorFailed => CliError {
                code: "DOCTOR_FAILED".to_string(),
                message: "One or more health checks failed".to_string(),
                hint: Some("Review the doctor report for details".to_string()),
            },
        }
    }
}

#[derive(serde::Serialize)]
struct DoctorReport {
    producer: String,
    version: String,
    checks: Vec<DoctorCheck>,
}

#[derive(serde::Serialize)]
struct DoctorCheck {
    name: String,
    status: CheckStatus,
    message: String,
}

#[derive(serde::Serialize)]
enum CheckStatus {
    Ok,
    Warning,
    Error,
}
