use behavior_tagger::checkpoint::Checkpoint;
use behavior_tagger::dataset::{COORDINATES_FILE, GRAPHS_FILE};
use behavior_tagger::gnn::GraphClassifier;
use behavior_tagger::registry::{EncoderParams, HeadParams};
use behavior_tagger::{
    BehaviorDescriptor, CoordinateSample, GraphSample, JsonLinesDataset, ModelRegistry,
    Orchestrator, PredictionTable, Readout, StatisticsEngine, TaggerConfig,
};
use pretty_assertions::assert_eq;
use std::fs;
use std::path::Path;

const DISABLED: [&str; 6] = [
    "Sniffing",
    "Sniffing_head",
    "Sniffing_body",
    "Following",
    "Dominance",
    "Grooming",
];

/// Production-shaped contact classifier that labels every frame as contact
fn write_contact_checkpoint(dir: &Path) {
    let mut model = GraphClassifier::new(
        &EncoderParams::default(),
        &HeadParams::default(),
        Readout::Mean,
    );
    let mut checkpoint = Checkpoint::from_model(&mut model, Some(610));
    if let Some(bias) = checkpoint.model_state_dict.get_mut("classifier.hidden3.bias") {
        bias.data = vec![0.0, 1.0];
    }
    fs::write(dir.join("contacts.json"), checkpoint.to_json().unwrap()).unwrap();
}

fn registry() -> ModelRegistry {
    let mut behaviors = vec![BehaviorDescriptor::graph(
        "General_Contacts",
        "contacts.json",
        Readout::Mean,
    )];
    behaviors.extend(DISABLED.iter().map(|name| BehaviorDescriptor::disabled(name)));
    ModelRegistry::new(behaviors).unwrap()
}

/// Ten frames of a two-animal recording; graphs arrive out of frame order
fn write_dataset(dir: &Path, video: &str) {
    let mut graphs = String::new();
    for frame in [3i64, 0, 9, 1, 2, 8, 4, 7, 5, 6] {
        let sample = GraphSample {
            x: vec![
                vec![0.1, 0.2, 0.3, 0.0],
                vec![0.4, 0.5, 0.6, 1.0],
                vec![0.2, 0.2, 0.3, 0.0],
                vec![0.5, 0.5, 0.6, 1.0],
            ],
            edge_index: vec![[0, 1], [1, 0], [0, 2], [1, 3], [2, 3], [3, 2]],
            frame_mask: vec![frame, frame, frame + 1, frame + 1],
            video: video.to_string(),
        };
        graphs.push_str(&serde_json::to_string(&sample).unwrap());
        graphs.push('\n');
    }
    fs::write(dir.join(GRAPHS_FILE), graphs).unwrap();

    let mut coordinates = String::new();
    for frame in 0..10 {
        let sample = CoordinateSample {
            features: vec![frame as f32, 1.0, 2.0, frame as f32 * 0.5],
            label: None,
            video: video.to_string(),
        };
        coordinates.push_str(&serde_json::to_string(&sample).unwrap());
        coordinates.push('\n');
    }
    fs::write(dir.join(COORDINATES_FILE), coordinates).unwrap();
}

#[test]
fn test_end_to_end_single_video() {
    let models = tempfile::tempdir().unwrap();
    let data = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();

    write_contact_checkpoint(models.path());
    write_dataset(data.path(), "mouse_pair_01");

    let registry = registry();
    let config = TaggerConfig {
        model_root: models.path().to_path_buf(),
        render_plots: false,
        ..TaggerConfig::default()
    };

    let report = Orchestrator::new(&registry, &config, JsonLinesDataset::new())
        .run_all(data.path(), output.path())
        .unwrap();

    assert!(report.warnings.is_empty());
    assert!(!report.has_failures());
    assert_eq!(report.videos.len(), 1);
    assert_eq!(report.videos[0].frames, 10);

    let written: Vec<String> = fs::read_dir(output.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(written, vec!["mouse_pair_01_output.csv".to_string()]);

    let table = PredictionTable::load(&output.path().join("mouse_pair_01_output.csv")).unwrap();
    let mut expected_columns = vec!["General_Contacts".to_string()];
    for name in DISABLED {
        expected_columns.push(format!("{name}_R"));
        expected_columns.push(format!("{name}_V"));
    }
    assert_eq!(table.column_names(), expected_columns);
    assert_eq!(table.frames(), &[0, 1, 2, 3, 4, 5, 6, 7, 8, 9]);
    assert_eq!(table.column("General_Contacts").unwrap(), &[1; 10]);
    for column in &expected_columns[1..] {
        assert_eq!(table.column(column).unwrap(), &[0; 10]);
    }

    // every label is binary
    assert!(table
        .columns()
        .iter()
        .all(|c| c.values.iter().all(|v| *v == 0 || *v == 1)));

    let stats = StatisticsEngine::new(&config)
        .compute_statistics(output.path())
        .unwrap();
    assert_eq!(stats.len(), expected_columns.len());

    let contacts = &stats[0];
    assert_eq!(contacts.behavior, "General_Contacts");
    assert_eq!(contacts.latency, 0);
    assert_eq!(contacts.duration_frames, 10);
    assert_eq!(contacts.occurrences, 0);

    for row in &stats[1..] {
        assert_eq!((row.latency, row.duration_frames, row.occurrences), (0, 0, 0));
    }

    let aggregate = fs::read_to_string(output.path().join("statistics.csv")).unwrap();
    assert_eq!(aggregate.lines().count(), 1 + expected_columns.len());
    assert!(output.path().join("mouse_pair_01/distribution.csv").exists());
}

#[test]
fn test_missing_checkpoint_fails_video_not_run() {
    let models = tempfile::tempdir().unwrap();
    let data = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();

    write_dataset(data.path(), "mouse_pair_02");

    let registry = registry();
    let config = TaggerConfig {
        model_root: models.path().to_path_buf(),
        ..TaggerConfig::default()
    };
    let report = Orchestrator::new(&registry, &config, JsonLinesDataset::new())
        .run_all(data.path(), output.path())
        .unwrap();

    assert!(report.has_failures());
    let failed = report.failed().next().unwrap();
    assert_eq!(failed.video, "mouse_pair_02");
    assert!(failed.error.as_deref().unwrap().contains("checkpoint"));
    assert!(!output.path().join("mouse_pair_02_output.csv").exists());
}
