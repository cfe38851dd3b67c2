//! Per-behavior inference
//!
//! Runs one behavior's predictor over every sample of a video and produces a
//! frame-keyed table. Asymmetric behaviors are evaluated twice, once per
//! actor role, giving `<behavior>_R` and `<behavior>_V` columns; symmetric
//! behaviors produce a single column named after the behavior.

use crate::config::TaggerConfig;
use crate::error::{Result, TaggerError};
use crate::gnn::GraphClassifier;
use crate::loader::{ModelLoader, Predictor};
use crate::registry::ModelRegistry;
use crate::table::PredictionTable;
use crate::tabular::TabularModel;
use crate::types::{swap_coordinate_identities, swap_graph_identities, CoordinateSample, GraphSample};
use std::path::Path;
use tracing::info;

/// Suffix of the column where the first animal acts
pub const ACTOR_R_SUFFIX: &str = "_R";
/// Suffix of the column where the second animal acts
pub const ACTOR_V_SUFFIX: &str = "_V";

/// Samples of one video in the view a behavior consumes
#[derive(Debug, Clone, Copy)]
pub enum BehaviorInput<'a> {
    Graphs(&'a [GraphSample]),
    Coordinates(&'a [CoordinateSample]),
}

impl BehaviorInput<'_> {
    pub fn len(&self) -> usize {
        match self {
            BehaviorInput::Graphs(samples) => samples.len(),
            BehaviorInput::Coordinates(samples) => samples.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Column names a behavior produces
pub fn output_columns(behavior: &str, symmetric: bool) -> Vec<String> {
    if symmetric {
        vec![behavior.to_string()]
    } else {
        vec![
            format!("{behavior}{ACTOR_R_SUFFIX}"),
            format!("{behavior}{ACTOR_V_SUFFIX}"),
        ]
    }
}

/// Runs single behaviors against a registry
pub struct InferenceEngine<'a> {
    loader: ModelLoader<'a>,
    config: &'a TaggerConfig,
}

impl<'a> InferenceEngine<'a> {
    pub fn new(registry: &'a ModelRegistry, config: &'a TaggerConfig) -> Self {
        Self {
            loader: ModelLoader::new(registry, config),
            config,
        }
    }

    pub fn registry(&self) -> &'a ModelRegistry {
        self.loader.registry()
    }

    /// Label every sample for one behavior.
    ///
    /// Rows follow input order; sorting by frame is left to the merge.
    pub fn infer(&self, behavior: &str, input: BehaviorInput<'_>) -> Result<PredictionTable> {
        let predictor = self.loader.resolve(behavior)?;
        let symmetric = self.config.is_symmetric(behavior);

        match (predictor, input) {
            (Predictor::Graph(model), BehaviorInput::Graphs(samples)) => {
                self.infer_graph(behavior, &model, samples, symmetric)
            }
            (Predictor::Tabular(model), BehaviorInput::Coordinates(samples)) => {
                infer_tabular(behavior, &model, samples, symmetric)
            }
            (Predictor::NoOp, input) => zero_table(behavior, input.len(), symmetric),
            (predictor, _) => Err(TaggerError::inference(
                behavior,
                format!("{} model cannot consume the provided samples", predictor.kind()),
            )),
        }
    }

    /// Label every sample and persist the table as CSV instead of returning it
    pub fn infer_to_file(&self, behavior: &str, input: BehaviorInput<'_>, path: &Path) -> Result<()> {
        let table = self.infer(behavior, input)?;
        table.save(path)
    }

    fn infer_graph(
        &self,
        behavior: &str,
        model: &GraphClassifier,
        samples: &[GraphSample],
        symmetric: bool,
    ) -> Result<PredictionTable> {
        let columns = output_columns(behavior, symmetric);

        info!(behavior, column = %columns[0], samples = samples.len(), "running inference");
        let (frames, first_pass) = self.graph_pass(behavior, model, samples)?;
        let mut table = PredictionTable::new(frames).with_column(&columns[0], first_pass)?;

        if !symmetric {
            let swapped = swap_graph_identities(samples);
            info!(behavior, column = %columns[1], samples = swapped.len(), "running inference");
            // frame indices are shared with the first pass
            let (_, second_pass) = self.graph_pass(behavior, model, &swapped)?;
            table.push_column(&columns[1], second_pass)?;
        }
        Ok(table)
    }

    fn graph_pass(
        &self,
        behavior: &str,
        model: &GraphClassifier,
        samples: &[GraphSample],
    ) -> Result<(Vec<i64>, Vec<i64>)> {
        let mut frames = Vec::with_capacity(samples.len());
        let mut labels = Vec::with_capacity(samples.len());
        for batch in samples.chunks(self.config.batch_size.max(1)) {
            let predictions = model
                .predict_batch(batch)
                .map_err(|reason| TaggerError::inference(behavior, reason))?;
            for prediction in predictions {
                frames.push(prediction.frame);
                labels.push(prediction.label);
            }
        }
        Ok((frames, labels))
    }
}

fn infer_tabular(
    behavior: &str,
    model: &TabularModel,
    samples: &[CoordinateSample],
    symmetric: bool,
) -> Result<PredictionTable> {
    let columns = output_columns(behavior, symmetric);
    let predict = |rows: &[CoordinateSample]| {
        let features: Vec<Vec<f32>> = rows.iter().map(|s| s.features.clone()).collect();
        model
            .predict(&features)
            .map_err(|reason| TaggerError::inference(behavior, reason))
    };

    let mut table = PredictionTable::sequential(samples.len());
    if symmetric {
        info!(behavior, column = %columns[0], samples = samples.len(), "running inference");
        table.push_column(&columns[0], predict(samples)?)?;
        return Ok(table);
    }

    // The R pass sees the swapped arrangement, the V pass the original one
    let swapped = swap_coordinate_identities(samples);
    info!(behavior, column = %columns[0], samples = samples.len(), "running inference");
    table.push_column(&columns[0], predict(&swapped)?)?;
    info!(behavior, column = %columns[1], samples = samples.len(), "running inference");
    table.push_column(&columns[1], predict(samples)?)?;
    Ok(table)
}

fn zero_table(behavior: &str, len: usize, symmetric: bool) -> Result<PredictionTable> {
    let mut table = PredictionTable::sequential(len);
    for column in output_columns(behavior, symmetric) {
        table.push_column(&column, vec![0; len])?;
    }
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::Checkpoint;
    use crate::registry::{BehaviorDescriptor, EncoderParams, HeadParams, ModelKind, Readout};
    use pretty_assertions::assert_eq;
    use std::fs;

    fn coords(values: &[[f32; 2]]) -> Vec<CoordinateSample> {
        values
            .iter()
            .map(|v| CoordinateSample {
                features: v.to_vec(),
                label: None,
                video: "v".to_string(),
            })
            .collect()
    }

    fn graph(frame: i64, identity: f32) -> GraphSample {
        GraphSample {
            x: vec![vec![0.5, identity], vec![0.25, 1.0 - identity]],
            // self loops only, so every embedding keeps its own identity
            edge_index: vec![],
            frame_mask: vec![frame, frame],
            video: "v".to_string(),
        }
    }

    /// Registry in a temp dir with a tabular "Following" model that fires
    /// when the first coordinate exceeds the second
    fn tabular_fixture(dir: &Path) -> ModelRegistry {
        let model = TabularModel::LogisticRegression {
            coef: vec![vec![1.0, -1.0]],
            intercept: vec![0.0],
            classes: vec![0, 1],
        };
        fs::write(dir.join("following.json"), model.to_json().unwrap()).unwrap();
        ModelRegistry::new(vec![
            BehaviorDescriptor::tabular("Following", "following.json"),
            BehaviorDescriptor::disabled("Grooming"),
        ])
        .unwrap()
    }

    fn tiny_params() -> (EncoderParams, HeadParams) {
        let encoder = EncoderParams {
            n_in: 2,
            n_hidden: 1,
            heads: 1,
            n_out: 1,
            dropout: 0.0,
        };
        let head = HeadParams {
            n_latent: 1,
            n_hidden: 1,
            n_out: 2,
        };
        (encoder, head)
    }

    /// Single-channel graph classifier that labels 1 exactly when the
    /// central node carries identity 1
    fn identity_sensitive_checkpoint(dir: &Path, name: &str) {
        let (encoder, head) = tiny_params();
        let mut model = GraphClassifier::new(&encoder, &head, Readout::Mean);
        let mut checkpoint = Checkpoint::from_model(&mut model, None);
        for (param, tensor) in checkpoint.model_state_dict.iter_mut() {
            match param.as_str() {
                "encoder.gatenc1.lin_l.weight" => tensor.data = vec![0.0, 1.0],
                "encoder.gatenc2.lin_l.weight"
                | "classifier.hidden1.weight"
                | "classifier.hidden2.weight" => tensor.data.fill(1.0),
                "classifier.hidden3.weight" => tensor.data = vec![0.0, 4.0],
                "classifier.hidden3.bias" => tensor.data = vec![1.0, 0.0],
                _ => {}
            }
        }
        fs::write(dir.join(name), checkpoint.to_json().unwrap()).unwrap();
    }

    /// Registry whose graph behavior has the same architecture as the
    /// checkpoint written next to it
    fn graph_registry(dir: &Path, behavior: &str) -> ModelRegistry {
        identity_sensitive_checkpoint(dir, "gat.json");
        let (encoder, head) = tiny_params();
        ModelRegistry::new(vec![BehaviorDescriptor {
            name: behavior.to_string(),
            kind: ModelKind::Graph {
                checkpoint: "gat.json".into(),
                readout: Readout::Mean,
                encoder,
                head,
            },
        }])
        .unwrap()
    }

    fn config_in(dir: &Path) -> TaggerConfig {
        TaggerConfig {
            model_root: dir.to_path_buf(),
            ..TaggerConfig::default()
        }
    }

    #[test]
    fn test_tabular_two_pass_order() {
        let dir = tempfile::tempdir().unwrap();
        let registry = tabular_fixture(dir.path());
        let config = config_in(dir.path());
        let engine = InferenceEngine::new(&registry, &config);

        let samples = coords(&[[2.0, 1.0], [1.0, 2.0], [3.0, 3.0]]);
        let table = engine
            .infer("Following", BehaviorInput::Coordinates(&samples))
            .unwrap();

        assert_eq!(table.frames(), &[0, 1, 2]);
        assert_eq!(table.column_names(), vec!["Following_R", "Following_V"]);
        // R evaluates the swapped arrangement
        assert_eq!(table.column("Following_R").unwrap(), &[0, 1, 0]);
        assert_eq!(table.column("Following_V").unwrap(), &[1, 0, 0]);
    }

    #[test]
    fn test_input_not_mutated() {
        let dir = tempfile::tempdir().unwrap();
        let registry = tabular_fixture(dir.path());
        let config = config_in(dir.path());
        let engine = InferenceEngine::new(&registry, &config);

        let samples = coords(&[[2.0, 1.0]]);
        let before = samples.clone();
        engine
            .infer("Following", BehaviorInput::Coordinates(&samples))
            .unwrap();
        assert_eq!(samples, before);
    }

    #[test]
    fn test_disabled_behavior_is_zero_filled() {
        let dir = tempfile::tempdir().unwrap();
        let registry = tabular_fixture(dir.path());
        let config = config_in(dir.path());
        let engine = InferenceEngine::new(&registry, &config);

        let samples = coords(&[[2.0, 1.0], [1.0, 2.0]]);
        let table = engine
            .infer("Grooming", BehaviorInput::Coordinates(&samples))
            .unwrap();
        assert_eq!(table.column("Grooming_R").unwrap(), &[0, 0]);
        assert_eq!(table.column("Grooming_V").unwrap(), &[0, 0]);
    }

    #[test]
    fn test_unknown_behavior_propagates() {
        let dir = tempfile::tempdir().unwrap();
        let registry = tabular_fixture(dir.path());
        let config = config_in(dir.path());
        let engine = InferenceEngine::new(&registry, &config);
        assert!(matches!(
            engine.infer("Rearing", BehaviorInput::Coordinates(&[])),
            Err(TaggerError::UnknownBehavior(_))
        ));
    }

    #[test]
    fn test_kind_mismatch_is_inference_error() {
        let dir = tempfile::tempdir().unwrap();
        let registry = tabular_fixture(dir.path());
        let config = config_in(dir.path());
        let engine = InferenceEngine::new(&registry, &config);
        let graphs = vec![graph(0, 0.0)];
        assert!(matches!(
            engine.infer("Following", BehaviorInput::Graphs(&graphs)),
            Err(TaggerError::InferenceCompute { .. })
        ));
    }

    #[test]
    fn test_symmetric_graph_behavior_single_column() {
        let dir = tempfile::tempdir().unwrap();
        let registry = graph_registry(dir.path(), "General_Contacts");
        let config = config_in(dir.path());
        let engine = InferenceEngine::new(&registry, &config);

        let samples = vec![graph(4, 1.0), graph(2, 0.0), graph(3, 1.0)];
        let table = engine
            .infer("General_Contacts", BehaviorInput::Graphs(&samples))
            .unwrap();

        assert_eq!(table.column_names(), vec!["General_Contacts"]);
        // input order, not frame order
        assert_eq!(table.frames(), &[4, 2, 3]);
        assert!(table.column("General_Contacts").unwrap().iter().all(|v| *v == 0 || *v == 1));
    }

    #[test]
    fn test_asymmetric_graph_behavior_swaps_roles() {
        let dir = tempfile::tempdir().unwrap();
        let registry = graph_registry(dir.path(), "Sniffing");
        let config = TaggerConfig {
            batch_size: 2,
            ..config_in(dir.path())
        };
        let engine = InferenceEngine::new(&registry, &config);

        // only node 0 is in the central frame; its identity decides the label
        let mut actor_first = graph(10, 1.0);
        actor_first.frame_mask = vec![10, 11];
        let mut actor_second = graph(11, 0.0);
        actor_second.frame_mask = vec![11, 12];
        let samples = vec![actor_first, actor_second];

        let table = engine
            .infer("Sniffing", BehaviorInput::Graphs(&samples))
            .unwrap();

        assert_eq!(table.frames(), &[10, 11]);
        assert_eq!(table.column("Sniffing_R").unwrap(), &[1, 0]);
        assert_eq!(table.column("Sniffing_V").unwrap(), &[0, 1]);
    }

    #[test]
    fn test_infer_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let registry = tabular_fixture(dir.path());
        let config = config_in(dir.path());
        let engine = InferenceEngine::new(&registry, &config);

        let samples = coords(&[[2.0, 1.0]]);
        let path = dir.path().join("following.csv");
        engine
            .infer_to_file("Following", BehaviorInput::Coordinates(&samples), &path)
            .unwrap();
        let text = fs::read_to_string(path).unwrap();
        assert_eq!(text, "Frame,Following_R,Following_V\n0,0,1\n");
    }
}
