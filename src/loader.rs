//! Model resolution
//!
//! Turns a registry entry into an executable predictor. The behavior kind
//! is matched once here; downstream code only sees [`Predictor`].

use crate::checkpoint;
use crate::config::{ComputeDevice, TaggerConfig};
use crate::error::Result;
use crate::gnn::GraphClassifier;
use crate::registry::{BehaviorDescriptor, ModelKind, ModelRegistry};
use crate::tabular::TabularModel;
use tracing::debug;

/// Executable model for one behavior
#[derive(Debug, Clone)]
pub enum Predictor {
    /// Graph attention classifier over per-frame interaction graphs
    Graph(GraphClassifier),
    /// Pre-fit classifier over raw coordinate vectors
    Tabular(TabularModel),
    /// Behavior not evaluated; every frame is labelled 0
    NoOp,
}

impl Predictor {
    pub fn kind(&self) -> &'static str {
        match self {
            Predictor::Graph(_) => "graph",
            Predictor::Tabular(_) => "tabular",
            Predictor::NoOp => "noop",
        }
    }
}

/// Resolves behaviors against an immutable registry
#[derive(Debug, Clone)]
pub struct ModelLoader<'a> {
    registry: &'a ModelRegistry,
    config: &'a TaggerConfig,
}

impl<'a> ModelLoader<'a> {
    pub fn new(registry: &'a ModelRegistry, config: &'a TaggerConfig) -> Self {
        Self { registry, config }
    }

    pub fn registry(&self) -> &'a ModelRegistry {
        self.registry
    }

    pub fn device(&self) -> ComputeDevice {
        self.config.device
    }

    /// Look up a behavior and load its model
    pub fn resolve(&self, behavior: &str) -> Result<Predictor> {
        let descriptor = self.registry.get(behavior)?;
        self.load(descriptor)
    }

    fn load(&self, descriptor: &BehaviorDescriptor) -> Result<Predictor> {
        match &descriptor.kind {
            ModelKind::Disabled => Ok(Predictor::NoOp),
            ModelKind::Graph {
                checkpoint,
                readout,
                encoder,
                head,
            } => {
                let path = self.config.resolve_artifact(checkpoint);
                let mut model = GraphClassifier::new(encoder, head, *readout);
                checkpoint::restore(&mut model, &path)?;
                let model = model.to_device(self.config.device);
                debug!(
                    behavior = %descriptor.name,
                    device = model.device().as_str(),
                    readout = readout.as_str(),
                    "graph classifier ready"
                );
                Ok(Predictor::Graph(model))
            }
            ModelKind::Tabular { artifact } => {
                let path = self.config.resolve_artifact(artifact);
                let model = TabularModel::from_file(&path)?;
                debug!(behavior = %descriptor.name, path = %path.display(), "tabular classifier ready");
                Ok(Predictor::Tabular(model))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::Checkpoint;
    use crate::error::TaggerError;
    use crate::registry::{BehaviorDescriptor, EncoderParams, HeadParams, Readout};
    use std::fs;

    fn config_in(dir: &std::path::Path) -> TaggerConfig {
        TaggerConfig {
            model_root: dir.to_path_buf(),
            ..TaggerConfig::default()
        }
    }

    #[test]
    fn test_disabled_resolves_to_noop() {
        let registry = ModelRegistry::new(vec![BehaviorDescriptor::disabled("Grooming")]).unwrap();
        let config = TaggerConfig::default();
        let loader = ModelLoader::new(&registry, &config);
        assert!(matches!(loader.resolve("Grooming").unwrap(), Predictor::NoOp));
    }

    #[test]
    fn test_unknown_behavior() {
        let registry = ModelRegistry::default();
        let config = TaggerConfig::default();
        let loader = ModelLoader::new(&registry, &config);
        assert!(matches!(
            loader.resolve("Rearing"),
            Err(TaggerError::UnknownBehavior(_))
        ));
    }

    #[test]
    fn test_missing_tabular_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let registry = ModelRegistry::default();
        let config = config_in(dir.path());
        let loader = ModelLoader::new(&registry, &config);
        assert!(matches!(
            loader.resolve("Sniffing"),
            Err(TaggerError::ArtifactNotFound(_))
        ));
    }

    #[test]
    fn test_graph_checkpoint_resolved_against_model_root() {
        let dir = tempfile::tempdir().unwrap();
        let mut template = GraphClassifier::new(
            &EncoderParams::default(),
            &HeadParams::default(),
            Readout::Mean,
        );
        let checkpoint = Checkpoint::from_model(&mut template, Some(610));
        fs::write(dir.path().join("contacts.json"), checkpoint.to_json().unwrap()).unwrap();

        let registry = ModelRegistry::new(vec![BehaviorDescriptor::graph(
            "General_Contacts",
            "contacts.json",
            Readout::Mean,
        )])
        .unwrap();
        let config = config_in(dir.path());
        let loader = ModelLoader::new(&registry, &config);

        match loader.resolve("General_Contacts").unwrap() {
            Predictor::Graph(model) => assert_eq!(model.device(), ComputeDevice::Cpu),
            other => panic!("unexpected predictor: {}", other.kind()),
        }
    }

    #[test]
    fn test_architecture_mismatch_is_checkpoint_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut small = GraphClassifier::new(
            &EncoderParams {
                n_hidden: 8,
                ..EncoderParams::default()
            },
            &HeadParams::default(),
            Readout::Mean,
        );
        let checkpoint = Checkpoint::from_model(&mut small, None);
        fs::write(dir.path().join("contacts.json"), checkpoint.to_json().unwrap()).unwrap();

        let registry = ModelRegistry::new(vec![BehaviorDescriptor::graph(
            "General_Contacts",
            "contacts.json",
            Readout::Mean,
        )])
        .unwrap();
        let config = config_in(dir.path());
        let loader = ModelLoader::new(&registry, &config);
        assert!(matches!(
            loader.resolve("General_Contacts"),
            Err(TaggerError::CheckpointLoad { .. })
        ));
    }
}
