//! Tabular baseline classifiers
//!
//! Pre-fit models that label raw per-frame coordinate vectors. Artifacts are
//! JSON documents tagged by `"model"`; fitting happens elsewhere.

use crate::error::{Result, TaggerError};
use crate::gnn::argmax;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// One node of a fitted decision tree
///
/// Leaves have no `feature`. Internal nodes send a row left when
/// `row[feature] <= threshold`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeNode {
    #[serde(default)]
    pub feature: Option<usize>,
    #[serde(default)]
    pub threshold: f32,
    #[serde(default)]
    pub left: usize,
    #[serde(default)]
    pub right: usize,
    /// Per-class weight at this node (sample counts or fractions)
    #[serde(default)]
    pub value: Vec<f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTree {
    pub nodes: Vec<TreeNode>,
}

impl DecisionTree {
    /// Class distribution of the leaf reached by `row`
    fn leaf_distribution(&self, row: &[f32]) -> std::result::Result<Vec<f32>, String> {
        let mut index = 0;
        // a well-formed tree reaches a leaf in at most `nodes.len()` steps
        for _ in 0..=self.nodes.len() {
            let node = self
                .nodes
                .get(index)
                .ok_or_else(|| format!("tree node {index} does not exist"))?;
            match node.feature {
                None => {
                    let total: f32 = node.value.iter().sum();
                    if total <= 0.0 {
                        return Ok(vec![0.0; node.value.len()]);
                    }
                    return Ok(node.value.iter().map(|v| v / total).collect());
                }
                Some(feature) => {
                    let value = row
                        .get(feature)
                        .ok_or_else(|| format!("feature {feature} out of range for {} inputs", row.len()))?;
                    index = if *value <= node.threshold {
                        node.left
                    } else {
                        node.right
                    };
                }
            }
        }
        Err("decision tree contains a cycle".to_string())
    }
}

/// Fitted tabular classifier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "model")]
pub enum TabularModel {
    /// Linear decision function per class; a single row is a binary model
    LogisticRegression {
        coef: Vec<Vec<f32>>,
        intercept: Vec<f32>,
        classes: Vec<i64>,
    },
    /// Soft-voting tree ensemble
    RandomForest {
        trees: Vec<DecisionTree>,
        classes: Vec<i64>,
    },
    /// Predicts the same label for every row
    Constant { label: i64 },
}

impl TabularModel {
    /// Deserialize a pre-fit model artifact
    pub fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(TaggerError::ArtifactNotFound(path.to_path_buf()));
        }
        let json = fs::read_to_string(path)?;
        let model: TabularModel =
            serde_json::from_str(&json).map_err(|e| TaggerError::ArtifactLoad {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
        model.validate().map_err(|reason| TaggerError::ArtifactLoad {
            path: path.to_path_buf(),
            reason,
        })?;
        Ok(model)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    fn validate(&self) -> std::result::Result<(), String> {
        match self {
            TabularModel::LogisticRegression {
                coef,
                intercept,
                classes,
            } => {
                if coef.is_empty() || coef.len() != intercept.len() {
                    return Err("coef and intercept must have the same non-zero length".to_string());
                }
                let expected_classes = if coef.len() == 1 { 2 } else { coef.len() };
                if classes.len() != expected_classes {
                    return Err(format!(
                        "expected {expected_classes} classes, artifact lists {}",
                        classes.len()
                    ));
                }
                let width = coef[0].len();
                if coef.iter().any(|row| row.len() != width) {
                    return Err("coefficient rows have different widths".to_string());
                }
                Ok(())
            }
            TabularModel::RandomForest { trees, classes } => {
                if trees.is_empty() || classes.is_empty() {
                    return Err("random forest needs at least one tree and one class".to_string());
                }
                Ok(())
            }
            TabularModel::Constant { .. } => Ok(()),
        }
    }

    /// Predict one label per row, in row order
    pub fn predict(&self, rows: &[Vec<f32>]) -> std::result::Result<Vec<i64>, String> {
        rows.iter().map(|row| self.predict_row(row)).collect()
    }

    fn predict_row(&self, row: &[f32]) -> std::result::Result<i64, String> {
        match self {
            TabularModel::LogisticRegression {
                coef,
                intercept,
                classes,
            } => {
                let scores = coef
                    .iter()
                    .zip(intercept)
                    .map(|(weights, b)| {
                        if weights.len() != row.len() {
                            return Err(format!(
                                "model expects {} features, got {}",
                                weights.len(),
                                row.len()
                            ));
                        }
                        Ok(weights.iter().zip(row).map(|(w, x)| w * x).sum::<f32>() + b)
                    })
                    .collect::<std::result::Result<Vec<f32>, String>>()?;

                let index = if scores.len() == 1 {
                    usize::from(scores[0] > 0.0)
                } else {
                    argmax(&scores)
                };
                Ok(classes[index])
            }
            TabularModel::RandomForest { trees, classes } => {
                let mut votes = vec![0.0f32; classes.len()];
                for tree in trees {
                    let distribution = tree.leaf_distribution(row)?;
                    if distribution.len() != classes.len() {
                        return Err(format!(
                            "leaf has {} class weights, model has {} classes",
                            distribution.len(),
                            classes.len()
                        ));
                    }
                    for (vote, p) in votes.iter_mut().zip(distribution) {
                        *vote += p;
                    }
                }
                Ok(classes[argmax(&votes)])
            }
            TabularModel::Constant { label } => Ok(*label),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stump(feature: usize, threshold: f32) -> DecisionTree {
        DecisionTree {
            nodes: vec![
                TreeNode {
                    feature: Some(feature),
                    threshold,
                    left: 1,
                    right: 2,
                    value: vec![],
                },
                TreeNode {
                    feature: None,
                    threshold: 0.0,
                    left: 0,
                    right: 0,
                    value: vec![10.0, 0.0],
                },
                TreeNode {
                    feature: None,
                    threshold: 0.0,
                    left: 0,
                    right: 0,
                    value: vec![1.0, 9.0],
                },
            ],
        }
    }

    #[test]
    fn test_binary_logistic_regression() {
        // positive when the first animal is right of the second
        let model = TabularModel::LogisticRegression {
            coef: vec![vec![1.0, 0.0, -1.0, 0.0]],
            intercept: vec![0.0],
            classes: vec![0, 1],
        };
        let rows = vec![vec![5.0, 0.0, 1.0, 0.0], vec![1.0, 0.0, 5.0, 0.0]];
        assert_eq!(model.predict(&rows).unwrap(), vec![1, 0]);
    }

    #[test]
    fn test_multinomial_logistic_regression() {
        let model = TabularModel::LogisticRegression {
            coef: vec![vec![1.0], vec![0.0], vec![-1.0]],
            intercept: vec![0.0, 0.5, 0.0],
            classes: vec![0, 1, 2],
        };
        assert_eq!(model.predict(&[vec![2.0], vec![0.0], vec![-2.0]]).unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn test_tied_scores_pick_first_class() {
        let model = TabularModel::LogisticRegression {
            coef: vec![vec![0.0], vec![0.0], vec![0.0]],
            intercept: vec![0.0, 0.0, 0.0],
            classes: vec![2, 0, 1],
        };
        assert_eq!(model.predict(&[vec![3.0]]).unwrap(), vec![2]);
    }

    #[test]
    fn test_feature_count_mismatch() {
        let model = TabularModel::LogisticRegression {
            coef: vec![vec![1.0, 1.0]],
            intercept: vec![0.0],
            classes: vec![0, 1],
        };
        assert!(model.predict(&[vec![1.0]]).is_err());
    }

    #[test]
    fn test_random_forest_soft_vote() {
        let model = TabularModel::RandomForest {
            trees: vec![stump(0, 0.5), stump(1, 0.5), stump(1, 0.5)],
            classes: vec![0, 1],
        };
        // tree 0 votes 0, trees 1 and 2 vote 1
        assert_eq!(model.predict(&[vec![0.0, 1.0]]).unwrap(), vec![1]);
        assert_eq!(model.predict(&[vec![1.0, 0.0]]).unwrap(), vec![0]);
    }

    #[test]
    fn test_tree_cycle_detected() {
        let mut tree = stump(0, 0.5);
        tree.nodes[0].left = 0;
        let model = TabularModel::RandomForest {
            trees: vec![tree],
            classes: vec![0, 1],
        };
        assert!(model.predict(&[vec![0.0]]).unwrap_err().contains("cycle"));
    }

    #[test]
    fn test_constant_model() {
        let model = TabularModel::Constant { label: 0 };
        assert_eq!(model.predict(&[vec![1.0], vec![2.0]]).unwrap(), vec![0, 0]);
        assert!(model.predict(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();

        let missing = dir.path().join("model_sniffR.json");
        assert!(matches!(
            TabularModel::from_file(&missing),
            Err(TaggerError::ArtifactNotFound(_))
        ));

        let path = dir.path().join("model.json");
        let model = TabularModel::RandomForest {
            trees: vec![stump(0, 0.5)],
            classes: vec![0, 1],
        };
        fs::write(&path, model.to_json().unwrap()).unwrap();
        assert_eq!(TabularModel::from_file(&path).unwrap(), model);

        let invalid = dir.path().join("invalid.json");
        fs::write(&invalid, r#"{"model": "logistic_regression", "coef": [], "intercept": [], "classes": []}"#)
            .unwrap();
        assert!(matches!(
            TabularModel::from_file(&invalid),
            Err(TaggerError::ArtifactLoad { .. })
        ));
    }
}
