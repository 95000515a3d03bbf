//! Native tree-ensemble classifier loaded from flat-array JSON
//!
//! Each tree is stored as parallel arrays indexed by node id. A node whose
//! left child is `-1` is a leaf; `value` holds the per-class training weight
//! that reached each node. Samples go left when `x[feature] <= threshold`.

use crate::error::{PipelineError, Result};
use crate::feature_pipeline::FeatureMatrix;
use crate::models::classifier::{ClassProbabilities, Classifier};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

const LEAF: i64 = -1;

/// One decision tree in flat-array layout
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlatTree {
    pub children_left: Vec<i64>,
    pub children_right: Vec<i64>,
    pub feature: Vec<i64>,
    pub threshold: Vec<f64>,
    pub value: Vec<[f64; 2]>,
}

impl FlatTree {
    fn node_count(&self) -> usize {
        self.children_left.len()
    }

    /// Check array lengths, child ordering and feature indices.
    ///
    /// Children must have a higher index than their parent, so traversal
    /// always terminates.
    fn validate(&self, n_features: usize) -> std::result::Result<(), String> {
        let n = self.node_count();
        if n == 0 {
            return Err("tree has no nodes".to_string());
        }
        if [
            self.children_right.len(),
            self.feature.len(),
            self.threshold.len(),
            self.value.len(),
        ]
        .iter()
        .any(|&len| len != n)
        {
            return Err("tree arrays have different lengths".to_string());
        }

        for node in 0..n {
            let (left, right) = (self.children_left[node], self.children_right[node]);
            if left == LEAF {
                let weight: f64 = self.value[node].iter().sum();
                if weight.is_nan() || weight <= 0.0 || self.value[node].iter().any(|v| *v < 0.0) {
                    return Err(format!("leaf {node} has no usable class weights"));
                }
                continue;
            }

            for child in [left, right] {
                if child <= node as i64 || child >= n as i64 {
                    return Err(format!("node {node} has invalid child {child}"));
                }
            }
            let feature = self.feature[node];
            if feature < 0 || feature as usize >= n_features {
                return Err(format!("node {node} splits on feature {feature}"));
            }
            if !self.threshold[node].is_finite() {
                return Err(format!("node {node} has a non-finite threshold"));
            }
        }
        Ok(())
    }

    /// Normalized class distribution of the leaf reached by `row`.
    fn leaf_distribution(&self, row: &[f32]) -> ClassProbabilities {
        let mut node = 0usize;
        while self.children_left[node] != LEAF {
            let feature = self.feature[node] as usize;
            node = if row[feature] as f64 <= self.threshold[node] {
                self.children_left[node] as usize
            } else {
                self.children_right[node] as usize
            };
        }

        let [neg, pos] = self.value[node];
        let total = neg + pos;
        [neg / total, pos / total]
    }
}

/// Averaged ensemble of decision trees
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForestClassifier {
    n_features: usize,
    #[serde(default = "default_decision_threshold")]
    decision_threshold: f64,
    trees: Vec<FlatTree>,
}

fn default_decision_threshold() -> f64 {
    0.5
}

impl ForestClassifier {
    pub fn new(n_features: usize, trees: Vec<FlatTree>) -> Result<Self> {
        Self::with_threshold(n_features, trees, default_decision_threshold())
    }

    pub fn with_threshold(
        n_features: usize,
        trees: Vec<FlatTree>,
        decision_threshold: f64,
    ) -> Result<Self> {
        let forest = Self {
            n_features,
            decision_threshold,
            trees,
        };
        forest.validate().map_err(PipelineError::Inference)?;
        Ok(forest)
    }

    /// Load a fitted forest from its JSON form.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .map_err(|e| PipelineError::artifact_load("classifier", path, e))?;
        let forest: ForestClassifier = serde_json::from_str(&raw)
            .map_err(|e| PipelineError::artifact_load("classifier", path, e))?;
        forest
            .validate()
            .map_err(|reason| PipelineError::artifact_load("classifier", path, reason))?;
        Ok(forest)
    }

    fn validate(&self) -> std::result::Result<(), String> {
        if self.trees.is_empty() {
            return Err("forest has no trees".to_string());
        }
        if !(0.0..=1.0).contains(&self.decision_threshold) {
            return Err(format!(
                "decision threshold {} outside [0, 1]",
                self.decision_threshold
            ));
        }
        for (i, tree) in self.trees.iter().enumerate() {
            tree.validate(self.n_features)
                .map_err(|reason| format!("tree {i}: {reason}"))?;
        }
        Ok(())
    }
}

impl Classifier for ForestClassifier {
    fn name(&self) -> &str {
        "forest"
    }

    fn input_width(&self) -> Option<usize> {
        Some(self.n_features)
    }

    fn decision_threshold(&self) -> f64 {
        self.decision_threshold
    }

    fn predict_proba(&self, features: &FeatureMatrix) -> Result<Vec<ClassProbabilities>> {
        if features.width() != self.n_features {
            return Err(PipelineError::Shape {
                stage: "classifier input",
                expected: self.n_features,
                actual: features.width(),
            });
        }

        let n_trees = self.trees.len() as f64;
        Ok(features
            .rows()
            .map(|row| {
                let [neg, pos] = self.trees.iter().fold([0.0, 0.0], |acc, tree| {
                    let [n, p] = tree.leaf_distribution(row);
                    [acc[0] + n, acc[1] + p]
                });
                [neg / n_trees, pos / n_trees]
            })
            .collect())
    }
}
