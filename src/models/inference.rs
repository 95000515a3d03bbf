//! Inference engine: classifier over a prepared feature matrix

use crate::error::{PipelineError, Result};
use crate::feature_pipeline::FeatureMatrix;
use crate::models::loader::ArtifactSet;
use crate::types::decision::{Decision, PredictionResult};
use std::sync::Arc;
use tracing::debug;

/// Labels and approval probabilities, one per input row, in input order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Predictions {
    /// Hard decisions (1 = approve)
    pub labels: Vec<u8>,
    /// Probability of approval (0.0 - 1.0)
    pub probabilities: Vec<f64>,
}

impl Predictions {
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<Result<PredictionResult>> {
        let label = *self.labels.get(index)?;
        let probability = *self.probabilities.get(index)?;
        Some(Decision::from_label(label).map(|decision| PredictionResult {
            decision,
            probability,
        }))
    }

    /// Per-row results in input order.
    pub fn results(&self) -> Result<Vec<PredictionResult>> {
        (0..self.len())
            .filter_map(|i| self.get(i))
            .collect()
    }
}

/// Runs the classifier of one artifact set
#[derive(Clone)]
pub struct InferenceEngine {
    artifacts: Arc<ArtifactSet>,
}

impl InferenceEngine {
    pub fn new(artifacts: Arc<ArtifactSet>) -> Self {
        Self { artifacts }
    }

    pub fn classifier_name(&self) -> &str {
        self.artifacts.classifier().name()
    }

    /// Threshold separating label 0 from label 1
    pub fn decision_threshold(&self) -> f64 {
        self.artifacts.classifier().decision_threshold()
    }

    /// Predict a label and approval probability for every row.
    pub fn infer(&self, features: &FeatureMatrix) -> Result<Predictions> {
        let expected = self.artifacts.feature_width();
        if features.width() != expected {
            return Err(PipelineError::Shape {
                stage: "inference input",
                expected,
                actual: features.width(),
            });
        }
        if features.is_empty() {
            return Ok(Predictions::default());
        }

        let classifier = self.artifacts.classifier();
        let proba = classifier.predict_proba(features)?;
        if proba.len() != features.row_count() {
            return Err(PipelineError::Inference(format!(
                "{} returned {} rows for {} inputs",
                classifier.name(),
                proba.len(),
                features.row_count()
            )));
        }

        let mut predictions = Predictions {
            labels: Vec::with_capacity(proba.len()),
            probabilities: Vec::with_capacity(proba.len()),
        };
        for [_, positive] in proba {
            if !(0.0..=1.0).contains(&positive) {
                return Err(PipelineError::Inference(format!(
                    "{} produced probability {positive}",
                    classifier.name()
                )));
            }
            predictions.labels.push(classifier.label_for(positive));
            predictions.probabilities.push(positive);
        }

        debug!(
            classifier = %classifier.name(),
            rows = predictions.len(),
            "Inference complete"
        );

        Ok(predictions)
    }
}
