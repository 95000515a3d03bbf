//! Classifier capability shared by native and ONNX models

use crate::error::{PipelineError, Result};
use crate::feature_pipeline::FeatureMatrix;

/// Probability of [class 0, class 1] for one record
pub type ClassProbabilities = [f64; 2];

/// A fitted binary classifier. Class 1 is approval.
pub trait Classifier: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &str;

    /// Input width the model was trained on, when the artifact records it
    fn input_width(&self) -> Option<usize>;

    /// Two-class probabilities for every row of `features`, in row order.
    fn predict_proba(&self, features: &FeatureMatrix) -> Result<Vec<ClassProbabilities>>;

    /// Positive-class probability above which the hard label is 1
    fn decision_threshold(&self) -> f64 {
        0.5
    }

    /// Hard label for a positive-class probability.
    fn label_for(&self, positive: f64) -> u8 {
        u8::from(positive > self.decision_threshold())
    }

    /// Hard labels for every row of `features`.
    fn predict(&self, features: &FeatureMatrix) -> Result<Vec<u8>> {
        Ok(self
            .predict_proba(features)?
            .iter()
            .map(|p| self.label_for(p[1]))
            .collect())
    }
}

/// Rows of a row-major `[rows, 2]` probability tensor.
pub fn probabilities_from_tensor(
    dims: &[i64],
    data: &[f32],
    rows: usize,
) -> Result<Vec<ClassProbabilities>> {
    if dims != [rows as i64, 2] || data.len() != rows * 2 {
        return Err(PipelineError::Inference(format!(
            "expected probability tensor [{rows}, 2], got {dims:?}"
        )));
    }
    Ok(data
        .chunks_exact(2)
        .map(|pair| [f64::from(pair[0]), f64::from(pair[1])])
        .collect())
}

/// Probabilities from one `class id -> probability` map.
///
/// A map without class 0 gets the complement of class 1; class 1 is required.
pub fn probabilities_from_map<I>(pairs: I) -> Result<ClassProbabilities>
where
    I: IntoIterator<Item = (i64, f32)>,
{
    let mut proba = [None, None];
    for (class_id, prob) in pairs {
        if let Some(slot) = usize::try_from(class_id).ok().and_then(|i| proba.get_mut(i)) {
            *slot = Some(f64::from(prob));
        }
    }
    match proba {
        [Some(neg), Some(pos)] => Ok([neg, pos]),
        [None, Some(pos)] => Ok([1.0 - pos, pos]),
        _ => Err(PipelineError::Inference(
            "no approval probability in map".to_string(),
        )),
    }
}
