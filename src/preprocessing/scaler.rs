//! Numeric normalization with statistics learned at training time

use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Applies a fitted per-column normalization to numeric fields.
pub trait NumericScaler: Send + Sync {
    /// Column names the scaler was fitted on, in order
    fn feature_names(&self) -> &[String];

    fn output_width(&self) -> usize {
        self.feature_names().len()
    }

    /// Scale one record's numeric values (in `feature_names` order) into `out`.
    fn scale_into(&self, values: &[f64], out: &mut Vec<f32>) -> Result<()>;
}

/// Standardizes features as `z = (x - mean) / scale`.
///
/// A zero scale (constant column at fit time) is treated as 1.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StandardScaler {
    feature_names: Vec<String>,
    mean: Vec<f64>,
    scale: Vec<f64>,
}

impl StandardScaler {
    pub fn new(feature_names: Vec<String>, mean: Vec<f64>, scale: Vec<f64>) -> Result<Self> {
        for (stage, len) in [("scaler mean", mean.len()), ("scaler scale", scale.len())] {
            if len != feature_names.len() {
                return Err(PipelineError::Shape {
                    stage,
                    expected: feature_names.len(),
                    actual: len,
                });
            }
        }

        let scale = scale
            .into_iter()
            .map(|s| if s == 0.0 { 1.0 } else { s })
            .collect();

        Ok(Self {
            feature_names,
            mean,
            scale,
        })
    }

    /// Load a fitted scaler from its JSON form.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .map_err(|e| PipelineError::artifact_load("scaler", path, e))?;
        let scaler: StandardScaler = serde_json::from_str(&raw)
            .map_err(|e| PipelineError::artifact_load("scaler", path, e))?;

        if scaler
            .mean
            .iter()
            .chain(&scaler.scale)
            .any(|v| !v.is_finite())
        {
            return Err(PipelineError::artifact_load(
                "scaler",
                path,
                "statistics contain non-finite values",
            ));
        }

        Self::new(scaler.feature_names, scaler.mean, scaler.scale)
            .map_err(|e| PipelineError::artifact_load("scaler", path, e))
    }
}

impl NumericScaler for StandardScaler {
    fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    fn scale_into(&self, values: &[f64], out: &mut Vec<f32>) -> Result<()> {
        if values.len() != self.mean.len() {
            return Err(PipelineError::Shape {
                stage: "numeric scaling",
                expected: self.mean.len(),
                actual: values.len(),
            });
        }

        out.extend(
            values
                .iter()
                .zip(self.mean.iter().zip(&self.scale))
                .map(|(x, (mean, scale))| ((x - mean) / scale) as f32),
        );
        Ok(())
    }
}
