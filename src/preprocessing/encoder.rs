//! Categorical encoding with a vocabulary fixed at training time

use crate::error::{PipelineError, Result};
use crate::schema::canonical_name;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Maps categorical columns to a fixed-width numeric block.
pub trait CategoricalEncoder: Send + Sync {
    /// Column names the encoder was fitted on, in order
    fn feature_names(&self) -> &[String];

    /// Number of output columns per record
    fn output_width(&self) -> usize;

    /// Names of the output columns, in order
    fn output_names(&self) -> Vec<String>;

    /// Encode one record's categorical values (in `feature_names` order) into `out`.
    ///
    /// Values outside the fitted vocabulary are an error.
    fn encode_into(&self, values: &[&str], out: &mut Vec<f32>) -> Result<()>;
}

/// One-hot encoder fitted on a known category list per column.
///
/// Unknown categories are rejected; there is no "ignore" mode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OneHotEncoder {
    feature_names: Vec<String>,
    categories: Vec<Vec<String>>,
}

impl OneHotEncoder {
    pub fn new(feature_names: Vec<String>, categories: Vec<Vec<String>>) -> Result<Self> {
        if feature_names.len() != categories.len() {
            return Err(PipelineError::Shape {
                stage: "encoder vocabulary",
                expected: feature_names.len(),
                actual: categories.len(),
            });
        }
        Ok(Self {
            feature_names,
            categories,
        })
    }

    /// Load a fitted encoder from its JSON form.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .map_err(|e| PipelineError::artifact_load("encoder", path, e))?;
        let encoder: OneHotEncoder = serde_json::from_str(&raw)
            .map_err(|e| PipelineError::artifact_load("encoder", path, e))?;

        // Re-run construction checks on deserialized data
        Self::new(encoder.feature_names, encoder.categories)
            .map_err(|e| PipelineError::artifact_load("encoder", path, e))
    }
}

impl CategoricalEncoder for OneHotEncoder {
    fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    fn output_width(&self) -> usize {
        self.categories.iter().map(Vec::len).sum()
    }

    fn output_names(&self) -> Vec<String> {
        self.feature_names
            .iter()
            .zip(&self.categories)
            .flat_map(|(name, vocabulary)| {
                vocabulary
                    .iter()
                    .map(move |category| format!("{}={category}", canonical_name(name)))
            })
            .collect()
    }

    fn encode_into(&self, values: &[&str], out: &mut Vec<f32>) -> Result<()> {
        if values.len() != self.categories.len() {
            return Err(PipelineError::Shape {
                stage: "categorical encoding",
                expected: self.categories.len(),
                actual: values.len(),
            });
        }

        for ((name, vocabulary), value) in self
            .feature_names
            .iter()
            .zip(&self.categories)
            .zip(values)
        {
            let hot = vocabulary
                .iter()
                .position(|category| category == value)
                .ok_or_else(|| PipelineError::UnknownCategory {
                    field: canonical_name(name).to_string(),
                    value: value.to_string(),
                })?;

            out.extend((0..vocabulary.len()).map(|i| if i == hot { 1.0 } else { 0.0 }));
        }

        Ok(())
    }
}
