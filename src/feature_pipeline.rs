//! Feature preparation for credit approval inference.
//!
//! Turns raw application records into the numeric layout the classifier was
//! trained on: `[one-hot categorical block | standardized numeric block]`,
//! one row per record, in input order.

use crate::error::{PipelineError, Result};
use crate::models::loader::ArtifactSet;
use crate::schema::canonical_name;
use crate::types::application::{FieldValue, RawRecord};
use std::sync::Arc;

/// One prepared record, ready for the classifier
pub type FeatureVector = Vec<f32>;

/// Row-major matrix of prepared records
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrix {
    width: usize,
    data: Vec<f32>,
}

impl FeatureMatrix {
    pub fn with_capacity(width: usize, rows: usize) -> Self {
        Self {
            width,
            data: Vec::with_capacity(width * rows),
        }
    }

    /// Build a matrix from owned rows; every row must have `width` columns.
    pub fn from_rows(width: usize, rows: Vec<FeatureVector>) -> Result<Self> {
        let mut matrix = Self::with_capacity(width, rows.len());
        for row in rows {
            matrix.push_row(&row)?;
        }
        Ok(matrix)
    }

    pub fn push_row(&mut self, row: &[f32]) -> Result<()> {
        if row.len() != self.width {
            return Err(PipelineError::Shape {
                stage: "feature row",
                expected: self.width,
                actual: row.len(),
            });
        }
        self.data.extend_from_slice(row);
        Ok(())
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn row_count(&self) -> usize {
        if self.width == 0 {
            0
        } else {
            self.data.len() / self.width
        }
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn row(&self, index: usize) -> Option<&[f32]> {
        let start = index.checked_mul(self.width)?;
        self.data.get(start..start + self.width)
    }

    pub fn rows(&self) -> impl Iterator<Item = &[f32]> {
        self.data.chunks_exact(self.width.max(1))
    }

    /// Flat row-major data
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }
}

/// Prepares raw records with the encoder and scaler of one artifact set.
#[derive(Clone)]
pub struct FeaturePipeline {
    artifacts: Arc<ArtifactSet>,
}

impl FeaturePipeline {
    pub fn new(artifacts: Arc<ArtifactSet>) -> Self {
        Self { artifacts }
    }

    /// Number of features produced per record
    pub fn feature_count(&self) -> usize {
        self.artifacts.feature_width()
    }

    /// Column names of the prepared matrix, e.g. `gender=F`, `age`.
    pub fn feature_names(&self) -> Vec<String> {
        let encoded = self.artifacts.encoder().output_names();
        encoded
            .into_iter()
            .chain(self.artifacts.schema().numeric.iter().cloned())
            .collect()
    }

    /// Check that a batch's columns cover every model field, whatever its row count.
    ///
    /// Column names are resolved through their aliases; the first absent model
    /// field is reported.
    pub fn check_columns<'a, I>(&self, columns: I) -> Result<()>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let present: Vec<&str> = columns.into_iter().map(canonical_name).collect();
        match self
            .artifacts
            .schema()
            .model_fields()
            .find(|field| !present.contains(field))
        {
            Some(field) => Err(PipelineError::MissingField {
                field: field.to_string(),
            }),
            None => Ok(()),
        }
    }

    /// Prepare a batch of records, preserving their order.
    ///
    /// The first failing record aborts the batch; its error carries the
    /// 1-based row number.
    pub fn prepare(&self, records: &[RawRecord]) -> Result<FeatureMatrix> {
        let mut matrix = FeatureMatrix::with_capacity(self.feature_count(), records.len());
        let mut row = Vec::with_capacity(self.feature_count());

        for (index, record) in records.iter().enumerate() {
            row.clear();
            self.prepare_into(record, &mut row)
                .map_err(|e| e.at_row(index + 1))?;
            matrix.push_row(&row)?;
        }

        Ok(matrix)
    }

    /// Prepare a single record.
    pub fn prepare_one(&self, record: &RawRecord) -> Result<FeatureVector> {
        let mut row = Vec::with_capacity(self.feature_count());
        self.prepare_into(record, &mut row)?;
        Ok(row)
    }

    fn prepare_into(&self, record: &RawRecord, out: &mut Vec<f32>) -> Result<()> {
        let schema = self.artifacts.schema();

        let categorical = schema
            .categorical
            .iter()
            .map(|field| categorical_value(record, field))
            .collect::<Result<Vec<String>>>()?;
        let categorical: Vec<&str> = categorical.iter().map(String::as_str).collect();
        self.artifacts.encoder().encode_into(&categorical, out)?;

        let numeric = schema
            .numeric
            .iter()
            .map(|field| numeric_value(record, field))
            .collect::<Result<Vec<f64>>>()?;
        self.artifacts.scaler().scale_into(&numeric, out)?;

        if out.len() != self.feature_count() {
            return Err(PipelineError::Shape {
                stage: "prepared record",
                expected: self.feature_count(),
                actual: out.len(),
            });
        }
        Ok(())
    }
}

fn lookup<'a>(record: &'a RawRecord, field: &str) -> Result<&'a FieldValue> {
    match record.get(field) {
        Some(value) if !value.is_missing() => Ok(value),
        _ => Err(PipelineError::MissingField {
            field: field.to_string(),
        }),
    }
}

/// Categorical values are compared as text.
fn categorical_value(record: &RawRecord, field: &str) -> Result<String> {
    Ok(lookup(record, field)?.to_string())
}

/// Numeric values accept integers, floats, or text that parses as a finite number.
fn numeric_value(record: &RawRecord, field: &str) -> Result<f64> {
    let value = lookup(record, field)?;
    let parsed = match value {
        FieldValue::Integer(v) => Some(*v as f64),
        FieldValue::Float(v) => Some(*v),
        FieldValue::Text(text) => text.trim().parse::<f64>().ok(),
        FieldValue::Missing => None,
    };

    match parsed {
        Some(v) if v.is_finite() => Ok(v),
        _ => Err(PipelineError::InvalidValue {
            field: field.to_string(),
            value: value.to_string(),
            expected: "a number",
        }),
    }
}
