//! Scoring orchestration for single applications and CSV batches.
//!
//! Single applications report the approval probability as a fraction (0-1).
//! Batch reports render it as a percentage (0-100) with two decimals.

use crate::error::{PipelineError, Result};
use crate::feature_pipeline::{FeatureMatrix, FeaturePipeline};
use crate::ingest::CsvBatch;
use crate::models::inference::InferenceEngine;
use crate::models::loader::ArtifactSet;
use crate::types::application::{ApplicationForm, RawRecord};
use crate::types::decision::PredictionResult;
use std::io::Write;
use std::sync::Arc;
use tracing::{debug, warn};

pub const STATUS_COLUMN: &str = "Status";
pub const PROBABILITY_COLUMN: &str = "Probability";
pub const ERROR_COLUMN: &str = "Error";
pub const FAILED_STATUS: &str = "Failed";

/// Outcome for one batch row
#[derive(Debug)]
pub enum RowOutcome {
    Scored(PredictionResult),
    Failed(PipelineError),
}

/// Original cell values of a row plus its outcome
#[derive(Debug)]
pub struct BatchRow {
    pub values: Vec<String>,
    pub outcome: RowOutcome,
}

/// Batch result in file order
#[derive(Debug, Default)]
pub struct BatchReport {
    headers: Vec<String>,
    rows: Vec<BatchRow>,
}

impl BatchReport {
    pub fn rows(&self) -> &[BatchRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn failed_count(&self) -> usize {
        self.rows
            .iter()
            .filter(|r| matches!(r.outcome, RowOutcome::Failed(_)))
            .count()
    }

    pub fn approved_count(&self) -> usize {
        self.rows
            .iter()
            .filter(|r| {
                matches!(&r.outcome, RowOutcome::Scored(p) if p.decision.label() == 1)
            })
            .count()
    }

    /// Original headers followed by the derived columns.
    ///
    /// The error column only appears when at least one row failed.
    pub fn output_headers(&self) -> Vec<String> {
        let mut headers = self.headers.clone();
        headers.push(STATUS_COLUMN.to_string());
        headers.push(PROBABILITY_COLUMN.to_string());
        if self.failed_count() > 0 {
            headers.push(ERROR_COLUMN.to_string());
        }
        headers
    }

    pub fn output_rows(&self) -> Vec<Vec<String>> {
        let with_errors = self.failed_count() > 0;
        self.rows
            .iter()
            .map(|row| {
                let mut cells = row.values.clone();
                match &row.outcome {
                    RowOutcome::Scored(result) => {
                        cells.push(result.decision.to_string());
                        cells.push(result.formatted_percent());
                        if with_errors {
                            cells.push(String::new());
                        }
                    }
                    RowOutcome::Failed(error) => {
                        cells.push(FAILED_STATUS.to_string());
                        cells.push(String::new());
                        cells.push(error.to_string());
                    }
                }
                cells
            })
            .collect()
    }

    pub fn write_csv<W: Write>(&self, writer: W) -> Result<()> {
        let mut writer = csv::Writer::from_writer(writer);
        writer.write_record(self.output_headers())?;
        for row in self.output_rows() {
            writer.write_record(row)?;
        }
        writer
            .flush()
            .map_err(|e| PipelineError::Csv(e.into()))?;
        Ok(())
    }
}

/// Feature pipeline and inference engine over one artifact set
#[derive(Clone)]
pub struct LoanScorer {
    artifacts: Arc<ArtifactSet>,
    pipeline: FeaturePipeline,
    engine: InferenceEngine,
    row_isolation: bool,
}

impl LoanScorer {
    pub fn new(artifacts: Arc<ArtifactSet>) -> Self {
        Self {
            pipeline: FeaturePipeline::new(artifacts.clone()),
            engine: InferenceEngine::new(artifacts.clone()),
            artifacts,
            row_isolation: false,
        }
    }

    /// Score good rows and report bad ones in place instead of failing the batch.
    pub fn with_row_isolation(mut self, enabled: bool) -> Self {
        self.row_isolation = enabled;
        self
    }

    pub fn bundle_version(&self) -> &str {
        self.artifacts.bundle_version()
    }

    pub fn pipeline(&self) -> &FeaturePipeline {
        &self.pipeline
    }

    pub fn engine(&self) -> &InferenceEngine {
        &self.engine
    }

    /// Prepare and infer a sequence of records; output order matches input order.
    pub fn score_records(&self, records: &[RawRecord]) -> Result<Vec<PredictionResult>> {
        let features = self.pipeline.prepare(records)?;
        self.engine.infer(&features)?.results()
    }

    /// Score one complete application. The probability is a fraction in [0, 1].
    pub fn score_application(&self, form: &ApplicationForm) -> Result<PredictionResult> {
        let mut results = self.score_records(std::slice::from_ref(&form.to_record()))?;
        results.pop().ok_or_else(|| {
            PipelineError::Inference("no prediction for submitted application".to_string())
        })
    }

    /// Score every row of a CSV batch.
    ///
    /// A header without every model column fails the batch even when it has no rows.
    pub fn score_batch(&self, batch: &CsvBatch) -> Result<BatchReport> {
        self.pipeline
            .check_columns(batch.headers().iter().map(String::as_str))?;
        let records = batch.records();
        let outcomes = if self.row_isolation {
            self.score_isolated(&records)?
        } else {
            self.score_records(&records)?
                .into_iter()
                .map(RowOutcome::Scored)
                .collect()
        };

        let report = BatchReport {
            headers: batch.headers().to_vec(),
            rows: batch
                .rows()
                .iter()
                .cloned()
                .zip(outcomes)
                .map(|(values, outcome)| BatchRow { values, outcome })
                .collect(),
        };

        debug!(
            rows = report.len(),
            approved = report.approved_count(),
            failed = report.failed_count(),
            "Batch scored"
        );
        Ok(report)
    }

    fn score_isolated(&self, records: &[RawRecord]) -> Result<Vec<RowOutcome>> {
        let mut prepared = Vec::with_capacity(records.len());
        let mut features = FeatureMatrix::with_capacity(self.pipeline.feature_count(), records.len());

        for (index, record) in records.iter().enumerate() {
            match self.pipeline.prepare_one(record) {
                Ok(row) => {
                    features.push_row(&row)?;
                    prepared.push(Ok(()));
                }
                Err(e) => {
                    let e = e.at_row(index + 1);
                    warn!(error = %e, "Batch row rejected");
                    prepared.push(Err(e));
                }
            }
        }

        let mut results = self.engine.infer(&features)?.results()?.into_iter();
        prepared
            .into_iter()
            .map(|slot| match slot {
                Ok(()) => results.next().map(RowOutcome::Scored).ok_or_else(|| {
                    PipelineError::Inference("fewer predictions than prepared rows".to_string())
                }),
                Err(e) => Ok(RowOutcome::Failed(e)),
            })
            .collect()
    }
}
