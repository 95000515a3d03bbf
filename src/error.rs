//! Error taxonomy for feature preparation, artifact loading and inference

use std::path::PathBuf;
use thiserror::Error;

/// Coarse classification of a [`PipelineError`], used for logging and rejection messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Missing or malformed required field
    Validation,
    /// Categorical value outside the fitted vocabulary
    Encoding,
    /// Feature width disagrees with what an artifact expects
    Shape,
    /// An artifact could not be loaded
    ArtifactLoad,
    /// The classifier failed or produced an unusable output
    Inference,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::Encoding => "encoding",
            ErrorKind::Shape => "shape",
            ErrorKind::ArtifactLoad => "artifact_load",
            ErrorKind::Inference => "inference",
        }
    }
}

/// Errors surfaced by the scoring core. None of them are defaulted away.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("missing required field `{field}`")]
    MissingField { field: String },

    #[error("invalid value {value:?} for field `{field}`: expected {expected}")]
    InvalidValue {
        field: String,
        value: String,
        expected: &'static str,
    },

    #[error("unknown category {value:?} for field `{field}`")]
    UnknownCategory { field: String, value: String },

    #[error("shape mismatch in {stage}: expected {expected} columns, got {actual}")]
    Shape {
        stage: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("failed to load {artifact} from {}: {reason}", path.display())]
    ArtifactLoad {
        artifact: &'static str,
        path: PathBuf,
        reason: String,
    },

    #[error("inference failed: {0}")]
    Inference(String),

    #[error("row {row}: {source}")]
    Row {
        /// 1-based data row number (header excluded)
        row: usize,
        #[source]
        source: Box<PipelineError>,
    },

    #[error("batch input error: {0}")]
    Csv(#[from] csv::Error),
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::MissingField { .. }
            | PipelineError::InvalidValue { .. }
            | PipelineError::Csv(_) => ErrorKind::Validation,
            PipelineError::UnknownCategory { .. } => ErrorKind::Encoding,
            PipelineError::Shape { .. } => ErrorKind::Shape,
            PipelineError::ArtifactLoad { .. } => ErrorKind::ArtifactLoad,
            PipelineError::Inference(_) => ErrorKind::Inference,
            PipelineError::Row { source, .. } => source.kind(),
        }
    }

    /// Attach a 1-based row number to an error raised while handling a batch.
    pub fn at_row(self, row: usize) -> Self {
        match self {
            PipelineError::Row { .. } => self,
            other => PipelineError::Row {
                row,
                source: Box::new(other),
            },
        }
    }

    /// Row number, when the error was raised for a specific batch row.
    pub fn row(&self) -> Option<usize> {
        match self {
            PipelineError::Row { row, .. } => Some(*row),
            _ => None,
        }
    }

    /// Field that triggered the error, if any.
    pub fn field(&self) -> Option<&str> {
        match self {
            PipelineError::MissingField { field }
            | PipelineError::InvalidValue { field, .. }
            | PipelineError::UnknownCategory { field, .. } => Some(field),
            PipelineError::Row { source, .. } => source.field(),
            _ => None,
        }
    }

    pub(crate) fn artifact_load(
        artifact: &'static str,
        path: impl Into<PathBuf>,
        reason: impl ToString,
    ) -> Self {
        PipelineError::ArtifactLoad {
            artifact,
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
