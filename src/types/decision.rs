//! Scoring outcomes and the messages published for them

use crate::error::{ErrorKind, PipelineError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Binary credit decision. Label 1 is approval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Approved,
    Denied,
}

impl Decision {
    /// Map a classifier label to a decision. Only 0 and 1 are valid.
    pub fn from_label(label: u8) -> Result<Self> {
        match label {
            1 => Ok(Decision::Approved),
            0 => Ok(Decision::Denied),
            other => Err(PipelineError::Inference(format!(
                "classifier produced label {other}, expected 0 or 1"
            ))),
        }
    }

    pub fn label(&self) -> u8 {
        match self {
            Decision::Approved => 1,
            Decision::Denied => 0,
        }
    }

    /// Human-readable status string
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Approved => "Approved",
            Decision::Denied => "Denied",
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-record output of the inference engine
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    pub decision: Decision,
    /// Probability of approval (0.0 - 1.0)
    pub probability: f64,
}

impl PredictionResult {
    /// Approval probability as a percentage (0 - 100).
    pub fn probability_percent(&self) -> f64 {
        self.probability * 100.0
    }

    /// Percentage rendered with two decimals and a percent sign, e.g. `82.00%`.
    pub fn formatted_percent(&self) -> String {
        format!("{:.2}%", self.probability_percent())
    }
}

/// Decision published for a single application received over NATS
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionMessage {
    /// Unique message identifier
    pub decision_id: String,

    /// Identifier supplied with the application, if any
    pub application_id: Option<String>,

    pub decision: Decision,

    /// Probability of approval (0.0 - 1.0)
    pub probability: f64,

    /// Version of the artifact bundle that produced the decision
    pub bundle_version: String,

    pub timestamp: DateTime<Utc>,
}

impl DecisionMessage {
    pub fn new(
        application_id: Option<String>,
        result: PredictionResult,
        bundle_version: impl Into<String>,
    ) -> Self {
        Self {
            decision_id: uuid::Uuid::new_v4().to_string(),
            application_id,
            decision: result.decision,
            probability: result.probability,
            bundle_version: bundle_version.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Published instead of a decision when an application cannot be scored
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RejectionMessage {
    pub application_id: Option<String>,
    /// Error kind (validation, encoding, shape, ...)
    pub kind: String,
    pub field: Option<String>,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl RejectionMessage {
    pub fn from_error(application_id: Option<String>, error: &PipelineError) -> Self {
        Self {
            application_id,
            kind: error.kind().as_str().to_string(),
            field: error.field().map(str::to_string),
            message: error.to_string(),
            timestamp: Utc::now(),
        }
    }

    /// Rejection for a payload that could not even be parsed as an application.
    pub fn malformed(message: impl Into<String>) -> Self {
        Self {
            application_id: None,
            kind: ErrorKind::Validation.as_str().to_string(),
            field: None,
            message: message.into(),
            timestamp: Utc::now(),
        }
    }
}
