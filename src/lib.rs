//! Loan Scoring Pipeline Library
//!
//! Turns credit applications into approve/deny decisions with a calibrated
//! approval probability, using a versioned bundle of fitted artifacts
//! (categorical encoder, numeric scaler, classifier).

pub mod config;
pub mod consumer;
pub mod error;
pub mod feature_pipeline;
pub mod ingest;
pub mod metrics;
pub mod models;
pub mod preprocessing;
pub mod producer;
pub mod schema;
pub mod scoring;
pub mod types;

pub use config::AppConfig;
pub use consumer::ApplicationConsumer;
pub use error::{ErrorKind, PipelineError};
pub use feature_pipeline::{FeatureMatrix, FeaturePipeline};
pub use ingest::CsvBatch;
pub use models::inference::InferenceEngine;
pub use models::loader::{ArtifactLoader, ArtifactSet};
pub use producer::DecisionProducer;
pub use scoring::{BatchReport, LoanScorer};
pub use types::{ApplicationForm, Decision, PredictionResult, RawRecord};
