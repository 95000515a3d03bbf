//! Classifier artifacts, bundle loading and inference

pub mod classifier;
pub mod forest;
pub mod inference;
pub mod loader;
#[cfg(feature = "onnx")]
pub mod onnx;

pub use classifier::Classifier;
pub use forest::ForestClassifier;
pub use inference::{InferenceEngine, Predictions};
pub use loader::{ArtifactLoader, ArtifactSet};
