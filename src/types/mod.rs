//! Type definitions for the loan scoring pipeline

pub mod application;
pub mod decision;

pub use application::{ApplicationForm, FieldValue, RawRecord};
pub use decision::{Decision, DecisionMessage, PredictionResult, RejectionMessage};
