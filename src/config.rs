//! Configuration management for the loan scoring service

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Default location of the configuration file
pub const DEFAULT_CONFIG_PATH: &str = "config/config.toml";

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub nats: NatsConfig,
    pub artifacts: ArtifactsConfig,
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub batch: BatchConfig,
    pub logging: LoggingConfig,
}

/// NATS connection configuration
#[derive(Debug, Clone, Deserialize)]
pub struct NatsConfig {
    /// NATS server URL
    pub url: String,
    /// Subject for incoming applications
    pub application_subject: String,
    /// Subject for outgoing decisions
    pub decision_subject: String,
    /// Subject for applications that could not be scored
    #[serde(default = "default_rejection_subject")]
    pub rejection_subject: String,
}

fn default_rejection_subject() -> String {
    "loan.rejections".to_string()
}

/// Artifact bundle configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ArtifactsConfig {
    /// Directory holding manifest.json and the fitted artifacts
    pub bundle_dir: PathBuf,
    /// Number of threads for ONNX inference (default: 1)
    #[serde(default = "default_onnx_threads")]
    pub onnx_threads: usize,
}

fn default_onnx_threads() -> usize {
    1
}

/// Pipeline configuration
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    /// Maximum applications scored concurrently
    pub workers: usize,
    /// Seconds between metrics summaries
    #[serde(default = "default_metrics_interval")]
    pub metrics_interval_secs: u64,
}

fn default_metrics_interval() -> u64 {
    30
}

/// Batch (file) scoring configuration
#[derive(Debug, Clone, Deserialize)]
pub struct BatchConfig {
    /// Report bad rows in place instead of failing the whole batch
    #[serde(default)]
    pub row_isolation: bool,
    /// Accepted upload extensions
    #[serde(default = "default_allowed_extensions")]
    pub allowed_extensions: Vec<String>,
}

fn default_allowed_extensions() -> Vec<String> {
    vec!["csv".to_string()]
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            row_isolation: false,
            allowed_extensions: default_allowed_extensions(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Log format (json, pretty)
    pub format: String,
}

impl AppConfig {
    /// Load configuration from a specific path, with `LOAN_` environment overrides
    /// (`LOAN_NATS__URL`, `LOAN_BATCH__ROW_ISOLATION`, ...).
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::from(path.as_ref()))
            .add_source(
                Environment::with_prefix("LOAN")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()
            .with_context(|| {
                format!("Failed to build configuration from {}", path.as_ref().display())
            })?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            nats: NatsConfig {
                url: "nats://localhost:4222".to_string(),
                application_subject: "loan.applications".to_string(),
                decision_subject: "loan.decisions".to_string(),
                rejection_subject: default_rejection_subject(),
            },
            artifacts: ArtifactsConfig {
                bundle_dir: PathBuf::from("artifacts/credit-approval"),
                onnx_threads: 1,
            },
            pipeline: PipelineConfig {
                workers: 4,
                metrics_interval_secs: default_metrics_interval(),
            },
            batch: BatchConfig::default(),
            logging: LoggingConfig {
                level: "info".to_string(),
                format: "json".to_string(),
            },
        }
    }
}
