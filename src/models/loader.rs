//! Artifact bundle loader
//!
//! A bundle is a directory with a `manifest.json` naming the encoder, scaler
//! and classifier files plus the schema they were fitted on. The three
//! artifacts are loaded together or not at all.

use crate::error::{PipelineError, Result};
use crate::models::classifier::Classifier;
use crate::models::forest::ForestClassifier;
use crate::preprocessing::{CategoricalEncoder, NumericScaler, OneHotEncoder, StandardScaler};
use crate::schema::{canonical_name, FeatureSchema};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

pub const MANIFEST_FILE: &str = "manifest.json";

/// Serialized classifier formats understood by the loader
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClassifierFormat {
    /// Native tree ensemble in flat-array JSON
    Forest,
    /// ONNX model run through ONNX Runtime
    Onnx,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClassifierEntry {
    pub format: ClassifierFormat,
    pub path: String,
    /// Expected input width, required for ONNX models
    #[serde(default)]
    pub input_width: Option<usize>,
    /// Positive-class threshold for ONNX models
    #[serde(default)]
    pub decision_threshold: Option<f64>,
}

/// Contents of `manifest.json`
#[derive(Debug, Clone, Deserialize)]
pub struct BundleManifest {
    pub bundle_version: String,
    pub schema: FeatureSchema,
    pub encoder: String,
    pub scaler: String,
    pub classifier: ClassifierEntry,
}

/// Encoder, scaler and classifier fitted together, plus the schema they share.
///
/// Immutable once built; share it behind an `Arc`.
pub struct ArtifactSet {
    bundle_version: String,
    schema: FeatureSchema,
    encoder: Box<dyn CategoricalEncoder>,
    scaler: Box<dyn NumericScaler>,
    classifier: Box<dyn Classifier>,
}

impl ArtifactSet {
    /// Assemble an artifact set, checking that all parts agree on the schema
    /// and on the feature width.
    pub fn new(
        bundle_version: impl Into<String>,
        schema: FeatureSchema,
        encoder: Box<dyn CategoricalEncoder>,
        scaler: Box<dyn NumericScaler>,
        classifier: Box<dyn Classifier>,
    ) -> Result<Self> {
        let schema = schema.normalized();

        check_fields("encoder", &schema.categorical, encoder.feature_names())?;
        check_fields("scaler", &schema.numeric, scaler.feature_names())?;

        let width = encoder.output_width() + scaler.output_width();
        if let Some(expected) = classifier.input_width() {
            if expected != width {
                return Err(PipelineError::Shape {
                    stage: "artifact set",
                    expected,
                    actual: width,
                });
            }
        }

        Ok(Self {
            bundle_version: bundle_version.into(),
            schema,
            encoder,
            scaler,
            classifier,
        })
    }

    pub fn bundle_version(&self) -> &str {
        &self.bundle_version
    }

    pub fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    pub fn encoder(&self) -> &dyn CategoricalEncoder {
        self.encoder.as_ref()
    }

    pub fn scaler(&self) -> &dyn NumericScaler {
        self.scaler.as_ref()
    }

    pub fn classifier(&self) -> &dyn Classifier {
        self.classifier.as_ref()
    }

    /// Width of a prepared feature vector
    pub fn feature_width(&self) -> usize {
        self.encoder.output_width() + self.scaler.output_width()
    }
}

impl std::fmt::Debug for ArtifactSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArtifactSet")
            .field("bundle_version", &self.bundle_version)
            .field("schema", &self.schema)
            .field("classifier", &self.classifier.name())
            .field("feature_width", &self.feature_width())
            .finish()
    }
}

fn check_fields(artifact: &'static str, schema: &[String], fitted: &[String]) -> Result<()> {
    let fitted: Vec<&str> = fitted.iter().map(|f| canonical_name(f)).collect();
    if fitted != schema {
        return Err(PipelineError::artifact_load(
            artifact,
            "<bundle>",
            format!("fitted on {fitted:?}, schema expects {schema:?}"),
        ));
    }
    Ok(())
}

/// Loads artifact bundles from disk
pub struct ArtifactLoader {
    /// Threads per ONNX Runtime session
    onnx_threads: usize,
}

impl ArtifactLoader {
    pub fn new() -> Self {
        Self::with_threads(1)
    }

    pub fn with_threads(onnx_threads: usize) -> Self {
        Self {
            onnx_threads: onnx_threads.max(1),
        }
    }

    pub fn read_manifest<P: AsRef<Path>>(&self, bundle_dir: P) -> Result<BundleManifest> {
        let path = bundle_dir.as_ref().join(MANIFEST_FILE);
        let raw = fs::read_to_string(&path)
            .map_err(|e| PipelineError::artifact_load("manifest", &path, e))?;
        serde_json::from_str(&raw).map_err(|e| PipelineError::artifact_load("manifest", &path, e))
    }

    /// Load every artifact named by the bundle manifest.
    pub fn load_bundle<P: AsRef<Path>>(&self, bundle_dir: P) -> Result<ArtifactSet> {
        let bundle_dir = bundle_dir.as_ref();
        let manifest = self.read_manifest(bundle_dir)?;

        info!(
            bundle = %bundle_dir.display(),
            version = %manifest.bundle_version,
            schema = %manifest.schema.version,
            "Loading artifact bundle"
        );

        let encoder = OneHotEncoder::from_json_file(bundle_dir.join(&manifest.encoder))?;
        let scaler = StandardScaler::from_json_file(bundle_dir.join(&manifest.scaler))?;
        let classifier = self.load_classifier(bundle_dir, &manifest.classifier)?;

        let set = ArtifactSet::new(
            manifest.bundle_version,
            manifest.schema,
            Box::new(encoder),
            Box::new(scaler),
            classifier,
        )
        .map_err(|e| match e {
            PipelineError::ArtifactLoad {
                artifact, reason, ..
            } => PipelineError::ArtifactLoad {
                artifact,
                path: bundle_dir.join(MANIFEST_FILE),
                reason,
            },
            other => other,
        })?;

        info!(
            version = %set.bundle_version(),
            classifier = %set.classifier().name(),
            feature_width = set.feature_width(),
            "Artifact bundle loaded"
        );
        Ok(set)
    }

    fn load_classifier(
        &self,
        bundle_dir: &Path,
        entry: &ClassifierEntry,
    ) -> Result<Box<dyn Classifier>> {
        let path: PathBuf = bundle_dir.join(&entry.path);
        match entry.format {
            ClassifierFormat::Forest => Ok(Box::new(ForestClassifier::from_json_file(&path)?)),
            #[cfg(feature = "onnx")]
            ClassifierFormat::Onnx => {
                let model = crate::models::onnx::OnnxClassifier::load(
                    &path,
                    self.onnx_threads,
                    entry.input_width,
                    entry.decision_threshold.unwrap_or(0.5),
                )?;
                Ok(Box::new(model))
            }
            #[cfg(not(feature = "onnx"))]
            ClassifierFormat::Onnx => Err(PipelineError::artifact_load(
                "classifier",
                &path,
                format!(
                    "ONNX support not compiled in (requested {} threads)",
                    self.onnx_threads
                ),
            )),
        }
    }
}

impl Default for ArtifactLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::feature_pipeline::FeatureMatrix;
    use crate::models::classifier::ClassProbabilities;
    use crate::schema::{CATEGORICAL_FIELDS, NUMERIC_FIELDS};

    /// Classifier that returns the same approval probability for every row
    pub(crate) struct FixedClassifier {
        pub probability: f64,
        pub width: usize,
    }

    impl Classifier for FixedClassifier {
        fn name(&self) -> &str {
            "fixed"
        }

        fn input_width(&self) -> Option<usize> {
            Some(self.width)
        }

        fn predict_proba(&self, features: &FeatureMatrix) -> Result<Vec<ClassProbabilities>> {
            Ok(features
                .rows()
                .map(|_| [1.0 - self.probability, self.probability])
                .collect())
        }
    }

    pub(crate) fn stub_encoder() -> OneHotEncoder {
        let vocab = |values: &[&str]| values.iter().map(|v| v.to_string()).collect::<Vec<_>>();
        OneHotEncoder::new(
            CATEGORICAL_FIELDS.iter().map(|f| f.to_string()).collect(),
            vec![
                vocab(&["F", "M"]),
                vocab(&["N", "Y"]),
                vocab(&["N", "Y"]),
                vocab(&["Pensioner", "Working"]),
                vocab(&["Higher education", "Secondary"]),
                vocab(&["Married", "Single"]),
                vocab(&["apartment", "house", "rented"]),
            ],
        )
        .unwrap()
    }

    pub(crate) fn stub_scaler() -> StandardScaler {
        StandardScaler::new(
            NUMERIC_FIELDS.iter().map(|f| f.to_string()).collect(),
            vec![40.0, 100_000.0, 10.0],
            vec![10.0, 50_000.0, 5.0],
        )
        .unwrap()
    }

    /// Artifact set with small vocabularies and a fixed-probability classifier
    pub(crate) fn stub_artifacts(probability: f64) -> ArtifactSet {
        let encoder = stub_encoder();
        let width = encoder.output_width() + 3;
        ArtifactSet::new(
            "stub",
            FeatureSchema::default(),
            Box::new(encoder),
            Box::new(stub_scaler()),
            Box::new(FixedClassifier { probability, width }),
        )
        .unwrap()
    }

    #[test]
    fn test_stub_width() {
        assert_eq!(stub_artifacts(0.5).feature_width(), 18);
    }

    #[test]
    fn test_schema_order_mismatch_rejected() {
        let mut schema = FeatureSchema::default();
        schema.numeric.swap(0, 1);

        let err = ArtifactSet::new(
            "stub",
            schema,
            Box::new(stub_encoder()),
            Box::new(stub_scaler()),
            Box::new(FixedClassifier {
                probability: 0.5,
                width: 18,
            }),
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ArtifactLoad);
    }

    #[test]
    fn test_classifier_width_mismatch_rejected() {
        let err = ArtifactSet::new(
            "stub",
            FeatureSchema::default(),
            Box::new(stub_encoder()),
            Box::new(stub_scaler()),
            Box::new(FixedClassifier {
                probability: 0.5,
                width: 17,
            }),
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Shape);
    }

    fn bundled_dir() -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR")).join("artifacts/credit-approval")
    }

    #[test]
    fn test_load_bundled_artifacts() {
        let set = ArtifactLoader::new().load_bundle(bundled_dir()).unwrap();
        assert_eq!(set.schema(), &FeatureSchema::credit_approval_v1());
        assert_eq!(set.feature_width(), 30);
        assert_eq!(set.classifier().input_width(), Some(30));
    }

    #[test]
    fn test_missing_bundle_is_artifact_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = ArtifactLoader::new().load_bundle(dir.path()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ArtifactLoad);
    }

    #[test]
    fn test_partial_bundle_fails_as_a_whole() {
        let dir = tempfile::tempdir().unwrap();
        for file in [MANIFEST_FILE, "encoder.json", "scaler.json"] {
            fs::copy(bundled_dir().join(file), dir.path().join(file)).unwrap();
        }

        let err = ArtifactLoader::new().load_bundle(dir.path()).unwrap_err();
        match err {
            PipelineError::ArtifactLoad { artifact, .. } => assert_eq!(artifact, "classifier"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_manifest_schema_drift_rejected() {
        let dir = tempfile::tempdir().unwrap();
        for file in [MANIFEST_FILE, "encoder.json", "scaler.json", "classifier.json"] {
            fs::copy(bundled_dir().join(file), dir.path().join(file)).unwrap();
        }
        let manifest = fs::read_to_string(dir.path().join(MANIFEST_FILE)).unwrap();
        let drifted = manifest.replace(
            r#""numeric": ["age", "annual_income", "work_experience"]"#,
            r#""numeric": ["annual_income", "age", "work_experience"]"#,
        );
        assert_ne!(manifest, drifted);
        fs::write(dir.path().join(MANIFEST_FILE), drifted).unwrap();

        let err = ArtifactLoader::new().load_bundle(dir.path()).unwrap_err();
        match err {
            PipelineError::ArtifactLoad { artifact, path, .. } => {
                assert_eq!(artifact, "scaler");
                assert!(path.ends_with(MANIFEST_FILE));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
