//! ONNX classifier backed by ONNX Runtime

use crate::error::{PipelineError, Result};
use crate::feature_pipeline::FeatureMatrix;
use crate::models::classifier::{
    probabilities_from_map, probabilities_from_tensor, ClassProbabilities, Classifier,
};
use ort::memory::Allocator;
use ort::session::{builder::GraphOptimizationLevel, Session, SessionOutputs};
use ort::value::{DowncastableTarget, DynMapValueType, DynSequenceValueType, DynValue, Tensor};
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, info};

fn ort_error(e: impl std::fmt::Display) -> PipelineError {
    PipelineError::Inference(e.to_string())
}

/// Classifier exported to ONNX (e.g. a random forest converted with skl2onnx)
pub struct OnnxClassifier {
    /// Session runs need exclusive access
    session: Mutex<Session>,
    input_name: String,
    output_name: String,
    input_width: Option<usize>,
    decision_threshold: f64,
}

impl OnnxClassifier {
    /// Load an ONNX model from file
    pub fn load<P: AsRef<Path>>(
        path: P,
        threads: usize,
        input_width: Option<usize>,
        decision_threshold: f64,
    ) -> Result<Self> {
        let path = path.as_ref();

        info!(path = %path.display(), threads = threads, "Loading ONNX classifier");

        let session = Session::builder()
            .and_then(|b| b.with_optimization_level(GraphOptimizationLevel::Level3))
            .and_then(|b| b.with_intra_threads(threads))
            .and_then(|b| b.commit_from_file(path))
            .map_err(|e| PipelineError::artifact_load("classifier", path, e))?;

        let input_name = session
            .inputs
            .first()
            .map(|i| i.name.clone())
            .unwrap_or_else(|| "float_input".to_string());

        let output_name = session
            .outputs
            .iter()
            .find(|o| o.name.contains("prob"))
            .or_else(|| session.outputs.last())
            .map(|o| o.name.clone())
            .unwrap_or_else(|| "probabilities".to_string());

        info!(
            input = %input_name,
            output = %output_name,
            "ONNX classifier loaded"
        );

        Ok(Self {
            session: Mutex::new(session),
            input_name,
            output_name,
            input_width,
            decision_threshold,
        })
    }

    /// Pull `[p0, p1]` per row from the probability output.
    ///
    /// Handles a `[N, 2]` float tensor as well as the `seq(map(int64, float))`
    /// layout produced when ZipMap is left enabled on export.
    fn extract_probabilities(
        &self,
        outputs: &SessionOutputs,
        rows: usize,
    ) -> Result<Vec<ClassProbabilities>> {
        let output = outputs.get(self.output_name.as_str()).ok_or_else(|| {
            PipelineError::Inference(format!("model has no output `{}`", self.output_name))
        })?;

        if let Ok((shape, data)) = output.try_extract_tensor::<f32>() {
            let dims: Vec<i64> = shape.iter().copied().collect();
            let probabilities = probabilities_from_tensor(&dims, data, rows)?;
            debug!(rows = rows, "Extracted probabilities from tensor");
            return Ok(probabilities);
        }

        if DynSequenceValueType::can_downcast(&output.dtype()) {
            return self.extract_from_sequence_map(output, rows);
        }

        Err(PipelineError::Inference(format!(
            "unsupported output type for `{}`",
            self.output_name
        )))
    }

    fn extract_from_sequence_map(
        &self,
        output: &DynValue,
        rows: usize,
    ) -> Result<Vec<ClassProbabilities>> {
        let allocator = Allocator::default();

        let sequence = output
            .downcast_ref::<DynSequenceValueType>()
            .map_err(ort_error)?;
        let maps = sequence
            .try_extract_sequence::<DynMapValueType>(&allocator)
            .map_err(ort_error)?;

        if maps.len() != rows {
            return Err(PipelineError::Inference(format!(
                "expected {rows} probability maps, got {}",
                maps.len()
            )));
        }

        maps.iter()
            .map(|map_value| {
                let kv_pairs = map_value
                    .try_extract_key_values::<i64, f32>()
                    .map_err(ort_error)?;
                probabilities_from_map(kv_pairs.iter().copied())
            })
            .collect()
    }
}

impl Classifier for OnnxClassifier {
    fn name(&self) -> &str {
        "onnx"
    }

    fn input_width(&self) -> Option<usize> {
        self.input_width
    }

    fn decision_threshold(&self) -> f64 {
        self.decision_threshold
    }

    fn predict_proba(&self, features: &FeatureMatrix) -> Result<Vec<ClassProbabilities>> {
        let rows = features.row_count();
        let shape = vec![rows as i64, features.width() as i64];
        let input_tensor =
            Tensor::from_array((shape, features.as_slice().to_vec())).map_err(ort_error)?;

        let mut session = self
            .session
            .lock()
            .map_err(|e| PipelineError::Inference(format!("Lock error: {e}")))?;

        let outputs = session
            .run(ort::inputs![&self.input_name => input_tensor])
            .map_err(ort_error)?;

        self.extract_probabilities(&outputs, rows)
    }
}
