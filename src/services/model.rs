//! Trained model loading and invocation.
//!
//! The network is exported to ONNX after training and executed with
//! `tract-onnx`. The input width is pinned at load time so a layout mismatch
//! between the feature assembler and the exported graph fails at startup.

use std::path::Path;

use tract_onnx::prelude::*;

#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("failed to load model {path}: {reason}")]
    Load { path: String, reason: String },

    #[error("feature vector has {actual} columns but the model expects {expected}")]
    WidthMismatch { expected: usize, actual: usize },

    #[error("model declares {actual} outputs but {expected} are required")]
    HeadMismatch { expected: usize, actual: usize },

    #[error("inference failed: {0}")]
    Inference(String),

    #[error("model output {0} is empty")]
    EmptyOutput(usize),
}

/// Raw model heads for one feature vector.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelOutput {
    /// Demand estimate (first head)
    pub demand: f32,
    /// Urgency probability (second head), when the model has one
    pub urgency: Option<f32>,
}

/// A loaded, read-only predictor shared across requests.
pub trait DemandModel: Send + Sync {
    /// Number of feature columns the model was fit on.
    fn input_width(&self) -> usize;

    /// Number of output heads (1 = demand only, 2 = demand + urgency).
    fn output_heads(&self) -> usize;

    /// Run one forward pass. Blocking and CPU-bound.
    fn predict(&self, features: &[f32]) -> Result<ModelOutput, ModelError>;
}

/// Check the vector width before handing it to a model.
pub fn ensure_width(model: &dyn DemandModel, features: &[f32]) -> Result<(), ModelError> {
    if features.len() != model.input_width() {
        return Err(ModelError::WidthMismatch {
            expected: model.input_width(),
            actual: features.len(),
        });
    }
    Ok(())
}

type Plan = SimplePlan<TypedFact, Box<dyn TypedOp>, TypedModel>;

/// ONNX model executed by tract.
pub struct OnnxModel {
    plan: Plan,
    input_width: usize,
    output_heads: usize,
}

impl OnnxModel {
    /// Load and optimize the graph for a `[1, input_width]` f32 input.
    ///
    /// Fails when the graph rejects that shape, when it declares a different
    /// number of outputs than `expected_heads`, or when a zero-vector warmup
    /// pass does not produce every head.
    pub fn load(
        path: impl AsRef<Path>,
        input_width: usize,
        expected_heads: usize,
    ) -> Result<Self, ModelError> {
        let path = path.as_ref();
        let load_err = |e: TractError| ModelError::Load {
            path: path.display().to_string(),
            reason: format!("{:#}", e),
        };

        let typed = tract_onnx::onnx()
            .model_for_path(path)
            .and_then(|m| m.with_input_fact(0, f32::fact([1, input_width]).into()))
            .and_then(|m| m.into_optimized())
            .map_err(load_err)?;

        let output_heads = typed.output_outlets().map_err(load_err)?.len();
        if output_heads != expected_heads {
            return Err(ModelError::HeadMismatch {
                expected: expected_heads,
                actual: output_heads,
            });
        }

        let plan = typed.into_runnable().map_err(load_err)?;
        let model = Self {
            plan,
            input_width,
            output_heads,
        };

        model.predict(&vec![0.0; input_width])?;
        tracing::info!(
            "Loaded model {} (input width {}, {} output heads)",
            path.display(),
            input_width,
            output_heads
        );
        Ok(model)
    }
}

impl DemandModel for OnnxModel {
    fn input_width(&self) -> usize {
        self.input_width
    }

    fn output_heads(&self) -> usize {
        self.output_heads
    }

    fn predict(&self, features: &[f32]) -> Result<ModelOutput, ModelError> {
        ensure_width(self, features)?;

        let input = Tensor::from_shape(&[1, self.input_width], features)
            .map_err(|e| ModelError::Inference(format!("{:#}", e)))?;
        let outputs = self
            .plan
            .run(tvec!(input.into()))
            .map_err(|e| ModelError::Inference(format!("{:#}", e)))?;

        let first_value = |index: usize| -> Result<f32, ModelError> {
            let tensor = outputs.get(index).ok_or(ModelError::HeadMismatch {
                expected: self.output_heads,
                actual: outputs.len(),
            })?;
            let view = tensor.to_array_view::<f32>().map_err(|e| {
                ModelError::Inference(format!("output {} is not f32: {:#}", index, e))
            })?;
            view.iter().next().copied().ok_or(ModelError::EmptyOutput(index))
        };

        Ok(ModelOutput {
            demand: first_value(0)?,
            urgency: if self.output_heads > 1 {
                Some(first_value(1)?)
            } else {
                None
            },
        })
    }
}
