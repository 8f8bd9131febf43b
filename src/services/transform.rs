//! Fitted preprocessing artifacts: one-hot encoder and min-max scaler.
//!
//! Both are exported from the training environment as JSON holding the
//! fitted parameters only. Applying them here is the fixed textbook formula;
//! the values themselves come from training and are never recomputed.

use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::helpers::value_as_category;

#[derive(Debug, thiserror::Error)]
pub enum TransformError {
    #[error("failed to read artifact {path}: {reason}")]
    Read { path: String, reason: String },

    #[error("failed to parse artifact {path}: {reason}")]
    Parse { path: String, reason: String },

    #[error("invalid artifact: {0}")]
    Invalid(String),

    #[error("{stage} expects {expected} columns, got {actual}")]
    Width {
        stage: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("unknown category '{value}' for categorical column {column}")]
    UnknownCategory { column: usize, value: String },
}

fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T, TransformError> {
    let text = std::fs::read_to_string(path).map_err(|e| TransformError::Read {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;
    serde_json::from_str(&text).map_err(|e| TransformError::Parse {
        path: path.display().to_string(),
        reason: e.to_string(),
    })
}

/// What to do with a category the encoder was not fit on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandleUnknown {
    /// Zero-fill the column's block.
    #[default]
    Ignore,
    /// Reject the input.
    Error,
}

#[derive(Debug, Deserialize)]
struct EncoderArtifact {
    categories: Vec<Vec<serde_json::Value>>,
    #[serde(default)]
    handle_unknown: HandleUnknown,
}

/// One-hot encoder with one block of indicator columns per categorical input.
#[derive(Debug, Clone)]
pub struct OneHotEncoder {
    categories: Vec<Vec<String>>,
    handle_unknown: HandleUnknown,
}

impl OneHotEncoder {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, TransformError> {
        Self::from_artifact(load_json(path.as_ref())?)
    }

    pub fn from_json_str(json: &str) -> Result<Self, TransformError> {
        let artifact: EncoderArtifact =
            serde_json::from_str(json).map_err(|e| TransformError::Parse {
                path: "<inline>".to_string(),
                reason: e.to_string(),
            })?;
        Self::from_artifact(artifact)
    }

    fn from_artifact(artifact: EncoderArtifact) -> Result<Self, TransformError> {
        let mut categories = Vec::with_capacity(artifact.categories.len());
        for (column, raw) in artifact.categories.iter().enumerate() {
            if raw.is_empty() {
                return Err(TransformError::Invalid(format!(
                    "encoder column {} has no categories",
                    column
                )));
            }
            let values = raw
                .iter()
                .map(|v| {
                    value_as_category(v).ok_or_else(|| {
                        TransformError::Invalid(format!(
                            "encoder column {} has a non-scalar category: {}",
                            column, v
                        ))
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
            categories.push(values);
        }

        Ok(Self {
            categories,
            handle_unknown: artifact.handle_unknown,
        })
    }

    /// Number of categorical inputs the encoder was fit on.
    pub fn n_inputs(&self) -> usize {
        self.categories.len()
    }

    /// Number of indicator columns produced.
    pub fn output_width(&self) -> usize {
        self.categories.iter().map(Vec::len).sum()
    }

    pub fn handle_unknown(&self) -> HandleUnknown {
        self.handle_unknown
    }

    pub fn categories(&self, column: usize) -> Option<&[String]> {
        self.categories.get(column).map(Vec::as_slice)
    }

    /// Append the one-hot encoding of `values` to `out`.
    pub fn transform_into(
        &self,
        values: &[String],
        out: &mut Vec<f32>,
    ) -> Result<(), TransformError> {
        if values.len() != self.categories.len() {
            return Err(TransformError::Width {
                stage: "encoder",
                expected: self.categories.len(),
                actual: values.len(),
            });
        }

        for (column, (value, cats)) in values.iter().zip(&self.categories).enumerate() {
            let hit = cats.iter().position(|c| c == value);
            if hit.is_none() && self.handle_unknown == HandleUnknown::Error {
                return Err(TransformError::UnknownCategory {
                    column,
                    value: value.clone(),
                });
            }
            out.extend((0..cats.len()).map(|i| if Some(i) == hit { 1.0 } else { 0.0 }));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct ScalerArtifact {
    data_min: Vec<f64>,
    data_max: Vec<f64>,
    #[serde(default = "default_feature_range")]
    feature_range: (f64, f64),
}

fn default_feature_range() -> (f64, f64) {
    (0.0, 1.0)
}

/// Min-max scaler mapping each column from its training range to `feature_range`.
#[derive(Debug, Clone)]
pub struct MinMaxScaler {
    data_min: Vec<f64>,
    /// Per-column divisor; 1 where the training range was zero.
    data_range: Vec<f64>,
    feature_range: (f64, f64),
}

impl MinMaxScaler {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, TransformError> {
        Self::from_artifact(load_json(path.as_ref())?)
    }

    pub fn from_json_str(json: &str) -> Result<Self, TransformError> {
        let artifact: ScalerArtifact =
            serde_json::from_str(json).map_err(|e| TransformError::Parse {
                path: "<inline>".to_string(),
                reason: e.to_string(),
            })?;
        Self::from_artifact(artifact)
    }

    fn from_artifact(artifact: ScalerArtifact) -> Result<Self, TransformError> {
        if artifact.data_min.len() != artifact.data_max.len() {
            return Err(TransformError::Invalid(format!(
                "scaler data_min has {} columns but data_max has {}",
                artifact.data_min.len(),
                artifact.data_max.len()
            )));
        }
        let (lo, hi) = artifact.feature_range;
        if !(lo < hi) {
            return Err(TransformError::Invalid(format!(
                "scaler feature_range ({}, {}) is empty",
                lo, hi
            )));
        }

        let data_range = artifact
            .data_min
            .iter()
            .zip(&artifact.data_max)
            .map(|(min, max)| {
                let range = max - min;
                if range == 0.0 {
                    1.0
                } else {
                    range
                }
            })
            .collect();

        Ok(Self {
            data_min: artifact.data_min,
            data_range,
            feature_range: artifact.feature_range,
        })
    }

    /// Number of columns the scaler was fit on.
    pub fn width(&self) -> usize {
        self.data_min.len()
    }

    /// Append the scaled `values` to `out`.
    pub fn transform_into(&self, values: &[f64], out: &mut Vec<f32>) -> Result<(), TransformError> {
        if values.len() != self.width() {
            return Err(TransformError::Width {
                stage: "scaler",
                expected: self.width(),
                actual: values.len(),
            });
        }

        let (lo, hi) = self.feature_range;
        out.extend(
            values
                .iter()
                .zip(self.data_min.iter().zip(&self.data_range))
                .map(|(x, (min, range))| (((x - min) / range) * (hi - lo) + lo) as f32),
        );
        Ok(())
    }
}
