//! ONNX classifiers run through tract
//!
//! Converted scikit-learn graphs typically expose an int64 label output and
//! a float probability output. Probabilities are preferred when present.

use super::classifier::{ClassScores, Classifier};
use super::loader::compute_checksum;
use crate::error::{ArtifactError, PredictError};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tract_onnx::prelude::*;
use tracing::debug;

type TractModel = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

pub struct OnnxClassifier {
    model: TractModel,
    n_features: usize,
    source: PathBuf,
    /// Graph exposes an f32 output
    probabilities: bool,
}

impl fmt::Debug for OnnxClassifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OnnxClassifier")
            .field("n_features", &self.n_features)
            .field("source", &self.source)
            .field("probabilities", &self.probabilities)
            .finish()
    }
}

impl OnnxClassifier {
    /// Read, verify and compile an ONNX file
    pub fn load(
        path: &Path,
        expected_sha256: Option<&str>,
        n_features: usize,
    ) -> Result<Self, ArtifactError> {
        let bytes = std::fs::read(path).map_err(|source| ArtifactError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        if let Some(expected) = expected_sha256 {
            let actual = compute_checksum(&bytes);
            if !actual.eq_ignore_ascii_case(expected) {
                return Err(ArtifactError::ChecksumMismatch {
                    path: path.to_path_buf(),
                    expected: expected.to_string(),
                    actual,
                });
            }
        }
        Self::from_bytes(&bytes, n_features, path.to_path_buf())
    }

    pub fn from_bytes(
        bytes: &[u8],
        n_features: usize,
        source: PathBuf,
    ) -> Result<Self, ArtifactError> {
        let onnx_err = |stage: &str, e: TractError| ArtifactError::Onnx(format!("{stage}: {e:#}"));
        let optimized = tract_onnx::onnx()
            .model_for_read(&mut std::io::Cursor::new(bytes))
            .map_err(|e| onnx_err("parse", e))?
            .with_input_fact(0, f32::fact([1, n_features]).into())
            .map_err(|e| onnx_err("input shape", e))?
            .into_optimized()
            .map_err(|e| onnx_err("optimize", e))?;
        let probabilities = has_float_output(&optimized).map_err(|e| onnx_err("outputs", e))?;
        let model = optimized
            .into_runnable()
            .map_err(|e| onnx_err("plan", e))?;
        debug!(
            source = %source.display(),
            n_features,
            probabilities,
            "Compiled ONNX classifier"
        );
        Ok(Self {
            model,
            n_features,
            source,
            probabilities,
        })
    }
}

/// Whether any graph output is an f32 tensor
fn has_float_output(model: &TypedModel) -> TractResult<bool> {
    for outlet in model.output_outlets()? {
        if model.outlet_fact(*outlet)?.datum_type == DatumType::F32 {
            return Ok(true);
        }
    }
    Ok(false)
}

impl Classifier for OnnxClassifier {
    fn classify(&self, row: &[f64]) -> Result<ClassScores, PredictError> {
        if row.len() != self.n_features {
            return Err(PredictError::ClassifierShape {
                expected: self.n_features,
                actual: row.len(),
            });
        }
        let run_err = |e: TractError| PredictError::Classifier(format!("{e:#}"));

        let start = Instant::now();
        let data: Vec<f32> = row.iter().map(|v| *v as f32).collect();
        let input: Tensor = tract_ndarray::Array2::from_shape_vec((1, self.n_features), data)
            .map_err(|e| PredictError::Classifier(e.to_string()))?
            .into();
        let outputs = self.model.run(tvec!(input.into())).map_err(run_err)?;
        debug!(elapsed_us = start.elapsed().as_micros(), "ONNX inference completed");

        let float_outputs = outputs
            .iter()
            .filter(|o| self.probabilities && o.datum_type() == DatumType::F32);
        for output in float_outputs {
            let view = output.to_array_view::<f32>().map_err(run_err)?;
            let probabilities: Vec<f64> = view.iter().map(|p| f64::from(*p)).collect();
            if !probabilities.is_empty() {
                return Ok(ClassScores::Probabilities(probabilities));
            }
        }
        for output in outputs.iter() {
            if output.datum_type() == DatumType::I64 {
                let view = output.to_array_view::<i64>().map_err(run_err)?;
                if let Some(label) = view.iter().next() {
                    return usize::try_from(*label)
                        .map(ClassScores::Label)
                        .map_err(|_| PredictError::Classifier(format!("negative label {label}")));
                }
            }
        }
        Err(PredictError::Classifier(
            "graph has no probability or label output".to_string(),
        ))
    }

    fn kind(&self) -> &'static str {
        "onnx"
    }

    fn provides_probabilities(&self) -> bool {
        self.probabilities
    }
}
