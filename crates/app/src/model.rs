//! ONNX model stages evaluated with tract.
//!
//! A model is stored as two files next to each other: `<name>_1.onnx` (the
//! spectral mask stage) and `<name>_2.onnx` (the time-domain refinement
//! stage).

use dtlnaec_core::pipeline::{STAGE_A, STAGE_B};
use dtlnaec_core::{AecError, InferenceStage, Result, StageOutput, TensorShape};
use ndarray::{ArrayD, ArrayViewD, IxDyn};
use std::path::{Path, PathBuf};
use tract_onnx::prelude::*;

type Plan = SimplePlan<TypedFact, Box<dyn TypedOp>, TypedModel>;

/// One optimized ONNX graph.
pub struct TractStage {
    plan: Plan,
    name: String,
    role: &'static str,
    input_shapes: Vec<Option<TensorShape>>,
    output_count: usize,
}

impl TractStage {
    /// Loads and optimizes the model at `path`. `role` names the stage in errors.
    pub fn load(path: &Path, role: &'static str) -> Result<Self> {
        let load_failed = |e: TractError| AecError::ModelLoadFailed {
            path: path.display().to_string(),
            reason: format!("{:#}", e),
        };

        if !path.exists() {
            return Err(AecError::ModelLoadFailed {
                path: path.display().to_string(),
                reason: "file not found".into(),
            });
        }

        let model = tract_onnx::onnx()
            .model_for_path(path)
            .map_err(load_failed)?
            .into_optimized()
            .map_err(load_failed)?;

        let mut input_shapes = Vec::with_capacity(model.inputs.len());
        for ix in 0..model.inputs.len() {
            let fact = model.input_fact(ix).map_err(load_failed)?;
            // Symbolic dimensions are reported as an empty (malformed) shape
            let shape = match fact.shape.as_concrete() {
                Some(dims) => TensorShape::from(dims),
                None => TensorShape::new(Vec::new()),
            };
            input_shapes.push(Some(shape));
        }
        let output_count = model.outputs.len();

        let plan = model.into_runnable().map_err(load_failed)?;

        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| role.to_string());

        log::info!(
            "Loaded {} from {}: inputs {:?}, {} outputs",
            role,
            path.display(),
            input_shapes
                .iter()
                .map(|s| s.as_ref().map(ToString::to_string).unwrap_or_default())
                .collect::<Vec<_>>(),
            output_count
        );

        Ok(Self {
            plan,
            name,
            role,
            input_shapes,
            output_count,
        })
    }

    fn inference_error(&self, e: impl std::fmt::Display) -> AecError {
        AecError::Inference {
            stage: self.role,
            reason: e.to_string(),
        }
    }
}

impl InferenceStage for TractStage {
    fn name(&self) -> &str {
        &self.name
    }

    fn input_shapes(&self) -> Vec<Option<TensorShape>> {
        self.input_shapes.clone()
    }

    fn output_count(&self) -> usize {
        self.output_count
    }

    fn predict(&mut self, inputs: [ArrayViewD<'_, f32>; 3]) -> Result<StageOutput> {
        let mut tensors: TVec<TValue> = TVec::new();
        for view in inputs.iter() {
            let data = view.as_standard_layout();
            let slice = data
                .as_slice()
                .ok_or_else(|| self.inference_error("input is not contiguous"))?;
            let tensor = Tensor::from_shape::<f32>(view.shape(), slice).map_err(|e| self.inference_error(e))?;
            tensors.push(tensor.into());
        }

        let outputs = self.plan.run(tensors).map_err(|e| self.inference_error(format!("{:#}", e)))?;
        if outputs.len() < 2 {
            return Err(self.inference_error(format!("model returned {} outputs", outputs.len())));
        }

        Ok(StageOutput {
            primary: to_array(&outputs[0]).map_err(|e| self.inference_error(e))?,
            state: to_array(&outputs[1]).map_err(|e| self.inference_error(e))?,
        })
    }
}

fn to_array(tensor: &Tensor) -> std::result::Result<ArrayD<f32>, String> {
    let data = tensor.as_slice::<f32>().map_err(|e| e.to_string())?;
    ArrayD::from_shape_vec(IxDyn(tensor.shape()), data.to_vec()).map_err(|e| e.to_string())
}

/// Paths of the two stage files for `model_name` under `base_dir`.
pub fn stage_paths(base_dir: &Path, model_name: &str) -> (PathBuf, PathBuf) {
    (
        base_dir.join(format!("{}_1.onnx", model_name)),
        base_dir.join(format!("{}_2.onnx", model_name)),
    )
}

/// Loads both stages of `model_name` from `base_dir`.
pub fn load_stages(base_dir: &Path, model_name: &str) -> Result<(TractStage, TractStage)> {
    let (first, second) = stage_paths(base_dir, model_name);
    let stage_a = TractStage::load(&first, STAGE_A.name)?;
    let stage_b = TractStage::load(&second, STAGE_B.name)?;
    Ok((stage_a, stage_b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn scratch_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("dtlnaec-model-{}-{}", tag, std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_stage_paths() {
        let (a, b) = stage_paths(Path::new("/models"), "dtln_aec_128");
        assert_eq!(a, PathBuf::from("/models/dtln_aec_128_1.onnx"));
        assert_eq!(b, PathBuf::from("/models/dtln_aec_128_2.onnx"));
    }

    #[test]
    fn test_missing_model_is_load_error() {
        let dir = scratch_dir("missing");
        let result = load_stages(&dir, "does_not_exist");
        match result {
            Err(AecError::ModelLoadFailed { path, .. }) => assert!(path.ends_with("does_not_exist_1.onnx")),
            Err(e) => panic!("unexpected error {}", e),
            Ok(_) => panic!("loading a missing model succeeded"),
        }
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn test_garbage_model_is_load_error() {
        let dir = scratch_dir("garbage");
        fs::write(dir.join("broken_1.onnx"), b"not a protobuf graph").unwrap();
        fs::write(dir.join("broken_2.onnx"), b"not a protobuf graph").unwrap();

        let result = load_stages(&dir, "broken");
        assert!(matches!(result, Err(AecError::ModelLoadFailed { .. })));
        assert!(result.err().is_some_and(|e| e.is_fatal()));
        let _ = fs::remove_dir_all(dir);
    }
}
