//! Two-stage masking pipeline.
//!
//! Stage A estimates a spectral mask from the near-end and far-end magnitude
//! spectra and applies it to the near-end spectrum. Stage B refines the
//! resulting time-domain block, again conditioned on the far-end window.
//! Each stage carries its own recurrent state from one block to the next.

use ndarray::{ArrayD, ArrayViewD, IxDyn};
use realfft::num_complex::Complex32;
use realfft::{ComplexToReal, RealFftPlanner, RealToComplex};
use std::sync::Arc;

use crate::constants::{BLOCK_LEN, FFT_BINS};
use crate::error::{AecError, Result};
use crate::inference::{InferenceStage, TensorShape};

/// What the engine expects of one stage.
#[derive(Debug, Clone, Copy)]
pub struct StageSpec {
    pub name: &'static str,
    /// Elements in input slot 0 and in the primary output
    pub primary_len: usize,
    /// Elements in input slot 2
    pub far_len: usize,
}

pub const STAGE_A: StageSpec = StageSpec {
    name: "spectral_mask",
    primary_len: FFT_BINS,
    far_len: FFT_BINS,
};

pub const STAGE_B: StageSpec = StageSpec {
    name: "time_refine",
    primary_len: BLOCK_LEN,
    far_len: BLOCK_LEN,
};

/// A stage together with its validated input shapes and recurrent state.
struct StageSlot {
    stage: Box<dyn InferenceStage>,
    spec: StageSpec,
    primary_shape: Vec<usize>,
    far_shape: Vec<usize>,
    state: ArrayD<f32>,
}

impl StageSlot {
    fn new(stage: Box<dyn InferenceStage>, spec: StageSpec) -> Result<Self> {
        let shapes = stage.input_shapes();
        if shapes.len() != 3 {
            return Err(AecError::Construction {
                stage: spec.name,
                reason: format!("declares {} input slots, expected 3", shapes.len()),
            });
        }
        if stage.output_count() < 2 {
            return Err(AecError::Construction {
                stage: spec.name,
                reason: format!("declares {} output slots, expected at least 2", stage.output_count()),
            });
        }

        let state_shape = match &shapes[1] {
            Some(shape) if shape.is_well_formed() => shape.clone(),
            Some(shape) => {
                return Err(AecError::Construction {
                    stage: spec.name,
                    reason: format!("malformed state shape {}", shape),
                })
            }
            None => {
                return Err(AecError::Construction {
                    stage: spec.name,
                    reason: "state input has no declared shape".into(),
                })
            }
        };

        let primary_shape = slot_shape(&shapes[0], spec.primary_len, spec.name, "primary input")?;
        let far_shape = slot_shape(&shapes[2], spec.far_len, spec.name, "far-end input")?;

        log::debug!(
            "Stage {} ({}): primary {:?}, state {}, far-end {:?}",
            spec.name,
            stage.name(),
            primary_shape,
            state_shape,
            far_shape
        );

        Ok(Self {
            stage,
            spec,
            primary_shape,
            far_shape,
            state: ArrayD::zeros(IxDyn(state_shape.dims())),
        })
    }

    /// Runs one prediction, replaces the state and returns the primary output.
    fn run(&mut self, primary: &[f32], far: &[f32]) -> Result<ArrayD<f32>> {
        let primary = ArrayViewD::from_shape(IxDyn(&self.primary_shape), primary)
            .map_err(|_| self.mismatch("primary input", self.spec.primary_len, vec![primary.len()]))?;
        let far = ArrayViewD::from_shape(IxDyn(&self.far_shape), far)
            .map_err(|_| self.mismatch("far-end input", self.spec.far_len, vec![far.len()]))?;

        let output = self.stage.predict([primary, self.state.view(), far])?;

        if output.primary.len() != self.spec.primary_len {
            return Err(self.mismatch(
                "primary output",
                self.spec.primary_len,
                output.primary.shape().to_vec(),
            ));
        }
        if output.state.len() != self.state.len() {
            return Err(self.mismatch("state output", self.state.len(), output.state.shape().to_vec()));
        }

        // Overwrite in place, keeping the declared shape
        for (dst, &src) in self.state.iter_mut().zip(output.state.iter()) {
            *dst = src;
        }

        Ok(output.primary)
    }

    fn mismatch(&self, slot: &'static str, expected: usize, got: Vec<usize>) -> AecError {
        AecError::ModelShapeMismatch {
            stage: self.spec.name,
            slot,
            expected,
            got,
        }
    }
}

/// Resolves the shape used for a signal slot. Undeclared slots get `[1, 1, len]`.
fn slot_shape(
    declared: &Option<TensorShape>,
    expected: usize,
    stage: &'static str,
    slot: &'static str,
) -> Result<Vec<usize>> {
    match declared {
        Some(shape) if shape.is_well_formed() && shape.element_count() == expected => {
            Ok(shape.dims().to_vec())
        }
        Some(shape) => Err(AecError::ModelShapeMismatch {
            stage,
            slot,
            expected,
            got: shape.dims().to_vec(),
        }),
        None => Ok(vec![1, 1, expected]),
    }
}

pub struct MaskingPipeline {
    stage_a: StageSlot,
    stage_b: StageSlot,
    fft: Arc<dyn RealToComplex<f32>>,
    ifft: Arc<dyn ComplexToReal<f32>>,

    // Pre-allocated working buffers
    fft_input: Vec<f32>,
    near_spectrum: Vec<Complex32>,
    far_spectrum: Vec<Complex32>,
    near_magnitude: Vec<f32>,
    far_magnitude: Vec<f32>,
    estimate: Vec<f32>,
    output: [f32; BLOCK_LEN],
}

impl MaskingPipeline {
    /// Validates both stages' declared shapes and zero-initialises their states.
    pub fn new(stage_a: Box<dyn InferenceStage>, stage_b: Box<dyn InferenceStage>) -> Result<Self> {
        let stage_a = StageSlot::new(stage_a, STAGE_A)?;
        let stage_b = StageSlot::new(stage_b, STAGE_B)?;

        let mut planner = RealFftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(BLOCK_LEN);
        let ifft = planner.plan_fft_inverse(BLOCK_LEN);

        Ok(Self {
            stage_a,
            stage_b,
            fft_input: fft.make_input_vec(),
            near_spectrum: fft.make_output_vec(),
            far_spectrum: fft.make_output_vec(),
            near_magnitude: vec![0.0; FFT_BINS],
            far_magnitude: vec![0.0; FFT_BINS],
            estimate: ifft.make_output_vec(),
            output: [0.0; BLOCK_LEN],
            fft,
            ifft,
        })
    }

    /// Runs both stages over one near-end block and the matching far-end window.
    pub fn process(
        &mut self,
        near: &[f32; BLOCK_LEN],
        far: &[f32; BLOCK_LEN],
    ) -> Result<&[f32; BLOCK_LEN]> {
        // Stage A: magnitude spectra in, spectral mask out
        self.fft_input.copy_from_slice(near);
        self.fft.process(&mut self.fft_input, &mut self.near_spectrum)?;
        self.fft_input.copy_from_slice(far);
        self.fft.process(&mut self.fft_input, &mut self.far_spectrum)?;

        for (mag, bin) in self.near_magnitude.iter_mut().zip(&self.near_spectrum) {
            *mag = bin.norm();
        }
        for (mag, bin) in self.far_magnitude.iter_mut().zip(&self.far_spectrum) {
            *mag = bin.norm();
        }

        let mask = self.stage_a.run(&self.near_magnitude, &self.far_magnitude)?;
        for (bin, &gain) in self.near_spectrum.iter_mut().zip(mask.iter()) {
            *bin *= gain;
        }

        // DC and Nyquist must be purely real for the inverse transform
        self.near_spectrum[0].im = 0.0;
        self.near_spectrum[FFT_BINS - 1].im = 0.0;
        self.ifft.process(&mut self.near_spectrum, &mut self.estimate)?;
        let scale = 1.0 / BLOCK_LEN as f32;
        for sample in self.estimate.iter_mut() {
            *sample *= scale;
        }

        // Stage B: time-domain refinement
        let refined = self.stage_b.run(&self.estimate, far)?;
        for (dst, &src) in self.output.iter_mut().zip(refined.iter()) {
            *dst = src;
        }

        log::trace!("Processed block through {} and {}", self.stage_a.stage.name(), self.stage_b.stage.name());
        Ok(&self.output)
    }

    /// Current recurrent states of stage A and stage B.
    pub fn states(&self) -> (&ArrayD<f32>, &ArrayD<f32>) {
        (&self.stage_a.state, &self.stage_b.state)
    }
}
