//! Deterministic stand-ins for the two model stages.

#![allow(dead_code)]

use dtlnaec_core::constants::{BLOCK_LEN, FFT_BINS};
use dtlnaec_core::{EchoCanceller, InferenceStage, Result, StageOutput, TensorShape};
use ndarray::{ArrayD, ArrayViewD};

/// Mask stage: attenuates bins in proportion to far-end energy and keeps a
/// running sum of the near-end magnitude in its state.
pub struct MaskStage;

impl InferenceStage for MaskStage {
    fn name(&self) -> &str {
        "mask_stub"
    }

    fn input_shapes(&self) -> Vec<Option<TensorShape>> {
        vec![
            Some(TensorShape::new(vec![1, 1, FFT_BINS])),
            Some(TensorShape::new(vec![1, 2, 128, 2])),
            Some(TensorShape::new(vec![1, 1, FFT_BINS])),
        ]
    }

    fn output_count(&self) -> usize {
        2
    }

    fn predict(&mut self, inputs: [ArrayViewD<'_, f32>; 3]) -> Result<StageOutput> {
        let mask = inputs[2].mapv(|far| 1.0 / (1.0 + far));
        let energy: f32 = inputs[0].iter().sum::<f32>() / FFT_BINS as f32;
        let state = inputs[1].mapv(|s| 0.9 * s + 0.1 * energy);
        Ok(StageOutput {
            primary: mask,
            state,
        })
    }
}

/// Refinement stage: mixes a little of its state into the estimate.
pub struct RefineStage;

impl InferenceStage for RefineStage {
    fn name(&self) -> &str {
        "refine_stub"
    }

    fn input_shapes(&self) -> Vec<Option<TensorShape>> {
        vec![
            Some(TensorShape::new(vec![1, 1, BLOCK_LEN])),
            Some(TensorShape::new(vec![1, 2, 128, 2])),
            Some(TensorShape::new(vec![1, 1, BLOCK_LEN])),
        ]
    }

    fn output_count(&self) -> usize {
        2
    }

    fn predict(&mut self, inputs: [ArrayViewD<'_, f32>; 3]) -> Result<StageOutput> {
        let bias = inputs[1].iter().next().copied().unwrap_or(0.0);
        let refined = inputs[0].mapv(|s| s * (1.0 - bias.min(0.5)));
        let peak = inputs[0].iter().fold(0.0f32, |acc, &s| acc.max(s.abs()));
        let state = inputs[1].mapv(|s| 0.5 * s + 0.5 * peak);
        Ok(StageOutput {
            primary: refined,
            state,
        })
    }
}

pub fn canceller() -> EchoCanceller {
    EchoCanceller::new(MaskStage, RefineStage).unwrap()
}

/// Deterministic speech-like test signal.
pub fn signal(len: usize, seed: u32) -> Vec<f32> {
    (0..len)
        .map(|i| {
            let t = i as f32 + seed as f32 * 17.0;
            0.3 * (t * 0.031).sin() + 0.1 * (t * 0.173).sin()
        })
        .collect()
}
