//! Contract between the engine and a neural inference stage.
//!
//! The engine never evaluates a model itself. Each stage is a black box that
//! declares its input shapes and maps three input tensors to a primary output
//! and an updated recurrent state. Weights, runtime and file format live
//! behind this trait.

use ndarray::{ArrayD, ArrayViewD};
use std::fmt;

use crate::error::Result;

/// Declared dimensions of one tensor slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TensorShape(Vec<usize>);

impl TensorShape {
    pub fn new(dims: impl Into<Vec<usize>>) -> Self {
        Self(dims.into())
    }

    pub fn dims(&self) -> &[usize] {
        &self.0
    }

    /// Product of all dimensions.
    pub fn element_count(&self) -> usize {
        self.0.iter().product()
    }

    /// A usable shape has at least one dimension and no zero-sized dimension.
    pub fn is_well_formed(&self) -> bool {
        !self.0.is_empty() && self.0.iter().all(|&d| d > 0)
    }
}

impl fmt::Display for TensorShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.0)
    }
}

impl From<&[usize]> for TensorShape {
    fn from(dims: &[usize]) -> Self {
        Self(dims.to_vec())
    }
}

/// Tensors returned by one call to [`InferenceStage::predict`].
#[derive(Debug, Clone)]
pub struct StageOutput {
    /// Mask (stage A) or refined time-domain block (stage B)
    pub primary: ArrayD<f32>,
    /// Replacement for the recurrent state fed in at input slot 1
    pub state: ArrayD<f32>,
}

/// One model stage.
///
/// Input slots are, in order: the primary signal, the recurrent state, the
/// far-end signal. `predict` must be deterministic given identical inputs.
pub trait InferenceStage: Send {
    fn name(&self) -> &str;

    /// Declared shapes of the input slots. `None` when the model does not
    /// declare a concrete shape for a slot.
    fn input_shapes(&self) -> Vec<Option<TensorShape>>;

    /// Number of declared output slots.
    fn output_count(&self) -> usize;

    fn predict(&mut self, inputs: [ArrayViewD<'_, f32>; 3]) -> Result<StageOutput>;
}

impl<T: InferenceStage + ?Sized> InferenceStage for Box<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn input_shapes(&self) -> Vec<Option<TensorShape>> {
        (**self).input_shapes()
    }

    fn output_count(&self) -> usize {
        (**self).output_count()
    }

    fn predict(&mut self, inputs: [ArrayViewD<'_, f32>; 3]) -> Result<StageOutput> {
        (**self).predict(inputs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_element_count() {
        assert_eq!(TensorShape::new(vec![1, 2, 128, 2]).element_count(), 512);
        assert_eq!(TensorShape::new(vec![1, 1, 257]).element_count(), 257);
    }

    #[test]
    fn test_well_formed() {
        assert!(TensorShape::new(vec![1, 4]).is_well_formed());
        assert!(!TensorShape::new(Vec::new()).is_well_formed());
        assert!(!TensorShape::new(vec![1, 0, 3]).is_well_formed());
    }

    #[test]
    fn test_display() {
        assert_eq!(TensorShape::new(vec![1, 1, 512]).to_string(), "[1, 1, 512]");
    }
}
