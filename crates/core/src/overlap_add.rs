//! Overlap-add reconstruction of the output stream.

use crate::constants::{BLOCK_LEN, BLOCK_SHIFT};
use crate::window::SlidingWindow;

/// Sums successive processed blocks, offset by one hop each, and releases
/// one hop of finished output per block.
#[derive(Debug, Default)]
pub struct OverlapAdd {
    acc: SlidingWindow<BLOCK_LEN>,
}

impl OverlapAdd {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `block` onto the carried-over tail and returns the first hop.
    ///
    /// The remaining `BLOCK_LEN - BLOCK_SHIFT` samples stay in the
    /// accumulator and are summed with the next block.
    pub fn push_block(&mut self, block: &[f32; BLOCK_LEN]) -> [f32; BLOCK_SHIFT] {
        self.acc.shift(BLOCK_SHIFT);
        self.acc.accumulate(block);
        self.acc.head()
    }

    pub fn accumulator(&self) -> &[f32; BLOCK_LEN] {
        self.acc.as_array()
    }
}
