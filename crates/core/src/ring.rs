//! Near-end block and far-end (loopback) window, kept side by side so every
//! processing pass sees the far-end samples that were current when the
//! near-end block filled.

use crate::constants::{BLOCK_LEN, BLOCK_SHIFT};
use crate::window::SlidingWindow;

#[derive(Debug, Default)]
pub struct DualRingBuffer {
    near: SlidingWindow<BLOCK_LEN>,
    far: SlidingWindow<BLOCK_LEN>,
}

impl DualRingBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends far-end samples, keeping the most recent `BLOCK_LEN`.
    ///
    /// Far-end alignment is best effort: a push longer than `BLOCK_LEN`
    /// keeps only its newest samples. Never triggers a processing pass.
    pub fn push_far_end(&mut self, samples: &[f32]) {
        let dropped = self.far.push(samples);
        if dropped > 0 {
            log::trace!("Far-end push of {} samples dropped {}", samples.len(), dropped);
        }
    }

    pub fn far_end(&self) -> &[f32; BLOCK_LEN] {
        self.far.as_array()
    }

    pub fn near_end(&self) -> &[f32; BLOCK_LEN] {
        self.near.as_array()
    }

    /// Copies near-end samples into the block starting at `cursor`.
    pub(crate) fn fill_near_end(&mut self, cursor: usize, samples: &[f32]) {
        self.near.write_at(cursor, samples);
    }

    /// Discards the oldest hop of the near-end block after a pass.
    pub(crate) fn advance_near_end(&mut self) {
        self.near.shift(BLOCK_SHIFT);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_far_end_starts_silent() {
        let ring = DualRingBuffer::new();
        assert!(ring.far_end().iter().all(|&s| s == 0.0));
        assert!(ring.near_end().iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_far_end_push_lands_at_tail() {
        let mut ring = DualRingBuffer::new();
        ring.push_far_end(&[1.0, 2.0, 3.0]);
        let far = ring.far_end();
        assert_eq!(&far[BLOCK_LEN - 3..], &[1.0, 2.0, 3.0]);
        assert!(far[..BLOCK_LEN - 3].iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_far_end_accumulates_across_pushes() {
        let mut ring = DualRingBuffer::new();
        let first: Vec<f32> = (0..300).map(|i| i as f32).collect();
        let second: Vec<f32> = (300..600).map(|i| i as f32).collect();
        ring.push_far_end(&first);
        ring.push_far_end(&second);

        // Most recent BLOCK_LEN samples overall: 88..600
        let expected: Vec<f32> = (88..600).map(|i| i as f32).collect();
        assert_eq!(ring.far_end().as_slice(), expected.as_slice());
    }

    #[test]
    fn test_oversized_far_end_push_keeps_newest() {
        let mut ring = DualRingBuffer::new();
        let samples: Vec<f32> = (0..BLOCK_LEN + 100).map(|i| i as f32).collect();
        ring.push_far_end(&samples);
        assert_eq!(ring.far_end()[0], 100.0);
        assert_eq!(ring.far_end()[BLOCK_LEN - 1], (BLOCK_LEN + 99) as f32);
    }

    #[test]
    fn test_far_end_push_does_not_touch_near_end() {
        let mut ring = DualRingBuffer::new();
        ring.fill_near_end(BLOCK_LEN - BLOCK_SHIFT, &[0.5; BLOCK_SHIFT]);
        let before = *ring.near_end();
        ring.push_far_end(&[1.0; 64]);
        assert_eq!(ring.near_end(), &before);
    }

    #[test]
    fn test_advance_near_end_keeps_newest() {
        let mut ring = DualRingBuffer::new();
        let block: Vec<f32> = (0..BLOCK_LEN).map(|i| i as f32).collect();
        ring.fill_near_end(0, &block);
        ring.advance_near_end();
        assert_eq!(ring.near_end()[0], BLOCK_SHIFT as f32);
        assert_eq!(ring.near_end()[BLOCK_LEN - BLOCK_SHIFT - 1], (BLOCK_LEN - 1) as f32);
        assert!(ring.near_end()[BLOCK_LEN - BLOCK_SHIFT..].iter().all(|&s| s == 0.0));
    }
}
