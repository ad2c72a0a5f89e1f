//! Fixed-size sliding window shared by the near-end block, the far-end ring
//! and the overlap-add accumulator.

/// A block of `N` samples that only ever moves left.
///
/// New data enters at the tail; shifting drops the oldest samples from the
/// head and zero-fills what is freed. Never reallocates.
#[derive(Debug, Clone, PartialEq)]
pub struct SlidingWindow<const N: usize> {
    buf: [f32; N],
}

impl<const N: usize> Default for SlidingWindow<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> SlidingWindow<N> {
    pub fn new() -> Self {
        Self { buf: [0.0; N] }
    }

    /// Drops the oldest `n` samples and zero-fills the freed tail.
    /// Shifting by `N` or more clears the window.
    pub fn shift(&mut self, n: usize) {
        let n = n.min(N);
        self.buf.copy_within(n.., 0);
        self.buf[N - n..].fill(0.0);
    }

    /// Shifts by `samples.len()` and writes `samples` into the tail.
    ///
    /// If more than `N` samples are pushed at once only the last `N` are kept.
    /// Returns the number of pushed samples that were discarded.
    pub fn push(&mut self, samples: &[f32]) -> usize {
        let dropped = samples.len().saturating_sub(N);
        let kept = &samples[dropped..];
        self.shift(kept.len());
        self.buf[N - kept.len()..].copy_from_slice(kept);
        dropped
    }

    /// Writes `samples` starting at `offset`. Panics if the range exceeds `N`.
    pub fn write_at(&mut self, offset: usize, samples: &[f32]) {
        self.buf[offset..offset + samples.len()].copy_from_slice(samples);
    }

    /// Adds `block` element-wise onto the window.
    pub fn accumulate(&mut self, block: &[f32; N]) {
        for (acc, &sample) in self.buf.iter_mut().zip(block.iter()) {
            *acc += sample;
        }
    }

    /// Copies out the first `M` samples.
    pub fn head<const M: usize>(&self) -> [f32; M] {
        let mut out = [0.0f32; M];
        out.copy_from_slice(&self.buf[..M]);
        out
    }

    pub fn as_array(&self) -> &[f32; N] {
        &self.buf
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.buf
    }
}
