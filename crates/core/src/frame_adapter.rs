//! Frame adapter for callback-style hosts.
//!
//! Audio callbacks hand over raw mono buffers of whatever size the device
//! picked. The adapter wraps them into [`AudioFrame`]s stamped from a running
//! sample clock, drives the [`EchoCanceller`] and queues the cleaned 16kHz
//! output so the host can drain it at its own pace.
//!
//! At 48kHz only whole groups of three host samples are forwarded. The
//! remainder is carried into the next buffer so decimation keeps its phase
//! across buffer boundaries.

use crate::constants::{BLOCK_SHIFT, DECIMATION_FACTOR, SAMPLE_RATE, SUPPORTED_SAMPLE_RATES};
use crate::echo_cancel::EchoCanceller;
use crate::error::{AecError, Result};
use crate::frame::AudioFrame;
use ringbuf::traits::{Consumer, Observer, Producer};
use ringbuf::HeapRb;

/// Output queue depth in hops (about half a second)
const OUTPUT_QUEUE_HOPS: usize = 64;

/// Bridges variable-size host buffers to the echo canceller.
///
/// Near-end buffers are stamped with the time of their first sample, counted
/// from the first buffer pushed. Far-end buffers carry no timestamp.
pub struct FrameAdapter {
    canceller: EchoCanceller,
    sample_rate: u32,
    samples_seen: u64,
    near_pending: Vec<f32>,
    far_pending: Vec<f32>,
    rb_out: HeapRb<f32>,
    overflowed: u64,
}

impl FrameAdapter {
    /// Wraps `canceller` for a host running at `sample_rate` (16kHz or 48kHz).
    pub fn new(canceller: EchoCanceller, sample_rate: u32) -> Result<Self> {
        if !SUPPORTED_SAMPLE_RATES.contains(&sample_rate) {
            return Err(AecError::UnsupportedSampleRate { sample_rate });
        }
        Ok(Self {
            canceller,
            sample_rate,
            samples_seen: 0,
            near_pending: Vec::with_capacity(DECIMATION_FACTOR),
            far_pending: Vec::with_capacity(DECIMATION_FACTOR),
            rb_out: HeapRb::<f32>::new(BLOCK_SHIFT * OUTPUT_QUEUE_HOPS),
            overflowed: 0,
        })
    }

    /// Feeds loopback samples to the canceller.
    pub fn push_far_end(&mut self, samples: &[f32]) -> Result<()> {
        let group_len = self.group_len();
        let whole = take_whole_groups(&mut self.far_pending, samples, group_len);
        if whole.is_empty() {
            return Ok(());
        }
        let frame = AudioFrame::mono(self.sample_rate, None, whole);
        self.canceller.process_far_end(&frame)
    }

    /// Feeds microphone samples and queues any output they complete.
    /// Returns the number of output samples queued.
    pub fn push_near_end(&mut self, samples: &[f32]) -> Result<usize> {
        let group_len = self.group_len();
        let whole = take_whole_groups(&mut self.near_pending, samples, group_len);
        if whole.is_empty() {
            return Ok(0);
        }
        let forwarded = whole.len() as u64;
        let timestamp = (self.samples_seen * 1_000_000 / self.sample_rate as u64) as i64;
        let frame = AudioFrame::mono(self.sample_rate, Some(timestamp), whole);
        let produced = self.canceller.process_near_end(&frame)?;
        self.samples_seen += forwarded;

        let mut queued = 0;
        for out in &produced {
            queued += self.rb_out.push_slice(&out.data);
        }

        let lost = produced.len() * BLOCK_SHIFT - queued;
        if lost > 0 {
            self.overflowed += lost as u64;
            log::warn!("Output queue full, dropped {} samples ({} total)", lost, self.overflowed);
        }
        Ok(queued)
    }

    /// Pops cleaned 16kHz samples into `out`, zero-filling whatever the queue
    /// cannot cover. Returns the number of real samples written.
    pub fn pop_output(&mut self, out: &mut [f32]) -> usize {
        let count = self.rb_out.pop_slice(out);
        out[count..].fill(0.0);
        count
    }

    /// Cleaned samples waiting to be popped.
    pub fn output_available(&self) -> usize {
        self.rb_out.occupied_len()
    }

    /// Rate of the cleaned output, regardless of the host rate.
    pub fn output_sample_rate(&self) -> u32 {
        SAMPLE_RATE
    }

    pub fn canceller(&self) -> &EchoCanceller {
        &self.canceller
    }

    fn group_len(&self) -> usize {
        if self.sample_rate == SAMPLE_RATE {
            1
        } else {
            DECIMATION_FACTOR
        }
    }
}

/// Appends `samples` to `pending` and takes out the longest prefix that is a
/// multiple of `group` samples. The rest stays in `pending`.
fn take_whole_groups(pending: &mut Vec<f32>, samples: &[f32], group: usize) -> Vec<f32> {
    pending.extend_from_slice(samples);
    let whole = pending.len() - pending.len() % group;
    pending.drain(..whole).collect()
}
