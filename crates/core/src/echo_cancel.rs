//! Streaming echo canceller.
//!
//! Ties the frame normalizer, the dual ring buffer, the block scheduler, the
//! masking pipeline and overlap-add together behind two entry points: one per
//! input stream.

use crate::error::{AecError, Result};
use crate::frame::{normalize, AudioFrame, OutputFrame};
use crate::inference::InferenceStage;
use crate::overlap_add::OverlapAdd;
use crate::pipeline::MaskingPipeline;
use crate::ring::DualRingBuffer;
use crate::scheduler::BlockScheduler;

/// Echo canceller for one call or session.
///
/// Not internally synchronised. When the near-end and far-end streams are
/// pumped from different threads, the caller serialises access (a single
/// owning thread or a mutex).
pub struct EchoCanceller {
    ring: DualRingBuffer,
    scheduler: BlockScheduler,
    pipeline: MaskingPipeline,
    overlap_add: OverlapAdd,
    blocks_processed: u64,
    failed: bool,
}

impl EchoCanceller {
    /// Creates an echo canceller from the spectral-mask stage and the
    /// time-domain refinement stage.
    ///
    /// Fails if either stage declares missing or mismatched tensor shapes.
    pub fn new<A, B>(stage_a: A, stage_b: B) -> Result<Self>
    where
        A: InferenceStage + 'static,
        B: InferenceStage + 'static,
    {
        let pipeline = MaskingPipeline::new(Box::new(stage_a), Box::new(stage_b))?;
        Ok(Self {
            ring: DualRingBuffer::new(),
            scheduler: BlockScheduler::new(),
            pipeline,
            overlap_add: OverlapAdd::new(),
            blocks_processed: 0,
            failed: false,
        })
    }

    /// Feeds one far-end (loopback) frame. Never produces output.
    pub fn process_far_end(&mut self, frame: &AudioFrame) -> Result<()> {
        self.check_usable()?;
        let samples = normalize(frame)?;
        self.ring.push_far_end(&samples);
        Ok(())
    }

    /// Feeds one near-end (microphone) frame and returns the output frames it
    /// completes, oldest first.
    ///
    /// A frame shorter than one hop may return nothing; a long frame may
    /// return several. Samples of an unfinished hop stay buffered for the
    /// next call and are never flushed.
    ///
    /// If a block fails fatally, the hops this frame already completed are
    /// discarded along with it and only the error is returned.
    pub fn process_near_end(&mut self, frame: &AudioFrame) -> Result<Vec<OutputFrame>> {
        self.check_usable()?;
        let samples = normalize(frame)?;
        if samples.is_empty() {
            return Ok(Vec::new());
        }

        self.scheduler.begin_frame(frame.timestamp);

        let format = frame.format;
        let Self {
            ring,
            scheduler,
            pipeline,
            overlap_add,
            blocks_processed,
            ..
        } = self;

        let result = scheduler.feed(ring, &samples, |ring, timestamp| {
            let block = pipeline.process(ring.near_end(), ring.far_end())?;
            let hop = overlap_add.push_block(block);
            *blocks_processed += 1;
            Ok(OutputFrame::new(format, timestamp, hop))
        });

        match &result {
            Err(e) if e.is_fatal() => {
                log::error!("Echo canceller disabled after block {}: {}", self.blocks_processed, e);
                self.failed = true;
            }
            _ => {}
        }
        result
    }

    /// Number of processing passes completed so far.
    pub fn blocks_processed(&self) -> u64 {
        self.blocks_processed
    }

    /// True once a fatal error has occurred. The instance must be replaced.
    pub fn is_failed(&self) -> bool {
        self.failed
    }

    fn check_usable(&self) -> Result<()> {
        if self.failed {
            return Err(AecError::EngineFailed);
        }
        Ok(())
    }
}
