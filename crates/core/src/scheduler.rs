//! Block scheduling for the near-end stream.
//!
//! Near-end samples arrive in frames of any length. The scheduler copies them
//! into the near-end block behind the ring cursor and fires one processing
//! pass each time the block fills, i.e. once per `BLOCK_SHIFT` new samples.

use crate::constants::{BLOCK_LEN, BLOCK_SHIFT, HOP_DURATION_US};
use crate::error::Result;
use crate::ring::DualRingBuffer;

const CURSOR_RESET: usize = BLOCK_LEN - BLOCK_SHIFT;

#[derive(Debug)]
pub struct BlockScheduler {
    /// Boundary between processed history and the unfilled tail of the block.
    /// Always within `[CURSOR_RESET, BLOCK_LEN]`.
    cursor: usize,
    /// Presentation time of the next output frame, in microseconds.
    timestamp: i64,
}

impl Default for BlockScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl BlockScheduler {
    pub fn new() -> Self {
        Self {
            cursor: CURSOR_RESET,
            timestamp: 0,
        }
    }

    /// True when no samples of the next hop have been buffered yet.
    pub fn at_block_start(&self) -> bool {
        self.cursor == CURSOR_RESET
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    /// Called once per input frame before its samples are fed. Re-anchors the
    /// timestamp cursor to the frame's timestamp when a new hop is starting.
    pub fn begin_frame(&mut self, timestamp: Option<i64>) {
        if self.at_block_start() {
            self.timestamp = timestamp.unwrap_or(0);
        }
    }

    /// Copies `samples` into the near-end block, calling `on_block` for every
    /// block that fills. Results are returned in generation order.
    ///
    /// `on_block` receives the ring with a full near-end block and the
    /// timestamp for the output it produces. After it returns the timestamp
    /// advances by one hop and the block slides left by `BLOCK_SHIFT`.
    pub fn feed<T, F>(&mut self, ring: &mut DualRingBuffer, samples: &[f32], mut on_block: F) -> Result<Vec<T>>
    where
        F: FnMut(&DualRingBuffer, i64) -> Result<T>,
    {
        let mut produced = Vec::with_capacity((self.cursor - CURSOR_RESET + samples.len()) / BLOCK_SHIFT);
        let mut offset = 0;

        while offset < samples.len() {
            let n = (BLOCK_LEN - self.cursor).min(samples.len() - offset);
            ring.fill_near_end(self.cursor, &samples[offset..offset + n]);
            self.cursor += n;
            offset += n;

            if self.cursor == BLOCK_LEN {
                produced.push(on_block(ring, self.timestamp)?);
                self.timestamp += HOP_DURATION_US;
                ring.advance_near_end();
                self.cursor = CURSOR_RESET;
            }
        }

        Ok(produced)
    }
}
