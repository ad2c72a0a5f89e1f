//! Audio frame types and the frame normalizer.
//!
//! Input frames arrive at arbitrary lengths, at 16kHz or 48kHz. Everything past
//! [`normalize`] works on mono 16kHz `f32` samples.

use crate::constants::{BLOCK_SHIFT, DECIMATION_FACTOR, SAMPLE_RATE};
use crate::error::{AecError, Result};

/// Storage format reported by the frame source. Carried from each near-end
/// frame onto the output frames it produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SampleFormat {
    #[default]
    F32,
    S16,
}

/// One frame of audio as delivered by a capture or playback source.
///
/// `data` holds `number_of_frames() * channels` samples, already converted to `f32`.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFrame {
    pub format: SampleFormat,
    pub sample_rate: u32,
    pub channels: u16,
    /// Presentation time in microseconds, if the source provides one.
    pub timestamp: Option<i64>,
    pub data: Vec<f32>,
}

impl AudioFrame {
    /// Creates a mono `f32` frame.
    pub fn mono(sample_rate: u32, timestamp: Option<i64>, data: Vec<f32>) -> Self {
        Self {
            format: SampleFormat::F32,
            sample_rate,
            channels: 1,
            timestamp,
            data,
        }
    }

    /// Creates a frame from signed 16-bit PCM, scaling samples into [-1.0, 1.0).
    pub fn from_s16(sample_rate: u32, channels: u16, timestamp: Option<i64>, pcm: &[i16]) -> Self {
        Self {
            format: SampleFormat::S16,
            sample_rate,
            channels,
            timestamp,
            data: pcm.iter().map(|&s| s as f32 / 32768.0).collect(),
        }
    }

    pub fn number_of_frames(&self) -> usize {
        if self.channels == 0 {
            return 0;
        }
        self.data.len() / self.channels as usize
    }
}

/// One hop of echo-cancelled output, always mono 16kHz.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputFrame {
    pub format: SampleFormat,
    pub sample_rate: u32,
    pub number_of_frames: usize,
    pub channels: u16,
    pub timestamp: i64,
    pub data: [f32; BLOCK_SHIFT],
}

impl OutputFrame {
    pub(crate) fn new(format: SampleFormat, timestamp: i64, data: [f32; BLOCK_SHIFT]) -> Self {
        Self {
            format,
            sample_rate: SAMPLE_RATE,
            number_of_frames: BLOCK_SHIFT,
            channels: 1,
            timestamp,
            data,
        }
    }
}

/// Validates a frame and converts it to mono 16kHz samples.
///
/// 48kHz input is reduced by keeping every third sample (indices 0, 3, 6, ...),
/// giving `N / 3` samples. There is no anti-aliasing filter.
pub fn normalize(frame: &AudioFrame) -> Result<Vec<f32>> {
    if frame.channels != 1 {
        return Err(AecError::UnsupportedChannelLayout {
            channels: frame.channels,
        });
    }

    match frame.sample_rate {
        16000 => Ok(frame.data.clone()),
        48000 => {
            let len = frame.data.len() / DECIMATION_FACTOR;
            Ok(frame
                .data
                .iter()
                .step_by(DECIMATION_FACTOR)
                .take(len)
                .copied()
                .collect())
        }
        sample_rate => Err(AecError::UnsupportedSampleRate { sample_rate }),
    }
}
