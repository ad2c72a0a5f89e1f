//! Shared constants for the echo cancellation engine.

/// Internal processing rate (16kHz)
pub const SAMPLE_RATE: u32 = 16000;

/// Block length in samples (32ms at 16kHz)
pub const BLOCK_LEN: usize = 512;

/// Hop between consecutive blocks (8ms at 16kHz), also the length of each output frame
pub const BLOCK_SHIFT: usize = 128;

/// Number of bins produced by a real FFT over one block
pub const FFT_BINS: usize = BLOCK_LEN / 2 + 1;

/// Duration of one hop in timestamp units (microseconds)
pub const HOP_DURATION_US: i64 = 8000;

/// 48kHz input is decimated by plain subsampling
pub const DECIMATION_FACTOR: usize = 3;

/// Input rates accepted by the frame normalizer
pub const SUPPORTED_SAMPLE_RATES: [u32; 2] = [16000, 48000];

/// Model artifact base name used when none is configured
pub const DEFAULT_MODEL_NAME: &str = "dtln_aec_128";

const _: () = assert!(BLOCK_SHIFT > 0 && BLOCK_SHIFT < BLOCK_LEN);
const _: () = assert!(HOP_DURATION_US == (BLOCK_SHIFT as i64 * 1_000_000) / SAMPLE_RATE as i64);
