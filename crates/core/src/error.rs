//! Error taxonomy for the echo cancellation engine.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AecError {
    /// A stage declared a missing or malformed tensor shape.
    #[error("Failed to construct stage {stage}: {reason}")]
    Construction { stage: &'static str, reason: String },

    #[error("Unsupported channel layout: {channels} channels (mono only)")]
    UnsupportedChannelLayout { channels: u16 },

    #[error("Unsupported sample rate: {sample_rate}Hz (expected 16000 or 48000)")]
    UnsupportedSampleRate { sample_rate: u32 },

    #[error("Stage {stage} {slot} shape mismatch: expected {expected} elements, got {got:?}")]
    ModelShapeMismatch {
        stage: &'static str,
        slot: &'static str,
        expected: usize,
        got: Vec<usize>,
    },

    #[error("Failed to load model {path}: {reason}")]
    ModelLoadFailed { path: String, reason: String },

    #[error("Inference failed in stage {stage}: {reason}")]
    Inference { stage: &'static str, reason: String },

    #[error("FFT error: {0}")]
    Fft(#[from] realfft::FftError),

    /// A previous fatal error left the engine unusable; build a new one.
    #[error("Echo canceller is unusable after a fatal error")]
    EngineFailed,
}

impl AecError {
    /// Returns true if the error ends the usability of the engine instance.
    ///
    /// Per-frame validation errors are not fatal: the offending frame is
    /// rejected and the engine keeps accepting well-formed frames.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            AecError::UnsupportedChannelLayout { .. } | AecError::UnsupportedSampleRate { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, AecError>;
