//! Streaming acoustic echo cancellation built around a two-stage neural
//! masking model.
//!
//! The engine consumes a near-end (microphone) stream and a far-end
//! (loopback) stream and emits echo-cancelled 16kHz mono audio in 128-sample
//! hops. Model evaluation is delegated to [`InferenceStage`] implementations.

pub mod constants;
pub mod echo_cancel;
pub mod error;
pub mod frame;
pub mod frame_adapter;
pub mod inference;
pub mod overlap_add;
pub mod pipeline;
pub mod ring;
pub mod scheduler;
pub mod window;

pub use echo_cancel::EchoCanceller;
pub use error::{AecError, Result};
pub use frame::{AudioFrame, OutputFrame, SampleFormat};
pub use frame_adapter::FrameAdapter;
pub use inference::{InferenceStage, StageOutput, TensorShape};
