//! Offline driver: cancels echo between two WAV recordings.

use anyhow::{bail, Context, Result};
use dtlnaec_core::constants::SAMPLE_RATE;
use dtlnaec_core::{AudioFrame, EchoCanceller, SampleFormat};
use std::path::Path;

/// Decoded WAV contents, interleaved.
struct WavStream {
    sample_rate: u32,
    channels: u16,
    format: SampleFormat,
    samples: Vec<f32>,
}

impl WavStream {
    fn open(path: &Path) -> Result<Self> {
        let reader = hound::WavReader::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
        let spec = reader.spec();

        let (format, samples) = match (spec.sample_format, spec.bits_per_sample) {
            (hound::SampleFormat::Float, _) => (
                SampleFormat::F32,
                reader.into_samples::<f32>().collect::<std::result::Result<Vec<_>, _>>()?,
            ),
            (hound::SampleFormat::Int, 16) => (
                SampleFormat::S16,
                reader
                    .into_samples::<i16>()
                    .map(|s| s.map(|v| v as f32 / 32768.0))
                    .collect::<std::result::Result<Vec<_>, _>>()?,
            ),
            (hound::SampleFormat::Int, bits) => {
                if !(8..=32).contains(&bits) {
                    bail!("{}: unsupported sample width of {} bits", path.display(), bits);
                }
                let max_val = (1i64 << (bits - 1)) as f32;
                (
                    SampleFormat::F32,
                    reader
                        .into_samples::<i32>()
                        .map(|s| s.map(|v| v as f32 / max_val))
                        .collect::<std::result::Result<Vec<_>, _>>()?,
                )
            }
        };

        log::debug!(
            "{}: {}Hz, {} channel(s), {} samples",
            path.display(),
            spec.sample_rate,
            spec.channels,
            samples.len()
        );

        Ok(Self {
            sample_rate: spec.sample_rate,
            channels: spec.channels,
            format,
            samples,
        })
    }

    /// Frame covering `frames` per-channel samples starting at per-channel offset `start`.
    fn frame(&self, start: usize, frames: usize, timestamp: Option<i64>) -> Option<AudioFrame> {
        let channels = self.channels.max(1) as usize;
        let begin = start * channels;
        if begin >= self.samples.len() {
            return None;
        }
        let end = (begin + frames * channels).min(self.samples.len());
        Some(AudioFrame {
            format: self.format,
            sample_rate: self.sample_rate,
            channels: self.channels,
            timestamp,
            data: self.samples[begin..end].to_vec(),
        })
    }
}

/// Counters reported after an offline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessSummary {
    pub frames_in: usize,
    pub frames_out: usize,
    pub blocks: u64,
}

/// Cancels the echo of `far` in `near` and writes the result to `output` as
/// 16kHz mono 32-bit float.
///
/// The recordings are cut into frames of `frame_len` near-end samples; for
/// each slice the matching far-end frame is pushed first. A trailing partial
/// hop is not written.
pub fn process_files(
    near: &Path,
    far: &Path,
    output: &Path,
    mut canceller: EchoCanceller,
    frame_len: usize,
) -> Result<ProcessSummary> {
    if frame_len == 0 {
        bail!("Frame length must be at least one sample");
    }

    let near = WavStream::open(near)?;
    let far = WavStream::open(far)?;
    let far_frame_len = ((frame_len as u64 * far.sample_rate as u64) / near.sample_rate.max(1) as u64).max(1) as usize;

    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: SAMPLE_RATE,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    let mut writer =
        hound::WavWriter::create(output, spec).with_context(|| format!("Failed to create {}", output.display()))?;

    let mut summary = ProcessSummary {
        frames_in: 0,
        frames_out: 0,
        blocks: 0,
    };

    let mut index = 0;
    loop {
        let timestamp = (index * frame_len) as i64 * 1_000_000 / near.sample_rate.max(1) as i64;
        let Some(near_frame) = near.frame(index * frame_len, frame_len, Some(timestamp)) else {
            break;
        };

        if let Some(far_frame) = far.frame(index * far_frame_len, far_frame_len, None) {
            canceller
                .process_far_end(&far_frame)
                .with_context(|| format!("Far-end frame {} rejected", index))?;
        }

        let produced = canceller
            .process_near_end(&near_frame)
            .with_context(|| format!("Near-end frame {} rejected", index))?;
        for frame in &produced {
            for &sample in frame.data.iter() {
                writer.write_sample(sample)?;
            }
        }

        summary.frames_in += 1;
        summary.frames_out += produced.len();
        index += 1;
    }

    writer.finalize()?;
    summary.blocks = canceller.blocks_processed();

    log::info!(
        "Processed {} input frames into {} output frames ({} blocks)",
        summary.frames_in,
        summary.frames_out,
        summary.blocks
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use dtlnaec_core::constants::{BLOCK_LEN, BLOCK_SHIFT, FFT_BINS};
    use dtlnaec_core::{InferenceStage, StageOutput, TensorShape};
    use ndarray::{ArrayD, ArrayViewD};
    use std::fs;
    use std::path::PathBuf;

    struct Unity(usize);

    impl InferenceStage for Unity {
        fn name(&self) -> &str {
            "unity"
        }

        fn input_shapes(&self) -> Vec<Option<TensorShape>> {
            vec![None, Some(TensorShape::new(vec![1, 2])), None]
        }

        fn output_count(&self) -> usize {
            2
        }

        fn predict(&mut self, inputs: [ArrayViewD<'_, f32>; 3]) -> dtlnaec_core::Result<StageOutput> {
            let primary = if self.0 == FFT_BINS {
                ArrayD::ones(inputs[0].raw_dim())
            } else {
                inputs[0].to_owned()
            };
            Ok(StageOutput {
                primary,
                state: inputs[1].to_owned(),
            })
        }
    }

    fn canceller() -> EchoCanceller {
        EchoCanceller::new(Unity(FFT_BINS), Unity(BLOCK_LEN)).unwrap()
    }

    fn scratch_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("dtlnaec-wav-{}-{}", tag, std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn write_i16(path: &Path, sample_rate: u32, channels: u16, samples: &[i16]) {
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for &s in samples {
            writer.write_sample(s).unwrap();
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn test_process_16k_files() {
        let dir = scratch_dir("16k");
        let (near, far, out) = (dir.join("near.wav"), dir.join("far.wav"), dir.join("out.wav"));
        write_i16(&near, 16000, 1, &vec![1000; 1000]);
        write_i16(&far, 16000, 1, &vec![-500; 1000]);

        let summary = process_files(&near, &far, &out, canceller(), 160).unwrap();
        // 1000 samples in frames of 160: six full frames plus one of 40
        assert_eq!(summary.frames_in, 7);
        assert_eq!(summary.frames_out, 1000 / BLOCK_SHIFT);
        assert_eq!(summary.blocks, summary.frames_out as u64);

        let reader = hound::WavReader::open(&out).unwrap();
        let spec = reader.spec();
        assert_eq!(spec.sample_rate, 16000);
        assert_eq!(spec.channels, 1);
        assert_eq!(spec.sample_format, hound::SampleFormat::Float);
        assert_eq!(reader.len() as usize, summary.frames_out * BLOCK_SHIFT);
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn test_process_48k_files() {
        let dir = scratch_dir("48k");
        let (near, far, out) = (dir.join("near.wav"), dir.join("far.wav"), dir.join("out.wav"));
        write_i16(&near, 48000, 1, &vec![0; 4800]);
        write_i16(&far, 48000, 1, &vec![0; 4800]);

        let summary = process_files(&near, &far, &out, canceller(), 480).unwrap();
        assert_eq!(summary.frames_in, 10);
        assert_eq!(summary.frames_out, 1600 / BLOCK_SHIFT);

        let samples: Vec<f32> = hound::WavReader::open(&out)
            .unwrap()
            .into_samples::<f32>()
            .map(|s| s.unwrap())
            .collect();
        assert!(samples.iter().all(|&s| s == 0.0));
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn test_stereo_near_end_is_rejected() {
        let dir = scratch_dir("stereo");
        let (near, far, out) = (dir.join("near.wav"), dir.join("far.wav"), dir.join("out.wav"));
        write_i16(&near, 16000, 2, &vec![0; 640]);
        write_i16(&far, 16000, 1, &vec![0; 320]);

        let err = process_files(&near, &far, &out, canceller(), 160).unwrap_err();
        assert!(err
            .chain()
            .any(|cause| cause.to_string().contains("Unsupported channel layout")));
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn test_24bit_input_is_scaled() {
        let dir = scratch_dir("24bit");
        let (near, far, out) = (dir.join("near.wav"), dir.join("far.wav"), dir.join("out.wav"));
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 16000,
            bits_per_sample: 24,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&near, spec).unwrap();
        for _ in 0..BLOCK_SHIFT * 2 {
            writer.write_sample(1i32 << 22).unwrap();
        }
        writer.finalize().unwrap();
        write_i16(&far, 16000, 1, &[0; 256]);

        let summary = process_files(&near, &far, &out, canceller(), BLOCK_SHIFT).unwrap();
        assert_eq!(summary.frames_out, 2);
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn test_zero_width_header_is_an_error() {
        let dir = scratch_dir("zero-width");
        let (near, far, out) = (dir.join("near.wav"), dir.join("far.wav"), dir.join("out.wav"));

        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"RIFF");
        bytes.extend_from_slice(&(36u32 + 4).to_le_bytes());
        bytes.extend_from_slice(b"WAVEfmt ");
        bytes.extend_from_slice(&16u32.to_le_bytes());
        bytes.extend_from_slice(&1u16.to_le_bytes()); // PCM
        bytes.extend_from_slice(&1u16.to_le_bytes()); // channels
        bytes.extend_from_slice(&16000u32.to_le_bytes());
        bytes.extend_from_slice(&0u32.to_le_bytes()); // byte rate
        bytes.extend_from_slice(&0u16.to_le_bytes()); // block align
        bytes.extend_from_slice(&0u16.to_le_bytes()); // bits per sample
        bytes.extend_from_slice(b"data");
        bytes.extend_from_slice(&4u32.to_le_bytes());
        bytes.extend_from_slice(&[0; 4]);
        fs::write(&near, bytes).unwrap();
        write_i16(&far, 16000, 1, &[0; 256]);

        assert!(process_files(&near, &far, &out, canceller(), BLOCK_SHIFT).is_err());
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn test_missing_input_file() {
        let dir = scratch_dir("missing");
        let result = process_files(
            &dir.join("nope.wav"),
            &dir.join("nope.wav"),
            &dir.join("out.wav"),
            canceller(),
            160,
        );
        assert!(result.is_err());
        let _ = fs::remove_dir_all(dir);
    }
}
