use anyhow::{bail, Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::{Receiver, Sender};
use dtlnaec_core::constants::{SAMPLE_RATE, SUPPORTED_SAMPLE_RATES};
use dtlnaec_core::{AecError, EchoCanceller, FrameAdapter};
use log::{info, warn};
use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::HeapRb;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Host-rate samples handed to the canceller per iteration (10ms)
fn chunk_len(sample_rate: u32) -> usize {
    sample_rate as usize / 100
}

/// Live echo cancellation between a microphone, a loopback reference and a
/// playback device.
///
/// Device callbacks only move samples in and out of ring buffers. A single
/// processing thread owns the canceller, so both streams are serialised
/// through it.
pub struct AudioEngine {
    _input_stream: cpal::Stream,
    _output_stream: cpal::Stream,
    _reference_stream: Option<cpal::Stream>,
    is_running: Arc<AtomicBool>,
    errors: Receiver<AecError>,
    pub blocks_processed: Arc<AtomicU64>,
}

impl AudioEngine {
    /// Starts capture, playback and the processing thread.
    ///
    /// Input and reference are captured at `sample_rate` (16kHz or 48kHz);
    /// the cleaned output always plays at 16kHz. Without a reference device
    /// the canceller runs on a silent far-end.
    pub fn start(
        input_device_name: &str,
        output_device_name: &str,
        reference_device_name: Option<&str>,
        sample_rate: u32,
        canceller: EchoCanceller,
    ) -> Result<Self> {
        if !SUPPORTED_SAMPLE_RATES.contains(&sample_rate) {
            bail!("Unsupported capture rate {}Hz (expected 16000 or 48000)", sample_rate);
        }

        let host = cpal::default_host();
        info!("Audio host: {}", host.id().name());

        let input_device = find_input_device(&host, input_device_name).context("Input device not found")?;
        info!("Using input device: {}", input_device.name().unwrap_or_default());

        let output_device = if output_device_name == "default" {
            host.default_output_device()
                .context("No default output found")?
        } else {
            host.output_devices()?
                .find(|d| d.name().ok().as_deref() == Some(output_device_name))
                .context("Output device not found")?
        };
        info!("Using output device: {}", output_device.name().unwrap_or_default());

        let reference_device = reference_device_name.and_then(|name| {
            let dev = find_input_device(&host, name);
            match &dev {
                Some(d) => info!("Using reference device: {}", d.name().unwrap_or_default()),
                None => warn!("Reference device '{}' not found, far-end stays silent", name),
            }
            dev
        });

        let capture_config = cpal::StreamConfig {
            channels: 1,
            sample_rate: cpal::SampleRate(sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };
        let playback_config = cpal::StreamConfig {
            channels: 1,
            sample_rate: cpal::SampleRate(SAMPLE_RATE),
            buffer_size: cpal::BufferSize::Default,
        };

        // Latency management (200ms of capture, 100ms of playback)
        let capture_buffer = sample_rate as usize / 5;
        let playback_buffer = SAMPLE_RATE as usize / 10;

        let rb_in = HeapRb::<f32>::new(capture_buffer);
        let (mut prod_in, mut cons_in) = rb_in.split();

        let rb_ref = HeapRb::<f32>::new(capture_buffer);
        let (mut prod_ref, mut cons_ref) = rb_ref.split();

        let rb_out = HeapRb::<f32>::new(playback_buffer);
        let (mut prod_out, mut cons_out) = rb_out.split();

        let reference_stream: Option<cpal::Stream> = if let Some(ref_dev) = &reference_device {
            match ref_dev.build_input_stream(
                &capture_config,
                move |data: &[f32], _| {
                    let _ = prod_ref.push_slice(data);
                },
                |err| warn!("Reference input error: {}", err),
                None,
            ) {
                Ok(stream) => Some(stream),
                Err(e) => {
                    warn!("Failed to open reference device: {}", e);
                    None
                }
            }
        } else {
            None
        };

        let input_stream = input_device.build_input_stream(
            &capture_config,
            move |data: &[f32], _| {
                let _ = prod_in.push_slice(data);
            },
            |err| warn!("Input error: {}", err),
            None,
        )?;

        let output_stream = output_device.build_output_stream(
            &playback_config,
            move |data: &mut [f32], _| {
                let read = cons_out.pop_slice(data);
                if read < data.len() {
                    for sample in data.iter_mut().skip(read) {
                        *sample = 0.0;
                    }
                }
            },
            |err| warn!("Output error: {}", err),
            None,
        )?;

        let mut adapter = FrameAdapter::new(canceller, sample_rate)?;

        let is_running = Arc::new(AtomicBool::new(true));
        let run_flag = is_running.clone();
        let blocks_processed = Arc::new(AtomicU64::new(0));
        let blocks_for_thread = blocks_processed.clone();
        let (error_tx, error_rx) = crossbeam_channel::bounded(1);

        thread::Builder::new().name("dtlnaec-audio".into()).spawn(move || {
            let chunk = chunk_len(sample_rate);
            let mut near_frame = vec![0.0f32; chunk];
            let mut far_frame = vec![0.0f32; capture_buffer];
            let mut out_frame = vec![0.0f32; playback_buffer];

            // Cancellation is checked between frames only
            while run_flag.load(Ordering::Relaxed) {
                // Far-end first so the block sees the loopback that preceded it
                let far_len = cons_ref.pop_slice(&mut far_frame);
                if far_len > 0 {
                    if let Err(e) = adapter.push_far_end(&far_frame[..far_len]) {
                        if report(&error_tx, e) {
                            break;
                        }
                    }
                }

                if cons_in.occupied_len() < chunk {
                    thread::sleep(Duration::from_micros(500));
                    continue;
                }

                cons_in.pop_slice(&mut near_frame);
                if let Err(e) = adapter.push_near_end(&near_frame) {
                    if report(&error_tx, e) {
                        break;
                    }
                }
                blocks_for_thread.store(adapter.canceller().blocks_processed(), Ordering::Relaxed);

                // Write Audio - retry briefly if output buffer is full
                let ready = adapter.output_available().min(out_frame.len());
                let mut retries = 0;
                while prod_out.vacant_len() < ready {
                    thread::yield_now();
                    retries += 1;
                    if retries > 100 {
                        break;
                    }
                }
                let ready = ready.min(prod_out.vacant_len());
                let popped = adapter.pop_output(&mut out_frame[..ready]);
                prod_out.push_slice(&out_frame[..popped]);
            }
            info!("Audio processing thread stopped");
        }).context("Failed to spawn audio processing thread")?;

        input_stream.play()?;
        output_stream.play()?;
        if let Some(ref ref_stream) = reference_stream {
            ref_stream.play()?;
        }

        Ok(Self {
            _input_stream: input_stream,
            _output_stream: output_stream,
            _reference_stream: reference_stream,
            is_running,
            errors: error_rx,
            blocks_processed,
        })
    }

    /// Returns the fatal error that stopped processing, if any.
    pub fn poll_error(&self) -> Option<AecError> {
        self.errors.try_recv().ok()
    }

    pub fn stop(&self) {
        self.is_running.store(false, Ordering::Relaxed);
    }
}

impl Drop for AudioEngine {
    fn drop(&mut self) {
        self.is_running.store(false, Ordering::Relaxed);
    }
}

fn find_input_device(host: &cpal::Host, name: &str) -> Option<cpal::Device> {
    if name == "default" {
        return host.default_input_device();
    }
    match host.input_devices() {
        Ok(mut devs) => devs.find(|d| d.name().ok().as_deref() == Some(name)),
        Err(e) => {
            warn!("Failed to enumerate input devices: {}", e);
            None
        }
    }
}

/// Logs a processing error. Returns true when the thread has to stop.
fn report(errors: &Sender<AecError>, e: AecError) -> bool {
    if e.is_fatal() {
        log::error!("Echo canceller stopped: {}", e);
        let _ = errors.try_send(e);
        true
    } else {
        warn!("Dropped frame: {}", e);
        false
    }
}
