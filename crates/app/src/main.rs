use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use cpal::traits::{DeviceTrait, HostTrait};
use dtlnaec_core::EchoCanceller;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

mod audio;
mod config;
mod model;
mod wav;

use config::AppConfig;

#[derive(Parser)]
#[command(name = "dtlnaec")]
#[command(about = "Neural acoustic echo cancellation", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List available audio devices
    List,
    /// Cancel echo between two WAV recordings
    Process {
        /// Microphone recording (16 or 48kHz mono)
        #[arg(long)]
        near: PathBuf,
        /// Loopback recording of what the speakers played
        #[arg(long)]
        far: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
        /// Near-end samples per frame
        #[arg(long)]
        frame_len: Option<usize>,
        #[command(flatten)]
        model: ModelArgs,
    },
    /// Run live echo cancellation in foreground (press Ctrl+C to stop)
    Run {
        #[arg(short, long)]
        input: Option<String>,
        #[arg(short, long)]
        output: Option<String>,
        /// Loopback/monitor device
        #[arg(short, long)]
        reference: Option<String>,
        /// Capture rate (16000 or 48000)
        #[arg(long)]
        sample_rate: Option<u32>,
        #[command(flatten)]
        model: ModelArgs,
        /// Store the effective settings as the new defaults
        #[arg(long)]
        save: bool,
    },
    /// Print the effective configuration
    Config,
}

#[derive(clap::Args)]
struct ModelArgs {
    /// Directory containing <name>_1.onnx and <name>_2.onnx
    #[arg(long)]
    model_dir: Option<PathBuf>,
    #[arg(long)]
    model_name: Option<String>,
}

impl ModelArgs {
    fn apply(self, config: &mut AppConfig) {
        if let Some(dir) = self.model_dir {
            config.model_dir = dir;
        }
        if let Some(name) = self.model_name {
            config.model_name = name;
        }
    }
}

fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    let mut config = AppConfig::load();

    match cli.command {
        Commands::List => {
            list_devices()?;
        }
        Commands::Process {
            near,
            far,
            output,
            frame_len,
            model,
        } => {
            model.apply(&mut config);
            if let Some(len) = frame_len {
                config.frame_len = len;
            }

            let canceller = build_canceller(&config.model_dir, &config.model_name)?;
            let summary = wav::process_files(&near, &far, &output, canceller, config.frame_len)?;
            println!(
                "Wrote {} ({} frames in, {} frames out)",
                output.display(),
                summary.frames_in,
                summary.frames_out
            );
        }
        Commands::Run {
            input,
            output,
            reference,
            sample_rate,
            model,
            save,
        } => {
            model.apply(&mut config);
            if let Some(input) = input {
                config.input_device = input;
            }
            if let Some(output) = output {
                config.output_device = output;
            }
            if let Some(reference) = reference {
                config.reference_device = reference;
            }
            if let Some(rate) = sample_rate {
                config.sample_rate = rate;
            }
            if save {
                config.save();
            }

            let canceller = build_canceller(&config.model_dir, &config.model_name)?;
            let engine = audio::AudioEngine::start(
                &config.input_device,
                &config.output_device,
                Some(config.reference_device.as_str()).filter(|name| !name.is_empty()),
                config.sample_rate,
                canceller,
            )?;
            println!("Echo cancellation active. Press Ctrl+C to stop.");

            // Graceful shutdown handling
            let running = Arc::new(AtomicBool::new(true));
            let r = running.clone();

            ctrlc::set_handler(move || {
                println!("\nShutting down gracefully...");
                r.store(false, Ordering::Relaxed);
            })?;

            while running.load(Ordering::Relaxed) {
                if let Some(e) = engine.poll_error() {
                    engine.stop();
                    return Err(e).context("Echo cancellation stopped");
                }
                std::thread::sleep(std::time::Duration::from_millis(100));
            }

            engine.stop();
            println!(
                "Stopped after {} blocks.",
                engine.blocks_processed.load(Ordering::Relaxed)
            );
        }
        Commands::Config => {
            match config::config_path() {
                Some(path) => println!("Config file: {}", path.display()),
                None => println!("Config file: unavailable on this platform"),
            }
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
    }

    Ok(())
}

fn build_canceller(model_dir: &Path, model_name: &str) -> Result<EchoCanceller> {
    let (stage_a, stage_b) = model::load_stages(model_dir, model_name)
        .with_context(|| format!("Could not load model '{}' from {}", model_name, model_dir.display()))?;
    let canceller = EchoCanceller::new(stage_a, stage_b).context("Model does not fit the echo canceller")?;
    Ok(canceller)
}

fn list_devices() -> Result<()> {
    let host = cpal::default_host();
    println!("Audio Host: {}", host.id().name());
    println!("\nInput Devices:");
    for device in host.input_devices()? {
        println!("  - {}", device.name().unwrap_or("Unknown".to_string()));
    }
    println!("\nOutput Devices:");
    for device in host.output_devices()? {
        println!("  - {}", device.name().unwrap_or("Unknown".to_string()));
    }
    Ok(())
}
