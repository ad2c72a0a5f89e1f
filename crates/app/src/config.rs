use directories::ProjectDirs;
use dtlnaec_core::constants::{DEFAULT_MODEL_NAME, SUPPORTED_SAMPLE_RATES};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// Persisted settings for the command line front end.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct AppConfig {
    /// Directory holding `<model_name>_1.onnx` and `<model_name>_2.onnx`
    #[serde(default = "default_model_dir")]
    pub model_dir: PathBuf,
    #[serde(default = "default_model_name")]
    pub model_name: String,
    #[serde(default = "default_device")]
    pub input_device: String,
    #[serde(default = "default_device")]
    pub output_device: String,
    /// Loopback/monitor device capturing what the speakers play. Empty runs
    /// without a far-end reference.
    #[serde(default)]
    pub reference_device: String,
    /// Device rate for live mode (16000 or 48000)
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    /// Input samples per frame in offline mode
    #[serde(default = "default_frame_len")]
    pub frame_len: usize,
}

fn default_model_dir() -> PathBuf {
    PathBuf::from("models")
}

fn default_model_name() -> String {
    DEFAULT_MODEL_NAME.to_string()
}

fn default_device() -> String {
    "default".to_string()
}

fn default_sample_rate() -> u32 {
    48000
}

fn default_frame_len() -> usize {
    480 // 10ms at 48kHz
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            model_dir: default_model_dir(),
            model_name: default_model_name(),
            input_device: default_device(),
            output_device: default_device(),
            reference_device: String::new(),
            sample_rate: default_sample_rate(),
            frame_len: default_frame_len(),
        }
    }
}

impl AppConfig {
    /// Loads configuration from disk, or returns default if not found.
    pub fn load() -> Self {
        if let Some(path) = config_path() {
            if let Ok(content) = fs::read_to_string(&path) {
                match serde_json::from_str::<AppConfig>(&content) {
                    Ok(cfg) => return cfg.sanitized(),
                    Err(e) => log::warn!("Ignoring unreadable config {}: {}", path.display(), e),
                }
            }
        }
        Self::default()
    }

    /// Saves configuration to disk in JSON format.
    pub fn save(&self) {
        if let Some(path) = config_path() {
            if let Some(parent) = path.parent() {
                let _ = fs::create_dir_all(parent);
            }
            if let Ok(json) = serde_json::to_string_pretty(self) {
                if let Err(e) = fs::write(&path, json) {
                    log::warn!("Could not save config to {}: {}", path.display(), e);
                }
            }
        }
    }

    /// Replaces out-of-range values with their defaults.
    fn sanitized(mut self) -> Self {
        if !SUPPORTED_SAMPLE_RATES.contains(&self.sample_rate) {
            log::warn!("Unsupported sample rate {} in config, using {}", self.sample_rate, default_sample_rate());
            self.sample_rate = default_sample_rate();
        }
        if self.frame_len == 0 {
            self.frame_len = default_frame_len();
        }
        self
    }
}

pub fn config_path() -> Option<PathBuf> {
    ProjectDirs::from("com", "dtlnaec", "dtlnaec").map(|dirs| dirs.config_dir().join("config.json"))
}
