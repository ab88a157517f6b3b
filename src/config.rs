use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::cache::{DEFAULT_TARGET_HEIGHT, DEFAULT_TARGET_WIDTH};
use crate::detect::DEFAULT_DARK_THRESHOLD;
use crate::display::DEFAULT_QUEUE_CAPACITY;
use crate::frame::DEFAULT_JPEG_QUALITY;
use crate::pipeline::{DEFAULT_NATIVE_HEIGHT, DEFAULT_NATIVE_WIDTH};
use crate::receiver::{DEFAULT_MAX_CONSECUTIVE_ERRORS, DEFAULT_POLL_TIMEOUT};

const DEFAULT_FRAME_ENDPOINT: &str = "tcp://127.0.0.1:5555";
const DEFAULT_RESULT_ENDPOINT: &str = "tcp://127.0.0.1:5550";
const DEFAULT_SEND_HWM: i32 = 10;
const DEFAULT_BACKEND: &str = "threshold";
const DEFAULT_SNAPSHOT_INTERVAL_MS: u64 = 500;
const DEFAULT_JOIN_TIMEOUT_MS: u64 = 1000;

#[derive(Debug, Deserialize, Default)]
struct RelayConfigFile {
    transport: Option<TransportConfigFile>,
    model: Option<ModelConfigFile>,
    display: Option<DisplayConfigFile>,
    host: Option<HostConfigFile>,
    sender: Option<SenderConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct TransportConfigFile {
    frame_endpoint: Option<String>,
    result_endpoint: Option<String>,
    receive_poll_ms: Option<u64>,
    max_consecutive_errors: Option<u32>,
    send_high_water_mark: Option<i32>,
}

#[derive(Debug, Deserialize, Default)]
struct ModelConfigFile {
    backend: Option<String>,
    native_width: Option<u32>,
    native_height: Option<u32>,
    threshold: Option<u8>,
    onnx_path: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Default)]
struct DisplayConfigFile {
    queue_capacity: Option<usize>,
    snapshot_path: Option<PathBuf>,
    snapshot_interval_ms: Option<u64>,
    join_timeout_ms: Option<u64>,
    window: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
struct HostConfigFile {
    target_width: Option<u32>,
    target_height: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct SenderConfigFile {
    jpeg_quality: Option<u8>,
}

#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub transport: TransportSettings,
    pub model: ModelSettings,
    pub display: DisplaySettings,
    pub host: HostSettings,
    pub sender: SenderSettings,
}

#[derive(Debug, Clone)]
pub struct TransportSettings {
    pub frame_endpoint: String,
    pub result_endpoint: String,
    pub receive_poll_ms: u64,
    pub max_consecutive_errors: u32,
    pub send_high_water_mark: i32,
}

#[derive(Debug, Clone)]
pub struct ModelSettings {
    pub backend: String,
    pub native_width: u32,
    pub native_height: u32,
    pub threshold: u8,
    pub onnx_path: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct DisplaySettings {
    pub queue_capacity: usize,
    pub snapshot_path: Option<PathBuf>,
    pub snapshot_interval_ms: u64,
    pub join_timeout_ms: u64,
    /// Show composites in a desktop window; needs the `display-window` feature.
    pub window: bool,
}

#[derive(Debug, Clone)]
pub struct HostSettings {
    pub target_width: u32,
    pub target_height: u32,
}

#[derive(Debug, Clone)]
pub struct SenderSettings {
    pub jpeg_quality: u8,
}

impl RelayConfig {
    /// Load from the JSON file named by `PUPIL_RELAY_CONFIG` (if set), then apply env overrides.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("PUPIL_RELAY_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) if !path.trim().is_empty() => Some(read_config_file(Path::new(path))?),
            _ => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: RelayConfigFile) -> Self {
        let transport = file.transport.unwrap_or_default();
        let model = file.model.unwrap_or_default();
        let display = file.display.unwrap_or_default();
        let host = file.host.unwrap_or_default();
        let sender = file.sender.unwrap_or_default();
        Self {
            transport: TransportSettings {
                frame_endpoint: transport
                    .frame_endpoint
                    .unwrap_or_else(|| DEFAULT_FRAME_ENDPOINT.to_string()),
                result_endpoint: transport
                    .result_endpoint
                    .unwrap_or_else(|| DEFAULT_RESULT_ENDPOINT.to_string()),
                receive_poll_ms: transport
                    .receive_poll_ms
                    .unwrap_or(DEFAULT_POLL_TIMEOUT.as_millis() as u64),
                max_consecutive_errors: transport
                    .max_consecutive_errors
                    .unwrap_or(DEFAULT_MAX_CONSECUTIVE_ERRORS),
                send_high_water_mark: transport
                    .send_high_water_mark
                    .unwrap_or(DEFAULT_SEND_HWM),
            },
            model: ModelSettings {
                backend: model
                    .backend
                    .unwrap_or_else(|| DEFAULT_BACKEND.to_string()),
                native_width: model.native_width.unwrap_or(DEFAULT_NATIVE_WIDTH),
                native_height: model.native_height.unwrap_or(DEFAULT_NATIVE_HEIGHT),
                threshold: model.threshold.unwrap_or(DEFAULT_DARK_THRESHOLD),
                onnx_path: model.onnx_path,
            },
            display: DisplaySettings {
                queue_capacity: display.queue_capacity.unwrap_or(DEFAULT_QUEUE_CAPACITY),
                snapshot_path: display.snapshot_path,
                snapshot_interval_ms: display
                    .snapshot_interval_ms
                    .unwrap_or(DEFAULT_SNAPSHOT_INTERVAL_MS),
                join_timeout_ms: display.join_timeout_ms.unwrap_or(DEFAULT_JOIN_TIMEOUT_MS),
                window: display.window.unwrap_or(false),
            },
            host: HostSettings {
                target_width: host.target_width.unwrap_or(DEFAULT_TARGET_WIDTH),
                target_height: host.target_height.unwrap_or(DEFAULT_TARGET_HEIGHT),
            },
            sender: SenderSettings {
                jpeg_quality: sender.jpeg_quality.unwrap_or(DEFAULT_JPEG_QUALITY),
            },
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(endpoint) = non_empty_env("PUPIL_RELAY_FRAME_ENDPOINT") {
            self.transport.frame_endpoint = endpoint;
        }
        if let Some(endpoint) = non_empty_env("PUPIL_RELAY_RESULT_ENDPOINT") {
            self.transport.result_endpoint = endpoint;
        }
        if let Some(backend) = non_empty_env("PUPIL_RELAY_BACKEND") {
            self.model.backend = backend.to_lowercase();
        }
        if let Some(path) = non_empty_env("PUPIL_RELAY_ONNX_PATH") {
            self.model.onnx_path = Some(PathBuf::from(path));
        }
        if let Some(path) = non_empty_env("PUPIL_RELAY_SNAPSHOT_PATH") {
            self.display.snapshot_path = Some(PathBuf::from(path));
        }
        if let Some(threshold) = non_empty_env("PUPIL_RELAY_THRESHOLD") {
            self.model.threshold = threshold
                .parse()
                .map_err(|_| anyhow!("PUPIL_RELAY_THRESHOLD must be an integer in 0..=255"))?;
        }
        if let Some(window) = non_empty_env("PUPIL_RELAY_WINDOW") {
            self.display.window = parse_flag(&window)
                .ok_or_else(|| anyhow!("PUPIL_RELAY_WINDOW must be true/false or 1/0"))?;
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.transport.frame_endpoint.trim().is_empty() {
            return Err(anyhow!("transport.frame_endpoint must not be empty"));
        }
        if self.transport.result_endpoint.trim().is_empty() {
            return Err(anyhow!("transport.result_endpoint must not be empty"));
        }
        if self.transport.receive_poll_ms == 0 {
            return Err(anyhow!("transport.receive_poll_ms must be greater than zero"));
        }
        if self.transport.max_consecutive_errors == 0 {
            return Err(anyhow!(
                "transport.max_consecutive_errors must be greater than zero"
            ));
        }
        if self.transport.send_high_water_mark <= 0 {
            return Err(anyhow!(
                "transport.send_high_water_mark must be greater than zero"
            ));
        }
        if self.model.native_width == 0 || self.model.native_height == 0 {
            return Err(anyhow!("model native resolution must be non-zero"));
        }
        if self.host.target_width == 0 || self.host.target_height == 0 {
            return Err(anyhow!("host target resolution must be non-zero"));
        }
        if self.display.queue_capacity == 0 {
            return Err(anyhow!("display.queue_capacity must be greater than zero"));
        }
        if !(1..=100).contains(&self.sender.jpeg_quality) {
            return Err(anyhow!("sender.jpeg_quality must be between 1 and 100"));
        }
        if self.display.window && !cfg!(feature = "display-window") {
            return Err(anyhow!(
                "display.window needs a build with the display-window feature"
            ));
        }
        Ok(())
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self::from_file(RelayConfigFile::default())
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .filter(|value| !value.trim().is_empty())
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn read_config_file(path: &Path) -> Result<RelayConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}
