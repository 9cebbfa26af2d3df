use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

use crate::capture::CaptureTool;
use crate::error::{PreviewError, Result};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PreviewConfig {
    pub server: ServerConfig,
    pub capture: CaptureConfig,
    pub device: DeviceConfig,
    pub watch: WatchConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    /// Interface to bind; the preview is meant for a local interface
    #[serde(default = "default_host")]
    pub host: String,

    /// TCP port to listen on
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CaptureConfig {
    /// Target capture rate in frames per second
    #[serde(default = "default_fps")]
    pub fps: u32,

    /// Which external screenshot tool to use
    #[serde(default)]
    pub tool: CaptureTool,

    /// Use the in-process RPC backend instead of subprocess capture
    #[serde(default)]
    pub use_process_capture: bool,

    /// JPEG quality for transcoded frames
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,

    /// Device port of an already-provisioned screenshot service
    /// (direct capture only)
    #[serde(default)]
    pub screenshot_port: Option<u16>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DeviceConfig {
    /// Human-readable device name shown in the viewer
    #[serde(default = "default_device_name")]
    pub name: String,

    /// Unique device identifier, when a specific device is selected
    #[serde(default)]
    pub udid: String,

    /// Product identifier such as `iPhone15,2`, used to pick the frame skin
    #[serde(default)]
    pub model: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct WatchConfig {
    /// File extension that triggers the change callback
    #[serde(default = "default_watch_extension")]
    pub extension: String,

    /// Directory poll interval in milliseconds
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Settle window after the first detected change
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

impl PreviewConfig {
    /// Load configuration from default sources (optional file + environment)
    pub fn load() -> std::result::Result<Self, ConfigError> {
        Self::load_from_file("xtool-preview.toml")
    }

    /// Load configuration, layering an optional TOML file and
    /// `XTOOL_PREVIEW_*` environment variables over the built-in defaults.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> std::result::Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy();
        debug!("Loading configuration from: {}", path_str);

        let settings = Config::builder()
            .set_default("server.host", default_host())?
            .set_default("server.port", default_port() as i64)?
            .set_default("capture.fps", default_fps() as i64)?
            .set_default("capture.use_process_capture", false)?
            .set_default("capture.jpeg_quality", default_jpeg_quality() as i64)?
            .set_default("device.name", default_device_name())?
            .set_default("device.udid", "")?
            .set_default("device.model", "")?
            .set_default("watch.extension", default_watch_extension())?
            .set_default("watch.poll_interval_ms", default_poll_interval_ms() as i64)?
            .set_default("watch.debounce_ms", default_debounce_ms() as i64)?
            .add_source(File::with_name(&path_str).required(false))
            .add_source(Environment::with_prefix("XTOOL_PREVIEW").separator("__"))
            .build()?;

        settings.try_deserialize()
    }

    /// Validate ranges the CLI also enforces; startup fails on violation.
    pub fn validate(&self) -> Result<()> {
        if self.server.port < 1024 {
            return Err(PreviewError::InvalidConfig {
                message: format!("port {} is below 1024", self.server.port),
            });
        }
        if self.capture.fps == 0 || self.capture.fps > 30 {
            return Err(PreviewError::InvalidConfig {
                message: format!("fps {} is outside 1..=30", self.capture.fps),
            });
        }
        if self.capture.jpeg_quality == 0 || self.capture.jpeg_quality > 100 {
            return Err(PreviewError::InvalidConfig {
                message: format!(
                    "jpeg quality {} is outside 1..=100",
                    self.capture.jpeg_quality
                ),
            });
        }
        if self.watch.extension.is_empty() {
            return Err(PreviewError::InvalidConfig {
                message: "watch extension must not be empty".to_string(),
            });
        }
        Ok(())
    }

    /// The UDID as an optional value (empty string means "any device")
    pub fn udid(&self) -> Option<&str> {
        if self.device.udid.is_empty() {
            None
        } else {
            Some(&self.device.udid)
        }
    }
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: default_host(),
                port: default_port(),
            },
            capture: CaptureConfig {
                fps: default_fps(),
                tool: CaptureTool::default(),
                use_process_capture: false,
                jpeg_quality: default_jpeg_quality(),
                screenshot_port: None,
            },
            device: DeviceConfig {
                name: default_device_name(),
                udid: String::new(),
                model: String::new(),
            },
            watch: WatchConfig {
                extension: default_watch_extension(),
                poll_interval_ms: default_poll_interval_ms(),
                debounce_ms: default_debounce_ms(),
            },
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8034
}

fn default_fps() -> u32 {
    5
}

fn default_jpeg_quality() -> u8 {
    80
}

fn default_device_name() -> String {
    "iPhone".to_string()
}

fn default_watch_extension() -> String {
    "swift".to_string()
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_debounce_ms() -> u64 {
    500
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PreviewConfig::default();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 8034);
        assert_eq!(config.capture.fps, 5);
        assert_eq!(config.capture.tool, CaptureTool::Auto);
        assert!(!config.capture.use_process_capture);
        assert_eq!(config.watch.extension, "swift");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_rejects_bad_ranges() {
        let mut config = PreviewConfig::default();
        config.server.port = 80;
        assert!(config.validate().is_err());

        let mut config = PreviewConfig::default();
        config.capture.fps = 0;
        assert!(config.validate().is_err());

        let mut config = PreviewConfig::default();
        config.capture.fps = 31;
        assert!(config.validate().is_err());

        let mut config = PreviewConfig::default();
        config.capture.jpeg_quality = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_udid_accessor() {
        let mut config = PreviewConfig::default();
        assert_eq!(config.udid(), None);
        config.device.udid = "00008110-000000000000000E".to_string();
        assert_eq!(config.udid(), Some("00008110-000000000000000E"));
    }

    #[test]
    fn test_load_from_missing_file_uses_defaults() {
        let config = PreviewConfig::load_from_file("/nonexistent/xtool-preview.toml").unwrap();
        assert_eq!(config.server.port, 8034);
        assert_eq!(config.capture.fps, 5);
    }

    #[test]
    fn test_load_from_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("xtool-preview.toml");
        std::fs::write(
            &path,
            "[server]\nport = 9000\n\n[capture]\nfps = 10\ntool = \"pymobiledevice3\"\n",
        )
        .unwrap();

        let config = PreviewConfig::load_from_file(&path).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.capture.fps, 10);
        assert_eq!(config.capture.tool, CaptureTool::Pymobiledevice3);
        // untouched sections keep their defaults
        assert_eq!(config.device.name, "iPhone");
    }

    #[test]
    fn test_round_trips_through_toml() {
        let config = PreviewConfig::default();
        let rendered = toml::to_string_pretty(&config).unwrap();
        assert!(rendered.contains("port = 8034"));
        let parsed: PreviewConfig = toml::from_str(&rendered).unwrap();
        assert_eq!(parsed.server.port, config.server.port);
    }
}
