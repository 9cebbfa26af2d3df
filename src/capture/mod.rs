mod ddi;
#[cfg(all(unix, feature = "direct-capture"))]
mod direct;
mod stub;
mod subprocess;

pub use ddi::DdiCache;
#[cfg(all(unix, feature = "direct-capture"))]
pub use direct::DirectCapture;
pub use stub::StubCapture;
pub use subprocess::SubprocessCapture;

use async_trait::async_trait;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::config::PreviewConfig;
use crate::error::Result;

/// External screenshot tool selection
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum CaptureTool {
    /// Try each tool in order and stick with the first that works
    #[default]
    Auto,
    /// libimobiledevice's `idevicescreenshot` (TIFF output)
    Idevicescreenshot,
    /// `pymobiledevice3 developer dvt screenshot` (PNG output)
    Pymobiledevice3,
}

/// A source of raw screenshot blobs, one per call.
///
/// Backends are owned by a single producer; `capture_frame` is never called
/// concurrently.
#[async_trait]
pub trait CaptureBackend: Send {
    /// Prepare resources (temp directories, device sessions)
    async fn start(&mut self) -> Result<()>;

    /// Capture one screenshot and return its bytes
    async fn capture_frame(&mut self) -> Result<Vec<u8>>;

    /// Release resources; infallible by contract
    async fn stop(&mut self);
}

/// Build the backend selected by the configuration.
pub fn backend_from_config(config: &PreviewConfig) -> Result<Box<dyn CaptureBackend>> {
    if config.capture.use_process_capture {
        #[cfg(all(unix, feature = "direct-capture"))]
        {
            return Ok(Box::new(DirectCapture::new(
                config.udid().map(str::to_string),
                config.capture.screenshot_port,
            )));
        }
        #[cfg(not(all(unix, feature = "direct-capture")))]
        {
            return Err(crate::error::CaptureError::NotAvailable {
                details: "in-process capture requires the direct-capture feature".to_string(),
            }
            .into());
        }
    }

    Ok(Box::new(SubprocessCapture::new(
        config.capture.tool,
        config.udid().map(str::to_string),
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_value_enum_names() {
        assert_eq!(
            CaptureTool::from_str("auto", true).unwrap(),
            CaptureTool::Auto
        );
        assert_eq!(
            CaptureTool::from_str("idevicescreenshot", true).unwrap(),
            CaptureTool::Idevicescreenshot
        );
        assert_eq!(
            CaptureTool::from_str("pymobiledevice3", true).unwrap(),
            CaptureTool::Pymobiledevice3
        );
    }

    #[test]
    fn test_backend_from_default_config() {
        let config = PreviewConfig::default();
        assert!(backend_from_config(&config).is_ok());
    }

    #[cfg(not(feature = "direct-capture"))]
    #[test]
    fn test_process_capture_requires_feature() {
        let mut config = PreviewConfig::default();
        config.capture.use_process_capture = true;
        assert!(backend_from_config(&config).is_err());
    }
}
