use thiserror::Error;

/// Main error type for the preview system
#[derive(Error, Debug)]
pub enum PreviewError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TIFF decode error: {0}")]
    Tiff(#[from] TiffError),

    #[error("Capture error: {0}")]
    Capture(#[from] CaptureError),

    #[error("Server error: {0}")]
    Stream(#[from] StreamError),

    #[error("File watcher error: {0}")]
    Watch(#[from] WatchError),

    #[error("System error: {message}")]
    System { message: String },
}

/// Errors produced by the baseline TIFF decoder
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TiffError {
    #[error("invalid TIFF header")]
    InvalidHeader,

    #[error("unsupported format: {details}")]
    UnsupportedFormat { details: String },

    #[error("missing required TIFF tag {tag}")]
    MissingTag { tag: u16 },

    #[error("TIFF data out of bounds")]
    OutOfBounds,
}

/// Capture backend error types
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("capture tool '{tool}' not found on disk")]
    ToolNotFound { tool: String },

    #[error("{tool} exited with {status}: {stderr}")]
    ToolFailed {
        tool: String,
        status: String,
        stderr: String,
    },

    #[error(
        "all capture tools failed; if the device runs iOS 17 or later, \
         start the developer tunnel (`pymobiledevice3 remote tunneld`) and retry"
    )]
    AllToolsFailed,

    #[error("device not found{}", .udid.as_deref().map(|u| format!(": {u}")).unwrap_or_default())]
    DeviceNotFound { udid: Option<String> },

    #[error("device protocol failure: {details}")]
    Protocol { details: String },

    #[error("failed to create capture directory {path}: {source}")]
    TempDir {
        path: String,
        source: std::io::Error,
    },

    #[error("screenshot read failed: {details}")]
    FrameRead { details: String },

    #[error("capture backend not available: {details}")]
    NotAvailable { details: String },
}

/// HTTP/WebSocket server error types
#[derive(Error, Debug)]
pub enum StreamError {
    #[error("Failed to bind to {address}: {source}")]
    BindFailed {
        address: String,
        source: std::io::Error,
    },

    #[error("Server startup failed: {details}")]
    StartupFailed { details: String },

    #[error("Network error: {0}")]
    Network(#[from] std::io::Error),
}

/// File watcher error types
#[derive(Error, Debug)]
pub enum WatchError {
    #[error("watch root {path} is not a directory")]
    NotADirectory { path: String },

    #[error("Directory scan failed for {path}: {source}")]
    Scan {
        path: String,
        source: std::io::Error,
    },
}

impl PreviewError {
    /// Create a system error with a message
    pub fn system<S: Into<String>>(message: S) -> Self {
        Self::System {
            message: message.into(),
        }
    }

    /// True for errors that abort startup rather than a single frame or
    /// connection.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            PreviewError::Config(_)
                | PreviewError::InvalidConfig { .. }
                | PreviewError::Stream(StreamError::BindFailed { .. })
                | PreviewError::Stream(StreamError::StartupFailed { .. })
                | PreviewError::Capture(CaptureError::AllToolsFailed)
                | PreviewError::Capture(CaptureError::ToolNotFound { .. })
        )
    }
}

/// Convenience type alias for Results
pub type Result<T> = std::result::Result<T, PreviewError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_formatting() {
        let tiff = PreviewError::Tiff(TiffError::UnsupportedFormat {
            details: "compressed TIFF (compression=5)".to_string(),
        });
        assert_eq!(
            tiff.to_string(),
            "TIFF decode error: unsupported format: compressed TIFF (compression=5)"
        );

        let capture = PreviewError::Capture(CaptureError::ToolFailed {
            tool: "idevicescreenshot".to_string(),
            status: "exit status: 1".to_string(),
            stderr: "No device found".to_string(),
        });
        assert_eq!(
            capture.to_string(),
            "Capture error: idevicescreenshot exited with exit status: 1: No device found"
        );

        let system = PreviewError::system("boom");
        assert_eq!(system.to_string(), "System error: boom");
    }

    #[test]
    fn test_missing_tag_display() {
        let err = TiffError::MissingTag { tag: 273 };
        assert_eq!(err.to_string(), "missing required TIFF tag 273");
    }

    #[test]
    fn test_device_not_found_display() {
        let anon = CaptureError::DeviceNotFound { udid: None };
        assert_eq!(anon.to_string(), "device not found");

        let named = CaptureError::DeviceNotFound {
            udid: Some("00008110-000000000000000E".to_string()),
        };
        assert_eq!(
            named.to_string(),
            "device not found: 00008110-000000000000000E"
        );
    }

    #[test]
    fn test_fatal_classification() {
        assert!(PreviewError::Stream(StreamError::BindFailed {
            address: "0.0.0.0:8034".to_string(),
            source: std::io::Error::new(std::io::ErrorKind::AddrInUse, "in use"),
        })
        .is_fatal());
        assert!(PreviewError::Capture(CaptureError::AllToolsFailed).is_fatal());

        assert!(!PreviewError::Capture(CaptureError::FrameRead {
            details: "short read".to_string(),
        })
        .is_fatal());
        assert!(!PreviewError::Tiff(TiffError::InvalidHeader).is_fatal());
    }

    #[test]
    fn test_error_source_chain() {
        use std::error::Error;

        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err = PreviewError::Io(io);
        assert!(err.source().is_some());
        assert_eq!(err.source().unwrap().to_string(), "gone");
    }
}
