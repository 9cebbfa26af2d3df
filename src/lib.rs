// Core building blocks
pub mod config;
pub mod error;
pub mod frame;

// Image pipeline
pub mod jpeg;
pub mod tiff;

// Capture and fan-out
pub mod capture;
pub mod producer;
pub mod status;

// HTTP surface
pub mod devices;
pub mod server;
pub mod viewer;

// Live-reload collaborator
pub mod watcher;

// Re-export common types at the crate root
#[cfg(all(unix, feature = "direct-capture"))]
pub use capture::DirectCapture;
pub use capture::{backend_from_config, CaptureBackend, CaptureTool, DdiCache, StubCapture, SubprocessCapture};
pub use config::PreviewConfig;
pub use devices::{display_info, DeviceDisplayInfo, DisplayStyle};
pub use error::{CaptureError, PreviewError, Result, StreamError, TiffError, WatchError};
pub use frame::{CompressedFrame, ContentType, Frame};
pub use producer::{FrameProducer, FrameSubscription};
pub use server::PreviewServer;
pub use status::{BuildStatus, BuildStatusBroadcaster, BuildStatusEvent};
pub use tiff::RawImage;
pub use watcher::FileWatcher;
