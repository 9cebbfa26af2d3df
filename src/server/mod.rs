mod handlers;
mod ws;

use axum::{routing::get, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpSocket};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::PreviewConfig;
use crate::devices::{self, DeviceDisplayInfo};
use crate::error::{Result, StreamError};
use crate::producer::FrameProducer;
use crate::status::BuildStatusBroadcaster;

/// MJPEG multipart boundary
pub(crate) const MJPEG_BOUNDARY: &str = "xtool-preview-frame";

/// Listen backlog for the preview socket
const LISTEN_BACKLOG: u32 = 256;

/// Shared state for the Axum handlers
#[derive(Clone)]
pub struct ServerState {
    pub(crate) producer: Arc<FrameProducer>,
    pub(crate) status: Arc<BuildStatusBroadcaster>,
    pub(crate) device_name: String,
    pub(crate) udid: String,
    pub(crate) fps: u32,
    pub(crate) display: DeviceDisplayInfo,
    /// Pacing interval for the per-connection send loops
    pub(crate) frame_interval: Duration,
}

/// HTTP/WebSocket server that serves the viewer page and frame streams
pub struct PreviewServer {
    state: ServerState,
    host: String,
    port: u16,
}

impl PreviewServer {
    pub fn new(
        config: &PreviewConfig,
        producer: Arc<FrameProducer>,
        status: Arc<BuildStatusBroadcaster>,
    ) -> Self {
        let fps = config.capture.fps.max(1);
        let state = ServerState {
            producer,
            status,
            device_name: config.device.name.clone(),
            udid: config.device.udid.clone(),
            fps,
            display: devices::display_info(&config.device.model),
            frame_interval: Duration::from_micros(1_000_000 / fps as u64),
        };
        Self {
            state,
            host: config.server.host.clone(),
            port: config.server.port,
        }
    }

    /// Route table; unknown paths get a plain-text 404.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/", get(handlers::viewer_handler))
            .route("/stream", get(handlers::stream_handler))
            .route("/frame", get(handlers::frame_handler))
            .route("/api/info", get(handlers::info_handler))
            .route("/api/events", get(handlers::events_handler))
            .route("/ws", get(ws::ws_handler))
            .fallback(handlers::not_found)
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }

    /// Bind the listener with address reuse and a fixed backlog.
    pub async fn bind(&self) -> Result<TcpListener> {
        let address = format!("{}:{}", self.host, self.port);
        let addr: SocketAddr = address.parse().map_err(|e| StreamError::StartupFailed {
            details: format!("invalid listen address {}: {}", address, e),
        })?;

        let socket = if addr.is_ipv4() {
            TcpSocket::new_v4()
        } else {
            TcpSocket::new_v6()
        }
        .map_err(|e| StreamError::BindFailed {
            address: address.clone(),
            source: e,
        })?;
        socket
            .set_reuseaddr(true)
            .map_err(|e| StreamError::BindFailed {
                address: address.clone(),
                source: e,
            })?;
        socket.bind(addr).map_err(|e| StreamError::BindFailed {
            address: address.clone(),
            source: e,
        })?;
        let listener = socket
            .listen(LISTEN_BACKLOG)
            .map_err(|e| StreamError::BindFailed {
                address: address.clone(),
                source: e,
            })?;

        info!("preview server listening on http://{}", address);
        Ok(listener)
    }

    /// Bind and serve until ctrl-c.
    pub async fn start(&self) -> Result<()> {
        let listener = self.bind().await?;
        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| StreamError::StartupFailed {
                details: format!("server error: {}", e),
            })?;
        Ok(())
    }
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown requested");
}
