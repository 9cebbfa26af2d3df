use axum::{
    body::Body,
    extract::State,
    http::{header, StatusCode},
    response::sse::{Event, Sse},
    response::{Html, IntoResponse, Response},
};
use bytes::Bytes;
use futures::Stream;
use serde::Serialize;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info};

use super::{ServerState, MJPEG_BOUNDARY};
use crate::devices::DeviceDisplayInfo;
use crate::viewer;

/// How long `/frame` waits for a frame before giving up
const SINGLE_FRAME_WAIT: Duration = Duration::from_secs(2);
const SINGLE_FRAME_POLL: Duration = Duration::from_millis(100);

/// Broadcaster poll cadence for the SSE channel
const SSE_POLL: Duration = Duration::from_millis(250);

/// `GET /` - the device-framed viewer page
pub async fn viewer_handler(State(state): State<ServerState>) -> Html<String> {
    Html(viewer::render(&state.device_name, &state.display))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InfoResponse<'a> {
    device_name: &'a str,
    udid: &'a str,
    fps: u32,
    display: &'a DeviceDisplayInfo,
}

/// `GET /api/info` - device and stream metadata
pub async fn info_handler(State(state): State<ServerState>) -> Response {
    let body = serde_json::to_string(&InfoResponse {
        device_name: &state.device_name,
        udid: &state.udid,
        fps: state.fps,
        display: &state.display,
    })
    .unwrap_or_default();

    ([(header::CONTENT_TYPE, "application/json")], body).into_response()
}

/// `GET /frame` - one frame, waiting briefly for the producer to warm up
pub async fn frame_handler(State(state): State<ServerState>) -> Response {
    let mut subscription = state.producer.subscribe();

    let mut waited = Duration::ZERO;
    let frame = loop {
        if let Some(frame) = state.producer.latest_frame() {
            break Some(frame);
        }
        if waited >= SINGLE_FRAME_WAIT {
            break None;
        }
        sleep(SINGLE_FRAME_POLL).await;
        waited += SINGLE_FRAME_POLL;
    };
    subscription.release();

    match frame {
        Some(frame) => Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, frame.content_type.as_str())
            .header(header::CONTENT_LENGTH, frame.bytes.len())
            .body(Body::from(frame.bytes))
            .unwrap(),
        None => {
            (StatusCode::INTERNAL_SERVER_ERROR, "No frame available").into_response()
        }
    }
}

/// `GET /stream` - MJPEG multipart stream.
///
/// The send loop publishes a part only when the latest sequence exceeds the
/// last one sent, so slow clients skip frames instead of queueing them, and
/// awaited body writes apply backpressure.
pub async fn stream_handler(State(state): State<ServerState>) -> impl IntoResponse {
    info!("MJPEG client connected");

    let subscription = state.producer.subscribe();
    let producer = Arc::clone(&state.producer);
    let frame_interval = state.frame_interval;

    let stream = async_stream::stream! {
        // owned by the generator: released when the connection tears down
        let _subscription = subscription;
        let mut last_sent = 0u64;

        loop {
            if let Some(frame) = producer.latest_frame() {
                if frame.sequence > last_sent {
                    last_sent = frame.sequence;
                    let head = format!(
                        "--{}\r\nContent-Type: {}\r\nContent-Length: {}\r\n\r\n",
                        MJPEG_BOUNDARY,
                        frame.content_type.as_str(),
                        frame.bytes.len(),
                    );
                    yield Ok::<_, Infallible>(Bytes::from(head));
                    yield Ok(frame.bytes.clone());
                    yield Ok(Bytes::from_static(b"\r\n"));
                }
            }
            sleep(frame_interval).await;
        }
    };

    Response::builder()
        .status(StatusCode::OK)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/x-mixed-replace; boundary={}", MJPEG_BOUNDARY),
        )
        .header(header::CACHE_CONTROL, "no-cache, private")
        .body(Body::from_stream(stream))
        .unwrap()
}

#[derive(Serialize)]
struct StatusPayload<'a> {
    status: &'a str,
    message: &'a str,
}

/// `GET /api/events` - build-status updates as Server-Sent Events.
///
/// Polls the broadcaster and emits one event per sequence advance; a fresh
/// client starts from sequence 0, so it immediately receives the current
/// status unless the broadcaster is still idle.
pub async fn events_handler(
    State(state): State<ServerState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    debug!("SSE client connected");
    let status = Arc::clone(&state.status);

    let stream = async_stream::stream! {
        let mut last_sequence = 0u64;
        loop {
            let event = status.snapshot();
            if event.sequence > last_sequence {
                last_sequence = event.sequence;
                let payload = serde_json::to_string(&StatusPayload {
                    status: event.status.as_str(),
                    message: &event.message,
                })
                .unwrap_or_default();
                yield Ok(Event::default().data(payload));
            }
            sleep(SSE_POLL).await;
        }
    };

    Sse::new(stream)
}

/// Fallback for unrecognised paths
pub async fn not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, "Not Found")
}
