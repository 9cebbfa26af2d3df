use axum::{
    extract::ws::{Message, WebSocket, WebSocketUpgrade},
    extract::State,
    response::IntoResponse,
};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

use super::ServerState;

/// `GET /ws` - binary WebSocket stream, one JPEG per frame
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<ServerState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(mut socket: WebSocket, state: ServerState) {
    info!("WebSocket client connected");
    let mut subscription = state.producer.subscribe();

    let mut last_sent = 0u64;
    let mut frame_interval = interval(state.frame_interval);
    frame_interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = frame_interval.tick() => {
                let Some(frame) = state.producer.latest_frame() else {
                    continue;
                };
                if frame.sequence <= last_sent {
                    continue;
                }
                last_sent = frame.sequence;
                if socket.send(Message::Binary(frame.bytes.to_vec())).await.is_err() {
                    break;
                }
            }
            inbound = socket.recv() => {
                match inbound {
                    Some(Ok(Message::Ping(payload))) => {
                        if socket.send(Message::Pong(payload)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(close))) => {
                        let _ = socket.send(Message::Close(close)).await;
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        debug!("WebSocket receive error: {}", e);
                        break;
                    }
                    None => break,
                }
            }
        }
    }

    subscription.release();
    debug!("WebSocket client disconnected");
}
