//! WebSocket session lifecycle — handles a single connected client from
//! upgrade through disconnect.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use futures::{SinkExt, StreamExt};
use metrics::{counter, gauge, histogram};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{info, instrument, warn};

use relay_core::ConnectionId;
use relay_hub::HeaderSnapshot;

use crate::server::AppState;

/// GET /ws — upgrade to a WebSocket session.
///
/// Refuses the upgrade with 503 when the connection limit is reached.
pub async fn ws_handler(
    State(state): State<AppState>,
    ConnectInfo(remote_addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    if state.hub.connection_count() >= state.config.max_connections {
        warn!(%remote_addr, "connection limit reached, refusing upgrade");
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }

    let snapshot = HeaderSnapshot {
        host: header_value(&headers, header::HOST),
        user_agent: header_value(&headers, header::USER_AGENT),
    };
    ws.on_upgrade(move |socket| run_ws_session(socket, state, remote_addr, snapshot))
}

fn header_value(headers: &HeaderMap, name: header::HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned)
}

/// Run a WebSocket session for a connected client.
///
/// 1. Registers the outbound channel and the connection, emits `connected`
/// 2. Dispatches incoming text frames through the gateway
/// 3. Forwards outbound events via the send channel
/// 4. Sends periodic Ping frames and disconnects unresponsive clients
/// 5. Cleans up on disconnect
#[instrument(skip_all, fields(peer = %remote_addr))]
pub async fn run_ws_session(
    socket: WebSocket,
    state: AppState,
    remote_addr: SocketAddr,
    headers: HeaderSnapshot,
) {
    let id = ConnectionId::new();
    let (mut ws_tx, mut ws_rx) = socket.split();

    let (send_tx, mut send_rx) = mpsc::channel::<Arc<String>>(1024);
    state.hub.register(id.clone(), send_tx);

    let session_start = Instant::now();
    counter!("ws_connections_total").increment(1);
    gauge!("ws_connections_active").increment(1.0);

    state
        .gateway
        .handle_connect(&id, remote_addr.to_string(), headers);

    // heartbeat state shared between the two halves
    let alive = Arc::new(AtomicBool::new(true));
    let last_pong = Arc::new(Mutex::new(Instant::now()));

    let ping_interval = Duration::from_secs(state.config.heartbeat_interval_secs);
    let pong_timeout = Duration::from_secs(state.config.heartbeat_timeout_secs);

    // Outbound forwarder with periodic Ping frames.
    let outbound_alive = Arc::clone(&alive);
    let outbound_pong = Arc::clone(&last_pong);
    let outbound = tokio::spawn(async move {
        let mut interval = tokio::time::interval(ping_interval);
        // skip the immediate first tick
        let _ = interval.tick().await;

        loop {
            tokio::select! {
                frame = send_rx.recv() => {
                    match frame {
                        Some(text) => {
                            if ws_tx.send(Message::Text(text.as_str().into())).await.is_err() {
                                break;
                            }
                        }
                        None => break,
                    }
                }
                _ = interval.tick() => {
                    if !outbound_alive.swap(false, Ordering::Relaxed)
                        && outbound_pong.lock().elapsed() > pong_timeout
                    {
                        warn!("client unresponsive for {pong_timeout:?}, disconnecting");
                        break;
                    }
                    if ws_tx.send(Message::Ping(Vec::new().into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Inbound loop.
    while let Some(Ok(frame)) = ws_rx.next().await {
        let text = match frame {
            Message::Text(ref text) => Some(text.to_string()),
            Message::Binary(ref data) => match std::str::from_utf8(data) {
                Ok(text) => Some(text.to_owned()),
                Err(_) => {
                    info!(conn = %id, len = data.len(), "received non-UTF8 binary frame");
                    None
                }
            },
            Message::Close(_) => {
                info!(conn = %id, "client sent close frame");
                break;
            }
            Message::Ping(_) | Message::Pong(_) => {
                alive.store(true, Ordering::Relaxed);
                *last_pong.lock() = Instant::now();
                None
            }
        };

        let Some(text) = text else { continue };

        if let Some(response) = state.gateway.handle_message(&id, &text).await {
            let _ = state
                .hub
                .send_to_connection(&id, &response.event, response.data);
        }
    }

    // Clean up.
    counter!("ws_disconnections_total").increment(1);
    gauge!("ws_connections_active").decrement(1.0);
    histogram!("ws_connection_duration_seconds").record(session_start.elapsed().as_secs_f64());
    outbound.abort();
    state.gateway.handle_disconnect(&id);
    state.hub.unregister(&id);
}
