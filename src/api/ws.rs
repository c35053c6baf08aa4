//! Websocket consumer attachment
//!
//! The persistent push channel: one binary message per raw frame, periodic
//! pings, a close frame at teardown. Each consumer gets a writer pump that
//! drains its send queue and a reader pump that exists only to notice the
//! remote going away.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::{interval_at, timeout, Instant};

use crate::api::handlers::error_response;
use crate::api::AppState;
use crate::config::ServerConfig;
use crate::registry::{Client, RegistryError, StreamRegistry};

/// `GET /ws/:stream_id`: upgrade and attach a consumer
///
/// The stream checks come first so a request for a missing or idle stream
/// gets its JSON error even without upgrade headers.
pub async fn attach(
    State(state): State<AppState>,
    Path(stream_id): Path<String>,
    ws: Option<WebSocketUpgrade>,
) -> Response {
    let stream = match state.registry.lookup(&stream_id).await {
        Ok(stream) => stream,
        Err(e) => {
            tracing::warn!(stream = %stream_id, "websocket attach failed: stream not found");
            return error_response(e);
        }
    };
    if !stream.is_running() {
        tracing::warn!(stream = %stream_id, "websocket attach failed: stream not running");
        return error_response(RegistryError::StreamNotRunning(stream_id));
    }

    let Some(ws) = ws else {
        return StatusCode::UPGRADE_REQUIRED.into_response();
    };

    let read_limit = state.config.read_limit;
    ws.max_message_size(read_limit)
        .on_upgrade(move |socket| serve_client(state, stream_id, socket))
}

/// Attach to the registry and run the two pumps until either exits, then
/// detach. Detach also races with stream teardown; removal is idempotent.
async fn serve_client(state: AppState, stream_id: String, socket: WebSocket) {
    let (client, rx) = match state.registry.attach_client(&stream_id).await {
        Ok(pair) => pair,
        Err(e) => {
            // The stream went away between the upgrade check and the attach
            tracing::warn!(stream = %stream_id, error = %e, "websocket attach failed");
            let mut socket = socket;
            let _ = socket.send(Message::Close(None)).await;
            return;
        }
    };

    tracing::info!(
        client = %client.client_id(),
        stream = %stream_id,
        "websocket client connected"
    );

    let (sink, source) = socket.split();
    let mut writer = tokio::spawn(write_pump(sink, rx, state.config.clone()));
    let mut reader = tokio::spawn(read_pump(source, state.config.clone()));

    // Whichever pump finishes first, the connection is done
    tokio::select! {
        _ = &mut writer => reader.abort(),
        _ = &mut reader => writer.abort(),
    }

    detach(&state.registry, &client).await;
}

async fn detach(registry: &Arc<StreamRegistry>, client: &Arc<Client>) {
    registry.remove_client(client).await;
    tracing::info!(
        client = %client.client_id(),
        stream = %client.stream_id(),
        "websocket client disconnected"
    );
}

/// Drain the send queue to the socket, pinging on the side. Ends when the
/// queue closes (teardown or removal) or a write fails or times out.
async fn write_pump(
    mut sink: SplitSink<WebSocket, Message>,
    mut rx: mpsc::Receiver<Bytes>,
    config: ServerConfig,
) {
    let mut pings = interval_at(
        Instant::now() + config.ping_interval,
        config.ping_interval,
    );

    loop {
        tokio::select! {
            maybe = rx.recv() => match maybe {
                Some(frame) => {
                    match timeout(
                        config.write_deadline,
                        sink.send(Message::Binary(frame.to_vec())),
                    )
                    .await
                    {
                        Ok(Ok(())) => {}
                        Ok(Err(e)) => {
                            tracing::debug!(error = %e, "websocket write failed");
                            return;
                        }
                        Err(_) => {
                            tracing::debug!("websocket write timed out");
                            return;
                        }
                    }
                }
                None => {
                    // Queue closed: say goodbye and unwind
                    let _ = timeout(config.write_deadline, sink.send(Message::Close(None))).await;
                    return;
                }
            },
            _ = pings.tick() => {
                if timeout(config.write_deadline, sink.send(Message::Ping(Vec::new())))
                    .await
                    .map_or(true, |r| r.is_err())
                {
                    return;
                }
            }
        }
    }
}

/// Read and discard inbound traffic to detect remote closure. Every
/// received message (pongs included) extends the deadline; silence past the
/// deadline ends the connection.
async fn read_pump(mut source: SplitStream<WebSocket>, config: ServerConfig) {
    loop {
        match timeout(config.read_deadline, source.next()).await {
            // Deadline passed with nothing inbound
            Err(_) => return,
            // Remote closed
            Ok(None) => return,
            Ok(Some(Err(e))) => {
                tracing::debug!(error = %e, "websocket read failed");
                return;
            }
            // Consumer-to-server data is not interpreted
            Ok(Some(Ok(_))) => {}
        }
    }
}
