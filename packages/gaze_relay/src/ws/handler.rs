//! WebSocket Handler
//!
//! One task per connected client: read a message, answer it, repeat.
//! Responses go to the sending client only; nothing is pushed unprompted.

use axum::extract::ws::{CloseFrame, Message, WebSocket, close_code};
use futures::{sink::SinkExt, stream::StreamExt};
use std::net::SocketAddr;
use tracing::{debug, info, warn};

use crate::registry::ClientId;
use crate::server::RelayState;

use super::dispatch::{Handled, handle_text};
use super::protocol::{ProtocolError, Response};

/// Why a connection ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Disconnect {
    ClientClosed,
    StreamEnded,
    TransportError,
    Shutdown,
}

/// Serve one client until it leaves, the connection breaks, or the relay stops.
pub async fn handle_client(socket: WebSocket, remote: Option<SocketAddr>, state: RelayState) {
    let (client_id, clients) = state.registry.register(remote).await;
    state.metrics.connection_opened();
    info!(
        client_id = %client_id,
        remote = ?remote,
        clients,
        "client connected"
    );

    let (mut ws_sender, mut ws_receiver) = socket.split();

    let reason = loop {
        // Stop before starting another read once shutdown is requested.
        let msg = tokio::select! {
            biased;
            _ = state.cancel.cancelled() => {
                let frame = CloseFrame {
                    code: close_code::AWAY,
                    reason: "relay shutting down".into(),
                };
                let _ = ws_sender.send(Message::Close(Some(frame))).await;
                break Disconnect::Shutdown;
            }
            msg = ws_receiver.next() => msg,
        };

        let response = match msg {
            None => break Disconnect::StreamEnded,
            Some(Err(e)) => {
                warn!(client_id = %client_id, "websocket receive error: {}", e);
                state.metrics.transport_error();
                break Disconnect::TransportError;
            }
            Some(Ok(Message::Close(_))) => break Disconnect::ClientClosed,
            Some(Ok(Message::Ping(_) | Message::Pong(_))) => continue,
            Some(Ok(Message::Text(text))) => respond(&state, &client_id, text.as_str()).await,
            Some(Ok(Message::Binary(bytes))) => match std::str::from_utf8(&bytes) {
                Ok(text) => respond(&state, &client_id, text).await,
                Err(_) => {
                    state.metrics.protocol_error();
                    Response::from(ProtocolError::UnsupportedFrame)
                }
            },
        };

        if let Err(e) = ws_sender
            .send(Message::Text(response.to_json().into()))
            .await
        {
            warn!(client_id = %client_id, "failed to send response: {}", e);
            state.metrics.transport_error();
            break Disconnect::TransportError;
        }
    };

    let session = state.registry.unregister(&client_id).await;
    state.metrics.connection_closed();
    let clients = state.registry.count().await;
    info!(
        client_id = %client_id,
        reason = ?reason,
        commands = session.map(|s| s.commands).unwrap_or(0),
        clients,
        "client disconnected"
    );
}

async fn respond(state: &RelayState, client_id: &ClientId, text: &str) -> Response {
    match handle_text(&state.cache, text).await {
        Handled::Command(command, response) => {
            state.metrics.command(command);
            if let Response::Movements(samples) = &response {
                state.metrics.samples_delivered(samples.len());
            }
            state.registry.record_command(client_id).await;
            debug!(client_id = %client_id, command = %command, "command served");
            response
        }
        Handled::Rejected(err, response) => {
            state.metrics.protocol_error();
            debug!(client_id = %client_id, "protocol error: {}", err);
            response
        }
    }
}
