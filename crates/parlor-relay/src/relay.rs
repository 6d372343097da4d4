//! Per-connection lifecycle: admit or refuse, pump events, clean up.
//!
//! ```text
//! Connected (unjoined) --join--> Joined --disconnect--> Disconnected
//! ```
//!
//! Unjoined connections receive roster updates and notices addressed to
//! them, but no chat, and may send nothing but `join`.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use parlor_core::event::{ClientEvent, ServerEvent, SERVER_BANNER};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error, info, warn};

use crate::router::{Outbound, RelayState};

fn encode(event: &ServerEvent) -> Option<Message> {
    match serde_json::to_string(event) {
        Ok(json) => Some(Message::Text(json.into())),
        Err(e) => {
            error!("Failed to encode outbound event: {e}");
            None
        }
    }
}

/// Handle a single WebSocket connection from `origin` until it closes.
pub async fn handle_connection(socket: WebSocket, state: Arc<RelayState>, origin: String) {
    let conn = state.next_connection_id();
    let (mut ws_tx, mut ws_rx) = socket.split();

    if state.bans.is_banned(&origin) {
        info!("{conn}: refused banned address {origin}");
        if let Some(msg) = encode(&ServerEvent::Banned { by: SERVER_BANNER.to_string() }) {
            let _ = ws_tx.send(msg).await;
        }
        let _ = ws_tx.send(Message::Close(None)).await;
        return;
    }

    info!("{conn}: connected from {origin}");
    state.open_connection(conn, &origin).await;
    let mut outbound_rx = state.outbound_tx.subscribe();

    // Forward envelopes meant for this connection.
    let writer_state = state.clone();
    let mut send_task = tokio::spawn(async move {
        loop {
            let event = match outbound_rx.recv().await {
                Ok(Outbound::Broadcast(ServerEvent::Chat(msg))) => {
                    if !writer_state.is_joined(conn).await {
                        continue;
                    }
                    ServerEvent::Chat(msg)
                }
                Ok(Outbound::Broadcast(event)) => event,
                Ok(Outbound::Direct(to, event)) if to == conn => event,
                Ok(Outbound::Disconnect(id)) if id == conn => {
                    let _ = ws_tx.send(Message::Close(None)).await;
                    break;
                }
                Ok(_) => continue,
                Err(RecvError::Lagged(skipped)) => {
                    warn!("{conn}: fell {skipped} events behind, disconnecting");
                    let _ = ws_tx.send(Message::Close(None)).await;
                    break;
                }
                Err(RecvError::Closed) => break,
            };
            let Some(msg) = encode(&event) else { continue };
            if ws_tx.send(msg).await.is_err() {
                break;
            }
        }
    });

    // Read incoming events from the client.
    let state_clone = state.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = ws_rx.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<ClientEvent>(text.as_str()) {
                    Ok(event) => state_clone.handle_event(conn, &origin, event).await,
                    Err(e) => debug!("{conn}: ignoring unparseable frame: {e}"),
                },
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    // Wait for either task to finish.
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    state.leave(conn).await;
    info!("{conn}: disconnected");
}

