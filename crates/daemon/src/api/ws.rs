// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! WebSocket stream for UI clients.
//!
//! On connect the client receives an `init` message with a full device
//! snapshot, then `device_update`, `scene_switch`, and `metrics_update`
//! events as they happen. The daemon is the authority; clients reconcile
//! from `init` on every reconnect.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio::sync::broadcast;

use crate::state::{build_info, epoch_ms, DaemonState, RuntimeEvent};

/// `GET /ws` — WebSocket upgrade for UI clients.
pub async fn ws_handler(
    State(state): State<Arc<DaemonState>>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws(socket, state))
}

async fn handle_ws(socket: WebSocket, state: Arc<DaemonState>) {
    let client_id = uuid::Uuid::new_v4();
    tracing::debug!(client = %client_id, "ws client connected");

    let mut events = state.events.subscribe();
    let (mut ws_tx, mut ws_rx) = socket.split();

    // Full snapshot first so the client can reconcile.
    let init = json!({
        "type": "init",
        "devices": state.device_views().await,
        "buildInfo": build_info(),
        "ts": epoch_ms(),
    });
    if ws_tx.send(Message::Text(init.to_string().into())).await.is_err() {
        return;
    }

    loop {
        tokio::select! {
            _ = state.shutdown.cancelled() => break,

            event = events.recv() => {
                match event {
                    Ok(event) => {
                        if !forwards(&event) {
                            continue;
                        }
                        let Ok(text) = serde_json::to_string(&event) else { continue };
                        if ws_tx.send(Message::Text(text.into())).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::debug!(client = %client_id, lagged = n, "ws client lagged events");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }

            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(_)) => break,
                    // The stream is one-way; client text is ignored.
                    _ => {}
                }
            }
        }
    }

    tracing::debug!(client = %client_id, "ws client disconnected");
}

/// Which runtime events reach WebSocket clients.
fn forwards(event: &RuntimeEvent) -> bool {
    matches!(
        event,
        RuntimeEvent::DeviceUpdate { .. }
            | RuntimeEvent::SceneSwitch { .. }
            | RuntimeEvent::MetricsUpdate { .. }
    )
}
