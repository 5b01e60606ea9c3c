// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bus event publisher.
//!
//! Consumes the runtime event hub and publishes scene-state broadcasts on
//! `{prefix}.{device}.scene.state` plus scene-originated payloads on the
//! device's ok channel, until shutdown.

use std::sync::Arc;

use serde_json::json;
use tokio::sync::broadcast;

use crate::state::{build_info, DaemonState, RuntimeEvent};

/// Spawn the bus publisher as a background task.
pub fn spawn_publisher(state: Arc<DaemonState>, client: async_nats::Client) {
    tokio::spawn(async move {
        run_publisher(state, client).await;
    });
}

async fn run_publisher(state: Arc<DaemonState>, client: async_nats::Client) {
    let prefix = state.config.bus_prefix.clone();
    let mut events = state.events.subscribe();
    let shutdown = state.shutdown.clone();

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            event = events.recv() => {
                match event {
                    Ok(RuntimeEvent::SceneSwitch { device, current_scene, generation_id, status, ts }) => {
                        let body = json!({
                            "currentScene": current_scene,
                            "generationId": generation_id,
                            "status": status,
                            "buildInfo": build_info(),
                            "ts": ts,
                        });
                        publish(&client, format!("{prefix}.{device}.scene.state"), &body).await;
                    }
                    Ok(RuntimeEvent::SceneOk { device, payload }) => {
                        let body = json!({ "ok": true, "payload": payload });
                        publish(&client, format!("{prefix}.{device}.ok"), &body).await;
                    }
                    // Device and metrics updates stay on the WebSocket side.
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::debug!(lagged = n, "bus publisher lagged events");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }

    tracing::debug!("bus publisher shutting down");
}

async fn publish(client: &async_nats::Client, subject: String, body: &serde_json::Value) {
    match serde_json::to_vec(body) {
        Ok(payload) => {
            if let Err(e) = client.publish(subject, payload.into()).await {
                tracing::warn!(err = %e, "bus publish failed");
            }
        }
        Err(e) => tracing::warn!(err = %e, "bus payload serialization failed"),
    }
}
